//! tessella-io: Everything around the matcher that touches the outside
//! world.
//!
//! Loads the reference gallery from a JSON manifest, acquires query
//! images from uploads or cameras, keeps only the latest query's result,
//! and renders results as text or JSON.

pub mod capture;
pub mod gallery;
pub mod manifest;
pub mod render;
pub mod session;

pub use capture::{
    AcquireError, Camera, CameraCapture, CaptureError, CaptureSource, DecodeError, Facing,
    FileUpload, FrameStream, PendingCapture, StreamGuard, spawn_capture,
};
pub use gallery::{EntryFailure, LoadError, LoadReport, load, load_gallery};
pub use manifest::{Manifest, ManifestRecord};
pub use render::{MatchReport, MatchStatus, ReportEntry};
pub use session::{MatchSession, QueryError, QueryOutcome, Ticket};
