//! Query image acquisition.
//!
//! A [`CaptureSource`] yields exactly one decoded query bitmap per call.
//! [`FileUpload`] reads a file from disk; [`CameraCapture`] grabs one
//! frame from any [`Camera`] and stops the stream as soon as the frame
//! is in hand. [`spawn_capture`] runs a source on its own thread and
//! hands back a single-shot [`PendingCapture`].

use std::path::{Path, PathBuf};
use std::sync::mpsc;

use serde::{Deserialize, Serialize};
use tessella_match::{MatchError, RgbaImage};

/// Allowed file extensions for image uploads.
pub const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "webp"];

/// Check whether a filename has an allowed image extension.
#[must_use]
pub fn has_allowed_extension(name: &str) -> bool {
    name.rsplit_once('.').is_some_and(|(_, ext)| {
        ALLOWED_EXTENSIONS
            .iter()
            .any(|a| a.eq_ignore_ascii_case(ext))
    })
}

/// Failures while obtaining raw image data.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// No camera is available for the requested facing.
    #[error("camera unavailable: {0}")]
    DeviceUnavailable(String),

    /// The user or platform refused camera access.
    #[error("camera permission denied")]
    PermissionDenied,

    /// The stream opened but no frame could be read.
    #[error("failed to grab frame: {0}")]
    FrameGrab(String),

    /// The upload is not one of [`ALLOWED_EXTENSIONS`].
    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),

    /// The upload could not be read.
    #[error("failed to read {path}: {source}")]
    FileRead {
        /// Upload location.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The capture task ended without producing a result.
    #[error("capture task ended without a result")]
    Interrupted,
}

/// Raw capture bytes that could not be decoded into a bitmap.
#[derive(Debug, thiserror::Error)]
#[error("failed to decode captured image: {0}")]
pub struct DecodeError(#[from] pub MatchError);

/// Either way acquiring a query bitmap can fail.
#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    /// Obtaining the bytes failed.
    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// The bytes were obtained but are not a valid image.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Something that can produce one query bitmap.
pub trait CaptureSource {
    /// Short description for log lines.
    fn describe(&self) -> String;

    /// Obtain and decode one image.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::Capture`] when no bytes could be obtained
    /// and [`AcquireError::Decode`] when they are not a valid image.
    fn acquire(&mut self) -> Result<RgbaImage, AcquireError>;
}

/// An image file supplied by the user.
#[derive(Debug, Clone)]
pub struct FileUpload {
    path: PathBuf,
}

impl FileUpload {
    /// Upload the file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the upload.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CaptureSource for FileUpload {
    fn describe(&self) -> String {
        format!("upload {}", self.path.display())
    }

    fn acquire(&mut self) -> Result<RgbaImage, AcquireError> {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !has_allowed_extension(&name) {
            return Err(CaptureError::UnsupportedFileType(name).into());
        }
        let bytes = std::fs::read(&self.path).map_err(|source| CaptureError::FileRead {
            path: self.path.clone(),
            source,
        })?;
        tracing::debug!(file = %name, bytes = bytes.len(), "read upload");
        Ok(tessella_match::decode(&bytes).map_err(DecodeError)?)
    }
}

/// Which camera to open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Facing {
    /// The camera on the back of the device, pointed at the tile.
    #[default]
    Rear,
    /// The user-facing camera.
    Front,
}

/// A live camera stream.
pub trait FrameStream {
    /// Read one encoded frame.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::FrameGrab`] if no frame is available.
    fn grab_frame(&mut self) -> Result<Vec<u8>, CaptureError>;

    /// Release the device.
    fn stop(&mut self);
}

/// A camera device that can open streams.
pub trait Camera {
    /// The stream type this camera produces.
    type Stream: FrameStream;

    /// Open a stream on the camera facing `facing`.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::DeviceUnavailable`] or
    /// [`CaptureError::PermissionDenied`].
    fn open(&mut self, facing: Facing) -> Result<Self::Stream, CaptureError>;
}

/// Stops the wrapped stream when dropped.
#[derive(Debug)]
pub struct StreamGuard<S: FrameStream> {
    stream: S,
}

impl<S: FrameStream> StreamGuard<S> {
    /// Take ownership of an open stream.
    pub const fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Read one encoded frame from the guarded stream.
    ///
    /// # Errors
    ///
    /// Propagates the stream's [`CaptureError`].
    pub fn grab_frame(&mut self) -> Result<Vec<u8>, CaptureError> {
        self.stream.grab_frame()
    }
}

impl<S: FrameStream> Drop for StreamGuard<S> {
    fn drop(&mut self) {
        self.stream.stop();
    }
}

/// Single-frame capture from a camera.
#[derive(Debug)]
pub struct CameraCapture<C> {
    camera: C,
    facing: Facing,
}

impl<C: Camera> CameraCapture<C> {
    /// Capture from `camera`, preferring the rear-facing lens.
    pub fn new(camera: C) -> Self {
        Self::with_facing(camera, Facing::Rear)
    }

    /// Capture from `camera` with an explicit facing.
    pub const fn with_facing(camera: C, facing: Facing) -> Self {
        Self { camera, facing }
    }

    /// The camera being captured from.
    pub const fn camera(&self) -> &C {
        &self.camera
    }
}

impl<C: Camera> CaptureSource for CameraCapture<C> {
    fn describe(&self) -> String {
        format!("{:?} camera", self.facing)
    }

    fn acquire(&mut self) -> Result<RgbaImage, AcquireError> {
        let frame = {
            let mut stream = StreamGuard::new(self.camera.open(self.facing)?);
            stream.grab_frame()?
        };
        tracing::debug!(bytes = frame.len(), "captured frame, stream stopped");
        Ok(tessella_match::decode(&frame).map_err(DecodeError)?)
    }
}

/// A capture running on another thread.
#[derive(Debug)]
pub struct PendingCapture {
    receiver: mpsc::Receiver<Result<RgbaImage, AcquireError>>,
}

impl PendingCapture {
    /// Block until the capture finishes.
    ///
    /// # Errors
    ///
    /// Returns the source's [`AcquireError`], or
    /// [`CaptureError::Interrupted`] if the task died first.
    pub fn wait(self) -> Result<RgbaImage, AcquireError> {
        self.receiver
            .recv()
            .unwrap_or(Err(AcquireError::Capture(CaptureError::Interrupted)))
    }
}

/// Run `source` on a background thread.
///
/// The result is delivered once through the returned handle; failures
/// are logged on the capture thread as well.
pub fn spawn_capture<S>(mut source: S) -> PendingCapture
where
    S: CaptureSource + Send + 'static,
{
    let (sender, receiver) = mpsc::sync_channel(1);
    std::thread::spawn(move || {
        let result = source.acquire();
        match &result {
            Ok(image) => tracing::info!(
                source = %source.describe(),
                width = image.width(),
                height = image.height(),
                "query acquired"
            ),
            Err(e) => tracing::warn!(source = %source.describe(), error = %e, "capture failed"),
        }
        // The receiver may have been dropped; nobody is waiting then.
        let _ = sender.send(result);
    });
    PendingCapture { receiver }
}
