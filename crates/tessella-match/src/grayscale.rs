//! Image decoding and grayscale conversion.
//!
//! [`decode`] turns raw upload, capture, or gallery bytes (PNG, JPEG,
//! BMP, WebP) into the RGBA bitmap the rest of the pipeline works on.
//! [`grayscale_into`] produces the single-channel luminance raster the
//! edge detector consumes, writing into a caller-owned buffer so scratch
//! memory can be recycled between comparisons.

use image::GrayImage;

use crate::types::{MatchError, RgbaImage};

/// Decode raw image bytes into an RGBA bitmap.
///
/// # Errors
///
/// Returns [`MatchError::EmptyInput`] if `bytes` is empty.
/// Returns [`MatchError::ImageDecode`] if the image format is
/// unrecognized or the data is corrupt.
pub fn decode(bytes: &[u8]) -> Result<RgbaImage, MatchError> {
    if bytes.is_empty() {
        return Err(MatchError::EmptyInput);
    }

    let img = image::load_from_memory(bytes)?;
    Ok(img.to_rgba8())
}

/// BT.601 luma weights in 14-bit fixed point (0.299, 0.587, 0.114).
const LUMA_R: u32 = 4899;
const LUMA_G: u32 = 9617;
const LUMA_B: u32 = 1868;
const LUMA_SHIFT: u32 = 14;
const _: () = assert!(LUMA_R + LUMA_G + LUMA_B == 1 << LUMA_SHIFT);

/// BT.601 luma of one pixel, rounded to nearest.
fn luma([r, g, b, _]: [u8; 4]) -> u8 {
    let weighted = LUMA_R * u32::from(r) + LUMA_G * u32::from(g) + LUMA_B * u32::from(b);
    let rounded = (weighted + (1 << (LUMA_SHIFT - 1))) >> LUMA_SHIFT;
    u8::try_from(rounded).unwrap_or(u8::MAX)
}

/// Convert an RGBA bitmap to luminance, reusing `buffer`'s allocation.
///
/// Alpha is ignored. Weights are BT.601, not the Rec. 709 weights of
/// `image::imageops::grayscale`; the default edge thresholds assume
/// BT.601 gradients.
#[must_use = "returns the grayscale image built in the recycled buffer"]
pub fn grayscale_into(image: &RgbaImage, mut buffer: Vec<u8>) -> GrayImage {
    buffer.clear();
    buffer.extend(image.pixels().map(|p| luma(p.0)));
    let (width, height) = image.dimensions();
    GrayImage::from_raw(width, height, buffer).unwrap_or_else(|| GrayImage::new(width, height))
}

/// Convert an RGBA bitmap to luminance in a fresh buffer.
#[must_use = "returns the grayscale image"]
pub fn grayscale(image: &RgbaImage) -> GrayImage {
    grayscale_into(image, Vec::new())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// Encode an RGBA image as PNG bytes.
    fn encode_png(img: &RgbaImage) -> Vec<u8> {
        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        image::ImageEncoder::write_image(
            encoder,
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::Rgba8,
        )
        .unwrap();
        buf
    }

    #[test]
    fn empty_input_returns_error() {
        let result = decode(&[]);
        assert!(matches!(result, Err(MatchError::EmptyInput)));
    }

    #[test]
    fn corrupt_bytes_returns_image_decode_error() {
        let result = decode(&[0xFF, 0xFE, 0x00, 0x01]);
        assert!(matches!(result, Err(MatchError::ImageDecode(_))));
    }

    #[test]
    fn valid_png_decodes_to_same_pixels() {
        let img = RgbaImage::from_fn(3, 2, |x, y| {
            image::Rgba([u8::try_from(x * 40).unwrap(), u8::try_from(y * 90).unwrap(), 7, 255])
        });
        let decoded = decode(&encode_png(&img)).unwrap();
        assert_eq!(decoded, img);
    }

    #[test]
    fn grayscale_uses_bt601_weights() {
        let img = RgbaImage::from_fn(5, 1, |x, _| match x {
            0 => image::Rgba([255, 0, 0, 255]),
            1 => image::Rgba([0, 255, 0, 255]),
            2 => image::Rgba([0, 0, 255, 255]),
            3 => image::Rgba([255, 255, 255, 255]),
            _ => image::Rgba([190, 90, 60, 0]),
        });
        let gray = grayscale(&img);
        let values: Vec<u8> = gray.pixels().map(|p| p.0[0]).collect();
        // 0.299 * 190 + 0.587 * 90 + 0.114 * 60 = 116.35; alpha ignored.
        assert_eq!(values, [76, 150, 29, 255, 116]);
    }

    #[test]
    fn uniform_gray_is_unchanged() {
        for v in [0u8, 1, 127, 128, 254, 255] {
            let img = RgbaImage::from_pixel(2, 2, image::Rgba([v, v, v, 255]));
            assert!(grayscale(&img).pixels().all(|p| p.0[0] == v), "gray {v} drifted");
        }
    }

    #[test]
    fn grayscale_into_reuses_dirty_buffer() {
        let img = RgbaImage::from_pixel(4, 4, image::Rgba([255, 255, 255, 255]));
        let dirty = vec![7u8; 100];
        let gray = grayscale_into(&img, dirty);
        assert_eq!(gray.dimensions(), (4, 4));
        assert!(gray.pixels().all(|p| p.0[0] == 255));
    }

    #[test]
    fn grayscale_weights_green_highest() {
        let img = RgbaImage::from_fn(3, 1, |x, _| match x {
            0 => image::Rgba([255, 0, 0, 255]),
            1 => image::Rgba([0, 255, 0, 255]),
            _ => image::Rgba([0, 0, 255, 255]),
        });
        let gray = grayscale(&img);
        let (r, g, b) = (
            gray.get_pixel(0, 0).0[0],
            gray.get_pixel(1, 0).0[0],
            gray.get_pixel(2, 0).0[0],
        );
        assert!(
            g > r && r > b,
            "expected green > red > blue luminance, got R={r} G={g} B={b}",
        );
    }
}
