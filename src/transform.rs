//! Fit arbitrary images to a frame's exact panel geometry.
//!
//! | Step | Implementation |
//! |---|---|
//! | Decode | `image::load_from_memory` (JPEG, PNG, WebP) |
//! | Rotate | `imageops::rotate90/180/270` (clockwise) |
//! | Cover + center crop | `DynamicImage::resize_to_fill` with `Lanczos3` |
//! | Encode | `JpegEncoder` at quality [`JPEG_QUALITY`] |

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;

use crate::config::{FrameModel, Rotation};
use crate::error::Error;

/// Media type of every transformed image.
pub const DELIVERY_MEDIA_TYPE: &str = "image/jpeg";

/// JPEG quality used for delivery.
pub const JPEG_QUALITY: u8 = 90;

/// A transformed image ready for upload.
#[derive(Clone)]
pub struct ResizeResult {
    /// Encoded image
    pub bytes: Vec<u8>,
    /// Always [`DELIVERY_MEDIA_TYPE`]
    pub media_type: &'static str,
    /// Decoded input size, before rotation
    pub original: (u32, u32),
    /// Output size, equal to the frame model's resolution
    pub target: (u32, u32),
}

impl std::fmt::Debug for ResizeResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResizeResult")
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .field("media_type", &self.media_type)
            .field("original", &self.original)
            .field("target", &self.target)
            .finish()
    }
}

/// Decode, rotate, cover-resize and re-encode `bytes` for `model`.
///
/// The output is exactly `model.resolution()`: the image is scaled until it
/// covers the panel and the overflow is cropped evenly from both sides.
///
/// # Errors
///
/// [`Error::ImageDecode`] if the input is not a supported image.
///
/// # Example
///
/// ```
/// use std::io::Cursor;
/// use image::{DynamicImage, ImageFormat};
/// use inkframe::{resize_for_frame, FrameModel, Rotation};
///
/// let mut png = Cursor::new(Vec::new());
/// DynamicImage::new_rgb8(300, 100)
///     .write_to(&mut png, ImageFormat::Png)
///     .unwrap();
///
/// let result = resize_for_frame(png.get_ref(), FrameModel::Portrait7, Rotation::None).unwrap();
/// assert_eq!(result.original, (300, 100));
/// assert_eq!(result.target, (480, 800));
/// ```
pub fn resize_for_frame(
    bytes: &[u8],
    model: FrameModel,
    rotation: Rotation,
) -> Result<ResizeResult, Error> {
    let img = image::load_from_memory(bytes).map_err(|e| Error::ImageDecode(e.to_string()))?;
    let original = (img.width(), img.height());

    let rotated = rotate(img, rotation);
    let (width, height) = model.resolution();
    let fitted = rotated.resize_to_fill(width, height, FilterType::Lanczos3);

    let encoded = encode_jpeg(&fitted)?;
    tracing::info!(
        "Transformed {}x{} -> {}x{} for {} (rotate {}): {} bytes",
        original.0,
        original.1,
        width,
        height,
        model,
        rotation.degrees(),
        encoded.len()
    );

    Ok(ResizeResult {
        bytes: encoded,
        media_type: DELIVERY_MEDIA_TYPE,
        original,
        target: (width, height),
    })
}

fn rotate(img: DynamicImage, rotation: Rotation) -> DynamicImage {
    match rotation {
        Rotation::None => img,
        Rotation::Cw90 => img.rotate90(),
        Rotation::Cw180 => img.rotate180(),
        Rotation::Cw270 => img.rotate270(),
    }
}

fn encode_jpeg(img: &DynamicImage) -> Result<Vec<u8>, Error> {
    // JPEG has no alpha channel
    let rgb = img.to_rgb8();
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(|e| Error::ImageEncode(e.to_string()))?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    const RED: Rgb<u8> = Rgb([220, 30, 30]);
    const BLUE: Rgb<u8> = Rgb([30, 30, 220]);
    const GREEN: Rgb<u8> = Rgb([30, 200, 30]);
    const WHITE: Rgb<u8> = Rgb([250, 250, 250]);

    fn png(img: RgbImage) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buffer, ImageFormat::Png)
            .unwrap();
        buffer.into_inner()
    }

    /// Four solid quadrants: red top-left, blue top-right, green bottom-left, white bottom-right.
    fn quadrants(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            match (x < width / 2, y < height / 2) {
                (true, true) => RED,
                (false, true) => BLUE,
                (true, false) => GREEN,
                (false, false) => WHITE,
            }
        })
    }

    fn decode(result: &ResizeResult) -> RgbImage {
        image::load_from_memory(&result.bytes).unwrap().to_rgb8()
    }

    fn close(a: Rgb<u8>, b: Rgb<u8>) -> bool {
        a.0.iter()
            .zip(b.0.iter())
            .all(|(x, y)| (*x as i16 - *y as i16).abs() <= 24)
    }

    /// Center pixel of each quadrant, in the same order as [`quadrants`].
    fn quadrant_centers(img: &RgbImage) -> [Rgb<u8>; 4] {
        let (w, h) = img.dimensions();
        [
            *img.get_pixel(w / 4, h / 4),
            *img.get_pixel(3 * w / 4, h / 4),
            *img.get_pixel(w / 4, 3 * h / 4),
            *img.get_pixel(3 * w / 4, 3 * h / 4),
        ]
    }

    #[test]
    fn test_output_matches_model_for_any_aspect() {
        let inputs = [(64, 48), (30, 120), (5, 5), (200, 9)];
        for model in FrameModel::ALL {
            for (w, h) in inputs {
                let result =
                    resize_for_frame(&png(quadrants(w, h)), model, Rotation::None).unwrap();
                assert_eq!(result.original, (w, h));
                assert_eq!(result.target, model.resolution());
                assert_eq!(decode(&result).dimensions(), model.resolution());
            }
        }
    }

    #[test]
    fn test_output_is_jpeg() {
        let result =
            resize_for_frame(&png(quadrants(64, 64)), FrameModel::Portrait7, Rotation::Cw90)
                .unwrap();
        assert_eq!(result.media_type, "image/jpeg");
        assert_eq!(&result.bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_undecodable_input() {
        let err = resize_for_frame(b"definitely not an image", FrameModel::Portrait7, Rotation::None)
            .unwrap_err();
        assert!(matches!(err, Error::ImageDecode(_)));
    }

    #[test]
    fn test_rotate_180_twice_restores_content() {
        let model = FrameModel::Portrait7;
        let (w, h) = model.resolution();
        let source = png(quadrants(w, h));

        let straight = resize_for_frame(&source, model, Rotation::None).unwrap();
        let once = resize_for_frame(&source, model, Rotation::Cw180).unwrap();
        let twice = resize_for_frame(&once.bytes, model, Rotation::Cw180).unwrap();

        assert_eq!(decode(&once).dimensions(), (w, h));
        assert_eq!(decode(&twice).dimensions(), (w, h));

        let expected = quadrant_centers(&decode(&straight));
        let actual = quadrant_centers(&decode(&twice));
        for (e, a) in expected.iter().zip(actual.iter()) {
            assert!(close(*e, *a), "expected {:?}, got {:?}", e, a);
        }

        // A single half turn moves red to the bottom-right
        let flipped = quadrant_centers(&decode(&once));
        assert!(close(flipped[3], RED));
        assert!(close(flipped[0], WHITE));
    }

    #[test]
    fn test_rotate_90_before_cover() {
        // Landscape source, left half red, right half blue
        let source = RgbImage::from_fn(160, 120, |x, _| if x < 80 { RED } else { BLUE });
        let result =
            resize_for_frame(&png(source), FrameModel::Portrait10, Rotation::Cw90).unwrap();
        let out = decode(&result);
        assert_eq!(out.dimensions(), (1200, 1600));

        // Clockwise quarter turn: left edge becomes the top edge
        assert!(close(*out.get_pixel(600, 300), RED));
        assert!(close(*out.get_pixel(600, 1300), BLUE));
    }

    #[test]
    fn test_cover_crops_overflow_evenly() {
        // Wide source onto a portrait panel: only the middle band survives
        let source = RgbImage::from_fn(300, 80, |x, _| match x {
            0..=99 => RED,
            100..=199 => GREEN,
            _ => BLUE,
        });
        let result =
            resize_for_frame(&png(source), FrameModel::Portrait7, Rotation::None).unwrap();
        let out = decode(&result);

        assert!(close(*out.get_pixel(10, 400), GREEN));
        assert!(close(*out.get_pixel(470, 400), GREEN));
    }
}
