//! Cover image decoding and scaling helpers.

use image::{imageops::FilterType, DynamicImage, GenericImageView};
use zune_core::{colorspace::ColorSpace, options::DecoderOptions};
use zune_jpeg::JpegDecoder;

fn looks_like_jpeg(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0xff && bytes[1] == 0xd8
}

fn decode_jpeg_non_strict(bytes: &[u8]) -> Option<DynamicImage> {
    if !looks_like_jpeg(bytes) {
        return None;
    }

    let options = DecoderOptions::new_cmd()
        .set_strict_mode(false)
        .jpeg_set_out_colorspace(ColorSpace::RGBA);
    let mut decoder = JpegDecoder::new_with_options(bytes, options);
    let pixels = decoder.decode().ok()?;
    let (width, height) = decoder.dimensions()?;
    let image = image::RgbaImage::from_raw(width as u32, height as u32, pixels)?;
    Some(DynamicImage::ImageRgba8(image))
}

/// Decodes cover bytes, falling back to a non-strict JPEG decoder for the
/// slightly malformed scans metadata services commonly serve.
pub(crate) fn decode_image(bytes: &[u8]) -> Option<DynamicImage> {
    image::load_from_memory(bytes)
        .ok()
        .or_else(|| decode_jpeg_non_strict(bytes))
}

/// Largest size fitting inside `max_width` x `max_height` at the source
/// aspect ratio, with half-up rounding on the scaled edge.
pub(crate) fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (1, 1);
    }
    let max_width = max_width.max(1);
    let max_height = max_height.max(1);
    if width <= max_width && height <= max_height {
        return (width, height);
    }

    let height_at_max_width =
        ((u64::from(height) * u64::from(max_width)) + (u64::from(width) / 2)) / u64::from(width);
    if height_at_max_width <= u64::from(max_height) {
        (max_width, height_at_max_width.max(1) as u32)
    } else {
        let width_at_max_height = ((u64::from(width) * u64::from(max_height))
            + (u64::from(height) / 2))
            / u64::from(height);
        (width_at_max_height.max(1) as u32, max_height)
    }
}

/// Aspect-preserving downscale of a decoded cover to the requested box.
pub(crate) fn scale_to_fit(image: &DynamicImage, max_width: u32, max_height: u32) -> DynamicImage {
    let (width, height) = image.dimensions();
    let (target_width, target_height) = fit_within(width, height, max_width, max_height);
    if target_width == width && target_height == height {
        return image.clone();
    }
    image.resize(target_width, target_height, FilterType::Lanczos3)
}

#[cfg(test)]
mod tests {
    use super::{decode_image, fit_within, scale_to_fit};
    use image::{
        codecs::jpeg::JpegEncoder, DynamicImage, GenericImageView, ImageBuffer, ImageFormat, Rgb,
        RgbImage, Rgba,
    };
    use std::io::Cursor;

    #[test]
    fn test_fit_within_preserves_aspect_ratio() {
        assert_eq!(fit_within(2000, 1000, 320, 320), (320, 160));
        assert_eq!(fit_within(1000, 2000, 320, 320), (160, 320));
        assert_eq!(fit_within(128, 64, 320, 320), (128, 64));
        assert_eq!(fit_within(1000, 1000, 200, 100), (100, 100));
    }

    #[test]
    fn test_decode_image_decodes_jpeg_with_trailing_garbage() {
        let rgb = RgbImage::from_pixel(12, 9, Rgb([90, 140, 210]));
        let mut encoded = Vec::new();
        {
            let mut encoder = JpegEncoder::new_with_quality(&mut encoded, 85);
            encoder
                .encode_image(&DynamicImage::ImageRgb8(rgb))
                .expect("jpeg encoding should succeed");
        }
        // Simulate trailing garbage often seen in malformed files.
        encoded.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);

        let decoded = decode_image(&encoded).expect("fallback decoder should decode jpeg bytes");
        assert_eq!(decoded.dimensions(), (12, 9));
    }

    #[test]
    fn test_decode_image_rejects_non_image_bytes() {
        assert!(decode_image(b"definitely-not-an-image").is_none());
    }

    #[test]
    fn test_scale_to_fit_matches_requested_box() {
        let source =
            DynamicImage::ImageRgba8(ImageBuffer::from_pixel(640, 480, Rgba([8, 16, 24, 255])));
        let scaled = scale_to_fit(&source, 320, 320);
        assert_eq!(scaled.dimensions(), (320, 240));

        let untouched = scale_to_fit(&source, 1024, 1024);
        assert_eq!(untouched.dimensions(), (640, 480));
    }

    #[test]
    fn test_decode_image_decodes_png_bytes() {
        let source =
            DynamicImage::ImageRgba8(ImageBuffer::from_pixel(7, 5, Rgba([8, 16, 24, 255])));
        let mut cursor = Cursor::new(Vec::<u8>::new());
        source
            .write_to(&mut cursor, ImageFormat::Png)
            .expect("png encoding should succeed");

        let decoded = decode_image(&cursor.into_inner()).expect("png bytes should decode");
        assert_eq!(decoded.dimensions(), (7, 5));
    }
}
