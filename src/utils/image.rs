//! Pixel-level primitives consumed by the document tree.
//!
//! These are the only places the crate touches raw pixels: reading a page
//! image, probing its dimensions without a full decode, cropping a region,
//! background-filling outside a mask, and resizing. The tree calls them as
//! opaque utilities; none of them know anything about nodes.

use image::{Rgb, RgbImage, imageops};

use crate::core::errors::{QuireError, QuireResult};
use crate::domain::geometry::{Bbox, Mask};

/// Background color written outside a mask's foreground.
const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

/// Reads an image from disk into an RGB buffer.
///
/// # Arguments
///
/// * `path` - Path to the image file.
///
/// # Returns
///
/// * `Ok(RgbImage)` - The decoded image.
/// * `Err(QuireError::ImageLoad)` - If the file is missing or not a decodable image.
pub fn load_image(path: impl AsRef<std::path::Path>) -> QuireResult<RgbImage> {
    let path = path.as_ref();
    let img = image::open(path).map_err(|e| QuireError::image_load(path, e))?;
    Ok(img.to_rgb8())
}

/// Probes an image's dimensions from its header without decoding pixel data.
///
/// # Returns
///
/// * `Ok((height, width))` - Dimensions in the row-major order the tree uses.
/// * `Err(QuireError::ImageLoad)` - If the file is unreadable or unsupported.
pub fn image_size(path: impl AsRef<std::path::Path>) -> QuireResult<(u32, u32)> {
    let path = path.as_ref();
    let (width, height) =
        image::image_dimensions(path).map_err(|e| QuireError::image_load(path, e))?;
    Ok((height, width))
}

/// Crops `img` to `bbox`, clamping the box to the image bounds first.
///
/// # Returns
///
/// * `Ok(RgbImage)` - The cropped region.
/// * `Err(QuireError::InvalidInput)` - If the clamped region is empty.
pub fn crop(img: &RgbImage, bbox: &Bbox) -> QuireResult<RgbImage> {
    let clamped = bbox.clamp(img.width(), img.height());
    if clamped.is_empty() {
        return Err(QuireError::invalid_input(format!(
            "crop region {bbox} lies outside a {}x{} image",
            img.width(),
            img.height()
        )));
    }
    let x = clamped.x1().max(0) as u32;
    let y = clamped.y1().max(0) as u32;
    Ok(imageops::crop_imm(img, x, y, clamped.width(), clamped.height()).to_image())
}

/// Fills every pixel outside the mask's foreground with the background color.
///
/// Dimensions are unchanged; masked-out pixels are overwritten, not removed.
/// A mask whose raster does not match the image is resized (nearest neighbor)
/// before applying.
pub fn apply_mask(img: &RgbImage, mask: &Mask) -> RgbImage {
    let mask = if mask.width() == img.width() && mask.height() == img.height() {
        mask.clone()
    } else {
        mask.resize(img.width(), img.height())
    };
    let mut out = img.clone();
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        if !mask.get(x as i32, y as i32) {
            *pixel = BACKGROUND;
        }
    }
    out
}

/// Resizes `img` by `ratio` with bilinear interpolation.
///
/// Output dimensions round to the nearest pixel and never drop below 1.
pub fn rescale(img: &RgbImage, ratio: f64) -> RgbImage {
    let width = scaled_dimension(img.width(), ratio);
    let height = scaled_dimension(img.height(), ratio);
    imageops::resize(img, width, height, imageops::FilterType::Triangle)
}

fn scaled_dimension(value: u32, ratio: f64) -> u32 {
    ((value as f64 * ratio).round() as u32).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::geometry::Point;

    /// Creates a test image with a simple gradient so crops are verifiable.
    fn create_test_image(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        })
    }

    #[test]
    fn crop_extracts_the_requested_region() {
        let img = create_test_image(100, 80);
        let out = crop(&img, &Bbox::new(10, 20, 40, 50)).unwrap();
        assert_eq!(out.dimensions(), (30, 30));
        assert_eq!(out.get_pixel(0, 0), &Rgb([10, 20, 128]));
    }

    #[test]
    fn crop_clamps_to_image_bounds() {
        let img = create_test_image(50, 50);
        let out = crop(&img, &Bbox::new(40, 40, 90, 90)).unwrap();
        assert_eq!(out.dimensions(), (10, 10));
    }

    #[test]
    fn crop_outside_image_fails() {
        let img = create_test_image(50, 50);
        assert!(crop(&img, &Bbox::new(60, 60, 80, 80)).is_err());
    }

    #[test]
    fn apply_mask_fills_background_and_keeps_dimensions() {
        let img = create_test_image(4, 4);
        let mut data = vec![0u8; 16];
        data[5] = 255;
        let mask = Mask::new(4, 4, data).unwrap();
        let out = apply_mask(&img, &mask);
        assert_eq!(out.dimensions(), (4, 4));
        assert_eq!(out.get_pixel(1, 1), &Rgb([1, 1, 128]));
        assert_eq!(out.get_pixel(0, 0), &BACKGROUND);
    }

    #[test]
    fn rescale_rounds_dimensions() {
        let img = create_test_image(99, 51);
        let out = rescale(&img, 0.5);
        assert_eq!(out.dimensions(), (50, 26));
    }

    #[test]
    fn rescale_never_collapses_to_zero() {
        let img = create_test_image(3, 3);
        let out = rescale(&img, 0.1);
        assert_eq!(out.dimensions(), (1, 1));
    }

    #[test]
    fn bbox_display_is_usable_in_errors() {
        let bbox = Bbox::from_size(10, 10).move_by(Point::new(5, 5));
        let err = crop(&create_test_image(4, 4), &bbox).unwrap_err();
        assert!(err.to_string().contains("outside"));
    }
}
