//! Image normalisation: whitespace crop, colour flattening, JPEG re-encode.
//!
//! Screenshots of a document viewer carry wide off-white borders around the
//! page bitmap. The crop finds the tight box around "content" pixels (luma at
//! or below a threshold), grows it by a margin and clamps it to the image.
//! An image with no content pixels is returned unchanged rather than cropped
//! to nothing.
//!
//! Luminance is the `image` crate's grayscale conversion (Rec. 709 weights).

use crate::config::CropSettings;
use crate::pipeline::store;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GrayImage, ImageError, ImageFormat, RgbImage};
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// Tight bounding box of content pixels as `(left, top, right, bottom)`,
/// right and bottom exclusive. `None` when no pixel qualifies.
pub fn content_bounds(gray: &GrayImage, threshold: i32) -> Option<(u32, u32, u32, u32)> {
    let (mut left, mut top) = (u32::MAX, u32::MAX);
    let (mut right, mut bottom) = (0u32, 0u32);
    let mut found = false;

    for (x, y, px) in gray.enumerate_pixels() {
        if i32::from(px.0[0]) <= threshold {
            found = true;
            left = left.min(x);
            top = top.min(y);
            right = right.max(x + 1);
            bottom = bottom.max(y + 1);
        }
    }
    found.then_some((left, top, right, bottom))
}

/// Crop `img` to its content box plus `margin` pixels on every side.
pub fn crop_whitespace(img: &DynamicImage, threshold: i32, margin: u32) -> DynamicImage {
    let gray = img.to_luma8();
    let Some((l, t, r, b)) = content_bounds(&gray, threshold) else {
        debug!("No content below threshold {threshold}, leaving image as is");
        return img.clone();
    };

    let (w, h) = (img.width(), img.height());
    let left = l.saturating_sub(margin);
    let top = t.saturating_sub(margin);
    let right = r.saturating_add(margin).min(w);
    let bottom = b.saturating_add(margin).min(h);

    debug!(
        "Crop {}x{} -> {}x{} at ({left}, {top})",
        w,
        h,
        right - left,
        bottom - top
    );
    img.crop_imm(left, top, right - left, bottom - top)
}

/// Drop any alpha channel or palette and return plain 8-bit RGB.
pub fn flatten_to_rgb(img: &DynamicImage) -> RgbImage {
    img.to_rgb8()
}

/// Crop a page file in place and rewrite it as RGB PNG.
///
/// The rewrite goes through [`store::write_atomic`], so a failure leaves the
/// original screenshot intact. Returns the new dimensions.
pub fn crop_file_in_place(path: &Path, crop: &CropSettings) -> Result<(u32, u32), ImageError> {
    let img = image::open(path)?;
    let cropped = crop_whitespace(&img, crop.threshold, crop.margin_px);
    let rgb = DynamicImage::ImageRgb8(flatten_to_rgb(&cropped));

    let mut buf = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    store::write_atomic(path, &buf)?;
    Ok((rgb.width(), rgb.height()))
}

/// Decode `src`, optionally crop it, flatten to RGB and write a JPEG to `dst`.
///
/// Returns the pixel dimensions of the written image; the assembler needs
/// them for the page box.
pub fn preprocess_to_jpeg(
    src: &Path,
    dst: &Path,
    crop: &CropSettings,
    quality: u8,
) -> Result<(u32, u32), ImageError> {
    let img = image::open(src)?;
    let img = if crop.enabled {
        crop_whitespace(&img, crop.threshold, crop.margin_px)
    } else {
        img
    };
    let rgb = flatten_to_rgb(&img);

    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality).encode_image(&rgb)?;
    std::fs::write(dst, &buf)?;
    Ok(rgb.dimensions())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, Rgba, RgbaImage};

    fn white_with_block(w: u32, h: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> DynamicImage {
        let mut img = RgbImage::from_pixel(w, h, Rgb([255, 255, 255]));
        for y in y0..y1 {
            for x in x0..x1 {
                img.put_pixel(x, y, Rgb([0, 0, 0]));
            }
        }
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn blank_image_is_unchanged() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 30, Rgb([255, 255, 255])));
        let out = crop_whitespace(&img, 248, 10);
        assert_eq!(out.dimensions(), (40, 30));
    }

    #[test]
    fn block_is_cropped_to_content_box() {
        let img = white_with_block(200, 200, 50, 50, 150, 150);
        let out = crop_whitespace(&img, 248, 0);
        assert_eq!((out.width(), out.height()), (100, 100));
    }

    #[test]
    fn margin_grows_box_and_is_clamped() {
        let img = white_with_block(200, 200, 50, 50, 150, 150);
        let out = crop_whitespace(&img, 248, 10);
        assert_eq!((out.width(), out.height()), (120, 120));

        // A margin larger than the border never exceeds the image.
        let out = crop_whitespace(&img, 248, 500);
        assert_eq!((out.width(), out.height()), (200, 200));
    }

    #[test]
    fn larger_margin_never_shrinks_the_result() {
        let img = white_with_block(120, 90, 30, 20, 70, 60);
        let mut last = 0;
        for margin in [0, 1, 5, 20, 100] {
            let out = crop_whitespace(&img, 248, margin);
            let area = out.width() * out.height();
            assert!(area >= last, "margin {margin} shrank the crop");
            last = area;
        }
    }

    #[test]
    fn negative_threshold_finds_no_content() {
        let img = white_with_block(50, 50, 10, 10, 20, 20);
        assert_eq!(crop_whitespace(&img, -1, 0).dimensions(), (50, 50));
    }

    #[test]
    fn threshold_255_treats_everything_as_content() {
        let img = white_with_block(50, 40, 10, 10, 20, 20);
        assert_eq!(crop_whitespace(&img, 255, 0).dimensions(), (50, 40));
    }

    #[test]
    fn light_grey_border_counts_as_background() {
        let mut img = RgbImage::from_pixel(60, 60, Rgb([252, 252, 252]));
        img.put_pixel(30, 30, Rgb([10, 10, 10]));
        let out = crop_whitespace(&DynamicImage::ImageRgb8(img), 248, 0);
        assert_eq!(out.dimensions(), (1, 1));
    }

    #[test]
    fn flatten_drops_alpha() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 128])));
        let rgb = flatten_to_rgb(&img);
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([10, 20, 30]));
    }

    #[test]
    fn crop_file_in_place_rewrites_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page_0001.png");
        white_with_block(80, 80, 20, 20, 40, 40).save(&path).unwrap();

        let dims = crop_file_in_place(&path, &CropSettings::default()).unwrap();
        assert_eq!(dims, (40, 40));
        assert_eq!(image::open(&path).unwrap().dimensions(), (40, 40));
    }

    #[test]
    fn preprocess_writes_rgb_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("in.png");
        let dst = dir.path().join("out.jpg");
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(30, 20, Rgba([0, 128, 0, 255])))
            .save(&src)
            .unwrap();

        let dims = preprocess_to_jpeg(&src, &dst, &CropSettings::disabled(), 92).unwrap();
        assert_eq!(dims, (30, 20));
        let decoded = image::open(&dst).unwrap();
        assert_eq!(decoded.dimensions(), (30, 20));
        assert_eq!(decoded.color(), image::ColorType::Rgb8);
    }

    #[test]
    fn preprocess_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("broken.png");
        std::fs::write(&src, b"definitely not a png").unwrap();
        let dst = dir.path().join("out.jpg");
        assert!(preprocess_to_jpeg(&src, &dst, &CropSettings::default(), 92).is_err());
    }
}
