//! Image loading, saving, and tensor conversion.
//!
//! Image files are decoded into [`RgbImage`] buffers; everything the model
//! touches is converted to `f32` tensors through [`to_chw_tensor`], which
//! linearly maps sRGB bytes into a caller-chosen target range.

use std::ops::RangeInclusive;
use std::path::Path;

use image::{imageops::FilterType, RgbImage};
use ndarray::Array3;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy)]
#[non_exhaustive]
enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("jpg" | "jpeg") => Ok(Self::Jpeg),
            Some("png") => Ok(Self::Png),
            _ => Err(Error::ImageLoad {
                path: path.to_owned(),
                message: "path must have one of the supported extensions (jpg, jpeg, png)".into(),
            }),
        }
    }

    fn as_image_crate_format(self) -> image::ImageFormat {
        match self {
            Self::Jpeg => image::ImageFormat::Jpeg,
            Self::Png => image::ImageFormat::Png,
        }
    }
}

/// Loads an image from the filesystem.
///
/// The path must have a supported file extension (`jpeg`, `jpg` or `png`).
/// The alpha channel, if any, is discarded.
pub fn load<P: AsRef<Path>>(path: P) -> Result<RgbImage> {
    load_impl(path.as_ref())
}

fn load_impl(path: &Path) -> Result<RgbImage> {
    let format = ImageFormat::from_path(path)?;
    let data = std::fs::read(path).map_err(|e| Error::ImageLoad {
        path: path.to_owned(),
        message: e.to_string(),
    })?;
    let image = image::load_from_memory_with_format(&data, format.as_image_crate_format())
        .map_err(|e| Error::ImageLoad {
            path: path.to_owned(),
            message: e.to_string(),
        })?;
    Ok(image.to_rgb8())
}

/// Saves an image to the filesystem, with the format chosen by extension.
pub fn save<P: AsRef<Path>>(image: &RgbImage, path: P) -> Result<()> {
    save_impl(image, path.as_ref())
}

fn save_impl(image: &RgbImage, path: &Path) -> Result<()> {
    ImageFormat::from_path(path).map_err(|_| Error::FileWrite {
        path: path.to_owned(),
        message: "path must have one of the supported extensions (jpg, jpeg, png)".into(),
    })?;
    image.save(path).map_err(|e| Error::FileWrite {
        path: path.to_owned(),
        message: e.to_string(),
    })
}

/// Resizes `image` to exactly `width`×`height`, ignoring its aspect ratio.
pub fn resize_exact(image: &RgbImage, width: u32, height: u32) -> RgbImage {
    if image.dimensions() == (width, height) {
        return image.clone();
    }
    image::imageops::resize(image, width, height, FilterType::Triangle)
}

/// Converts an image to a channel-first `(3, H, W)` tensor, mapping sRGB
/// values linearly into `target_range`.
///
/// No batch dimension is added; callers insert it once the tensor is final.
pub fn to_chw_tensor(image: &RgbImage, target_range: RangeInclusive<f32>) -> Array3<f32> {
    let start = *target_range.start();
    let end = *target_range.end();
    assert!(end > start);
    let adjust_range = (end - start) / 255.0;

    let (w, h) = image.dimensions();
    Array3::from_shape_fn((3, h as usize, w as usize), |(c, y, x)| {
        image.get_pixel(x as u32, y as u32).0[c] as f32 * adjust_range + start
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chw_tensor_range_mapping() {
        let mut image = RgbImage::new(2, 1);
        image.put_pixel(0, 0, image::Rgb([0, 0, 0]));
        image.put_pixel(1, 0, image::Rgb([255, 128, 0]));

        let t = to_chw_tensor(&image, -1.0..=1.0);
        assert_eq!(t.shape(), &[3, 1, 2]);
        assert_eq!(t[[0, 0, 0]], -1.0);
        assert_eq!(t[[0, 0, 1]], 1.0);
        assert_eq!(t[[2, 0, 1]], -1.0);

        let t = to_chw_tensor(&image, 0.0..=1.0);
        assert_eq!(t[[0, 0, 0]], 0.0);
        assert_eq!(t[[0, 0, 1]], 1.0);
    }

    #[test]
    fn resize_noop_keeps_pixels() {
        let mut image = RgbImage::new(2, 2);
        image.put_pixel(1, 1, image::Rgb([9, 8, 7]));
        let resized = resize_exact(&image, 2, 2);
        assert_eq!(resized.get_pixel(1, 1).0, [9, 8, 7]);
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let err = load("portrait.webp").unwrap_err();
        assert!(matches!(err, Error::ImageLoad { .. }));
    }
}
