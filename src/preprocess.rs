//! Source and driving image preparation.
//!
//! [`preprocess`] turns an image file into everything a single model call
//! needs: the normalized full frame, the canonically aligned crop, and the
//! alignment transform relating the two. The transform is computed once per
//! image and reused for every driving frame generated from it.

use std::path::Path;

use image::RgbImage;
use nalgebra::{Matrix3, Vector3};
use ndarray::{Array3, Array4, Axis};

use crate::alignment::{self, CROP_RES};
use crate::image::{load, resize_exact, to_chw_tensor};
use crate::landmark::LandmarkDetector;
use crate::{Error, Result};

/// Side length of the full model frame, in pixels.
pub const FULL_RES: usize = 256;

/// A fully prepared model input frame.
///
/// All tensors carry a leading batch dimension of 1.
#[derive(Debug, Clone)]
pub struct FrameInput {
    /// `(1, 3, 256, 256)` full frame in `[-1, 1]`.
    pub full: Array4<f32>,
    /// `(1, 3, 224, 224)` aligned crop in `[0, 1]`.
    pub crop: Array4<f32>,
    /// Transform from raw frame coordinates to crop coordinates.
    pub tform: Matrix3<f32>,
}

impl FrameInput {
    /// Returns the alignment transform as a `(1, 3, 3)` tensor, row-major.
    pub fn tform_tensor(&self) -> Array3<f32> {
        Array3::from_shape_fn((1, 3, 3), |(_, row, col)| self.tform[(row, col)])
    }
}

/// Prepares an image file for inference.
///
/// 1. Loads the image and stretches it to [`FULL_RES`]² (aspect ratio is not
///    preserved).
/// 2. Runs the landmark detector; an image without a detectable face is a
///    hard [`Error::NoFaceDetected`] failure.
/// 3. Estimates the alignment transform and warps the frame through its
///    inverse into the [`CROP_RES`]² crop.
/// 4. Normalizes the full frame to `[-1, 1]`, keeps the crop in `[0, 1]`,
///    and adds the batch dimension.
pub fn preprocess(path: &Path, detector: &dyn LandmarkDetector) -> Result<FrameInput> {
    let image = load(path)?;
    let image = resize_exact(&image, FULL_RES as u32, FULL_RES as u32);

    let landmarks = detector
        .detect(&image)?
        .ok_or_else(|| Error::NoFaceDetected {
            path: path.to_owned(),
        })?;
    let tform = alignment::crop_transform(&landmarks);

    let crop = warp_crop(&image, &tform);
    let full = to_chw_tensor(&image, -1.0..=1.0);

    Ok(FrameInput {
        full: full.insert_axis(Axis(0)),
        crop: crop.insert_axis(Axis(0)),
        tform,
    })
}

/// Warps `image` through the inverse of `tform` into a `(3, 224, 224)` crop
/// tensor in `[0, 1]`.
///
/// Samples bilinearly; coordinates falling outside the source frame read as
/// zero.
pub fn warp_crop(image: &RgbImage, tform: &Matrix3<f32>) -> Array3<f32> {
    let inverse = tform
        .try_inverse()
        .expect("alignment transform is invertible");

    Array3::from_shape_fn((3, CROP_RES, CROP_RES), |(c, y, x)| {
        let p = inverse * Vector3::new(x as f32, y as f32, 1.0);
        sample_bilinear(image, c, p.x, p.y)
    })
}

fn sample_bilinear(image: &RgbImage, channel: usize, x: f32, y: f32) -> f32 {
    let (w, h) = (image.width() as i64, image.height() as i64);
    let read = |xi: i64, yi: i64| {
        if xi < 0 || yi < 0 || xi >= w || yi >= h {
            0.0
        } else {
            image.get_pixel(xi as u32, yi as u32).0[channel] as f32 / 255.0
        }
    };

    let (x0, y0) = (x.floor(), y.floor());
    let (fx, fy) = (x - x0, y - y0);
    let (x0, y0) = (x0 as i64, y0 as i64);

    read(x0, y0) * (1.0 - fx) * (1.0 - fy)
        + read(x0 + 1, y0) * fx * (1.0 - fy)
        + read(x0, y0 + 1) * (1.0 - fx) * fy
        + read(x0 + 1, y0 + 1) * fx * fy
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::landmark::Landmarks;

    struct FixedDetector(Option<Landmarks>);

    impl LandmarkDetector for FixedDetector {
        fn detect(&self, _image: &RgbImage) -> Result<Option<Landmarks>> {
            Ok(self.0.clone())
        }
    }

    fn spread_landmarks() -> Landmarks {
        Landmarks::from_positions(vec![
            [80.0, 90.0],
            [176.0, 90.0],
            [128.0, 140.0],
            [100.0, 180.0],
            [156.0, 182.0],
        ])
    }

    fn temp_dir() -> PathBuf {
        static NEXT: AtomicUsize = AtomicUsize::new(0);
        let dir = std::env::temp_dir().join(format!(
            "reenact-preprocess-{}-{}",
            std::process::id(),
            NEXT.fetch_add(1, Ordering::SeqCst),
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_test_image(path: &Path) {
        let image = RgbImage::from_fn(64, 48, |x, y| {
            image::Rgb([(x * 4) as u8, (y * 5) as u8, 128])
        });
        crate::image::save(&image, path).unwrap();
    }

    #[test]
    fn preprocess_produces_batched_tensors() {
        let dir = temp_dir();
        let path = dir.join("face.png");
        write_test_image(&path);

        let input = preprocess(&path, &FixedDetector(Some(spread_landmarks()))).unwrap();
        assert_eq!(input.full.shape(), &[1, 3, FULL_RES, FULL_RES]);
        assert_eq!(input.crop.shape(), &[1, 3, CROP_RES, CROP_RES]);
        assert!(input.full.iter().all(|&v| (-1.0..=1.0).contains(&v)));
        assert!(input.crop.iter().all(|&v| (0.0..=1.0).contains(&v)));
        assert_eq!(input.tform_tensor().shape(), &[1, 3, 3]);
        assert_eq!(input.tform_tensor()[[0, 2, 2]], input.tform[(2, 2)]);
    }

    #[test]
    fn missing_face_is_a_hard_failure() {
        let dir = temp_dir();
        let path = dir.join("empty.png");
        write_test_image(&path);

        let err = preprocess(&path, &FixedDetector(None)).unwrap_err();
        assert!(matches!(err, Error::NoFaceDetected { .. }));
    }

    #[test]
    fn missing_file_is_an_image_load_failure() {
        let dir = temp_dir();
        let err = preprocess(
            &dir.join("nonexistent.png"),
            &FixedDetector(Some(spread_landmarks())),
        )
        .unwrap_err();
        assert!(matches!(err, Error::ImageLoad { .. }));
    }

    #[test]
    fn identity_warp_reproduces_source_pixels() {
        let image = RgbImage::from_fn(CROP_RES as u32, CROP_RES as u32, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 0])
        });
        let crop = warp_crop(&image, &Matrix3::identity());
        assert_eq!(crop[[0, 0, 10]], 10.0 / 255.0);
        assert_eq!(crop[[1, 20, 0]], 20.0 / 255.0);
        assert_eq!(crop[[2, 5, 5]], 0.0);
    }

    #[test]
    fn out_of_bounds_samples_are_zero() {
        let image = RgbImage::from_pixel(8, 8, image::Rgb([255, 255, 255]));
        // Shift sampling far outside the 8x8 source.
        let mut tform = Matrix3::identity();
        tform[(0, 2)] = -1000.0;
        let crop = warp_crop(&image, &tform);
        assert_eq!(crop[[0, 0, 0]], 0.0);
    }
}
