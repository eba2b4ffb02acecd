//! Mask compositing.
//!
//! The predicted image is rescaled from `[-1, 1]` to `[0, 1]` and blended
//! over a flat white fill using the predicted occupancy mask as per-pixel
//! opacity: `out = round(255 · (p · m + (1 − m)))`. No background image is
//! ever composited in; pixels the mask rejects are pure white.

use image::{Rgb, RgbImage};

use crate::model::Prediction;
use crate::preprocess::FULL_RES;

/// Cutoff applied to the mask in [`MaskMode::Hard`].
///
/// Strictly greater-than: a mask value exactly at the cutoff is background.
pub const HARD_MASK_THRESHOLD: f32 = 0.6;

/// How the predicted occupancy mask is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskMode {
    /// Use the mask as continuous per-pixel opacity.
    Soft,
    /// Binarize the mask at [`HARD_MASK_THRESHOLD`] first.
    Hard,
}

/// Blends a prediction over the white fill, yielding a displayable 8-bit
/// RGB image.
pub fn composite(prediction: &Prediction, mode: MaskMode) -> RgbImage {
    let image = &prediction.image;
    let mask = &prediction.mask;
    assert_eq!(image.shape(), [1, 3, FULL_RES, FULL_RES]);
    assert_eq!(mask.shape(), [1, FULL_RES, FULL_RES]);

    RgbImage::from_fn(FULL_RES as u32, FULL_RES as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        let m = match mode {
            MaskMode::Soft => mask[[0, y, x]],
            MaskMode::Hard => {
                if mask[[0, y, x]] > HARD_MASK_THRESHOLD {
                    1.0
                } else {
                    0.0
                }
            }
        };

        let channel = |c: usize| {
            let p = 0.5 * (image[[0, c, y, x]] + 1.0);
            let v = p * m + (1.0 - m);
            (255.0 * v).round().clamp(0.0, 255.0) as u8
        };
        Rgb([channel(0), channel(1), channel(2)])
    })
}
