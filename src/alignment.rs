//! Canonical face alignment.
//!
//! From a set of 2D facial landmarks this module estimates the similarity
//! transform that maps raw image coordinates into a canonical, frontally
//! cropped 224×224 frame. Warping the raw image through the *inverse* of
//! this transform yields the crop the synthesis model's identity encoder
//! expects.
//!
//! The fit is a least-squares similarity estimation (rotation, uniform
//! scale, translation) computed via SVD.

use nalgebra::{Matrix2, Matrix3, Vector2};

use crate::landmark::Landmarks;

/// Side length of the canonical crop frame, in pixels.
pub const CROP_RES: usize = 224;

/// Padding applied to the landmark bounding box before cropping.
const BOX_SCALE: f32 = 1.1;
const CROP_SCALE: f32 = 1.25;

/// Computes the 3×3 transform mapping raw image coordinates to the canonical
/// [`CROP_RES`]×[`CROP_RES`] crop frame.
///
/// The landmark bounding box is padded, squared up, and its corners are
/// mapped onto the corners of the crop frame. Deterministic: identical
/// landmarks produce a bit-identical matrix.
pub fn crop_transform(landmarks: &Landmarks) -> Matrix3<f32> {
    let (left, top, right, bottom) = landmarks.bounding_box();

    let old_size = (right - left + bottom - top) / 2.0 * BOX_SCALE;
    let center_x = right - (right - left) / 2.0;
    let center_y = bottom - (bottom - top) / 2.0;
    // Truncated to whole pixels, matching the crop the model was trained on.
    let size = (old_size * CROP_SCALE).floor();
    let half = size / 2.0;

    let src = [
        [center_x - half, center_y - half],
        [center_x - half, center_y + half],
        [center_x + half, center_y - half],
    ];
    let max = (CROP_RES - 1) as f32;
    let dst = [[0.0, 0.0], [0.0, max], [max, 0.0]];

    estimate_similarity(&src, &dst)
}

/// Estimates the similarity transform (uniform scale, rotation, translation)
/// mapping `src` points onto `dst` points in the least-squares sense.
///
/// Both slices must have the same nonzero length, with points correlated by
/// index.
pub fn estimate_similarity(src: &[[f32; 2]], dst: &[[f32; 2]]) -> Matrix3<f32> {
    assert_eq!(src.len(), dst.len());
    assert!(!src.is_empty());
    let n = src.len() as f32;

    let mean = |points: &[[f32; 2]]| {
        let sum = points
            .iter()
            .fold(Vector2::zeros(), |acc, &[x, y]| acc + Vector2::new(x, y));
        sum / n
    };
    let src_mean = mean(src);
    let dst_mean = mean(dst);

    let mut covariance = Matrix2::zeros();
    let mut src_variance = 0.0;
    for (&[sx, sy], &[dx, dy]) in src.iter().zip(dst) {
        let s = Vector2::new(sx, sy) - src_mean;
        let d = Vector2::new(dx, dy) - dst_mean;
        covariance += d * s.transpose() / n;
        src_variance += s.norm_squared() / n;
    }

    if src_variance == 0.0 {
        // All source points coincide; only the translation is recoverable.
        let mut translation = Matrix3::identity();
        translation[(0, 2)] = dst_mean.x - src_mean.x;
        translation[(1, 2)] = dst_mean.y - src_mean.y;
        return translation;
    }

    let svd = covariance.svd(true, true);
    let u = svd.u.expect("SVD of a 2x2 matrix did not converge");
    let v_t = svd.v_t.expect("SVD of a 2x2 matrix did not converge");

    // Reflection guard: force a proper rotation when the best orthogonal fit
    // would mirror the points.
    let mut sign = Matrix2::identity();
    if (u * v_t).determinant() < 0.0 {
        sign[(1, 1)] = -1.0;
    }

    let rotation = u * sign * v_t;
    let scale = (svd.singular_values[0] * sign[(0, 0)] + svd.singular_values[1] * sign[(1, 1)])
        / src_variance;
    let translation = dst_mean - scale * rotation * src_mean;

    let mut transform = Matrix3::identity();
    transform
        .fixed_view_mut::<2, 2>(0, 0)
        .copy_from(&(scale * rotation));
    transform[(0, 2)] = translation.x;
    transform[(1, 2)] = translation.y;
    transform
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn apply(t: &Matrix3<f32>, p: [f32; 2]) -> [f32; 2] {
        let v = t * nalgebra::Vector3::new(p[0], p[1], 1.0);
        [v.x, v.y]
    }

    fn sample_landmarks() -> Landmarks {
        Landmarks::from_positions(vec![
            [80.0, 100.0],
            [176.0, 98.0],
            [128.0, 150.0],
            [96.0, 190.0],
            [160.0, 192.0],
        ])
    }

    #[test]
    fn similarity_maps_matched_points() {
        // Pure translation plus doubling.
        let src = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
        let dst = [[10.0, 5.0], [12.0, 5.0], [10.0, 7.0]];
        let t = estimate_similarity(&src, &dst);
        for (s, d) in src.iter().zip(&dst) {
            let mapped = apply(&t, *s);
            assert_relative_eq!(mapped[0], d[0], epsilon = 1e-4);
            assert_relative_eq!(mapped[1], d[1], epsilon = 1e-4);
        }
    }

    #[test]
    fn similarity_recovers_rotation() {
        // 90° counter-clockwise about the origin.
        let src = [[1.0, 0.0], [0.0, 1.0], [-1.0, 0.0], [0.0, -1.0]];
        let dst = [[0.0, 1.0], [-1.0, 0.0], [0.0, -1.0], [1.0, 0.0]];
        let t = estimate_similarity(&src, &dst);
        let mapped = apply(&t, [2.0, 0.0]);
        assert_relative_eq!(mapped[0], 0.0, epsilon = 1e-4);
        assert_relative_eq!(mapped[1], 2.0, epsilon = 1e-4);
    }

    #[test]
    fn crop_transform_is_deterministic() {
        let lms = sample_landmarks();
        let a = crop_transform(&lms);
        let b = crop_transform(&lms);
        assert_eq!(a, b);
    }

    #[test]
    fn crop_transform_maps_padded_box_to_frame_corners() {
        let lms = sample_landmarks();
        let t = crop_transform(&lms);

        let (left, top, right, bottom) = lms.bounding_box();
        let old_size = (right - left + bottom - top) / 2.0 * BOX_SCALE;
        let half = (old_size * CROP_SCALE).floor() / 2.0;
        let cx = right - (right - left) / 2.0;
        let cy = bottom - (bottom - top) / 2.0;

        let corner = apply(&t, [cx - half, cy - half]);
        assert_relative_eq!(corner[0], 0.0, epsilon = 1e-3);
        assert_relative_eq!(corner[1], 0.0, epsilon = 1e-3);

        let corner = apply(&t, [cx + half, cy + half]);
        assert_relative_eq!(corner[0], (CROP_RES - 1) as f32, epsilon = 1e-2);
        assert_relative_eq!(corner[1], (CROP_RES - 1) as f32, epsilon = 1e-2);
    }

    #[test]
    fn coincident_points_fall_back_to_translation() {
        let src = [[3.0, 4.0], [3.0, 4.0]];
        let dst = [[7.0, 9.0], [7.0, 9.0]];
        let t = estimate_similarity(&src, &dst);
        let mapped = apply(&t, [3.0, 4.0]);
        assert_relative_eq!(mapped[0], 7.0);
        assert_relative_eq!(mapped[1], 9.0);
    }
}
