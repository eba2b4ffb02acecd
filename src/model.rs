//! Head synthesis model interface.
//!
//! The synthesis network is an external collaborator: its internals are
//! opaque to this crate and it is consumed strictly through [`HeadModel`].
//! Every entry point runs in inference mode and returns a [`Prediction`],
//! a full-resolution image in `[-1, 1]` plus a soft occupancy mask in
//! `[0, 1]`.

use ndarray::{Array2, Array3, Array4, ArrayD};

use crate::preprocess::FrameInput;
use crate::Result;

pub mod onnx;

/// Dimensionality of the shape coefficient vector.
pub const SHAPE_DIMS: usize = 100;
/// Dimensionality of the expression coefficient vector.
pub const EXP_DIMS: usize = 100;
/// Dimensionality of the pose vector (3 rotation + 3 jaw components).
pub const POSE_DIMS: usize = 6;

/// Index of the yaw rotation component within a pose vector.
pub const POSE_YAW: usize = 1;
/// Index of the jaw-opening component within a pose vector.
pub const POSE_JAW: usize = 3;

/// Returns the neutral (all-zero) shape coefficient vector.
pub fn neutral_shape() -> Array2<f32> {
    Array2::zeros((1, SHAPE_DIMS))
}

/// Returns the neutral (all-zero) expression coefficient vector.
pub fn neutral_exp() -> Array2<f32> {
    Array2::zeros((1, EXP_DIMS))
}

/// Returns the neutral (all-zero) pose vector.
pub fn neutral_pose() -> Array2<f32> {
    Array2::zeros((1, POSE_DIMS))
}

/// Explicit low-dimensional controls for coefficient-conditioned generation.
///
/// Unset vectors default to the neutral zero vector of the matching
/// dimensionality. Callers that want a coefficient carried across several
/// generations pass the same vector in each time; nothing is remembered
/// between calls.
#[derive(Debug, Clone, Default)]
pub struct Coefficients {
    /// `(1, 100)` shape coefficients.
    pub shape: Option<Array2<f32>>,
    /// `(1, 100)` expression coefficients.
    pub exp: Option<Array2<f32>>,
    /// `(1, 6)` pose vector.
    pub pose: Option<Array2<f32>>,
}

/// The outcome of one synthesis pass.
#[derive(Debug, Clone)]
pub struct Prediction {
    /// `(1, 3, 256, 256)` predicted image in `[-1, 1]`.
    pub image: Array4<f32>,
    /// `(1, 256, 256)` soft occupancy mask in `[0, 1]`.
    pub mask: Array3<f32>,
}

/// Precomputed per-source identity data for mesh-driven generation.
///
/// Encoding a source image is expensive; this bundle is computed once per
/// run and reused for every driving mesh. The tensors are opaque to the
/// caller and are handed back to the model verbatim.
#[derive(Debug, Clone)]
pub struct SourceIdentity {
    /// Source head vertex geometry.
    pub verts: ArrayD<f32>,
    /// Shape/appearance code of the source identity.
    pub code: ArrayD<f32>,
    /// Per-vertex visibility/occlusion mask.
    pub visibility: ArrayD<f32>,
}

/// The head synthesis network, behind its documented interface.
pub trait HeadModel {
    /// Reenacts the source identity with the driving frame's expression and
    /// pose. `cross_id` marks the source and driving images as different
    /// identities.
    fn reenact(&self, src: &FrameInput, drv: &FrameInput, cross_id: bool) -> Result<Prediction>;

    /// One-time encoding of the source identity for reuse across many
    /// mesh-driven generations.
    fn encode_identity(&self, src: &FrameInput) -> Result<SourceIdentity>;

    /// Generates a frame whose head geometry matches `target_verts`
    /// (`(1, N, 3)`).
    fn generate_from_mesh(
        &self,
        src: &FrameInput,
        identity: &SourceIdentity,
        target_verts: &Array3<f32>,
    ) -> Result<Prediction>;

    /// Generates a frame from explicit shape/expression/pose coefficients.
    fn generate_from_coefs(&self, src: &FrameInput, coefs: &Coefficients) -> Result<Prediction>;
}
