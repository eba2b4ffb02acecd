//! Driver orchestration.
//!
//! Three alternate pipelines, all linear and all terminal: face-driven (one
//! reenacted image), mesh-driven (a directory of meshes becomes a directory
//! of frames), and coefficient-driven (parametric sweeps become looping GIF
//! animations). Each sequences preprocessing, one or more model calls, and
//! compositing, then persists the result. A failure anywhere propagates and
//! ends the run; there is no retry and no partial file for the failing item.

use std::f32::consts::{FRAC_PI_4, PI};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, DynamicImage, Frame, RgbImage};
use itertools::Itertools;
use ndarray::Axis;

use crate::composite::{composite, MaskMode};
use crate::landmark::{LandmarkDetector, Landmarker};
use crate::mesh;
use crate::model::onnx::{OnnxHeadModel, LANDMARK_GRAPH};
use crate::model::{self, Coefficients, HeadModel, POSE_JAW, POSE_YAW};
use crate::preprocess::preprocess;
use crate::{Error, Result};

/// Steps in the shape and expression sweeps.
pub const SHAPE_SWEEP_STEPS: usize = 10;
/// Steps in the yaw and jaw pose sweeps.
pub const POSE_SWEEP_STEPS: usize = 12;

/// Display duration of one animation frame.
const FRAME_DELAY_MS: u32 = 500;

/// Everything an orchestrator needs, constructed once at startup.
///
/// Holds the loaded synthesis model, the landmark detector, and the mask
/// mode. Passed by reference into each pipeline; nothing here is global.
pub struct Context {
    model: Box<dyn HeadModel>,
    detector: Box<dyn LandmarkDetector>,
    mask_mode: MaskMode,
}

impl Context {
    /// Builds a context from already constructed collaborators.
    pub fn new(
        model: Box<dyn HeadModel>,
        detector: Box<dyn LandmarkDetector>,
        mask_mode: MaskMode,
    ) -> Self {
        Self {
            model,
            detector,
            mask_mode,
        }
    }

    /// Loads the synthesis model and landmark detector from a checkpoint
    /// bundle directory.
    pub fn load(checkpoint: &Path, mask_mode: MaskMode) -> Result<Self> {
        let model = OnnxHeadModel::load(checkpoint)?;
        let summary = model.summary();
        log::debug!(
            "checkpoint `{}`: entry points [{}] available",
            checkpoint.display(),
            summary.loaded.iter().join(", "),
        );

        let detector = Landmarker::from_path(checkpoint.join(LANDMARK_GRAPH))?;
        Ok(Self::new(Box::new(model), Box::new(detector), mask_mode))
    }

    fn detector(&self) -> &dyn LandmarkDetector {
        self.detector.as_ref()
    }
}

/// Reenacts `src` with the expression and pose of the face in `drv`, writing
/// a single composited image to `out`.
pub fn drive_by_face(ctx: &Context, src: &Path, drv: &Path, out: &Path) -> Result<()> {
    let src_input = preprocess(src, ctx.detector())?;
    let drv_input = preprocess(drv, ctx.detector())?;

    let prediction = ctx.model.reenact(&src_input, &drv_input, true)?;
    let frame = composite(&prediction, ctx.mask_mode);
    crate::image::save(&frame, out)?;
    log::debug!("wrote `{}`", out.display());
    Ok(())
}

/// Generates one frame per `.obj` mesh in `mesh_dir`, writing frames to
/// `{out_dir}/{experiment}/{mesh_stem}.jpg`.
///
/// The source image is preprocessed and its identity encoded exactly once,
/// up front; meshes are processed in lexicographic file name order. A
/// failing mesh aborts the remainder of the batch (frames already written
/// stay on disk).
pub fn drive_by_mesh(
    ctx: &Context,
    src: &Path,
    mesh_dir: &Path,
    out_dir: &Path,
    experiment: &str,
) -> Result<()> {
    let target_dir = out_dir.join(experiment);
    std::fs::create_dir_all(&target_dir).map_err(|e| write_err(&target_dir, e))?;

    let src_input = preprocess(src, ctx.detector())?;
    let identity = ctx.model.encode_identity(&src_input)?;

    let mesh_paths: Vec<PathBuf> = std::fs::read_dir(mesh_dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?
        .into_iter()
        .filter(|path| path.extension().map_or(false, |ext| ext == "obj"))
        .sorted()
        .collect();
    if mesh_paths.is_empty() {
        log::warn!("no `.obj` meshes found in `{}`", mesh_dir.display());
    }

    for path in &mesh_paths {
        let stem = path
            .file_stem()
            .unwrap_or_default()
            .to_string_lossy()
            .into_owned();
        let verts = mesh::load_verts(path)?.insert_axis(Axis(0));

        let prediction = ctx.model.generate_from_mesh(&src_input, &identity, &verts)?;
        let frame = composite(&prediction, ctx.mask_mode);
        let out = target_dir.join(format!("{stem}.jpg"));
        crate::image::save(&frame, &out)?;
        log::debug!("wrote `{}`", out.display());
    }

    log::debug!("mesh-driven run complete: {} frames", mesh_paths.len());
    Ok(())
}

/// Runs the four coefficient sweeps (shape, expression, yaw, jaw opening)
/// and writes each as a looping animation into `out_dir`.
///
/// The shape and expression sweeps share one neutral pose vector created up
/// front; the yaw and jaw sweeps build a fresh pose vector on every step,
/// varying only their own component. Coefficients a sweep does not set stay
/// at their neutral defaults.
pub fn drive_by_coefs(ctx: &Context, src: &Path, out_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(out_dir).map_err(|e| write_err(out_dir, e))?;
    let src_input = preprocess(src, ctx.detector())?;

    let shared_pose = model::neutral_pose();

    let mut frames = Vec::with_capacity(SHAPE_SWEEP_STEPS);
    for step in 0..SHAPE_SWEEP_STEPS {
        let mut shape = model::neutral_shape();
        shape[[0, 0]] = shape_sweep_value(step);
        let coefs = Coefficients {
            shape: Some(shape),
            pose: Some(shared_pose.clone()),
            ..Default::default()
        };
        let prediction = ctx.model.generate_from_coefs(&src_input, &coefs)?;
        frames.push(composite(&prediction, ctx.mask_mode));
    }
    write_animation(&frames, &out_dir.join("shape.gif"))?;

    let mut frames = Vec::with_capacity(SHAPE_SWEEP_STEPS);
    for step in 0..SHAPE_SWEEP_STEPS {
        let mut exp = model::neutral_exp();
        exp[[0, 0]] = shape_sweep_value(step);
        let coefs = Coefficients {
            exp: Some(exp),
            pose: Some(shared_pose.clone()),
            ..Default::default()
        };
        let prediction = ctx.model.generate_from_coefs(&src_input, &coefs)?;
        frames.push(composite(&prediction, ctx.mask_mode));
    }
    write_animation(&frames, &out_dir.join("exp.gif"))?;

    let mut frames = Vec::with_capacity(POSE_SWEEP_STEPS);
    for step in 0..POSE_SWEEP_STEPS {
        let mut pose = model::neutral_pose();
        pose[[0, POSE_YAW]] = yaw_sweep_value(step);
        let coefs = Coefficients {
            pose: Some(pose),
            ..Default::default()
        };
        let prediction = ctx.model.generate_from_coefs(&src_input, &coefs)?;
        frames.push(composite(&prediction, ctx.mask_mode));
    }
    write_animation(&frames, &out_dir.join("pose.gif"))?;

    let mut frames = Vec::with_capacity(POSE_SWEEP_STEPS);
    for step in 0..POSE_SWEEP_STEPS {
        let mut pose = model::neutral_pose();
        pose[[0, POSE_JAW]] = jaw_sweep_value(step);
        let coefs = Coefficients {
            pose: Some(pose),
            ..Default::default()
        };
        let prediction = ctx.model.generate_from_coefs(&src_input, &coefs)?;
        frames.push(composite(&prediction, ctx.mask_mode));
    }
    write_animation(&frames, &out_dir.join("jaw.gif"))?;

    Ok(())
}

/// Shape/expression coefficient at `step` of the sweep: `2·step / 10`.
pub fn shape_sweep_value(step: usize) -> f32 {
    2.0 * step as f32 / SHAPE_SWEEP_STEPS as f32
}

/// Yaw rotation at `step` of the pose sweep, spanning `[-π/4, +π/4)`.
pub fn yaw_sweep_value(step: usize) -> f32 {
    -FRAC_PI_4 + step as f32 * PI / 24.0
}

/// Jaw opening at `step` of the jaw sweep, spanning `[0, 0.5)`.
pub fn jaw_sweep_value(step: usize) -> f32 {
    0.5 * step as f32 / POSE_SWEEP_STEPS as f32
}

/// Encodes `frames` as an infinitely looping GIF at [`FRAME_DELAY_MS`] per
/// frame.
fn write_animation(frames: &[RgbImage], path: &Path) -> Result<()> {
    let file = File::create(path).map_err(|e| write_err(path, e))?;
    let mut encoder = GifEncoder::new(BufWriter::new(file));
    encoder
        .set_repeat(Repeat::Infinite)
        .map_err(|e| write_err(path, e))?;

    for frame in frames {
        let rgba = DynamicImage::ImageRgb8(frame.clone()).to_rgba8();
        let frame = Frame::from_parts(rgba, 0, 0, Delay::from_numer_denom_ms(FRAME_DELAY_MS, 1));
        encoder.encode_frame(frame).map_err(|e| write_err(path, e))?;
    }

    log::debug!("wrote `{}` ({} frames)", path.display(), frames.len());
    Ok(())
}

fn write_err(path: &Path, e: impl std::fmt::Display) -> Error {
    Error::FileWrite {
        path: path.to_owned(),
        message: e.to_string(),
    }
}
