//! End-to-end checks of the public pipeline surface, with the synthesis
//! model and landmark detector replaced by deterministic stand-ins.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use image::RgbImage;
use ndarray::{Array3, Array4};

use reenact::composite::MaskMode;
use reenact::drive::{self, Context};
use reenact::landmark::{LandmarkDetector, Landmarks};
use reenact::model::{Coefficients, HeadModel, Prediction, SourceIdentity};
use reenact::preprocess::{FrameInput, FULL_RES};
use reenact::Result;

struct GridDetector;

impl LandmarkDetector for GridDetector {
    fn detect(&self, _image: &RgbImage) -> Result<Option<Landmarks>> {
        Ok(Some(Landmarks::from_positions(vec![
            [96.0, 88.0],
            [160.0, 88.0],
            [128.0, 132.0],
            [104.0, 176.0],
            [152.0, 176.0],
        ])))
    }
}

/// Echoes the source crop's mean brightness into a flat prediction, so the
/// output image provably depends on the preprocessed input.
struct EchoModel;

impl EchoModel {
    fn prediction(&self, src: &FrameInput) -> Prediction {
        let mean = src.crop.mean().unwrap_or(0.0);
        Prediction {
            image: Array4::from_elem((1, 3, FULL_RES, FULL_RES), mean * 2.0 - 1.0),
            mask: Array3::from_elem((1, FULL_RES, FULL_RES), 1.0),
        }
    }
}

impl HeadModel for EchoModel {
    fn reenact(&self, src: &FrameInput, _drv: &FrameInput, _cross_id: bool) -> Result<Prediction> {
        Ok(self.prediction(src))
    }

    fn encode_identity(&self, _src: &FrameInput) -> Result<SourceIdentity> {
        Ok(SourceIdentity {
            verts: Array3::<f32>::zeros((1, 2, 3)).into_dyn(),
            code: Array3::<f32>::zeros((1, 1, 4)).into_dyn(),
            visibility: Array3::<f32>::zeros((1, 1, 2)).into_dyn(),
        })
    }

    fn generate_from_mesh(
        &self,
        src: &FrameInput,
        _identity: &SourceIdentity,
        _target_verts: &Array3<f32>,
    ) -> Result<Prediction> {
        Ok(self.prediction(src))
    }

    fn generate_from_coefs(&self, src: &FrameInput, _coefs: &Coefficients) -> Result<Prediction> {
        Ok(self.prediction(src))
    }
}

fn temp_dir() -> PathBuf {
    static NEXT: AtomicUsize = AtomicUsize::new(0);
    let dir = std::env::temp_dir().join(format!(
        "reenact-pipeline-{}-{}",
        std::process::id(),
        NEXT.fetch_add(1, Ordering::SeqCst),
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_portrait(path: &Path, brightness: u8) {
    let image = RgbImage::from_pixel(48, 48, image::Rgb([brightness; 3]));
    image.save(path).unwrap();
}

#[test]
fn face_driven_run_produces_a_plausible_frame() {
    let dir = temp_dir();
    let src = dir.join("src.png");
    let drv = dir.join("drv.png");
    let out = dir.join("out.png");
    write_portrait(&src, 200);
    write_portrait(&drv, 10);

    let ctx = Context::new(Box::new(EchoModel), Box::new(GridDetector), MaskMode::Soft);
    drive::drive_by_face(&ctx, &src, &drv, &out).unwrap();

    let written = image::open(&out).unwrap().to_rgb8();
    assert_eq!(written.dimensions(), (FULL_RES as u32, FULL_RES as u32));
    // A bright source portrait must come back bright, not white-filled.
    let p = written.get_pixel(128, 128).0;
    assert!(p[0] > 128, "expected a bright prediction, got {p:?}");
    assert_eq!(p[0], p[1]);
}

#[test]
fn mesh_driven_run_writes_sorted_frames() {
    let dir = temp_dir();
    let src = dir.join("src.png");
    write_portrait(&src, 128);

    let mesh_dir = dir.join("meshes");
    std::fs::create_dir_all(&mesh_dir).unwrap();
    for name in ["zeta.obj", "alpha.obj", "mid.obj"] {
        std::fs::write(mesh_dir.join(name), "v 0.0 0.0 0.0\n").unwrap();
    }

    let ctx = Context::new(Box::new(EchoModel), Box::new(GridDetector), MaskMode::Soft);
    drive::drive_by_mesh(&ctx, &src, &mesh_dir, &dir.join("out"), "run").unwrap();

    for name in ["alpha.jpg", "mid.jpg", "zeta.jpg"] {
        assert!(dir.join("out").join("run").join(name).exists());
    }
}

#[test]
fn coefficient_run_writes_four_animations() {
    let dir = temp_dir();
    let src = dir.join("src.png");
    write_portrait(&src, 90);

    let out_dir = dir.join("anim");
    let ctx = Context::new(Box::new(EchoModel), Box::new(GridDetector), MaskMode::Hard);
    drive::drive_by_coefs(&ctx, &src, &out_dir).unwrap();

    for name in ["shape.gif", "exp.gif", "pose.gif", "jaw.gif"] {
        assert!(out_dir.join(name).exists(), "missing {name}");
    }
}
