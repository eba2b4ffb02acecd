use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;
use reenact::composite::MaskMode;
use reenact::drive::{self, Context};

/// Talking-head reenactment inference.
///
/// Drives a source portrait from a driving face image, a directory of head
/// meshes, or explicit coefficient sweeps, and writes the composited result.
#[derive(Parser, Debug)]
#[command(name = "reenact", version)]
struct Args {
    /// Source portrait image.
    #[arg(long)]
    src: PathBuf,

    /// Driving face image (face-driven mode, the default).
    #[arg(long)]
    drv: Option<PathBuf>,

    /// Directory of driving `.obj` meshes (mesh-driven mode).
    #[arg(long, conflicts_with = "coefs")]
    mesh_dir: Option<PathBuf>,

    /// Run the shape/expression/pose coefficient sweeps instead of a driving
    /// input.
    #[arg(long)]
    coefs: bool,

    /// Output image path (face-driven) or output directory (coefficient
    /// sweeps).
    #[arg(long, default_value = "output.png")]
    out: PathBuf,

    /// Output directory for mesh-driven frames.
    #[arg(long, default_value = "results")]
    save_dir: PathBuf,

    /// Experiment name; mesh-driven frames land in `{save_dir}/{expname}`.
    #[arg(long, default_value = "test")]
    expname: String,

    /// Checkpoint bundle directory.
    #[arg(long)]
    ckpt: PathBuf,

    /// Binarize the occupancy mask instead of using it as soft opacity.
    #[arg(long)]
    hard_mask: bool,
}

fn main() -> anyhow::Result<()> {
    reenact::init_logger!();

    let args = Args::parse();
    let mask_mode = if args.hard_mask {
        MaskMode::Hard
    } else {
        MaskMode::Soft
    };

    let ctx = Context::load(&args.ckpt, mask_mode)
        .with_context(|| format!("loading checkpoint bundle `{}`", args.ckpt.display()))?;

    if let Some(mesh_dir) = &args.mesh_dir {
        drive::drive_by_mesh(&ctx, &args.src, mesh_dir, &args.save_dir, &args.expname)?;
    } else if args.coefs {
        drive::drive_by_coefs(&ctx, &args.src, &args.out)?;
    } else {
        let drv = args
            .drv
            .as_deref()
            .context("face-driven mode needs a driving image; pass --drv (or --mesh-dir/--coefs)")?;
        drive::drive_by_face(&ctx, &args.src, drv, &args.out)?;
    }

    Ok(())
}
