//! Talking-head reenactment inference.
//!
//! Given a source portrait and a driving signal (another face image, a batch
//! of 3D meshes, or explicit shape/expression/pose coefficients), this crate
//! aligns the portrait into a canonical crop frame, runs a head synthesis
//! network on the prepared tensors, and composites the predicted foreground
//! over a white fill using the network's soft occupancy mask.
//!
//! # Coordinates and value ranges
//!
//! Images use pixel coordinates with Y pointing down. Tensors crossing the
//! model boundary are channel-first with a leading batch dimension of 1. The
//! full frame is 256×256 in `[-1, 1]`, the aligned crop is 224×224 in
//! `[0, 1]`, and predictions come back as a 256×256 image in `[-1, 1]` plus a
//! mask in `[0, 1]`. These ranges are part of the model contract and are not
//! configurable.

use log::LevelFilter;

pub mod alignment;
pub mod composite;
pub mod drive;
mod error;
pub mod image;
pub mod landmark;
pub mod mesh;
pub mod model;
pub mod nn;
pub mod preprocess;

pub use error::{Error, Result};

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = LevelFilter::Debug;
    env_logger::Builder::new()
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_PKG_NAME")), log_level)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// The calling crate and this library log at *debug* level; everything else
/// stays at the `env_logger` default unless overridden via `RUST_LOG`.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
