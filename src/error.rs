//! Error taxonomy for the inference pipeline.
//!
//! Every error is surfaced to the caller unchanged; there is no retry logic
//! anywhere in the crate, and a failing run writes no output file for the
//! item that failed.

use std::io;
use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The image file is missing, unreadable, or not a supported format.
    #[error("failed to load image `{}`: {message}", .path.display())]
    ImageLoad { path: PathBuf, message: String },

    /// The landmark detector found no face in the input image.
    #[error("no face detected in `{}`", .path.display())]
    NoFaceDetected { path: PathBuf },

    /// A checkpoint graph does not match the documented model interface.
    ///
    /// Tolerated during checkpoint loading (the offending entry point is
    /// skipped); fatal once the entry point is actually invoked.
    #[error("checkpoint graph `{graph}` does not match the model interface: {message}")]
    CheckpointMismatch { graph: String, message: String },

    /// A mesh file could not be parsed into vertex positions.
    #[error("failed to parse mesh `{}`: {message}", .path.display())]
    MeshParse { path: PathBuf, message: String },

    /// The model produced (or was fed) tensors of an unexpected shape, or
    /// the forward pass itself failed.
    #[error("model inference failed: {0}")]
    ModelInference(String),

    /// Output file or directory could not be written.
    #[error("failed to write `{}`: {message}", .path.display())]
    FileWrite { path: PathBuf, message: String },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn inference(msg: impl Into<String>) -> Self {
        Self::ModelInference(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_offending_path() {
        let err = Error::NoFaceDetected {
            path: "portraits/empty.png".into(),
        };
        assert!(err.to_string().contains("portraits/empty.png"));

        let err = Error::MeshParse {
            path: "meshes/broken.obj".into(),
            message: "vertex line has 2 coordinates".into(),
        };
        assert!(err.to_string().contains("meshes/broken.obj"));
        assert!(err.to_string().contains("2 coordinates"));
    }
}
