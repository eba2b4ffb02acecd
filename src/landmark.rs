//! Facial landmark detection.
//!
//! The detector is an external collaborator consumed through the
//! [`LandmarkDetector`] trait; [`Landmarker`] is the bundled ONNX-backed
//! implementation. One face per image is assumed: the network reports a
//! single landmark set plus a face-presence score, and images without a
//! sufficiently confident face yield no landmarks at all.

use image::RgbImage;
use ndarray::Axis;

use crate::image::{resize_exact, to_chw_tensor};
use crate::nn::{Inputs, NeuralNetwork};
use crate::{Error, Result};

/// Number of landmark points produced per face.
pub const NUM_LANDMARKS: usize = 68;

const FACE_PRESENCE_THRESHOLD: f32 = 0.5;

/// An ordered set of 2D facial keypoints, in pixel coordinates of the image
/// they were detected in.
#[derive(Debug, Clone, PartialEq)]
pub struct Landmarks {
    positions: Vec<[f32; 2]>,
}

impl Landmarks {
    /// Creates a landmark set from raw positions.
    pub fn from_positions(positions: Vec<[f32; 2]>) -> Self {
        Self { positions }
    }

    /// Returns the landmark positions, in detection order.
    pub fn positions(&self) -> &[[f32; 2]] {
        &self.positions
    }

    /// Returns the number of landmarks in this set.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Returns the axis-aligned bounding box of all landmarks as
    /// `(left, top, right, bottom)`.
    pub fn bounding_box(&self) -> (f32, f32, f32, f32) {
        let mut left = f32::MAX;
        let mut top = f32::MAX;
        let mut right = f32::MIN;
        let mut bottom = f32::MIN;
        for &[x, y] in &self.positions {
            left = left.min(x);
            top = top.min(y);
            right = right.max(x);
            bottom = bottom.max(y);
        }
        (left, top, right, bottom)
    }
}

/// Source of facial landmarks for a single-face image.
pub trait LandmarkDetector {
    /// Computes landmarks for the most confident face in `image`, or `None`
    /// if the image contains no detectable face.
    fn detect(&self, image: &RgbImage) -> Result<Option<Landmarks>>;
}

/// A neural network based facial landmark detector.
///
/// The network takes a single NCHW color input and produces two outputs: the
/// landmark coordinates (normalized to `[0, 1]` over the input frame) and a
/// face-presence logit.
pub struct Landmarker {
    nn: NeuralNetwork,
    input_width: usize,
    input_height: usize,
}

impl Landmarker {
    /// Loads the landmark network from an ONNX file.
    pub fn from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        Self::with_network(NeuralNetwork::from_path(path)?)
    }

    /// Wraps an already loaded landmark network.
    pub fn with_network(nn: NeuralNetwork) -> Result<Self> {
        let mismatch = |message: String| Error::CheckpointMismatch {
            graph: "landmarks".into(),
            message,
        };

        if nn.num_inputs() != 1 {
            return Err(mismatch(format!(
                "landmark network has to take 1 input, this one takes {}",
                nn.num_inputs()
            )));
        }
        if nn.num_outputs() != 2 {
            return Err(mismatch(format!(
                "landmark network has to produce coordinates and a presence flag, \
                 this one produces {} outputs",
                nn.num_outputs()
            )));
        }

        let input_info = nn.inputs().next().expect("validated input count");
        let (h, w) = match input_info.shape() {
            [1, 3, h, w] => (*h, *w),
            shape => {
                return Err(mismatch(format!(
                    "landmark network input must be shaped [1, 3, H, W], got {shape:?}"
                )))
            }
        };

        Ok(Self {
            nn,
            input_width: w,
            input_height: h,
        })
    }
}

impl LandmarkDetector for Landmarker {
    fn detect(&self, image: &RgbImage) -> Result<Option<Landmarks>> {
        let resized = resize_exact(image, self.input_width as u32, self.input_height as u32);
        let tensor = to_chw_tensor(&resized, 0.0..=1.0)
            .insert_axis(Axis(0))
            .into_dyn();

        let outputs = self.nn.estimate(&Inputs::from(tensor))?;

        let presence = outputs[1]
            .iter()
            .next()
            .copied()
            .ok_or_else(|| Error::inference("landmark network returned empty presence output"))?;
        let confidence = sigmoid(presence);
        log::trace!("face presence confidence: {confidence}");
        if confidence < FACE_PRESENCE_THRESHOLD {
            return Ok(None);
        }

        let coords = &outputs[0];
        if coords.len() < NUM_LANDMARKS * 2 {
            return Err(Error::inference(format!(
                "landmark output holds {} values, expected at least {}",
                coords.len(),
                NUM_LANDMARKS * 2
            )));
        }

        // Coordinates are normalized over the network's input frame; scale
        // them back to the coordinate space of the analyzed image.
        let (w, h) = (image.width() as f32, image.height() as f32);
        let positions = coords
            .iter()
            .copied()
            .take(NUM_LANDMARKS * 2)
            .collect::<Vec<_>>()
            .chunks_exact(2)
            .map(|xy| [xy[0] * w, xy[1] * h])
            .collect();

        Ok(Some(Landmarks::from_positions(positions)))
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
