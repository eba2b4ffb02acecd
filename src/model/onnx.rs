//! Checkpoint bundle loading and the ONNX-backed synthesis model.
//!
//! A checkpoint is a directory holding one serialized graph per model entry
//! point (`reenact.onnx`, `identity.onnx`, `mesh.onnx`, `coef.onnx`), plus
//! the landmark network consumed elsewhere. Loading is tolerant: unknown
//! files are skipped, and a graph that does not match the documented
//! interface is logged and left unavailable instead of failing the whole
//! load. Invoking an unavailable entry point is an inference error.

use std::path::Path;

use ndarray::{Array2, Array3, Array4, ArrayD, Axis, IxDyn};

use crate::nn::{Inputs, NeuralNetwork, Outputs};
use crate::preprocess::{FrameInput, FULL_RES};
use crate::{Error, Result};

use super::{
    neutral_exp, neutral_pose, neutral_shape, Coefficients, HeadModel, Prediction, SourceIdentity,
    EXP_DIMS, POSE_DIMS, SHAPE_DIMS,
};

/// File name of the landmark network within a checkpoint bundle.
///
/// Not loaded here; the landmark detector is a separate collaborator.
pub const LANDMARK_GRAPH: &str = "landmarks.onnx";

struct EntrySpec {
    file: &'static str,
    name: &'static str,
    num_inputs: usize,
}

const ENTRY_SPECS: [EntrySpec; 4] = [
    EntrySpec {
        file: "reenact.onnx",
        name: "reenact",
        num_inputs: 7,
    },
    EntrySpec {
        file: "identity.onnx",
        name: "identity",
        num_inputs: 2,
    },
    EntrySpec {
        file: "mesh.onnx",
        name: "mesh",
        num_inputs: 6,
    },
    EntrySpec {
        file: "coef.onnx",
        name: "coef",
        num_inputs: 6,
    },
];

/// What a checkpoint bundle load actually picked up.
#[derive(Debug, Default, Clone)]
pub struct CheckpointSummary {
    /// Entry points backed by a usable graph.
    pub loaded: Vec<String>,
    /// Bundle files that matched no known entry point and were ignored.
    pub skipped: Vec<String>,
    /// Entry points whose graph mismatched the interface and was left
    /// unavailable.
    pub mismatched: Vec<String>,
}

/// The synthesis network, loaded from a checkpoint bundle.
pub struct OnnxHeadModel {
    reenact: Option<NeuralNetwork>,
    identity: Option<NeuralNetwork>,
    mesh: Option<NeuralNetwork>,
    coef: Option<NeuralNetwork>,
    summary: CheckpointSummary,
}

impl OnnxHeadModel {
    /// Loads a checkpoint bundle from `dir`.
    ///
    /// Only I/O failures are fatal; interface mismatches are tolerated per
    /// entry point and recorded in the [`CheckpointSummary`].
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        Self::load_impl(dir.as_ref())
    }

    fn load_impl(dir: &Path) -> Result<Self> {
        let mut summary = CheckpointSummary::default();
        let mut nets: [Option<NeuralNetwork>; 4] = [None, None, None, None];

        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let file_name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_owned(),
                None => continue,
            };

            if file_name == LANDMARK_GRAPH {
                continue;
            }
            match ENTRY_SPECS.iter().position(|spec| spec.file == file_name) {
                Some(index) => {
                    let spec = &ENTRY_SPECS[index];
                    match load_entry(&path, spec) {
                        Ok(net) => {
                            summary.loaded.push(spec.name.to_owned());
                            nets[index] = Some(net);
                        }
                        Err(Error::CheckpointMismatch { graph, message }) => {
                            log::warn!(
                                "checkpoint graph `{graph}` does not match the model \
                                 interface and will be unavailable: {message}"
                            );
                            summary.mismatched.push(spec.name.to_owned());
                        }
                        Err(e) => return Err(e),
                    }
                }
                None => {
                    log::debug!("ignoring unrecognized checkpoint entry `{file_name}`");
                    summary.skipped.push(file_name);
                }
            }
        }

        log::debug!(
            "checkpoint loaded: {} entry points available, {} mismatched, {} files skipped",
            summary.loaded.len(),
            summary.mismatched.len(),
            summary.skipped.len(),
        );

        let [reenact, identity, mesh, coef] = nets;
        Ok(Self {
            reenact,
            identity,
            mesh,
            coef,
            summary,
        })
    }

    /// Returns what the checkpoint load picked up.
    pub fn summary(&self) -> &CheckpointSummary {
        &self.summary
    }

    fn entry<'a>(&self, net: &'a Option<NeuralNetwork>, name: &str) -> Result<&'a NeuralNetwork> {
        net.as_ref().ok_or_else(|| {
            Error::inference(format!("checkpoint bundle provides no usable `{name}` graph"))
        })
    }
}

fn load_entry(path: &Path, spec: &EntrySpec) -> Result<NeuralNetwork> {
    let net = NeuralNetwork::from_path(path)?;
    if net.num_inputs() != spec.num_inputs {
        return Err(Error::CheckpointMismatch {
            graph: spec.name.to_owned(),
            message: format!(
                "expected {} inputs, graph takes {}",
                spec.num_inputs,
                net.num_inputs()
            ),
        });
    }
    Ok(net)
}

impl HeadModel for OnnxHeadModel {
    fn reenact(&self, src: &FrameInput, drv: &FrameInput, cross_id: bool) -> Result<Prediction> {
        let net = self.entry(&self.reenact, "reenact")?;
        let inputs = Inputs::from_iter([
            src.crop.clone().into_dyn(),
            drv.crop.clone().into_dyn(),
            src.full.clone().into_dyn(),
            drv.full.clone().into_dyn(),
            src.tform_tensor().into_dyn(),
            drv.tform_tensor().into_dyn(),
            ArrayD::from_elem(IxDyn(&[1]), if cross_id { 1.0 } else { 0.0 }),
        ]);
        prediction_from_outputs(net.estimate(&inputs)?)
    }

    fn encode_identity(&self, src: &FrameInput) -> Result<SourceIdentity> {
        let net = self.entry(&self.identity, "identity")?;
        let inputs = Inputs::from_iter([src.crop.clone().into_dyn(), src.full.clone().into_dyn()]);
        let outputs = net.estimate(&inputs)?;
        if outputs.len() < 3 {
            return Err(Error::inference(format!(
                "identity graph produced {} outputs, expected vertices, code, and visibility",
                outputs.len()
            )));
        }

        Ok(SourceIdentity {
            verts: outputs[0].clone(),
            code: outputs[1].clone(),
            visibility: outputs[2].clone(),
        })
    }

    fn generate_from_mesh(
        &self,
        src: &FrameInput,
        identity: &SourceIdentity,
        target_verts: &Array3<f32>,
    ) -> Result<Prediction> {
        let net = self.entry(&self.mesh, "mesh")?;
        let inputs = Inputs::from_iter([
            src.full.clone().into_dyn(),
            src.tform_tensor().into_dyn(),
            identity.verts.clone(),
            identity.code.clone(),
            identity.visibility.clone(),
            target_verts.clone().into_dyn(),
        ]);
        prediction_from_outputs(net.estimate(&inputs)?)
    }

    fn generate_from_coefs(&self, src: &FrameInput, coefs: &Coefficients) -> Result<Prediction> {
        let net = self.entry(&self.coef, "coef")?;

        let shape = coef_or_neutral(&coefs.shape, SHAPE_DIMS, "shape", neutral_shape)?;
        let exp = coef_or_neutral(&coefs.exp, EXP_DIMS, "exp", neutral_exp)?;
        let pose = coef_or_neutral(&coefs.pose, POSE_DIMS, "pose", neutral_pose)?;

        let inputs = Inputs::from_iter([
            src.crop.clone().into_dyn(),
            src.full.clone().into_dyn(),
            src.tform_tensor().into_dyn(),
            shape.into_dyn(),
            exp.into_dyn(),
            pose.into_dyn(),
        ]);
        prediction_from_outputs(net.estimate(&inputs)?)
    }
}

fn coef_or_neutral(
    coef: &Option<Array2<f32>>,
    dims: usize,
    name: &str,
    neutral: fn() -> Array2<f32>,
) -> Result<Array2<f32>> {
    match coef {
        Some(array) => {
            if array.shape() != [1, dims] {
                return Err(Error::inference(format!(
                    "`{name}` coefficients must be shaped [1, {dims}], got {:?}",
                    array.shape()
                )));
            }
            Ok(array.clone())
        }
        None => Ok(neutral()),
    }
}

fn prediction_from_outputs(outputs: Outputs) -> Result<Prediction> {
    if outputs.len() < 2 {
        return Err(Error::inference(format!(
            "synthesis graph produced {} outputs, expected image and mask",
            outputs.len()
        )));
    }

    let image = outputs[0]
        .clone()
        .into_dimensionality()
        .ok()
        .filter(|image: &Array4<f32>| image.shape() == [1, 3, FULL_RES, FULL_RES])
        .ok_or_else(|| {
            Error::inference(format!(
                "predicted image has shape {:?}, expected [1, 3, {FULL_RES}, {FULL_RES}]",
                outputs[0].shape()
            ))
        })?;

    // The mask may come back with or without an explicit channel dimension.
    let mask = outputs[1].clone();
    let shape = mask.shape().to_vec();
    let mask = match shape[..] {
        [1, 1, h, w] if h == FULL_RES && w == FULL_RES => mask.remove_axis(Axis(1)),
        [1, h, w] if h == FULL_RES && w == FULL_RES => mask,
        _ => {
            return Err(Error::inference(format!(
                "predicted mask has shape {:?}, expected [1, {FULL_RES}, {FULL_RES}]",
                outputs[1].shape()
            )))
        }
    };
    let mask: Array3<f32> = mask
        .into_dimensionality()
        .expect("mask shape checked above");

    Ok(Prediction { image, mask })
}
