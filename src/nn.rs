//! ONNX inference via [`tract`].
//!
//! Tensors crossing this boundary are [`ndarray`] arrays of `f32`; graph
//! loading and execution are delegated to `tract-onnx`.
//!
//! [`tract`]: https://github.com/sonos/tract

use std::ops::{Index, Range};
use std::path::Path;
use std::sync::Arc;

use ndarray::{ArrayD, IxDyn};
use tract_onnx::prelude::{
    Framework, Graph, InferenceModelExt, SimplePlan, TValue, TVec, TypedFact, TypedOp,
};

use crate::{Error, Result};

type Model = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// A neural network that can be used for inference.
pub struct NeuralNetwork {
    inner: Model,
}

impl NeuralNetwork {
    /// Loads a pre-trained model from an ONNX file path.
    ///
    /// The path must have a `.onnx` extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_path_impl(path.as_ref())
    }

    fn from_path_impl(path: &Path) -> Result<Self> {
        let graph = match path.file_stem().and_then(|stem| stem.to_str()) {
            Some(stem) => stem.to_owned(),
            None => path.display().to_string(),
        };
        match path.extension() {
            Some(ext) if ext == "onnx" => {}
            _ => {
                return Err(Error::CheckpointMismatch {
                    graph,
                    message: "network path must have `.onnx` extension".into(),
                })
            }
        }

        let model_data = std::fs::read(path)?;
        Self::load(&model_data, &graph)
    }

    /// Loads and optimizes a network from an in-memory ONNX file.
    ///
    /// `graph` names the network in error messages.
    pub fn load(raw: &[u8], graph: &str) -> Result<Self> {
        // tract reports all load failures as `anyhow` errors.
        let mismatch = |e: anyhow::Error| Error::CheckpointMismatch {
            graph: graph.to_owned(),
            message: e.to_string(),
        };

        let model = tract_onnx::onnx()
            .model_for_read(&mut &*raw)
            .map_err(mismatch)?
            .into_optimized()
            .map_err(mismatch)?
            .into_runnable()
            .map_err(mismatch)?;

        Ok(Self { inner: model })
    }

    /// Returns the number of input nodes of the network.
    pub fn num_inputs(&self) -> usize {
        self.inner.model().inputs.len()
    }

    /// Returns the number of output nodes of the network.
    pub fn num_outputs(&self) -> usize {
        self.inner.model().outputs.len()
    }

    /// Returns an iterator over the network's input node information.
    ///
    /// To perform inference, a matching input tensor has to be provided for
    /// each input.
    pub fn inputs(&self) -> InputInfoIter<'_> {
        InputInfoIter {
            net: self,
            ids: 0..self.num_inputs(),
        }
    }

    /// Runs the network on a set of [`Inputs`], returning the estimated
    /// [`Outputs`].
    #[doc(alias = "infer")]
    pub fn estimate(&self, inputs: &Inputs) -> Result<Outputs> {
        let tensors = inputs
            .inner
            .iter()
            .map(|array| {
                let tensor = to_tract(array)?;
                Ok(TValue::from_const(Arc::new(tensor)))
            })
            .collect::<Result<TVec<_>>>()?;

        let outputs = self
            .inner
            .run(tensors)
            .map_err(|e| Error::inference(e.to_string()))?;
        let outputs = outputs
            .iter()
            .map(|tract| from_tract(tract))
            .collect::<Result<TVec<_>>>()?;

        Ok(Outputs { inner: outputs })
    }
}

fn to_tract(array: &ArrayD<f32>) -> Result<tract_onnx::prelude::Tensor> {
    let standard = array.as_standard_layout();
    let data = standard
        .as_slice()
        .expect("standard layout array is contiguous");
    tract_onnx::prelude::Tensor::from_shape(array.shape(), data)
        .map_err(|e| Error::inference(e.to_string()))
}

fn from_tract(tensor: &tract_onnx::prelude::Tensor) -> Result<ArrayD<f32>> {
    let data = tensor
        .as_slice::<f32>()
        .map_err(|e| Error::inference(format!("non-f32 network output: {e}")))?;
    ArrayD::from_shape_vec(IxDyn(tensor.shape()), data.to_vec())
        .map_err(|e| Error::inference(e.to_string()))
}

/// Iterator over a [`NeuralNetwork`]s input information.
pub struct InputInfoIter<'a> {
    net: &'a NeuralNetwork,
    ids: Range<usize>,
}

impl<'a> Iterator for InputInfoIter<'a> {
    type Item = InputInfo<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.ids.next()?;

        let model = self.net.inner.model();
        let fact = model.input_fact(id).expect("`input_fact` returned error");
        let node = model.input_outlets().expect("missing input outlets")[id].node;

        Some(InputInfo {
            shape: fact
                .shape
                .as_concrete()
                .expect("loaded network has symbolic input shape"),
            name: &model.node(node).name,
        })
    }
}

/// Information about a neural network input node.
#[derive(Debug)]
pub struct InputInfo<'a> {
    shape: &'a [usize],
    name: &'a str,
}

impl<'a> InputInfo<'a> {
    /// Returns the tensor shape for this input.
    #[inline]
    pub fn shape(&self) -> &[usize] {
        self.shape
    }

    /// Returns the name of this input.
    #[inline]
    pub fn name(&self) -> &str {
        self.name
    }
}

/// The result of a neural network inference pass.
///
/// This is a list of tensors corresponding to the network's output nodes.
#[derive(Debug)]
pub struct Outputs {
    inner: TVec<ArrayD<f32>>,
}

impl Outputs {
    /// Returns the number of tensors in this inference output.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns an iterator over the output tensors.
    pub fn iter(&self) -> impl Iterator<Item = &ArrayD<f32>> {
        self.inner.iter()
    }
}

impl Index<usize> for Outputs {
    type Output = ArrayD<f32>;

    fn index(&self, index: usize) -> &ArrayD<f32> {
        &self.inner[index]
    }
}

/// List of input tensors for neural network inference.
#[derive(Debug)]
pub struct Inputs {
    inner: TVec<ArrayD<f32>>,
}

impl Inputs {
    /// Returns the number of input tensors stored in `self`.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl From<ArrayD<f32>> for Inputs {
    fn from(array: ArrayD<f32>) -> Self {
        Self {
            inner: [array].into_iter().collect(),
        }
    }
}

impl<const N: usize> From<[ArrayD<f32>; N]> for Inputs {
    fn from(arrays: [ArrayD<f32>; N]) -> Self {
        Self {
            inner: arrays.into_iter().collect(),
        }
    }
}

impl FromIterator<ArrayD<f32>> for Inputs {
    fn from_iter<T: IntoIterator<Item = ArrayD<f32>>>(iter: T) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}

impl Extend<ArrayD<f32>> for Inputs {
    fn extend<T: IntoIterator<Item = ArrayD<f32>>>(&mut self, iter: T) {
        self.inner.extend(iter);
    }
}
