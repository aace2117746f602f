//! Inference runtime
//!
//! The decode loop talks to a model only through [`InferenceBackend`]: named
//! tensors in, named tensors out. [`OnnxBackend`] is the production
//! implementation.

use crate::error::{AdapterError, Result};
use crate::Device;
use serde_json::Value;
use std::collections::HashMap;

pub mod onnx;
pub use onnx::OnnxBackend;

/// A dense tensor with a row-major flat buffer
#[derive(Debug, Clone, PartialEq)]
pub enum Tensor {
    I64 { shape: Vec<usize>, data: Vec<i64> },
    F32 { shape: Vec<usize>, data: Vec<f32> },
}

impl Tensor {
    /// A `[1, len]` row of token-shaped values
    pub fn i64_row(data: Vec<i64>) -> Self {
        Self::I64 {
            shape: vec![1, data.len()],
            data,
        }
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            Self::I64 { shape, .. } | Self::F32 { shape, .. } => shape,
        }
    }

    pub fn dtype(&self) -> &'static str {
        match self {
            Self::I64 { .. } => "i64",
            Self::F32 { .. } => "f32",
        }
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match self {
            Self::F32 { data, .. } => Some(data),
            Self::I64 { .. } => None,
        }
    }

    pub fn as_i64(&self) -> Option<&[i64]> {
        match self {
            Self::I64 { data, .. } => Some(data),
            Self::F32 { .. } => None,
        }
    }
}

/// Named tensors handed to a backend
#[derive(Debug, Clone, Default)]
pub struct InferenceInput {
    pub inputs: HashMap<String, Tensor>,
}

/// Named tensors produced by a backend
#[derive(Debug, Clone, Default)]
pub struct InferenceOutput {
    pub outputs: HashMap<String, Tensor>,
}

impl InferenceInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_input(mut self, name: impl Into<String>, tensor: Tensor) -> Self {
        self.inputs.insert(name.into(), tensor);
        self
    }

    pub fn get_input(&self, name: &str) -> Option<&Tensor> {
        self.inputs.get(name)
    }
}

impl InferenceOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_output(mut self, name: impl Into<String>, tensor: Tensor) -> Self {
        self.outputs.insert(name.into(), tensor);
        self
    }

    pub fn get_output(&self, name: &str) -> Option<&Tensor> {
        self.outputs.get(name)
    }
}

/// Anything that maps token ids to next-token logits
pub trait InferenceBackend: Send {
    /// Short backend identifier, e.g. `"onnx"`
    fn backend_type(&self) -> &str;

    fn infer(&mut self, input: InferenceInput) -> Result<InferenceOutput>;

    fn is_ready(&self) -> bool {
        true
    }

    fn model_info(&self) -> HashMap<String, Value> {
        HashMap::new()
    }
}

/// A loaded backend plus the metadata describing how it was created
pub struct InferenceRuntime {
    backend: Box<dyn InferenceBackend>,
    runtime_metadata: HashMap<String, Value>,
}

impl InferenceRuntime {
    pub fn new(backend: Box<dyn InferenceBackend>, device: Device) -> Self {
        let mut runtime_metadata = HashMap::new();
        runtime_metadata.insert(
            "backend_type".to_string(),
            Value::String(backend.backend_type().to_string()),
        );
        runtime_metadata.insert("device_type".to_string(), Value::String(device.to_string()));
        runtime_metadata.insert(
            "loaded_at".to_string(),
            Value::String(chrono::Utc::now().to_rfc3339()),
        );

        Self {
            backend,
            runtime_metadata,
        }
    }

    pub fn infer(&mut self, input: InferenceInput) -> Result<InferenceOutput> {
        if !self.backend.is_ready() {
            return Err(AdapterError::generation("Backend is not ready for inference"));
        }

        self.backend.infer(input)
    }

    pub fn model_info(&self) -> HashMap<String, Value> {
        let mut info = self.backend.model_info();
        info.extend(self.runtime_metadata.clone());
        info
    }

    pub fn is_ready(&self) -> bool {
        self.backend.is_ready()
    }
}
