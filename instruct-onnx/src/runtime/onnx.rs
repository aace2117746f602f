//! ONNX Runtime backend

use crate::artifact::ArtifactBundle;
use crate::error::{AdapterError, Result};
use crate::runtime::{InferenceBackend, InferenceInput, InferenceOutput, Tensor};
use crate::Device;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

use ndarray::{ArrayD, IxDyn};

use ort::execution_providers::ExecutionProvider;
use ort::session::Session;
use ort::value::{DynValue, Value as OrtValue};

/// ONNX Runtime session holding a decoder graph
pub struct OnnxBackend {
    session: Session,
    input_info: Vec<IoInfo>,
    output_info: Vec<IoInfo>,
    /// When set, only these outputs are copied out of the session
    requested_outputs: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
struct IoInfo {
    name: String,
    data_type: String,
}

impl OnnxBackend {
    /// Build a session from the `model.onnx` of an artifact bundle
    pub fn from_bundle(bundle: &ArtifactBundle, device: Device) -> Result<Self> {
        let model_file = bundle.model_file()?;
        Self::new_with_device(model_file, device)
    }

    /// Build a session from a model file on the given device
    pub fn new_with_device<P: AsRef<Path>>(model_path: P, device: Device) -> Result<Self> {
        if !device.is_available() {
            return Err(AdapterError::load(format!(
                "Device {device} is not available"
            )));
        }

        let mut builder = Session::builder()
            .map_err(|e| AdapterError::load(format!("Failed to create session builder: {e}")))?;

        match device {
            #[cfg(feature = "cuda")]
            Device::Cuda(id) => {
                use ort::execution_providers::CUDAExecutionProvider;
                let ep = CUDAExecutionProvider::default().with_device_id(id as i32);
                match ep.is_available() {
                    Ok(true) => {
                        ep.register(&mut builder).map_err(|e| {
                            AdapterError::load(format!("Failed to register CUDA: {e}"))
                        })?;
                    }
                    _ => return Err(AdapterError::load("CUDA execution provider not available")),
                }
            }
            Device::Cpu(threads) => {
                use ort::execution_providers::CPUExecutionProvider;
                let ep = CPUExecutionProvider::default();
                ep.register(&mut builder)
                    .map_err(|e| AdapterError::load(format!("Failed to register CPU: {e}")))?;
                if threads > 0 {
                    builder = builder.with_intra_threads(threads).map_err(|e| {
                        AdapterError::load(format!("Failed to set intra-op threads: {e}"))
                    })?;
                }
            }
        }

        let session = builder
            .commit_from_file(model_path.as_ref())
            .map_err(|e| AdapterError::load(format!("Failed to load ONNX model: {e}")))?;

        Ok(Self::from_session(session))
    }

    fn from_session(session: Session) -> Self {
        let input_info: Vec<IoInfo> = session
            .inputs
            .iter()
            .map(|input| IoInfo {
                name: input.name.clone(),
                data_type: format!("{:?}", input.input_type),
            })
            .collect();

        let output_info: Vec<IoInfo> = session
            .outputs
            .iter()
            .map(|output| IoInfo {
                name: output.name.clone(),
                data_type: format!("{:?}", output.output_type),
            })
            .collect();

        log::info!(
            "ONNX backend initialized with {} inputs and {} outputs",
            input_info.len(),
            output_info.len()
        );
        for (i, input) in input_info.iter().enumerate() {
            log::info!("  Input {i}: name='{}', type={}", input.name, input.data_type);
        }
        for (i, output) in output_info.iter().enumerate() {
            log::info!("  Output {i}: name='{}', type={}", output.name, output.data_type);
        }

        Self {
            session,
            input_info,
            output_info,
            requested_outputs: None,
        }
    }

    /// Restrict the outputs copied back after each run
    pub fn with_outputs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requested_outputs = Some(names.into_iter().map(Into::into).collect());
        self
    }

    fn wants_output(&self, name: &str) -> bool {
        self.requested_outputs
            .as_ref()
            .is_none_or(|names| names.iter().any(|n| n == name))
    }
}

fn tensor_to_ort(name: &str, tensor: &Tensor) -> Result<DynValue> {
    let value = match tensor {
        Tensor::I64 { shape, data } => {
            let array = ArrayD::<i64>::from_shape_vec(IxDyn(shape), data.clone()).map_err(|e| {
                AdapterError::generation(format!("Failed to shape i64 tensor {name}: {e}"))
            })?;
            OrtValue::from_array(array).map(|v| v.into_dyn())
        }
        Tensor::F32 { shape, data } => {
            let array = ArrayD::<f32>::from_shape_vec(IxDyn(shape), data.clone()).map_err(|e| {
                AdapterError::generation(format!("Failed to shape f32 tensor {name}: {e}"))
            })?;
            OrtValue::from_array(array).map(|v| v.into_dyn())
        }
    };

    value.map_err(|e| AdapterError::generation(format!("Failed to create ONNX value {name}: {e}")))
}

fn ort_to_tensor(value: &DynValue) -> Option<Tensor> {
    if let Ok((shape, data)) = value.try_extract_tensor::<f32>() {
        return Some(Tensor::F32 {
            shape: shape.iter().map(|&d| d.max(0) as usize).collect(),
            data: data.to_vec(),
        });
    }

    if let Ok((shape, data)) = value.try_extract_tensor::<i64>() {
        return Some(Tensor::I64 {
            shape: shape.iter().map(|&d| d.max(0) as usize).collect(),
            data: data.to_vec(),
        });
    }

    None
}

impl InferenceBackend for OnnxBackend {
    fn backend_type(&self) -> &str {
        "onnx"
    }

    fn infer(&mut self, input: InferenceInput) -> Result<InferenceOutput> {
        let mut onnx_inputs = HashMap::new();
        for info in &self.input_info {
            let tensor = input.get_input(&info.name).ok_or_else(|| {
                AdapterError::generation(format!("Missing required input: {}", info.name))
            })?;
            onnx_inputs.insert(info.name.clone(), tensor_to_ort(&info.name, tensor)?);
        }

        let wanted: Vec<String> = self
            .output_info
            .iter()
            .filter(|info| self.wants_output(&info.name))
            .map(|info| info.name.clone())
            .collect();

        let outputs = self
            .session
            .run(onnx_inputs)
            .map_err(|e| AdapterError::generation(format!("ONNX inference failed: {e}")))?;

        let mut result = InferenceOutput::new();
        for name in wanted {
            let Some(value) = outputs.get(&name) else {
                continue;
            };
            match ort_to_tensor(value) {
                Some(tensor) => {
                    result.outputs.insert(name, tensor);
                }
                None => log::debug!("Skipping output '{name}' with unsupported element type"),
            }
        }
        Ok(result)
    }

    fn model_info(&self) -> HashMap<String, Value> {
        let describe = |infos: &[IoInfo]| {
            Value::Array(
                infos
                    .iter()
                    .map(|info| serde_json::json!({ "name": info.name, "data_type": info.data_type }))
                    .collect(),
            )
        };

        let mut info = HashMap::new();
        info.insert("num_inputs".to_string(), self.input_info.len().into());
        info.insert("num_outputs".to_string(), self.output_info.len().into());
        info.insert("inputs".to_string(), describe(&self.input_info));
        info.insert("outputs".to_string(), describe(&self.output_info));
        info.insert("supports_gpu".to_string(), Value::Bool(cfg!(feature = "cuda")));
        info
    }
}
