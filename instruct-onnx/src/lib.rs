//! # instruct-onnx
//!
//! A load/predict adapter over locally stored instruction-tuned language
//! models. Point it at an artifact directory (`tokenizer.json`,
//! `config.json`, `model.onnx`) and score prompt tables against it.
//!
//! ```no_run
//! use instruct_onnx::{AdapterConfig, InstructAdapter, ModelAdapter, PromptRequest};
//!
//! # fn main() -> instruct_onnx::Result<()> {
//! let adapter = InstructAdapter::load("./mpt-7b-instruct", AdapterConfig::default())?;
//! let result = adapter.predict(&PromptRequest::new("What is machine learning?"))?;
//! println!("{}", result.candidates[0]);
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod artifact;
pub mod config;
pub mod device;
pub mod error;
pub mod generation;
pub mod prompt;
pub mod runtime;
pub mod schema;

// Re-exports
pub use adapter::{InstructAdapter, InstructAdapterBuilder, ModelAdapter};
pub use artifact::{ArtifactBundle, ModelConfig};
pub use config::AdapterConfig;
pub use device::{cpu, cpu_with_threads, Device};

#[cfg(feature = "cuda")]
pub use device::cuda;

pub use error::{AdapterError, Result};
pub use generation::{GenerationConfig, GenerationOutput, StopReason};
pub use prompt::PromptTemplate;
pub use runtime::{InferenceBackend, InferenceInput, InferenceOutput, InferenceRuntime, OnnxBackend, Tensor};
pub use schema::{ModelSignature, PredictParams, PredictionResult, PromptRequest};
