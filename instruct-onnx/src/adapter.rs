//! The load/predict model adapter.
//!
//! [`ModelAdapter`] is the stable two-method contract callers program against.
//! [`InstructAdapter`] implements it for instruction-tuned decoders: the user
//! prompt is wrapped in the instruction template, a continuation is sampled,
//! and the prompt tokens are stripped before decoding.

use crate::artifact::ArtifactBundle;
use crate::config::AdapterConfig;
use crate::error::{AdapterError, Result};
use crate::generation::{self, GenerationOutput, LOGITS_OUTPUT};
use crate::prompt::PromptTemplate;
use crate::runtime::{InferenceBackend, InferenceRuntime, OnnxBackend};
use crate::schema::{PredictParams, PredictionResult, PromptRequest};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokenizers::Tokenizer;

/// Two-method contract over a text generation model
pub trait ModelAdapter: Send + Sync {
    /// Load model state from an artifact directory. A failure leaves no
    /// adapter behind.
    fn load(artifact_path: &Path, config: AdapterConfig) -> Result<Self>
    where
        Self: Sized;

    /// Score the first row of `request`
    fn predict(&self, request: &PromptRequest) -> Result<PredictionResult>;
}

/// Instruction-following text generator backed by an [`InferenceBackend`]
pub struct InstructAdapter {
    runtime: Mutex<InferenceRuntime>,
    tokenizer: Tokenizer,
    bundle: ArtifactBundle,
    template: PromptTemplate,
    config: AdapterConfig,
}

impl InstructAdapter {
    /// Load with the ONNX backend; the bundle must ship `model.onnx`.
    pub fn load<P: AsRef<Path>>(artifact_path: P, config: AdapterConfig) -> Result<Self> {
        config.validate()?;
        let bundle = ArtifactBundle::open(artifact_path)?;
        let device = config.device()?;
        let backend = OnnxBackend::from_bundle(&bundle, device)?.with_outputs([LOGITS_OUTPUT]);
        Self::from_parts(bundle, config, Box::new(backend))
    }

    /// Load tokenizer and config from the bundle but run the given backend
    pub fn load_with_backend<P: AsRef<Path>>(
        artifact_path: P,
        config: AdapterConfig,
        backend: Box<dyn InferenceBackend>,
    ) -> Result<Self> {
        config.validate()?;
        let bundle = ArtifactBundle::open(artifact_path)?;
        Self::from_parts(bundle, config, backend)
    }

    fn from_parts(
        bundle: ArtifactBundle,
        config: AdapterConfig,
        backend: Box<dyn InferenceBackend>,
    ) -> Result<Self> {
        let tokenizer = bundle.load_tokenizer()?;
        let template = config.template()?;
        let runtime = InferenceRuntime::new(backend, config.device()?);

        log::info!(
            "Loaded {} adapter from {}",
            runtime
                .model_info()
                .get("backend_type")
                .and_then(Value::as_str)
                .unwrap_or("unknown"),
            bundle.path().display()
        );

        Ok(Self {
            runtime: Mutex::new(runtime),
            tokenizer,
            bundle,
            template,
            config,
        })
    }

    pub fn builder() -> InstructAdapterBuilder {
        InstructAdapterBuilder::new()
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// The full prompt fed to the model for `instruction`
    pub fn build_prompt(&self, instruction: &str) -> Result<String> {
        self.template.render(instruction)
    }

    /// Generate a continuation for one instruction
    pub fn generate(&self, instruction: &str, params: &PredictParams) -> Result<GenerationOutput> {
        params.validate()?;
        let prompt = self.build_prompt(instruction)?;
        let generation_config = self.config.generation_config(params);

        let mut runtime = self
            .runtime
            .lock()
            .map_err(|_| AdapterError::generation("Inference runtime lock poisoned"))?;

        generation::generate(
            &mut runtime,
            &self.tokenizer,
            self.bundle.config(),
            &prompt,
            &generation_config,
        )
    }

    pub fn model_info(&self) -> HashMap<String, Value> {
        let mut info = self.bundle.metadata().clone();
        if let Ok(runtime) = self.runtime.lock() {
            info.extend(runtime.model_info());
        }
        info
    }
}

impl ModelAdapter for InstructAdapter {
    fn load(artifact_path: &Path, config: AdapterConfig) -> Result<Self> {
        InstructAdapter::load(artifact_path, config)
    }

    fn predict(&self, request: &PromptRequest) -> Result<PredictionResult> {
        let instruction = request.prompt()?;
        let output = self.generate(instruction, &request.params)?;
        Ok(PredictionResult::new(output.text))
    }
}

#[derive(Default)]
pub struct InstructAdapterBuilder {
    model_dir: Option<PathBuf>,
    config: AdapterConfig,
    backend: Option<Box<dyn InferenceBackend>>,
}

impl InstructAdapterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_dir = Some(path.into());
        self
    }

    pub fn config(mut self, config: AdapterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn device(mut self, device: &str) -> Self {
        self.config.device = device.to_string();
        self
    }

    pub fn top_p(mut self, top_p: f32) -> Self {
        self.config.top_p = top_p;
        self
    }

    pub fn top_k(mut self, top_k: usize) -> Self {
        self.config.top_k = top_k;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    pub fn prompt_template(mut self, template: &str) -> Self {
        self.config.prompt_template = Some(template.to_string());
        self
    }

    pub fn stop_sequences<I, S>(mut self, stops: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.stop_sequences = stops.into_iter().map(Into::into).collect();
        self
    }

    /// Use this backend instead of building an ONNX session
    pub fn backend(mut self, backend: Box<dyn InferenceBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn build(self) -> Result<Arc<InstructAdapter>> {
        let model_dir = self
            .model_dir
            .ok_or_else(|| AdapterError::config("model_dir must be provided"))?;

        let adapter = match self.backend {
            Some(backend) => InstructAdapter::load_with_backend(model_dir, self.config, backend)?,
            None => InstructAdapter::load(model_dir, self.config)?,
        };
        Ok(Arc::new(adapter))
    }
}
