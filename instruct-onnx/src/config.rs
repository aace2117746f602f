//! Adapter configuration
//!
//! Everything here is fixed for the lifetime of a loaded adapter. Per-call
//! knobs (temperature, max_tokens) travel with the request instead.

use crate::error::{AdapterError, Result};
use crate::generation::GenerationConfig;
use crate::prompt::{PromptTemplate, INSTRUCTION_KEY};
use crate::schema::PredictParams;
use crate::Device;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Device string such as `cpu`, `cpu:4` or `cuda:0`
    pub device: String,
    pub top_p: f32,
    /// `0` disables top-k filtering
    pub top_k: usize,
    /// Seeds the sampler on every call when set
    pub seed: Option<u64>,
    /// minijinja source with an `instruction` variable
    pub prompt_template: Option<String>,
    pub stop_sequences: Vec<String>,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            device: "cpu".to_string(),
            top_p: 1.0,
            top_k: 50,
            seed: None,
            prompt_template: None,
            stop_sequences: vec![INSTRUCTION_KEY.to_string()],
        }
    }
}

impl AdapterConfig {
    /// Read a JSON config file; missing fields take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(AdapterError::config(format!(
                "top_p must be in (0, 1], got {}",
                self.top_p
            )));
        }
        self.device()?;
        self.template()?;
        Ok(())
    }

    pub fn device(&self) -> Result<Device> {
        self.device.parse()
    }

    pub fn template(&self) -> Result<PromptTemplate> {
        match &self.prompt_template {
            Some(source) => PromptTemplate::new(source.as_str()),
            None => Ok(PromptTemplate::default()),
        }
    }

    /// Merge per-call parameters into a full generation config
    pub fn generation_config(&self, params: &PredictParams) -> GenerationConfig {
        GenerationConfig {
            max_new_tokens: params.max_tokens(),
            temperature: params.temperature(),
            top_p: self.top_p,
            top_k: self.top_k,
            do_sample: true,
            seed: self.seed,
            stop_sequences: self.stop_sequences.clone(),
        }
    }
}
