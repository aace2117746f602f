//! Model artifact bundles
//!
//! A bundle is a directory produced by an external export step. It holds the
//! tokenizer, the model config and (for the ONNX backend) the model graph.
//! Everything here opens files read-only; the bundle is never written to.

use crate::error::{AdapterError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokenizers::Tokenizer;

pub const TOKENIZER_FILE: &str = "tokenizer.json";
pub const CONFIG_FILE: &str = "config.json";
pub const MODEL_FILE: &str = "model.onnx";

/// Subset of `config.json` the decode loop needs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelConfig {
    pub model_type: Option<String>,
    /// Expected width of each logits row
    pub vocab_size: Option<usize>,
    pub max_position_embeddings: Option<usize>,
    /// Some configs list several end-of-sequence ids
    pub eos_token_ids: Vec<u32>,
}

impl ModelConfig {
    pub fn from_json(config: &Value) -> Self {
        let as_usize = |key: &str| config.get(key).and_then(Value::as_u64).map(|v| v as usize);

        let eos_token_ids = match config.get("eos_token_id") {
            Some(Value::Number(n)) => n.as_u64().map(|v| vec![v as u32]).unwrap_or_default(),
            Some(Value::Array(ids)) => ids
                .iter()
                .filter_map(Value::as_u64)
                .map(|v| v as u32)
                .collect(),
            _ => Vec::new(),
        };

        Self {
            model_type: config
                .get("model_type")
                .and_then(Value::as_str)
                .map(str::to_string),
            vocab_size: as_usize("vocab_size"),
            max_position_embeddings: as_usize("max_position_embeddings"),
            eos_token_ids,
        }
    }

    pub fn is_eos(&self, token: u32) -> bool {
        self.eos_token_ids.contains(&token)
    }
}

/// A validated artifact directory
#[derive(Debug, Clone)]
pub struct ArtifactBundle {
    path: PathBuf,
    config: ModelConfig,
    metadata: HashMap<String, Value>,
}

impl ArtifactBundle {
    /// Open a bundle directory, checking the files every backend needs.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if !path.is_dir() {
            return Err(AdapterError::load(format!(
                "Artifact directory does not exist: {}",
                path.display()
            )));
        }

        for required in [TOKENIZER_FILE, CONFIG_FILE] {
            if !path.join(required).is_file() {
                return Err(AdapterError::load(format!(
                    "Artifact bundle {} is missing {required}",
                    path.display()
                )));
            }
        }

        let config_path = path.join(CONFIG_FILE);
        let config_content = std::fs::read_to_string(&config_path).map_err(|e| {
            AdapterError::load(format!("Failed to read {}: {e}", config_path.display()))
        })?;
        let config_json: Value = serde_json::from_str(&config_content).map_err(|e| {
            AdapterError::load(format!("Failed to parse {}: {e}", config_path.display()))
        })?;
        if !config_json.is_object() {
            return Err(AdapterError::load(format!(
                "{} must contain a JSON object",
                config_path.display()
            )));
        }
        let config = ModelConfig::from_json(&config_json);

        let mut metadata = HashMap::new();
        for key in [
            "model_type",
            "vocab_size",
            "hidden_size",
            "max_position_embeddings",
            "bos_token_id",
            "eos_token_id",
            "pad_token_id",
        ] {
            if let Some(value) = config_json.get(key) {
                metadata.insert(key.to_string(), value.clone());
            }
        }
        metadata.insert(
            "path".to_string(),
            Value::String(path.display().to_string()),
        );

        log::info!(
            "Opened artifact bundle {} (model_type={})",
            path.display(),
            config.model_type.as_deref().unwrap_or("unknown")
        );

        Ok(Self {
            path,
            config,
            metadata,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn metadata(&self) -> &HashMap<String, Value> {
        &self.metadata
    }

    /// Path of the ONNX graph, failing if the bundle does not ship one
    pub fn model_file(&self) -> Result<PathBuf> {
        let model_file = self.path.join(MODEL_FILE);
        if !model_file.is_file() {
            return Err(AdapterError::load(format!(
                "ONNX model file not found: {}",
                model_file.display()
            )));
        }
        Ok(model_file)
    }

    pub fn load_tokenizer(&self) -> Result<Tokenizer> {
        let tokenizer_path = self.path.join(TOKENIZER_FILE);
        Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            AdapterError::load(format!(
                "Failed to load tokenizer {}: {e}",
                tokenizer_path.display()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_model_config_from_json() {
        let config = ModelConfig::from_json(&json!({
            "model_type": "mpt",
            "vocab_size": 50432,
            "max_position_embeddings": 2048,
            "bos_token_id": 0,
            "eos_token_id": [0, 50277],
        }));

        assert_eq!(config.model_type.as_deref(), Some("mpt"));
        assert_eq!(config.vocab_size, Some(50432));
        assert_eq!(config.eos_token_ids, vec![0, 50277]);
        assert!(config.is_eos(50277));
        assert_eq!(config.max_position_embeddings, Some(2048));
    }

    #[test]
    fn test_open_missing_directory() {
        let err = ArtifactBundle::open("/definitely/not/a/bundle").unwrap_err();
        assert!(err.is_load_failure());
    }

    #[test]
    fn test_open_missing_tokenizer() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{}").unwrap();

        let err = ArtifactBundle::open(dir.path()).unwrap_err();
        assert!(err.is_load_failure());
        assert!(err.to_string().contains(TOKENIZER_FILE));
    }

    #[test]
    fn test_open_rejects_non_object_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(TOKENIZER_FILE), "{}").unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "[1, 2]").unwrap();

        let err = ArtifactBundle::open(dir.path()).unwrap_err();
        assert!(err.is_load_failure());
    }

    #[test]
    fn test_model_file_required_only_on_request() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(TOKENIZER_FILE), "{}").unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), r#"{"eos_token_id": 2}"#).unwrap();

        let bundle = ArtifactBundle::open(dir.path()).unwrap();
        assert_eq!(bundle.config().eos_token_ids, vec![2]);
        assert!(bundle.metadata().contains_key("eos_token_id"));
        assert!(bundle.model_file().unwrap_err().is_load_failure());
    }
}
