#![allow(dead_code)]

use instruct_onnx::runtime::{InferenceBackend, InferenceInput, InferenceOutput, Tensor};
use instruct_onnx::{AdapterError, Result};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const UNK: u32 = 0;
pub const EOS: u32 = 1;

pub const VOCAB: &[&str] = &[
    "[UNK]",
    "</s>",
    "###",
    "Instruction",
    ":",
    "Response",
    "Machine",
    "learning",
    "is",
    "fun",
    "What",
    "machine",
    "?",
    "hello",
    "world",
    "### Instruction:",
    " ",
];

pub fn token(word: &str) -> u32 {
    VOCAB
        .iter()
        .position(|w| *w == word)
        .unwrap_or_else(|| panic!("{word} not in test vocab")) as u32
}

pub fn tokens(words: &str) -> Vec<u32> {
    words.split(' ').map(token).collect()
}

pub fn tokenizer_json() -> Value {
    tokenizer_json_with_decoder(Value::Null)
}

/// With no decoder, decoded tokens are joined by spaces; `{"type": "Fuse"}`
/// concatenates them as-is.
pub fn tokenizer_json_with_decoder(decoder: Value) -> Value {
    let vocab: serde_json::Map<String, Value> = VOCAB
        .iter()
        .enumerate()
        .map(|(i, w)| (w.to_string(), json!(i)))
        .collect();

    json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [{
            "id": EOS,
            "content": "</s>",
            "single_word": false,
            "lstrip": false,
            "rstrip": false,
            "normalized": false,
            "special": true
        }],
        "normalizer": null,
        "pre_tokenizer": { "type": "Whitespace" },
        "post_processor": null,
        "decoder": decoder,
        "model": {
            "type": "WordLevel",
            "vocab": vocab,
            "unk_token": "[UNK]"
        }
    })
}

/// A bundle with tokenizer and config but no ONNX graph
pub fn write_bundle(dir: &Path, config: Value) {
    write_bundle_with_tokenizer(dir, config, tokenizer_json());
}

pub fn write_bundle_with_tokenizer(dir: &Path, config: Value, tokenizer: Value) {
    std::fs::write(
        dir.join("tokenizer.json"),
        serde_json::to_string_pretty(&tokenizer).unwrap(),
    )
    .unwrap();
    std::fs::write(dir.join("config.json"), config.to_string()).unwrap();
}

fn test_config() -> Value {
    json!({
        "model_type": "test",
        "vocab_size": VOCAB.len(),
        "eos_token_id": EOS,
    })
}

pub fn bundle_dir() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_bundle(dir.path(), test_config());
    dir
}

/// Like [`bundle_dir`] but the tokenizer decodes by plain concatenation, so
/// a marker can be spelled out over several tokens including `" "`.
pub fn fused_bundle_dir() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_bundle_with_tokenizer(
        dir.path(),
        test_config(),
        tokenizer_json_with_decoder(json!({ "type": "Fuse" })),
    );
    dir
}

/// Shared view of what a backend saw
#[derive(Clone, Default)]
pub struct Calls {
    count: Arc<AtomicUsize>,
    lengths: Arc<Mutex<Vec<usize>>>,
}

impl Calls {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn lengths(&self) -> Vec<usize> {
        self.lengths.lock().unwrap().clone()
    }

    fn record(&self, len: usize) {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.lengths.lock().unwrap().push(len);
    }
}

/// What the scripted backend emits at a generation step
#[derive(Clone)]
pub enum Script {
    /// Peaked logits on these tokens in order, then `then` forever
    Tokens { tokens: Vec<u32>, then: u32 },
    /// Equal logits for every token
    Uniform,
    /// Returns an output without logits
    NoLogits,
    /// Fails every call
    Fail,
}

/// Backend that returns logits from a fixed script. The step index is the
/// number of tokens appended since the current call's prompt.
pub struct ScriptedBackend {
    script: Script,
    calls: Calls,
    start_len: usize,
    last_len: Option<usize>,
}

impl ScriptedBackend {
    pub fn new(script: Script) -> (Self, Calls) {
        let calls = Calls::default();
        let backend = Self {
            script,
            calls: calls.clone(),
            start_len: 0,
            last_len: None,
        };
        (backend, calls)
    }

    pub fn boxed(script: Script) -> (Box<dyn InferenceBackend>, Calls) {
        let (backend, calls) = Self::new(script);
        (Box::new(backend), calls)
    }
}

impl InferenceBackend for ScriptedBackend {
    fn backend_type(&self) -> &str {
        "scripted"
    }

    fn infer(&mut self, input: InferenceInput) -> Result<InferenceOutput> {
        let ids = input
            .get_input("input_ids")
            .and_then(Tensor::as_i64)
            .ok_or_else(|| AdapterError::generation("missing input_ids"))?;
        let seq_len = ids.len();
        let mask = input.get_input("attention_mask").unwrap();
        let positions = input.get_input("position_ids").unwrap();
        assert_eq!(mask.shape(), &[1, seq_len]);
        assert_eq!(positions.as_i64().unwrap().last(), Some(&(seq_len as i64 - 1)));

        self.calls.record(seq_len);
        if self.last_len.is_none_or(|last| seq_len <= last) {
            self.start_len = seq_len;
        }
        self.last_len = Some(seq_len);
        let step = seq_len - self.start_len;

        let vocab = VOCAB.len();
        let logits = match &self.script {
            Script::Tokens { tokens, then } => {
                let next = tokens.get(step).copied().unwrap_or(*then) as usize;
                let mut logits = vec![0.0; vocab];
                logits[next] = 20.0;
                logits
            }
            Script::Uniform => vec![1.0; vocab],
            Script::NoLogits => return Ok(InferenceOutput::new()),
            Script::Fail => return Err(AdapterError::generation("backend exploded")),
        };

        Ok(InferenceOutput::new().add_output(
            "logits",
            Tensor::F32 {
                shape: vec![1, 1, vocab],
                data: logits,
            },
        ))
    }
}
