//! Autoregressive decode loop

mod sampling;

pub use sampling::{argmax, Sampler, Strategy};

use crate::artifact::ModelConfig;
use crate::error::{AdapterError, Result};
use crate::runtime::{InferenceInput, InferenceRuntime, Tensor};
use tokenizers::Tokenizer;

pub const LOGITS_OUTPUT: &str = "logits";

/// Settings for one generation call
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    pub max_new_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: usize,
    pub do_sample: bool,
    pub seed: Option<u64>,
    /// Generation halts once the decoded continuation contains one of these;
    /// the text is cut right before it.
    pub stop_sequences: Vec<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: 1000,
            temperature: 0.1,
            top_p: 1.0,
            top_k: 50,
            do_sample: true,
            seed: None,
            stop_sequences: Vec::new(),
        }
    }
}

impl GenerationConfig {
    pub fn strategy(&self) -> Strategy {
        if self.do_sample && self.temperature > 0.0 {
            Strategy::Sample {
                temperature: self.temperature,
                top_k: self.top_k,
                top_p: self.top_p,
            }
        } else {
            Strategy::Argmax
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    MaxTokens,
    Eos,
    ContextLength,
    StopSequence,
}

/// Decoded continuation, prompt excluded
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutput {
    pub text: String,
    /// Number of tokens produced after the prompt
    pub tokens: usize,
    pub stop_reason: StopReason,
}

/// Generate a continuation of `prompt`.
///
/// The prompt is encoded with special tokens, extended one sampled token at a
/// time, and only the tokens after the prompt are decoded (special tokens
/// skipped).
pub fn generate(
    runtime: &mut InferenceRuntime,
    tokenizer: &Tokenizer,
    model_config: &ModelConfig,
    prompt: &str,
    config: &GenerationConfig,
) -> Result<GenerationOutput> {
    let encoding = tokenizer
        .encode(prompt, true)
        .map_err(|e| AdapterError::generation(format!("Tokenization failed: {e}")))?;
    let prompt_ids: Vec<u32> = encoding.get_ids().to_vec();
    if prompt_ids.is_empty() {
        return Err(AdapterError::generation("Prompt encoded to zero tokens"));
    }
    let prompt_len = prompt_ids.len();

    let mut budget = config.max_new_tokens;
    let mut context_limited = false;
    if let Some(max_positions) = model_config.max_position_embeddings {
        if prompt_len >= max_positions {
            return Err(AdapterError::generation(format!(
                "Prompt of {prompt_len} tokens fills the model context of {max_positions}"
            )));
        }
        if budget > max_positions - prompt_len {
            budget = max_positions - prompt_len;
            context_limited = true;
        }
    }

    log::info!(
        "Starting generation with {prompt_len} prompt tokens, max_new_tokens: {}",
        config.max_new_tokens
    );

    let mut sampler = Sampler::new(config.strategy(), config.seed);
    let mut tokens = prompt_ids;
    let mut stop_reason = if context_limited {
        StopReason::ContextLength
    } else {
        StopReason::MaxTokens
    };
    let mut stop_at: Option<usize> = None;

    for step in 0..budget {
        log::debug!("Generation step {}/{budget}", step + 1);

        let logits = next_token_logits(runtime, model_config, &tokens)?;
        let next_token = sampler.sample(&logits)?;
        log::debug!("Sampled token {next_token}");

        if model_config.is_eos(next_token) {
            stop_reason = StopReason::Eos;
            break;
        }
        tokens.push(next_token);

        if !config.stop_sequences.is_empty() {
            let text = decode(tokenizer, &tokens[prompt_len..])?;
            if let Some(pos) = find_stop(&text, &config.stop_sequences) {
                stop_at = Some(pos);
                stop_reason = StopReason::StopSequence;
                break;
            }
        }
    }

    let generated = &tokens[prompt_len..];
    let mut text = decode(tokenizer, generated)?;
    if let Some(pos) = stop_at {
        text.truncate(pos);
    }

    log::info!(
        "Generation completed: {} new tokens, stop reason {stop_reason:?}",
        generated.len()
    );

    Ok(GenerationOutput {
        text,
        tokens: generated.len(),
        stop_reason,
    })
}

fn next_token_logits(
    runtime: &mut InferenceRuntime,
    model_config: &ModelConfig,
    tokens: &[u32],
) -> Result<Vec<f32>> {
    let seq_len = tokens.len();
    let input = InferenceInput::new()
        .add_input(
            "input_ids",
            Tensor::i64_row(tokens.iter().map(|&t| t as i64).collect()),
        )
        .add_input("attention_mask", Tensor::i64_row(vec![1; seq_len]))
        .add_input("position_ids", Tensor::i64_row((0..seq_len as i64).collect()));

    let output = runtime.infer(input)?;
    let logits = output
        .get_output(LOGITS_OUTPUT)
        .ok_or_else(|| AdapterError::generation("No logits output found"))?;
    let data = logits
        .as_f32()
        .ok_or_else(|| AdapterError::generation("Logits output is not f32"))?;

    // [batch, seq, vocab] or [batch, vocab]; the last row is the next token
    let vocab = logits.shape().last().copied().unwrap_or(0);
    if vocab == 0 || data.len() < vocab || data.len() % vocab != 0 {
        return Err(AdapterError::generation(format!(
            "Invalid logits shape {:?}",
            logits.shape()
        )));
    }
    if let Some(expected) = model_config.vocab_size {
        if vocab != expected {
            return Err(AdapterError::generation(format!(
                "Logits width {vocab} does not match vocab_size {expected}"
            )));
        }
    }

    Ok(data[data.len() - vocab..].to_vec())
}

fn decode(tokenizer: &Tokenizer, ids: &[u32]) -> Result<String> {
    tokenizer
        .decode(ids, true)
        .map_err(|e| AdapterError::generation(format!("Failed to decode tokens: {e}")))
}

fn find_stop(text: &str, stop_sequences: &[String]) -> Option<usize> {
    stop_sequences
        .iter()
        .filter(|s| !s.is_empty())
        .filter_map(|s| text.find(s.as_str()))
        .min()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_predict_defaults() {
        let config = GenerationConfig::default();
        assert_eq!(config.temperature, 0.1);
        assert_eq!(config.max_new_tokens, 1000);
        assert!(config.do_sample);
    }

    #[test]
    fn test_zero_temperature_is_greedy() {
        let config = GenerationConfig {
            temperature: 0.0,
            ..Default::default()
        };
        assert_eq!(config.strategy(), Strategy::Argmax);

        let config = GenerationConfig {
            do_sample: false,
            ..Default::default()
        };
        assert_eq!(config.strategy(), Strategy::Argmax);
    }

    #[test]
    fn test_find_stop_takes_earliest_match() {
        let stops = vec!["### Instruction:".to_string(), "\n\n".to_string()];
        assert_eq!(find_stop("abc\n\nx ### Instruction:", &stops), Some(3));
        assert_eq!(find_stop("plain answer", &stops), None);
        assert_eq!(find_stop("anything", &[String::new()]), None);
    }
}
