use anyhow::{bail, Context};
use instruct_onnx::{AdapterConfig, InstructAdapter, ModelAdapter, PromptRequest};
use std::path::PathBuf;

pub struct PredictArgs {
    pub model_dir: PathBuf,
    pub prompt: Option<String>,
    pub input: Option<PathBuf>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
    pub seed: Option<u64>,
    pub device: Option<String>,
    pub config: Option<PathBuf>,
}

fn build_request(args: &PredictArgs) -> anyhow::Result<PromptRequest> {
    let mut request = match (&args.prompt, &args.input) {
        (Some(prompt), None) => PromptRequest::new(prompt.clone()),
        (None, Some(path)) => {
            let payload = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            PromptRequest::from_json_str(&payload)?
        }
        _ => bail!("pass exactly one of --prompt or --input"),
    };

    if let Some(temperature) = args.temperature {
        request = request.with_temperature(temperature);
    }
    if let Some(max_tokens) = args.max_tokens {
        request = request.with_max_tokens(max_tokens);
    }
    request.params.validate()?;
    Ok(request)
}

pub fn run_predict(args: PredictArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => AdapterConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => AdapterConfig::default(),
    };
    if let Some(device) = &args.device {
        config.device = device.clone();
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }

    let request = build_request(&args)?;

    log::info!("Loading model from {}", args.model_dir.display());
    let adapter = InstructAdapter::load(&args.model_dir, config)?;
    log::info!("Finished model loading");

    let result = adapter.predict(&request)?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> PredictArgs {
        PredictArgs {
            model_dir: PathBuf::from("unused"),
            prompt: None,
            input: None,
            temperature: None,
            max_tokens: None,
            seed: None,
            device: None,
            config: None,
        }
    }

    #[test]
    fn test_prompt_flag_with_overrides() {
        let request = build_request(&PredictArgs {
            prompt: Some("What is machine learning?".into()),
            max_tokens: Some(8),
            ..args()
        })
        .unwrap();

        assert_eq!(request.prompt().unwrap(), "What is machine learning?");
        assert_eq!(request.params.max_tokens(), 8);
        assert_eq!(request.params.temperature(), 0.1);
    }

    #[test]
    fn test_negative_temperature_flag_rejected() {
        let result = build_request(&PredictArgs {
            prompt: Some("hello".into()),
            temperature: Some(-1.0),
            ..args()
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_requires_prompt_or_input() {
        assert!(build_request(&args()).is_err());
    }
}
