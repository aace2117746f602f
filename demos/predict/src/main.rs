use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
use commands::{run_predict, run_signature, PredictArgs};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "instruct-predict")]
#[command(about = "Score prompts against a local instruction model")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load an artifact directory and generate a response
    Predict {
        /// Directory holding tokenizer.json, config.json and model.onnx
        #[arg(short, long)]
        model_dir: PathBuf,

        /// Instruction to answer
        #[arg(short, long, conflicts_with = "input")]
        prompt: Option<String>,

        /// JSON scoring payload (dataframe_split, dataframe_records or inputs)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Sampling temperature, overrides the payload params
        #[arg(long)]
        temperature: Option<f32>,

        /// Maximum new tokens, overrides the payload params
        #[arg(long)]
        max_tokens: Option<usize>,

        /// Seed for reproducible sampling
        #[arg(long)]
        seed: Option<u64>,

        /// Execution device, e.g. cpu, cpu:4, cuda:0
        #[arg(long)]
        device: Option<String>,

        /// Adapter config JSON file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the model signature and an input example
    Signature,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Predict {
            model_dir,
            prompt,
            input,
            temperature,
            max_tokens,
            seed,
            device,
            config,
        } => {
            run_predict(PredictArgs {
                model_dir,
                prompt,
                input,
                temperature,
                max_tokens,
                seed,
                device,
                config,
            })?;
        }
        Commands::Signature => {
            run_signature()?;
        }
    }

    Ok(())
}
