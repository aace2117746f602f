use instruct_onnx::ModelSignature;
use serde_json::json;

pub fn run_signature() -> anyhow::Result<()> {
    let document = json!({
        "signature": ModelSignature::default(),
        "input_example": ModelSignature::input_example(),
    });
    println!("{}", serde_json::to_string_pretty(&document)?);
    Ok(())
}
