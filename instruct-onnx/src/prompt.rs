//! Instruction prompt templates

use crate::error::{AdapterError, Result};
use minijinja::{context, Environment, UndefinedBehavior};

pub const INSTRUCTION_KEY: &str = "### Instruction:";
pub const RESPONSE_KEY: &str = "### Response:";

/// Default template wrapping a user instruction for instruction-tuned models
pub const DEFAULT_TEMPLATE: &str = "Below is an instruction that describes a task. \
Write a response that appropriately completes the request.\n\
### Instruction:\n\
{{ instruction }}\n\
### Response:\n";

const TEMPLATE_NAME: &str = "instruction";

/// A minijinja template with a single `instruction` variable
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    source: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            source: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplate {
    /// Compile-check a template source. It must render and must embed the
    /// instruction.
    pub fn new(source: impl Into<String>) -> Result<Self> {
        let template = Self {
            source: source.into(),
        };

        const MARKER: &str = "\u{1}instruction\u{1}";
        let rendered = template
            .render_with(MARKER)
            .map_err(|e| AdapterError::config(format!("Invalid prompt template: {e}")))?;
        if !rendered.contains(MARKER) {
            return Err(AdapterError::config(
                "Prompt template never renders {{ instruction }}",
            ));
        }

        Ok(template)
    }

    pub fn render(&self, instruction: &str) -> Result<String> {
        self.render_with(instruction)
            .map_err(|e| AdapterError::generation(format!("Failed to render prompt: {e}")))
    }

    fn render_with(&self, instruction: &str) -> std::result::Result<String, minijinja::Error> {
        let mut env = Environment::new();
        env.set_keep_trailing_newline(true);
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.add_template(TEMPLATE_NAME, &self.source)?;

        env.get_template(TEMPLATE_NAME)?
            .render(context! { instruction => instruction })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_template_layout() {
        let prompt = PromptTemplate::default()
            .render("What is machine learning?")
            .unwrap();

        assert_eq!(
            prompt,
            "Below is an instruction that describes a task. Write a response that \
             appropriately completes the request.\n### Instruction:\nWhat is machine \
             learning?\n### Response:\n"
        );
        assert!(prompt.ends_with(&format!("{RESPONSE_KEY}\n")));
    }

    #[test]
    fn test_instruction_is_not_escaped() {
        let prompt = PromptTemplate::default().render("a < b && \"c\"").unwrap();
        assert!(prompt.contains("a < b && \"c\""));
    }

    #[test]
    fn test_custom_template() {
        let template = PromptTemplate::new("Q: {{ instruction }}\nA:").unwrap();
        assert_eq!(template.render("2+2?").unwrap(), "Q: 2+2?\nA:");
    }

    #[test]
    fn test_template_must_use_instruction() {
        let err = PromptTemplate::new("no placeholder here").unwrap_err();
        assert!(matches!(err, AdapterError::Config(_)));
    }

    #[test]
    fn test_template_rejects_unknown_variables() {
        assert!(PromptTemplate::new("{{ instruction }} {{ missing }}").is_err());
        assert!(PromptTemplate::new("{% if %}").is_err());
    }
}
