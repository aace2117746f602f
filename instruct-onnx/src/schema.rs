//! Request and response records exchanged with the adapter
//!
//! A [`PromptRequest`] is a small table with a required `prompt` column plus
//! optional generation parameters. Only the first row is scored. Requests can
//! be built directly or parsed from the JSON scoring payloads accepted by
//! model-serving endpoints (`dataframe_split`, `dataframe_records`, `inputs`).

use crate::error::{AdapterError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

pub const PROMPT_COLUMN: &str = "prompt";
pub const CANDIDATES_FIELD: &str = "candidates";

pub const DEFAULT_TEMPERATURE: f32 = 0.1;
pub const DEFAULT_MAX_TOKENS: usize = 1000;

/// Optional per-call generation parameters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,
}

impl PredictParams {
    pub fn temperature(&self) -> f32 {
        self.temperature.unwrap_or(DEFAULT_TEMPERATURE)
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)
    }

    /// Reject values generation cannot honor. Every entry point runs this,
    /// whether the params came from JSON or a builder.
    pub fn validate(&self) -> Result<()> {
        if let Some(t) = self.temperature {
            if !t.is_finite() || t < 0.0 {
                return Err(AdapterError::invalid_input(format!(
                    "temperature must be a non-negative number, got {t}"
                )));
            }
        }
        Ok(())
    }

    /// Parse a `params` object. `null` values count as absent and unknown
    /// names are ignored.
    pub fn from_json(params: &Value) -> Result<Self> {
        let map = match params {
            Value::Null => return Ok(Self::default()),
            Value::Object(map) => map,
            other => {
                return Err(AdapterError::invalid_input(format!(
                    "params must be an object, got {other}"
                )))
            }
        };

        let mut parsed = Self::default();
        for (name, value) in map {
            if value.is_null() {
                continue;
            }
            match name.as_str() {
                "temperature" => {
                    let t = value.as_f64().ok_or_else(|| {
                        AdapterError::invalid_input(format!(
                            "temperature must be a non-negative number, got {value}"
                        ))
                    })?;
                    parsed.temperature = Some(t as f32);
                }
                "max_tokens" => {
                    let n = value.as_u64().ok_or_else(|| {
                        AdapterError::invalid_input(format!(
                            "max_tokens must be a non-negative integer, got {value}"
                        ))
                    })?;
                    parsed.max_tokens = Some(n as usize);
                }
                other => log::warn!("Ignoring unknown parameter '{other}'"),
            }
        }
        parsed.validate()?;
        Ok(parsed)
    }
}

/// Tabular prompt input
#[derive(Debug, Clone, PartialEq)]
pub struct PromptRequest {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    pub params: PredictParams,
}

impl PromptRequest {
    /// Single-row request with default parameters
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            columns: vec![PROMPT_COLUMN.to_string()],
            rows: vec![vec![Value::String(prompt.into())]],
            params: PredictParams::default(),
        }
    }

    pub fn from_table(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        if let Some(row) = rows.iter().find(|row| row.len() != columns.len()) {
            return Err(AdapterError::invalid_input(format!(
                "Row has {} values but the table has {} columns",
                row.len(),
                columns.len()
            )));
        }
        Ok(Self {
            columns,
            rows,
            params: PredictParams::default(),
        })
    }

    pub fn with_params(mut self, params: PredictParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.params.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.params.max_tokens = Some(max_tokens);
        self
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// The `prompt` value of the first row
    pub fn prompt(&self) -> Result<&str> {
        let column = self
            .columns
            .iter()
            .position(|c| c == PROMPT_COLUMN)
            .ok_or_else(|| AdapterError::invalid_input("Input is missing the 'prompt' column"))?;
        let row = self
            .rows
            .first()
            .ok_or_else(|| AdapterError::invalid_input("Input table has no rows"))?;
        if self.rows.len() > 1 {
            log::warn!("Scoring only the first of {} rows", self.rows.len());
        }

        match &row[column] {
            Value::String(prompt) if !prompt.is_empty() => Ok(prompt.as_str()),
            Value::String(_) => Err(AdapterError::invalid_input("prompt must not be empty")),
            other => Err(AdapterError::invalid_input(format!(
                "prompt must be a string, got {other}"
            ))),
        }
    }

    /// Parse a JSON scoring payload
    pub fn from_payload(payload: &Value) -> Result<Self> {
        let object = payload
            .as_object()
            .ok_or_else(|| AdapterError::invalid_input("Payload must be a JSON object"))?;
        let params = PredictParams::from_json(object.get("params").unwrap_or(&Value::Null))?;

        let request = if let Some(split) = object.get("dataframe_split") {
            Self::from_split(split)?
        } else if let Some(records) = object.get("dataframe_records") {
            Self::from_records(records)?
        } else if let Some(inputs) = object.get("inputs") {
            Self::from_columns(inputs)?
        } else {
            return Err(AdapterError::invalid_input(
                "Payload must contain one of dataframe_split, dataframe_records or inputs",
            ));
        };

        Ok(request.with_params(params))
    }

    pub fn from_json_str(payload: &str) -> Result<Self> {
        let payload: Value = serde_json::from_str(payload)
            .map_err(|e| AdapterError::invalid_input(format!("Payload is not valid JSON: {e}")))?;
        Self::from_payload(&payload)
    }

    fn from_split(split: &Value) -> Result<Self> {
        #[derive(Deserialize)]
        struct Split {
            columns: Vec<String>,
            data: Vec<Vec<Value>>,
        }

        let split: Split = serde_json::from_value(split.clone())
            .map_err(|e| AdapterError::invalid_input(format!("Invalid dataframe_split: {e}")))?;
        Self::from_table(split.columns, split.data)
    }

    fn from_records(records: &Value) -> Result<Self> {
        let records: Vec<Map<String, Value>> = serde_json::from_value(records.clone())
            .map_err(|e| AdapterError::invalid_input(format!("Invalid dataframe_records: {e}")))?;

        let mut columns: Vec<String> = Vec::new();
        for record in &records {
            for key in record.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|c| record.get(c).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();
        Self::from_table(columns, rows)
    }

    /// `{"prompt": ["a", "b"]}` or `{"prompt": "a"}`
    fn from_columns(inputs: &Value) -> Result<Self> {
        let inputs = inputs
            .as_object()
            .ok_or_else(|| AdapterError::invalid_input("inputs must be an object of columns"))?;

        let columns: Vec<String> = inputs.keys().cloned().collect();
        let values: Vec<Vec<Value>> = inputs
            .values()
            .map(|v| match v {
                Value::Array(items) => items.clone(),
                scalar => vec![scalar.clone()],
            })
            .collect();

        let num_rows = values.first().map_or(0, Vec::len);
        if values.iter().any(|col| col.len() != num_rows) {
            return Err(AdapterError::invalid_input("inputs columns differ in length"));
        }
        let rows = (0..num_rows)
            .map(|r| values.iter().map(|col| col[r].clone()).collect())
            .collect();
        Self::from_table(columns, rows)
    }
}

/// Adapter output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub candidates: Vec<String>,
}

impl PredictionResult {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidates: vec![candidate.into()],
        }
    }

    pub fn first(&self) -> Option<&str> {
        self.candidates.first().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub default: Value,
}

/// Input, output and parameter schema of the adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSignature {
    pub inputs: Vec<ColumnSpec>,
    pub outputs: Vec<ColumnSpec>,
    pub params: Vec<ParamSpec>,
}

impl Default for ModelSignature {
    fn default() -> Self {
        let column = |name: &str| ColumnSpec {
            name: name.to_string(),
            data_type: "string".to_string(),
            required: true,
        };

        Self {
            inputs: vec![column(PROMPT_COLUMN)],
            outputs: vec![column(CANDIDATES_FIELD)],
            params: vec![
                ParamSpec {
                    name: "temperature".to_string(),
                    data_type: "double".to_string(),
                    default: json!(DEFAULT_TEMPERATURE as f64),
                },
                ParamSpec {
                    name: "max_tokens".to_string(),
                    data_type: "long".to_string(),
                    default: json!(DEFAULT_MAX_TOKENS),
                },
            ],
        }
    }
}

impl ModelSignature {
    pub fn input_example() -> Value {
        json!({ PROMPT_COLUMN: ["What is machine learning?"] })
    }
}
