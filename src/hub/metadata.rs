//! Model information fetched from the hub
//!
//! Extracts the chat template from `tokenizer_config.json` and architecture
//! details from `config.json`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Everything the hub returned for one model; any part may be missing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubModelInfo {
    pub model_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokenizer_config: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_config: Option<Value>,
}

impl HubModelInfo {
    /// True when none of the fetches returned data
    pub fn is_empty(&self) -> bool {
        self.metadata.is_none() && self.tokenizer_config.is_none() && self.model_config.is_none()
    }

    /// Chat template declared by the tokenizer config
    ///
    /// Handles both the plain string form and the named-template list form,
    /// where the `default` entry wins and the first entry is the fallback.
    pub fn chat_template(&self) -> Option<String> {
        let template = self.tokenizer_config.as_ref()?.get("chat_template")?;

        match template {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Array(entries) => {
                entries
                    .iter()
                    .find(|entry| entry.get("name").and_then(Value::as_str) == Some("default"))
                    .or_else(|| entries.first())
                    .and_then(|entry| entry.get("template"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            }
            _ => None,
        }
    }

    /// Pipeline tag from the model card metadata (e.g. "text-generation")
    pub fn pipeline_tag(&self) -> Option<&str> {
        self.metadata.as_ref()?.get("pipeline_tag")?.as_str()
    }

    /// Architecture summary parsed from config.json
    pub fn summary(&self) -> Option<ModelSummary> {
        parse_model_config(self.model_config.as_ref()?)
    }
}

/// Architecture details extracted from a model's config.json
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelSummary {
    /// Model architecture type (e.g., "llama", "mistral", "qwen2")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_type: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub architectures: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub hidden_size: Option<u64>,

    /// Maximum sequence length
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_position_embeddings: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub vocab_size: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_hidden_layers: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub torch_dtype: Option<String>,
}

/// Raw config.json structure (partial)
#[derive(Debug, Deserialize)]
struct RawConfig {
    model_type: Option<String>,
    #[serde(default)]
    architectures: Vec<String>,
    hidden_size: Option<u64>,
    max_position_embeddings: Option<u64>,
    vocab_size: Option<u64>,
    num_hidden_layers: Option<u64>,
    torch_dtype: Option<String>,
    // Some models use different names
    d_model: Option<u64>,
    n_positions: Option<u64>,
    n_layer: Option<u64>,
}

/// Parse a model summary from config.json contents
///
/// Returns `None` if the document does not look like a model config.
pub fn parse_model_config(config: &Value) -> Option<ModelSummary> {
    let raw: RawConfig = serde_json::from_value(config.clone()).ok()?;

    Some(ModelSummary {
        model_type: raw.model_type,
        architectures: raw.architectures,
        hidden_size: raw.hidden_size.or(raw.d_model),
        max_position_embeddings: raw.max_position_embeddings.or(raw.n_positions),
        vocab_size: raw.vocab_size,
        num_hidden_layers: raw.num_hidden_layers.or(raw.n_layer),
        torch_dtype: raw.torch_dtype,
    })
}

/// Rough parameter count for a decoder-only transformer
pub fn estimate_parameters(summary: &ModelSummary) -> Option<u64> {
    let hidden = summary.hidden_size?;
    let layers = summary.num_hidden_layers?;
    let vocab = summary.vocab_size?;

    // Embedding: vocab * hidden; per layer: ~12 * hidden^2 (attention + FFN)
    let embedding_params = vocab.checked_mul(hidden)?;
    let layer_params = layers.checked_mul(12)?.checked_mul(hidden)?.checked_mul(hidden)?;

    embedding_params.checked_add(layer_params)
}
