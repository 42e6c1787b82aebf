use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::status::Status;

/// Serialized projection of one named element, as embedded in the page's
/// hidden model field. Field names follow the page contract
/// (`type` / `validationStatus` / `validationMessage`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub name: String,
    #[serde(default)]
    pub value: Value,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "validationStatus", default)]
    pub status: Option<Status>,
    #[serde(rename = "validationMessage", default)]
    pub message: Option<String>,
}

/// Parses the serialized model blob, a JSON array of entries.
pub fn parse_model(text: &str) -> Result<Vec<ModelEntry>, serde_json::Error> {
    serde_json::from_str(text)
}

pub fn serialize_model(entries: &[ModelEntry]) -> Result<String, serde_json::Error> {
    serde_json::to_string(entries)
}

/// How a model value is written back into a DOM control: strings pass
/// through, null clears the control, everything else uses its JSON text.
pub(crate) fn value_to_dom_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
