use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Body of a non-2xx backend response. `detail` is usually a string but
/// validation failures carry a structured list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Error)]
#[error("{}", render_detail(.detail))]
pub struct ApiError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl ApiError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: Some(Value::String(detail.into())),
        }
    }

    pub fn detail_message(&self) -> Option<String> {
        match self.detail.as_ref()? {
            Value::Null => None,
            Value::String(text) if text.trim().is_empty() => None,
            Value::String(text) => Some(text.clone()),
            other => Some(other.to_string()),
        }
    }
}

fn render_detail(detail: &Option<Value>) -> String {
    ApiError {
        detail: detail.clone(),
    }
    .detail_message()
    .unwrap_or_else(|| "request failed".to_string())
}
