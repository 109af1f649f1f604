//! Wire shapes exchanged with callers and with the upstream server

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::ProxyError;

/// A generation request as sent by the caller.
///
/// The relay deserializes this only to learn whether the caller asked for a
/// stream; the bytes it forwards upstream are the caller's original body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Absent means streaming, the same default the upstream applies
    #[serde(default = "default_stream")]
    pub stream: bool,
    /// Any other generation parameters, passed through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_stream() -> bool {
    true
}

impl GenerationRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            temperature: None,
            stream: true,
            extra: Map::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Parse an inbound request body
    pub fn from_slice(body: &[u8]) -> Result<Self, ProxyError> {
        serde_json::from_slice(body)
            .map_err(|e| ProxyError::InvalidRequest(format!("Body is not a generation request: {e}")))
    }
}

/// One decoded line of an upstream generation stream, or the whole body of a
/// buffered generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub done: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Body of the upstream `GET /api/tags` response
#[derive(Debug, Clone, Deserialize)]
pub struct TagsResponse {
    #[serde(default)]
    pub models: Vec<ModelTag>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelTag {
    pub name: String,
}

/// Body of the relay's status endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelStatus {
    pub available: bool,
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ModelStatus {
    pub fn available(models: Vec<String>) -> Self {
        Self {
            available: true,
            models,
            error: None,
        }
    }

    pub fn unavailable(error: impl Into<String>) -> Self {
        Self {
            available: false,
            models: Vec::new(),
            error: Some(error.into()),
        }
    }
}
