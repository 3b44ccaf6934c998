//! The provider-agnostic response shape.
//!
//! Provider adapters translate whatever wire format their upstream speaks
//! into this shape; everything above the adapter seam is provider-oblivious.

use crate::message::ToolCall;
use serde::{Deserialize, Serialize};

/// Token counts reported (or estimated) for one completed call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// A successful upstream response, normalized by the adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    pub usage: TokenUsage,
    /// Raw rate-limit headers as `(name, value)` pairs, if the provider sent
    /// any. Consumed by the capacity registry.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<(String, String)>,
}

impl ProviderResponse {
    pub fn text(content: impl Into<String>, usage: TokenUsage) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
            usage,
            headers: Vec::new(),
        }
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }
}
