//! Vendor routing for hosted models.
//!
//! A `vendor/model` name picks the vendor's endpoint, key variable and wire
//! format, and the prefix is stripped before the request. Bare `claude-*`
//! names go to Anthropic; any other name is sent verbatim to the configured
//! OpenAI-compatible `base_url`.

use serde_json::{Value, json};

use crate::core::types::TokenUsage;
use crate::io::config::{ApiSection, VendorEndpoint};

/// Request and response shape spoken by an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wire {
    /// `POST {base}/chat/completions`, bearer auth.
    OpenAiChat,
    /// `POST {base}/messages`, `x-api-key` auth.
    AnthropicMessages,
    /// `POST {base}/models/{model}:generateContent`, `x-goog-api-key` auth.
    GeminiGenerate,
}

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Where and how one model is called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub vendor: &'static str,
    pub wire: Wire,
    pub base_url: String,
    pub api_key_env: String,
    /// Model name as the vendor expects it.
    pub model: String,
}

impl Route {
    pub fn url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        match self.wire {
            Wire::OpenAiChat => format!("{base}/chat/completions"),
            Wire::AnthropicMessages => format!("{base}/messages"),
            Wire::GeminiGenerate => format!("{base}/models/{}:generateContent", self.model),
        }
    }

    pub fn request_body(
        &self,
        system: Option<&str>,
        user: &str,
        temperature: f64,
        max_tokens: u32,
    ) -> Value {
        match self.wire {
            Wire::OpenAiChat => {
                let mut messages = Vec::new();
                if let Some(system) = system {
                    messages.push(json!({"role": "system", "content": system}));
                }
                messages.push(json!({"role": "user", "content": user}));
                json!({
                    "model": self.model,
                    "messages": messages,
                    "temperature": temperature,
                    "max_tokens": max_tokens,
                })
            }
            Wire::AnthropicMessages => {
                let mut body = json!({
                    "model": self.model,
                    "messages": [{"role": "user", "content": user}],
                    "temperature": temperature,
                    "max_tokens": max_tokens,
                });
                if let Some(system) = system {
                    body["system"] = json!(system);
                }
                body
            }
            Wire::GeminiGenerate => {
                let mut body = json!({
                    "contents": [{"role": "user", "parts": [{"text": user}]}],
                    "generationConfig": {
                        "temperature": temperature,
                        "maxOutputTokens": max_tokens,
                    },
                });
                if let Some(system) = system {
                    body["systemInstruction"] = json!({"parts": [{"text": system}]});
                }
                body
            }
        }
    }

    /// Assistant text and usage from a successful response. Missing fields read as empty.
    pub fn read_reply(&self, value: &Value) -> (String, TokenUsage) {
        let count = |v: &Value| v.as_u64().unwrap_or(0);
        match self.wire {
            Wire::OpenAiChat => (
                value["choices"][0]["message"]["content"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string(),
                TokenUsage {
                    input: count(&value["usage"]["prompt_tokens"]),
                    output: count(&value["usage"]["completion_tokens"]),
                },
            ),
            Wire::AnthropicMessages => (
                joined_text(&value["content"], |block| {
                    (block["type"] == "text").then(|| block["text"].as_str()).flatten()
                }),
                TokenUsage {
                    input: count(&value["usage"]["input_tokens"]),
                    output: count(&value["usage"]["output_tokens"]),
                },
            ),
            Wire::GeminiGenerate => (
                joined_text(&value["candidates"][0]["content"]["parts"], |part| {
                    part["text"].as_str()
                }),
                TokenUsage {
                    input: count(&value["usageMetadata"]["promptTokenCount"]),
                    output: count(&value["usageMetadata"]["candidatesTokenCount"]),
                },
            ),
        }
    }
}

fn joined_text<'a>(blocks: &'a Value, text: impl Fn(&'a Value) -> Option<&'a str>) -> String {
    blocks
        .as_array()
        .map(|blocks| blocks.iter().filter_map(text).collect::<Vec<_>>().join(""))
        .unwrap_or_default()
}

/// Pick the endpoint for `model` from the `[api]` settings.
pub fn resolve_route(model: &str, api: &ApiSection) -> Route {
    let model = model.trim();
    let default_route = |vendor: &'static str, name: &str| Route {
        vendor,
        wire: Wire::OpenAiChat,
        base_url: api.base_url.clone(),
        api_key_env: api.api_key_env.clone(),
        model: name.to_string(),
    };
    let Some((prefix, name)) = model.split_once('/') else {
        if model.to_ascii_lowercase().starts_with("claude-") {
            return vendor_route("anthropic", Wire::AnthropicMessages, &api.anthropic, model);
        }
        return default_route("openai", model);
    };
    match prefix.to_ascii_lowercase().as_str() {
        "openai" => default_route("openai", name),
        "anthropic" => vendor_route("anthropic", Wire::AnthropicMessages, &api.anthropic, name),
        "gemini" => vendor_route("gemini", Wire::GeminiGenerate, &api.gemini, name),
        "deepseek" => vendor_route("deepseek", Wire::OpenAiChat, &api.deepseek, name),
        _ => default_route("openai", model),
    }
}

fn vendor_route(
    vendor: &'static str,
    wire: Wire,
    endpoint: &VendorEndpoint,
    model: &str,
) -> Route {
    Route {
        vendor,
        wire,
        base_url: endpoint.base_url.clone(),
        api_key_env: endpoint.api_key_env.clone(),
        model: model.to_string(),
    }
}
