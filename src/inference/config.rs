//! Completion endpoint configuration.
//!
//! Lives under the `completion:` key of the settings file. Any
//! OpenAI-compatible endpoint works; switching models is a config change,
//! not a code change.

use serde::Deserialize;

/// Env vars consulted, in order, when no API key is configured.
pub const API_KEY_ENV_VARS: [&str; 2] = ["TOOLRELAY_API_KEY", "OPENAI_API_KEY"];

/// Runtime configuration for the completion endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionConfig {
    /// Base URL up to and including the API version, e.g. `http://localhost:11434/v1`.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Bearer token. Empty means "look at the environment".
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Omitted from requests when unset, leaving the endpoint's default.
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Prepended to every request as a system message.
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_max_tokens() -> u32 {
    1000
}
fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            max_tokens: default_max_tokens(),
            temperature: None,
            system_prompt: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl CompletionConfig {
    /// The configured API key, or the first non-empty one from the environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| {
                API_KEY_ENV_VARS
                    .iter()
                    .find_map(|var| std::env::var(var).ok().filter(|k| !k.is_empty()))
            })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
