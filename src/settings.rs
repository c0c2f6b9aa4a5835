//! Application settings.
//!
//! Reads an optional YAML file and resolves environment variables. Every
//! field has a default, so running without a settings file is valid.
//!
//! ```yaml
//! completion:
//!   base_url: "${LLM_BASE_URL:-http://localhost:11434/v1}"
//!   model: "qwen2.5:7b"
//! http:
//!   port: 3000
//! engine:
//!   max_tool_rounds: 10
//!   call_timeout_ms: 30000
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::agent_core::engine::{EngineConfig, DEFAULT_MAX_TOOL_ROUNDS};
use crate::inference::config::CompletionConfig;
use crate::provider::connection::{Timeouts, DEFAULT_CALL_TIMEOUT, DEFAULT_HANDSHAKE_TIMEOUT};

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Settings could not be loaded.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("invalid setting: {reason}")]
    Invalid { reason: String },
}

// ─── Public Types ────────────────────────────────────────────────────────────

/// Top-level settings (mirrors the settings YAML file).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub http: HttpSettings,
    #[serde(default)]
    pub engine: EngineSettings,
    /// Providers JSON file, used when none is given on the command line.
    #[serde(default)]
    pub providers_file: Option<String>,
}

/// Where the HTTP server listens.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3000
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Tool-loop limits.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSettings {
    /// Maximum completion rounds that may request tools per query.
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
    /// Per tool call timeout. A call that exceeds it closes its provider.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

fn default_max_tool_rounds() -> usize {
    DEFAULT_MAX_TOOL_ROUNDS
}
fn default_call_timeout_ms() -> u64 {
    DEFAULT_CALL_TIMEOUT.as_millis() as u64
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_tool_rounds: default_max_tool_rounds(),
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

impl EngineSettings {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_tool_rounds: self.max_tool_rounds,
        }
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            handshake: DEFAULT_HANDSHAKE_TIMEOUT,
            call: Duration::from_millis(self.call_timeout_ms),
        }
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Load settings from `path`, or defaults when `None`, then apply
/// environment overrides.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, SettingsError> {
    load_settings_with_env(path, |var| std::env::var(var).ok())
}

fn load_settings_with_env(
    path: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Settings, SettingsError> {
    let mut settings = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path).map_err(|e| SettingsError::Read {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
            parse_settings(&raw, &path.display().to_string())?
        }
        None => Settings::default(),
    };
    settings.apply_env_overrides(env)?;
    Ok(settings)
}

/// Parse settings YAML after env-var interpolation.
pub fn parse_settings(raw: &str, source: &str) -> Result<Settings, SettingsError> {
    let interpolated = interpolate_env_vars(raw);
    // An empty file is valid and means "all defaults".
    if interpolated.trim().is_empty() {
        return Ok(Settings::default());
    }

    let settings: Settings =
        serde_yaml::from_str(&interpolated).map_err(|e| SettingsError::Parse {
            path: source.to_string(),
            reason: e.to_string(),
        })?;

    if settings.engine.call_timeout_ms == 0 {
        return Err(SettingsError::Invalid {
            reason: "engine.call_timeout_ms must be greater than zero".into(),
        });
    }
    Ok(settings)
}

impl Settings {
    /// `PORT` overrides `http.port`.
    fn apply_env_overrides(
        &mut self,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<(), SettingsError> {
        if let Some(port) = env("PORT").filter(|p| !p.trim().is_empty()) {
            self.http.port = port.trim().parse().map_err(|_| SettingsError::Invalid {
                reason: format!("PORT must be a port number, got '{port}'"),
            })?;
        }
        Ok(())
    }
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
pub fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

/// Resolve a variable expression like `VAR` or `VAR:-default`.
fn resolve_var_expr(expr: &str) -> String {
    if let Some((var_name, default)) = expr.split_once(":-") {
        std::env::var(var_name).unwrap_or_else(|_| expand_tilde(default))
    } else {
        std::env::var(expr).unwrap_or_default()
    }
}

/// Expand a leading `~` to the user's home directory.
///
/// Uses `dirs::home_dir()` for cross-platform support (works on macOS,
/// Linux, and Windows where `$HOME` may not be set).
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_interpolate_env_vars_with_default() {
        std::env::remove_var("__TEST_NONEXISTENT_VAR__");
        let input = "${__TEST_NONEXISTENT_VAR__:-/fallback/path}";
        assert_eq!(interpolate_env_vars(input), "/fallback/path");
    }

    #[test]
    fn test_interpolate_env_vars_with_value() {
        std::env::set_var("__TEST_SETTINGS_VAR__", "/custom/path");
        let input = "${__TEST_SETTINGS_VAR__:-/fallback/path}";
        assert_eq!(interpolate_env_vars(input), "/custom/path");
        std::env::remove_var("__TEST_SETTINGS_VAR__");
    }

    #[test]
    fn test_interpolate_no_vars() {
        let input = "plain text with $dollar but no variables";
        assert_eq!(interpolate_env_vars(input), input);
    }

    #[test]
    fn test_expand_tilde() {
        let result = expand_tilde("~/Documents");
        assert!(!result.starts_with('~'), "tilde should be expanded");
        assert!(result.ends_with("/Documents"));
    }

    #[test]
    fn test_defaults() {
        let settings = parse_settings("", "inline").unwrap();
        assert_eq!(settings.http.host, "0.0.0.0");
        assert_eq!(settings.http.port, 3000);
        assert_eq!(settings.engine.max_tool_rounds, 10);
        assert_eq!(settings.engine.timeouts().call, Duration::from_secs(30));
        assert_eq!(settings.completion.max_tokens, 1000);
        assert!(settings.providers_file.is_none());
    }

    #[test]
    fn test_parse_full_settings() {
        let yaml = r#"
            completion:
              base_url: "http://localhost:11434/v1"
              model: "qwen2.5:7b"
            http:
              host: "127.0.0.1"
              port: 8080
            engine:
              max_tool_rounds: 3
              call_timeout_ms: 1500
            providers_file: "providers.json"
        "#;
        let settings = parse_settings(yaml, "inline").unwrap();
        assert_eq!(settings.completion.model, "qwen2.5:7b");
        assert_eq!(settings.http.port, 8080);
        assert_eq!(settings.engine.engine_config().max_tool_rounds, 3);
        assert_eq!(settings.engine.timeouts().call, Duration::from_millis(1500));
        assert_eq!(settings.providers_file.as_deref(), Some("providers.json"));
    }

    #[test]
    fn test_zero_call_timeout_rejected() {
        let err = parse_settings("engine:\n  call_timeout_ms: 0\n", "inline").unwrap_err();
        assert!(matches!(err, SettingsError::Invalid { .. }));
    }

    #[test]
    fn test_port_override() {
        let mut settings = Settings::default();
        settings
            .apply_env_overrides(|var| (var == "PORT").then(|| "4242".to_string()))
            .unwrap();
        assert_eq!(settings.http.port, 4242);

        let err = settings
            .apply_env_overrides(|_| Some("not-a-port".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("not-a-port"));
    }

    #[test]
    fn test_load_settings_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.yaml");
        std::fs::write(&path, "engine:\n  max_tool_rounds: 4\n").unwrap();
        let settings = load_settings_with_env(Some(&path), |_| None).unwrap();
        assert_eq!(settings.engine.max_tool_rounds, 4);
        assert_eq!(settings.http.port, 3000);

        let missing =
            load_settings_with_env(Some(&tmp.path().join("missing.yaml")), |_| None).unwrap_err();
        assert!(matches!(missing, SettingsError::Read { .. }));
    }

    #[test]
    fn test_load_settings_applies_port_from_env() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.yaml");
        std::fs::write(&path, "http:\n  port: 9000\n").unwrap();

        let env = |var: &str| (var == "PORT").then(|| "4242".to_string());
        let settings = load_settings_with_env(Some(&path), env).unwrap();
        assert_eq!(settings.http.port, 4242);

        let settings = load_settings_with_env(None, env).unwrap();
        assert_eq!(settings.http.port, 4242);

        let err = load_settings_with_env(None, |_| Some("eighty".into())).unwrap_err();
        assert!(matches!(err, SettingsError::Invalid { .. }));
    }
}
