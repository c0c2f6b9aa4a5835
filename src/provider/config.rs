//! Provider configuration loading.
//!
//! Providers come from two places:
//! - a JSON file in the common MCP client format
//!   (`{"mcpServers": {"<name>": {"command", "args", "env", "cwd"}}}`,
//!   `servers` is accepted as well)
//! - script paths given on the command line (`weather.py`, `search.js`)
//!
//! String values in the file support `${VAR}` and `${VAR:-default}`.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::Deserialize;

use crate::settings::interpolate_env_vars;

use super::catalog::QUALIFIER;
use super::errors::ConfigError;
use super::types::ProviderConfig;

// ─── File Format ─────────────────────────────────────────────────────────────

/// One entry under `mcpServers`.
#[derive(Debug, Clone, Deserialize)]
struct ProviderEntry {
    command: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: HashMap<String, String>,
    #[serde(default)]
    cwd: Option<String>,
}

/// Top-level providers file. Sorted by name so start order is stable.
#[derive(Debug, Clone, Deserialize)]
struct ProvidersFile {
    #[serde(alias = "mcpServers")]
    servers: BTreeMap<String, ProviderEntry>,
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Load every provider from a JSON file, in name order.
pub fn load_providers_file(path: &Path) -> Result<Vec<ProviderConfig>, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    parse_providers(&raw, &path.display().to_string())
}

/// Parse providers JSON. `source` names the input in error messages.
pub fn parse_providers(raw: &str, source: &str) -> Result<Vec<ProviderConfig>, ConfigError> {
    let file: ProvidersFile = serde_json::from_str(raw).map_err(|e| ConfigError::Parse {
        path: source.to_string(),
        reason: e.to_string(),
    })?;

    file.servers
        .into_iter()
        .map(|(name, entry)| {
            validate_provider_name(&name)?;
            Ok(ProviderConfig {
                name,
                command: interpolate_env_vars(&entry.command),
                args: entry.args.iter().map(|a| interpolate_env_vars(a)).collect(),
                cwd: entry.cwd.as_deref().map(interpolate_env_vars),
                env: entry
                    .env
                    .iter()
                    .map(|(k, v)| (k.clone(), interpolate_env_vars(v)))
                    .collect(),
            })
        })
        .collect()
}

/// Provider names must be non-empty and free of the qualification separator.
pub fn validate_provider_name(name: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.trim().is_empty() {
        return Err(invalid("name is empty"));
    }
    if name.contains(QUALIFIER) {
        return Err(invalid("name must not contain '.'"));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(invalid("name must not contain whitespace"));
    }
    Ok(())
}

// ─── Script Shorthand ────────────────────────────────────────────────────────

/// Platform-correct Python command.
///
/// macOS 12.3+ removed the `python` symlink; only `python3` exists.
/// Windows installs Python as `python.exe` via the official installer.
fn default_python_command() -> &'static str {
    if cfg!(target_os = "windows") {
        "python"
    } else {
        "python3"
    }
}

/// Build a provider from a server script path.
///
/// `.py` runs under Python, `.js` under Node. The provider is named after the
/// file stem, so `servers/weather.py` becomes provider `weather`.
pub fn provider_from_script(script: &str) -> Result<ProviderConfig, ConfigError> {
    let path = Path::new(script);
    let command = match path.extension().and_then(|e| e.to_str()) {
        Some("py") => default_python_command(),
        Some("js") => "node",
        _ => {
            return Err(ConfigError::UnsupportedScript {
                path: script.to_string(),
            })
        }
    };

    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .replace(QUALIFIER, "_");
    validate_provider_name(&name)?;

    Ok(ProviderConfig::new(&name, command, &[script]))
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_mcp_servers_format() {
        let json = r#"{
            "mcpServers": {
                "search": {"command": "npx", "args": ["-y", "search-server"]},
                "calc": {"command": "python3", "args": ["calc.py"], "env": {"MODE": "fast"}, "cwd": "/srv"}
            }
        }"#;
        let providers = parse_providers(json, "inline").unwrap();
        let names: Vec<&str> = providers.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["calc", "search"]);
        assert_eq!(providers[0].env["MODE"], "fast");
        assert_eq!(providers[0].cwd.as_deref(), Some("/srv"));
        assert_eq!(providers[1].args, vec!["-y", "search-server"]);
    }

    #[test]
    fn test_parse_servers_alias() {
        let json = r#"{"servers": {"calc": {"command": "node"}}}"#;
        let providers = parse_providers(json, "inline").unwrap();
        assert_eq!(providers.len(), 1);
        assert!(providers[0].args.is_empty());
    }

    #[test]
    fn test_env_interpolation_in_values() {
        std::env::set_var("__TOOLRELAY_TEST_TOKEN__", "s3cret");
        std::env::remove_var("__TOOLRELAY_TEST_UNSET__");
        let json = r#"{"servers": {"gh": {
            "command": "${__TOOLRELAY_TEST_UNSET__:-npx}",
            "env": {"TOKEN": "${__TOOLRELAY_TEST_TOKEN__}"}
        }}}"#;
        let providers = parse_providers(json, "inline").unwrap();
        assert_eq!(providers[0].command, "npx");
        assert_eq!(providers[0].env["TOKEN"], "s3cret");
        std::env::remove_var("__TOOLRELAY_TEST_TOKEN__");
    }

    #[test]
    fn test_dotted_provider_name_rejected() {
        let json = r#"{"servers": {"my.server": {"command": "node"}}}"#;
        let err = parse_providers(json, "inline").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidName { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("providers.json");
        std::fs::write(&path, r#"{"mcpServers": {"calc": {"command": "node", "args": ["calc.js"]}}}"#)
            .unwrap();
        let providers = load_providers_file(&path).unwrap();
        assert_eq!(providers[0], ProviderConfig::new("calc", "node", &["calc.js"]));

        let missing = load_providers_file(&tmp.path().join("nope.json")).unwrap_err();
        assert!(matches!(missing, ConfigError::Read { .. }));

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            load_providers_file(&path).unwrap_err(),
            ConfigError::Parse { .. }
        ));
    }

    #[test]
    fn test_provider_from_script() {
        let py = provider_from_script("servers/weather.py").unwrap();
        assert_eq!(py.name, "weather");
        assert_eq!(py.command, default_python_command());
        assert_eq!(py.args, vec!["servers/weather.py"]);

        let js = provider_from_script("build/index.js").unwrap();
        assert_eq!(js.name, "index");
        assert_eq!(js.command, "node");

        let dotted = provider_from_script("my.server.js").unwrap();
        assert_eq!(dotted.name, "my_server");

        assert!(matches!(
            provider_from_script("server.rb"),
            Err(ConfigError::UnsupportedScript { .. })
        ));
    }
}
