//! Tool catalog — one flat tool namespace across every live provider.
//!
//! Qualification rule, the single source of truth for tool naming:
//! - exactly one provider: tools keep their raw names (`add`)
//! - two or more providers: every tool is `provider.raw` (`calc.add`),
//!   whether or not its raw name collides with another provider's
//!
//! Provider names never contain `.`, so a qualified name splits unambiguously
//! at its first dot.

use std::collections::HashMap;

use crate::inference::types::{FunctionDefinition, ToolDefinition};

use super::errors::InvocationError;
use super::pool::ConnectionPool;
use super::types::RawTool;

/// Separator between provider name and raw tool name.
pub const QUALIFIER: char = '.';

// ─── NamespacedTool ──────────────────────────────────────────────────────────

/// A provider tool under its externally visible name.
#[derive(Debug, Clone, PartialEq)]
pub struct NamespacedTool {
    pub qualified_name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
    pub owner_provider: String,
    pub raw_name: String,
}

// ─── ToolCatalog ─────────────────────────────────────────────────────────────

/// Bidirectional mapping `qualified name ↔ (provider, raw name)`.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    /// Tools in provider start order, then provider listing order.
    tools: Vec<NamespacedTool>,
    by_qualified: HashMap<String, usize>,
    by_route: HashMap<(String, String), usize>,
    providers: Vec<String>,
}

impl ToolCatalog {
    /// Build from every `Ready` connection in the pool.
    pub fn build(pool: &ConnectionPool) -> Self {
        let listings: Vec<(String, Vec<RawTool>)> = pool
            .ready_connections()
            .iter()
            .filter_map(|conn| {
                let tools = conn.list_capabilities().ok()?.to_vec();
                Some((conn.name().to_string(), tools))
            })
            .collect();
        Self::from_listings(listings)
    }

    /// Build from `(provider, tools)` listings in provider order.
    pub fn from_listings(listings: Vec<(String, Vec<RawTool>)>) -> Self {
        let qualify = listings.len() > 1;
        let mut catalog = Self::default();

        for (provider, tools) in listings {
            for raw in tools {
                let route = (provider.clone(), raw.name.clone());
                if catalog.by_route.contains_key(&route) {
                    tracing::warn!(
                        provider = %provider,
                        tool = %raw.name,
                        "provider listed the same tool twice, keeping the first"
                    );
                    continue;
                }

                let qualified_name = if qualify {
                    format!("{provider}{QUALIFIER}{}", raw.name)
                } else {
                    raw.name.clone()
                };
                if catalog.by_qualified.contains_key(&qualified_name) {
                    tracing::warn!(
                        provider = %provider,
                        tool = %raw.name,
                        qualified = %qualified_name,
                        "qualified name already taken by another provider, keeping the first"
                    );
                    continue;
                }

                let index = catalog.tools.len();
                catalog.by_qualified.insert(qualified_name.clone(), index);
                catalog.by_route.insert(route, index);
                catalog.tools.push(NamespacedTool {
                    qualified_name,
                    description: raw.description,
                    input_schema: raw.input_schema,
                    owner_provider: provider.clone(),
                    raw_name: raw.name,
                });
            }
            catalog.providers.push(provider);
        }

        tracing::info!(
            providers = catalog.providers.len(),
            tools = catalog.tools.len(),
            qualified = qualify,
            "tool catalog built"
        );
        catalog
    }

    // ─── Lookup ──────────────────────────────────────────────────────────

    /// Map a name chosen by the model back to its owning provider and raw name.
    ///
    /// An advertised name always resolves to itself. Otherwise `provider.raw`
    /// is accepted whenever `provider` is known, and a bare name only when
    /// exactly one provider is connected. Returns `None` instead of guessing.
    pub fn resolve(&self, name: &str) -> Option<&NamespacedTool> {
        if let Some(tool) = self.get(name) {
            return Some(tool);
        }
        if let Some((provider, raw)) = name.split_once(QUALIFIER) {
            if let Some(tool) = self.by_provider_and_raw(provider, raw) {
                return Some(tool);
            }
        }

        match self.providers.as_slice() {
            [only] => self.by_provider_and_raw(only, name),
            _ => None,
        }
    }

    fn by_provider_and_raw(&self, provider: &str, raw: &str) -> Option<&NamespacedTool> {
        self.by_route
            .get(&(provider.to_string(), raw.to_string()))
            .map(|&i| &self.tools[i])
    }

    /// Look up a tool by its exact qualified name.
    pub fn get(&self, qualified_name: &str) -> Option<&NamespacedTool> {
        self.by_qualified.get(qualified_name).map(|&i| &self.tools[i])
    }

    /// All tools, in catalog order.
    pub fn tools(&self) -> &[NamespacedTool] {
        &self.tools
    }

    /// Qualified names, in catalog order.
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.qualified_name.as_str()).collect()
    }

    /// Providers that contributed to this catalog (including ones with no tools).
    pub fn provider_names(&self) -> &[String] {
        &self.providers
    }

    /// Count tools belonging to a specific provider.
    pub fn tools_for_provider(&self, provider: &str) -> usize {
        self.tools
            .iter()
            .filter(|t| t.owner_provider == provider)
            .count()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    // ─── Export ──────────────────────────────────────────────────────────

    /// Tool declarations for the completion service's function-calling API.
    pub fn export_for_completion_service(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|tool| ToolDefinition {
                r#type: "function".to_string(),
                function: FunctionDefinition {
                    name: tool.qualified_name.clone(),
                    description: tool.description.clone(),
                    parameters: tool.input_schema.clone(),
                },
            })
            .collect()
    }

    // ─── Validation ──────────────────────────────────────────────────────

    /// Check arguments against the tool's declared schema.
    ///
    /// Structural only: arguments must be an object, every `required`
    /// property must be present, and top-level properties that declare a
    /// primitive `type` must match it. Deeper validation is left to the
    /// provider.
    pub fn validate_arguments(
        tool: &NamespacedTool,
        arguments: &serde_json::Value,
    ) -> Result<(), InvocationError> {
        let invalid = |reason: String| InvocationError::InvalidArguments {
            tool: tool.qualified_name.clone(),
            reason,
        };

        let args = match arguments {
            serde_json::Value::Object(map) => map,
            other => return Err(invalid(format!("expected an object, got {other}"))),
        };

        if let Some(required) = tool.input_schema.get("required").and_then(|r| r.as_array()) {
            for field in required.iter().filter_map(|f| f.as_str()) {
                if !args.contains_key(field) {
                    return Err(invalid(format!("missing required field: '{field}'")));
                }
            }
        }

        if let Some(properties) = tool.input_schema.get("properties").and_then(|p| p.as_object()) {
            for (key, value) in args {
                let expected = properties
                    .get(key)
                    .and_then(|p| p.get("type"))
                    .and_then(|t| t.as_str());
                if let Some(expected) = expected {
                    if !matches_json_type(expected, value) {
                        return Err(invalid(format!("field '{key}' must be of type {expected}")));
                    }
                }
            }
        }

        Ok(())
    }
}

/// Whether `value` has the JSON Schema primitive `type`. Unknown types pass.
fn matches_json_type(expected: &str, value: &serde_json::Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
