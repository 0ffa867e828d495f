//! Source-group reference resolution
//!
//! Generated configuration may carry placeholders of the form
//! `{group.sources.*.key}`. The `*` is a literal wildcard token that is
//! substituted with the calling source's name at resolution time, so one
//! template serves every source in the group. References resolve
//! against a nested source-group tree:
//!
//! ```yaml
//! asma:
//!   sources:
//!     directory:
//!       customer_id: "3"        # source-level key
//!       dev:
//!         database: asma_dev    # environment-level key
//!       prod:
//!         database: asma_prod
//! ```
//!
//! Resolution fails closed: a reference that cannot be proven valid for
//! every source and environment is rejected before generation, because a
//! partial failure would otherwise surface at deployment time on an
//! unrelated source.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Keys whose table values are ordinary nested fields, not environments.
///
/// Environment detection is a heuristic: any table-valued child of a
/// source that is not in this list is treated as an environment. The
/// list is fixed and must match what generation templates emit.
const NON_ENVIRONMENT_KEYS: &[&str] =
    &["schemas", "customer_id", "name", "description", "table_count"];

static REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\{([^.}]+)\.sources\.\*\.([^.}]+)\}$").expect("Invalid regex pattern")
});

/// A node in the source-group configuration tree
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "serde_yaml::Value")]
pub enum ConfigNode {
    /// Leaf value, rendered to its string form
    Scalar(String),

    /// Nested mapping
    Table(BTreeMap<String, ConfigNode>),
}

impl TryFrom<serde_yaml::Value> for ConfigNode {
    type Error = String;

    fn try_from(value: serde_yaml::Value) -> std::result::Result<Self, String> {
        match value {
            serde_yaml::Value::Null => Ok(ConfigNode::Scalar(String::new())),
            serde_yaml::Value::Bool(b) => Ok(ConfigNode::Scalar(b.to_string())),
            serde_yaml::Value::Number(n) => Ok(ConfigNode::Scalar(n.to_string())),
            serde_yaml::Value::String(s) => Ok(ConfigNode::Scalar(s)),
            serde_yaml::Value::Mapping(map) => {
                let mut table = BTreeMap::new();
                for (k, v) in map {
                    let key = k
                        .as_str()
                        .ok_or_else(|| "mapping keys must be strings".to_string())?
                        .to_string();
                    table.insert(key, ConfigNode::try_from(v)?);
                }
                Ok(ConfigNode::Table(table))
            }
            serde_yaml::Value::Sequence(_) => {
                Err("sequences are not supported in source-group configuration".to_string())
            }
            serde_yaml::Value::Tagged(t) => ConfigNode::try_from(t.value),
        }
    }
}

impl ConfigNode {
    /// Child lookup; `None` for scalars and missing keys.
    pub fn get(&self, key: &str) -> Option<&ConfigNode> {
        match self {
            ConfigNode::Table(table) => table.get(key),
            ConfigNode::Scalar(_) => None,
        }
    }

    /// The scalar value, if this node is a leaf.
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            ConfigNode::Scalar(s) => Some(s),
            ConfigNode::Table(_) => None,
        }
    }

    /// The nested mapping, if this node is a table.
    pub fn as_table(&self) -> Option<&BTreeMap<String, ConfigNode>> {
        match self {
            ConfigNode::Table(table) => Some(table),
            ConfigNode::Scalar(_) => None,
        }
    }

    /// Child key names, comma separated, for error messages.
    fn available_keys(&self) -> String {
        match self.as_table() {
            Some(table) if !table.is_empty() => {
                table.keys().cloned().collect::<Vec<_>>().join(", ")
            }
            _ => "none".to_string(),
        }
    }
}

/// A parsed `{group.sources.*.key}` placeholder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRef {
    /// Source-group name (segment before `.sources`)
    pub group: String,

    /// Key to look up under the source (segment after `*.`)
    pub key: String,

    /// The raw placeholder text
    pub raw: String,
}

impl SourceRef {
    /// Parse a placeholder; `None` if the value does not match the grammar.
    pub fn parse(value: &str) -> Option<SourceRef> {
        let caps = REFERENCE.captures(value)?;
        Some(SourceRef {
            group: caps[1].to_string(),
            key: caps[2].to_string(),
            raw: value.to_string(),
        })
    }

    /// Whether a value matches the reference grammar.
    pub fn is_reference(value: &str) -> bool {
        REFERENCE.is_match(value)
    }

    /// Resolve for one source, substituting the `*` wildcard.
    ///
    /// A source-level key wins unconditionally; only when it is absent
    /// and `env` is given does the environment level apply.
    pub fn resolve(&self, source_name: &str, env: Option<&str>, config: &ConfigNode) -> Result<String> {
        let source = self.lookup_source(source_name, config)?;

        if let Some(value) = source.get(&self.key).and_then(ConfigNode::as_scalar) {
            return Ok(value.to_string());
        }

        if let Some(env_name) = env {
            if let Some(value) = source
                .get(env_name)
                .and_then(|e| e.get(&self.key))
                .and_then(ConfigNode::as_scalar)
            {
                return Ok(value.to_string());
            }
        }

        Err(Error::ReferenceNotFound {
            reference: self.raw.clone(),
            message: match env {
                Some(env_name) => format!(
                    "key '{}' not found for source '{}' (environment '{}')",
                    self.key, source_name, env_name
                ),
                None => format!("key '{}' not found for source '{}'", self.key, source_name),
            },
            available: source.available_keys(),
        })
    }

    /// Check that the key resolves for every environment of one source.
    ///
    /// A source-level key is valid for all environments. Otherwise one
    /// error is returned per environment missing the key; a source with
    /// no environments and no source-level key is itself one error.
    pub fn validate_for_all_environments(
        &self,
        source_name: &str,
        config: &ConfigNode,
    ) -> Result<Vec<String>> {
        let source = self.lookup_source(source_name, config)?;

        if source.get(&self.key).and_then(ConfigNode::as_scalar).is_some() {
            return Ok(vec![]);
        }

        let environments = environment_names(source);
        if environments.is_empty() {
            return Ok(vec![format!(
                "reference '{}': source '{}' has no source-level key '{}' and no environments (available keys: {})",
                self.raw,
                source_name,
                self.key,
                source.available_keys()
            )]);
        }

        let mut errors = Vec::new();
        for env_name in environments {
            let present = source
                .get(env_name)
                .and_then(|e| e.get(&self.key))
                .and_then(ConfigNode::as_scalar)
                .is_some();
            if !present {
                errors.push(format!(
                    "reference '{}': key '{}' missing for source '{}' in environment '{}'",
                    self.raw, self.key, source_name, env_name
                ));
            }
        }
        Ok(errors)
    }

    /// Check the key for every source registered under the group.
    ///
    /// Used at generation time so a reference is guaranteed to resolve
    /// for any source that is later materialized.
    pub fn validate_for_all_sources(&self, config: &ConfigNode) -> Result<Vec<String>> {
        let sources = self.lookup_sources(config)?;
        let source_names: Vec<&String> = match sources.as_table() {
            Some(table) => table.keys().collect(),
            None => vec![],
        };

        let mut errors = Vec::new();
        for source_name in source_names {
            errors.extend(self.validate_for_all_environments(source_name, config)?);
        }
        Ok(errors)
    }

    fn lookup_sources<'a>(&self, config: &'a ConfigNode) -> Result<&'a ConfigNode> {
        let group = config.get(&self.group).ok_or_else(|| Error::ReferenceNotFound {
            reference: self.raw.clone(),
            message: format!("source group '{}' not found", self.group),
            available: config.available_keys(),
        })?;

        group.get("sources").ok_or_else(|| Error::ReferenceNotFound {
            reference: self.raw.clone(),
            message: format!("group '{}' has no 'sources' section", self.group),
            available: group.available_keys(),
        })
    }

    fn lookup_source<'a>(&self, source_name: &str, config: &'a ConfigNode) -> Result<&'a ConfigNode> {
        let sources = self.lookup_sources(config)?;
        sources.get(source_name).ok_or_else(|| Error::ReferenceNotFound {
            reference: self.raw.clone(),
            message: format!(
                "source '{}' not found in group '{}'",
                source_name, self.group
            ),
            available: sources.available_keys(),
        })
    }
}

/// Environment sub-maps of a source: table-valued children whose key is
/// not a known non-environment field.
fn environment_names(source: &ConfigNode) -> Vec<&str> {
    match source.as_table() {
        Some(table) => table
            .iter()
            .filter(|(key, value)| {
                value.as_table().is_some() && !NON_ENVIRONMENT_KEYS.contains(&key.as_str())
            })
            .map(|(key, _)| key.as_str())
            .collect(),
        None => vec![],
    }
}
