//! Effective-configuration resolution: shipped defaults merged under the
//! operator-supplied configuration, with the raw YAML text preserved for
//! round-trip editing.

use std::path::Path;

use anyhow::{Context, Result};
use folio_schema::merge_config;
use serde_json::Value;

/// Default-config file shipped alongside a bot's source.
pub const DEFAULT_CONFIG_FILE: &str = "config.default.yaml";

/// Operator-supplied configuration, either pre-serialized YAML text (kept
/// verbatim, comments and all) or an already-structured object.
#[derive(Debug, Clone)]
pub enum ConfigInput {
    Yaml(String),
    Object(Value),
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub effective: Value,
    pub raw_yaml: Option<String>,
}

/// Merge precedence: shipped defaults < supplied config.
pub fn resolve_config(
    defaults: Option<&Value>,
    supplied: Option<&ConfigInput>,
) -> Result<ResolvedConfig> {
    let (supplied_value, raw_yaml) = match supplied {
        None => (Value::Null, None),
        Some(ConfigInput::Object(value)) => (value.clone(), None),
        Some(ConfigInput::Yaml(text)) => {
            let value: Value =
                serde_yaml::from_str(text).context("parsing supplied configuration YAML")?;
            (value, Some(text.clone()))
        }
    };

    let base = defaults.cloned().unwrap_or(Value::Null);
    let mut effective = merge_config(&base, &supplied_value);
    if effective.is_null() {
        effective = Value::Object(serde_json::Map::new());
    }

    // When the config arrived as a structured object there is no raw text
    // to preserve; serialize the effective form so both representations
    // stay available.
    let raw_yaml = match raw_yaml {
        Some(text) => Some(text),
        None if supplied.is_some() => Some(serde_yaml::to_string(&effective)?),
        None => None,
    };

    Ok(ResolvedConfig {
        effective,
        raw_yaml,
    })
}

/// Read a bot's shipped default-config file, if the source directory
/// carries one.
pub fn read_default_config(source_dir: &Path) -> Result<Option<Value>> {
    let path = source_dir.join(DEFAULT_CONFIG_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("reading {}", path.display()))?;
    let value: Value = serde_yaml::from_str(&raw)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(value))
}
