//! Policy file loading

use super::schema::Policy;
use super::validator::{PolicyValidator, SchemaIssue};
use crate::error::{PolicyError, Result};
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Default policy location read by the firewall initialiser
pub const DEFAULT_FIREWALL_POLICY: &str = "/etc/agent-sandbox/policy.json";

/// Default policy location read by the filtering proxy
pub const DEFAULT_PROXY_POLICY: &str = "/etc/agent-sandbox/proxy-policy.yaml";

/// On-disk serialization of a policy document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyFormat {
    Json,
    Yaml,
    Toml,
}

impl PolicyFormat {
    /// Pick the format from the file extension, JSON when unknown
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("yaml") | Some("yml") => PolicyFormat::Yaml,
            Some("toml") => PolicyFormat::Toml,
            _ => PolicyFormat::Json,
        }
    }

    /// Parse text into a JSON value so every format shares one validator
    fn parse(self, contents: &str) -> std::result::Result<Value, String> {
        match self {
            PolicyFormat::Json => serde_json::from_str(contents).map_err(|e| e.to_string()),
            PolicyFormat::Yaml => {
                if contents.trim().is_empty() {
                    return Ok(Value::Object(Default::default()));
                }
                let document = serde_yaml::from_str(contents).map_err(|e| e.to_string())?;
                Ok(yaml_nulls_as_empty(document))
            }
            PolicyFormat::Toml => toml::from_str(contents).map_err(|e| e.to_string()),
        }
    }
}

/// YAML lets a bare key or an empty document stand for "nothing", so a
/// `null` document becomes an empty mapping and `null` fields are dropped.
fn yaml_nulls_as_empty(document: Value) -> Value {
    match document {
        Value::Null => Value::Object(Default::default()),
        Value::Object(mut map) => {
            map.retain(|_, value| !value.is_null());
            Value::Object(map)
        }
        other => other,
    }
}

pub struct PolicyLoader;

impl PolicyLoader {
    /// Load and validate a policy file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Policy> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(PolicyError::MissingFile {
                path: path.to_path_buf(),
            });
        }

        let contents = fs::read_to_string(path).map_err(|source| PolicyError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::load_str(path, &contents, PolicyFormat::from_path(path))
    }

    /// Validate policy text; `path` is only used in error messages
    pub fn load_str(path: &Path, contents: &str, format: PolicyFormat) -> Result<Policy> {
        let document = format.parse(contents).map_err(|message| PolicyError::Parse {
            path: path.to_path_buf(),
            message,
        })?;

        PolicyValidator::validate(&document).map_err(|issue| {
            let message = match issue {
                SchemaIssue::Shape(message) => message,
                SchemaIssue::Entry(e) => e.to_string(),
            };
            PolicyError::Schema {
                path: path.to_path_buf(),
                message,
            }
        })
    }
}
