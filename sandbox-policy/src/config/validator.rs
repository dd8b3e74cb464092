//! Schema validation of a parsed policy document

use super::schema::Policy;
use crate::error::ValidationError;
use serde_json::Value;

/// Schema violations found while validating a document
#[derive(Debug)]
pub enum SchemaIssue {
    /// Structural problem (wrong types, non-mapping top level)
    Shape(String),
    /// A domain entry that is not a usable pattern
    Entry(ValidationError),
}

pub struct PolicyValidator;

impl PolicyValidator {
    /// Validate a document already normalised to a JSON value
    ///
    /// Missing fields count as empty. Unrecognised top-level keys are
    /// ignored.
    pub fn validate(document: &Value) -> Result<Policy, SchemaIssue> {
        let map = match document {
            Value::Object(map) => map,
            _ => {
                return Err(SchemaIssue::Shape(
                    "policy must be a mapping at the top level".to_string(),
                ))
            }
        };

        let services = Self::string_list(map.get("services"), "services")?;
        let domains = Self::string_list(map.get("domains"), "domains")?;

        Policy::from_parts(services, domains).map_err(SchemaIssue::Entry)
    }

    fn string_list(value: Option<&Value>, field: &str) -> Result<Vec<String>, SchemaIssue> {
        let items = match value {
            None => return Ok(Vec::new()),
            Some(Value::Array(items)) => items,
            Some(_) => return Err(SchemaIssue::Shape(format!("'{}' must be an array", field))),
        };

        items
            .iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::String(s) => Ok(s.clone()),
                other => Err(SchemaIssue::Shape(format!(
                    "'{}[{}]' must be a string, got {}",
                    field, i, other
                ))),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_policy() {
        let policy = PolicyValidator::validate(&json!({
            "services": ["github"],
            "domains": ["pypi.org", "*.pythonhosted.org"],
        }))
        .unwrap();

        assert_eq!(policy.services.len(), 1);
        assert_eq!(policy.domains.len(), 2);
    }

    #[test]
    fn test_missing_fields_default_empty() {
        let policy = PolicyValidator::validate(&json!({})).unwrap();
        assert!(policy.is_empty());
    }

    #[test]
    fn test_null_is_not_a_policy() {
        assert!(matches!(
            PolicyValidator::validate(&Value::Null),
            Err(SchemaIssue::Shape(_))
        ));
        assert!(matches!(
            PolicyValidator::validate(&json!({"services": null})),
            Err(SchemaIssue::Shape(_))
        ));
    }

    #[test]
    fn test_top_level_must_be_mapping() {
        assert!(matches!(
            PolicyValidator::validate(&json!(["github"])),
            Err(SchemaIssue::Shape(_))
        ));
        assert!(matches!(
            PolicyValidator::validate(&json!("github")),
            Err(SchemaIssue::Shape(_))
        ));
    }

    #[test]
    fn test_fields_must_be_string_arrays() {
        assert!(matches!(
            PolicyValidator::validate(&json!({"services": "github"})),
            Err(SchemaIssue::Shape(_))
        ));
        assert!(matches!(
            PolicyValidator::validate(&json!({"domains": ["ok.example", 42]})),
            Err(SchemaIssue::Shape(_))
        ));
    }

    #[test]
    fn test_empty_domain_rejected() {
        assert!(matches!(
            PolicyValidator::validate(&json!({"domains": [""]})),
            Err(SchemaIssue::Entry(ValidationError::EmptyDomain))
        ));
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let policy = PolicyValidator::validate(&json!({"domains": ["a.example"], "notes": "x"})).unwrap();
        assert_eq!(policy.domains.len(), 1);
    }
}
