//! Schema-chain evaluation
//!
//! A profile is checked against the default schema first. Only if that passes
//! are the schemas named in its own `linked_schemas` evaluated, in order and
//! without deduplication. A linked schema that cannot be fetched or compiled
//! contributes a reason and evaluation moves on to the next one.

use serde_json::Value;
use std::sync::Arc;

use crate::config::CoreConfig;
use crate::contracts::sha256_hex;
use crate::error::NormalizeError;
use crate::loader::DocumentLoader;

/// Result of running the schema chain on one profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Passed {
        profile_hash: String,
        profile_str: String,
    },
    Failed(Vec<String>),
}

impl Verdict {
    pub fn is_passed(&self) -> bool {
        matches!(self, Verdict::Passed { .. })
    }
}

pub fn unreadable_profile(profile_url: &str) -> String {
    format!("Could not read from profile_url: {}", profile_url)
}

pub fn unreadable_linked_schemas(profile_url: &str) -> String {
    format!("Could not read linked_schemas from profile_url: {}", profile_url)
}

pub fn unreadable_schema(schema_url: &str) -> String {
    format!("Could not read from schema: {}", schema_url)
}

pub fn unreadable_json_string(profile_url: &str) -> String {
    format!("Could not get JSON string from profile_url: {}", profile_url)
}

/// Failure reason for one schema violation, e.g. `default-v1.(root): "name" is a required property`
pub fn violation(schema: &str, instance_path: &str, message: &str) -> String {
    format!("{}.{}: {}", schema, field_path(instance_path), message)
}

/// JSON pointer (`/a/0/b`) in dotted form (`a.0.b`); the empty pointer is `(root)`
pub fn field_path(pointer: &str) -> String {
    let trimmed = pointer.trim_start_matches('/');
    if trimmed.is_empty() {
        return "(root)".to_string();
    }
    trimmed
        .split('/')
        .map(|segment| segment.replace("~1", "/").replace("~0", "~"))
        .collect::<Vec<_>>()
        .join(".")
}

/// `linked_schemas` as a list of names; `None` if absent or not an array of strings
pub fn linked_schemas(document: &Value) -> Option<Vec<String>> {
    document
        .as_object()?
        .get("linked_schemas")?
        .as_array()?
        .iter()
        .map(|entry| entry.as_str().map(str::to_string))
        .collect()
}

/// Remove insignificant whitespace from a JSON text
///
/// Key order, number spelling and string escapes are kept byte for byte, so
/// the hash of the result tracks exactly what the member published.
pub fn compact_json(raw: &[u8]) -> Result<String, NormalizeError> {
    serde_json::from_slice::<serde::de::IgnoredAny>(raw)
        .map_err(|e| NormalizeError::InvalidJson(e.to_string()))?;
    let text = std::str::from_utf8(raw).map_err(|e| NormalizeError::InvalidJson(e.to_string()))?;

    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    for c in text.chars() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            ' ' | '\t' | '\n' | '\r' => {}
            '"' => {
                in_string = true;
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    Ok(out)
}

/// Evaluates profiles against the default schema and their linked schemas
pub struct SchemaChain {
    loader: Arc<dyn DocumentLoader>,
    config: Arc<CoreConfig>,
}

impl SchemaChain {
    pub fn new(loader: Arc<dyn DocumentLoader>, config: Arc<CoreConfig>) -> Self {
        Self { loader, config }
    }

    /// Fetch the profile at `profile_url` and run the full chain
    pub async fn evaluate(&self, profile_url: &str) -> Verdict {
        let document = match self.loader.load_json(profile_url).await {
            Ok(document) => document,
            Err(e) => {
                tracing::debug!(profile_url = %profile_url, error = %e, "Profile fetch failed");
                return Verdict::Failed(vec![unreadable_profile(profile_url)]);
            }
        };

        let reasons = self
            .check(std::slice::from_ref(&self.config.default_schema), &document)
            .await;
        if !reasons.is_empty() {
            return Verdict::Failed(reasons);
        }

        let Some(linked) = linked_schemas(&document) else {
            return Verdict::Failed(vec![unreadable_linked_schemas(profile_url)]);
        };

        let reasons = self.check(&linked, &document).await;
        if !reasons.is_empty() {
            return Verdict::Failed(reasons);
        }

        let compacted = match self.loader.get_bytes(profile_url).await {
            Ok(raw) => compact_json(&raw).ok(),
            Err(_) => None,
        };
        match compacted {
            Some(profile_str) => Verdict::Passed {
                profile_hash: sha256_hex(&profile_str),
                profile_str,
            },
            None => Verdict::Failed(vec![unreadable_json_string(profile_url)]),
        }
    }

    /// Reasons `document` violates each schema in `names`, accumulated in order
    async fn check(&self, names: &[String], document: &Value) -> Vec<String> {
        let mut reasons = Vec::new();
        for name in names {
            let schema_url = self.config.schema_url(name);
            let schema = match self.loader.load_json(&schema_url).await {
                Ok(schema) => schema,
                Err(e) => {
                    tracing::debug!(schema_url = %schema_url, error = %e, "Schema fetch failed");
                    reasons.push(unreadable_schema(&schema_url));
                    continue;
                }
            };
            let validator = match jsonschema::validator_for(&schema) {
                Ok(validator) => validator,
                Err(e) => {
                    tracing::warn!(schema_url = %schema_url, error = %e, "Schema does not compile");
                    reasons.push(unreadable_schema(&schema_url));
                    continue;
                }
            };
            reasons.extend(validator.iter_errors(document).map(|error| {
                violation(name, &error.instance_path.to_string(), &error.to_string())
            }));
        }
        reasons
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::StaticLoader;
    use serde_json::json;

    const PROFILE: &str = "https://member.example/profile.json";
    const SCHEMAS: &str = "https://schemas.example";

    fn default_schema() -> Value {
        json!({
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "type": "object",
            "properties": {
                "linked_schemas": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["linked_schemas"]
        })
    }

    fn org_schema() -> Value {
        json!({
            "type": "object",
            "properties": {"name": {"type": "string"}},
            "required": ["name"]
        })
    }

    fn chain(loader: Arc<StaticLoader>) -> SchemaChain {
        let config = CoreConfig::builder().schemas_url(SCHEMAS).build();
        SchemaChain::new(loader, Arc::new(config))
    }

    fn loader_with_schemas() -> Arc<StaticLoader> {
        let loader = Arc::new(StaticLoader::new());
        loader.insert_json(format!("{SCHEMAS}/default-v1.json"), &default_schema());
        loader.insert_json(format!("{SCHEMAS}/org-v1.json"), &org_schema());
        loader
    }

    #[test]
    fn test_field_path() {
        assert_eq!(field_path(""), "(root)");
        assert_eq!(field_path("/tags/0"), "tags.0");
        assert_eq!(field_path("/a~1b"), "a/b");
    }

    #[test]
    fn test_linked_schemas_shape() {
        assert_eq!(
            linked_schemas(&json!({"linked_schemas": ["a", "a", "b"]})),
            Some(vec!["a".to_string(), "a".to_string(), "b".to_string()])
        );
        assert_eq!(linked_schemas(&json!({})), None);
        assert_eq!(linked_schemas(&json!({"linked_schemas": "a"})), None);
        assert_eq!(linked_schemas(&json!({"linked_schemas": ["a", 1]})), None);
        assert_eq!(linked_schemas(&json!([])), None);
    }

    #[test]
    fn test_compact_json_keeps_strings_and_order() {
        let raw = b"{ \"b\" : 1.50,\n  \"a\": \"x  y \\\" z\" }";
        assert_eq!(compact_json(raw).unwrap(), r#"{"b":1.50,"a":"x  y \" z"}"#);
        assert!(compact_json(b"{ nope").is_err());
    }

    #[tokio::test]
    async fn test_conforming_profile_passes() {
        let loader = loader_with_schemas();
        let body = "{\n  \"linked_schemas\": [\"org-v1\"],\n  \"name\": \"Acme\"\n}";
        loader.insert(PROFILE, body);

        let verdict = chain(loader).evaluate(PROFILE).await;
        let expected_str = r#"{"linked_schemas":["org-v1"],"name":"Acme"}"#;
        assert_eq!(
            verdict,
            Verdict::Passed {
                profile_hash: sha256_hex(expected_str),
                profile_str: expected_str.to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_unreadable_profile() {
        let verdict = chain(loader_with_schemas()).evaluate(PROFILE).await;
        assert_eq!(verdict, Verdict::Failed(vec![unreadable_profile(PROFILE)]));
    }

    #[tokio::test]
    async fn test_default_failure_skips_linked_schemas() {
        let loader = loader_with_schemas();
        loader.insert_json(PROFILE, &json!({"name": "Acme"}));

        let verdict = chain(Arc::clone(&loader)).evaluate(PROFILE).await;
        let Verdict::Failed(reasons) = verdict else {
            panic!("expected failure");
        };
        assert_eq!(reasons.len(), 1);
        assert!(reasons[0].starts_with("default-v1.(root): "), "{}", reasons[0]);
        assert_eq!(loader.fetches(&format!("{SCHEMAS}/org-v1.json")), 0);
    }

    #[tokio::test]
    async fn test_linked_failures_accumulate() {
        let loader = loader_with_schemas();
        loader.insert_json(
            PROFILE,
            &json!({"linked_schemas": ["missing-v1", "org-v1", "org-v1"]}),
        );

        let Verdict::Failed(reasons) = chain(loader).evaluate(PROFILE).await else {
            panic!("expected failure");
        };
        assert_eq!(reasons.len(), 3);
        assert_eq!(
            reasons[0],
            unreadable_schema(&format!("{SCHEMAS}/missing-v1.json"))
        );
        assert!(reasons[1].starts_with("org-v1.(root): "));
        assert_eq!(reasons[1], reasons[2]);
    }

    #[tokio::test]
    async fn test_nested_violation_path() {
        let loader = loader_with_schemas();
        loader.insert_json(
            PROFILE,
            &json!({"linked_schemas": ["org-v1"], "name": 7}),
        );

        let Verdict::Failed(reasons) = chain(loader).evaluate(PROFILE).await else {
            panic!("expected failure");
        };
        assert_eq!(reasons.len(), 1);
        assert!(reasons[0].starts_with("org-v1.name: "), "{}", reasons[0]);
    }
}
