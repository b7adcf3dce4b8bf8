//! Evaluation context: the facts a policy condition is tested against

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;

/// Roots a condition field may start with
pub const FIELD_ROOTS: [&str; 4] = ["subject", "action", "resource", "environment"];

/// Subject, action, resource and environment of a proposed action
///
/// Evaluation only ever borrows a context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationContext {
    /// Who is acting (role, clearance, agent kind, ...)
    #[serde(default)]
    pub subject: Map<String, Value>,
    /// Verb of the action
    #[serde(default)]
    pub action: String,
    /// What is acted upon
    #[serde(default)]
    pub resource: Map<String, Value>,
    /// Ambient facts (time, region, load, ...)
    #[serde(default)]
    pub environment: Map<String, Value>,
}

impl EvaluationContext {
    /// Create a context for an action with empty maps
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            ..Default::default()
        }
    }

    /// Set a subject attribute
    pub fn with_subject(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.subject.insert(key.into(), value.into());
        self
    }

    /// Set a resource attribute
    pub fn with_resource(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.resource.insert(key.into(), value.into());
        self
    }

    /// Set an environment attribute
    pub fn with_environment(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    /// Resolve a dotted field path such as `resource.owner.id`
    ///
    /// Array elements are addressed by index (`resource.tags.0`). Returns
    /// `None` for unknown roots and missing segments.
    pub fn resolve(&self, field: &str) -> Option<Cow<'_, Value>> {
        let mut segments = field.split('.');
        let root = match segments.next()? {
            "action" => {
                return match segments.next() {
                    None => Some(Cow::Owned(Value::String(self.action.clone()))),
                    Some(_) => None,
                };
            }
            "subject" => &self.subject,
            "resource" => &self.resource,
            "environment" => &self.environment,
            _ => return None,
        };

        let first = segments.next()?;
        let mut current = root.get(first)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(Cow::Borrowed(current))
    }

    /// Write `value` at a dotted field path, creating intermediate objects
    ///
    /// Returns `false` when the root is unknown, the path is a bare root
    /// other than `action`, or `action` is given a non-string value.
    pub fn set_field(&mut self, field: &str, value: Value) -> bool {
        let mut segments: Vec<&str> = field.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return false;
        }
        let root = segments.remove(0);
        let map = match root {
            "action" => {
                return match (segments.is_empty(), value) {
                    (true, Value::String(action)) => {
                        self.action = action;
                        true
                    }
                    _ => false,
                };
            }
            "subject" => &mut self.subject,
            "resource" => &mut self.resource,
            "environment" => &mut self.environment,
            _ => return false,
        };

        let Some((last, parents)) = segments.split_last() else {
            return false;
        };
        let mut current = map;
        for segment in parents {
            let slot = current
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            current = match slot {
                Value::Object(inner) => inner,
                _ => return false,
            };
        }
        current.insert(last.to_string(), value);
        true
    }
}

/// Whether `field` begins with one of the recognised roots
pub fn has_known_root(field: &str) -> bool {
    field
        .split('.')
        .next()
        .map(|root| FIELD_ROOTS.contains(&root))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> EvaluationContext {
        EvaluationContext::new("export")
            .with_subject("role", "analyst")
            .with_resource("owner", json!({ "id": "u-1", "team": "risk" }))
            .with_resource("tags", json!(["pii", "eu"]))
            .with_environment("region", "eu-west")
    }

    #[test]
    fn test_resolve_roots() {
        let ctx = context();
        assert_eq!(ctx.resolve("action").unwrap().as_ref(), &json!("export"));
        assert_eq!(ctx.resolve("subject.role").unwrap().as_ref(), &json!("analyst"));
        assert_eq!(ctx.resolve("environment.region").unwrap().as_ref(), &json!("eu-west"));
    }

    #[test]
    fn test_resolve_nested_and_indexed() {
        let ctx = context();
        assert_eq!(ctx.resolve("resource.owner.team").unwrap().as_ref(), &json!("risk"));
        assert_eq!(ctx.resolve("resource.tags.1").unwrap().as_ref(), &json!("eu"));
    }

    #[test]
    fn test_resolve_missing() {
        let ctx = context();
        assert!(ctx.resolve("resource.owner.name").is_none());
        assert!(ctx.resolve("resource.tags.9").is_none());
        assert!(ctx.resolve("weather.today").is_none());
        assert!(ctx.resolve("subject").is_none());
        assert!(ctx.resolve("action.verb").is_none());
    }

    #[test]
    fn test_set_field_creates_objects() {
        let mut ctx = EvaluationContext::default();
        assert!(ctx.set_field("resource.owner.id", json!("u-9")));
        assert!(ctx.set_field("action", json!("delete")));
        assert_eq!(ctx.resolve("resource.owner.id").unwrap().as_ref(), &json!("u-9"));
        assert_eq!(ctx.action, "delete");
    }

    #[test]
    fn test_set_field_rejects_bad_paths() {
        let mut ctx = EvaluationContext::default();
        assert!(!ctx.set_field("weather.today", json!(1)));
        assert!(!ctx.set_field("subject", json!(1)));
        assert!(!ctx.set_field("action", json!(3)));
        assert!(!ctx.set_field("subject..role", json!("x")));
    }

    #[test]
    fn test_known_roots() {
        assert!(has_known_root("environment.hour"));
        assert!(has_known_root("action"));
        assert!(!has_known_root("actor.id"));
    }
}
