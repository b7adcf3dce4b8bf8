//! Parameterized policies

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::LazyLock;
use warrant_domain::{Policy, ValidationError};

/// A condition value of exactly this form is replaced at load time
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\{\{(\w+)\}\}$").expect("valid placeholder regex"));

/// A variable a template accepts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateVariable {
    /// Placeholder name
    pub name: String,
    /// What the variable controls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether instantiation fails without a binding
    #[serde(default)]
    pub required: bool,
    /// Value used when no binding is given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl TemplateVariable {
    /// A required variable with no default
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            required: true,
            default: None,
        }
    }

    /// An optional variable falling back to `default`
    pub fn optional(name: impl Into<String>, default: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            description: None,
            required: false,
            default: Some(default.into()),
        }
    }
}

/// A policy whose condition values may be `{{name}}` placeholders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyTemplate {
    /// Policy with placeholders
    pub policy: Policy,
    /// Declared variables
    #[serde(default)]
    pub variables: Vec<TemplateVariable>,
}

impl PolicyTemplate {
    /// Wrap a policy with no declared variables
    pub fn new(policy: Policy) -> Self {
        Self {
            policy,
            variables: Vec::new(),
        }
    }

    /// Declare a variable
    pub fn with_variable(mut self, variable: TemplateVariable) -> Self {
        self.variables.push(variable);
        self
    }

    /// Placeholder names used anywhere in the policy's condition values
    pub fn placeholders(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        for rule in &self.policy.rules {
            for condition in &rule.conditions {
                collect_placeholders(&condition.value, &mut names);
            }
        }
        names
    }

    /// Substitute `bindings` and return a validated policy
    ///
    /// Fails on duplicate declarations, bindings for undeclared variables,
    /// placeholders that were never declared and required variables left
    /// unbound.
    pub fn instantiate(&self, bindings: &BTreeMap<String, Value>) -> Result<Policy, ValidationError> {
        let mut declared = HashSet::new();
        for variable in &self.variables {
            if !declared.insert(variable.name.as_str()) {
                return Err(ValidationError::duplicate("variables.name", variable.name.clone()));
            }
        }

        for name in bindings.keys() {
            if !declared.contains(name.as_str()) {
                return Err(ValidationError::invalid_value(
                    format!("bindings.{}", name),
                    "declared template variable",
                    name.clone(),
                ));
            }
        }

        for name in self.placeholders() {
            if !declared.contains(name.as_str()) {
                return Err(ValidationError::not_found("variables", name));
            }
        }

        let mut values = BTreeMap::new();
        for variable in &self.variables {
            let value = match (bindings.get(&variable.name), &variable.default) {
                (Some(bound), _) => bound.clone(),
                (None, Some(default)) => default.clone(),
                (None, None) if variable.required => {
                    return Err(ValidationError::required(format!("bindings.{}", variable.name)));
                }
                (None, None) => Value::Null,
            };
            values.insert(variable.name.clone(), value);
        }

        let mut policy = self.policy.clone();
        for rule in &mut policy.rules {
            for condition in &mut rule.conditions {
                condition.value = substitute(&condition.value, &values);
            }
        }
        policy.validate()?;
        Ok(policy)
    }
}

/// Replace placeholders in `value` using `variables`
///
/// Strings that are exactly one placeholder become the bound value (of any
/// JSON type). Arrays and objects are walked; unknown placeholders are left
/// as they are.
pub fn substitute(value: &Value, variables: &BTreeMap<String, Value>) -> Value {
    match value {
        Value::String(s) => placeholder_name(s)
            .and_then(|name| variables.get(name))
            .cloned()
            .unwrap_or_else(|| value.clone()),
        Value::Array(items) => Value::Array(items.iter().map(|v| substitute(v, variables)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute(v, variables)))
                .collect(),
        ),
        _ => value.clone(),
    }
}

fn placeholder_name(s: &str) -> Option<&str> {
    PLACEHOLDER
        .captures(s)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

fn collect_placeholders(value: &Value, names: &mut BTreeSet<String>) {
    match value {
        Value::String(s) => {
            if let Some(name) = placeholder_name(s) {
                names.insert(name.to_string());
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_placeholders(v, names)),
        Value::Object(map) => map.values().for_each(|v| collect_placeholders(v, names)),
        _ => {}
    }
}
