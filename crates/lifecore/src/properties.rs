use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Dynamic value held in a vertex property bag
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Integer(i64),
    Number(f64),
    String(String),
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Integer(n) => Some(*n),
            PropertyValue::Number(n) if n.fract() == 0.0 => Some(*n as i64),
            PropertyValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Booleans are often stored as strings by authoring tools, so "true" counts.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            PropertyValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, PropertyValue::Null)
    }

    /// Null and empty strings both count as blank.
    pub fn is_blank(&self) -> bool {
        match self {
            PropertyValue::Null => true,
            PropertyValue::String(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Null => Ok(()),
            PropertyValue::Bool(b) => write!(f, "{}", b),
            PropertyValue::Integer(n) => write!(f, "{}", n),
            PropertyValue::Number(n) => write!(f, "{}", n),
            PropertyValue::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::String(s)
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::String(s.to_string())
    }
}

impl From<i64> for PropertyValue {
    fn from(n: i64) -> Self {
        PropertyValue::Integer(n)
    }
}

impl From<u32> for PropertyValue {
    fn from(n: u32) -> Self {
        PropertyValue::Integer(n as i64)
    }
}

impl From<f64> for PropertyValue {
    fn from(n: f64) -> Self {
        PropertyValue::Number(n)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Bool(b)
    }
}

/// Property names the kernel itself interprets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltInProperty {
    /// Agent currently holding the reservation of an activity
    AgentName,
    /// Comma-separated roles allowed to perform the activity
    AgentRole,
    Description,
    /// Pause the workflow after this activity finishes
    Breakpoint,
    Viewpoint,
    SchemaType,
    SchemaVersion,
    StateMachineName,
    StateMachineVersion,
    RoutingScriptName,
    RoutingScriptVersion,
    RoutingExpr,
    /// Composite may be completed while children are still active
    Abortable,
    /// Next alias to assign on a split's outgoing edge
    LastNum,
}

impl BuiltInProperty {
    pub fn key(&self) -> &'static str {
        match self {
            BuiltInProperty::AgentName => "Agent Name",
            BuiltInProperty::AgentRole => "Agent Role",
            BuiltInProperty::Description => "Description",
            BuiltInProperty::Breakpoint => "Breakpoint",
            BuiltInProperty::Viewpoint => "Viewpoint",
            BuiltInProperty::SchemaType => "SchemaType",
            BuiltInProperty::SchemaVersion => "SchemaVersion",
            BuiltInProperty::StateMachineName => "StateMachineName",
            BuiltInProperty::StateMachineVersion => "StateMachineVersion",
            BuiltInProperty::RoutingScriptName => "RoutingScriptName",
            BuiltInProperty::RoutingScriptVersion => "RoutingScriptVersion",
            BuiltInProperty::RoutingExpr => "RoutingExpr",
            BuiltInProperty::Abortable => "Abortable",
            BuiltInProperty::LastNum => "LastNum",
        }
    }
}

/// String-keyed property bag of a vertex or edge
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Properties(BTreeMap<String, PropertyValue>);

impl Properties {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<PropertyValue> {
        self.0.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn builtin(&self, prop: BuiltInProperty) -> Option<&PropertyValue> {
        self.get(prop.key())
    }

    pub fn set_builtin(&mut self, prop: BuiltInProperty, value: impl Into<PropertyValue>) {
        self.insert(prop.key(), value);
    }

    /// Value of a property rendered as a string, `None` when absent or blank.
    pub fn string(&self, key: &str) -> Option<String> {
        self.get(key)
            .filter(|v| !v.is_blank())
            .map(|v| v.to_string())
    }

    pub fn builtin_string(&self, prop: BuiltInProperty) -> Option<String> {
        self.string(prop.key())
    }

    pub fn flag(&self, prop: BuiltInProperty) -> bool {
        self.builtin(prop).and_then(|v| v.as_bool()).unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropertyValue)> {
        self.0.iter()
    }

    /// Substitutes every `${Name}` placeholder with the named property.
    ///
    /// Returns `None` for an empty template. Unknown properties resolve to "".
    pub fn resolve(&self, template: &str) -> Option<String> {
        if template.is_empty() {
            return None;
        }

        let mut result = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find("${") {
            let Some(len) = rest[start + 2..].find('}') else {
                break;
            };
            result.push_str(&rest[..start]);
            let name = &rest[start + 2..start + 2 + len];
            if let Some(value) = self.get(name) {
                result.push_str(&value.to_string());
            }
            rest = &rest[start + 3 + len..];
        }
        result.push_str(rest);

        tracing::trace!("resolved '{}' as '{}'", template, result);
        Some(result)
    }
}
