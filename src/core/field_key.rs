//! Argument-aware field keys.
//!
//! The key is a pure function of `(field name, argument AST, variables)`:
//! `name` alone without arguments, else `name(<canonical JSON>)`. Aliases
//! never participate - they shape the response tree, not storage identity.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use super::document::{ArgumentValue, Field};
use super::error::CacheError;
use super::json_canon::{self, CanonJsonError};

/// Variable environment: name to JSON value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Variables(BTreeMap<String, Value>);

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.0.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }
}

impl FromIterator<(String, Value)> for Variables {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Per-entity storage key for one field.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldKey(String);

impl FieldKey {
    /// Key for a field without arguments.
    pub fn bare(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldKey({:?})", self.0)
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Encode the storage key for a field under the given variable environment.
pub fn field_key(field: &Field, variables: &Variables) -> Result<FieldKey, CacheError> {
    if field.arguments.is_empty() {
        return Ok(FieldKey(field.name.clone()));
    }

    let mut args = Map::new();
    for argument in &field.arguments {
        args.insert(
            argument.name.clone(),
            argument_value(&argument.value, variables)?,
        );
    }
    let canon = json_canon::to_canon_json_string(&Value::Object(args))?;
    Ok(FieldKey(format!("{}({})", field.name, canon)))
}

/// Convert a literal argument node to a JSON value, substituting variables
/// from the environment.
fn argument_value(node: &ArgumentValue, variables: &Variables) -> Result<Value, CacheError> {
    match node {
        ArgumentValue::Null => Ok(Value::Null),
        ArgumentValue::Bool(b) => Ok(Value::Bool(*b)),
        ArgumentValue::Int(i) => Ok(Value::Number(Number::from(*i))),
        ArgumentValue::Float(f) => Number::from_f64(*f)
            .map(Value::Number)
            .ok_or_else(|| CanonJsonError::NonFiniteFloat.into()),
        ArgumentValue::Str(s) => Ok(Value::String(s.clone())),
        ArgumentValue::Enum(name) => Ok(Value::String(name.clone())),
        ArgumentValue::Variable(name) => variables
            .get(name)
            .cloned()
            .ok_or_else(|| CacheError::UnknownVariable { name: name.clone() }),
        ArgumentValue::List(items) => items
            .iter()
            .map(|item| argument_value(item, variables))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        ArgumentValue::Object(entries) => {
            let mut map = Map::new();
            for (name, value) in entries {
                map.insert(name.clone(), argument_value(value, variables)?);
            }
            Ok(Value::Object(map))
        }
    }
}
