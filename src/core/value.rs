//! Store value taxonomy.
//!
//! Every field slot holds exactly one of: an inline scalar, an opaque JSON
//! blob (a field whose selection set was empty at the query site), a
//! reference to another entity, or a possibly ragged reference list.
//!
//! Wire shape (stable across implementations): scalars serialize as raw
//! JSON; references as `{"type":"id","id":…,"generated":…}`; blobs as
//! `{"type":"json","json":…}`; reference lists as arrays thereof.

use std::fmt;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use super::identity::EntityId;

/// A reference to another entity.
///
/// `generated` mirrors the id namespace: true iff the id is synthetic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntityRef {
    pub id: EntityId,
    pub generated: bool,
}

impl EntityRef {
    pub fn new(id: EntityId) -> Self {
        let generated = id.is_synthetic();
        Self { id, generated }
    }
}

/// One element of a reference list: lists may be null-holed and ragged.
#[derive(Clone, Debug, PartialEq)]
pub enum ListItem {
    Null,
    Ref(EntityRef),
    List(Vec<ListItem>),
}

impl ListItem {
    fn rewritten(&self, from: &EntityId, to: &EntityId) -> Option<ListItem> {
        match self {
            ListItem::Null => None,
            ListItem::Ref(r) if &r.id == from => Some(ListItem::Ref(EntityRef::new(to.clone()))),
            ListItem::Ref(_) => None,
            ListItem::List(items) => rewrite_items(items, from, to).map(ListItem::List),
        }
    }
}

fn rewrite_items(items: &[ListItem], from: &EntityId, to: &EntityId) -> Option<Vec<ListItem>> {
    let mut touched = false;
    let rewritten: Vec<ListItem> = items
        .iter()
        .map(|item| match item.rewritten(from, to) {
            Some(new) => {
                touched = true;
                new
            }
            None => item.clone(),
        })
        .collect();
    touched.then_some(rewritten)
}

/// Tagged store value.
#[derive(Clone, Debug, PartialEq)]
pub enum StoreValue {
    /// Inline scalar: null, bool, number, string, or an array of scalars.
    Scalar(Value),
    /// Opaque object blob, wrapped so it can never be confused with a
    /// reference.
    Json(Value),
    Ref(EntityRef),
    RefList(Vec<ListItem>),
}

impl StoreValue {
    /// Value with every reference to `from` redirected to `to`, or `None`
    /// when the value holds no such reference.
    pub(crate) fn rewritten(&self, from: &EntityId, to: &EntityId) -> Option<StoreValue> {
        match self {
            StoreValue::Scalar(_) | StoreValue::Json(_) => None,
            StoreValue::Ref(r) if &r.id == from => {
                Some(StoreValue::Ref(EntityRef::new(to.clone())))
            }
            StoreValue::Ref(_) => None,
            StoreValue::RefList(items) => {
                rewrite_items(items, from, to).map(StoreValue::RefList)
            }
        }
    }
}

impl Serialize for StoreValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            StoreValue::Scalar(v) => v.serialize(serializer),
            StoreValue::Json(v) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("type", "json")?;
                map.serialize_entry("json", v)?;
                map.end()
            }
            StoreValue::Ref(r) => serialize_ref(r, serializer),
            StoreValue::RefList(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

impl Serialize for ListItem {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ListItem::Null => serializer.serialize_unit(),
            ListItem::Ref(r) => serialize_ref(r, serializer),
            ListItem::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

fn serialize_ref<S: Serializer>(r: &EntityRef, serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(3))?;
    map.serialize_entry("type", "id")?;
    map.serialize_entry("id", r.id.as_str())?;
    map.serialize_entry("generated", &r.generated)?;
    map.end()
}

/// Why a snapshot value failed to decode.
#[derive(Debug)]
pub(crate) struct WireValueError(String);

impl fmt::Display for WireValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid store value: {}", self.0)
    }
}

impl WireValueError {
    fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl StoreValue {
    pub(crate) fn from_wire(value: Value) -> Result<Self, WireValueError> {
        match value {
            Value::Object(map) => {
                let Some(Value::String(tag)) = map.get("type") else {
                    return Err(WireValueError::new(
                        "object carries no `type` discriminator",
                    ));
                };
                match tag.as_str() {
                    "id" => Ok(StoreValue::Ref(ref_from_wire(&map)?)),
                    "json" => {
                        let json = map
                            .get("json")
                            .cloned()
                            .ok_or_else(|| WireValueError::new("json value missing `json`"))?;
                        Ok(StoreValue::Json(json))
                    }
                    other => Err(WireValueError::new(format!(
                        "unknown discriminator `{other}`"
                    ))),
                }
            }
            Value::Array(items) => array_from_wire(items),
            scalar => Ok(StoreValue::Scalar(scalar)),
        }
    }
}

fn ref_from_wire(map: &serde_json::Map<String, Value>) -> Result<EntityRef, WireValueError> {
    let Some(Value::String(id)) = map.get("id") else {
        return Err(WireValueError::new("reference missing string `id`"));
    };
    let Some(Value::Bool(generated)) = map.get("generated") else {
        return Err(WireValueError::new("reference missing bool `generated`"));
    };
    let id = EntityId::from_snapshot(id.clone())
        .map_err(|e| WireValueError::new(e.to_string()))?;
    if id.is_synthetic() != *generated {
        return Err(WireValueError::new(format!(
            "reference `{id}` disagrees with its generated flag"
        )));
    }
    Ok(EntityRef::new(id))
}

fn array_from_wire(items: Vec<Value>) -> Result<StoreValue, WireValueError> {
    // An empty array is indistinguishable on the wire; it decodes as a
    // scalar and the reader tolerates it under composite selections.
    let is_ref_list = items.iter().any(contains_ref);
    if !is_ref_list {
        return Ok(StoreValue::Scalar(Value::Array(items)));
    }

    let list = items
        .into_iter()
        .map(list_item_from_wire)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(StoreValue::RefList(list))
}

fn contains_ref(value: &Value) -> bool {
    match value {
        Value::Object(map) => matches!(map.get("type"), Some(Value::String(t)) if t == "id"),
        Value::Array(items) => items.iter().any(contains_ref),
        _ => false,
    }
}

fn list_item_from_wire(value: Value) -> Result<ListItem, WireValueError> {
    match value {
        Value::Null => Ok(ListItem::Null),
        Value::Object(map) => Ok(ListItem::Ref(ref_from_wire(&map)?)),
        Value::Array(items) => items
            .into_iter()
            .map(list_item_from_wire)
            .collect::<Result<Vec<_>, _>>()
            .map(ListItem::List),
        other => Err(WireValueError::new(format!(
            "scalar `{other}` inside a reference list"
        ))),
    }
}

impl<'de> Deserialize<'de> for StoreValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        StoreValue::from_wire(value).map_err(serde::de::Error::custom)
    }
}
