//! Denormalizer: reassemble a result tree from the flat store.
//!
//! The walk follows the selection set, so entity cycles in the store
//! cannot recurse unboundedly; the only unbounded chain is fragment
//! spreads, guarded by the active-spread stack. Missing fields are data,
//! not failure: they are reported as paths alongside whatever could be
//! assembled.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde_json::{Map, Value};

use super::document::{Field, FragmentDefinition, Selection, SelectionSet};
use super::error::CacheError;
use super::field_key::{Variables, field_key};
use super::identity::EntityId;
use super::limits::Limits;
use super::store::StoreView;
use super::value::{ListItem, StoreValue};

/// One step of a response-tree path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Path into the response tree, in response-key space (aliases, not field
/// keys).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Path(Vec<PathSegment>);

impl Path {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn key(&self, key: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(PathSegment::Key(key.to_string()));
        Self(segments)
    }

    pub fn index(&self, index: usize) -> Self {
        let mut segments = self.0.clone();
        segments.push(PathSegment::Index(index));
        Self(segments)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "<root>");
        }
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                PathSegment::Key(key) => {
                    if i > 0 {
                        write!(f, ".")?;
                    }
                    write!(f, "{key}")?;
                }
                PathSegment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

/// Reassembled tree plus the fields that could not be served.
#[derive(Clone, Debug, PartialEq)]
pub struct ReadResult {
    pub data: Option<Value>,
    pub missing: Vec<Path>,
}

impl ReadResult {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Read environment: everything the walk needs besides the store view.
pub(crate) struct ReadEnv<'a> {
    pub variables: &'a Variables,
    pub fragments: &'a BTreeMap<String, FragmentDefinition>,
    pub limits: &'a Limits,
}

/// Run a read; also returns every entity id the walk touched, for the
/// watch layer's dependency tracking.
pub(crate) fn read_result(
    view: &dyn StoreView,
    env: &ReadEnv<'_>,
    selection_set: &SelectionSet,
    start: &EntityId,
) -> Result<(ReadResult, BTreeSet<EntityId>), CacheError> {
    let mut reader = Reader {
        env,
        touched: BTreeSet::new(),
        missing: Vec::new(),
        spread_stack: Vec::new(),
    };

    let data = if view.entity(start).is_none() {
        reader.touched.insert(start.clone());
        reader.missing.push(Path::root());
        None
    } else {
        let object = reader.read_selection_set(view, selection_set, start, &Path::root(), 0)?;
        Some(Value::Object(object))
    };

    Ok((
        ReadResult {
            data,
            missing: reader.missing,
        },
        reader.touched,
    ))
}

struct Reader<'a> {
    env: &'a ReadEnv<'a>,
    touched: BTreeSet<EntityId>,
    missing: Vec<Path>,
    spread_stack: Vec<String>,
}

impl<'a> Reader<'a> {
    fn read_selection_set(
        &mut self,
        view: &dyn StoreView,
        selection_set: &SelectionSet,
        id: &EntityId,
        path: &Path,
        depth: usize,
    ) -> Result<Map<String, Value>, CacheError> {
        if depth > self.env.limits.max_selection_depth {
            return Err(CacheError::DepthExceeded {
                limit: self.env.limits.max_selection_depth,
            });
        }
        self.touched.insert(id.clone());

        let mut out = Map::new();
        self.read_into(view, selection_set, id, path, depth, &mut out)?;
        Ok(out)
    }

    /// Walk selections into an already-open output object, so fragments
    /// merge into the enclosing tree position.
    fn read_into(
        &mut self,
        view: &dyn StoreView,
        selection_set: &SelectionSet,
        id: &EntityId,
        path: &Path,
        depth: usize,
        out: &mut Map<String, Value>,
    ) -> Result<(), CacheError> {
        for selection in &selection_set.selections {
            match selection {
                Selection::Field(field) => {
                    if let Some(value) = self.read_field(view, field, id, path, depth)? {
                        out.insert(field.response_key().to_string(), value);
                    }
                }
                Selection::InlineFragment(fragment) => {
                    self.read_into(view, &fragment.selection_set, id, path, depth, out)?;
                }
                Selection::FragmentSpread(spread) => {
                    let fragment = self.enter_spread(&spread.name)?;
                    self.read_into(view, &fragment.selection_set, id, path, depth, out)?;
                    self.spread_stack.pop();
                }
            }
        }
        Ok(())
    }

    fn read_field(
        &mut self,
        view: &dyn StoreView,
        field: &Field,
        id: &EntityId,
        path: &Path,
        depth: usize,
    ) -> Result<Option<Value>, CacheError> {
        let key = field_key(field, self.env.variables)?;
        let field_path = path.key(field.response_key());

        let Some(value) = view.field(id, &key) else {
            self.missing.push(field_path);
            return Ok(None);
        };

        match &field.selection_set {
            None => match value {
                StoreValue::Scalar(v) | StoreValue::Json(v) => Ok(Some(v.clone())),
                StoreValue::Ref(_) | StoreValue::RefList(_) => {
                    self.missing.push(field_path);
                    Ok(None)
                }
            },
            Some(selection_set) => match value {
                StoreValue::Scalar(Value::Null) => Ok(Some(Value::Null)),
                // empty and all-null lists are shapeless on the wire and
                // decode as scalars; serve them as-is
                StoreValue::Scalar(Value::Array(items))
                    if items.iter().all(Value::is_null) =>
                {
                    Ok(Some(Value::Array(items.clone())))
                }
                StoreValue::Ref(r) => {
                    let target = r.id.clone();
                    if view.entity(&target).is_none() {
                        self.touched.insert(target);
                        self.missing.push(field_path);
                        return Ok(None);
                    }
                    let object = self.read_selection_set(
                        view,
                        selection_set,
                        &target,
                        &field_path,
                        depth + 1,
                    )?;
                    Ok(Some(Value::Object(object)))
                }
                StoreValue::RefList(items) => {
                    let items = items.clone();
                    let list =
                        self.read_list(view, selection_set, &items, &field_path, depth)?;
                    Ok(Some(Value::Array(list)))
                }
                StoreValue::Scalar(_) | StoreValue::Json(_) => {
                    self.missing.push(field_path);
                    Ok(None)
                }
            },
        }
    }

    fn read_list(
        &mut self,
        view: &dyn StoreView,
        selection_set: &SelectionSet,
        items: &[ListItem],
        path: &Path,
        depth: usize,
    ) -> Result<Vec<Value>, CacheError> {
        let mut out = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let item_path = path.index(index);
            match item {
                ListItem::Null => out.push(Value::Null),
                ListItem::Ref(r) => {
                    if view.entity(&r.id).is_none() {
                        self.touched.insert(r.id.clone());
                        self.missing.push(item_path);
                        out.push(Value::Null);
                        continue;
                    }
                    let object = self.read_selection_set(
                        view,
                        selection_set,
                        &r.id,
                        &item_path,
                        depth + 1,
                    )?;
                    out.push(Value::Object(object));
                }
                ListItem::List(inner) => {
                    let list = self.read_list(view, selection_set, inner, &item_path, depth)?;
                    out.push(Value::Array(list));
                }
            }
        }
        Ok(out)
    }

    /// Resolve a named fragment and push it onto the active-spread stack.
    /// The caller pops after recursing.
    fn enter_spread(&mut self, name: &str) -> Result<&'a FragmentDefinition, CacheError> {
        if self.spread_stack.iter().any(|active| active == name) {
            return Err(CacheError::FragmentCycle {
                name: name.to_string(),
            });
        }
        if self.spread_stack.len() >= self.env.limits.max_fragment_depth {
            return Err(CacheError::DepthExceeded {
                limit: self.env.limits.max_fragment_depth,
            });
        }
        let fragment =
            self.env
                .fragments
                .get(name)
                .ok_or_else(|| CacheError::MissingFragment {
                    name: name.to_string(),
                })?;
        self.spread_stack.push(name.to_string());
        Ok(fragment)
    }
}
