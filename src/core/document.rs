//! Document AST consumed by the reader and writer.
//!
//! The cache does not parse GraphQL; an external collaborator hands it
//! this read-only selection tree plus a fragment-definition map. The
//! builder methods exist so hosts (and tests) can assemble documents
//! without a parser.

use std::collections::BTreeMap;

use super::error::CacheError;

/// A complete operation: the root selection set plus every named fragment
/// the selections may spread.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Document {
    pub selection_set: SelectionSet,
    pub fragments: BTreeMap<String, FragmentDefinition>,
}

impl Document {
    pub fn query(selection_set: SelectionSet) -> Self {
        Self {
            selection_set,
            fragments: BTreeMap::new(),
        }
    }

    pub fn with_fragment(mut self, fragment: FragmentDefinition) -> Self {
        self.fragments.insert(fragment.name.clone(), fragment);
        self
    }

    /// Resolve the fragment to use for a fragment-rooted read or write.
    ///
    /// With `None`, the document must define exactly one fragment.
    pub fn fragment(&self, name: Option<&str>) -> Result<&FragmentDefinition, CacheError> {
        match name {
            Some(name) => self
                .fragments
                .get(name)
                .ok_or_else(|| CacheError::MissingFragment {
                    name: name.to_string(),
                }),
            None => {
                let mut fragments = self.fragments.values();
                match (fragments.next(), fragments.next()) {
                    (Some(single), None) => Ok(single),
                    _ => Err(CacheError::AmbiguousFragment {
                        count: self.fragments.len(),
                    }),
                }
            }
        }
    }
}

/// An ordered list of selections at one tree position.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct SelectionSet {
    pub selections: Vec<Selection>,
}

impl SelectionSet {
    pub fn new(selections: Vec<Selection>) -> Self {
        Self { selections }
    }

    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }
}

impl FromIterator<Selection> for SelectionSet {
    fn from_iter<I: IntoIterator<Item = Selection>>(iter: I) -> Self {
        Self {
            selections: iter.into_iter().collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Selection {
    Field(Field),
    InlineFragment(InlineFragment),
    FragmentSpread(FragmentSpread),
}

/// A field selection. The alias shapes the response tree; it never
/// participates in storage identity.
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    pub alias: Option<String>,
    pub name: String,
    pub arguments: Vec<Argument>,
    pub selection_set: Option<SelectionSet>,
}

impl Field {
    /// A scalar leaf: no arguments, no sub-selection.
    pub fn leaf(name: impl Into<String>) -> Self {
        Self {
            alias: None,
            name: name.into(),
            arguments: Vec::new(),
            selection_set: None,
        }
    }

    pub fn new(name: impl Into<String>, selection_set: SelectionSet) -> Self {
        Self {
            alias: None,
            name: name.into(),
            arguments: Vec::new(),
            selection_set: Some(selection_set),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_argument(mut self, name: impl Into<String>, value: ArgumentValue) -> Self {
        self.arguments.push(Argument {
            name: name.into(),
            value,
        });
        self
    }

    /// The key this field occupies in a response tree: alias if present,
    /// else the field name.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

impl From<Field> for Selection {
    fn from(field: Field) -> Self {
        Selection::Field(field)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Argument {
    pub name: String,
    pub value: ArgumentValue,
}

/// Literal argument value kinds, closed by construction.
///
/// `Variable` is substituted from the environment during field-key
/// encoding; an unbound name is a hard error.
#[derive(Clone, Debug, PartialEq)]
pub enum ArgumentValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Enum(String),
    Variable(String),
    List(Vec<ArgumentValue>),
    Object(Vec<(String, ArgumentValue)>),
}

/// Type conditions are carried but not enforced by the core; a mismatched
/// fragment degrades to missing fields rather than an error.
#[derive(Clone, Debug, PartialEq)]
pub struct InlineFragment {
    pub type_condition: Option<String>,
    pub selection_set: SelectionSet,
}

impl InlineFragment {
    pub fn new(type_condition: Option<&str>, selection_set: SelectionSet) -> Self {
        Self {
            type_condition: type_condition.map(str::to_string),
            selection_set,
        }
    }
}

impl From<InlineFragment> for Selection {
    fn from(fragment: InlineFragment) -> Self {
        Selection::InlineFragment(fragment)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FragmentSpread {
    pub name: String,
}

impl FragmentSpread {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl From<FragmentSpread> for Selection {
    fn from(spread: FragmentSpread) -> Self {
        Selection::FragmentSpread(spread)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FragmentDefinition {
    pub name: String,
    pub type_condition: String,
    pub selection_set: SelectionSet,
}

impl FragmentDefinition {
    pub fn new(
        name: impl Into<String>,
        type_condition: impl Into<String>,
        selection_set: SelectionSet,
    ) -> Self {
        Self {
            name: name.into(),
            type_condition: type_condition.into(),
            selection_set,
        }
    }
}
