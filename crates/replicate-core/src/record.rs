//! Record model
//!
//! A [`Record`] is the unit of transfer between a dumper and a loader: a
//! type name, a producer-side [`Id`] and an ordered attribute map. Attribute
//! values are plain data or [`Reference`] markers pointing at other records
//! by `(type, id)`. Markers may sit at any depth inside lists and maps.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered attribute map of a record
pub type Attributes = IndexMap<String, Value>;

/// Record identifier, unique only within its type
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Id {
    /// Integer identifier
    Int(i64),
    /// String identifier
    Str(String),
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(id) => write!(f, "{}", id),
            Self::Str(id) => write!(f, "{:?}", id),
        }
    }
}

impl From<i64> for Id {
    fn from(id: i64) -> Self {
        Self::Int(id)
    }
}

impl From<i32> for Id {
    fn from(id: i32) -> Self {
        Self::Int(i64::from(id))
    }
}

/// Values above `i64::MAX` become string ids holding the decimal digits
impl From<u64> for Id {
    fn from(id: u64) -> Self {
        match i64::try_from(id) {
            Ok(id) => Self::Int(id),
            Err(_) => Self::Str(id.to_string()),
        }
    }
}

impl From<&str> for Id {
    fn from(id: &str) -> Self {
        Self::Str(id.to_string())
    }
}

impl From<String> for Id {
    fn from(id: String) -> Self {
        Self::Str(id)
    }
}

/// Target of a reference marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    /// A single referenced record
    One(Id),
    /// An ordered sequence of referenced records (one-to-many)
    Many(Vec<Id>),
}

/// Marker meaning "this attribute points at another record"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Declared type of the referenced record(s)
    pub target_type: String,
    /// Producer-side id(s) of the referenced record(s)
    pub target: Target,
}

impl Reference {
    /// Reference a single record
    pub fn one(target_type: impl Into<String>, id: impl Into<Id>) -> Self {
        Self {
            target_type: target_type.into(),
            target: Target::One(id.into()),
        }
    }

    /// Reference an ordered sequence of records of the same type
    pub fn many<I>(target_type: impl Into<String>, ids: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Id>,
    {
        Self {
            target_type: target_type.into(),
            target: Target::Many(ids.into_iter().map(Into::into).collect()),
        }
    }
}

/// Attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Absent value
    Null,
    /// Boolean
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Floating point number
    Float(f64),
    /// UTF-8 string
    Str(String),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// Ordered list
    List(Vec<Value>),
    /// Nested ordered map
    Map(Attributes),
    /// Identifier produced by resolving a reference
    Id(Id),
    /// Unresolved reference marker
    Ref(Reference),
}

impl Value {
    /// True if this value, or anything nested inside it, is a reference marker
    pub fn has_references(&self) -> bool {
        match self {
            Self::Ref(_) => true,
            Self::List(items) => items.iter().any(Value::has_references),
            Self::Map(map) => map.values().any(Value::has_references),
            _ => false,
        }
    }

    /// Resolved identifier, if this value is one
    pub fn as_id(&self) -> Option<&Id> {
        match self {
            Self::Id(id) => Some(id),
            _ => None,
        }
    }

    /// Borrow the list items, if this value is a list
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }
}

impl From<Reference> for Value {
    fn from(reference: Reference) -> Self {
        Self::Ref(reference)
    }
}

impl From<Id> for Value {
    fn from(id: Id) -> Self {
        Self::Id(id)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Self::Str(s),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Self::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

/// Build an attribute map from a JSON object; non-object input yields an empty map
pub fn attributes_from_json(json: serde_json::Value) -> Attributes {
    match Value::from(json) {
        Value::Map(map) => map,
        _ => Attributes::new(),
    }
}

/// One `(type, id, attributes)` unit of the stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Declared type of the producing object
    pub type_name: String,
    /// Producer-side identifier, unique within `type_name`
    pub id: Id,
    /// Ordered attributes
    pub attributes: Attributes,
}

impl Record {
    /// Create a new record
    pub fn new(type_name: impl Into<String>, id: impl Into<Id>, attributes: Attributes) -> Self {
        Self {
            type_name: type_name.into(),
            id: id.into(),
            attributes,
        }
    }

    /// `(type, id)` key of this record
    pub fn key(&self) -> (&str, &Id) {
        (&self.type_name, &self.id)
    }

    /// Look up an attribute by name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }
}
