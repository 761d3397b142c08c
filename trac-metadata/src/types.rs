use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use trac_types::{ObjectType, Value};
use uuid::Uuid;

/// The durable identity of an object: stable across every version
/// (spec.md §3.4 invariant 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub Uuid);

impl ObjectId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse_str(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One `(objectVersion, tagVersion)` row's header fields, shared by the
/// `object_definition` and `tag` tables' join key (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Header {
    pub tenant: String,
    pub object_id: ObjectId,
    pub object_type: ObjectType,
    pub object_version: u32,
    pub object_timestamp: DateTime<Utc>,
    pub tag_version: u32,
    pub tag_timestamp: DateTime<Utc>,
    pub is_latest_object: bool,
    pub is_latest_tag: bool,
    pub superseded: Option<DateTime<Utc>>,
}

/// One attribute value under a tag. Arrays are expanded to one row per
/// element with `attr_index`; primitives use index `-1` as the
/// "single-valued" sentinel (spec.md §4.2.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttrValue {
    pub name: String,
    pub attr_index: i32,
    pub value: Value,
}

impl AttrValue {
    pub fn single(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            attr_index: -1,
            value,
        }
    }
}

/// A fully hydrated Tag: header, opaque definition payload, and
/// attributes (spec.md §4.2.1 `loadObject`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub header: Header,
    pub definition: serde_json::Value,
    pub attrs: Vec<AttrValue>,
}

impl Tag {
    pub fn attr(&self, name: &str) -> Option<&Value> {
        self.attrs
            .iter()
            .find(|a| a.name == name && a.attr_index == -1)
            .map(|a| &a.value)
    }
}
