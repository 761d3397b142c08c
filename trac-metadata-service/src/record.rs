use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use trac_metadata::{AttrValue, Header, ObjectId, Tag};
use trac_types::{ObjectType, Value};

/// The record type the metadata service's `TracService<R, P>` is
/// instantiated over. Distinct from [`trac_metadata::Tag`]: the header
/// fields a server assigns (versions, timestamps, latest flags) are
/// `None` on a request and populated on the response, and attributes are
/// shaped as a map rather than the DAL's attr-index row list
/// (spec.md §4.3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub object_id: Option<ObjectId>,
    pub object_type: Option<ObjectType>,
    pub object_version: Option<u32>,
    pub tag_version: Option<u32>,
    pub object_timestamp: Option<DateTime<Utc>>,
    pub tag_timestamp: Option<DateTime<Utc>>,
    pub is_latest_object: bool,
    pub is_latest_tag: bool,
    pub definition: serde_json::Value,
    pub attrs: BTreeMap<String, Value>,
}

impl MetadataRecord {
    pub fn new(object_type: ObjectType, definition: serde_json::Value) -> Self {
        Self {
            object_type: Some(object_type),
            definition,
            ..Default::default()
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: Value) -> Self {
        self.attrs.insert(name.into(), value);
        self
    }
}

impl From<Tag> for MetadataRecord {
    fn from(tag: Tag) -> Self {
        let attrs = tag
            .attrs
            .into_iter()
            .map(|a| (a.name, a.value))
            .collect::<BTreeMap<_, _>>();
        Self {
            object_id: Some(tag.header.object_id),
            object_type: Some(tag.header.object_type),
            object_version: Some(tag.header.object_version),
            tag_version: Some(tag.header.tag_version),
            object_timestamp: Some(tag.header.object_timestamp),
            tag_timestamp: Some(tag.header.tag_timestamp),
            is_latest_object: tag.header.is_latest_object,
            is_latest_tag: tag.header.is_latest_tag,
            definition: tag.definition,
            attrs,
        }
    }
}

/// Render a fully stamped record back into the DAL's `Tag` shape. Only
/// used by tests/read paths that want the header filled in; the DAL
/// itself derives headers from its own transaction state on write.
pub fn record_to_header(tenant: &str, record: &MetadataRecord) -> Option<Header> {
    Some(Header {
        tenant: tenant.to_string(),
        object_id: record.object_id?,
        object_type: record.object_type?,
        object_version: record.object_version?,
        object_timestamp: record.object_timestamp?,
        tag_version: record.tag_version?,
        tag_timestamp: record.tag_timestamp?,
        is_latest_object: record.is_latest_object,
        is_latest_tag: record.is_latest_tag,
        superseded: None,
    })
}

pub fn record_attrs(record: &MetadataRecord) -> Vec<AttrValue> {
    record
        .attrs
        .iter()
        .map(|(name, value)| AttrValue::single(name.clone(), value.clone()))
        .collect()
}
