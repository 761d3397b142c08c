use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{BasicType, TypeDescriptor};

/// Truncate (never round) a `DateTime<Utc>` to microsecond precision,
/// per spec.md §4.1's datetime storage rule.
pub fn truncate_to_micros(dt: DateTime<Utc>) -> DateTime<Utc> {
    let nanos = dt.timestamp_subsec_nanos();
    let micros = nanos / 1_000;
    dt.with_nanosecond(micros * 1_000).unwrap_or(dt)
}

/// The canonical value representation (spec.md §4.1): one of the seven
/// primitives, or a homogeneous array/map built from them (nested
/// containers are permitted at the `Array` level; `Map` values must be
/// primitive — enforced by `validate`, not by this type itself).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Decimal(Decimal),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn basic_type(&self) -> BasicType {
        match self {
            Value::Boolean(_) => BasicType::Boolean,
            Value::Integer(_) => BasicType::Integer,
            Value::Float(_) => BasicType::Float,
            Value::String(_) => BasicType::String,
            Value::Decimal(_) => BasicType::Decimal,
            Value::Date(_) => BasicType::Date,
            Value::DateTime(_) => BasicType::DateTime,
            Value::Array(_) => BasicType::Array,
            Value::Map(_) => BasicType::Map,
        }
    }

    /// `descriptorOf(value)`: the basic type and, for containers, the
    /// recursive element/value descriptors (spec.md §4.1). Container
    /// descriptors are derived from the first element/entry; an empty
    /// container has no inner descriptor.
    pub fn descriptor_of(&self) -> TypeDescriptor {
        match self {
            Value::Array(items) => TypeDescriptor {
                basic_type: BasicType::Array,
                array_type: items.first().map(|v| Box::new(v.descriptor_of())),
                map_type: None,
            },
            Value::Map(entries) => TypeDescriptor {
                basic_type: BasicType::Map,
                array_type: None,
                map_type: entries.values().next().map(|v| Box::new(v.descriptor_of())),
            },
            other => TypeDescriptor::primitive(other.basic_type()),
        }
    }

    pub fn is_primitive(&self) -> bool {
        self.basic_type().is_primitive()
    }
}
