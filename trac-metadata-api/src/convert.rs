//! Wire conversions between `trac_types`/`serde_json` and the
//! `google.protobuf.Struct`/`Value` well-known types used on
//! `proto/metadata.proto`'s attribute maps and definition payloads.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use prost_types::value::Kind;
use prost_types::{ListValue, Struct, Value as PbValue};
use tonic::Status;
use trac_types::Value;

pub fn value_to_pb(value: &Value) -> PbValue {
    let kind = match value {
        Value::Boolean(b) => Kind::BoolValue(*b),
        Value::Integer(i) => Kind::NumberValue(*i as f64),
        Value::Float(f) => Kind::NumberValue(*f),
        Value::String(s) => Kind::StringValue(s.clone()),
        Value::Decimal(d) => Kind::StringValue(d.to_string()),
        Value::Date(d) => Kind::StringValue(d.to_string()),
        Value::DateTime(dt) => Kind::StringValue(dt.to_rfc3339()),
        Value::Array(items) => Kind::ListValue(ListValue {
            values: items.iter().map(value_to_pb).collect(),
        }),
        Value::Map(entries) => Kind::StructValue(map_to_pb(entries)),
    };
    PbValue { kind: Some(kind) }
}

/// Best-effort reverse conversion. `google.protobuf.Value` has no
/// distinct integer/decimal/date kind, so a whole-valued number becomes
/// `Value::Integer` and everything else collapses to `Value::Float` or
/// `Value::String`; a client that needs an exact `Decimal`/`Date` should
/// go through the Trusted API's typed write path instead.
pub fn pb_to_value(pb: &PbValue) -> Result<Value, Status> {
    let kind = pb
        .kind
        .as_ref()
        .ok_or_else(|| Status::invalid_argument("attribute value has no kind"))?;
    Ok(match kind {
        Kind::NullValue(_) => return Err(Status::invalid_argument("null attribute values are not supported")),
        Kind::BoolValue(b) => Value::Boolean(*b),
        Kind::NumberValue(n) => {
            if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
                Value::Integer(*n as i64)
            } else {
                Value::Float(*n)
            }
        }
        Kind::StringValue(s) => Value::String(s.clone()),
        Kind::StructValue(s) => Value::Map(pb_to_map(s)?),
        Kind::ListValue(l) => {
            let items = l.values.iter().map(pb_to_value).collect::<Result<Vec<_>, _>>()?;
            Value::Array(items)
        }
    })
}

fn map_to_pb(entries: &BTreeMap<String, Value>) -> Struct {
    Struct {
        fields: entries.iter().map(|(k, v)| (k.clone(), value_to_pb(v))).collect(),
    }
}

fn pb_to_map(s: &Struct) -> Result<BTreeMap<String, Value>, Status> {
    s.fields
        .iter()
        .map(|(k, v)| Ok((k.clone(), pb_to_value(v)?)))
        .collect()
}

pub fn json_to_struct(value: &serde_json::Value) -> Result<Struct, Status> {
    let serde_json::Value::Object(map) = value else {
        return Err(Status::invalid_argument("definition must be a JSON object"));
    };
    let mut fields = BTreeMap::new();
    for (k, v) in map {
        fields.insert(k.clone(), json_value_to_pb(v));
    }
    Ok(Struct { fields: fields.into_iter().collect() })
}

fn json_value_to_pb(value: &serde_json::Value) -> PbValue {
    let kind = match value {
        serde_json::Value::Null => Kind::NullValue(0),
        serde_json::Value::Bool(b) => Kind::BoolValue(*b),
        serde_json::Value::Number(n) => Kind::NumberValue(n.as_f64().unwrap_or_default()),
        serde_json::Value::String(s) => Kind::StringValue(s.clone()),
        serde_json::Value::Array(items) => Kind::ListValue(ListValue {
            values: items.iter().map(json_value_to_pb).collect(),
        }),
        serde_json::Value::Object(map) => Kind::StructValue(Struct {
            fields: map.iter().map(|(k, v)| (k.clone(), json_value_to_pb(v))).collect(),
        }),
    };
    PbValue { kind: Some(kind) }
}

pub fn struct_to_json(s: &Struct) -> serde_json::Value {
    let map = s
        .fields
        .iter()
        .map(|(k, v)| (k.clone(), pb_value_to_json(v)))
        .collect();
    serde_json::Value::Object(map)
}

fn pb_value_to_json(v: &PbValue) -> serde_json::Value {
    match v.kind.as_ref() {
        None | Some(Kind::NullValue(_)) => serde_json::Value::Null,
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(*b),
        Some(Kind::NumberValue(n)) => {
            serde_json::Number::from_f64(*n).map(serde_json::Value::Number).unwrap_or(serde_json::Value::Null)
        }
        Some(Kind::StringValue(s)) => serde_json::Value::String(s.clone()),
        Some(Kind::ListValue(l)) => serde_json::Value::Array(l.values.iter().map(pb_value_to_json).collect()),
        Some(Kind::StructValue(s)) => struct_to_json(s),
    }
}

pub fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>, Status> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Status::invalid_argument(format!("invalid timestamp '{s}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_values_round_trip() {
        for value in [
            Value::Boolean(true),
            Value::Integer(42),
            Value::Float(1.5),
            Value::String("hello".into()),
        ] {
            let pb = value_to_pb(&value);
            assert_eq!(pb_to_value(&pb).unwrap(), value);
        }
    }

    #[test]
    fn decimal_and_date_are_lossy_through_struct_value() {
        let decimal = Value::Decimal("3.140".parse().unwrap());
        let pb = value_to_pb(&decimal);
        assert_eq!(pb_to_value(&pb).unwrap(), Value::String("3.140".into()));
    }

    #[test]
    fn array_and_map_values_round_trip() {
        let value = Value::Array(vec![Value::Integer(1), Value::String("a".into())]);
        let pb = value_to_pb(&value);
        assert_eq!(pb_to_value(&pb).unwrap(), value);

        let mut map = BTreeMap::new();
        map.insert("k".to_string(), Value::Boolean(false));
        let value = Value::Map(map);
        let pb = value_to_pb(&value);
        assert_eq!(pb_to_value(&pb).unwrap(), value);
    }

    #[test]
    fn json_struct_round_trips_through_definition_conversion() {
        let json = serde_json::json!({"rows": 10, "name": "x", "nested": {"a": [1, 2]}});
        let s = json_to_struct(&json).unwrap();
        assert_eq!(struct_to_json(&s), json);
    }

    #[test]
    fn json_non_object_definition_is_rejected() {
        let err = json_to_struct(&serde_json::json!([1, 2])).unwrap_err();
        assert_eq!(err.code(), tonic::Code::InvalidArgument);
    }

    #[test]
    fn parse_rfc3339_rejects_garbage() {
        assert!(parse_rfc3339("not-a-timestamp").is_err());
        assert!(parse_rfc3339("2024-01-01T00:00:00Z").is_ok());
    }

    #[test]
    fn null_attribute_value_is_rejected() {
        let null = PbValue { kind: Some(Kind::NullValue(0)) };
        let err = pb_to_value(&null).unwrap_err();
        assert_eq!(err.code(), tonic::Code::InvalidArgument);
    }
}
