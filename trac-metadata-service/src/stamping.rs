//! Controlled-attribute stamping (spec.md §4.3): attributes prefixed
//! `trac_` are server-assigned and rejected if a client tries to set one
//! directly (spec.md §3.4 invariant 4, §8 property 4) — enforced via
//! `trac_core::schema::Rules::no_reserved_prefix` in [`crate::service`].
//! This module supplies the hooks that set them back in on create/update.

use chrono::Utc;
use trac_core::schema::SchemaHooksExt;
use trac_core::ServiceHooks;
use trac_types::{ObjectType, Value};

use crate::params::MetadataParams;
use crate::record::MetadataRecord;

/// Registers the controlled-attribute resolvers onto a service's hooks:
/// `trac_create_*` on create, `trac_update_*` on every write, plus
/// object-type-specific structured attributes (spec.md §4.3).
pub fn install(hooks: &mut ServiceHooks<MetadataRecord, MetadataParams>) {
    hooks.schema(|s| {
        s.on_create().resolve(|record, meta| {
            let now = Utc::now();
            record.attrs.insert(
                "trac_create_time".into(),
                Value::DateTime(trac_types::truncate_to_micros(now)),
            );
            record.attrs.insert(
                "trac_create_user_id".into(),
                Value::String(meta.params.principal.user_id.clone()),
            );
            record.attrs.insert(
                "trac_create_user_name".into(),
                Value::String(meta.params.principal.user_name.clone()),
            );
            Ok(())
        });

        s.on_writes().resolve(|record, meta| {
            let now = Utc::now();
            record.attrs.insert(
                "trac_update_time".into(),
                Value::DateTime(trac_types::truncate_to_micros(now)),
            );
            record.attrs.insert(
                "trac_update_user_id".into(),
                Value::String(meta.params.principal.user_id.clone()),
            );
            record.attrs.insert(
                "trac_update_user_name".into(),
                Value::String(meta.params.principal.user_name.clone()),
            );
            Ok(())
        });

        s.on_writes().resolve(|record, _meta| {
            apply_structured_attrs(record);
            Ok(())
        });
    });
}

/// Attributes derived from the definition body, keyed by object type
/// (spec.md §4.3's examples: `trac_schema_field_count`, `trac_file_size`,
/// `trac_model_version`).
pub(crate) fn apply_structured_attrs(record: &mut MetadataRecord) {
    let Some(object_type) = record.object_type else {
        return;
    };

    match object_type {
        ObjectType::Schema => {
            if let Some(count) = record.definition.get("fields").and_then(|f| f.as_array()).map(Vec::len) {
                record
                    .attrs
                    .insert("trac_schema_field_count".into(), Value::Integer(count as i64));
            }
        }
        ObjectType::File => {
            if let Some(size) = record.definition.get("size").and_then(|s| s.as_i64()) {
                record.attrs.insert("trac_file_size".into(), Value::Integer(size));
            }
        }
        ObjectType::Model => {
            if let Some(version) = record.definition.get("version").and_then(|v| v.as_str()) {
                record
                    .attrs
                    .insert("trac_model_version".into(), Value::String(version.to_string()));
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_field_count_is_derived() {
        let mut record = MetadataRecord::new(
            ObjectType::Schema,
            serde_json::json!({"fields": [{"name": "a"}, {"name": "b"}]}),
        );
        apply_structured_attrs(&mut record);
        assert_eq!(
            record.attrs.get("trac_schema_field_count"),
            Some(&Value::Integer(2))
        );
    }

    #[test]
    fn non_matching_object_type_adds_nothing() {
        let mut record = MetadataRecord::new(ObjectType::Data, serde_json::json!({}));
        apply_structured_attrs(&mut record);
        assert!(record.attrs.is_empty());
    }
}
