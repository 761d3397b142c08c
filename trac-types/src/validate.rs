use trac_core::TracError;

use crate::{BasicType, TypeDescriptor, Value};

/// `validate(value)` from spec.md §4.1: for primitives, the
/// corresponding one-of variant must be set and must match `descriptor`
/// if one is given. Arrays may be empty but never absent; array
/// elements are validated against `descriptor.array_type` when present.
/// Map values must themselves be primitive, regardless of nesting
/// elsewhere.
pub fn validate(value: &Value, descriptor: Option<&TypeDescriptor>) -> Result<(), TracError> {
    if let Some(descriptor) = descriptor {
        if value.basic_type() != descriptor.basic_type {
            return Err(invalid_type(descriptor.basic_type, value.basic_type()));
        }
    }

    match value {
        Value::Array(items) => {
            let element_descriptor = descriptor.and_then(|d| d.array_type.as_deref());
            for item in items {
                validate(item, element_descriptor)?;
            }
            Ok(())
        }
        Value::Map(entries) => {
            let value_descriptor = descriptor.and_then(|d| d.map_type.as_deref());
            for (key, item) in entries {
                if !item.is_primitive() {
                    return Err(TracError::invalid_input(format!(
                        "map value for key '{key}' must be primitive, found {}",
                        item.basic_type()
                    )));
                }
                validate(item, value_descriptor)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn invalid_type(expected: BasicType, found: BasicType) -> TracError {
    TracError::invalid_input(format!("InvalidType: expected {expected}, found {found}"))
}
