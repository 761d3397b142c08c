//! trac-types: the canonical value type system (spec.md §4.1).
//!
//! Seven primitives (boolean, integer, float, string, decimal, date,
//! datetime) plus homogeneous array and map containers, each carrying
//! an explicit `TypeDescriptor`. Decimal equality is scale-insensitive
//! (via `rust_decimal::Decimal`, which compares by numeric value);
//! datetimes are truncated, never rounded, to microsecond precision.

pub mod basic_type;
pub mod descriptor;
pub mod validate;
pub mod value;

pub use basic_type::{BasicType, ObjectType};
pub use descriptor::TypeDescriptor;
pub use validate::validate;
pub use value::{truncate_to_micros, Value};
