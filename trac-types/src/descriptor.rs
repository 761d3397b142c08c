use serde::{Deserialize, Serialize};

use crate::BasicType;

/// Describes the shape of a `Value`: its basic type, and for
/// containers, the descriptor of what it contains (spec.md §4.1
/// `descriptorOf`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub basic_type: BasicType,
    pub array_type: Option<Box<TypeDescriptor>>,
    pub map_type: Option<Box<TypeDescriptor>>,
}

impl TypeDescriptor {
    pub fn primitive(basic_type: BasicType) -> Self {
        debug_assert!(basic_type.is_primitive());
        Self {
            basic_type,
            array_type: None,
            map_type: None,
        }
    }

    pub fn array_of(element: TypeDescriptor) -> Self {
        Self {
            basic_type: BasicType::Array,
            array_type: Some(Box::new(element)),
            map_type: None,
        }
    }

    pub fn map_of(value: TypeDescriptor) -> Self {
        Self {
            basic_type: BasicType::Map,
            array_type: None,
            map_type: Some(Box::new(value)),
        }
    }

    pub fn is_primitive(&self) -> bool {
        self.basic_type.is_primitive()
    }
}

impl std::fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.basic_type {
            BasicType::Array => match &self.array_type {
                Some(el) => write!(f, "ARRAY<{el}>"),
                None => write!(f, "ARRAY"),
            },
            BasicType::Map => match &self.map_type {
                Some(v) => write!(f, "MAP<{v}>"),
                None => write!(f, "MAP"),
            },
            other => write!(f, "{other}"),
        }
    }
}
