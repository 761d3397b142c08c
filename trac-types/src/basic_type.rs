use serde::{Deserialize, Serialize};

/// The seven primitives plus the two container kinds (spec.md §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BasicType {
    Boolean,
    Integer,
    Float,
    String,
    Decimal,
    Date,
    DateTime,
    Array,
    Map,
}

impl BasicType {
    pub fn is_primitive(self) -> bool {
        !matches!(self, BasicType::Array | BasicType::Map)
    }

    pub fn name(self) -> &'static str {
        match self {
            BasicType::Boolean => "BOOLEAN",
            BasicType::Integer => "INTEGER",
            BasicType::Float => "FLOAT",
            BasicType::String => "STRING",
            BasicType::Decimal => "DECIMAL",
            BasicType::Date => "DATE",
            BasicType::DateTime => "DATETIME",
            BasicType::Array => "ARRAY",
            BasicType::Map => "MAP",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "BOOLEAN" => BasicType::Boolean,
            "INTEGER" => BasicType::Integer,
            "FLOAT" => BasicType::Float,
            "STRING" => BasicType::String,
            "DECIMAL" => BasicType::Decimal,
            "DATE" => BasicType::Date,
            "DATETIME" => BasicType::DateTime,
            "ARRAY" => BasicType::Array,
            "MAP" => BasicType::Map,
            _ => return None,
        })
    }
}

impl std::fmt::Display for BasicType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Object types a Tag's definition can carry (spec.md §3 overview).
/// The Public metadata API restricts which of these clients may write;
/// the Trusted API does not (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectType {
    Data,
    Model,
    Flow,
    Job,
    File,
    Schema,
    Custom,
    Storage,
    Result,
    Config,
    Resource,
}

impl ObjectType {
    /// Object types a client may create/update through the Public API.
    pub const PUBLIC_WRITEABLE: &'static [ObjectType] = &[
        ObjectType::Data,
        ObjectType::Model,
        ObjectType::Flow,
        ObjectType::Custom,
        ObjectType::Schema,
    ];

    pub fn is_public_writeable(self) -> bool {
        Self::PUBLIC_WRITEABLE.contains(&self)
    }

    pub fn name(self) -> &'static str {
        match self {
            ObjectType::Data => "DATA",
            ObjectType::Model => "MODEL",
            ObjectType::Flow => "FLOW",
            ObjectType::Job => "JOB",
            ObjectType::File => "FILE",
            ObjectType::Schema => "SCHEMA",
            ObjectType::Custom => "CUSTOM",
            ObjectType::Storage => "STORAGE",
            ObjectType::Result => "RESULT",
            ObjectType::Config => "CONFIG",
            ObjectType::Resource => "RESOURCE",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "DATA" => ObjectType::Data,
            "MODEL" => ObjectType::Model,
            "FLOW" => ObjectType::Flow,
            "JOB" => ObjectType::Job,
            "FILE" => ObjectType::File,
            "SCHEMA" => ObjectType::Schema,
            "CUSTOM" => ObjectType::Custom,
            "STORAGE" => ObjectType::Storage,
            "RESULT" => ObjectType::Result,
            "CONFIG" => ObjectType::Config,
            "RESOURCE" => ObjectType::Resource,
            _ => return None,
        })
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
