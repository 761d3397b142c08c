//! Message types for `proto/metadata.proto`. Hand-maintained in the
//! shape `prost-build` would emit, committed directly rather than
//! generated by a `build.rs` step (the same "ship the generated code"
//! choice `datadog-trace-protobuf` makes for its own `.proto` set).

use std::collections::HashMap;

use prost_types::{Struct, Value as PbValue};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(i32)]
pub enum ObjectType {
    Unspecified = 0,
    Data = 1,
    Model = 2,
    Flow = 3,
    Job = 4,
    File = 5,
    Schema = 6,
    Custom = 7,
    Storage = 8,
    Result = 9,
    Config = 10,
    Resource = 11,
}

impl ObjectType {
    /// As `prost-build` emits for an enum field: decode the wire `i32`,
    /// falling back to `Unspecified` for anything unrecognized.
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(ObjectType::Unspecified),
            1 => Some(ObjectType::Data),
            2 => Some(ObjectType::Model),
            3 => Some(ObjectType::Flow),
            4 => Some(ObjectType::Job),
            5 => Some(ObjectType::File),
            6 => Some(ObjectType::Schema),
            7 => Some(ObjectType::Custom),
            8 => Some(ObjectType::Storage),
            9 => Some(ObjectType::Result),
            10 => Some(ObjectType::Config),
            11 => Some(ObjectType::Resource),
            _ => None,
        }
    }
}

impl From<trac_types::ObjectType> for ObjectType {
    fn from(t: trac_types::ObjectType) -> Self {
        use trac_types::ObjectType as T;
        match t {
            T::Data => ObjectType::Data,
            T::Model => ObjectType::Model,
            T::Flow => ObjectType::Flow,
            T::Job => ObjectType::Job,
            T::File => ObjectType::File,
            T::Schema => ObjectType::Schema,
            T::Custom => ObjectType::Custom,
            T::Storage => ObjectType::Storage,
            T::Result => ObjectType::Result,
            T::Config => ObjectType::Config,
            T::Resource => ObjectType::Resource,
        }
    }
}

impl TryFrom<ObjectType> for trac_types::ObjectType {
    type Error = tonic::Status;

    fn try_from(t: ObjectType) -> Result<Self, Self::Error> {
        use trac_types::ObjectType as T;
        Ok(match t {
            ObjectType::Data => T::Data,
            ObjectType::Model => T::Model,
            ObjectType::Flow => T::Flow,
            ObjectType::Job => T::Job,
            ObjectType::File => T::File,
            ObjectType::Schema => T::Schema,
            ObjectType::Custom => T::Custom,
            ObjectType::Storage => T::Storage,
            ObjectType::Result => T::Result,
            ObjectType::Config => T::Config,
            ObjectType::Resource => T::Resource,
            ObjectType::Unspecified => {
                return Err(tonic::Status::invalid_argument("object_type is required"))
            }
        })
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TagHeader {
    #[prost(string, tag = "1")]
    pub tenant: String,
    #[prost(string, tag = "2")]
    pub object_id: String,
    #[prost(enumeration = "ObjectType", tag = "3")]
    pub object_type: i32,
    #[prost(uint32, tag = "4")]
    pub object_version: u32,
    #[prost(uint32, tag = "5")]
    pub tag_version: u32,
    #[prost(string, tag = "6")]
    pub object_timestamp: String,
    #[prost(string, tag = "7")]
    pub tag_timestamp: String,
    #[prost(bool, tag = "8")]
    pub is_latest_object: bool,
    #[prost(bool, tag = "9")]
    pub is_latest_tag: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Tag {
    #[prost(message, optional, tag = "1")]
    pub header: Option<TagHeader>,
    #[prost(message, optional, tag = "2")]
    pub definition: Option<Struct>,
    #[prost(map = "string, message", tag = "3")]
    pub attrs: HashMap<String, PbValue>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateObjectRequest {
    #[prost(string, tag = "1")]
    pub tenant: String,
    #[prost(enumeration = "ObjectType", tag = "2")]
    pub object_type: i32,
    #[prost(message, optional, tag = "3")]
    pub definition: Option<Struct>,
    #[prost(map = "string, message", tag = "4")]
    pub attrs: HashMap<String, PbValue>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpdateObjectRequest {
    #[prost(string, tag = "1")]
    pub tenant: String,
    #[prost(string, tag = "2")]
    pub object_id: String,
    #[prost(uint32, tag = "3")]
    pub expect_prior_version: u32,
    #[prost(message, optional, tag = "4")]
    pub definition: Option<Struct>,
    #[prost(map = "string, message", tag = "5")]
    pub attrs: HashMap<String, PbValue>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpdateTagRequest {
    #[prost(string, tag = "1")]
    pub tenant: String,
    #[prost(string, tag = "2")]
    pub object_id: String,
    #[prost(map = "string, message", tag = "3")]
    pub attrs: HashMap<String, PbValue>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PreallocateIdRequest {
    #[prost(string, tag = "1")]
    pub tenant: String,
    #[prost(enumeration = "ObjectType", tag = "2")]
    pub object_type: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PreallocateIdResponse {
    #[prost(string, tag = "1")]
    pub object_id: String,
}

pub mod read_object_request {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum ObjectSelector {
        #[prost(uint32, tag = "3")]
        ObjectVersion(u32),
        #[prost(string, tag = "4")]
        ObjectAsOf(String),
        #[prost(bool, tag = "5")]
        ObjectLatest(bool),
    }

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum TagSelector {
        #[prost(uint32, tag = "6")]
        TagVersion(u32),
        #[prost(string, tag = "7")]
        TagAsOf(String),
        #[prost(bool, tag = "8")]
        TagLatest(bool),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReadObjectRequest {
    #[prost(string, tag = "1")]
    pub tenant: String,
    #[prost(string, tag = "2")]
    pub object_id: String,
    #[prost(oneof = "read_object_request::ObjectSelector", tags = "3, 4, 5")]
    pub object_selector: Option<read_object_request::ObjectSelector>,
    #[prost(oneof = "read_object_request::TagSelector", tags = "6, 7, 8")]
    pub tag_selector: Option<read_object_request::TagSelector>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SearchRequest {
    #[prost(string, tag = "1")]
    pub tenant: String,
    #[prost(bytes = "vec", tag = "2")]
    pub query: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SearchResponse {
    #[prost(message, repeated, tag = "1")]
    pub results: Vec<Tag>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BatchWriteRequest {
    #[prost(string, tag = "1")]
    pub tenant: String,
    #[prost(message, repeated, tag = "2")]
    pub preallocated: Vec<CreateObjectRequest>,
    #[prost(message, repeated, tag = "3")]
    pub new_objects: Vec<CreateObjectRequest>,
    #[prost(message, repeated, tag = "4")]
    pub new_versions: Vec<UpdateObjectRequest>,
    #[prost(message, repeated, tag = "5")]
    pub new_tags: Vec<UpdateTagRequest>,
}
