//! trac-metadata: the Metadata DAL (spec.md §4.2) — tenant-scoped,
//! versioned object/tag storage over Postgres.

pub mod dal;
pub mod error;
pub mod postgres;
pub mod search;
pub mod selector;
pub mod types;

pub use dal::{MetadataDal, NewTag, SearchHit};
pub use error::{DalError, DalResult};
pub use postgres::PgMetadataDal;
pub use search::{LeafTerm, Op, QueryNode, SearchParams};
pub use selector::{Selector, VersionSelector};
pub use types::{AttrValue, Header, ObjectId, Tag};
