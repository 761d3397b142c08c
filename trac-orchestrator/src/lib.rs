//! TRAC Job Orchestrator (spec.md §4.6-4.7): drives a job through
//! `CREATED → VALIDATED → QUEUED → SUBMITTED → RUNNING → FINISHING →
//! {COMPLETED|FAILED|CANCELLED}` by pairing a pluggable executor driver
//! with the Trusted Metadata API, coordinated through the Job Cache.

pub mod lookup;
pub mod manager;
pub mod processor;
pub mod types;

pub use lookup::{MetadataLookup, MetadataServiceLookup};
pub use manager::{JobManager, JobManagerConfig};
pub use processor::{JobProcessor, StepOutcome, DEFAULT_WATCHDOG};
pub use types::{JobDefinition, JobRecord, JobState};
