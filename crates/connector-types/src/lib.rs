//! Shared vocabulary for the connector lifecycle and sync orchestration
//! engine: the persisted data model (`Connector`, `SyncJob`), the filtering
//! and feature-flag rules the engine applies to them, error classification,
//! and the `Source` capability every data-source adapter implements.
//!
//! This crate has no I/O of its own — `search-client` talks to the search
//! cluster and `connector-scheduler` drives the lifecycle on top of both.

pub mod connector;
pub mod error;
pub mod features;
pub mod filtering;
pub mod source;
pub mod status;
pub mod sync_job;

pub use connector::{validate_index_name, ConfigField, Configuration, Connector, Scheduling};
pub use error::{Error, ErrorKind, Result};
pub use features::{FeatureFlag, Features};
pub use filtering::{Filter, FilterBlock, FilterState, FilterValidation, Filtering, DEFAULT_DOMAIN};
pub use source::{
    BulkOptions, DocStream, DownloadFn, Source, SourceDoc, SourceFactory, DEFAULT_CHUNK_SIZE,
    DEFAULT_CONCURRENT_DOWNLOADS, DEFAULT_PIPELINE,
};
pub use status::{JobStatus, Status};
pub use sync_job::{JobConnectorRef, SyncJob};
