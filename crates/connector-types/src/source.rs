use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::connector::Configuration;
use crate::error::Result;
use crate::filtering::Filter;

/// One document as yielded by a [`Source`]: `_id`/`_timestamp` plus
/// arbitrary further fields (§6).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SourceDoc {
    pub id: String,
    pub timestamp: String,
    pub fields: Map<String, Value>,
}

impl SourceDoc {
    pub fn new(id: impl Into<String>, timestamp: impl Into<String>) -> Self {
        SourceDoc { id: id.into(), timestamp: timestamp.into(), fields: Map::new() }
    }

    /// Render as the document body the bulk gateway will index, with
    /// `_id`/`_timestamp` merged back in under their wire names.
    pub fn to_json(&self) -> Value {
        let mut map = self.fields.clone();
        map.insert("_id".to_string(), Value::String(self.id.clone()));
        map.insert("_timestamp".to_string(), Value::String(self.timestamp.clone()));
        Value::Object(map)
    }
}

type DownloadFuture = Pin<Box<dyn Future<Output = Result<Option<Map<String, Value>>>> + Send>>;

/// `download_fn(doit, timestamp)` (§6): invoked by the bulk coordinator,
/// returns `None` to skip or a mapping merged into the doc. Boxed so
/// `Source::get_docs` can yield a heterogeneous, clonable handle per
/// document without naming a closure type.
#[derive(Clone)]
pub struct DownloadFn(Arc<dyn Fn(bool, Option<String>) -> DownloadFuture + Send + Sync>);

impl DownloadFn {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(bool, Option<String>) -> DownloadFuture + Send + Sync + 'static,
    {
        DownloadFn(Arc::new(f))
    }

    pub async fn call(&self, doit: bool, timestamp: Option<String>) -> Result<Option<Map<String, Value>>> {
        (self.0)(doit, timestamp).await
    }
}

/// Per-source overrides for the bulk ingestion coordinator (§4.6).
#[derive(Clone, Debug)]
pub struct BulkOptions {
    pub concurrent_downloads: usize,
    pub chunk_size: usize,
    pub pipeline: String,
}

impl Default for BulkOptions {
    fn default() -> Self {
        BulkOptions {
            concurrent_downloads: DEFAULT_CONCURRENT_DOWNLOADS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            pipeline: DEFAULT_PIPELINE.to_string(),
        }
    }
}

/// Shipped default of 10 (SPEC_FULL §4.6) — a source may only lower it
/// via [`Source::tweak_bulk_options`].
pub const DEFAULT_CONCURRENT_DOWNLOADS: usize = 10;
pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_PIPELINE: &str = "ent-search-generic-ingestion";

pub type DocStream = Pin<Box<dyn futures::Stream<Item = (SourceDoc, DownloadFn)> + Send>>;

/// The capability every data-source adapter implements (§6). Adapters
/// themselves (GCS, MongoDB, a directory tree, …) are external
/// collaborators; this engine only depends on the trait.
#[async_trait]
pub trait Source: Send + Sync {
    /// `field -> {value, label, type}` (§6). Associated function, not a
    /// method: required before any instance exists, so it is excluded
    /// from the trait's vtable (`Self: Sized`) and must be looked up
    /// through a [`SourceFactory`] instead of a `dyn Source`.
    fn default_configuration() -> Configuration
    where
        Self: Sized;

    fn new(configuration: Configuration) -> Result<Self>
    where
        Self: Sized;

    async fn ping(&self) -> Result<()>;

    fn get_docs(&self, filtering: Filter) -> DocStream;

    /// A source may only ever lower `concurrent_downloads` from its
    /// engine-supplied default (SPEC_FULL §4.6); raising it is not part
    /// of the contract and implementations should not attempt it.
    fn tweak_bulk_options(&self, _options: &mut BulkOptions) {}

    async fn changed(&self) -> Result<bool> {
        Ok(true)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Resolves a `service_type` string to a constructor for the matching
/// `Source` (§4.5 `prepare`). Stands in for the Python engine's
/// `service_config["sources"][service_type]` dotted-path class lookup.
pub trait SourceFactory: Send + Sync {
    fn service_type(&self) -> &str;
    fn default_configuration(&self) -> Configuration;
    fn build(&self, configuration: Configuration) -> Result<Arc<dyn Source>>;
}
