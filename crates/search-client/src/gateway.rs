use std::collections::VecDeque;
use std::sync::Arc;

use connector_types::Result;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use serde_json::Value;

use crate::client::{BulkOp, BulkResponse, SearchClient};

const DEFAULT_PAGE_SIZE: u64 = 100;

/// Domain-agnostic paged view over one named index (§4.1 L1). Hydration
/// from a raw hit to a caller's type is delegated to a factory closure,
/// the way the original gateway delegates to a subclass-supplied `make`.
#[derive(Clone)]
pub struct IndexGateway {
    client: SearchClient,
    index: String,
    page_size: u64,
}

impl IndexGateway {
    pub fn new(client: SearchClient, index: impl Into<String>) -> Self {
        IndexGateway { client, index: index.into(), page_size: DEFAULT_PAGE_SIZE }
    }

    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn index_name(&self) -> &str {
        &self.index
    }

    /// A gateway over a different index on the same client, e.g. the
    /// orchestrator's per-connector target index built from the control
    /// client it already holds for `.elastic-connectors`.
    pub fn for_index(&self, index: impl Into<String>) -> Self {
        IndexGateway { client: self.client.clone(), index: index.into(), page_size: self.page_size }
    }

    /// Lazily pages `query` across the whole index, refreshing once
    /// before the first page (§4.1). A transport error mid-page logs and
    /// ends the stream silently rather than surfacing a `Result::Err` —
    /// only `upsert`/`update`/`delete` return errors to the caller, per
    /// spec.
    ///
    /// The refresh happens against a `total` snapshotted from the first
    /// page; later pages are not re-checked against concurrent writes.
    /// This is §9's first Open question, preserved as-is.
    pub fn get_all<T, F>(&self, query: Value, make: F) -> BoxStream<'static, T>
    where
        T: Send + 'static,
        F: Fn(Value) -> T + Send + Sync + 'static,
    {
        let state = PageState {
            client: self.client.clone(),
            index: self.index.clone(),
            page_size: self.page_size,
            query,
            make: Arc::new(make),
            buffer: VecDeque::new(),
            offset: 0,
            total: None,
            refreshed: false,
            done: false,
        };
        Box::pin(stream::unfold(state, next_hit))
    }

    pub async fn upsert(&self, id: &str, doc: &Value) -> Result<()> {
        self.client.upsert(&self.index, id, doc).await
    }

    pub async fn create(&self, doc: &Value) -> Result<String> {
        self.client.create(&self.index, doc).await
    }

    pub async fn update(&self, id: &str, partial: &Value, retry_on_conflict: u32) -> Result<()> {
        self.client.update(&self.index, id, partial, retry_on_conflict).await
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.client.delete(&self.index, id).await
    }

    pub async fn bulk(&self, operations: &[BulkOp], pipeline: &str) -> Result<BulkResponse> {
        self.client.bulk(&self.index, operations, pipeline).await
    }
}

struct PageState<T> {
    client: SearchClient,
    index: String,
    page_size: u64,
    query: Value,
    make: Arc<dyn Fn(Value) -> T + Send + Sync>,
    buffer: VecDeque<Value>,
    offset: u64,
    total: Option<u64>,
    refreshed: bool,
    done: bool,
}

async fn next_hit<T: Send + 'static>(mut state: PageState<T>) -> Option<(T, PageState<T>)> {
    loop {
        if let Some(hit) = state.buffer.pop_front() {
            let item = (state.make)(hit);
            return Some((item, state));
        }
        if state.done {
            return None;
        }
        if let Some(total) = state.total {
            if state.offset >= total {
                state.done = true;
                return None;
            }
        }

        if !state.refreshed {
            if let Err(err) = state.client.refresh(&state.index).await {
                tracing::error!(index = %state.index, error = %err, "refresh before paging failed");
                state.done = true;
                return None;
            }
            state.refreshed = true;
        }

        match state.client.search(&state.index, &state.query, state.offset, state.page_size).await {
            Ok(body) => {
                let hits = body.get("hits").and_then(|h| h.get("hits")).and_then(Value::as_array).cloned().unwrap_or_default();
                if state.total.is_none() {
                    // TODO(§9 open question 1): total is snapshotted off the
                    // first page and never re-checked; a write landing after
                    // this point and before the last page is missed.
                    let total = body
                        .get("hits")
                        .and_then(|h| h.get("total"))
                        .and_then(|t| t.get("value"))
                        .and_then(Value::as_u64)
                        .unwrap_or(0);
                    state.total = Some(total);
                }
                if hits.is_empty() {
                    state.done = true;
                    return None;
                }
                state.offset += hits.len() as u64;
                state.buffer.extend(hits.into_iter().map(merge_id_into_source));
            }
            Err(err) => {
                tracing::error!(index = %state.index, error = %err, "search page failed, terminating sequence");
                state.done = true;
                return None;
            }
        }
    }
}

/// Flatten a raw `{"_id": ..., "_source": {...}}` hit into one object
/// carrying `_id` alongside the source fields, matching the `_id`/
/// `_timestamp` convention `Source::get_docs` already uses — callers of
/// `get_all` never have to special-case the envelope.
fn merge_id_into_source(hit: Value) -> Value {
    let id = hit.get("_id").cloned();
    let mut source = hit.get("_source").cloned().unwrap_or(hit);
    if let (Some(id), Some(obj)) = (id, source.as_object_mut()) {
        obj.entry("_id").or_insert(id);
    }
    source
}
