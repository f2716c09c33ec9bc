use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use connector_types::{BulkOptions, DocStream, Result, Source, SourceDoc};
use futures::StreamExt;
use search_client::{BulkItemResult, BulkOp, BulkResponse, IndexGateway};
use serde_json::Value;
use tokio::sync::Mutex;

/// Streams `(doc, download_fn)` pairs from a [`Source`], diffs against
/// the current index contents, schedules bounded-concurrent downloads,
/// and submits bulk operations (§4.6, L6).
pub struct BulkCoordinator {
    gateway: IndexGateway,
    options: BulkOptions,
}

#[derive(Debug, Default)]
pub struct BulkOutcome {
    pub indexed_document_count: u64,
    pub deleted_document_count: u64,
    /// `(doc_id, reason)` for every document the bulk endpoint rejected
    /// (§7 kind 4: recorded, does not abort the sync).
    pub rejected: Vec<(String, String)>,
}

impl BulkCoordinator {
    /// Reads `tweak_bulk_options` once up front, per source, before the
    /// default `concurrent_downloads` is read (SPEC_FULL §4.6) — a
    /// source may only ever lower it.
    pub fn new(gateway: IndexGateway, source: &dyn Source) -> Self {
        let mut options = BulkOptions::default();
        source.tweak_bulk_options(&mut options);
        BulkCoordinator { gateway, options }
    }

    pub async fn run(&self, docs: DocStream) -> Result<BulkOutcome> {
        let existing = self.load_existing_timestamps().await?;
        let concurrency = self.options.concurrent_downloads.max(1);

        let state = Arc::new(Mutex::new(RunState {
            batch: Vec::new(),
            indexed: 0,
            rejected: Vec::new(),
            seen: HashSet::new(),
        }));

        let gateway = &self.gateway;
        let pipeline = self.options.pipeline.as_str();
        let chunk_size = self.options.chunk_size;
        let existing = &existing;

        docs.for_each_concurrent(Some(concurrency), |(doc, download)| {
            let state = Arc::clone(&state);
            async move {
                let id = doc.id.clone();
                let Some(existing_timestamp) = diff_plan(&doc, existing) else {
                    state.lock().await.seen.insert(id);
                    return;
                };

                let downloaded = download.call(true, existing_timestamp).await;
                let op = match downloaded {
                    Ok(extra) => Some(BulkOp::Index { id: id.clone(), doc: merge(&doc, extra) }),
                    Err(err) => {
                        state.lock().await.rejected.push((id.clone(), err.to_string()));
                        None
                    }
                };

                let ready_batch = {
                    let mut guard = state.lock().await;
                    guard.seen.insert(id);
                    if let Some(op) = op {
                        guard.indexed += 1;
                        guard.batch.push(op);
                    }
                    (guard.batch.len() >= chunk_size).then(|| std::mem::take(&mut guard.batch))
                };
                if let Some(batch) = ready_batch {
                    match gateway.bulk(&batch, pipeline).await {
                        Ok(response) => {
                            let rejected = rejected_pairs(&response);
                            if !rejected.is_empty() {
                                state.lock().await.rejected.extend(rejected);
                            }
                        }
                        Err(err) => tracing::error!(error = %err, "bulk flush failed mid-sync"),
                    }
                }
            }
        })
        .await;

        let mut state = Arc::try_unwrap(state).map_err(|_| ()).expect("no outstanding clones after for_each_concurrent join").into_inner();

        if !state.batch.is_empty() {
            let response = self.gateway.bulk(&state.batch, &self.options.pipeline).await?;
            state.rejected.extend(rejected_pairs(&response));
            state.batch.clear();
        }

        // §4.6 step 4: every id in `existing` not marked seen is deleted,
        // only after the producer has finished yielding.
        let delete_ops: Vec<BulkOp> =
            existing.keys().filter(|id| !state.seen.contains(*id)).map(|id| BulkOp::Delete { id: id.clone() }).collect();
        let deleted = delete_ops.len() as u64;
        if !delete_ops.is_empty() {
            let response = self.gateway.bulk(&delete_ops, &self.options.pipeline).await?;
            state.rejected.extend(rejected_pairs(&response));
        }

        Ok(BulkOutcome { indexed_document_count: state.indexed, deleted_document_count: deleted, rejected: state.rejected })
    }

    /// Step 1: an id→timestamp map of currently-indexed docs, paged via
    /// the gateway's `match_all` default query.
    async fn load_existing_timestamps(&self) -> Result<HashMap<String, String>> {
        let mut stream = self.gateway.get_all(serde_json::json!({"query": {"match_all": {}}}), |doc| doc);
        let mut existing = HashMap::new();
        while let Some(doc) = stream.next().await {
            if let (Some(id), Some(ts)) =
                (doc.get("_id").and_then(Value::as_str), doc.get("_timestamp").and_then(Value::as_str))
            {
                existing.insert(id.to_string(), ts.to_string());
            }
        }
        Ok(existing)
    }
}

struct RunState {
    batch: Vec<BulkOp>,
    indexed: u64,
    rejected: Vec<(String, String)>,
    seen: HashSet<String>,
}

/// §4.6 step 2: outer `None` means no-op (document unchanged). Outer
/// `Some` means create (`None` existing timestamp) or update (`Some`,
/// the existing timestamp a source may use to decide what a partial
/// download needs to fetch).
fn diff_plan(doc: &SourceDoc, existing: &HashMap<String, String>) -> Option<Option<String>> {
    match existing.get(&doc.id) {
        None => Some(None),
        Some(existing_ts) if existing_ts.as_str() < doc.timestamp.as_str() => Some(Some(existing_ts.clone())),
        Some(_) => None,
    }
}

fn rejected_pairs(response: &BulkResponse) -> Vec<(String, String)> {
    response.rejected().map(|item: &BulkItemResult| (item.id.clone(), item.error.clone().unwrap_or_default())).collect()
}

fn merge(doc: &SourceDoc, extra: Option<serde_json::Map<String, Value>>) -> Value {
    let mut value = doc.to_json();
    if let (Some(extra), Some(obj)) = (extra, value.as_object_mut()) {
        obj.extend(extra);
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unseen_id_is_a_create() {
        let doc = SourceDoc::new("1", "2026-01-01T00:00:00Z");
        let existing = HashMap::new();
        assert_eq!(diff_plan(&doc, &existing), Some(None));
    }

    #[test]
    fn newer_timestamp_is_an_update() {
        let doc = SourceDoc::new("1", "2026-01-02T00:00:00Z");
        let mut existing = HashMap::new();
        existing.insert("1".to_string(), "2026-01-01T00:00:00Z".to_string());
        assert_eq!(diff_plan(&doc, &existing), Some(Some("2026-01-01T00:00:00Z".to_string())));
    }

    #[test]
    fn unchanged_timestamp_is_a_noop() {
        let doc = SourceDoc::new("1", "2026-01-01T00:00:00Z");
        let mut existing = HashMap::new();
        existing.insert("1".to_string(), "2026-01-01T00:00:00Z".to_string());
        assert_eq!(diff_plan(&doc, &existing), None);
    }

    #[test]
    fn rejected_pairs_keeps_only_errored_items() {
        let response = BulkResponse {
            items: vec![
                BulkItemResult { id: "1".to_string(), error: None },
                BulkItemResult { id: "2".to_string(), error: Some("mapping conflict".to_string()) },
            ],
        };
        assert_eq!(rejected_pairs(&response), vec![("2".to_string(), "mapping conflict".to_string())]);
    }

    #[test]
    fn merge_folds_downloaded_fields_into_the_doc() {
        let doc = SourceDoc::new("1", "2026-01-01T00:00:00Z");
        let mut extra = serde_json::Map::new();
        extra.insert("body".to_string(), Value::String("hello".to_string()));
        let merged = merge(&doc, Some(extra));
        assert_eq!(merged["body"], Value::String("hello".to_string()));
        assert_eq!(merged["_id"], Value::String("1".to_string()));
    }
}
