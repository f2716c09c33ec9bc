use connector_types::{Error, Result};
use serde_json::Value;

/// One operation inside a `_bulk` request body (§4.6, §6).
#[derive(Clone, Debug)]
pub enum BulkOp {
    Index { id: String, doc: Value },
    Delete { id: String },
}

/// Outcome of a single operation inside a bulk response, enough for the
/// coordinator to attribute a §7 kind-4 (Data) failure to one document
/// without aborting the rest of the batch.
#[derive(Clone, Debug)]
pub struct BulkItemResult {
    pub id: String,
    pub error: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct BulkResponse {
    pub items: Vec<BulkItemResult>,
}

impl BulkResponse {
    pub fn rejected(&self) -> impl Iterator<Item = &BulkItemResult> {
        self.items.iter().filter(|item| item.error.is_some())
    }
}

/// Thin async wrapper over the search cluster's document API
/// (search/index/bulk/update/refresh/exists), mirroring the shape of the
/// teacher's own `http-client` crate (a `reqwest::Client` held behind a
/// small typed surface) but scoped to the handful of verbs this engine's
/// §1 "opaque HTTP client" boundary actually needs.
///
/// Deliberately offers no `create_index`/`delete_index` (§9 Open question
/// 2): the bootstrap tool that seeds control indices is out of scope, and
/// this client must not be able to reproduce its delete+recreate
/// behavior against a live index.
#[derive(Clone)]
pub struct SearchClient {
    http: reqwest::Client,
    base_url: reqwest::Url,
}

impl SearchClient {
    pub fn new(base_url: reqwest::Url, http: reqwest::Client) -> Self {
        SearchClient { http, base_url }
    }

    fn url(&self, path: &str) -> Result<reqwest::Url> {
        self.base_url.join(path).map_err(|err| Error::Internal(err.to_string()))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = request.send().await.map_err(|err| Error::Transport(err.to_string()))?;
        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ClusterResponse { status: status.as_u16(), body });
        }
        Ok(response)
    }

    async fn send_json(&self, request: reqwest::RequestBuilder) -> Result<Value> {
        let response = self.send(request).await?;
        response.json::<Value>().await.map_err(|err| Error::Transport(err.to_string()))
    }

    /// `expand_wildcards=hidden|open`, switched on whether the index name
    /// starts with `.` (SPEC_FULL §4.1), the way control indices
    /// (`.elastic-connectors*`) and target indices differ.
    fn expand_wildcards(index: &str) -> &'static str {
        if index.starts_with('.') {
            "hidden"
        } else {
            "open"
        }
    }

    pub async fn refresh(&self, index: &str) -> Result<()> {
        let url = self.url(&format!("{index}/_refresh"))?;
        self.send(self.http.post(url)).await?;
        Ok(())
    }

    pub async fn exists(&self, index: &str) -> Result<bool> {
        let url = self.url(&format!("{index}?expand_wildcards={}", Self::expand_wildcards(index)))?;
        match self.send(self.http.head(url)).await {
            Ok(_) => Ok(true),
            Err(Error::ClusterResponse { status: 404, .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// One page of `query` at `from/size` (§4.1). Callers needing the
    /// whole result set should go through [`crate::gateway::IndexGateway`]
    /// rather than paging by hand.
    pub async fn search(&self, index: &str, query: &Value, from: u64, size: u64) -> Result<Value> {
        let url = self.url(&format!(
            "{index}/_search?from={from}&size={size}&expand_wildcards={}",
            Self::expand_wildcards(index)
        ))?;
        self.send_json(self.http.post(url).json(query)).await
    }

    pub async fn get(&self, index: &str, id: &str) -> Result<Option<Value>> {
        let url = self.url(&format!("{index}/_doc/{id}"))?;
        match self.send_json(self.http.get(url)).await {
            Ok(body) => Ok(Some(body)),
            Err(Error::ClusterResponse { status: 404, .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub async fn upsert(&self, index: &str, id: &str, doc: &Value) -> Result<()> {
        let url = self.url(&format!("{index}/_doc/{id}"))?;
        self.send(self.http.put(url).json(doc)).await?;
        Ok(())
    }

    /// `POST {index}/_doc` with no id: the cluster assigns one, returned
    /// for the caller to remember (used by `SyncJobRecord::start`, which
    /// has no id of its own until the job document exists).
    pub async fn create(&self, index: &str, doc: &Value) -> Result<String> {
        let url = self.url(&format!("{index}/_doc"))?;
        let body = self.send_json(self.http.post(url).json(doc)).await?;
        body.get("_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::Internal("cluster response missing _id".to_string()))
    }

    /// Partial update with `retry_on_conflict` (§4.1, §5: optimistic
    /// concurrency is the only retry mechanism on the write path). A 409
    /// is retried up to `retry_on_conflict` times with exponential
    /// backoff (`2^attempt` seconds, §5, via the `backoff` crate); any
    /// other cluster error aborts immediately.
    pub async fn update(&self, index: &str, id: &str, partial: &Value, retry_on_conflict: u32) -> Result<()> {
        let url = self.url(&format!("{index}/_update/{id}?retry_on_conflict={retry_on_conflict}"))?;
        let body = serde_json::json!({ "doc": partial });
        let attempts_left = std::sync::atomic::AtomicU32::new(retry_on_conflict);

        let policy = backoff::ExponentialBackoffBuilder::new()
            .with_initial_interval(std::time::Duration::from_secs(1))
            .with_max_elapsed_time(Some(std::time::Duration::from_secs(30)))
            .build();

        backoff::future::retry(policy, || async {
            let request = self.http.post(url.clone()).json(&body);
            match self.send(request).await {
                Ok(_) => Ok(()),
                Err(Error::ClusterResponse { status: 409, body })
                    if attempts_left.fetch_update(
                        std::sync::atomic::Ordering::SeqCst,
                        std::sync::atomic::Ordering::SeqCst,
                        |n| n.checked_sub(1),
                    ).is_ok() =>
                {
                    tracing::warn!(index, id, "update conflict, retrying");
                    Err(backoff::Error::transient(Error::ClusterResponse { status: 409, body }))
                }
                Err(err) => Err(backoff::Error::permanent(err)),
            }
        })
        .await
    }

    pub async fn delete(&self, index: &str, id: &str) -> Result<()> {
        let url = self.url(&format!("{index}/_doc/{id}"))?;
        self.send(self.http.delete(url)).await?;
        Ok(())
    }

    /// `PUT _bulk?pipeline=...` (§6): a single cluster-wide endpoint, the
    /// target index for each op is carried in its NDJSON action line.
    pub async fn bulk(&self, index: &str, operations: &[BulkOp], pipeline: &str) -> Result<BulkResponse> {
        if operations.is_empty() {
            return Ok(BulkResponse::default());
        }
        let url = self.url(&format!("_bulk?pipeline={pipeline}"))?;
        let mut body = String::new();
        for op in operations {
            match op {
                BulkOp::Index { id, doc } => {
                    body.push_str(&serde_json::json!({"index": {"_index": index, "_id": id}}).to_string());
                    body.push('\n');
                    body.push_str(&doc.to_string());
                    body.push('\n');
                }
                BulkOp::Delete { id } => {
                    body.push_str(&serde_json::json!({"delete": {"_index": index, "_id": id}}).to_string());
                    body.push('\n');
                }
            }
        }
        let response = self
            .send_json(self.http.put(url).header("content-type", "application/x-ndjson").body(body))
            .await?;
        Ok(parse_bulk_response(&response))
    }
}

fn parse_bulk_response(body: &Value) -> BulkResponse {
    let items = body
        .get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let (_op, result) = item.as_object()?.iter().next()?;
                    let id = result.get("_id").and_then(Value::as_str).unwrap_or_default().to_string();
                    let error = result.get("error").map(|err| err.to_string());
                    Some(BulkItemResult { id, error })
                })
                .collect()
        })
        .unwrap_or_default();
    BulkResponse { items }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn expand_wildcards_switches_on_dot_prefix() {
        assert_eq!(SearchClient::expand_wildcards(".elastic-connectors"), "hidden");
        assert_eq!(SearchClient::expand_wildcards("search-airbnb"), "open");
    }

    #[test]
    fn bulk_response_reports_only_rejected_items() {
        let body = json!({
            "items": [
                {"index": {"_id": "1"}},
                {"index": {"_id": "2", "error": {"type": "mapper_parsing_exception"}}},
            ]
        });
        let response = parse_bulk_response(&body);
        assert_eq!(response.items.len(), 2);
        let rejected: Vec<_> = response.rejected().collect();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].id, "2");
    }
}
