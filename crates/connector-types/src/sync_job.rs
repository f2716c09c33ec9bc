use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::status::JobStatus;

/// The `connector` sub-object embedded in a persisted sync job document
/// (§3): the connector id plus its *flattened* active filtering, snapshot
/// at `start` and immutable for the rest of the job's life.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JobConnectorRef {
    pub id: String,
    pub filtering: Value,
}

/// Persisted sync job document (§3), mirrored from
/// `.elastic-connectors-sync-jobs`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncJob {
    #[serde(skip)]
    pub job_id: Option<String>,
    pub connector: JobConnectorRef,
    pub status: JobStatus,
    pub created_at: Option<String>,
    pub completed_at: Option<String>,
    #[serde(default)]
    pub indexed_document_count: u64,
    #[serde(default)]
    pub deleted_document_count: u64,
    #[serde(default)]
    pub error: Option<String>,
}

impl SyncJob {
    pub fn new(connector_id: impl Into<String>) -> Self {
        SyncJob {
            job_id: None,
            connector: JobConnectorRef { id: connector_id.into(), filtering: Value::Null },
            status: JobStatus::Pending,
            created_at: None,
            completed_at: None,
            indexed_document_count: 0,
            deleted_document_count: 0,
            error: None,
        }
    }

    /// `duration = completed_at - created_at`, or `-1` when the job has
    /// not completed yet (§3 invariant, §8 property 2). Callers supply
    /// already-parsed instants because this crate has no opinion on the
    /// wall-clock source.
    pub fn duration_secs(
        created_at: Option<time::OffsetDateTime>,
        completed_at: Option<time::OffsetDateTime>,
    ) -> f64 {
        match (created_at, completed_at) {
            (Some(start), Some(end)) => (end - start).as_seconds_f64(),
            _ => -1.0,
        }
    }

    /// Lifts `advanced_snippet.value` one level and fills in the
    /// `{advanced_snippet: {}, rules: []}` default when `raw` is missing
    /// or has no recognizable shape (§4.4, §8 scenario 1).
    pub fn transform_filtering(raw: Option<&Value>) -> Value {
        let raw = match raw {
            Some(value) if !value.is_null() => value,
            _ => return default_transformed_filtering(),
        };

        let mut out = match raw.as_object() {
            Some(obj) => obj.clone(),
            None => return default_transformed_filtering(),
        };

        let lifted = match out.get("advanced_snippet").and_then(|s| s.get("value")) {
            Some(value) => value.clone(),
            None => out.get("advanced_snippet").cloned().unwrap_or_else(|| Value::Object(Map::new())),
        };
        out.insert("advanced_snippet".to_string(), lifted);
        out.entry("rules").or_insert_with(|| Value::Array(Vec::new()));
        Value::Object(out)
    }
}

fn default_transformed_filtering() -> Value {
    serde_json::json!({"advanced_snippet": {}, "rules": []})
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lifts_advanced_snippet_value() {
        let input = json!({"advanced_snippet": {"value": {"query": {}}}, "rules": []});
        let out = SyncJob::transform_filtering(Some(&input));
        assert_eq!(out, json!({"advanced_snippet": {"query": {}}, "rules": []}));
    }

    #[test]
    fn empty_value_lifts_to_empty_object() {
        let input = json!({"advanced_snippet": {"value": {}}, "rules": []});
        let out = SyncJob::transform_filtering(Some(&input));
        assert_eq!(out, json!({"advanced_snippet": {}, "rules": []}));
    }

    #[test]
    fn already_lifted_snippet_is_unchanged() {
        let input = json!({"advanced_snippet": {}, "rules": []});
        let out = SyncJob::transform_filtering(Some(&input));
        assert_eq!(out, json!({"advanced_snippet": {}, "rules": []}));
    }

    #[test]
    fn missing_or_null_defaults() {
        assert_eq!(SyncJob::transform_filtering(Some(&json!({}))), default_transformed_filtering());
        assert_eq!(SyncJob::transform_filtering(Some(&Value::Null)), default_transformed_filtering());
        assert_eq!(SyncJob::transform_filtering(None), default_transformed_filtering());
    }

    #[test]
    fn duration_is_negative_one_until_completed() {
        assert_eq!(SyncJob::duration_secs(Some(time::OffsetDateTime::now_utc()), None), -1.0);
        let start = time::OffsetDateTime::now_utc();
        let end = start + time::Duration::seconds(5);
        assert!((SyncJob::duration_secs(Some(start), Some(end)) - 5.0).abs() < 0.001);
    }
}
