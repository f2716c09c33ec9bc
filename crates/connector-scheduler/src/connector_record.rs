use std::collections::HashMap;
use std::sync::Arc;

use connector_types::{Configuration, Connector, Error, Result, Source, SourceFactory, Status};
use search_client::IndexGateway;
use serde_json::Value;
use tokio::sync::{Notify, RwLock};

use crate::time_util::{now_rfc3339, parse_rfc3339};

/// Lifecycle object for one connector row (§4.5, L5): status derivation,
/// dirty tracking, heartbeat, claim. The persisted document is
/// authoritative; `ConnectorRecord` holds an in-memory copy behind a
/// dirty flag and flushes through `sync_doc` — the "mutable-with-dirty-
/// flag entity" pattern §9's design notes call for, structurally
/// grounded on `index-scheduler/src/features.rs`'s
/// `Arc<RwLock<RuntimeTogglableFeatures>>`.
pub struct ConnectorRecord {
    id: String,
    gateway: IndexGateway,
    inner: RwLock<Connector>,
    dirty: RwLock<bool>,
    heartbeat: tokio::sync::Mutex<Option<HeartbeatHandle>>,
    source: RwLock<Option<Arc<dyn Source>>>,
}

struct HeartbeatHandle {
    task: tokio::task::JoinHandle<()>,
    cancel: Arc<Notify>,
}

impl ConnectorRecord {
    pub fn new(id: impl Into<String>, connector: Connector, gateway: IndexGateway) -> Arc<Self> {
        Arc::new(ConnectorRecord {
            id: id.into(),
            gateway,
            inner: RwLock::new(connector),
            dirty: RwLock::new(false),
            heartbeat: tokio::sync::Mutex::new(None),
            source: RwLock::new(None),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn snapshot(&self) -> Connector {
        self.inner.read().await.clone()
    }

    pub async fn status(&self) -> Status {
        self.inner.read().await.derived_status()
    }

    /// Apply an in-memory mutation and mark the record dirty (§4.5:
    /// "Setting `service_type`, `configuration`, `status`, `error`, or
    /// any `last_*` marks dirty"). Does not flush — call `sync_doc` to
    /// persist.
    pub async fn mutate<F>(&self, f: F)
    where
        F: FnOnce(&mut Connector),
    {
        let mut guard = self.inner.write().await;
        f(&mut guard);
        drop(guard);
        *self.dirty.write().await = true;
    }

    /// Flush the in-memory copy via a partial update if dirty; no-op
    /// otherwise.
    pub async fn sync_doc(&self) -> Result<()> {
        let mut dirty = self.dirty.write().await;
        if !*dirty {
            return Ok(());
        }
        let doc = serde_json::to_value(&*self.inner.read().await)?;
        self.gateway.update(&self.id, &doc, 3).await?;
        *dirty = false;
        Ok(())
    }

    /// Resolve `service_type` against `factories`, writing back a
    /// `fallback_service_type` if the stored one is null, merge
    /// configuration defaults (missing key added with a null value,
    /// §4.5), and instantiate the `Source` (§4.5 `prepare`).
    pub async fn prepare(
        &self,
        factories: &HashMap<String, Arc<dyn SourceFactory>>,
        fallback_service_type: Option<&str>,
    ) -> Result<Arc<dyn Source>> {
        let resolved_type = match self.inner.read().await.service_type.clone() {
            Some(service_type) => service_type,
            None => {
                let service_type = fallback_service_type
                    .ok_or_else(|| Error::SourceNotConfigured { service_type: "<unresolved>".to_string() })?
                    .to_string();
                self.mutate(|connector| connector.service_type = Some(service_type.clone())).await;
                service_type
            }
        };

        let factory = factories
            .get(&resolved_type)
            .ok_or_else(|| Error::UnknownServiceType(resolved_type.clone()))?;

        self.merge_configuration_defaults(factory.default_configuration()).await;

        let configuration = self.inner.read().await.configuration.clone();
        let source = factory.build(configuration)?;
        *self.source.write().await = Some(Arc::clone(&source));
        Ok(source)
    }

    /// Any key in `defaults` missing from the persisted configuration is
    /// added, label/type preserved but value forced to null — this alone
    /// can flip derived status to `needs_configuration` (SPEC_FULL §4.5,
    /// `test_prepare`).
    async fn merge_configuration_defaults(&self, mut defaults: Configuration) {
        let present: Vec<String> = {
            let guard = self.inner.read().await;
            guard.configuration.keys().cloned().collect()
        };
        for key in present {
            defaults.remove(&key);
        }
        if defaults.is_empty() {
            return;
        }
        self.mutate(|connector| {
            for (key, mut field) in defaults {
                field.value = Value::Null;
                connector.configuration.insert(key, field);
            }
        })
        .await;
    }

    /// `sync_now == true`, OR the cron schedule fires since `last_synced`,
    /// AND no other replica appears to be running the connector (its
    /// `last_seen` is stale beyond `stuck_threshold`, or never set).
    pub async fn is_due(&self, now: time::OffsetDateTime, stuck_threshold: time::Duration) -> Result<bool> {
        let connector = self.inner.read().await;
        if !connector.scheduling.enabled && !connector.sync_now {
            return Ok(false);
        }

        let cron_due = if connector.scheduling.enabled {
            let last_synced = parse_rfc3339(connector.last_synced.as_deref());
            crate::cron_schedule::is_due(&connector.scheduling.interval, last_synced, now)?
        } else {
            false
        };

        if !(connector.sync_now || cron_due) {
            return Ok(false);
        }

        let last_seen = parse_rfc3339(connector.last_seen.as_deref());
        Ok(match last_seen {
            None => true,
            Some(seen) => now - seen >= stuck_threshold,
        })
    }

    /// First call launches a cooperative background task that refreshes
    /// `last_seen` every `interval` and flushes; subsequent calls are
    /// no-ops regardless of the interval they pass (§4.5: idempotent,
    /// "a later smaller interval does not shrink the cadence").
    pub async fn start_heartbeat(self: &Arc<Self>, interval: std::time::Duration) {
        let mut guard = self.heartbeat.lock().await;
        if guard.is_some() {
            return;
        }
        let cancel = Arc::new(Notify::new());
        let cancel_for_task = Arc::clone(&cancel);
        let record = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = record.heartbeat_tick().await {
                            tracing::error!(connector = %record.id, error = %err, "heartbeat flush failed");
                        }
                    }
                    _ = cancel_for_task.notified() => break,
                }
            }
        });
        *guard = Some(HeartbeatHandle { task, cancel });
    }

    async fn heartbeat_tick(&self) -> Result<()> {
        let now = now_rfc3339();
        self.mutate(|connector| connector.last_seen = Some(now)).await;
        self.sync_doc().await
    }

    /// Cooperatively stop the heartbeat task, if any, and await it.
    pub async fn close(&self) {
        if let Some(handle) = self.heartbeat.lock().await.take() {
            handle.cancel.notify_one();
            let _ = handle.task.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use connector_types::{ConfigField, Scheduling};

    fn gateway() -> IndexGateway {
        let client = search_client::SearchClient::new(
            reqwest::Url::parse("http://localhost:9200").unwrap(),
            reqwest::Client::new(),
        );
        IndexGateway::new(client, ".elastic-connectors")
    }

    #[tokio::test]
    async fn not_due_when_scheduling_disabled_and_no_sync_now() {
        let connector = Connector { scheduling: Scheduling { enabled: false, interval: String::new() }, ..Default::default() };
        let record = ConnectorRecord::new("1", connector, gateway());
        assert!(!record.is_due(time::OffsetDateTime::now_utc(), time::Duration::seconds(60)).await.unwrap());
    }

    #[tokio::test]
    async fn due_immediately_when_sync_now_and_never_seen() {
        let connector = Connector { sync_now: true, ..Default::default() };
        let record = ConnectorRecord::new("1", connector, gateway());
        assert!(record.is_due(time::OffsetDateTime::now_utc(), time::Duration::seconds(60)).await.unwrap());
    }

    #[tokio::test]
    async fn not_due_when_another_replica_recently_heartbeat() {
        let now = time::OffsetDateTime::now_utc();
        let connector = Connector {
            sync_now: true,
            last_seen: Some(now.format(&time::format_description::well_known::Rfc3339).unwrap()),
            ..Default::default()
        };
        let record = ConnectorRecord::new("1", connector, gateway());
        assert!(!record.is_due(now, time::Duration::seconds(60)).await.unwrap());
    }

    #[tokio::test]
    async fn prepare_flips_to_needs_configuration_when_defaults_are_missing() {
        struct Banana;
        #[async_trait::async_trait]
        impl Source for Banana {
            fn default_configuration() -> Configuration {
                let mut map = Configuration::new();
                map.insert("host".to_string(), ConfigField::with_value(Value::String("x".into())));
                map
            }
            fn new(_configuration: Configuration) -> Result<Self> {
                Ok(Banana)
            }
            async fn ping(&self) -> Result<()> {
                Ok(())
            }
            fn get_docs(&self, _filtering: connector_types::Filter) -> connector_types::DocStream {
                Box::pin(futures::stream::empty())
            }
        }
        struct BananaFactory;
        impl SourceFactory for BananaFactory {
            fn service_type(&self) -> &str {
                "banana"
            }
            fn default_configuration(&self) -> Configuration {
                Banana::default_configuration()
            }
            fn build(&self, configuration: Configuration) -> Result<Arc<dyn Source>> {
                Ok(Arc::new(Banana::new(configuration)?))
            }
        }

        let connector = Connector { service_type: Some("banana".to_string()), ..Default::default() };
        let record = ConnectorRecord::new("1", connector, gateway());
        let mut factories: HashMap<String, Arc<dyn SourceFactory>> = HashMap::new();
        factories.insert("banana".to_string(), Arc::new(BananaFactory));

        record.prepare(&factories, None).await.unwrap();
        assert_eq!(record.status().await, Status::NeedsConfiguration);
    }
}
