use std::path::Path;

use serde::Deserialize;

/// `.elastic-connectors` / `.elastic-connectors-sync-jobs` — the two
/// control indices every replica points at (SPEC_FULL §6,
/// `original_source/connectors/kibana.py`'s `CONNECTORS_INDEX`/
/// `JOBS_INDEX` constants).
pub const CONNECTORS_INDEX: &str = ".elastic-connectors";
pub const JOBS_INDEX: &str = ".elastic-connectors-sync-jobs";

#[derive(Clone, Debug, Deserialize)]
pub struct ElasticsearchConfig {
    pub host: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub ca_fingerprint: Option<String>,
}

/// Loaded from the YAML file named by `Opt::config_file` (SPEC_FULL §6),
/// the way `kibana.py` loads its own `config.yml` via `EnvYAML`.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub elasticsearch: ElasticsearchConfig,
    #[serde(default)]
    pub service_types: Vec<String>,
    #[serde(default)]
    pub native_service_types: Vec<String>,
    #[serde(default)]
    pub connector_id: Option<String>,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_concurrent_downloads")]
    pub concurrent_downloads: usize,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_heartbeat_interval_secs() -> u64 {
    30
}

fn default_concurrent_downloads() -> usize {
    connector_types::DEFAULT_CONCURRENT_DOWNLOADS
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|err| anyhow::anyhow!("reading config file {}: {err}", path.display()))?;
        let config: Config = serde_yaml::from_str(&raw)
            .map_err(|err| anyhow::anyhow!("parsing config file {}: {err}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_in_when_omitted() {
        let yaml = "elasticsearch:\n  host: https://localhost:9200\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.poll_interval_secs, 30);
        assert_eq!(config.concurrent_downloads, connector_types::DEFAULT_CONCURRENT_DOWNLOADS);
        assert_eq!(config.log_level, "info");
        assert!(config.service_types.is_empty());
    }

    #[test]
    fn explicit_values_override_defaults() {
        let yaml = "\
elasticsearch:\n  host: https://localhost:9200\n  username: elastic\nservice_types:\n  - directory\npoll_interval_secs: 5\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.poll_interval_secs, 5);
        assert_eq!(config.service_types, vec!["directory".to_string()]);
        assert_eq!(config.elasticsearch.username.as_deref(), Some("elastic"));
    }
}
