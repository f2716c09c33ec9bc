use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::filtering::Filtering;
use crate::status::Status;

/// `{value, label, type}` — one declared configuration field (§3, §6).
/// `type` is informational only; the engine never validates `value`
/// against it, only checks non-null-ness (SPEC_FULL §3).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigField {
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,
}

impl ConfigField {
    pub fn with_value(value: Value) -> Self {
        ConfigField { value, label: None, field_type: None }
    }

    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }
}

pub type Configuration = BTreeMap<String, ConfigField>;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Scheduling {
    #[serde(default)]
    pub enabled: bool,
    /// Quartz cron string, seconds precision (SPEC_FULL §3).
    #[serde(default)]
    pub interval: String,
}

/// Persisted connector document (§3), mirrored from
/// `.elastic-connectors`. Unknown UI-managed fields (`api_key_id`,
/// `name`, `description`, `is_native`, …) round-trip through `extra`
/// rather than being dropped.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Connector {
    #[serde(skip)]
    pub id: String,

    pub service_type: Option<String>,
    pub index_name: String,
    #[serde(default)]
    pub configuration: Configuration,
    pub status: Status,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub scheduling: Scheduling,
    #[serde(default)]
    pub sync_now: bool,
    #[serde(default)]
    pub last_sync_status: Option<String>,
    #[serde(default)]
    pub last_sync_error: Option<String>,
    #[serde(default)]
    pub last_synced: Option<String>,
    #[serde(default)]
    pub last_seen: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub pipeline: Value,
    #[serde(default)]
    pub filtering: Filtering,
    #[serde(default)]
    pub features: Value,
    #[serde(default)]
    pub error: Option<String>,

    /// Everything else the UI writes that this engine never interprets.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Connector {
    /// `status = needs_configuration` iff some declared configuration
    /// field has a null value (§4.5 invariant, §8 property 1). This
    /// overrides any persisted status.
    pub fn has_unset_configuration(&self) -> bool {
        self.configuration.values().any(ConfigField::is_null)
    }

    pub fn derived_status(&self) -> Status {
        if self.has_unset_configuration() {
            Status::NeedsConfiguration
        } else {
            self.status
        }
    }
}

/// Reserved names no target index may use (SPEC_FULL §3): `.` and `..`
/// outright, and anything starting with `.` is reserved for control
/// indices such as `.elastic-connectors`.
const RESERVED_INDEX_NAMES: &[&str] = &[".", ".."];

/// Index-name rules from §3: lower-case, must not start with `-`, `_`,
/// `+`, or `.`, no whitespace, non-zero length, not reserved.
pub fn validate_index_name(name: &str) -> crate::error::Result<()> {
    if name.is_empty()
        || RESERVED_INDEX_NAMES.contains(&name)
        || name.starts_with(['-', '_', '+', '.'])
        || name.chars().any(char::is_whitespace)
        || name.chars().any(char::is_uppercase)
    {
        return Err(crate::error::Error::InvalidIndexName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn needs_configuration_overrides_stored_status() {
        let mut connector = Connector { status: Status::Connected, ..Default::default() };
        connector.configuration.insert("cool".into(), ConfigField::with_value(json!("foo")));
        connector.configuration.insert("cool2".into(), ConfigField::with_value(Value::Null));
        assert_eq!(connector.derived_status(), Status::NeedsConfiguration);

        connector.configuration.insert("cool2".into(), ConfigField::with_value(json!("baz")));
        assert_eq!(connector.derived_status(), Status::Connected);
    }

    #[test]
    fn extra_fields_round_trip() {
        let raw = json!({
            "service_type": "mongodb",
            "index_name": "search-airbnb",
            "status": "configured",
            "api_key_id": "",
            "is_native": true,
        });
        let connector: Connector = serde_json::from_value(raw).unwrap();
        assert_eq!(connector.extra.get("api_key_id"), Some(&json!("")));
        assert_eq!(connector.extra.get("is_native"), Some(&json!(true)));

        let serialized = serde_json::to_value(&connector).unwrap();
        assert_eq!(serialized["is_native"], json!(true));
    }

    #[test]
    fn index_name_rules() {
        assert!(validate_index_name("search-airbnb").is_ok());
        assert!(validate_index_name("").is_err());
        assert!(validate_index_name(".elastic-connectors").is_err());
        assert!(validate_index_name("-leading-dash").is_err());
        assert!(validate_index_name("has space").is_err());
        assert!(validate_index_name("Upper-Case").is_err());
        assert!(validate_index_name(".").is_err());
        assert!(validate_index_name("..").is_err());
    }
}
