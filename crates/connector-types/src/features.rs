use serde_json::Value;

/// One of the four filtering-related feature flags a connector's
/// `features` document can report (§4.3).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FeatureFlag {
    BasicRulesNew,
    AdvancedRulesNew,
    BasicRulesOld,
    AdvancedRulesOld,
}

/// Nested-key lookup over a connector's `features` document, with the
/// new (`sync_rules.*.enabled`) and old (`filtering_rules` /
/// `filtering_advanced_config`) naming both mapped to the same checked
/// accessor (§4.3).
#[derive(Clone, Debug, Default)]
pub struct Features(Value);

impl Features {
    pub fn new(doc: Value) -> Self {
        Features(doc)
    }

    pub fn feature_enabled(&self, flag: FeatureFlag) -> bool {
        match flag {
            FeatureFlag::BasicRulesNew => {
                self.nested_feature_enabled(&["sync_rules", "basic", "enabled"], false)
            }
            FeatureFlag::AdvancedRulesNew => {
                self.nested_feature_enabled(&["sync_rules", "advanced", "enabled"], false)
            }
            FeatureFlag::BasicRulesOld => self.nested_feature_enabled(&["filtering_rules"], false),
            FeatureFlag::AdvancedRulesOld => {
                self.nested_feature_enabled(&["filtering_advanced_config"], false)
            }
        }
    }

    pub fn sync_rules_enabled(&self) -> bool {
        [
            FeatureFlag::BasicRulesNew,
            FeatureFlag::AdvancedRulesNew,
            FeatureFlag::BasicRulesOld,
            FeatureFlag::AdvancedRulesOld,
        ]
        .into_iter()
        .any(|flag| self.feature_enabled(flag))
    }

    /// A missing path anywhere along `keys` returns `default`, never an
    /// error — feature documents are best-effort and user-editable.
    pub(crate) fn nested_feature_enabled(&self, keys: &[&str], default: bool) -> bool {
        let mut current = &self.0;
        for key in keys {
            match current.get(key) {
                Some(value) => current = value,
                None => return default,
            }
        }
        current.as_bool().unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_flags_read_sync_rules() {
        let features = Features::new(json!({
            "sync_rules": {"basic": {"enabled": true}, "advanced": {"enabled": false}}
        }));
        assert!(features.feature_enabled(FeatureFlag::BasicRulesNew));
        assert!(!features.feature_enabled(FeatureFlag::AdvancedRulesNew));
        assert!(!features.feature_enabled(FeatureFlag::BasicRulesOld));
    }

    #[test]
    fn old_flags_read_top_level_keys() {
        let features = Features::new(json!({
            "filtering_advanced_config": true,
            "filtering_rules": false
        }));
        assert!(features.feature_enabled(FeatureFlag::AdvancedRulesOld));
        assert!(!features.feature_enabled(FeatureFlag::BasicRulesOld));
    }

    #[test]
    fn missing_doc_disables_everything() {
        let features = Features::default();
        assert!(!features.sync_rules_enabled());
        let features = Features::new(Value::Null);
        assert!(!features.sync_rules_enabled());
    }

    #[test]
    fn sync_rules_enabled_is_or_over_all_four() {
        let features = Features::new(json!({
            "sync_rules": {"basic": {"enabled": true}, "advanced": {"enabled": false}},
            "filtering_advanced_config": true,
        }));
        assert!(features.sync_rules_enabled());
        assert!(features.feature_enabled(FeatureFlag::BasicRulesNew));
        assert!(features.feature_enabled(FeatureFlag::AdvancedRulesOld));
        assert!(!features.feature_enabled(FeatureFlag::BasicRulesOld));
    }

    #[test]
    fn nested_get_falls_back_on_missing_key() {
        let features = Features::new(json!({"a": {"b": {"c": true}}}));
        assert!(features.nested_feature_enabled(&["a", "b", "c"], false));
        assert!(!features.nested_feature_enabled(&["a", "b", "c", "d"], false));
        assert!(!features.nested_feature_enabled(&["wrong_key", "b", "c"], false));
        assert!(Features::new(Value::Null).nested_feature_enabled(&["a", "b", "c"], true));
    }
}
