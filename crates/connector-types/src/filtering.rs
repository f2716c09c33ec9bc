use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_DOMAIN: &str = "DEFAULT";

/// Which side of a [`FilterBlock`] a caller wants: the rules an editor is
/// still iterating on, or the rules a running sync actually consumes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FilterState {
    Draft,
    Active,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterValidation {
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub errors: Vec<Value>,
}

/// One `{advanced_snippet, rules, validation}` triple — either the
/// `draft` or `active` half of a [`FilterBlock`] (§3).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default = "empty_object")]
    pub advanced_snippet: Value,
    #[serde(default)]
    pub rules: Vec<Value>,
    #[serde(default)]
    pub validation: FilterValidation,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl Default for Filter {
    fn default() -> Self {
        Filter { advanced_snippet: empty_object(), rules: Vec::new(), validation: FilterValidation::default() }
    }
}

impl Filter {
    /// A filter with no rules and no advanced snippet — the default for a
    /// non-existent domain or missing filtering entirely (§4.2).
    pub fn empty() -> Self {
        Filter::default()
    }

    /// `advanced_snippet` lifted (`.value` pulled up one level, same
    /// transform as [`crate::sync_job::transform_filtering`]) and
    /// non-empty.
    pub fn has_advanced_rules(&self) -> bool {
        !Self::lift_advanced_snippet(&self.advanced_snippet)
            .as_object()
            .map(Map::is_empty)
            .unwrap_or(true)
    }

    pub fn get_advanced_rules(&self) -> Value {
        Self::lift_advanced_snippet(&self.advanced_snippet)
    }

    pub fn get_basic_rules(&self) -> &[Value] {
        &self.rules
    }

    fn lift_advanced_snippet(advanced_snippet: &Value) -> Value {
        match advanced_snippet.get("value") {
            Some(value) => value.clone(),
            None => advanced_snippet.clone(),
        }
    }
}

/// One domain's worth of filtering (§3: at most one draft and one active
/// per domain).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterBlock {
    #[serde(default = "default_domain")]
    pub domain: String,
    #[serde(default)]
    pub draft: Filter,
    #[serde(default)]
    pub active: Filter,
}

fn default_domain() -> String {
    DEFAULT_DOMAIN.to_string()
}

/// The full `filtering` sequence of a connector (§3, §4.2).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filtering(pub Vec<FilterBlock>);

impl Filtering {
    pub const DEFAULT_DOMAIN: &'static str = DEFAULT_DOMAIN;

    pub fn get_filter(&self, state: FilterState, domain: &str) -> Filter {
        match self.0.iter().find(|block| block.domain == domain) {
            Some(block) => match state {
                FilterState::Draft => block.draft.clone(),
                FilterState::Active => block.active.clone(),
            },
            None => Filter::empty(),
        }
    }

    pub fn get_active_filter(&self, domain: Option<&str>) -> Filter {
        self.get_filter(FilterState::Active, domain.unwrap_or(DEFAULT_DOMAIN))
    }

    pub fn get_draft_filter(&self, domain: Option<&str>) -> Filter {
        self.get_filter(FilterState::Draft, domain.unwrap_or(DEFAULT_DOMAIN))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Filtering {
        Filtering(vec![
            FilterBlock {
                domain: DEFAULT_DOMAIN.to_string(),
                draft: Filter {
                    advanced_snippet: json!({"value": {"query": {"options": {}}}}),
                    rules: vec![json!({"id": 1}), json!({"id": 2})],
                    validation: FilterValidation { state: "valid".into(), errors: vec![] },
                },
                active: Filter {
                    advanced_snippet: json!({"value": {"find": {"settings": {}}}}),
                    rules: vec![json!({"id": 3}), json!({"id": 4})],
                    validation: FilterValidation { state: "valid".into(), errors: vec![] },
                },
            },
            FilterBlock {
                domain: "other-domain-1".to_string(),
                draft: Filter::empty(),
                active: Filter::empty(),
            },
        ])
    }

    #[test]
    fn non_existing_domain_returns_empty_filter() {
        let filtering = sample();
        assert_eq!(filtering.get_filter(FilterState::Active, "does-not-exist"), Filter::empty());
    }

    #[test]
    fn missing_filtering_returns_empty_filter() {
        let filtering = Filtering::default();
        assert_eq!(filtering.get_filter(FilterState::Active, DEFAULT_DOMAIN), Filter::empty());
    }

    #[test]
    fn selects_active_and_draft_independently() {
        let filtering = sample();
        let active = filtering.get_active_filter(None);
        assert_eq!(active.rules.len(), 2);
        assert_eq!(active.rules[0], json!({"id": 3}));

        let draft = filtering.get_draft_filter(None);
        assert_eq!(draft.rules[0], json!({"id": 1}));
    }

    #[test]
    fn advanced_rules_presence() {
        assert!(!Filter::empty().has_advanced_rules());
        assert!(Filter { advanced_snippet: json!({}), ..Filter::empty() }.has_advanced_rules().eq(&false));

        let with_rules = Filter {
            advanced_snippet: json!({"db": {"table": "SELECT * FROM db.table"}}),
            ..Filter::empty()
        };
        assert!(with_rules.has_advanced_rules());
        assert_eq!(with_rules.get_advanced_rules(), json!({"db": {"table": "SELECT * FROM db.table"}}));

        let basic_only = Filter { rules: vec![json!({"id": 1})], ..Filter::empty() };
        assert!(!basic_only.has_advanced_rules());
        assert_eq!(basic_only.get_advanced_rules(), json!({}));
    }
}
