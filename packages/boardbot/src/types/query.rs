//! Structured query context extracted from a user message.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::catalogue::Attribute;

/// Products returned when the user doesn't ask for a specific number.
pub const DEFAULT_PRODUCT_COUNT: usize = 5;

/// A filter operand: one standardised string or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Single(String),
    Many(Vec<String>),
}

impl FilterValue {
    pub fn values(&self) -> Vec<&str> {
        match self {
            Self::Single(v) => vec![v.as_str()],
            Self::Many(vs) => vs.iter().map(String::as_str).collect(),
        }
    }

    fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(Self::Single(s.trim().to_string())),
            serde_json::Value::Number(n) => Some(Self::Single(n.to_string())),
            serde_json::Value::Array(items) => {
                let items: Vec<String> = items
                    .iter()
                    .filter_map(|i| match i {
                        serde_json::Value::String(s) => Some(s.trim().to_string()),
                        serde_json::Value::Number(n) => Some(n.to_string()),
                        _ => None,
                    })
                    .filter(|s| !s.is_empty())
                    .collect();
                (!items.is_empty()).then_some(Self::Many(items))
            }
            _ => None,
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

/// Sort direction requested by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub order: SortOrder,
}

/// Filters, sort, entities and requested product count for one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryContext {
    #[serde(default)]
    pub filters: IndexMap<String, FilterValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortSpec>,
    #[serde(default)]
    pub entities: IndexMap<String, Vec<String>>,
    #[serde(default = "default_product_count")]
    pub num_products_requested: usize,
}

fn default_product_count() -> usize {
    DEFAULT_PRODUCT_COUNT
}

impl Default for QueryContext {
    fn default() -> Self {
        Self {
            filters: IndexMap::new(),
            sort: None,
            entities: IndexMap::new(),
            num_products_requested: DEFAULT_PRODUCT_COUNT,
        }
    }
}

impl QueryContext {
    pub fn with_filter(mut self, attribute: Attribute, value: impl Into<FilterValue>) -> Self {
        self.filters.insert(attribute.as_str().to_string(), value.into());
        self
    }

    pub fn with_product_count(mut self, count: usize) -> Self {
        self.num_products_requested = count;
        self
    }

    /// Build from a model reply. Filter keys outside the attribute list are
    /// logged and dropped; a missing or zero count falls back to `default_count`.
    pub fn from_json(value: &serde_json::Value, default_count: usize) -> Self {
        let filters = value
            .get("filters")
            .and_then(|f| f.as_object())
            .map(sanitize_filters)
            .unwrap_or_default();

        let sort = value
            .get("sort")
            .filter(|s| !s.is_null())
            .and_then(|s| serde_json::from_value::<SortSpec>(s.clone()).ok());

        let entities = value
            .get("entities")
            .and_then(|e| e.as_object())
            .map(|object| {
                object
                    .iter()
                    .filter_map(|(k, v)| match FilterValue::from_json(v)? {
                        FilterValue::Single(s) => Some((k.clone(), vec![s])),
                        FilterValue::Many(vs) => Some((k.clone(), vs)),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let num_products_requested = value
            .get("num_products_requested")
            .or_else(|| value.get("product_count"))
            .and_then(read_count)
            .filter(|n| *n > 0)
            .unwrap_or(default_count);

        Self {
            filters,
            sort,
            entities,
            num_products_requested,
        }
    }
}

/// Keep only known, filterable attributes with usable values.
pub fn sanitize_filters(
    object: &serde_json::Map<String, serde_json::Value>,
) -> IndexMap<String, FilterValue> {
    let mut filters = IndexMap::new();
    for (key, raw) in object {
        let attribute = match key.parse::<Attribute>() {
            Ok(a) if a.is_filterable() => a,
            _ => {
                warn!(filter = %key, "discarding filter on unknown attribute");
                continue;
            }
        };
        match FilterValue::from_json(raw) {
            Some(value) => {
                filters.insert(attribute.as_str().to_string(), value);
            }
            None => warn!(filter = %key, "discarding filter with empty value"),
        }
    }
    filters
}

fn read_count(value: &serde_json::Value) -> Option<usize> {
    match value {
        serde_json::Value::Number(n) => n.as_u64().map(|n| n as usize),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_filter_keys_are_dropped() {
        let context = QueryContext::from_json(
            &json!({
                "filters": {
                    "form_factor": "COM EXPRESS",
                    "gpu_vendor": "NVIDIA",
                    "wireless": ["WI-FI", "BLUETOOTH"],
                    "full_summary": "anything"
                },
                "num_products_requested": 3
            }),
            DEFAULT_PRODUCT_COUNT,
        );
        let keys: Vec<_> = context.filters.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["form_factor", "wireless"]);
        assert_eq!(context.num_products_requested, 3);
    }

    #[test]
    fn test_defaults_when_fields_missing() {
        let context = QueryContext::from_json(&json!({}), DEFAULT_PRODUCT_COUNT);
        assert_eq!(context, QueryContext::default());
        assert_eq!(context.num_products_requested, 5);
    }

    #[test]
    fn test_sort_and_entities() {
        let context = QueryContext::from_json(
            &json!({
                "sort": {"field": "processor_tdp", "order": "asc"},
                "entities": {"use_case": "robotics", "brands": ["NXP", "TI"]},
                "num_products_requested": "0"
            }),
            4,
        );
        assert_eq!(context.sort.unwrap().order, SortOrder::Asc);
        assert_eq!(context.entities["use_case"], vec!["robotics"]);
        assert_eq!(context.entities["brands"], vec!["NXP", "TI"]);
        assert_eq!(context.num_products_requested, 4);
    }
}
