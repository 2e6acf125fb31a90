//! Feature records and the confidence-max merge.

use flowgraph::Reducer;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::types::{Attribute, FeatureValue};

/// One extracted attribute value with the model's confidence in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedFeature {
    pub value: FeatureValue,
    pub confidence: f64,
}

impl ExtractedFeature {
    /// Build a feature shaped for `attribute`. `"Not available"` always
    /// carries confidence 0 and confidences are clamped into `[0, 1]`.
    pub fn new(attribute: Attribute, value: FeatureValue, confidence: f64) -> Self {
        let value = value.conform_to(attribute);
        let confidence = if value.is_not_available() || confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self { value, confidence }
    }

    pub fn not_available() -> Self {
        Self {
            value: FeatureValue::not_available(),
            confidence: 0.0,
        }
    }

    pub fn is_not_available(&self) -> bool {
        self.value.is_not_available()
    }

    /// Parse `{"value": .., "confidence": ..}` or a bare value. A bare value
    /// gets `default_confidence`.
    pub fn from_json(attribute: Attribute, raw: &Value, default_confidence: f64) -> Self {
        let (value, confidence) = match raw {
            Value::Object(fields) if fields.contains_key("value") => {
                let confidence = fields
                    .get("confidence")
                    .and_then(confidence_of)
                    .unwrap_or(default_confidence);
                (fields.get("value").unwrap_or(&Value::Null), confidence)
            }
            other => (other, default_confidence),
        };
        Self::new(attribute, value_of(value), confidence)
    }

    /// Key ordering used by the merge: confidence first, then a real value
    /// over `"Not available"`.
    fn outranks(&self, other: &Self) -> bool {
        match self.confidence.total_cmp(&other.confidence) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => other.is_not_available() && !self.is_not_available(),
        }
    }
}

fn confidence_of(raw: &Value) -> Option<f64> {
    match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => match s.trim().strip_suffix('%') {
            Some(percent) => percent.trim().parse::<f64>().ok().map(|p| p / 100.0),
            None => s.trim().parse().ok(),
        },
        _ => None,
    }
}

fn scalar_text(raw: &Value) -> Option<String> {
    match raw {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn value_of(raw: &Value) -> FeatureValue {
    match raw {
        Value::Array(items) => FeatureValue::List(
            items
                .iter()
                .filter_map(scalar_text)
                .filter(|s| !s.is_empty())
                .collect(),
        ),
        other => scalar_text(other)
            .map(FeatureValue::Scalar)
            .unwrap_or_else(FeatureValue::not_available),
    }
}

// =============================================================================
// FeatureMap
// =============================================================================

/// Attribute to feature, merged by confidence-max.
///
/// On merge the incoming feature replaces the stored one only when it has a
/// strictly higher confidence, or when it is a real value replacing
/// `"Not available"`. Equal confidence keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FeatureMap(IndexMap<Attribute, ExtractedFeature>);

impl FeatureMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a model reply object. Unknown attribute names are dropped.
    pub fn from_reply(reply: &Value, default_confidence: f64) -> Self {
        let Some(fields) = reply.as_object() else {
            return Self::default();
        };
        let mut map = IndexMap::new();
        for (key, raw) in fields {
            match key.parse::<Attribute>() {
                Ok(attribute) => {
                    map.insert(
                        attribute,
                        ExtractedFeature::from_json(attribute, raw, default_confidence),
                    );
                }
                Err(_) => debug!(key = %key, "ignoring unknown attribute in extraction reply"),
            }
        }
        Self(map)
    }

    /// Keep only `attributes`.
    pub fn restricted_to(mut self, attributes: &[Attribute]) -> Self {
        self.0.retain(|a, _| attributes.contains(a));
        self
    }

    pub fn get(&self, attribute: Attribute) -> Option<&ExtractedFeature> {
        self.0.get(&attribute)
    }

    pub fn insert(&mut self, attribute: Attribute, feature: ExtractedFeature) {
        self.reduce(Self(IndexMap::from([(attribute, feature)])));
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Attribute, &ExtractedFeature)> {
        self.0.iter().map(|(a, f)| (*a, f))
    }

    /// Text of an attribute, `None` when absent or `"Not available"`.
    pub fn text(&self, attribute: Attribute) -> Option<String> {
        self.get(attribute)
            .filter(|f| !f.is_not_available())
            .map(|f| f.value.as_text())
    }

    /// Schema attributes that are absent or `"Not available"`.
    pub fn missing(&self) -> Vec<Attribute> {
        Attribute::ALL
            .into_iter()
            .filter(|a| self.get(*a).is_none_or(ExtractedFeature::is_not_available))
            .collect()
    }

    /// Present attributes below `threshold`, `"Not available"` included.
    pub fn low_confidence(&self, threshold: f64) -> Vec<Attribute> {
        Attribute::ALL
            .into_iter()
            .filter(|a| self.get(*a).is_some_and(|f| f.confidence < threshold))
            .collect()
    }

    /// Values at or above `threshold`, keyed by attribute name.
    pub fn confident(&self, threshold: f64) -> IndexMap<String, FeatureValue> {
        self.0
            .iter()
            .filter(|(_, f)| f.confidence >= threshold && !f.is_not_available())
            .map(|(a, f)| (a.as_str().to_string(), f.value.clone()))
            .collect()
    }

    /// JSON view shown to the model as the current record.
    pub fn to_prompt_json(&self) -> Value {
        let record: Map<String, Value> = self
            .0
            .iter()
            .map(|(a, f)| {
                let value = serde_json::to_value(&f.value).unwrap_or(Value::Null);
                let entry = serde_json::json!({ "value": value, "confidence": f.confidence });
                (a.as_str().to_string(), entry)
            })
            .collect();
        Value::Object(record)
    }
}

impl Reducer for FeatureMap {
    fn reduce(&mut self, delta: Self) {
        for (attribute, incoming) in delta.0 {
            match self.0.get_mut(&attribute) {
                Some(current) if !incoming.outranks(current) => {}
                Some(current) => *current = incoming,
                None => {
                    self.0.insert(attribute, incoming);
                }
            }
        }
    }

    fn is_identity(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(Attribute, ExtractedFeature)> for FeatureMap {
    fn from_iter<I: IntoIterator<Item = (Attribute, ExtractedFeature)>>(iter: I) -> Self {
        let mut map = Self::default();
        for (attribute, feature) in iter {
            map.insert(attribute, feature);
        }
        map
    }
}
