//! Per-key merge semantics for graph state.
//!
//! Each state field is wrapped in a reducer type. A node returns a delta of the
//! whole state, usually built from `Default` with only the fields it touched
//! set, and the executor folds it in with [`Reducer::reduce`] field by field.
//!
//! Every reducer here is associative and its `Default` value is an identity,
//! so merging an untouched field is a no-op.

use std::hash::Hash;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Merge function for one state key.
pub trait Reducer {
    /// Fold `delta` into `self`.
    fn reduce(&mut self, delta: Self);

    /// Whether this value leaves any other value unchanged when reduced into it.
    fn is_identity(&self) -> bool;
}

// =============================================================================
// Overwrite
// =============================================================================

/// Last write wins. An unset delta leaves the current value alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Overwrite<T>(Option<T>);

impl<T> Overwrite<T> {
    pub fn new(value: T) -> Self {
        Self(Some(value))
    }

    pub fn unset() -> Self {
        Self(None)
    }

    pub fn get(&self) -> Option<&T> {
        self.0.as_ref()
    }

    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }

    pub fn into_inner(self) -> Option<T> {
        self.0
    }
}

impl<T> Default for Overwrite<T> {
    fn default() -> Self {
        Self(None)
    }
}

impl<T> From<T> for Overwrite<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T> Reducer for Overwrite<T> {
    fn reduce(&mut self, delta: Self) {
        if delta.0.is_some() {
            self.0 = delta.0;
        }
    }

    fn is_identity(&self) -> bool {
        self.0.is_none()
    }
}

// =============================================================================
// Append
// =============================================================================

/// List concatenation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Append<T>(Vec<T>);

impl<T> Append<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self(items)
    }

    pub fn one(item: T) -> Self {
        Self(vec![item])
    }

    pub fn as_slice(&self) -> &[T] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<T> {
        self.0
    }
}

impl<T> Default for Append<T> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<T> FromIterator<T> for Append<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<T> Reducer for Append<T> {
    fn reduce(&mut self, delta: Self) {
        self.0.extend(delta.0);
    }

    fn is_identity(&self) -> bool {
        self.0.is_empty()
    }
}

// =============================================================================
// DictMerge
// =============================================================================

/// Right-biased key union. Keys keep their first-seen position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DictMerge<K: Hash + Eq, V>(IndexMap<K, V>);

impl<K: Hash + Eq, V> DictMerge<K, V> {
    pub fn new(map: IndexMap<K, V>) -> Self {
        Self(map)
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.0.get(key)
    }

    pub fn map(&self) -> &IndexMap<K, V> {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> IndexMap<K, V> {
        self.0
    }
}

impl<K: Hash + Eq, V> Default for DictMerge<K, V> {
    fn default() -> Self {
        Self(IndexMap::new())
    }
}

impl<K: Hash + Eq, V> FromIterator<(K, V)> for DictMerge<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<K: Hash + Eq, V> Reducer for DictMerge<K, V> {
    fn reduce(&mut self, delta: Self) {
        for (key, value) in delta.0 {
            self.0.insert(key, value);
        }
    }

    fn is_identity(&self) -> bool {
        self.0.is_empty()
    }
}

// =============================================================================
// Counter
// =============================================================================

/// Monotonic counter. Merging keeps the larger value, so a node advances it by
/// returning `current + 1` and a stale delta can never move it backwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Counter(u32);

impl Counter {
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn get(&self) -> u32 {
        self.0
    }

    /// Delta that advances this counter by one.
    pub fn incremented(&self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl Reducer for Counter {
    fn reduce(&mut self, delta: Self) {
        self.0 = self.0.max(delta.0);
    }

    fn is_identity(&self) -> bool {
        self.0 == 0
    }
}

// =============================================================================
// Telemetry
// =============================================================================

/// One stage invocation's usage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageRow {
    pub input_tokens: u32,
    pub output_tokens: u32,
    /// Elapsed wall-clock seconds.
    pub time_taken: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UsageRow {
    pub fn new(input_tokens: u32, output_tokens: u32, time_taken: f64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            time_taken,
            error: None,
        }
    }

    /// Zero-token row recording a failed stage.
    pub fn failed(error: impl Into<String>, time_taken: f64) -> Self {
        Self {
            input_tokens: 0,
            output_tokens: 0,
            time_taken,
            error: Some(error.into()),
        }
    }
}

/// Stage name to usage rows, merged by key-wise concatenation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Telemetry(IndexMap<String, Vec<UsageRow>>);

impl Telemetry {
    /// Delta holding a single row for `stage`.
    pub fn row(stage: impl Into<String>, row: UsageRow) -> Self {
        let mut map = IndexMap::new();
        map.insert(stage.into(), vec![row]);
        Self(map)
    }

    pub fn rows(&self, stage: &str) -> &[UsageRow] {
        self.0.get(stage).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn stages(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[UsageRow])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Sum of input tokens per stage.
    pub fn input_tokens(&self) -> IndexMap<String, u32> {
        self.sum_by(|r| r.input_tokens)
    }

    /// Sum of output tokens per stage.
    pub fn output_tokens(&self) -> IndexMap<String, u32> {
        self.sum_by(|r| r.output_tokens)
    }

    /// Sum of elapsed seconds per stage.
    pub fn time_taken(&self) -> IndexMap<String, f64> {
        self.0
            .iter()
            .map(|(stage, rows)| (stage.clone(), rows.iter().map(|r| r.time_taken).sum()))
            .collect()
    }

    pub fn total_input_tokens(&self) -> u32 {
        self.0.values().flatten().map(|r| r.input_tokens).sum()
    }

    pub fn total_output_tokens(&self) -> u32 {
        self.0.values().flatten().map(|r| r.output_tokens).sum()
    }

    pub fn into_inner(self) -> IndexMap<String, Vec<UsageRow>> {
        self.0
    }

    fn sum_by(&self, field: impl Fn(&UsageRow) -> u32) -> IndexMap<String, u32> {
        self.0
            .iter()
            .map(|(stage, rows)| (stage.clone(), rows.iter().map(&field).sum()))
            .collect()
    }
}

impl Reducer for Telemetry {
    fn reduce(&mut self, delta: Self) {
        for (stage, rows) in delta.0 {
            self.0.entry(stage).or_default().extend(rows);
        }
    }

    fn is_identity(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overwrite_ignores_unset_delta() {
        let mut value = Overwrite::new("gpt-4");
        value.reduce(Overwrite::unset());
        assert_eq!(value.get(), Some(&"gpt-4"));

        value.reduce(Overwrite::new("gpt-4o"));
        assert_eq!(value.get(), Some(&"gpt-4o"));
    }

    #[test]
    fn test_append_preserves_order() {
        let mut list = Append::new(vec!["memory"]);
        list.reduce(Append::new(vec!["wireless", "certifications"]));
        assert_eq!(list.as_slice(), &["memory", "wireless", "certifications"]);
    }

    #[test]
    fn test_dict_merge_is_right_biased() {
        let mut dict: DictMerge<&str, u32> = [("a", 1), ("b", 2)].into_iter().collect();
        dict.reduce([("b", 20), ("c", 3)].into_iter().collect());

        let keys: Vec<_> = dict.map().keys().copied().collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert_eq!(dict.get(&"b"), Some(&20));
    }

    #[test]
    fn test_counter_never_moves_backwards() {
        let mut counter = Counter::new(2);
        counter.reduce(Counter::new(1));
        assert_eq!(counter.get(), 2);

        let next = counter.incremented();
        counter.reduce(next);
        assert_eq!(counter.get(), 3);
    }

    #[test]
    fn test_telemetry_concatenates_per_stage() {
        let mut telemetry = Telemetry::row("classify", UsageRow::new(100, 20, 0.5));
        telemetry.reduce(Telemetry::row("retrieve", UsageRow::new(0, 0, 0.1)));
        telemetry.reduce(Telemetry::row("classify", UsageRow::failed("timeout", 30.0)));

        assert_eq!(telemetry.rows("classify").len(), 2);
        assert_eq!(telemetry.input_tokens()["classify"], 100);
        assert_eq!(telemetry.total_output_tokens(), 20);
        assert_eq!(telemetry.stages().collect::<Vec<_>>(), vec!["classify", "retrieve"]);
    }

    #[test]
    fn test_usage_row_serialization_omits_absent_error() {
        let json = serde_json::to_value(UsageRow::new(1, 2, 0.25)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"input_tokens": 1, "output_tokens": 2, "time_taken": 0.25})
        );

        let json = serde_json::to_value(UsageRow::failed("boom", 0.0)).unwrap();
        assert_eq!(json["error"], "boom");
    }
}
