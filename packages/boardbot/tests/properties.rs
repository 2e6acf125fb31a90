//! Property tests for numeric filter expansion and the feature record merge.

use std::collections::HashSet;

use boardbot::filters::{attribute_predicate, expand, format_value, parse_comparison, value_set};
use boardbot::{Attribute, ExtractedFeature, FeatureMap, FeatureValue, FilterValue, Product, ValueType};
use flowgraph::Reducer;
use proptest::prelude::*;
use serde_json::{json, Map, Value};

const NUMERIC: [(ValueType, &str); 6] = [
    (ValueType::Memory, "GB"),
    (ValueType::Storage, "GB"),
    (ValueType::Voltage, "V"),
    (ValueType::Temperature, "°C"),
    (ValueType::Power, "W"),
    (ValueType::Cores, ""),
];

/// A comparison string with an operator or a range, never a bare number.
fn comparison_in(unit: &'static str) -> impl Strategy<Value = String> {
    let bound = -60.0f64..2100.0;
    (
        prop_oneof![Just(">="), Just(">"), Just("<="), Just("<"), Just("range")],
        bound.clone(),
        bound,
    )
        .prop_map(move |(op, lo, hi)| match op {
            "range" => format!("{lo:.1}{unit}-{hi:.1}{unit}"),
            op => format!("{op}{lo:.1}{unit}"),
        })
}

fn comparison_text() -> impl Strategy<Value = (usize, String)> {
    (0..NUMERIC.len())
        .prop_flat_map(|index| comparison_in(NUMERIC[index].1).prop_map(move |text| (index, text)))
}

fn confidence() -> impl Strategy<Value = f64> {
    prop_oneof![0.0f64..=1.0, Just(0.0), Just(1.0)]
}

fn feature() -> impl Strategy<Value = (Attribute, ExtractedFeature)> {
    (
        0..Attribute::ALL.len(),
        prop_oneof!["[A-Z0-9 ]{1,8}", Just("Not available".to_string())],
        confidence(),
    )
        .prop_map(|(index, value, confidence)| {
            let attribute = Attribute::ALL[index];
            (attribute, ExtractedFeature::new(attribute, value.into(), confidence))
        })
}

fn feature_map() -> impl Strategy<Value = FeatureMap> {
    prop::collection::vec(feature(), 0..8).prop_map(|features| features.into_iter().collect())
}

fn merged(a: &FeatureMap, b: &FeatureMap) -> FeatureMap {
    let mut out = a.clone();
    out.reduce(b.clone());
    out
}

proptest! {
    #[test]
    fn expansion_snaps_to_the_value_set((index, text) in comparison_text()) {
        let value_type = NUMERIC[index].0;
        let clause = parse_comparison(value_type, "attribute", &text)
            .unwrap()
            .expect("comparison strings carry a number");
        let expanded = expand(value_type, &clause.comparison);

        for value in &expanded {
            prop_assert!(value_set(value_type).contains(value));
        }
        for value in value_set(value_type) {
            prop_assert_eq!(clause.comparison.admits(*value), expanded.contains(value));
        }
    }

    #[test]
    fn memory_predicate_matches_admitted_values(text in comparison_in("GB")) {
        let clause = parse_comparison(ValueType::Memory, "memory", &text).unwrap().unwrap();
        let predicate = attribute_predicate(Attribute::Memory, &FilterValue::Single(text.clone()))
            .unwrap()
            .unwrap();

        for value in value_set(ValueType::Memory) {
            let product = Product::new("p", "Board")
                .with(Attribute::Memory, format_value(ValueType::Memory, *value));
            prop_assert_eq!(predicate.matches(&product), clause.comparison.admits(*value));
        }
    }

    #[test]
    fn merge_keeps_highest_confidence(a in feature_map(), b in feature_map()) {
        let out = merged(&a, &b);
        for (attribute, feature) in out.iter() {
            let best = [a.get(attribute), b.get(attribute)]
                .into_iter()
                .flatten()
                .map(|f| f.confidence)
                .fold(0.0f64, f64::max);
            prop_assert_eq!(feature.confidence, best);
        }
        let attributes: HashSet<Attribute> = a.iter().chain(b.iter()).map(|(k, _)| k).collect();
        prop_assert_eq!(out.len(), attributes.len());
    }

    #[test]
    fn merge_confidences_ignore_order(a in feature_map(), b in feature_map(), c in feature_map()) {
        let left = merged(&merged(&a, &b), &c);
        let right = merged(&c, &merged(&b, &a));
        for (attribute, feature) in left.iter() {
            let other = right.get(attribute).expect("same attributes either way");
            prop_assert_eq!(feature.confidence, other.confidence);
        }
        prop_assert_eq!(left.len(), right.len());
    }

    #[test]
    fn not_available_always_has_zero_confidence(a in feature_map(), b in feature_map()) {
        let out = merged(&a, &b);
        for (_, feature) in out.iter() {
            if feature.is_not_available() {
                prop_assert_eq!(feature.confidence, 0.0);
            }
        }
    }

    #[test]
    fn scalar_attributes_never_hold_lists(
        values in prop::collection::vec(prop::collection::vec("[A-Z0-9]{1,6}", 0..4), Attribute::ALL.len()),
        wrap in any::<bool>(),
    ) {
        let reply: Map<String, Value> = Attribute::ALL
            .iter()
            .zip(values)
            .map(|(attribute, items)| {
                let value = json!(items);
                let value = if wrap { json!({"value": value, "confidence": 0.9}) } else { value };
                (attribute.as_str().to_string(), value)
            })
            .collect();
        let map = FeatureMap::from_reply(&Value::Object(reply), 0.5);

        for attribute in Attribute::ALL.iter().filter(|a| a.is_scalar()) {
            if let Some(feature) = map.get(*attribute) {
                prop_assert!(
                    matches!(feature.value, FeatureValue::Scalar(_)),
                    "{} held {:?}", attribute.as_str(), feature.value
                );
            }
        }
    }
}
