//! Filter clauses to index predicates.
//!
//! The model writes filters in a small string grammar:
//!
//! - `">=X"` / `"<=X"` (also `>` and `<`) for open-ended numeric bounds
//! - `"A-B"` for an inclusive range, negatives allowed (`"-40°C-85°C"`)
//! - a plain number for an exact value
//! - any words after the numeric part (`"16.0GB-64.0GB DDR4"`) are a
//!   qualifier that must also appear in the attribute
//!
//! Numeric comparisons are snapped to the attribute's enumerated value set
//! and rendered back with their unit, so the index only ever sees strings it
//! can match verbatim. String filters are uppercased; list filters become a
//! disjunction of contains checks. All attribute predicates are AND-ed.

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use tracing::warn;

use crate::error::FilterError;
use crate::index::Predicate;
use crate::types::{Attribute, FilterValue, ValueType};

const MEMORY_GB: &[f64] = &[
    0.1, 0.2, 0.5, 1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0, 128.0, 256.0, 512.0, 1024.0,
];
const STORAGE_GB: &[f64] = &[
    1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0, 128.0, 256.0, 512.0, 1024.0, 2048.0,
];
const VOLTAGE_V: &[f64] = &[1.8, 3.3, 5.0, 9.0, 12.0, 15.0, 19.0, 24.0, 36.0, 48.0];
const TEMPERATURE_C: &[f64] = &[
    -55.0, -40.0, -30.0, -25.0, -20.0, -10.0, 0.0, 60.0, 70.0, 85.0, 95.0, 105.0, 125.0,
];
const POWER_W: &[f64] = &[
    1.0, 2.0, 3.0, 5.0, 6.0, 7.5, 10.0, 12.0, 15.0, 20.0, 25.0, 28.0, 35.0, 45.0, 65.0, 95.0,
    125.0,
];
const CORES: &[f64] = &[1.0, 2.0, 4.0, 6.0, 8.0, 12.0, 16.0, 24.0, 32.0, 64.0];

const EPSILON: f64 = 1e-9;

static COMPARISON: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?P<op>>=|<=|>|<)?\s*(?P<lo>-?\d+(?:\.\d+)?)\s*(?P<lo_unit>[A-Za-z°]*)(?:\s*-\s*(?P<hi>-?\d+(?:\.\d+)?)\s*(?P<hi_unit>[A-Za-z°]*))?\s*(?P<rest>.*)$",
    )
    .ok()
});

/// Enumerated values an attribute of this type can take. Empty for
/// non-numeric types.
pub fn value_set(value_type: ValueType) -> &'static [f64] {
    match value_type {
        ValueType::Memory => MEMORY_GB,
        ValueType::Storage => STORAGE_GB,
        ValueType::Voltage => VOLTAGE_V,
        ValueType::Temperature => TEMPERATURE_C,
        ValueType::Power => POWER_W,
        ValueType::Cores => CORES,
        ValueType::String | ValueType::List => &[],
    }
}

/// Render a value the way the catalogue stores it.
pub fn format_value(value_type: ValueType, value: f64) -> String {
    match value_type {
        ValueType::Memory | ValueType::Storage => format!("{value:.1}GB"),
        ValueType::Voltage => format!("{value:.1}V"),
        ValueType::Temperature => format!("{}°C", plain_number(value)),
        ValueType::Power => format!("{}W", plain_number(value)),
        ValueType::Cores | ValueType::String | ValueType::List => plain_number(value),
    }
}

fn plain_number(value: f64) -> String {
    if value.fract().abs() < EPSILON {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

// =============================================================================
// Comparison grammar
// =============================================================================

/// A parsed numeric comparison, already in the type's base unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Comparison {
    AtLeast(f64),
    Above(f64),
    AtMost(f64),
    Below(f64),
    Between(f64, f64),
    Exactly(f64),
}

impl Comparison {
    pub fn admits(&self, value: f64) -> bool {
        match *self {
            Self::AtLeast(x) => value >= x - EPSILON,
            Self::Above(x) => value > x + EPSILON,
            Self::AtMost(x) => value <= x + EPSILON,
            Self::Below(x) => value < x - EPSILON,
            Self::Between(lo, hi) => value >= lo - EPSILON && value <= hi + EPSILON,
            Self::Exactly(x) => (value - x).abs() < EPSILON,
        }
    }
}

/// A numeric filter clause: the comparison plus any trailing qualifier.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericClause {
    pub comparison: Comparison,
    pub qualifier: Option<String>,
}

/// Parse one comparison string for a numeric value type.
///
/// Returns `Ok(None)` when the text carries no number at all (e.g. `"DDR4"`),
/// which callers treat as a plain contains filter.
pub fn parse_comparison(
    value_type: ValueType,
    attribute: &str,
    raw: &str,
) -> Result<Option<NumericClause>, FilterError> {
    let unparseable = || FilterError::UnparseableComparison {
        attribute: attribute.to_string(),
        value: raw.to_string(),
    };

    let Some(pattern) = COMPARISON.as_ref() else {
        return Err(unparseable());
    };
    let Some(caps) = pattern.captures(raw) else {
        let trimmed = raw.trim_start();
        if trimmed.starts_with('>') || trimmed.starts_with('<') {
            return Err(unparseable());
        }
        return Ok(None);
    };

    let number = |name: &str, unit: &str| -> Result<f64, FilterError> {
        let value: f64 = caps
            .name(name)
            .map(|m| m.as_str())
            .unwrap_or_default()
            .parse()
            .map_err(|_| unparseable())?;
        let unit = caps.name(unit).map(|m| m.as_str()).unwrap_or_default();
        Ok(to_base_unit(value_type, value, unit))
    };

    let lo = number("lo", "lo_unit")?;
    let comparison = match (caps.name("op").map(|m| m.as_str()), caps.name("hi")) {
        (Some(_), Some(_)) => return Err(unparseable()),
        (Some(">="), None) => Comparison::AtLeast(lo),
        (Some(">"), None) => Comparison::Above(lo),
        (Some("<="), None) => Comparison::AtMost(lo),
        (Some(_), None) => Comparison::Below(lo),
        (None, Some(_)) => {
            let hi = number("hi", "hi_unit")?;
            Comparison::Between(lo.min(hi), lo.max(hi))
        }
        (None, None) => Comparison::Exactly(lo),
    };

    let qualifier = caps
        .name("rest")
        .map(|m| m.as_str().trim())
        .filter(|rest| !rest.is_empty())
        .map(str::to_uppercase);

    Ok(Some(NumericClause {
        comparison,
        qualifier,
    }))
}

fn to_base_unit(value_type: ValueType, value: f64, unit: &str) -> f64 {
    if !matches!(value_type, ValueType::Memory | ValueType::Storage) {
        return value;
    }
    match unit.to_ascii_uppercase().as_str() {
        "MB" => value / 1024.0,
        "TB" => value * 1024.0,
        _ => value,
    }
}

/// Values from the type's enumerated set admitted by `comparison`, in set order.
pub fn expand(value_type: ValueType, comparison: &Comparison) -> Vec<f64> {
    value_set(value_type)
        .iter()
        .copied()
        .filter(|v| comparison.admits(*v))
        .collect()
}

// =============================================================================
// Predicates
// =============================================================================

/// Predicate for one attribute's filter value.
pub fn attribute_predicate(
    attribute: Attribute,
    value: &FilterValue,
) -> Result<Option<Predicate>, FilterError> {
    let mut alternatives = Vec::new();
    for raw in value.values() {
        if let Some(predicate) = clause_predicate(attribute, raw)? {
            alternatives.push(predicate);
        }
    }
    Ok((!alternatives.is_empty()).then(|| Predicate::any(alternatives)))
}

fn clause_predicate(attribute: Attribute, raw: &str) -> Result<Option<Predicate>, FilterError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }

    let value_type = attribute.value_type();
    match value_type {
        ValueType::String => Ok(Some(Predicate::equal(attribute, raw.to_uppercase()))),
        ValueType::List => Ok(Some(Predicate::contains(attribute, raw.to_uppercase()))),
        _ => {
            let Some(clause) = parse_comparison(value_type, attribute.as_str(), raw)? else {
                return Ok(Some(Predicate::contains(attribute, raw.to_uppercase())));
            };
            Ok(Some(numeric_predicate(attribute, value_type, &clause)))
        }
    }
}

fn numeric_predicate(attribute: Attribute, value_type: ValueType, clause: &NumericClause) -> Predicate {
    let primary = match clause.comparison {
        Comparison::Exactly(x) if value_type == ValueType::Cores => {
            Predicate::equal(attribute, format_value(value_type, x))
        }
        Comparison::Exactly(x) => Predicate::contains(attribute, format_value(value_type, x)),
        comparison => {
            let candidates: Vec<String> = expand(value_type, &comparison)
                .into_iter()
                .map(|v| format_value(value_type, v))
                .collect();
            if candidates.is_empty() {
                warn!(
                    attribute = %attribute,
                    comparison = ?comparison,
                    "filter admits no enumerated value"
                );
            }
            Predicate::contains_any(attribute, candidates)
        }
    };

    match &clause.qualifier {
        Some(qualifier) => Predicate::all(vec![
            primary,
            Predicate::contains_any(attribute, [qualifier.clone()]),
        ]),
        None => primary,
    }
}

/// AND of every attribute's predicate. `None` when there is nothing to filter on.
pub fn build_predicate(
    filters: &IndexMap<String, FilterValue>,
) -> Result<Option<Predicate>, FilterError> {
    let mut clauses = Vec::with_capacity(filters.len());
    for (key, value) in filters {
        let attribute: Attribute = key
            .parse()
            .map_err(|_| FilterError::UnknownAttribute(key.clone()))?;
        if let Some(predicate) = attribute_predicate(attribute, value)? {
            clauses.push(predicate);
        }
    }
    Ok((!clauses.is_empty()).then(|| Predicate::all(clauses)))
}

/// Like [`build_predicate`] but drops clauses that fail to parse.
pub fn build_predicate_lossy(filters: &IndexMap<String, FilterValue>) -> Option<Predicate> {
    let clauses: Vec<Predicate> = filters
        .iter()
        .filter_map(|(key, value)| {
            let outcome = key
                .parse::<Attribute>()
                .map_err(|_| FilterError::UnknownAttribute(key.clone()))
                .and_then(|attribute| attribute_predicate(attribute, value));
            match outcome {
                Ok(predicate) => predicate,
                Err(error) => {
                    warn!(filter = %key, error = %error, "dropping filter");
                    None
                }
            }
        })
        .collect();
    (!clauses.is_empty()).then(|| Predicate::all(clauses))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Product;

    fn filters(pairs: &[(&str, &str)]) -> IndexMap<String, FilterValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), FilterValue::from(*v)))
            .collect()
    }

    #[test]
    fn test_memory_range_with_qualifier() {
        let predicate = attribute_predicate(Attribute::Memory, &"16.0GB-64.0GB DDR4".into())
            .unwrap()
            .unwrap();
        assert_eq!(
            predicate,
            Predicate::all(vec![
                Predicate::contains_any(Attribute::Memory, ["16.0GB", "32.0GB", "64.0GB"]),
                Predicate::contains_any(Attribute::Memory, ["DDR4"]),
            ])
        );
    }

    #[test]
    fn test_bounds_snap_to_set() {
        let at_least = parse_comparison(ValueType::Memory, "memory", ">=256GB")
            .unwrap()
            .unwrap();
        assert_eq!(expand(ValueType::Memory, &at_least.comparison), vec![256.0, 512.0, 1024.0]);

        let at_most = parse_comparison(ValueType::Voltage, "input_voltage", "<=5V")
            .unwrap()
            .unwrap();
        assert_eq!(expand(ValueType::Voltage, &at_most.comparison), vec![1.8, 3.3, 5.0]);
    }

    #[test]
    fn test_negative_temperature_range() {
        let clause = parse_comparison(ValueType::Temperature, "operating_temperature_min", "-40°C-0°C")
            .unwrap()
            .unwrap();
        assert_eq!(clause.comparison, Comparison::Between(-40.0, 0.0));
        let rendered: Vec<String> = expand(ValueType::Temperature, &clause.comparison)
            .into_iter()
            .map(|v| format_value(ValueType::Temperature, v))
            .collect();
        assert_eq!(rendered[0], "-40°C");
        assert_eq!(rendered.last().map(String::as_str), Some("0°C"));
    }

    #[test]
    fn test_units_convert_to_gigabytes() {
        let clause = parse_comparison(ValueType::Storage, "onboard_storage", ">=1TB")
            .unwrap()
            .unwrap();
        assert_eq!(clause.comparison, Comparison::AtLeast(1024.0));
        let clause = parse_comparison(ValueType::Memory, "memory", "512MB")
            .unwrap()
            .unwrap();
        assert_eq!(clause.comparison, Comparison::Exactly(0.5));
    }

    #[test]
    fn test_formatting() {
        assert_eq!(format_value(ValueType::Memory, 16.0), "16.0GB");
        assert_eq!(format_value(ValueType::Voltage, 3.3), "3.3V");
        assert_eq!(format_value(ValueType::Power, 7.5), "7.5W");
        assert_eq!(format_value(ValueType::Power, 15.0), "15W");
        assert_eq!(format_value(ValueType::Cores, 8.0), "8");
    }

    #[test]
    fn test_empty_expansion_matches_nothing() {
        let predicate = attribute_predicate(Attribute::Memory, &">=4096GB".into())
            .unwrap()
            .unwrap();
        assert_eq!(predicate, Predicate::contains_any(Attribute::Memory, Vec::<String>::new()));
        let product = Product::new("p", "Huge").with(Attribute::Memory, "1024.0GB");
        assert!(!predicate.matches(&product));
    }

    #[test]
    fn test_bad_operator_is_an_error() {
        let error = parse_comparison(ValueType::Power, "processor_tdp", ">=lots").unwrap_err();
        assert!(matches!(error, FilterError::UnparseableComparison { .. }));
        assert_eq!(parse_comparison(ValueType::Memory, "memory", "DDR4").unwrap(), None);
    }

    #[test]
    fn test_string_and_list_filters() {
        let built = build_predicate(&filters(&[
            ("form_factor", "com express"),
            ("wireless", "wifi"),
        ]))
        .unwrap()
        .unwrap();
        assert_eq!(
            built,
            Predicate::all(vec![
                Predicate::equal(Attribute::FormFactor, "COM EXPRESS"),
                Predicate::contains(Attribute::Wireless, "WIFI"),
            ])
        );

        let many = attribute_predicate(
            Attribute::Wireless,
            &FilterValue::Many(vec!["wifi".into(), "bluetooth".into()]),
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            many,
            Predicate::any(vec![
                Predicate::contains(Attribute::Wireless, "WIFI"),
                Predicate::contains(Attribute::Wireless, "BLUETOOTH"),
            ])
        );
    }

    #[test]
    fn test_unknown_attribute() {
        let error = build_predicate(&filters(&[("colour", "RED")])).unwrap_err();
        assert_eq!(error, FilterError::UnknownAttribute("colour".into()));
        assert_eq!(build_predicate_lossy(&filters(&[("colour", "RED")])), None);
    }

    #[test]
    fn test_filtered_products() {
        let predicate = build_predicate(&filters(&[
            ("form_factor", "COM EXPRESS"),
            ("processor_manufacturer", "INTEL"),
            ("memory", "16.0GB-64.0GB DDR4"),
        ]))
        .unwrap()
        .unwrap();

        let matching = Product::new("m1", "Module")
            .with(Attribute::FormFactor, "COM Express")
            .with(Attribute::ProcessorManufacturer, "Intel")
            .with(Attribute::Memory, "32.0GB DDR4");
        let wrong_memory = matching.clone().with(Attribute::Memory, "8.0GB DDR4");
        let wrong_generation = matching.clone().with(Attribute::Memory, "32.0GB DDR5");

        assert!(predicate.matches(&matching));
        assert!(!predicate.matches(&wrong_memory));
        assert!(!predicate.matches(&wrong_generation));
    }
}
