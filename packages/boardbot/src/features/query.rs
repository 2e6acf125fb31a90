//! Web query construction for the extraction loop.

use super::merge::FeatureMap;
use crate::types::Attribute;

pub const MAX_QUERY_CHARS: usize = 400;

/// `"{name} by {manufacturer}[, form factor {ff}]; find product specs: {attrs}"`,
/// cut to [`MAX_QUERY_CHARS`] with a `...` suffix.
pub fn construct_search_query(features: &FeatureMap, targets: &[Attribute]) -> String {
    let name = features.text(Attribute::Name).unwrap_or_default();
    let manufacturer = features.text(Attribute::Manufacturer).unwrap_or_default();

    let mut query = format!("{name} by {manufacturer}");
    if let Some(form_factor) = features.text(Attribute::FormFactor) {
        query.push_str(", form factor ");
        query.push_str(&form_factor);
    }

    let names: Vec<String> = targets.iter().map(|a| a.as_str().replace('_', " ")).collect();
    query.push_str("; find product specs: ");
    query.push_str(&names.join(", "));

    truncate(query.trim(), MAX_QUERY_CHARS)
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars - 3).collect();
    cut.push_str("...");
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::ExtractedFeature;

    fn record(pairs: &[(Attribute, &str)]) -> FeatureMap {
        pairs
            .iter()
            .map(|(a, v)| (*a, ExtractedFeature::new(*a, (*v).into(), 0.9)))
            .collect()
    }

    #[test]
    fn test_query_includes_form_factor() {
        let features = record(&[
            (Attribute::Name, "CONGA-TC570"),
            (Attribute::Manufacturer, "CONGATEC"),
            (Attribute::FormFactor, "COM EXPRESS"),
        ]);
        let query = construct_search_query(&features, &[Attribute::Certifications, Attribute::OperatingTemperatureMax]);
        assert_eq!(
            query,
            "CONGA-TC570 by CONGATEC, form factor COM EXPRESS; find product specs: certifications, operating temperature max"
        );
    }

    #[test]
    fn test_not_available_form_factor_is_omitted() {
        let features = record(&[
            (Attribute::Name, "BOARD"),
            (Attribute::Manufacturer, "ACME"),
            (Attribute::FormFactor, "Not available"),
        ]);
        let query = construct_search_query(&features, &[Attribute::Memory]);
        assert_eq!(query, "BOARD by ACME; find product specs: memory");
    }

    #[test]
    fn test_long_query_is_truncated() {
        let long_name = "X".repeat(500);
        let features = record(&[(Attribute::Name, &long_name)]);
        let query = construct_search_query(&features, &Attribute::ALL);
        assert_eq!(query.chars().count(), MAX_QUERY_CHARS);
        assert!(query.ends_with("..."));
    }
}
