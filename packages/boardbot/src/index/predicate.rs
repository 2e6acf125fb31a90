//! Index-level filter predicates.

use crate::types::{Attribute, Product};

/// A boolean filter over product attributes.
///
/// Matching is case-insensitive and substring matches start at a token
/// boundary. For list attributes a leaf matches when any element matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Exact value.
    Equal { attribute: Attribute, value: String },
    /// Substring.
    Contains { attribute: Attribute, value: String },
    /// Substring match on any of `values`. An empty list matches nothing.
    ContainsAny {
        attribute: Attribute,
        values: Vec<String>,
    },
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
}

impl Predicate {
    pub fn equal(attribute: Attribute, value: impl Into<String>) -> Self {
        Self::Equal {
            attribute,
            value: value.into(),
        }
    }

    pub fn contains(attribute: Attribute, value: impl Into<String>) -> Self {
        Self::Contains {
            attribute,
            value: value.into(),
        }
    }

    pub fn contains_any<I, V>(attribute: Attribute, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        Self::ContainsAny {
            attribute,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// AND of `parts`, collapsing a single operand.
    pub fn all(mut parts: Vec<Predicate>) -> Self {
        if parts.len() == 1 {
            parts.remove(0)
        } else {
            Self::All(parts)
        }
    }

    /// OR of `parts`, collapsing a single operand.
    pub fn any(mut parts: Vec<Predicate>) -> Self {
        if parts.len() == 1 {
            parts.remove(0)
        } else {
            Self::Any(parts)
        }
    }

    /// Evaluate against a product. Absent attributes never match a leaf.
    pub fn matches(&self, product: &Product) -> bool {
        match self {
            Self::Equal { attribute, value } => {
                leaf_values(product, *attribute).iter().any(|v| v.eq_ignore_ascii_case(value))
            }
            Self::Contains { attribute, value } => leaf_values(product, *attribute)
                .iter()
                .any(|v| contains_token(v, value)),
            Self::ContainsAny { attribute, values } => {
                let candidates = leaf_values(product, *attribute);
                values
                    .iter()
                    .any(|needle| candidates.iter().any(|v| contains_token(v, needle)))
            }
            Self::All(parts) => parts.iter().all(|p| p.matches(product)),
            Self::Any(parts) => parts.iter().any(|p| p.matches(product)),
        }
    }

    /// Render as a GraphQL `where` argument value.
    pub fn to_graphql(&self) -> String {
        match self {
            Self::Equal { attribute, value } => leaf(*attribute, "Equal", value),
            Self::Contains { attribute, value } => leaf(*attribute, "Like", &format!("*{value}*")),
            Self::ContainsAny { attribute, values } => format!(
                "{{path: [{}], operator: ContainsAny, valueText: [{}]}}",
                quote(attribute.as_str()),
                values.iter().map(|v| quote(v)).collect::<Vec<_>>().join(", ")
            ),
            Self::All(parts) => group("And", parts),
            Self::Any(parts) => group("Or", parts),
        }
    }

    /// Attributes referenced anywhere in the tree.
    pub fn attributes(&self) -> Vec<Attribute> {
        let mut out = Vec::new();
        self.collect_attributes(&mut out);
        out
    }

    fn collect_attributes(&self, out: &mut Vec<Attribute>) {
        match self {
            Self::Equal { attribute, .. }
            | Self::Contains { attribute, .. }
            | Self::ContainsAny { attribute, .. } => {
                if !out.contains(attribute) {
                    out.push(*attribute);
                }
            }
            Self::All(parts) | Self::Any(parts) => {
                for part in parts {
                    part.collect_attributes(out);
                }
            }
        }
    }
}

fn leaf_values(product: &Product, attribute: Attribute) -> Vec<String> {
    product.get(attribute).map(|v| v.items()).unwrap_or_default()
}

/// Case-insensitive substring match that must start at a token boundary,
/// so `"4.0GB"` does not match inside `"64.0GB"`.
fn contains_token(haystack: &str, needle: &str) -> bool {
    let haystack = haystack.to_lowercase();
    let needle = needle.to_lowercase();
    if needle.is_empty() {
        return false;
    }
    haystack.match_indices(&needle).any(|(at, _)| {
        haystack[..at]
            .chars()
            .next_back()
            .is_none_or(|c| !(c.is_alphanumeric() || c == '.'))
    })
}

fn leaf(attribute: Attribute, operator: &str, value: &str) -> String {
    format!(
        "{{path: [{}], operator: {operator}, valueText: {}}}",
        quote(attribute.as_str()),
        quote(value)
    )
}

fn group(operator: &str, parts: &[Predicate]) -> String {
    let operands = parts.iter().map(Predicate::to_graphql).collect::<Vec<_>>().join(", ");
    format!("{{operator: {operator}, operands: [{operands}]}}")
}

/// JSON string quoting is valid GraphQL string syntax.
fn quote(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board() -> Product {
        Product::new("p1", "conga-TC570")
            .with(Attribute::FormFactor, "COM EXPRESS")
            .with(Attribute::Memory, "32.0GB DDR4")
            .with(Attribute::Wireless, vec!["WI-FI", "BLUETOOTH"])
    }

    #[test]
    fn test_leaf_matching_is_case_insensitive() {
        let product = board();
        assert!(Predicate::equal(Attribute::FormFactor, "com express").matches(&product));
        assert!(Predicate::contains(Attribute::Wireless, "blue").matches(&product));
        assert!(Predicate::contains_any(Attribute::Memory, ["16.0GB", "32.0GB"]).matches(&product));
        assert!(!Predicate::contains_any(Attribute::Memory, Vec::<String>::new()).matches(&product));
        assert!(!Predicate::equal(Attribute::Manufacturer, "INTEL").matches(&product));
    }

    #[test]
    fn test_substring_respects_token_boundary() {
        let product = Product::new("p2", "Big").with(Attribute::Memory, "64.0GB DDR5");
        assert!(!Predicate::contains_any(Attribute::Memory, ["4.0GB"]).matches(&product));
        assert!(Predicate::contains_any(Attribute::Memory, ["64.0GB"]).matches(&product));
        assert!(Predicate::contains(Attribute::Memory, "ddr5").matches(&product));
    }

    #[test]
    fn test_boolean_combinators() {
        let product = board();
        let both = Predicate::all(vec![
            Predicate::equal(Attribute::FormFactor, "COM EXPRESS"),
            Predicate::contains_any(Attribute::Memory, ["DDR5"]),
        ]);
        assert!(!both.matches(&product));

        let either = Predicate::any(vec![
            Predicate::contains_any(Attribute::Memory, ["DDR5"]),
            Predicate::contains(Attribute::Wireless, "WI-FI"),
        ]);
        assert!(either.matches(&product));
        assert_eq!(either.attributes(), vec![Attribute::Memory, Attribute::Wireless]);
    }

    #[test]
    fn test_graphql_rendering() {
        let predicate = Predicate::all(vec![
            Predicate::equal(Attribute::FormFactor, "COM \"EXPRESS\""),
            Predicate::contains_any(Attribute::Memory, ["16.0GB", "32.0GB"]),
        ]);
        assert_eq!(
            predicate.to_graphql(),
            r#"{operator: And, operands: [{path: ["form_factor"], operator: Equal, valueText: "COM \"EXPRESS\""}, {path: ["memory"], operator: ContainsAny, valueText: ["16.0GB", "32.0GB"]}]}"#
        );
        assert_eq!(
            Predicate::contains(Attribute::Wireless, "LTE").to_graphql(),
            r#"{path: ["wireless"], operator: Like, valueText: "*LTE*"}"#
        );
    }

    #[test]
    fn test_single_operand_collapses() {
        let only = Predicate::equal(Attribute::Name, "X");
        assert_eq!(Predicate::all(vec![only.clone()]), only);
    }
}
