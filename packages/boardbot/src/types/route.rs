//! Intent categories and classification results.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ValidationError;

/// The five intent categories a message can be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Politics,
    Chitchat,
    VagueIntentProduct,
    ClearIntentProduct,
    DoNotRespond,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Politics,
        Category::Chitchat,
        Category::VagueIntentProduct,
        Category::ClearIntentProduct,
        Category::DoNotRespond,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Politics => "politics",
            Self::Chitchat => "chitchat",
            Self::VagueIntentProduct => "vague_intent_product",
            Self::ClearIntentProduct => "clear_intent_product",
            Self::DoNotRespond => "do_not_respond",
        }
    }

    /// Tie-break rank for equal similarity; lower wins.
    pub fn specificity_rank(&self) -> u8 {
        match self {
            Self::ClearIntentProduct => 0,
            Self::VagueIntentProduct => 1,
            Self::Chitchat => 2,
            Self::Politics => 3,
            Self::DoNotRespond => 4,
        }
    }

    /// Categories answered with a fixed refusal.
    pub fn is_refusal(&self) -> bool {
        matches!(self, Self::Politics | Self::DoNotRespond)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ValidationError;

    /// Accepts the wire names plus the short forms models tend to produce
    /// (`"clear_intent"`, `"Vague Intent"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        let category = match key.as_str() {
            "politics" | "political" => Self::Politics,
            "chitchat" | "chit_chat" | "small_talk" => Self::Chitchat,
            "vague_intent_product" | "vague_intent" | "vague" => Self::VagueIntentProduct,
            "clear_intent_product" | "clear_intent" | "clear" => Self::ClearIntentProduct,
            "do_not_respond" | "donotrespond" | "refuse" => Self::DoNotRespond,
            _ => return Err(ValidationError::UnknownCategory(s.to_string())),
        };
        Ok(category)
    }
}

/// Output of every route classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub category: Category,
    /// 0 to 100.
    #[serde(deserialize_with = "clamped_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub justification: String,
}

impl Classification {
    pub fn new(category: Category, confidence: f64, justification: impl Into<String>) -> Self {
        Self {
            category,
            confidence: clamp_confidence(confidence),
            justification: justification.into(),
        }
    }

    /// Parse a model reply leniently. Returns `None` when the category is
    /// missing or unknown.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        let category = value.get("category")?.as_str()?.parse().ok()?;
        let confidence = match value.get("confidence") {
            Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(serde_json::Value::String(s)) => s.trim().trim_end_matches('%').parse().unwrap_or(0.0),
            _ => 0.0,
        };
        let justification = value
            .get("justification")
            .and_then(|j| j.as_str())
            .unwrap_or_default();
        Some(Self::new(category, confidence, justification))
    }
}

fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

fn clamped_confidence<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    f64::deserialize(deserializer).map(clamp_confidence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_category_parses_short_forms() {
        assert_eq!("clear_intent".parse::<Category>().unwrap(), Category::ClearIntentProduct);
        assert_eq!("Vague Intent Product".parse::<Category>().unwrap(), Category::VagueIntentProduct);
        assert_eq!("politics".parse::<Category>().unwrap(), Category::Politics);
        assert!("weather".parse::<Category>().is_err());
    }

    #[test]
    fn test_classification_from_json_clamps() {
        let parsed = Classification::from_json(&json!({
            "category": "chitchat",
            "confidence": 140,
            "justification": "greeting"
        }))
        .unwrap();
        assert_eq!(parsed.category, Category::Chitchat);
        assert_eq!(parsed.confidence, 100.0);

        let parsed = Classification::from_json(&json!({"category": "politics", "confidence": "85%"})).unwrap();
        assert_eq!(parsed.confidence, 85.0);
        assert!(Classification::from_json(&json!({"confidence": 90})).is_none());
    }

    #[test]
    fn test_specificity_order() {
        let mut categories = Category::ALL;
        categories.sort_by_key(Category::specificity_rank);
        assert_eq!(categories[0], Category::ClearIntentProduct);
        assert_eq!(categories[4], Category::DoNotRespond);
    }
}
