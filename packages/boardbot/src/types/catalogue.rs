//! The fixed product attribute schema.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Sentinel for an attribute with no known value.
pub const NOT_AVAILABLE: &str = "Not available";

/// True for the `"Not available"` sentinel, ignoring case and padding.
pub fn is_not_available(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value.eq_ignore_ascii_case(NOT_AVAILABLE)
}

/// How filter values for an attribute are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueType {
    Memory,
    Storage,
    Voltage,
    Temperature,
    Power,
    Cores,
    String,
    List,
}

impl ValueType {
    /// Numeric types are expanded against an enumerated value set.
    pub fn is_numeric(&self) -> bool {
        !matches!(self, Self::String | Self::List)
    }
}

/// A product attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    Name,
    Manufacturer,
    FormFactor,
    ProcessorArchitecture,
    ProcessorManufacturer,
    ProcessorCoreCount,
    ProcessorTdp,
    Memory,
    OnboardStorage,
    InputVoltage,
    IoCount,
    Wireless,
    OperatingSystemBsp,
    OperatingTemperatureMin,
    OperatingTemperatureMax,
    Certifications,
    ShortSummary,
    FullSummary,
    FullProductDescription,
}

impl Attribute {
    /// Every attribute in schema order.
    pub const ALL: [Attribute; 19] = [
        Attribute::Name,
        Attribute::Manufacturer,
        Attribute::FormFactor,
        Attribute::ProcessorArchitecture,
        Attribute::ProcessorManufacturer,
        Attribute::ProcessorCoreCount,
        Attribute::ProcessorTdp,
        Attribute::Memory,
        Attribute::OnboardStorage,
        Attribute::InputVoltage,
        Attribute::IoCount,
        Attribute::Wireless,
        Attribute::OperatingSystemBsp,
        Attribute::OperatingTemperatureMin,
        Attribute::OperatingTemperatureMax,
        Attribute::Certifications,
        Attribute::ShortSummary,
        Attribute::FullSummary,
        Attribute::FullProductDescription,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Manufacturer => "manufacturer",
            Self::FormFactor => "form_factor",
            Self::ProcessorArchitecture => "processor_architecture",
            Self::ProcessorManufacturer => "processor_manufacturer",
            Self::ProcessorCoreCount => "processor_core_count",
            Self::ProcessorTdp => "processor_tdp",
            Self::Memory => "memory",
            Self::OnboardStorage => "onboard_storage",
            Self::InputVoltage => "input_voltage",
            Self::IoCount => "io_count",
            Self::Wireless => "wireless",
            Self::OperatingSystemBsp => "operating_system_bsp",
            Self::OperatingTemperatureMin => "operating_temperature_min",
            Self::OperatingTemperatureMax => "operating_temperature_max",
            Self::Certifications => "certifications",
            Self::ShortSummary => "short_summary",
            Self::FullSummary => "full_summary",
            Self::FullProductDescription => "full_product_description",
        }
    }

    /// Description fed to prompts as part of the attribute list.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Name => "Official product name in capital case, without code names or variants",
            Self::Manufacturer => "Company that builds the product, in capital case (e.g. 'ADVANTECH', 'KONTRON')",
            Self::FormFactor => "Physical standard or size of the board (e.g. 'COM EXPRESS', 'SINGLE BOARD COMPUTER', '3U VPX', 'PC/104')",
            Self::ProcessorArchitecture => "Instruction set of the processor (e.g. 'X86-64', 'ARM CORTEX-A53', 'RISC-V')",
            Self::ProcessorManufacturer => "Company that makes the processor (e.g. 'INTEL', 'AMD', 'NXP')",
            Self::ProcessorCoreCount => "Number of physical processor cores (e.g. '4')",
            Self::ProcessorTdp => "Processor thermal design power in watts (e.g. '15W')",
            Self::Memory => "RAM capacity and type (e.g. '16.0GB DDR4'); comparisons like '>=8.0GB' or '16.0GB-64.0GB DDR4' are allowed",
            Self::OnboardStorage => "Built-in storage capacity and type (e.g. '64.0GB EMMC')",
            Self::InputVoltage => "Supply voltage or range (e.g. '12.0V', '9.0V-36.0V')",
            Self::IoCount => "List of I/O interfaces with counts (e.g. ['2X USB 3.0', '1X HDMI'])",
            Self::Wireless => "List of wireless options (e.g. ['WI-FI', 'BLUETOOTH', 'LTE'])",
            Self::OperatingSystemBsp => "List of supported operating systems or BSPs (e.g. ['LINUX', 'WINDOWS 10 IOT'])",
            Self::OperatingTemperatureMin => "Lowest operating temperature in °C (e.g. '-40°C')",
            Self::OperatingTemperatureMax => "Highest operating temperature in °C (e.g. '85°C')",
            Self::Certifications => "List of certifications and compliance marks (e.g. ['CE', 'FCC CLASS B'])",
            Self::ShortSummary => "One or two sentence summary of the product",
            Self::FullSummary => "Three to five sentence overview of features and target uses",
            Self::FullProductDescription => "Complete product description including specifications and use cases",
        }
    }

    /// Scalar attributes always hold a single string.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Self::Name
                | Self::Manufacturer
                | Self::FormFactor
                | Self::ProcessorArchitecture
                | Self::ProcessorManufacturer
                | Self::InputVoltage
                | Self::OperatingTemperatureMin
                | Self::OperatingTemperatureMax
        )
    }

    /// List attributes are stored as arrays in the index.
    pub fn is_list(&self) -> bool {
        matches!(
            self,
            Self::IoCount | Self::Wireless | Self::OperatingSystemBsp | Self::Certifications
        )
    }

    /// Free-text summaries are never used as filters.
    pub fn is_filterable(&self) -> bool {
        !matches!(
            self,
            Self::ShortSummary | Self::FullSummary | Self::FullProductDescription
        )
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Memory => ValueType::Memory,
            Self::OnboardStorage => ValueType::Storage,
            Self::InputVoltage => ValueType::Voltage,
            Self::OperatingTemperatureMin | Self::OperatingTemperatureMax => ValueType::Temperature,
            Self::ProcessorTdp => ValueType::Power,
            Self::ProcessorCoreCount => ValueType::Cores,
            a if a.is_list() => ValueType::List,
            _ => ValueType::String,
        }
    }

    /// `name: description` lines for the given attributes.
    pub fn describe(attributes: &[Attribute]) -> String {
        attributes
            .iter()
            .map(|a| format!("- {}: {}", a.as_str(), a.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Attribute list for filter extraction prompts.
    pub fn filter_descriptions() -> String {
        let filterable: Vec<_> = Self::ALL.into_iter().filter(|a| a.is_filterable()).collect();
        Self::describe(&filterable)
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Attribute {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace([' ', '-', '.'], "_");
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == key)
            .ok_or_else(|| ValidationError::UnknownAttribute(s.to_string()))
    }
}

// =============================================================================
// Values
// =============================================================================

/// An attribute value: a single string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Scalar(String),
    List(Vec<String>),
}

impl FeatureValue {
    pub fn not_available() -> Self {
        Self::Scalar(NOT_AVAILABLE.to_string())
    }

    pub fn is_not_available(&self) -> bool {
        match self {
            Self::Scalar(s) => is_not_available(s),
            Self::List(items) => items.iter().all(|i| is_not_available(i)),
        }
    }

    /// Flatten to display text, joining list items with `", "`.
    pub fn as_text(&self) -> String {
        match self {
            Self::Scalar(s) => s.clone(),
            Self::List(items) => items.join(", "),
        }
    }

    /// Coerce into the shape an attribute requires.
    pub fn conform_to(self, attribute: Attribute) -> Self {
        if self.is_not_available() {
            return Self::not_available();
        }
        match self {
            Self::List(items) if attribute.is_scalar() => Self::Scalar(items.join(", ")),
            other => other,
        }
    }

    pub fn items(&self) -> Vec<String> {
        match self {
            Self::Scalar(s) if is_not_available(s) => Vec::new(),
            Self::Scalar(s) => vec![s.clone()],
            Self::List(items) => items.iter().filter(|i| !is_not_available(i)).cloned().collect(),
        }
    }
}

impl From<&str> for FeatureValue {
    fn from(value: &str) -> Self {
        Self::Scalar(value.to_string())
    }
}

impl From<String> for FeatureValue {
    fn from(value: String) -> Self {
        Self::Scalar(value)
    }
}

impl From<Vec<&str>> for FeatureValue {
    fn from(items: Vec<&str>) -> Self {
        Self::List(items.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<String>> for FeatureValue {
    fn from(items: Vec<String>) -> Self {
        Self::List(items)
    }
}

// =============================================================================
// Product
// =============================================================================

/// A catalogue record as stored in the index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub product_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_factor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processor_architecture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processor_manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processor_core_count: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processor_tdp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onboard_storage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_voltage: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub io_count: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wireless: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operating_system_bsp: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operating_temperature_min: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operating_temperature_max: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub certifications: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_product_description: Option<String>,
}

impl Product {
    pub fn new(product_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            product_id: product_id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Builder-style setter used by loaders and tests.
    pub fn with(mut self, attribute: Attribute, value: impl Into<FeatureValue>) -> Self {
        self.set(attribute, value.into());
        self
    }

    /// Set an attribute. `"Not available"` clears it.
    pub fn set(&mut self, attribute: Attribute, value: FeatureValue) {
        if attribute.is_list() {
            if let Some(list) = self.list_mut(attribute) {
                *list = value.items();
            }
            return;
        }
        let text = (!value.is_not_available()).then(|| value.as_text());
        match attribute {
            Attribute::Name => self.name = text.unwrap_or_default(),
            other => {
                if let Some(slot) = self.scalar_mut(other) {
                    *slot = text;
                }
            }
        }
    }

    /// Current value, `None` when absent or `"Not available"`.
    pub fn get(&self, attribute: Attribute) -> Option<FeatureValue> {
        if attribute.is_list() {
            let list = self.list(attribute)?;
            return (!list.is_empty()).then(|| FeatureValue::List(list.clone()));
        }
        let text = match attribute {
            Attribute::Name => Some(&self.name),
            other => self.scalar(other)?.as_ref(),
        }?;
        (!is_not_available(text)).then(|| FeatureValue::Scalar(text.clone()))
    }

    /// Present attributes as an ordered map, for prompts and logs.
    pub fn attributes(&self) -> IndexMap<&'static str, FeatureValue> {
        Attribute::ALL
            .into_iter()
            .filter_map(|a| self.get(a).map(|v| (a.as_str(), v)))
            .collect()
    }

    /// Compact JSON view used when listing candidates to the model.
    pub fn prompt_view(&self, include_descriptions: bool) -> serde_json::Value {
        let mut view = serde_json::Map::new();
        view.insert("product_id".into(), self.product_id.clone().into());
        for (key, value) in self.attributes() {
            let long = matches!(key, "full_summary" | "full_product_description");
            if long && !include_descriptions {
                continue;
            }
            let json = match value {
                FeatureValue::Scalar(s) => serde_json::Value::String(s),
                FeatureValue::List(items) => serde_json::Value::from(items),
            };
            view.insert(key.to_string(), json);
        }
        serde_json::Value::Object(view)
    }

    fn scalar(&self, attribute: Attribute) -> Option<&Option<String>> {
        Some(match attribute {
            Attribute::Manufacturer => &self.manufacturer,
            Attribute::FormFactor => &self.form_factor,
            Attribute::ProcessorArchitecture => &self.processor_architecture,
            Attribute::ProcessorManufacturer => &self.processor_manufacturer,
            Attribute::ProcessorCoreCount => &self.processor_core_count,
            Attribute::ProcessorTdp => &self.processor_tdp,
            Attribute::Memory => &self.memory,
            Attribute::OnboardStorage => &self.onboard_storage,
            Attribute::InputVoltage => &self.input_voltage,
            Attribute::OperatingTemperatureMin => &self.operating_temperature_min,
            Attribute::OperatingTemperatureMax => &self.operating_temperature_max,
            Attribute::ShortSummary => &self.short_summary,
            Attribute::FullSummary => &self.full_summary,
            Attribute::FullProductDescription => &self.full_product_description,
            _ => return None,
        })
    }

    fn scalar_mut(&mut self, attribute: Attribute) -> Option<&mut Option<String>> {
        Some(match attribute {
            Attribute::Manufacturer => &mut self.manufacturer,
            Attribute::FormFactor => &mut self.form_factor,
            Attribute::ProcessorArchitecture => &mut self.processor_architecture,
            Attribute::ProcessorManufacturer => &mut self.processor_manufacturer,
            Attribute::ProcessorCoreCount => &mut self.processor_core_count,
            Attribute::ProcessorTdp => &mut self.processor_tdp,
            Attribute::Memory => &mut self.memory,
            Attribute::OnboardStorage => &mut self.onboard_storage,
            Attribute::InputVoltage => &mut self.input_voltage,
            Attribute::OperatingTemperatureMin => &mut self.operating_temperature_min,
            Attribute::OperatingTemperatureMax => &mut self.operating_temperature_max,
            Attribute::ShortSummary => &mut self.short_summary,
            Attribute::FullSummary => &mut self.full_summary,
            Attribute::FullProductDescription => &mut self.full_product_description,
            _ => return None,
        })
    }

    fn list(&self, attribute: Attribute) -> Option<&Vec<String>> {
        match attribute {
            Attribute::IoCount => Some(&self.io_count),
            Attribute::Wireless => Some(&self.wireless),
            Attribute::OperatingSystemBsp => Some(&self.operating_system_bsp),
            Attribute::Certifications => Some(&self.certifications),
            _ => None,
        }
    }

    fn list_mut(&mut self, attribute: Attribute) -> Option<&mut Vec<String>> {
        match attribute {
            Attribute::IoCount => Some(&mut self.io_count),
            Attribute::Wireless => Some(&mut self.wireless),
            Attribute::OperatingSystemBsp => Some(&mut self.operating_system_bsp),
            Attribute::Certifications => Some(&mut self.certifications),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_round_trips_through_wire_name() {
        for attribute in Attribute::ALL {
            assert_eq!(attribute.as_str().parse::<Attribute>().unwrap(), attribute);
        }
        assert_eq!("Form Factor".parse::<Attribute>().unwrap(), Attribute::FormFactor);
        assert!("gpu_model".parse::<Attribute>().is_err());
    }

    #[test]
    fn test_value_types() {
        assert_eq!(Attribute::Memory.value_type(), ValueType::Memory);
        assert_eq!(Attribute::Wireless.value_type(), ValueType::List);
        assert_eq!(Attribute::FormFactor.value_type(), ValueType::String);
        assert_eq!(Attribute::OperatingTemperatureMax.value_type(), ValueType::Temperature);
    }

    #[test]
    fn test_scalar_and_list_sets_are_disjoint() {
        for attribute in Attribute::ALL {
            assert!(!(attribute.is_scalar() && attribute.is_list()), "{attribute}");
        }
    }

    #[test]
    fn test_conform_joins_lists_for_scalars() {
        let value = FeatureValue::from(vec!["Intel", "AMD"]).conform_to(Attribute::ProcessorManufacturer);
        assert_eq!(value, FeatureValue::Scalar("Intel, AMD".into()));

        let value = FeatureValue::from(vec!["CE", "FCC"]).conform_to(Attribute::Certifications);
        assert_eq!(value, FeatureValue::List(vec!["CE".into(), "FCC".into()]));
    }

    #[test]
    fn test_product_get_and_set() {
        let product = Product::new("p1", "Conga-TC570")
            .with(Attribute::Memory, "32.0GB DDR4")
            .with(Attribute::Wireless, vec!["WI-FI", "BLUETOOTH"])
            .with(Attribute::Certifications, NOT_AVAILABLE);

        assert_eq!(product.get(Attribute::Memory), Some("32.0GB DDR4".into()));
        assert_eq!(product.wireless, vec!["WI-FI", "BLUETOOTH"]);
        assert_eq!(product.get(Attribute::Certifications), None);
        assert_eq!(product.get(Attribute::FormFactor), None);
    }

    #[test]
    fn test_prompt_view_skips_long_text() {
        let product = Product::new("p1", "Board")
            .with(Attribute::ShortSummary, "Small board")
            .with(Attribute::FullProductDescription, "Very long text");
        let view = product.prompt_view(false);
        assert_eq!(view["product_id"], "p1");
        assert_eq!(view["short_summary"], "Small board");
        assert!(view.get("full_product_description").is_none());
    }
}
