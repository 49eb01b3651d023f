use std::fmt;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::DomainError;

/// Flat attribute bundle as returned by the catalog, keyed by the index's
/// metadata names (`ID`, `Model Name`, `Max Price`, ...).
pub type AttributeBundle = serde_json::Map<String, Value>;

/// Keys a bundle must carry (non-null) to be usable as a product.
pub const REQUIRED_BUNDLE_KEYS: [&str; 3] = ["ID", "Model Name", "Max Price"];

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProductId(pub String);

impl ProductId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProductId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    #[serde(alias = "ID")]
    pub id: ProductId,
    #[serde(alias = "Company Name", default, deserialize_with = "string_or_empty")]
    pub company_name: String,
    #[serde(alias = "Model Name")]
    pub model_name: String,
    #[serde(alias = "Max Price", deserialize_with = "whole_number")]
    pub max_price: i64,
    #[serde(alias = "Capacity", default, deserialize_with = "count_or_zero")]
    pub capacity_gb: u32,
    #[serde(default, deserialize_with = "count_or_zero")]
    pub ram: u32,
    #[serde(alias = "Back Camera", default, deserialize_with = "string_or_empty")]
    pub back_camera: String,
    #[serde(alias = "Front Camera", default, deserialize_with = "string_or_empty")]
    pub front_camera: String,
    #[serde(alias = "Processor", default, deserialize_with = "string_or_empty")]
    pub processor: String,
    #[serde(alias = "Screen Size", default, deserialize_with = "string_or_empty")]
    pub screen_size: String,
    #[serde(default, deserialize_with = "count_or_zero")]
    pub battery: u32,
    #[serde(alias = "Text", default, deserialize_with = "string_or_empty")]
    pub description: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl Product {
    pub fn from_bundle(bundle: &AttributeBundle) -> Result<Self, DomainError> {
        serde_json::from_value(Value::Object(bundle.clone())).map_err(|error| {
            DomainError::InvalidProductBundle {
                product_id: bundle_id(bundle).unwrap_or("<missing>").to_string(),
                reason: error.to_string(),
            }
        })
    }

    pub fn display_name(&self) -> String {
        if self.company_name.is_empty() {
            self.model_name.clone()
        } else {
            format!("{} {}", self.company_name, self.model_name)
        }
    }
}

pub fn bundle_id(bundle: &AttributeBundle) -> Option<&str> {
    bundle.get("ID").and_then(Value::as_str)
}

pub fn has_required_keys(bundle: &AttributeBundle) -> bool {
    REQUIRED_BUNDLE_KEYS.iter().all(|key| bundle.get(*key).is_some_and(|value| !value.is_null()))
}

fn whole_number_from(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|float| float.is_finite() && float.fract() == 0.0)
                .map(|float| float as i64)
        }),
        Value::String(raw) => raw.trim().parse().ok(),
        _ => None,
    }
}

fn whole_number<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    whole_number_from(&value)
        .ok_or_else(|| de::Error::custom(format!("expected a whole number, found `{value}`")))
}

fn count_or_zero<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(0);
    }
    whole_number_from(&value)
        .and_then(|number| u32::try_from(number).ok())
        .ok_or_else(|| de::Error::custom(format!("expected a non-negative count, found `{value}`")))
}

fn string_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(String::new()),
        Value::String(raw) => Ok(raw),
        other => Ok(other.to_string()),
    }
}
