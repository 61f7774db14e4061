// src/models/product.rs - Product document model

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::models::nutrient::{NutrientProfile, RecipeEstimate};

/// A product document as submitted to the estimator. Fields are optional and
/// heterogeneous; numeric strings are coerced at the boundary and unknown
/// fields pass through untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Product {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "string_or_number"
    )]
    pub code: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub countries_tags: Vec<String>,

    /// Declared per-100 g nutrient panel, keyed `<nutrient>_100g`.
    #[serde(default, deserialize_with = "lenient_nutriments")]
    pub nutriments: BTreeMap<String, f64>,

    #[serde(default)]
    pub ingredients: Vec<Ingredient>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipe_estimator: Option<RecipeEstimate>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// A node of the ordered ingredient tree. Leaves have no children.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ingredient {
    pub id: String,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "string_or_number"
    )]
    pub ciqual_food_code: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "string_or_number"
    )]
    pub ciqual_proxy_food_code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ciqual_food_code_used: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nutrients: Option<BTreeMap<String, NutrientProfile>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingredients: Option<Vec<Ingredient>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent_estimate: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity_estimate: Option<f64>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Ingredient {
    /// A leaf is a node without child ingredients; an empty child list
    /// counts as a leaf too.
    pub fn is_leaf(&self) -> bool {
        self.ingredients.as_ref().map_or(true, |c| c.is_empty())
    }

    pub fn children(&self) -> &[Ingredient] {
        self.ingredients.as_deref().unwrap_or(&[])
    }

    pub fn children_mut(&mut self) -> &mut [Ingredient] {
        self.ingredients.as_deref_mut().unwrap_or(&mut [])
    }
}

impl Product {
    /// Declared panel value for `<key>_100g`.
    pub fn nutriment(&self, key: &str) -> Option<f64> {
        self.nutriments.get(&format!("{key}_100g")).copied()
    }
}

fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', ".").parse::<f64>().ok(),
        _ => None,
    }
}

/// Accepts a number or a numeric string; entries that parse to neither are
/// dropped rather than failing the whole document.
fn lenient_nutriments<'de, D>(deserializer: D) -> Result<BTreeMap<String, f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: BTreeMap<String, Value> = BTreeMap::deserialize(deserializer)?;
    Ok(raw
        .iter()
        .filter_map(|(key, value)| coerce_number(value).map(|v| (key.clone(), v)))
        .collect())
}

/// Product codes arrive as strings or bare numbers depending on the source.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}
