// src/models/nutrient.rs - Nutrient profiles, reference food records and estimate reports

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Confidence letter attached to a reference composition value.
/// `Unknown` (serialized as `-`) marks a nutrient that is not reported for
/// the food and must be excluded from fitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    A,
    B,
    C,
    D,
    #[serde(rename = "-")]
    Unknown,
}

impl Confidence {
    pub fn from_letter(letter: &str) -> Option<Self> {
        match letter.trim() {
            "A" => Some(Self::A),
            "B" => Some(Self::B),
            "C" => Some(Self::C),
            "D" => Some(Self::D),
            _ => None,
        }
    }
}

/// Per-100 g composition of one nutrient in one food, in grams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutrientProfile {
    #[serde(default)]
    pub percent_nom: f64,
    #[serde(default)]
    pub percent_min: f64,
    #[serde(default)]
    pub percent_max: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
}

impl NutrientProfile {
    /// Placeholder entry for ingredients with no reference record.
    pub fn unknown() -> Self {
        Self {
            percent_nom: 0.0,
            percent_min: 0.0,
            percent_max: 0.0,
            confidence: Some(Confidence::Unknown),
        }
    }

    /// A profile entry counts as known unless it carries the `-` marker.
    pub fn is_known(&self) -> bool {
        self.confidence != Some(Confidence::Unknown)
    }
}

/// One food of the reference composition database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodRecord {
    pub ciqual_food_code: String,
    pub alim_nom_eng: String,
    pub nutrients: BTreeMap<String, NutrientProfile>,
}

/// Per-nutrient line of the estimate report: how many ingredients know the
/// nutrient, the summed nominal content, and the weighting it received.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NutrientReport {
    pub ingredient_count: usize,
    pub unweighted_total: f64,
    pub weighting: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_total: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Penalty breakdown of the last objective evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Penalties {
    pub nutrient_penalty: f64,
    pub ingredient_not_half_previous_penalty: f64,
    pub ingredient_more_than_previous_penalty: f64,
    pub mass_less_than_100_penalty: f64,
    pub mass_more_than_100_penalty: f64,
    pub total: f64,
}

/// Report attached to a product after estimation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecipeEstimate {
    pub nutrients: BTreeMap<String, NutrientReport>,
    pub ingredient_count: usize,
    pub status: i32,
    pub status_message: String,
    pub time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterations: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub penalties: Option<Penalties>,
}
