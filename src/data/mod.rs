// src/data/mod.rs - Immutable reference data bundle

pub mod catalogue;
pub mod ciqual;
pub mod taxonomy;

use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::config::DataConfig;
use crate::core::Result;
use crate::models::FoodRecord;

pub use catalogue::{NutrientCatalogue, NutrientSpec, NutrientUnit};
pub use taxonomy::{resolve_food_codes, LocalizedCode, Taxonomy, TaxonomyEntry};

/// The reference nutrient database, ingredient taxonomy and nutrient
/// catalogue, loaded once at startup and shared read-only between requests.
pub struct ReferenceData {
    foods: HashMap<String, FoodRecord>,
    taxonomy: Taxonomy,
    catalogue: NutrientCatalogue,
}

impl ReferenceData {
    pub fn new(
        foods: HashMap<String, FoodRecord>,
        taxonomy: Taxonomy,
        catalogue: NutrientCatalogue,
    ) -> Self {
        Self {
            foods,
            taxonomy,
            catalogue,
        }
    }

    /// Load the bundle from the configured artefact paths. The nutrient map
    /// falls back to the builtin table when no CSV is configured.
    pub fn load(config: &DataConfig) -> Result<Arc<Self>> {
        let catalogue = match &config.nutrient_map_path {
            Some(path) => NutrientCatalogue::from_csv_path(path)?,
            None => NutrientCatalogue::builtin(),
        };
        let foods = ciqual::load_foods(&config.foods_path)?;
        let taxonomy = taxonomy::load_taxonomy(&config.taxonomy_path)?;

        info!(
            "Loaded reference data: {} foods, {} taxonomy entries, {} catalogue nutrients",
            foods.len(),
            taxonomy.len(),
            catalogue.len()
        );

        Ok(Arc::new(Self::new(foods, taxonomy, catalogue)))
    }

    pub fn food(&self, code: &str) -> Option<&FoodRecord> {
        self.foods.get(code)
    }

    pub fn foods(&self) -> &HashMap<String, FoodRecord> {
        &self.foods
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    pub fn catalogue(&self) -> &NutrientCatalogue {
        &self.catalogue
    }

    /// Case-folded multi-term search over food names and codes, used by the
    /// ingredient search endpoint.
    pub fn search_foods(&self, query: &str, limit: usize) -> Vec<&FoodRecord> {
        let terms: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
        let mut matches: Vec<&FoodRecord> = self
            .foods
            .values()
            .filter(|food| {
                let haystack =
                    format!("{} {}", food.alim_nom_eng, food.ciqual_food_code).to_lowercase();
                terms.iter().all(|term| haystack.contains(term))
            })
            .collect();
        matches.sort_by(|a, b| a.ciqual_food_code.cmp(&b.ciqual_food_code));
        matches.truncate(limit);
        matches
    }
}
