// src/estimator/resolver.rs - Attach reference nutrient profiles to leaf ingredients

use std::collections::BTreeMap;
use tracing::debug;

use crate::data::{resolve_food_codes, ReferenceData};
use crate::models::{Ingredient, NutrientProfile, Product};

/// Give every leaf of the ingredient tree a nutrient profile. Leaves that
/// already carry one are left alone, which lets callers inject fixtures.
/// Resolution never fails: an ingredient without any usable reference
/// record gets the all-unknown profile.
pub fn resolve_product(reference: &ReferenceData, product: &mut Product) {
    resolve_ingredients(reference, &mut product.ingredients);
}

fn resolve_ingredients(reference: &ReferenceData, ingredients: &mut [Ingredient]) {
    for ingredient in ingredients {
        if !ingredient.is_leaf() {
            resolve_ingredients(reference, ingredient.children_mut());
            continue;
        }

        if ingredient.nutrients.is_some() {
            continue;
        }

        let (direct, proxy) = resolve_food_codes(reference.taxonomy(), &ingredient.id);
        ingredient.ciqual_food_code = direct.clone();
        ingredient.ciqual_proxy_food_code = proxy.clone();

        let code = direct.or(proxy);
        match code.as_deref().and_then(|c| reference.food(c)) {
            Some(food) => {
                ingredient.nutrients = Some(food.nutrients.clone());
            }
            None => {
                debug!("no reference record for {}, using unknown profile", ingredient.id);
                ingredient.nutrients = Some(unknown_profile(reference));
            }
        }
        ingredient.ciqual_food_code_used = code;
    }
}

/// Zero values for every catalogue nutrient, tagged `-` so the selector
/// leaves them out of the fit.
fn unknown_profile(reference: &ReferenceData) -> BTreeMap<String, NutrientProfile> {
    reference
        .catalogue()
        .iter()
        .map(|spec| (spec.off_id.clone(), NutrientProfile::unknown()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{NutrientCatalogue, Taxonomy};
    use crate::models::FoodRecord;
    use serde_json::json;
    use std::collections::HashMap;

    fn reference() -> ReferenceData {
        let foods = HashMap::from([(
            "20047".to_string(),
            FoodRecord {
                ciqual_food_code: "20047".to_string(),
                alim_nom_eng: "Tomato, raw".to_string(),
                nutrients: BTreeMap::from([(
                    "fiber".to_string(),
                    NutrientProfile {
                        percent_nom: 1.2,
                        percent_min: 0.9,
                        percent_max: 1.8,
                        confidence: None,
                    },
                )]),
            },
        )]);
        let taxonomy: Taxonomy = serde_json::from_value(json!({
            "en:tomato": {"ciqual_food_code": {"en": "20047"}},
            "en:cherry-tomato": {"parents": ["en:tomato"]},
            "en:tomato-sauce": {"ciqual_proxy_food_code": {"en": "20047"}}
        }))
        .unwrap();
        ReferenceData::new(foods, taxonomy, NutrientCatalogue::builtin())
    }

    fn product(value: serde_json::Value) -> Product {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_direct_code_resolution() {
        let reference = reference();
        let mut product = product(json!({"ingredients": [{"id": "en:tomato"}]}));

        resolve_product(&reference, &mut product);

        let leaf = &product.ingredients[0];
        assert_eq!(leaf.ciqual_food_code_used.as_deref(), Some("20047"));
        let fiber = leaf.nutrients.as_ref().unwrap().get("fiber").unwrap();
        assert_eq!(fiber.percent_nom, 1.2);
    }

    #[test]
    fn test_proxy_and_ancestor_resolution() {
        let reference = reference();
        let mut product = product(json!({"ingredients": [
            {"id": "en:tomato-sauce"},
            {"id": "en:cherry-tomato"}
        ]}));

        resolve_product(&reference, &mut product);

        assert_eq!(
            product.ingredients[0].ciqual_food_code_used.as_deref(),
            Some("20047")
        );
        assert_eq!(
            product.ingredients[1].ciqual_food_code_used.as_deref(),
            Some("20047")
        );
    }

    #[test]
    fn test_unknown_ingredient_gets_unknown_profile() {
        let reference = reference();
        let mut product = product(json!({"ingredients": [{"id": "en:does-not-exist"}]}));

        resolve_product(&reference, &mut product);

        let leaf = &product.ingredients[0];
        assert!(leaf.ciqual_food_code_used.is_none());
        let nutrients = leaf.nutrients.as_ref().unwrap();
        assert_eq!(nutrients.len(), reference.catalogue().len());
        assert!(nutrients.values().all(|profile| !profile.is_known()));
    }

    #[test]
    fn test_existing_profile_is_kept() {
        let reference = reference();
        let mut product = product(json!({"ingredients": [{
            "id": "en:tomato",
            "nutrients": {"fiber": {"percent_nom": 4.0}}
        }]}));

        resolve_product(&reference, &mut product);
        let fiber = product.ingredients[0]
            .nutrients
            .as_ref()
            .unwrap()
            .get("fiber")
            .unwrap();
        assert_eq!(fiber.percent_nom, 4.0);
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let reference = reference();
        let mut product = product(json!({"ingredients": [{"id": "en:tomato"}]}));

        resolve_product(&reference, &mut product);
        let first = serde_json::to_value(&product).unwrap();
        resolve_product(&reference, &mut product);
        let second = serde_json::to_value(&product).unwrap();
        assert_eq!(first, second);
    }
}
