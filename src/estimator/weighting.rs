// src/estimator/weighting.rs - Select the nutrients that take part in fitting

use std::collections::BTreeMap;

use crate::config::EstimatorConfig;
use crate::data::NutrientCatalogue;
use crate::models::{Ingredient, NutrientReport, Product, RecipeEstimate};

/// Walk the resolved tree, decide which nutrients participate in fitting
/// and with what weighting, and attach the report skeleton to the product.
/// Returns the leaf count.
pub fn prepare_nutrients(
    product: &mut Product,
    catalogue: &NutrientCatalogue,
    config: &EstimatorConfig,
) -> usize {
    let mut nutrients: BTreeMap<String, NutrientReport> = BTreeMap::new();
    let count = count_ingredients(&product.ingredients, &mut nutrients);

    assign_weightings(product, catalogue, &mut nutrients);
    apply_gross_carbohydrate_rule(&product.countries_tags, &mut nutrients, config);

    product.recipe_estimator = Some(RecipeEstimate {
        nutrients,
        ingredient_count: count,
        ..Default::default()
    });
    count
}

/// Count leaf ingredients and, per nutrient, how many leaves report a known
/// value and what those nominal values sum to.
fn count_ingredients(
    ingredients: &[Ingredient],
    nutrients: &mut BTreeMap<String, NutrientReport>,
) -> usize {
    let mut count = 0;
    for ingredient in ingredients {
        if !ingredient.is_leaf() {
            count += count_ingredients(ingredient.children(), nutrients);
            continue;
        }

        count += 1;
        let Some(profiles) = &ingredient.nutrients else {
            continue;
        };
        for (key, profile) in profiles {
            if !profile.is_known() {
                continue;
            }
            let entry = nutrients.entry(key.clone()).or_default();
            entry.ingredient_count += 1;
            entry.unweighted_total += profile.percent_nom;
        }
    }
    count
}

fn assign_weightings(
    product: &Product,
    catalogue: &NutrientCatalogue,
    nutrients: &mut BTreeMap<String, NutrientReport>,
) {
    for (key, report) in nutrients.iter_mut() {
        let Some(product_total) = product.nutriment(key) else {
            report.notes = Some("Not listed on product".to_string());
            continue;
        };
        report.product_total = Some(product_total);

        if product_total == 0.0 && report.unweighted_total == 0.0 {
            report.notes = Some("All zero values".to_string());
            continue;
        }

        if report.ingredient_count == 0 {
            report.notes = Some("Not available on any ingredient".to_string());
            continue;
        }

        match catalogue.get(key) {
            Some(spec) => match spec.weighting {
                Some(weighting) if weighting > 0.0 => report.weighting = weighting,
                _ => report.notes = spec.comment.clone(),
            },
            None => report.notes = Some("Not in nutrient catalogue".to_string()),
        }
    }
}

/// Labels from some jurisdictions state carbohydrates including fibre and
/// sugars. When enough of the product's countries are in that set and the
/// declared carbs leave a positive remainder after subtracting fibre and
/// sugars, carbohydrates cannot be trusted and are dropped from the fit.
fn apply_gross_carbohydrate_rule(
    countries_tags: &[String],
    nutrients: &mut BTreeMap<String, NutrientReport>,
    config: &EstimatorConfig,
) {
    if countries_tags.is_empty() {
        return;
    }
    let Some(carbohydrates) = nutrients.get("carbohydrates") else {
        return;
    };
    if carbohydrates.weighting <= 0.0 {
        return;
    }

    let gross_countries = countries_tags
        .iter()
        .filter(|&tag| config.gross_carb_countries.contains(tag))
        .count();
    if gross_countries as f64 / countries_tags.len() as f64 <= config.gross_carb_country_threshold {
        return;
    }

    let mut remaining_carbs = carbohydrates.product_total.unwrap_or(0.0);
    if let (Some(fiber), Some(sugars)) = (nutrients.get("fiber"), nutrients.get("sugars")) {
        remaining_carbs -= fiber.product_total.unwrap_or(0.0);
        remaining_carbs -= sugars.product_total.unwrap_or(0.0);
    }

    if remaining_carbs > 0.0 {
        let carbohydrates = nutrients.get_mut("carbohydrates").expect("checked above");
        carbohydrates.weighting = 0.0;
        carbohydrates.notes = Some("Might be total carbs".to_string());
    }
}
