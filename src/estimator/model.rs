// src/estimator/model.rs - Flatten the ingredient tree into the fitting model

use ndarray::{Array1, Array2};
use std::collections::BTreeMap;

use crate::config::EstimatorConfig;
use crate::core::{EstimatorError, Result};
use crate::data::NutrientCatalogue;
use crate::models::{Ingredient, NutrientProfile, Product};

/// One pairwise ordering constraint: the leaf indices of the previous
/// sibling's subtree and of this sibling's subtree. The mass summed over
/// `previous` must stay at or above the mass summed over `next`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderConstraint {
    pub previous: Vec<usize>,
    pub next: Vec<usize>,
}

/// Flat representation of a product consumed by the optimizer: ordered
/// leaves, per-nutrient coefficient matrices, per-leaf bounds, the initial
/// guess and the encoded ordering constraints.
#[derive(Debug, Clone)]
pub struct RecipeModel {
    pub leaf_count: usize,
    pub nutrient_keys: Vec<String>,
    pub product_totals: Array1<f64>,
    pub weightings: Array1<f64>,
    pub penalty_factors: Array1<f64>,
    /// `[nutrient][leaf]` nominal fraction (profile percent divided by 100).
    pub nom: Array2<f64>,
    pub min: Array2<f64>,
    pub max: Array2<f64>,
    /// Per-leaf `(min, max)` mass bounds in grams per 100 g of product.
    pub bounds: Vec<(f64, f64)>,
    pub initial: Vec<f64>,
    pub order_constraints: Vec<OrderConstraint>,
}

struct Walk<'a> {
    leaves: Vec<Option<&'a BTreeMap<String, NutrientProfile>>>,
    bounds: Vec<(f64, f64)>,
    initial: Vec<f64>,
    order_constraints: Vec<OrderConstraint>,
    water_loss_factor: f64,
}

impl<'a> Walk<'a> {
    /// Preorder pass over one sibling group. Returns the number of leaves
    /// added underneath it.
    fn add_ingredients(
        &mut self,
        ingredients: &'a [Ingredient],
        parent_estimate: f64,
        parent_min: f64,
        parent_max: f64,
    ) -> usize {
        let group_size = ingredients.len();
        if group_size == 0 {
            return 0;
        }

        // Initial estimates form a geometric progression with ratio 1/2,
        // normalized so the group sums to the parent estimate:
        // a = (total * 0.5) / (1 - 0.5^n)
        let mut estimate = (parent_estimate * 0.5) / (1.0 - 0.5f64.powi(group_size as i32));
        let mut leaves_added = 0;
        let mut previous_start = 0;

        for (i, ingredient) in ingredients.iter().enumerate() {
            let this_start = self.leaves.len();

            // The i-th sibling can be at most 1/(i+1) of the parent's
            // maximum; only the first sibling carries a lower bound.
            let max_percent = parent_max / (i as f64 + 1.0);
            let min_percent = if i == 0 {
                parent_min / group_size as f64
            } else {
                0.0
            };

            let added = if !ingredient.is_leaf() {
                self.add_ingredients(ingredient.children(), estimate, min_percent, max_percent)
            } else {
                let water_fraction = ingredient
                    .nutrients
                    .as_ref()
                    .and_then(|n| n.get("water"))
                    .map(|w| w.percent_nom * 0.01)
                    .unwrap_or(0.0);

                // At most half of the nominal water is assumed lost during
                // processing, so the raw mass may exceed the percentage cap.
                let max_weight = max_percent / (1.0 - self.water_loss_factor * water_fraction);

                self.leaves.push(ingredient.nutrients.as_ref());
                self.bounds.push((min_percent, max_weight));
                self.initial.push(estimate);
                1
            };

            if i > 0 {
                self.order_constraints.push(OrderConstraint {
                    previous: (previous_start..this_start).collect(),
                    next: (this_start..this_start + added).collect(),
                });
            }

            estimate /= 2.0;
            leaves_added += added;
            previous_start = this_start;
        }

        leaves_added
    }
}

/// Build the fitting model for a product whose nutrients have been selected
/// by [`prepare_nutrients`](super::weighting::prepare_nutrients).
pub fn build_model(
    product: &Product,
    catalogue: &NutrientCatalogue,
    config: &EstimatorConfig,
) -> Result<RecipeModel> {
    if product.ingredients.is_empty() {
        return Err(EstimatorError::invalid_product(
            "product has no ingredients",
        ));
    }
    let report = product.recipe_estimator.as_ref().ok_or_else(|| {
        EstimatorError::internal("nutrient selection must run before the model builder")
    })?;

    // Selected nutrients, in the deterministic report order
    let mut nutrient_keys = Vec::new();
    let mut product_totals = Vec::new();
    let mut weightings = Vec::new();
    let mut penalty_factors = Vec::new();
    for (key, nutrient) in &report.nutrients {
        if nutrient.weighting <= 0.0 {
            continue;
        }
        let Some(product_total) = nutrient.product_total else {
            continue;
        };
        nutrient_keys.push(key.clone());
        product_totals.push(product_total);
        weightings.push(nutrient.weighting);
        penalty_factors.push(
            catalogue
                .get(key)
                .map(|spec| spec.penalty_factor)
                .unwrap_or(1.0),
        );
    }

    let mut walk = Walk {
        leaves: Vec::new(),
        bounds: Vec::new(),
        initial: Vec::new(),
        order_constraints: Vec::new(),
        water_loss_factor: config.water_loss_factor,
    };
    walk.add_ingredients(&product.ingredients, 100.0, 100.0, 100.0);

    let leaf_count = walk.leaves.len();
    if leaf_count == 0 {
        return Err(EstimatorError::invalid_product(
            "product has no leaf ingredients",
        ));
    }

    let mut bounds = walk.bounds;
    if leaf_count == 1 {
        // A single ingredient with no water collapses the box to [100, 100];
        // nudge the interior open so the optimizer has room to move.
        if bounds[0].1 == 100.0 {
            bounds[0].1 = 105.0;
        } else {
            bounds[0].0 = 100.0 - 1e-10;
        }
    }

    let nutrient_count = nutrient_keys.len();
    let mut nom = Array2::zeros((nutrient_count, leaf_count));
    let mut min = Array2::zeros((nutrient_count, leaf_count));
    let mut max = Array2::zeros((nutrient_count, leaf_count));
    for (n, key) in nutrient_keys.iter().enumerate() {
        for (i, profiles) in walk.leaves.iter().enumerate() {
            // Leaves without a value for this nutrient contribute zero
            if let Some(profile) = profiles.and_then(|p| p.get(key)) {
                nom[[n, i]] = profile.percent_nom / 100.0;
                min[[n, i]] = profile.percent_min / 100.0;
                max[[n, i]] = profile.percent_max / 100.0;
            }
        }
    }

    Ok(RecipeModel {
        leaf_count,
        nutrient_keys,
        product_totals: Array1::from(product_totals),
        weightings: Array1::from(weightings),
        penalty_factors: Array1::from(penalty_factors),
        nom,
        min,
        max,
        bounds,
        initial: walk.initial,
        order_constraints: walk.order_constraints,
    })
}
