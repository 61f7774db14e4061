// src/estimator/propagate.rs - Write fitted masses back into the ingredient tree

use crate::core::{EstimatorError, Result};
use crate::models::Ingredient;

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Write each leaf's fitted mass and derived percentage back into the tree,
/// in the same preorder the model builder flattened it. Internal nodes get
/// the sums of their children.
pub fn apply_solution(ingredients: &mut [Ingredient], x: &[f64]) {
    let total: f64 = x.iter().sum();
    let mut index = 0;
    set_estimates(ingredients, x, total, &mut index);
}

fn set_estimates(
    ingredients: &mut [Ingredient],
    x: &[f64],
    total: f64,
    index: &mut usize,
) -> (f64, f64) {
    let mut total_percent = 0.0;
    let mut total_quantity = 0.0;

    for ingredient in ingredients {
        let (percent, quantity) = if !ingredient.is_leaf() {
            set_estimates(ingredient.children_mut(), x, total, index)
        } else {
            let mass = x.get(*index).copied().unwrap_or(0.0);
            *index += 1;
            let percent = if total > 0.0 {
                round2(100.0 * mass / total)
            } else {
                0.0
            };
            (percent, round2(mass))
        };

        ingredient.percent_estimate = Some(round2(percent));
        ingredient.quantity_estimate = Some(round2(quantity));
        total_percent += percent;
        total_quantity += quantity;
    }

    (total_percent, total_quantity)
}

/// Gather existing leaf quantity estimates in tree order, e.g. to score a
/// document against the penalty function without refitting it.
pub fn collect_leaf_quantities(ingredients: &[Ingredient]) -> Result<Vec<f64>> {
    let mut quantities = Vec::new();
    collect_recursive(ingredients, &mut quantities)?;
    Ok(quantities)
}

fn collect_recursive(ingredients: &[Ingredient], quantities: &mut Vec<f64>) -> Result<()> {
    for ingredient in ingredients {
        if !ingredient.is_leaf() {
            collect_recursive(ingredient.children(), quantities)?;
            continue;
        }
        let quantity = ingredient.quantity_estimate.ok_or_else(|| {
            EstimatorError::invalid_product(format!(
                "ingredient {} has no quantity_estimate",
                ingredient.id
            ))
        })?;
        quantities.push(quantity);
    }
    Ok(())
}
