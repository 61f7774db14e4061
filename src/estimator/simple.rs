// src/estimator/simple.rs - Label-only baseline estimator

use crate::estimator::propagate::round2;
use crate::models::Ingredient;

/// Decay exponent over sibling position.
const POWER: f64 = -2.0;

/// Assign percentages from the ingredient list alone: within each sibling
/// group the i-th ingredient gets a share proportional to (i+1)^POWER,
/// normalized so the group sums to the parent's estimate. Parents recurse
/// their estimate into their children.
pub fn estimate_percentages(ingredients: &mut [Ingredient], total: f64) {
    let count = ingredients.len();
    if count == 0 {
        return;
    }

    let raw_sum: f64 = (1..=count).map(|n| (n as f64).powf(POWER)).sum();
    let scale = total / raw_sum;

    for (n, ingredient) in ingredients.iter_mut().enumerate() {
        let estimate = round2(scale * ((n + 1) as f64).powf(POWER));
        ingredient.percent_estimate = Some(estimate);
        ingredient.quantity_estimate = Some(estimate);
        if !ingredient.is_leaf() {
            estimate_percentages(ingredient.children_mut(), estimate);
        }
    }
}
