// src/estimator/penalty.rs - Scalar penalty objective over the leaf mass vector

use ndarray::ArrayView1;

use crate::estimator::model::RecipeModel;
use crate::models::Penalties;

/// Weight on the squared nutrient variance terms.
pub const NUTRIENT_VARIANCE_PENALTY: f64 = 130_000.0;
/// Steep barrier against an ingredient exceeding its predecessor.
pub const INGREDIENT_BIGGER_THAN_PREVIOUS_PENALTY: f64 = 1_000_000.0;
/// Gentle pull toward each ingredient being half of its predecessor.
pub const INGREDIENT_NOT_HALF_PREVIOUS_PENALTY: f64 = 10.0;
/// Underfilling 100 g is nearly inadmissible.
pub const TOTAL_MASS_LESS_THAN_100_PENALTY: f64 = 10_000_000.0;
/// Overshoot models mass lost during processing and stays cheap.
pub const TOTAL_MASS_MORE_THAN_100_PENALTY: f64 = 100.0;

/// Evaluate the penalty at `x`, filling the per-term breakdown. All terms
/// are non-negative; the returned value equals `penalties.total`.
pub fn objective(x: &[f64], model: &RecipeModel, penalties: &mut Penalties) -> f64 {
    let x = ArrayView1::from(x);

    // (a) weighted squared distance between the declared nutrient totals
    // and the totals reconstructed from the nominal leaf fractions
    let mut nutrient_variance = 0.0;
    for n in 0..model.nutrient_keys.len() {
        let reconstructed = model.nom.row(n).dot(&x);
        let difference = model.product_totals[n] - reconstructed;
        nutrient_variance +=
            model.weightings[n] * model.penalty_factors[n] * difference * difference;
    }
    let nutrient_penalty = NUTRIENT_VARIANCE_PENALTY * nutrient_variance;

    // (b) declared-order terms per sibling pair: below the predecessor we
    // nudge toward half of it, above it we climb a steep wall
    let mut not_half_previous = 0.0;
    let mut more_than_previous = 0.0;
    for constraint in &model.order_constraints {
        let previous_total: f64 = constraint.previous.iter().map(|&i| x[i]).sum();
        let this_total: f64 = constraint.next.iter().map(|&i| x[i]).sum();

        if this_total < previous_total {
            not_half_previous += (this_total - previous_total * 0.5).abs()
                * INGREDIENT_NOT_HALF_PREVIOUS_PENALTY;
        } else {
            more_than_previous += (0.5 * this_total) * INGREDIENT_NOT_HALF_PREVIOUS_PENALTY;
            more_than_previous +=
                (this_total - previous_total) * INGREDIENT_BIGGER_THAN_PREVIOUS_PENALTY;
        }
    }

    // (c) asymmetric total-mass terms, scaled by the leaf count so they
    // stay commensurate with the nutrient terms across product sizes
    let total_mass: f64 = x.sum();
    let leaf_count = model.leaf_count as f64;
    let mut mass_less_than_100 = 0.0;
    let mut mass_more_than_100 = 0.0;
    if total_mass < 100.0 {
        mass_less_than_100 = (100.0 - total_mass) * TOTAL_MASS_LESS_THAN_100_PENALTY * leaf_count;
    } else {
        mass_more_than_100 = (total_mass - 100.0) * TOTAL_MASS_MORE_THAN_100_PENALTY * leaf_count;
    }

    let total = nutrient_penalty
        + not_half_previous
        + more_than_previous
        + mass_less_than_100
        + mass_more_than_100;

    penalties.nutrient_penalty = nutrient_penalty;
    penalties.ingredient_not_half_previous_penalty = not_half_previous;
    penalties.ingredient_more_than_previous_penalty = more_than_previous;
    penalties.mass_less_than_100_penalty = mass_less_than_100;
    penalties.mass_more_than_100_penalty = mass_more_than_100;
    penalties.total = total;
    total
}

/// Convenience wrapper returning a fresh breakdown.
pub fn evaluate(x: &[f64], model: &RecipeModel) -> (f64, Penalties) {
    let mut penalties = Penalties::default();
    let total = objective(x, model, &mut penalties);
    (total, penalties)
}
