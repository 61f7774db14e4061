// src/estimator/nnls.rs - Non-negative least squares reconstructor

use nalgebra::{DMatrix, DVector};

use crate::estimator::model::RecipeModel;

/// Result of the NNLS reconstruction: leaf masses in tree order plus the
/// residual norm of the underlying least-squares fit.
#[derive(Debug, Clone)]
pub struct NnlsFit {
    pub x: Vec<f64>,
    pub residual_norm: f64,
}

/// Reconstruct leaf masses by solving `min ||A s - b||` for `s >= 0`, where
/// column *i* of `A` accumulates the nominal nutrient content of leaves
/// `0..=i`. Solving for the differences between consecutive leaves and
/// recovering masses as suffix sums makes the result monotone
/// non-increasing by construction, which encodes the declared order.
pub fn fit(model: &RecipeModel) -> NnlsFit {
    let rows = model.nutrient_keys.len();
    let cols = model.leaf_count;

    let a = DMatrix::from_fn(rows, cols, |n, i| {
        (0..=i).map(|j| model.nom[[n, j]] * 100.0).sum::<f64>()
    });
    let b = DVector::from_fn(rows, |n, _| model.product_totals[n]);

    let s = solve_nnls(&a, &b);
    let residual_norm = (&b - &a * &s).norm();

    let mut x = vec![0.0; cols];
    let mut accumulated = 0.0;
    for i in (0..cols).rev() {
        accumulated += s[i];
        x[i] = 100.0 * accumulated;
    }

    NnlsFit { x, residual_norm }
}

/// Lawson-Hanson active-set solve of `min ||A x - b||` subject to `x >= 0`.
pub fn solve_nnls(a: &DMatrix<f64>, b: &DVector<f64>) -> DVector<f64> {
    let n = a.ncols();
    let mut x = DVector::zeros(n);
    if n == 0 || a.nrows() == 0 {
        return x;
    }

    let tolerance = 1e-10 * a.amax().max(1.0);
    let mut passive = vec![false; n];
    let max_outer = 3 * n;

    for _ in 0..=max_outer {
        let residual = b - a * &x;
        let gradient = a.transpose() * residual;

        // Most promising inactive coordinate; done when none remains
        let mut entering: Option<usize> = None;
        for j in 0..n {
            if passive[j] || gradient[j] <= tolerance {
                continue;
            }
            if entering.map_or(true, |best| gradient[j] > gradient[best]) {
                entering = Some(j);
            }
        }
        let Some(entering) = entering else { break };
        passive[entering] = true;

        // Inner loop: unconstrained solve on the passive set, stepping back
        // to the boundary while any passive coordinate goes non-positive
        loop {
            let columns: Vec<usize> = (0..n).filter(|&j| passive[j]).collect();
            if columns.is_empty() {
                break;
            }
            let submatrix =
                DMatrix::from_fn(a.nrows(), columns.len(), |r, c| a[(r, columns[c])]);
            let solved = submatrix
                .svd(true, true)
                .solve(b, 1e-12)
                .map(|m| m.column(0).into_owned())
                .unwrap_or_else(|_| DVector::zeros(columns.len()));

            if columns
                .iter()
                .enumerate()
                .all(|(k, _)| solved[k] > tolerance)
            {
                x.fill(0.0);
                for (k, &j) in columns.iter().enumerate() {
                    x[j] = solved[k];
                }
                break;
            }

            let mut alpha = f64::INFINITY;
            for (k, &j) in columns.iter().enumerate() {
                if solved[k] <= tolerance {
                    let denominator = x[j] - solved[k];
                    if denominator > 0.0 {
                        alpha = alpha.min(x[j] / denominator);
                    }
                }
            }
            if !alpha.is_finite() {
                break;
            }

            for (k, &j) in columns.iter().enumerate() {
                x[j] += alpha * (solved[k] - x[j]);
            }
            for &j in &columns {
                if x[j].abs() <= tolerance {
                    passive[j] = false;
                    x[j] = 0.0;
                }
            }
        }
    }

    x
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EstimatorConfig;
    use crate::data::NutrientCatalogue;
    use crate::estimator::model::build_model;
    use crate::estimator::weighting::prepare_nutrients;
    use crate::models::Product;
    use serde_json::json;

    #[test]
    fn test_solve_nnls_clamps_negative_components() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 1.0]);
        let b = DVector::from_column_slice(&[1.0, -1.0]);
        let x = solve_nnls(&a, &b);
        assert!((x[0] - 1.0).abs() < 1e-9);
        assert_eq!(x[1], 0.0);
    }

    #[test]
    fn test_solve_nnls_exact_system() {
        let a = DMatrix::from_row_slice(2, 2, &[2.0, 1.0, 1.0, 3.0]);
        let b = DVector::from_column_slice(&[5.0, 10.0]);
        let x = solve_nnls(&a, &b);
        // exact solution (1, 3) is already non-negative
        assert!((x[0] - 1.0).abs() < 1e-8);
        assert!((x[1] - 3.0).abs() < 1e-8);
    }

    #[test]
    fn test_fit_recovers_ordered_masses() {
        let mut product: Product = serde_json::from_value(json!({
            "ingredients": [
                {"id": "en:sugar", "nutrients": {
                    "sugars": {"percent_nom": 100.0},
                    "salt": {"percent_nom": 0.0}
                }},
                {"id": "en:salt", "nutrients": {
                    "sugars": {"percent_nom": 0.0},
                    "salt": {"percent_nom": 100.0}
                }}
            ],
            "nutriments": {"sugars_100g": 80, "salt_100g": 20}
        }))
        .unwrap();
        let config = EstimatorConfig::default();
        let catalogue = NutrientCatalogue::builtin();
        prepare_nutrients(&mut product, &catalogue, &config);
        let model = build_model(&product, &catalogue, &config).unwrap();

        let fit = fit(&model);
        assert!((fit.x[0] - 80.0).abs() < 1e-6);
        assert!((fit.x[1] - 20.0).abs() < 1e-6);
        assert!(fit.residual_norm < 1e-6);
    }

    #[test]
    fn test_fit_is_monotone_by_construction() {
        let mut product: Product = serde_json::from_value(json!({
            "ingredients": [
                {"id": "a", "nutrients": {"fiber": {"percent_nom": 15.0}}},
                {"id": "b", "nutrients": {"fiber": {"percent_nom": 3.0}}},
                {"id": "c", "nutrients": {"fiber": {"percent_nom": 1.0}}}
            ],
            "nutriments": {"fiber_100g": 10}
        }))
        .unwrap();
        let config = EstimatorConfig::default();
        let catalogue = NutrientCatalogue::builtin();
        prepare_nutrients(&mut product, &catalogue, &config);
        let model = build_model(&product, &catalogue, &config).unwrap();

        let fit = fit(&model);
        assert!(fit.x.windows(2).all(|w| w[0] >= w[1] - 1e-9));
    }
}
