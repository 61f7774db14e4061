// src/estimator/mod.rs - Recipe estimation service

pub mod model;
pub mod nnls;
pub mod optimizer;
pub mod penalty;
pub mod propagate;
pub mod resolver;
pub mod simple;
pub mod weighting;

use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{error, info, warn};

use crate::config::EstimatorConfig;
use crate::core::{EstimateMetrics, MetricsCollector, Result};
use crate::data::ReferenceData;
use crate::models::Product;

pub use model::{build_model, OrderConstraint, RecipeModel};
pub use optimizer::Solution;

/// Facade over the estimation pipeline. Holds the immutable reference
/// bundle and the tuning knobs; each call owns its product document and its
/// working arrays, so the service is freely shared between requests.
pub struct RecipeEstimator {
    reference: Arc<ReferenceData>,
    config: EstimatorConfig,
    metrics: Mutex<MetricsCollector>,
}

impl RecipeEstimator {
    pub fn new(reference: Arc<ReferenceData>, config: EstimatorConfig) -> Self {
        Self {
            reference,
            config,
            metrics: Mutex::new(MetricsCollector::new()),
        }
    }

    pub fn reference(&self) -> &ReferenceData {
        &self.reference
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Attach reference nutrient profiles to every leaf. Running it again
    /// on an annotated document is a no-op.
    pub fn resolve_product(&self, product: &mut Product) {
        resolver::resolve_product(&self.reference, product);
    }

    /// Fit leaf masses with the penalty objective and the evolution loop,
    /// then write estimates and the report back into the document.
    pub fn estimate_recipe(&self, product: &mut Product) -> Result<()> {
        self.timed(product, |this, product| {
            weighting::prepare_nutrients(product, this.reference.catalogue(), &this.config);
            let model = model::build_model(product, this.reference.catalogue(), &this.config)?;
            let solution = optimizer::minimize(&model, &this.config);

            if !solution.converged {
                warn!(
                    "product {}: {}",
                    product.code.as_deref().unwrap_or("unknown"),
                    solution.message
                );
            }

            propagate::apply_solution(&mut product.ingredients, &solution.x);
            let (_, penalties) = penalty::evaluate(&solution.x, &model);

            let report = product
                .recipe_estimator
                .as_mut()
                .expect("prepare_nutrients attaches the report");
            report.status = 0;
            report.status_message = solution.message;
            report.iterations = Some(solution.iterations as u64);
            report.penalties = Some(penalties);
            Ok(())
        })
    }

    /// Ingredient-list-only baseline: power-law decay over sibling
    /// position, no use of the nutrient panel.
    pub fn estimate_recipe_simple(&self, product: &mut Product) -> Result<()> {
        self.timed(product, |this, product| {
            weighting::prepare_nutrients(product, this.reference.catalogue(), &this.config);
            let model = model::build_model(product, this.reference.catalogue(), &this.config)?;

            simple::estimate_percentages(&mut product.ingredients, 100.0);

            let quantities = propagate::collect_leaf_quantities(&product.ingredients)?;
            let (_, penalties) = penalty::evaluate(&quantities, &model);

            let report = product
                .recipe_estimator
                .as_mut()
                .expect("prepare_nutrients attaches the report");
            report.status = 0;
            report.status_message = "OK".to_string();
            report.penalties = Some(penalties);
            Ok(())
        })
    }

    /// Non-negative least squares over cumulative nutrient coefficients;
    /// keeps the declared order by construction.
    pub fn estimate_recipe_nnls(&self, product: &mut Product) -> Result<()> {
        self.timed(product, |this, product| {
            weighting::prepare_nutrients(product, this.reference.catalogue(), &this.config);
            let model = model::build_model(product, this.reference.catalogue(), &this.config)?;

            let fit = nnls::fit(&model);
            propagate::apply_solution(&mut product.ingredients, &fit.x);
            let (_, penalties) = penalty::evaluate(&fit.x, &model);

            let report = product
                .recipe_estimator
                .as_mut()
                .expect("prepare_nutrients attaches the report");
            report.status = 0;
            report.status_message = format!("rnorm: {:.6}", fit.residual_norm);
            report.penalties = Some(penalties);
            Ok(())
        })
    }

    /// Score a document at its existing quantity estimates without
    /// refitting it.
    pub fn compute_penalties(&self, product: &mut Product) -> Result<()> {
        weighting::prepare_nutrients(product, self.reference.catalogue(), &self.config);
        let model = model::build_model(product, self.reference.catalogue(), &self.config)?;
        let quantities = propagate::collect_leaf_quantities(&product.ingredients)?;
        let (_, penalties) = penalty::evaluate(&quantities, &model);

        let report = product
            .recipe_estimator
            .as_mut()
            .expect("prepare_nutrients attaches the report");
        report.status = 0;
        report.status_message = "OK".to_string();
        report.penalties = Some(penalties);
        Ok(())
    }

    pub fn metrics(&self) -> EstimateMetrics {
        self.metrics
            .lock()
            .expect("metrics lock poisoned")
            .get_current_metrics()
    }

    fn timed<F>(&self, product: &mut Product, run: F) -> Result<()>
    where
        F: FnOnce(&Self, &mut Product) -> Result<()>,
    {
        self.metrics
            .lock()
            .expect("metrics lock poisoned")
            .record_estimate_start();
        let started = Instant::now();

        let result = run(self, product);
        let elapsed = started.elapsed();

        let mut metrics = self.metrics.lock().expect("metrics lock poisoned");
        match &result {
            Ok(()) => {
                metrics.record_estimate_success(elapsed);
                if let Some(report) = product.recipe_estimator.as_mut() {
                    report.time = elapsed.as_secs_f64();
                }
                info!(
                    "estimated product {} in {:.3}s",
                    product.code.as_deref().unwrap_or("unknown"),
                    elapsed.as_secs_f64()
                );
            }
            Err(e) => {
                metrics.record_estimate_failure();
                error!(
                    "estimation failed for product {}: {}",
                    product.code.as_deref().unwrap_or("unknown"),
                    e
                );
            }
        }
        result
    }
}
