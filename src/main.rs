// src/main.rs - Recipe estimator server

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use recipe_estimator::api::{create_router, AppState};
use recipe_estimator::config::Config;
use recipe_estimator::data::ReferenceData;
use recipe_estimator::estimator::RecipeEstimator;

#[tokio::main]
async fn main() -> Result<()> {
    let config = match Config::load_with_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Using default configuration: {e}");
            Config::default()
        }
    };
    config.validate()?;

    let level = config
        .logging
        .level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();

    let reference = ReferenceData::load(&config.data)
        .context("failed to load reference data; run prepare_reference to build the artefacts")?;
    let estimator = Arc::new(RecipeEstimator::new(reference, config.estimator.clone()));

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.product_source.timeout_seconds))
        .build()
        .context("failed to build the product registry client")?;

    let state = Arc::new(AppState {
        estimator,
        client,
        product_base_url: config.product_source.base_url.trim_end_matches('/').to_string(),
    });

    let app = create_router(state);
    let address = config.get_server_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!("Recipe estimator listening on http://{}", address);
    info!("  POST /api/v3/estimate_recipe        - fit with the penalty optimizer");
    info!("  POST /api/v3/estimate_recipe_simple - ingredient-list-only baseline");
    info!("  POST /api/v3/estimate_recipe_nnls   - non-negative least squares");
    info!("  POST /api/v3/get_penalties          - score existing estimates");
    info!("  GET  /ciqual/:name                  - search reference foods");
    info!("  GET  /product/:id                   - fetch from the product registry");
    info!("  GET  /api/health, /api/metrics");

    axum::serve(listener, app).await?;
    Ok(())
}
