// src/api/mod.rs - HTTP surface for the recipe estimator

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::core::EstimatorError;
use crate::estimator::RecipeEstimator;
use crate::models::{FoodRecord, Product};

/// Shared handler state: the estimation service plus the client used to
/// fetch products from the upstream registry.
pub struct AppState {
    pub estimator: Arc<RecipeEstimator>,
    pub client: reqwest::Client,
    pub product_base_url: String,
}

/// Error envelope returned by every endpoint.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<EstimatorError> for ApiError {
    fn from(error: EstimatorError) -> Self {
        let status = match &error {
            EstimatorError::InvalidProduct(_) => StatusCode::BAD_REQUEST,
            EstimatorError::Http(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v3/estimate_recipe", post(estimate_recipe))
        .route("/api/v3/estimate_recipe_simple", post(estimate_recipe_simple))
        .route("/api/v3/estimate_recipe_nnls", post(estimate_recipe_nnls))
        .route("/api/v3/get_penalties", post(get_penalties))
        .route("/ciqual/:name", get(search_foods))
        .route("/product/:id", get(fetch_product))
        .route("/api/health", get(health))
        .route("/api/metrics", get(metrics))
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
        .with_state(state)
}

/// Run one estimation flavour off the async runtime and hand back the
/// annotated document. A malformed document is rejected before any
/// mutation happens.
async fn run_estimate<F>(
    state: Arc<AppState>,
    payload: Result<Json<Product>, JsonRejection>,
    run: F,
) -> Result<Json<Product>, ApiError>
where
    F: FnOnce(&RecipeEstimator, &mut Product) -> crate::core::Result<()> + Send + 'static,
{
    let Json(mut product) = payload.map_err(|rejection| {
        warn!("rejected product document: {}", rejection.body_text());
        ApiError::bad_request(rejection.body_text())
    })?;

    let estimator = state.estimator.clone();
    let product = tokio::task::spawn_blocking(move || {
        estimator.resolve_product(&mut product);
        run(&estimator, &mut product).map(|_| product)
    })
    .await
    .map_err(|e| ApiError::internal(format!("estimation task failed: {e}")))??;

    Ok(Json(product))
}

async fn estimate_recipe(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Product>, JsonRejection>,
) -> Result<Json<Product>, ApiError> {
    run_estimate(state, payload, |estimator, product| {
        estimator.estimate_recipe(product)
    })
    .await
}

async fn estimate_recipe_simple(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Product>, JsonRejection>,
) -> Result<Json<Product>, ApiError> {
    run_estimate(state, payload, |estimator, product| {
        estimator.estimate_recipe_simple(product)
    })
    .await
}

async fn estimate_recipe_nnls(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Product>, JsonRejection>,
) -> Result<Json<Product>, ApiError> {
    run_estimate(state, payload, |estimator, product| {
        estimator.estimate_recipe_nnls(product)
    })
    .await
}

async fn get_penalties(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Product>, JsonRejection>,
) -> Result<Json<Product>, ApiError> {
    run_estimate(state, payload, |estimator, product| {
        estimator.compute_penalties(product)
    })
    .await
}

/// Free-text search over the reference foods; every whitespace-separated
/// term must match the name or the code.
async fn search_foods(
    Path(name): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Json<Vec<FoodRecord>> {
    let matches = state
        .estimator
        .reference()
        .search_foods(&name, 20)
        .into_iter()
        .cloned()
        .collect();
    Json(matches)
}

/// Fetch a product document from the upstream registry. Unknown products
/// come back as an empty object, matching the registry's own behavior.
async fn fetch_product(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, ApiError> {
    let url = format!("{}/api/v3/product/{}", state.product_base_url, id);
    let response: Value = state
        .client
        .get(&url)
        .send()
        .await
        .map_err(EstimatorError::from)?
        .json()
        .await
        .map_err(EstimatorError::from)?;

    let Some(mut product) = response.get("product").cloned() else {
        return Ok(Json(json!({})));
    };
    prune_empty_child_lists(&mut product);
    Ok(Json(product))
}

/// Registry documents mark leaves with empty child arrays; drop those so
/// the tree shape matches what the estimator emits.
fn prune_empty_child_lists(value: &mut Value) {
    let Some(ingredients) = value.get_mut("ingredients").and_then(Value::as_array_mut) else {
        return;
    };
    for ingredient in ingredients.iter_mut() {
        let empty = ingredient
            .get("ingredients")
            .and_then(Value::as_array)
            .is_some_and(|children| children.is_empty());
        if empty {
            if let Some(object) = ingredient.as_object_mut() {
                object.remove("ingredients");
            }
        } else {
            prune_empty_child_lists(ingredient);
        }
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn metrics(State(state): State<Arc<AppState>>) -> Json<Value> {
    let snapshot = state.estimator.metrics();
    Json(json!(snapshot))
}
