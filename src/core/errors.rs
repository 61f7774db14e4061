// src/core/errors.rs - Core error types for the recipe estimator

use thiserror::Error;

/// Core system errors
#[derive(Error, Debug)]
pub enum EstimatorError {
    #[error("Invalid product document: {0}")]
    InvalidProduct(String),

    #[error("Reference data error: {0}")]
    ReferenceData(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, EstimatorError>;

impl EstimatorError {
    pub fn invalid_product(msg: impl Into<String>) -> Self {
        Self::InvalidProduct(msg.into())
    }

    pub fn reference_data(msg: impl Into<String>) -> Self {
        Self::ReferenceData(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
