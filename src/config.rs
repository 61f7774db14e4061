// src/config.rs - Configuration management for the recipe estimator

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub data: DataConfig,
    pub product_source: ProductSourceConfig,
    pub logging: LoggingConfig,
    pub estimator: EstimatorConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DataConfig {
    /// Prepared composition asset (JSON map of food code to record).
    pub foods_path: String,
    /// Ingredient taxonomy export (JSON map of ingredient id to entry).
    pub taxonomy_path: String,
    /// Optional nutrient map CSV; the builtin catalogue is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nutrient_map_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProductSourceConfig {
    /// Upstream product registry for the fetch endpoint.
    pub base_url: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EstimatorConfig {
    /// Seed for the evolution loop; fixed so runs are reproducible.
    pub seed: u64,
    /// Hard cap on optimizer iterations; reaching it is a warning.
    pub iteration_cap: usize,
    /// Population size per problem dimension.
    pub population_multiplier: usize,
    /// Relative spread of population energies that counts as converged.
    pub convergence_tolerance: f64,
    /// Leaf count above which trial evaluation fans out across threads.
    pub parallel_leaf_threshold: usize,
    /// Fraction of an ingredient's nominal water assumed lossable during
    /// processing; inflates the upper mass bound per leaf.
    pub water_loss_factor: f64,
    /// Countries whose labels may state gross rather than net carbohydrates.
    pub gross_carb_countries: Vec<String>,
    /// Fraction of a product's country tags that must be in the list above
    /// before carbohydrates are dropped from fitting.
    pub gross_carb_country_threshold: f64,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(anyhow!("Configuration file not found: {}", path.display()));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path.display(), e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path.display(), e))?;

        Ok(config)
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env() -> Result<Self> {
        let config_path = std::env::var("RECIPE_ESTIMATOR_CONFIG_PATH")
            .unwrap_or_else(|_| "config/default.toml".to_string());

        let mut config = Self::load_from_file(&config_path)?;
        config.apply_env_overrides();

        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("RECIPE_ESTIMATOR_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("RECIPE_ESTIMATOR_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
        if let Ok(url) = std::env::var("OPENFOODFACTS_URL") {
            self.product_source.base_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(level) = std::env::var("RECIPE_ESTIMATOR_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(seed) = std::env::var("RECIPE_ESTIMATOR_SEED") {
            if let Ok(seed) = seed.parse() {
                self.estimator.seed = seed;
            }
        }
    }

    /// Get server bind address
    pub fn get_server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow!("Invalid server port: {}", self.server.port));
        }

        if self.product_source.base_url.is_empty() {
            return Err(anyhow!("Product source base URL is empty"));
        }

        self.estimator
            .validate()
            .map_err(|e| anyhow!("Invalid estimator settings: {}", e))?;

        Ok(())
    }
}

impl EstimatorConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.iteration_cap == 0 {
            return Err("iteration cap must be greater than 0".to_string());
        }
        if self.population_multiplier == 0 {
            return Err("population multiplier must be greater than 0".to_string());
        }
        if self.convergence_tolerance <= 0.0 {
            return Err("convergence tolerance must be positive".to_string());
        }
        if !(0.0..1.0).contains(&self.water_loss_factor) {
            return Err("water loss factor must be in [0, 1)".to_string());
        }
        if !(0.0..=1.0).contains(&self.gross_carb_country_threshold) {
            return Err("gross carb country threshold must be in [0, 1]".to_string());
        }
        Ok(())
    }
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            iteration_cap: 5000,
            population_multiplier: 15,
            convergence_tolerance: 0.01,
            parallel_leaf_threshold: 10,
            water_loss_factor: 0.5,
            gross_carb_countries: vec![
                "en:united-states".to_string(),
                "en:canada".to_string(),
                "en:south-africa".to_string(),
                "en:bahrain".to_string(),
                "en:kuwait".to_string(),
                "en:iraq".to_string(),
                "en:iran".to_string(),
                "en:oman".to_string(),
                "en:qatar".to_string(),
                "en:saudi-arabia".to_string(),
                "en:united-arab-emirates".to_string(),
            ],
            gross_carb_country_threshold: 0.5,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
                cors_origins: vec!["*".to_string()],
            },
            data: DataConfig {
                foods_path: "assets/ciqual_foods.json".to_string(),
                taxonomy_path: "assets/ingredients.json".to_string(),
                nutrient_map_path: Some("assets/nutrient_map.csv".to_string()),
            },
            product_source: ProductSourceConfig {
                base_url: "https://world.openfoodfacts.net".to_string(),
                timeout_seconds: 30,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
            estimator: EstimatorConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.estimator.iteration_cap, 5000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let serialized = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();

        assert_eq!(config.server.port, deserialized.server.port);
        assert_eq!(
            config.estimator.gross_carb_countries,
            deserialized.estimator.gross_carb_countries
        );
    }

    #[test]
    fn test_config_from_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("test_config.toml");

        let config_content = r#"
[server]
host = "127.0.0.1"
port = 9000
cors_origins = ["http://test.com"]

[data]
foods_path = "fixtures/foods.json"
taxonomy_path = "fixtures/ingredients.json"

[product_source]
base_url = "https://products.example.org"
timeout_seconds = 10

[logging]
level = "debug"

[estimator]
seed = 7
iteration_cap = 1000
population_multiplier = 20
convergence_tolerance = 0.05
parallel_leaf_threshold = 4
water_loss_factor = 0.5
gross_carb_countries = ["en:united-states"]
gross_carb_country_threshold = 0.5
        "#;

        fs::write(&config_path, config_content).unwrap();

        let config = Config::load_from_file(&config_path).unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.data.foods_path, "fixtures/foods.json");
        assert!(config.data.nutrient_map_path.is_none());
        assert_eq!(config.estimator.seed, 7);
        assert_eq!(config.estimator.iteration_cap, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_estimator_settings() {
        let mut config = Config::default();
        config.estimator.water_loss_factor = 1.5;
        assert!(config.validate().is_err());
    }
}
