// src/core/metrics.rs - Service metrics for the estimation pipeline

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Snapshot of the service counters, exposed on the metrics endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimateMetrics {
    pub estimate_requests: u64,
    pub successful_estimates: u64,
    pub failed_estimates: u64,
    pub avg_estimate_time_ms: f64,
    pub uptime_seconds: u64,
}

pub struct MetricsCollector {
    start_time: Instant,
    requests: u64,
    successes: u64,
    failures: u64,
    avg_time_ms: f64,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            requests: 0,
            successes: 0,
            failures: 0,
            avg_time_ms: 0.0,
        }
    }

    pub fn record_estimate_start(&mut self) {
        self.requests += 1;
    }

    pub fn record_estimate_success(&mut self, duration: Duration) {
        self.successes += 1;

        // Rolling average over all successful estimates
        let total = self.successes as f64;
        let new_time = duration.as_millis() as f64;
        self.avg_time_ms = (self.avg_time_ms * (total - 1.0) + new_time) / total;
    }

    pub fn record_estimate_failure(&mut self) {
        self.failures += 1;
    }

    pub fn get_current_metrics(&self) -> EstimateMetrics {
        EstimateMetrics {
            estimate_requests: self.requests,
            successful_estimates: self.successes,
            failed_estimates: self.failures,
            avg_estimate_time_ms: self.avg_time_ms,
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    pub fn get_success_rate(&self) -> f64 {
        let total = self.successes + self.failures;
        if total == 0 {
            0.0
        } else {
            self.successes as f64 / total as f64
        }
    }
}
