//! Configuration loading and management.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use sp_core::{
    AdvisorConfig, AssignmentAdvisor, ClassificationThresholds, EngineError, Granularity,
    MetricsCalculator, MetricsConfig, RebalancingRecommender, RecommenderConfig, WorkingTime,
    WorkloadBounds, WorkloadClassifier,
};

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,
    pub thresholds: ThresholdConfig,
    pub scheduling: SchedulingConfig,
    /// Contributors or tasks processed per batch.
    pub batch_size: usize,
    /// Snapshot granularity read by workload analysis and recommendations.
    pub classification_granularity: Granularity,
}

/// TACE bounds in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub critical: f64,
    pub overloaded: f64,
    pub underutilized: f64,
    /// Below this TACE an underutilized contributor is a high-severity finding.
    pub severe_underutilization: f64,
}

/// Working calendar and assignment search settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingConfig {
    pub horizon_days: u32,
    pub days_per_week: u32,
    pub hours_per_day: f64,
    pub min_availability: f64,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("sp.db"),
            thresholds: ThresholdConfig::default(),
            scheduling: SchedulingConfig::default(),
            batch_size: RecommenderConfig::default().batch_size,
            classification_granularity: Granularity::Weekly,
        }
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        let bounds = WorkloadBounds::default();
        Self {
            critical: bounds.critical,
            overloaded: bounds.overloaded,
            underutilized: bounds.underutilized,
            severe_underutilization: RecommenderConfig::default().severe_underutilization,
        }
    }
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        let advisor = AdvisorConfig::default();
        Self {
            horizon_days: advisor.horizon_days,
            days_per_week: advisor.working_time.days_per_week,
            hours_per_day: advisor.working_time.hours_per_day,
            min_availability: advisor.min_availability,
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (SP_*, nested keys split on __)
        figment = figment.merge(Env::prefixed("SP_").split("__"));

        figment.extract()
    }

    pub const fn working_time(&self) -> WorkingTime {
        WorkingTime {
            days_per_week: self.scheduling.days_per_week,
            hours_per_day: self.scheduling.hours_per_day,
        }
    }

    pub const fn bounds(&self) -> WorkloadBounds {
        WorkloadBounds {
            critical: self.thresholds.critical,
            overloaded: self.thresholds.overloaded,
            underutilized: self.thresholds.underutilized,
        }
    }

    /// Builds the metrics calculator; `as_of` splits logged from planned days.
    pub fn metrics_calculator(&self, as_of: NaiveDate) -> MetricsCalculator {
        MetricsCalculator::new(MetricsConfig {
            working_time: self.working_time(),
            batch_size: self.batch_size,
            as_of,
        })
    }

    /// Fails when the configured bounds are not strictly increasing.
    pub fn classifier(&self) -> Result<WorkloadClassifier, EngineError> {
        let thresholds = ClassificationThresholds::from_bounds(self.bounds())?;
        Ok(WorkloadClassifier::new(
            thresholds,
            self.classification_granularity,
        ))
    }

    pub fn recommender(&self) -> Result<RebalancingRecommender, EngineError> {
        let config = RecommenderConfig {
            severe_underutilization: self.thresholds.severe_underutilization,
            batch_size: self.batch_size,
            working_time: self.working_time(),
            ..RecommenderConfig::default()
        };
        Ok(RebalancingRecommender::new(self.classifier()?, config))
    }

    pub fn advisor(&self) -> AssignmentAdvisor {
        AssignmentAdvisor::new(AdvisorConfig {
            working_time: self.working_time(),
            horizon_days: self.scheduling.horizon_days,
            min_availability: self.scheduling.min_availability,
            batch_size: self.batch_size,
            ..AdvisorConfig::default()
        })
    }
}

/// Returns the platform-specific config directory for sp.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("sp"))
}

/// Returns the platform-specific data directory for sp.
///
/// On Linux: `~/.local/share/sp`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("sp"))
}
