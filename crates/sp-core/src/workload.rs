//! Workload-risk classification.
//!
//! Classification is a data table: an ordered list of [`ThresholdRule`]s,
//! each a half-open TACE interval `[lower, upper)` mapped to a status. The
//! first matching rule wins. With the default bounds:
//!
//! | TACE            | Status        |
//! |-----------------|---------------|
//! | `>= 110`        | critical      |
//! | `[90, 110)`     | overloaded    |
//! | `[70, 90)`      | optimal       |
//! | `< 70`          | underutilized |

use std::collections::HashMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::calendar::Granularity;
use crate::error::{EngineError, validate_range};
use crate::metrics::StaffingMetric;
use crate::model::Contributor;
use crate::query::{MetricStore, StaffingSource};
use crate::types::{ContributorId, round2};

/// Workload-risk bucket for a contributor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadStatus {
    Critical,
    Overloaded,
    Optimal,
    Underutilized,
}

impl WorkloadStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Overloaded => "overloaded",
            Self::Optimal => "optimal",
            Self::Underutilized => "underutilized",
        }
    }
}

impl fmt::Display for WorkloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One row of the classification table: `lower <= tace < upper`.
///
/// A missing bound is unbounded on that side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRule {
    pub lower: Option<f64>,
    pub upper: Option<f64>,
    pub status: WorkloadStatus,
}

impl ThresholdRule {
    pub fn matches(&self, tace: f64) -> bool {
        self.lower.is_none_or(|lower| tace >= lower) && self.upper.is_none_or(|upper| tace < upper)
    }
}

/// TACE bounds separating the four statuses, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadBounds {
    /// At or above: critical. Default: 110.
    pub critical: f64,
    /// At or above (and below critical): overloaded. Default: 90.
    pub overloaded: f64,
    /// Below: underutilized. Default: 70.
    pub underutilized: f64,
}

impl Default for WorkloadBounds {
    fn default() -> Self {
        Self {
            critical: 110.0,
            overloaded: 90.0,
            underutilized: 70.0,
        }
    }
}

impl WorkloadBounds {
    /// Centre of the optimal band.
    pub fn ideal(&self) -> f64 {
        f64::midpoint(self.overloaded, self.underutilized)
    }
}

/// Ordered, validated classification table.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationThresholds {
    bounds: WorkloadBounds,
    rules: Vec<ThresholdRule>,
}

impl ClassificationThresholds {
    /// Builds the four-row table from bounds.
    ///
    /// Bounds must be finite and strictly increasing
    /// (`underutilized < overloaded < critical`).
    pub fn from_bounds(bounds: WorkloadBounds) -> Result<Self, EngineError> {
        let WorkloadBounds {
            critical,
            overloaded,
            underutilized,
        } = bounds;
        if ![critical, overloaded, underutilized].iter().all(|b| b.is_finite()) {
            return Err(EngineError::InvalidThresholds(
                "bounds must be finite numbers".to_string(),
            ));
        }
        if !(underutilized < overloaded && overloaded < critical) {
            return Err(EngineError::InvalidThresholds(format!(
                "expected underutilized < overloaded < critical, got {underutilized} / {overloaded} / {critical}"
            )));
        }
        Ok(Self {
            bounds,
            rules: Self::rules_for(&bounds),
        })
    }

    fn rules_for(bounds: &WorkloadBounds) -> Vec<ThresholdRule> {
        vec![
            ThresholdRule {
                lower: Some(bounds.critical),
                upper: None,
                status: WorkloadStatus::Critical,
            },
            ThresholdRule {
                lower: Some(bounds.overloaded),
                upper: Some(bounds.critical),
                status: WorkloadStatus::Overloaded,
            },
            ThresholdRule {
                lower: Some(bounds.underutilized),
                upper: Some(bounds.overloaded),
                status: WorkloadStatus::Optimal,
            },
            ThresholdRule {
                lower: None,
                upper: Some(bounds.underutilized),
                status: WorkloadStatus::Underutilized,
            },
        ]
    }

    pub const fn bounds(&self) -> &WorkloadBounds {
        &self.bounds
    }

    pub fn rules(&self) -> &[ThresholdRule] {
        &self.rules
    }

    /// Returns the status of the first rule matching `tace`.
    ///
    /// Only non-finite values match no rule.
    pub fn classify(&self, tace: f64) -> Option<WorkloadStatus> {
        self.rules
            .iter()
            .find(|rule| rule.matches(tace))
            .map(|rule| rule.status)
    }
}

impl Default for ClassificationThresholds {
    fn default() -> Self {
        let bounds = WorkloadBounds::default();
        Self {
            rules: Self::rules_for(&bounds),
            bounds,
        }
    }
}

/// Classification of one contributor over the analyzed window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkloadClassification {
    pub contributor: Contributor,
    /// Mean TACE of the applicable snapshots, rounded to two decimals.
    pub tace: f64,
    pub status: WorkloadStatus,
    /// Signed distance from the centre of the optimal band.
    pub deviation: f64,
    /// Number of snapshots the TACE was averaged over.
    pub snapshots: usize,
}

/// Contributors bucketed by workload status.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkloadAnalysis {
    /// Sorted by TACE descending.
    pub critical: Vec<WorkloadClassification>,
    /// Sorted by TACE descending.
    pub overloaded: Vec<WorkloadClassification>,
    /// Sorted by contributor ID.
    pub optimal: Vec<WorkloadClassification>,
    /// Sorted by TACE ascending.
    pub underutilized: Vec<WorkloadClassification>,
}

impl WorkloadAnalysis {
    pub fn bucket(&self, status: WorkloadStatus) -> &[WorkloadClassification] {
        match status {
            WorkloadStatus::Critical => &self.critical,
            WorkloadStatus::Overloaded => &self.overloaded,
            WorkloadStatus::Optimal => &self.optimal,
            WorkloadStatus::Underutilized => &self.underutilized,
        }
    }

    /// Number of classified contributors.
    pub fn total(&self) -> usize {
        self.critical.len() + self.overloaded.len() + self.optimal.len() + self.underutilized.len()
    }

    /// Iterates every classification, critical first.
    pub fn iter(&self) -> impl Iterator<Item = &WorkloadClassification> {
        self.critical
            .iter()
            .chain(&self.overloaded)
            .chain(&self.optimal)
            .chain(&self.underutilized)
    }

    fn push(&mut self, classification: WorkloadClassification) {
        match classification.status {
            WorkloadStatus::Critical => self.critical.push(classification),
            WorkloadStatus::Overloaded => self.overloaded.push(classification),
            WorkloadStatus::Optimal => self.optimal.push(classification),
            WorkloadStatus::Underutilized => self.underutilized.push(classification),
        }
    }

    fn sort(&mut self) {
        let by_tace_desc = |a: &WorkloadClassification, b: &WorkloadClassification| {
            b.tace
                .total_cmp(&a.tace)
                .then_with(|| a.contributor.id.cmp(&b.contributor.id))
        };
        self.critical.sort_by(by_tace_desc);
        self.overloaded.sort_by(by_tace_desc);
        self.optimal
            .sort_by(|a, b| a.contributor.id.cmp(&b.contributor.id));
        self.underutilized.sort_by(|a, b| {
            a.tace
                .total_cmp(&b.tace)
                .then_with(|| a.contributor.id.cmp(&b.contributor.id))
        });
    }
}

/// Buckets contributors by the TACE of their stored snapshots.
#[derive(Debug, Clone)]
pub struct WorkloadClassifier {
    thresholds: ClassificationThresholds,
    granularity: Granularity,
}

impl Default for WorkloadClassifier {
    fn default() -> Self {
        Self::new(ClassificationThresholds::default(), Granularity::Weekly)
    }
}

impl WorkloadClassifier {
    pub const fn new(thresholds: ClassificationThresholds, granularity: Granularity) -> Self {
        Self {
            thresholds,
            granularity,
        }
    }

    pub const fn thresholds(&self) -> &ClassificationThresholds {
        &self.thresholds
    }

    /// Snapshot granularity read by the classifier. Default: weekly.
    pub const fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Classifies one contributor from their snapshots.
    ///
    /// Returns `None` when no snapshot has an applicable TACE.
    pub fn classify_contributor(
        &self,
        contributor: &Contributor,
        metrics: &[StaffingMetric],
    ) -> Option<WorkloadClassification> {
        let values: Vec<f64> = metrics.iter().filter_map(|m| m.tace).collect();
        if values.is_empty() {
            return None;
        }
        #[expect(clippy::cast_precision_loss, reason = "snapshot counts are small")]
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let tace = round2(mean);
        let status = self.thresholds.classify(tace)?;
        Some(WorkloadClassification {
            contributor: contributor.clone(),
            tace,
            status,
            deviation: round2(tace - self.thresholds.bounds().ideal()),
            snapshots: values.len(),
        })
    }

    /// Classifies every active contributor with at least one applicable
    /// snapshot whose period starts in the window.
    ///
    /// The window is widened to the start of the period containing
    /// `start`, so a partially covered first period still counts.
    /// Contributors whose snapshots are all not applicable are left out.
    pub fn analyze_all_contributors<S>(
        &self,
        source: &S,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<WorkloadAnalysis, EngineError>
    where
        S: StaffingSource + MetricStore,
    {
        validate_range(start, end)?;
        let granularity = self.granularity();
        let window_start = granularity.period_containing(start).start;

        let mut by_contributor: HashMap<ContributorId, Vec<StaffingMetric>> = HashMap::new();
        for metric in source.metrics_in_range(granularity, window_start, end, None)? {
            by_contributor
                .entry(metric.contributor_id.clone())
                .or_default()
                .push(metric);
        }

        let contributors = source.active_contributors()?;
        let mut analysis = WorkloadAnalysis::default();
        let mut excluded = 0usize;
        for contributor in &contributors {
            let metrics = by_contributor
                .get(&contributor.id)
                .map_or(&[][..], Vec::as_slice);
            match self.classify_contributor(contributor, metrics) {
                Some(classification) => analysis.push(classification),
                None => excluded += 1,
            }
        }
        analysis.sort();

        tracing::debug!(
            %granularity,
            classified = analysis.total(),
            excluded,
            critical = analysis.critical.len(),
            overloaded = analysis.overloaded.len(),
            underutilized = analysis.underutilized.len(),
            "workload analysis complete"
        );
        Ok(analysis)
    }
}
