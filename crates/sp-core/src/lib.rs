//! Staffing and planning engine.
//!
//! This crate contains the domain types and the four planning components:
//! - Metrics: per-contributor, per-period utilization snapshots (staffing rate and TACE)
//! - Workload: classification of contributors into workload-risk buckets
//! - Recommend: prioritized rebalancing recommendations
//! - Assign: dated task-to-contributor suggestions with a confidence score
//!
//! Components read their inputs through the traits in [`query`], so they run
//! the same against `SQLite` or the [`InMemoryStore`].

pub mod assign;
pub mod calendar;
mod error;
pub mod memory;
pub mod metrics;
pub mod model;
pub mod query;
pub mod recommend;
pub mod types;
pub mod workload;

pub use assign::{
    AdvisorConfig, AssignmentAdvisor, AssignmentPlan, AssignmentStatistics, AssignmentSuggestion,
    ConfidenceWeights, UnassignedTask,
};
pub use calendar::{Granularity, Period, UnknownGranularity, WorkingTime};
pub use error::{EngineError, SourceError};
pub use memory::InMemoryStore;
pub use metrics::{MetricsCalculator, MetricsConfig, MetricsRunSummary, StaffingMetric};
pub use model::{
    AllocationStatus, Contributor, EmploymentTerm, PlannedAllocation, Project, ProjectTask,
    TaskStatus, TimeEntry,
};
pub use query::{MetricStore, PersistOutcome, ProjectSource, StaffingSource};
pub use recommend::{
    RebalancingRecommender, Recommendation, RecommendationKind, RecommendationReport,
    RecommendationSummary, RecommenderConfig, SeverityLevel,
};
pub use types::{Confidence, ContributorId, ProfileId, ProjectId, TaskId, ValidationError};
pub use workload::{
    ClassificationThresholds, WorkloadAnalysis, WorkloadBounds, WorkloadClassification,
    WorkloadClassifier, WorkloadStatus,
};
