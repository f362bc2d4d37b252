//! Read-only query interfaces and the snapshot store.
//!
//! The engine components never talk to a datastore directly. They are
//! generic over these traits so they can run against `sp-db`, the
//! [`InMemoryStore`](crate::memory::InMemoryStore) test fake, or any other
//! backend a caller provides.

use std::collections::HashSet;

use chrono::NaiveDate;

use crate::calendar::Granularity;
use crate::error::SourceError;
use crate::metrics::StaffingMetric;
use crate::model::{Contributor, EmploymentTerm, PlannedAllocation, Project, ProjectTask, TimeEntry};
use crate::types::{ContributorId, ProfileId, ProjectId};

/// Contributor, employment, time-logging and planning data.
pub trait StaffingSource {
    /// Returns active contributors ordered by ID.
    fn active_contributors(&self) -> Result<Vec<Contributor>, SourceError>;

    /// Returns all employment terms of a contributor.
    fn employment_terms(&self, contributor: &ContributorId)
    -> Result<Vec<EmploymentTerm>, SourceError>;

    /// Returns time entries dated within `[start, end]`.
    fn time_entries(
        &self,
        contributor: &ContributorId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<TimeEntry>, SourceError>;

    /// Returns allocations overlapping `[start, end]`, whatever their status.
    fn planned_allocations(
        &self,
        contributor: &ContributorId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PlannedAllocation>, SourceError>;
}

/// Project and task data.
pub trait ProjectSource {
    /// Looks up a project by ID.
    fn project(&self, id: &ProjectId) -> Result<Option<Project>, SourceError>;

    /// Returns active projects ordered by ID.
    fn active_projects(&self) -> Result<Vec<Project>, SourceError>;

    /// Returns all tasks of a project ordered by position then ID.
    fn project_tasks(&self, project: &ProjectId) -> Result<Vec<ProjectTask>, SourceError>;

    /// Returns active, uncompleted tasks currently assigned to a contributor.
    fn tasks_assigned_to(&self, contributor: &ContributorId)
    -> Result<Vec<ProjectTask>, SourceError>;

    /// Returns active contributors whose employment terms list `profile`.
    fn contributors_with_profile(
        &self,
        profile: &ProfileId,
    ) -> Result<Vec<Contributor>, SourceError>;

    /// Returns true when the contributor has logged time on the project or
    /// holds a non-cancelled allocation on it, at any date.
    fn has_project_history(
        &self,
        contributor: &ContributorId,
        project: &ProjectId,
    ) -> Result<bool, SourceError>;
}

/// Outcome of a snapshot write batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistOutcome {
    /// Rows written.
    pub inserted: usize,
    /// Rows skipped because the (contributor, period, granularity) key existed.
    pub duplicates: usize,
    /// Rows that failed to write; logged by the store.
    pub failed: usize,
    /// Rows removed before writing (replacement only).
    pub deleted: usize,
}

/// Persistent storage for staffing metric snapshots.
///
/// Implementations must enforce uniqueness on
/// `(contributor, period_start, granularity)`.
pub trait MetricStore {
    /// Returns snapshots of `granularity` whose period starts within
    /// `[start, end]`, optionally restricted to one contributor.
    fn metrics_in_range(
        &self,
        granularity: Granularity,
        start: NaiveDate,
        end: NaiveDate,
        contributor: Option<&ContributorId>,
    ) -> Result<Vec<StaffingMetric>, SourceError>;

    /// Returns the `(contributor, period_start)` keys that already exist.
    fn existing_metric_keys(
        &self,
        granularity: Granularity,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<HashSet<(ContributorId, NaiveDate)>, SourceError> {
        Ok(self
            .metrics_in_range(granularity, start, end, None)?
            .into_iter()
            .map(|metric| (metric.contributor_id, metric.period_start))
            .collect())
    }

    /// Inserts snapshots, skipping keys that already exist.
    ///
    /// Individual row failures are counted rather than aborting the batch.
    fn insert_metrics(&mut self, metrics: &[StaffingMetric]) -> Result<PersistOutcome, SourceError>;

    /// Deletes the snapshots of `granularity` belonging to `contributors`
    /// whose period starts within `[start, end]` and inserts `metrics`, as
    /// one atomic unit. Other contributors' snapshots are left untouched.
    fn replace_metrics(
        &mut self,
        granularity: Granularity,
        start: NaiveDate,
        end: NaiveDate,
        contributors: &[ContributorId],
        metrics: &[StaffingMetric],
    ) -> Result<PersistOutcome, SourceError>;
}
