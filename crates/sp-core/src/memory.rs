//! In-memory implementation of the query traits.

use std::collections::HashSet;

use chrono::NaiveDate;

use crate::calendar::Granularity;
use crate::error::SourceError;
use crate::metrics::StaffingMetric;
use crate::model::{
    Contributor, EmploymentTerm, PlannedAllocation, Project, ProjectTask, TaskStatus, TimeEntry,
};
use crate::query::{MetricStore, PersistOutcome, ProjectSource, StaffingSource};
use crate::types::{ContributorId, ProfileId, ProjectId};

/// A [`StaffingSource`], [`ProjectSource`] and [`MetricStore`] backed by
/// plain vectors.
///
/// Snapshot uniqueness on `(contributor, period_start, granularity)` is
/// enforced on insert, like the `SQLite` store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    pub contributors: Vec<Contributor>,
    pub terms: Vec<EmploymentTerm>,
    pub time_entries: Vec<TimeEntry>,
    pub allocations: Vec<PlannedAllocation>,
    pub projects: Vec<Project>,
    pub tasks: Vec<ProjectTask>,
    pub metrics: Vec<StaffingMetric>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn contains_key(&self, metric: &StaffingMetric) -> bool {
        self.metrics.iter().any(|existing| {
            existing.contributor_id == metric.contributor_id
                && existing.period_start == metric.period_start
                && existing.granularity == metric.granularity
        })
    }

    fn is_active_contributor(&self, id: &ContributorId) -> bool {
        self.contributors.iter().any(|c| &c.id == id && c.active)
    }
}

impl StaffingSource for InMemoryStore {
    fn active_contributors(&self) -> Result<Vec<Contributor>, SourceError> {
        let mut active: Vec<Contributor> =
            self.contributors.iter().filter(|c| c.active).cloned().collect();
        active.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(active)
    }

    fn employment_terms(
        &self,
        contributor: &ContributorId,
    ) -> Result<Vec<EmploymentTerm>, SourceError> {
        Ok(self
            .terms
            .iter()
            .filter(|term| &term.contributor_id == contributor)
            .cloned()
            .collect())
    }

    fn time_entries(
        &self,
        contributor: &ContributorId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<TimeEntry>, SourceError> {
        Ok(self
            .time_entries
            .iter()
            .filter(|e| &e.contributor_id == contributor && e.date >= start && e.date <= end)
            .cloned()
            .collect())
    }

    fn planned_allocations(
        &self,
        contributor: &ContributorId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PlannedAllocation>, SourceError> {
        Ok(self
            .allocations
            .iter()
            .filter(|a| &a.contributor_id == contributor && a.start_date <= end && a.end_date >= start)
            .cloned()
            .collect())
    }
}

impl ProjectSource for InMemoryStore {
    fn project(&self, id: &ProjectId) -> Result<Option<Project>, SourceError> {
        Ok(self.projects.iter().find(|p| &p.id == id).cloned())
    }

    fn active_projects(&self) -> Result<Vec<Project>, SourceError> {
        let mut active: Vec<Project> = self.projects.iter().filter(|p| p.active).cloned().collect();
        active.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(active)
    }

    fn project_tasks(&self, project: &ProjectId) -> Result<Vec<ProjectTask>, SourceError> {
        let mut tasks: Vec<ProjectTask> = self
            .tasks
            .iter()
            .filter(|t| &t.project_id == project)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.id.cmp(&b.id)));
        Ok(tasks)
    }

    fn tasks_assigned_to(
        &self,
        contributor: &ContributorId,
    ) -> Result<Vec<ProjectTask>, SourceError> {
        Ok(self
            .tasks
            .iter()
            .filter(|t| {
                t.active
                    && t.status != TaskStatus::Completed
                    && t.assigned_contributor.as_ref() == Some(contributor)
            })
            .cloned()
            .collect())
    }

    fn contributors_with_profile(
        &self,
        profile: &ProfileId,
    ) -> Result<Vec<Contributor>, SourceError> {
        let holders: HashSet<&ContributorId> = self
            .terms
            .iter()
            .filter(|term| term.profiles.contains(profile))
            .map(|term| &term.contributor_id)
            .collect();
        let mut matching: Vec<Contributor> = self
            .contributors
            .iter()
            .filter(|c| c.active && holders.contains(&c.id))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matching)
    }

    fn has_project_history(
        &self,
        contributor: &ContributorId,
        project: &ProjectId,
    ) -> Result<bool, SourceError> {
        let logged = self
            .time_entries
            .iter()
            .any(|e| &e.contributor_id == contributor && &e.project_id == project);
        let allocated = self.allocations.iter().any(|a| {
            &a.contributor_id == contributor && &a.project_id == project && a.status.is_booked()
        });
        Ok(logged || allocated)
    }
}

impl MetricStore for InMemoryStore {
    fn metrics_in_range(
        &self,
        granularity: Granularity,
        start: NaiveDate,
        end: NaiveDate,
        contributor: Option<&ContributorId>,
    ) -> Result<Vec<StaffingMetric>, SourceError> {
        let mut metrics: Vec<StaffingMetric> = self
            .metrics
            .iter()
            .filter(|m| {
                m.granularity == granularity
                    && m.period_start >= start
                    && m.period_start <= end
                    && contributor.is_none_or(|id| &m.contributor_id == id)
            })
            .cloned()
            .collect();
        metrics.sort_by(|a, b| {
            a.contributor_id
                .cmp(&b.contributor_id)
                .then(a.period_start.cmp(&b.period_start))
        });
        Ok(metrics)
    }

    fn insert_metrics(&mut self, metrics: &[StaffingMetric]) -> Result<PersistOutcome, SourceError> {
        let mut outcome = PersistOutcome::default();
        for metric in metrics {
            if self.contains_key(metric) {
                outcome.duplicates += 1;
                continue;
            }
            if !self.is_active_contributor(&metric.contributor_id) {
                tracing::warn!(
                    contributor = %metric.contributor_id,
                    "skipping metric for unknown contributor"
                );
                outcome.failed += 1;
                continue;
            }
            self.metrics.push(metric.clone());
            outcome.inserted += 1;
        }
        Ok(outcome)
    }

    fn replace_metrics(
        &mut self,
        granularity: Granularity,
        start: NaiveDate,
        end: NaiveDate,
        contributors: &[ContributorId],
        metrics: &[StaffingMetric],
    ) -> Result<PersistOutcome, SourceError> {
        let before = self.metrics.len();
        self.metrics.retain(|m| {
            m.granularity != granularity
                || m.period_start < start
                || m.period_start > end
                || !contributors.contains(&m.contributor_id)
        });
        let deleted = before - self.metrics.len();
        let outcome = self.insert_metrics(metrics)?;
        Ok(PersistOutcome { deleted, ..outcome })
    }
}

#[cfg(test)]
impl InMemoryStore {
    pub(crate) fn add_contributor(&mut self, id: &str, name: &str) -> &mut Self {
        self.contributors.push(Contributor {
            id: ContributorId::new(id).unwrap(),
            name: name.to_string(),
            active: true,
        });
        self
    }

    pub(crate) fn add_term(
        &mut self,
        contributor: &str,
        weekly_hours: f64,
        work_time_percentage: f64,
        start_date: NaiveDate,
        end_date: Option<NaiveDate>,
        profiles: &[&str],
    ) -> &mut Self {
        self.terms.push(EmploymentTerm {
            contributor_id: ContributorId::new(contributor).unwrap(),
            weekly_hours,
            work_time_percentage,
            start_date,
            end_date,
            profiles: profiles.iter().map(|p| ProfileId::new(*p).unwrap()).collect(),
        });
        self
    }

    pub(crate) fn log_time(
        &mut self,
        contributor: &str,
        project: &str,
        date: NaiveDate,
        hours: f64,
    ) -> &mut Self {
        self.time_entries.push(TimeEntry {
            contributor_id: ContributorId::new(contributor).unwrap(),
            project_id: ProjectId::new(project).unwrap(),
            date,
            hours,
        });
        self
    }

    pub(crate) fn allocate(
        &mut self,
        contributor: &str,
        project: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        daily_hours: f64,
        status: crate::model::AllocationStatus,
    ) -> &mut Self {
        self.allocations.push(PlannedAllocation {
            contributor_id: ContributorId::new(contributor).unwrap(),
            project_id: ProjectId::new(project).unwrap(),
            start_date,
            end_date,
            daily_hours,
            status,
        });
        self
    }

    /// Adds an unassigned todo task with the given estimate.
    pub(crate) fn add_task(
        &mut self,
        project: &str,
        id: &str,
        required_profile: Option<&str>,
        estimated_hours: f64,
    ) -> &mut ProjectTask {
        let position = i64::try_from(self.tasks.len()).unwrap();
        self.tasks.push(ProjectTask {
            id: crate::types::TaskId::new(id).unwrap(),
            project_id: ProjectId::new(project).unwrap(),
            name: id.to_string(),
            required_profile: required_profile.map(|p| ProfileId::new(p).unwrap()),
            estimated_hours_sold: Some(estimated_hours),
            estimated_hours_revised: None,
            logged_hours: 0.0,
            active: true,
            counts_for_profitability: true,
            status: TaskStatus::Todo,
            assigned_contributor: None,
            under_resourced: false,
            position,
        });
        self.tasks.last_mut().unwrap()
    }

    pub(crate) fn add_project(&mut self, id: &str) -> &mut Self {
        self.projects.push(Project {
            id: ProjectId::new(id).unwrap(),
            name: id.to_string(),
            active: true,
            start_date: None,
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn metric(contributor: &str, start: NaiveDate, granularity: Granularity) -> StaffingMetric {
        let id = ContributorId::new(contributor).unwrap();
        StaffingMetric {
            id: StaffingMetric::snapshot_id(&id, start, granularity),
            contributor_id: id,
            period_start: start,
            period_end: start,
            granularity,
            expected_hours: 35.0,
            worked_hours: 35.0,
            planned_hours: 0.0,
            staffing_rate: Some(100.0),
            tace: Some(100.0),
            computed_at: Utc::now(),
        }
    }

    #[test]
    fn insert_skips_duplicate_keys() {
        let mut store = InMemoryStore::new();
        store.add_contributor("alice", "Alice");
        let m = metric("alice", date(2025, 1, 6), Granularity::Weekly);
        let first = store.insert_metrics(&[m.clone()]).unwrap();
        let second = store.insert_metrics(&[m]).unwrap();
        assert_eq!(first.inserted, 1);
        assert_eq!(second.duplicates, 1);
        assert_eq!(store.metrics.len(), 1);
    }

    #[test]
    fn insert_counts_unknown_contributor_as_failed() {
        let mut store = InMemoryStore::new();
        let outcome = store
            .insert_metrics(&[metric("ghost", date(2025, 1, 6), Granularity::Weekly)])
            .unwrap();
        assert_eq!(outcome.failed, 1);
        assert!(store.metrics.is_empty());
    }

    #[test]
    fn replace_only_touches_range_granularity_and_contributors() {
        let mut store = InMemoryStore::new();
        store.add_contributor("alice", "Alice");
        store.add_contributor("bob", "Bob");
        store
            .insert_metrics(&[
                metric("alice", date(2025, 1, 6), Granularity::Weekly),
                metric("alice", date(2025, 2, 3), Granularity::Weekly),
                metric("alice", date(2025, 1, 1), Granularity::Monthly),
                metric("bob", date(2025, 1, 6), Granularity::Weekly),
            ])
            .unwrap();

        let outcome = store
            .replace_metrics(
                Granularity::Weekly,
                date(2025, 1, 1),
                date(2025, 1, 31),
                &[ContributorId::new("alice").unwrap()],
                &[metric("alice", date(2025, 1, 6), Granularity::Weekly)],
            )
            .unwrap();

        assert_eq!(outcome.deleted, 1);
        assert_eq!(outcome.inserted, 1);
        assert_eq!(store.metrics.len(), 4);
        assert!(
            store
                .metrics
                .iter()
                .any(|m| m.contributor_id.as_str() == "bob")
        );
    }

    #[test]
    fn profile_lookup_returns_active_holders() {
        let mut store = InMemoryStore::new();
        store.add_contributor("alice", "Alice");
        store.add_contributor("bob", "Bob");
        store.contributors[1].active = false;
        store.add_term("alice", 35.0, 100.0, date(2024, 1, 1), None, &["backend"]);
        store.add_term("bob", 35.0, 100.0, date(2024, 1, 1), None, &["backend"]);

        let found = store
            .contributors_with_profile(&ProfileId::new("backend").unwrap())
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id.as_str(), "alice");
    }
}
