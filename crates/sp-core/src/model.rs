//! Input records owned by external collaborators.
//!
//! These are the shapes the engine reads: contributors and their employment
//! terms, logged time, planned allocations, and project tasks. None of them
//! are written by the engine.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::calendar::WorkingTime;
use crate::types::{ContributorId, ProfileId, ProjectId, TaskId};

/// A person whose time is tracked and planned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    pub id: ContributorId,
    pub name: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

/// Contractual working terms for a contributor over a date window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmploymentTerm {
    pub contributor_id: ContributorId,
    /// Full-time weekly hours (e.g. 35).
    pub weekly_hours: f64,
    /// Share of full time actually worked, in percent (e.g. 80 for 4/5).
    #[serde(default = "default_work_time_percentage")]
    pub work_time_percentage: f64,
    pub start_date: NaiveDate,
    /// Open-ended when absent.
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    /// Profiles (skills) the contributor holds under this term.
    #[serde(default)]
    pub profiles: BTreeSet<ProfileId>,
}

impl EmploymentTerm {
    /// Returns true if the term covers `date` (inclusive on both ends).
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        if date < self.start_date {
            return false;
        }
        self.end_date.is_none_or(|end| date <= end)
    }

    /// Returns true if the term overlaps `[start, end]`.
    pub fn overlaps(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.start_date <= end && self.end_date.is_none_or(|term_end| term_end >= start)
    }

    /// Contractual hours per working day.
    pub fn daily_capacity(&self, working_time: &WorkingTime) -> f64 {
        let weekly = self.weekly_hours * (self.work_time_percentage / 100.0);
        weekly / f64::from(working_time.effective_days_per_week())
    }
}

/// Hours logged by a contributor on a project for one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeEntry {
    pub contributor_id: ContributorId,
    pub project_id: ProjectId,
    pub date: NaiveDate,
    pub hours: f64,
}

/// Lifecycle of a planned allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationStatus {
    Planned,
    Confirmed,
    Cancelled,
}

impl AllocationStatus {
    /// String representation for database storage.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Planned and confirmed allocations reserve capacity; cancelled ones don't.
    pub const fn is_booked(self) -> bool {
        matches!(self, Self::Planned | Self::Confirmed)
    }
}

impl fmt::Display for AllocationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AllocationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planned" => Ok(Self::Planned),
            "confirmed" => Ok(Self::Confirmed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown allocation status: {other}")),
        }
    }
}

/// Daily hours reserved for a contributor on a project over a date window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedAllocation {
    pub contributor_id: ContributorId,
    pub project_id: ProjectId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub daily_hours: f64,
    pub status: AllocationStatus,
}

impl PlannedAllocation {
    /// Hours booked on `date`, or zero when the allocation doesn't apply.
    ///
    /// Non-working days never carry booked hours.
    pub fn booked_hours_on(&self, date: NaiveDate, working_time: &WorkingTime) -> f64 {
        if !self.status.is_booked()
            || date < self.start_date
            || date > self.end_date
            || !working_time.is_working_day(date)
        {
            return 0.0;
        }
        self.daily_hours
    }
}

/// A project grouping tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
}

/// Progress state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Completed,
}

impl TaskStatus {
    /// String representation for database storage.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todo" => Ok(Self::Todo),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// A unit of project work that can be assigned to a contributor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectTask {
    pub id: TaskId,
    pub project_id: ProjectId,
    pub name: String,
    #[serde(default)]
    pub required_profile: Option<ProfileId>,
    #[serde(default)]
    pub estimated_hours_sold: Option<f64>,
    #[serde(default)]
    pub estimated_hours_revised: Option<f64>,
    /// Hours already spent on the task.
    #[serde(default)]
    pub logged_hours: f64,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default = "default_true")]
    pub counts_for_profitability: bool,
    #[serde(default = "default_task_status")]
    pub status: TaskStatus,
    #[serde(default)]
    pub assigned_contributor: Option<ContributorId>,
    /// Set when the task has an assignee but needs more hands.
    #[serde(default)]
    pub under_resourced: bool,
    #[serde(default)]
    pub position: i64,
}

impl ProjectTask {
    /// Estimated hours, preferring the revised figure over the sold one.
    pub fn estimated_hours(&self) -> Option<f64> {
        self.estimated_hours_revised.or(self.estimated_hours_sold)
    }

    /// Estimated hours left to deliver, never negative.
    pub fn remaining_hours(&self) -> f64 {
        self.estimated_hours()
            .map_or(0.0, |estimate| (estimate - self.logged_hours).max(0.0))
    }

    /// Returns true if the task should receive an assignment suggestion.
    pub fn needs_assignment(&self) -> bool {
        self.active
            && self.counts_for_profitability
            && self.status != TaskStatus::Completed
            && (self.assigned_contributor.is_none() || self.under_resourced)
    }
}

const fn default_true() -> bool {
    true
}

const fn default_work_time_percentage() -> f64 {
    100.0
}

const fn default_task_status() -> TaskStatus {
    TaskStatus::Todo
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn term(start: NaiveDate, end: Option<NaiveDate>) -> EmploymentTerm {
        EmploymentTerm {
            contributor_id: ContributorId::new("alice").unwrap(),
            weekly_hours: 35.0,
            work_time_percentage: 80.0,
            start_date: start,
            end_date: end,
            profiles: BTreeSet::new(),
        }
    }

    fn task() -> ProjectTask {
        ProjectTask {
            id: TaskId::new("t1").unwrap(),
            project_id: ProjectId::new("p1").unwrap(),
            name: "API".to_string(),
            required_profile: None,
            estimated_hours_sold: Some(40.0),
            estimated_hours_revised: None,
            logged_hours: 0.0,
            active: true,
            counts_for_profitability: true,
            status: TaskStatus::Todo,
            assigned_contributor: None,
            under_resourced: false,
            position: 0,
        }
    }

    #[test]
    fn term_activity_is_inclusive() {
        let t = term(date(2025, 1, 6), Some(date(2025, 1, 10)));
        assert!(!t.is_active_on(date(2025, 1, 5)));
        assert!(t.is_active_on(date(2025, 1, 6)));
        assert!(t.is_active_on(date(2025, 1, 10)));
        assert!(!t.is_active_on(date(2025, 1, 11)));
    }

    #[test]
    fn open_ended_term_overlaps_future() {
        let t = term(date(2025, 1, 6), None);
        assert!(t.overlaps(date(2030, 1, 1), date(2030, 1, 31)));
        assert!(!t.overlaps(date(2024, 12, 1), date(2024, 12, 31)));
    }

    #[test]
    fn daily_capacity_applies_work_time_percentage() {
        let t = term(date(2025, 1, 6), None);
        let capacity = t.daily_capacity(&WorkingTime::default());
        assert!((capacity - 5.6).abs() < 1e-9);
    }

    #[test]
    fn cancelled_allocation_books_nothing() {
        let alloc = PlannedAllocation {
            contributor_id: ContributorId::new("alice").unwrap(),
            project_id: ProjectId::new("p1").unwrap(),
            start_date: date(2025, 1, 6),
            end_date: date(2025, 1, 10),
            daily_hours: 4.0,
            status: AllocationStatus::Cancelled,
        };
        let wt = WorkingTime::default();
        assert!(alloc.booked_hours_on(date(2025, 1, 7), &wt).abs() < f64::EPSILON);
        let confirmed = PlannedAllocation {
            status: AllocationStatus::Confirmed,
            ..alloc
        };
        assert!((confirmed.booked_hours_on(date(2025, 1, 7), &wt) - 4.0).abs() < f64::EPSILON);
        assert!(confirmed.booked_hours_on(date(2025, 1, 11), &wt).abs() < f64::EPSILON);
    }

    #[test]
    fn remaining_hours_prefers_revised_estimate() {
        let mut t = task();
        t.estimated_hours_revised = Some(30.0);
        t.logged_hours = 10.0;
        assert!((t.remaining_hours() - 20.0).abs() < f64::EPSILON);
        t.logged_hours = 50.0;
        assert!(t.remaining_hours().abs() < f64::EPSILON);
    }

    #[test]
    fn completed_or_assigned_tasks_need_no_assignment() {
        let mut t = task();
        assert!(t.needs_assignment());
        t.assigned_contributor = Some(ContributorId::new("bob").unwrap());
        assert!(!t.needs_assignment());
        t.under_resourced = true;
        assert!(t.needs_assignment());
        t.status = TaskStatus::Completed;
        assert!(!t.needs_assignment());
    }

    #[test]
    fn task_deserializes_with_defaults() {
        let t: ProjectTask =
            serde_json::from_str(r#"{"id":"t9","project_id":"p1","name":"Docs"}"#).unwrap();
        assert!(t.active);
        assert!(t.counts_for_profitability);
        assert_eq!(t.status, TaskStatus::Todo);
        assert!(t.estimated_hours().is_none());
    }
}
