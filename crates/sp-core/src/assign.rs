//! Task-to-contributor assignment suggestions.
//!
//! For each task that needs hands, every eligible contributor is evaluated
//! for the earliest slot in the scheduling horizon, scored, and the best
//! match is kept. Accepted suggestions are booked into a run-local overlay
//! so later tasks in the same run see that capacity as taken.
//!
//! # Confidence
//!
//! ```text
//! confidence = 0.4 × profile_match + 0.3 × health + 0.3 × fit (+ 0.05 familiarity)
//! ```
//!
//! - `profile_match` is 1.0 when the contributor holds the required profile
//!   and 0.6 when the task names none.
//! - `health` is 1.0 at or below `healthy_load`, 0.0 at or above
//!   `overloaded_load`, linear in between. Load is booked hours over
//!   capacity across the proposed span, before the proposal.
//! - `fit` is the share of span days where the proposal fits in spare
//!   capacity, reduced by up to a quarter for slots late in the horizon.
//! - The familiarity bonus applies when the contributor has logged time on
//!   the project or holds a non-cancelled allocation on it, at any date.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::calendar::WorkingTime;
use crate::error::EngineError;
use crate::model::{AllocationStatus, Contributor, EmploymentTerm, PlannedAllocation, ProjectTask};
use crate::query::{ProjectSource, StaffingSource};
use crate::types::{Confidence, ContributorId, ProfileId, ProjectId, TaskId, round2};

const FAMILIARITY_BONUS: f64 = 0.05;
const UNSPECIFIED_PROFILE_MATCH: f64 = 0.6;
const MAX_DELAY_PENALTY: f64 = 0.25;

/// Blend weights for the confidence score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceWeights {
    pub profile_match: f64,
    pub health: f64,
    pub fit: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            profile_match: 0.4,
            health: 0.3,
            fit: 0.3,
        }
    }
}

/// Configuration for the assignment advisor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdvisorConfig {
    pub working_time: WorkingTime,
    /// Calendar days searched for a free slot. Default: 60.
    pub horizon_days: u32,
    /// Share of daily capacity that must be free on the first day. Default: 0.2.
    pub min_availability: f64,
    /// Load at or below which health is full. Default: 0.7.
    pub healthy_load: f64,
    /// Load at or above which health is zero. Default: 1.1.
    pub overloaded_load: f64,
    pub weights: ConfidenceWeights,
    /// Tasks evaluated per chunk. Default: 50.
    pub batch_size: usize,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            working_time: WorkingTime::default(),
            horizon_days: 60,
            min_availability: 0.2,
            healthy_load: 0.7,
            overloaded_load: 1.1,
            weights: ConfidenceWeights::default(),
            batch_size: crate::metrics::DEFAULT_BATCH_SIZE,
        }
    }
}

/// A proposed assignment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignmentSuggestion {
    pub task_id: TaskId,
    pub task_name: String,
    pub contributor: ContributorId,
    pub start_date: NaiveDate,
    /// Inclusive.
    pub end_date: NaiveDate,
    pub daily_hours: f64,
    pub confidence: Confidence,
    pub reasoning: String,
}

/// A task no contributor could be matched to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnassignedTask {
    pub task_id: TaskId,
    pub task_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AssignmentStatistics {
    pub total_tasks: usize,
    pub assigned_tasks: usize,
    pub unassigned_tasks: usize,
    /// Exact mean of suggestion confidences, 0 when there are none.
    pub average_confidence: f64,
}

/// Suggestions for one project.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignmentPlan {
    pub project_id: ProjectId,
    /// Sorted by confidence descending, then task ID.
    pub suggestions: Vec<AssignmentSuggestion>,
    pub unassigned: Vec<UnassignedTask>,
    pub statistics: AssignmentStatistics,
}

/// A contributor's data for the planning window, plus run-local bookings.
#[derive(Debug)]
struct CandidateState {
    contributor: Contributor,
    terms: Vec<EmploymentTerm>,
    allocations: Vec<PlannedAllocation>,
    familiar: bool,
}

impl CandidateState {
    fn term_on(&self, day: NaiveDate) -> Option<&EmploymentTerm> {
        self.terms
            .iter()
            .filter(|term| term.is_active_on(day))
            .max_by_key(|term| term.start_date)
    }

    fn booked_on(&self, day: NaiveDate, working_time: &WorkingTime) -> f64 {
        self.allocations
            .iter()
            .map(|alloc| alloc.booked_hours_on(day, working_time))
            .sum()
    }
}

#[derive(Debug)]
struct Evaluation {
    start: NaiveDate,
    end: NaiveDate,
    daily_hours: f64,
    confidence: Confidence,
    reasoning: String,
}

/// Matches unassigned and under-resourced tasks to contributors.
#[derive(Debug, Clone, Default)]
pub struct AssignmentAdvisor {
    config: AdvisorConfig,
}

impl AssignmentAdvisor {
    pub const fn new(config: AdvisorConfig) -> Self {
        Self { config }
    }

    pub const fn config(&self) -> &AdvisorConfig {
        &self.config
    }

    /// Builds an assignment plan for `project_id`, searching for slots from
    /// `preferred_start` (or the project start, if later).
    ///
    /// Tasks without remaining hours or without any eligible contributor
    /// with capacity land in [`AssignmentPlan::unassigned`].
    pub fn generate_suggestions<S>(
        &self,
        source: &S,
        project_id: &ProjectId,
        preferred_start: NaiveDate,
    ) -> Result<AssignmentPlan, EngineError>
    where
        S: StaffingSource + ProjectSource,
    {
        let project = source
            .project(project_id)?
            .ok_or_else(|| EngineError::ProjectNotFound(project_id.clone()))?;
        let window_start = project
            .start_date
            .map_or(preferred_start, |start| start.max(preferred_start));
        let horizon_end = window_start + Days::new(u64::from(self.config.horizon_days.max(1) - 1));

        let mut tasks: Vec<ProjectTask> = source
            .project_tasks(project_id)?
            .into_iter()
            .filter(ProjectTask::needs_assignment)
            .collect();
        tasks.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.id.cmp(&b.id)));

        // A span may start on the last horizon day and run past it.
        let wt = &self.config.working_time;
        let longest_span = tasks
            .iter()
            .map(|task| wt.days_for_hours(task.remaining_hours()))
            .max()
            .unwrap_or(0)
            .max(1);
        let fetch_end = wt.add_working_days(horizon_end, longest_span);

        tracing::debug!(
            project = %project_id,
            tasks = tasks.len(),
            %window_start,
            %horizon_end,
            %fetch_end,
            "planning assignments"
        );

        let mut states: HashMap<ContributorId, CandidateState> = HashMap::new();
        let mut suggestions = Vec::new();
        let mut unassigned = Vec::new();

        for chunk in tasks.chunks(self.config.batch_size.max(1)) {
            for task in chunk {
                let remaining = task.remaining_hours();
                if remaining <= 0.0 {
                    unassigned.push(unassigned_task(task, "no remaining estimated hours"));
                    continue;
                }

                let pool = match &task.required_profile {
                    Some(profile) => source.contributors_with_profile(profile)?,
                    None => source.active_contributors()?,
                };
                let pool: Vec<Contributor> = pool
                    .into_iter()
                    .filter(|c| task.assigned_contributor.as_ref() != Some(&c.id))
                    .collect();
                if pool.is_empty() {
                    let reason = task.required_profile.as_ref().map_or_else(
                        || "no active contributor available".to_string(),
                        |profile| format!("no active contributor holds profile {profile}"),
                    );
                    unassigned.push(unassigned_task(task, &reason));
                    continue;
                }

                let mut best: Option<(ContributorId, Evaluation)> = None;
                for contributor in pool {
                    let state = match states.entry(contributor.id.clone()) {
                        Entry::Occupied(entry) => entry.into_mut(),
                        Entry::Vacant(entry) => entry.insert(load_state(
                            source,
                            contributor.clone(),
                            project_id,
                            window_start,
                            fetch_end,
                        )?),
                    };
                    let Some(evaluation) = self.evaluate(
                        state,
                        remaining,
                        task.required_profile.as_ref(),
                        window_start,
                        horizon_end,
                    ) else {
                        continue;
                    };
                    let better = best.as_ref().is_none_or(|(best_id, best_eval)| {
                        evaluation
                            .confidence
                            .value()
                            .total_cmp(&best_eval.confidence.value())
                            .then_with(|| best_id.cmp(&contributor.id))
                            .is_gt()
                    });
                    if better {
                        best = Some((contributor.id, evaluation));
                    }
                }

                let Some((contributor_id, evaluation)) = best else {
                    let reason = format!(
                        "no eligible contributor has capacity within the {}-day horizon",
                        self.config.horizon_days
                    );
                    unassigned.push(unassigned_task(task, &reason));
                    continue;
                };

                if let Some(state) = states.get_mut(&contributor_id) {
                    state.allocations.push(PlannedAllocation {
                        contributor_id: contributor_id.clone(),
                        project_id: project_id.clone(),
                        start_date: evaluation.start,
                        end_date: evaluation.end,
                        daily_hours: evaluation.daily_hours,
                        status: AllocationStatus::Planned,
                    });
                }
                suggestions.push(AssignmentSuggestion {
                    task_id: task.id.clone(),
                    task_name: task.name.clone(),
                    contributor: contributor_id,
                    start_date: evaluation.start,
                    end_date: evaluation.end,
                    daily_hours: evaluation.daily_hours,
                    confidence: evaluation.confidence,
                    reasoning: evaluation.reasoning,
                });
            }
        }

        suggestions.sort_by(|a, b| {
            b.confidence
                .value()
                .total_cmp(&a.confidence.value())
                .then_with(|| a.task_id.cmp(&b.task_id))
        });

        let statistics = statistics(tasks.len(), &suggestions, unassigned.len());
        tracing::debug!(
            project = %project_id,
            assigned = statistics.assigned_tasks,
            unassigned = statistics.unassigned_tasks,
            "assignment plan complete"
        );
        Ok(AssignmentPlan {
            project_id: project_id.clone(),
            suggestions,
            unassigned,
            statistics,
        })
    }

    fn evaluate(
        &self,
        state: &CandidateState,
        remaining: f64,
        required: Option<&ProfileId>,
        window_start: NaiveDate,
        horizon_end: NaiveDate,
    ) -> Option<Evaluation> {
        let wt = &self.config.working_time;
        // Profile must be held under the term active on the day.
        let eligible = |term: &EmploymentTerm| required.is_none_or(|p| term.profiles.contains(p));

        let mut slot = None;
        for day in window_start.iter_days().take_while(|d| *d <= horizon_end) {
            if !wt.is_working_day(day) {
                continue;
            }
            let Some(term) = state.term_on(day).filter(|&t| eligible(t)) else {
                continue;
            };
            let capacity = term.daily_capacity(wt);
            if capacity <= 0.0 {
                continue;
            }
            let spare = capacity - state.booked_on(day, wt);
            if spare >= self.config.min_availability * capacity {
                slot = Some((day, spare));
                break;
            }
        }
        let (start, first_spare) = slot?;
        let span_days = wt.days_for_hours(remaining).max(1);
        let end = wt.add_working_days(start, span_days);

        let mut spans = Vec::new();
        for day in start.iter_days().take_while(|d| *d <= end) {
            if !wt.is_working_day(day) {
                continue;
            }
            let capacity = state
                .term_on(day)
                .filter(|&t| eligible(t))
                .map_or(0.0, |t| t.daily_capacity(wt));
            spans.push((capacity, state.booked_on(day, wt)));
        }
        #[expect(clippy::cast_precision_loss, reason = "span lengths are small")]
        let day_count = spans.len().max(1) as f64;

        let average_spare =
            spans.iter().map(|(cap, booked)| (cap - booked).max(0.0)).sum::<f64>() / day_count;
        let daily_hours = round2(wt.hours_per_day.min(average_spare));
        if daily_hours <= 0.0 {
            return None;
        }

        let total_capacity: f64 = spans.iter().map(|(cap, _)| cap).sum();
        // + 0.0 turns an empty sum's -0.0 into 0.0
        let total_booked = spans.iter().map(|(_, booked)| booked).sum::<f64>() + 0.0;
        let load = if total_capacity > 0.0 {
            total_booked / total_capacity
        } else {
            1.0
        };
        let health = self.health(load);

        #[expect(clippy::cast_precision_loss, reason = "span lengths are small")]
        let conflicts = spans
            .iter()
            .filter(|(cap, booked)| booked + daily_hours > cap + 1e-9)
            .count() as f64;
        #[expect(clippy::cast_precision_loss, reason = "day counts are small")]
        let delay_ratio = (start - window_start).num_days() as f64
            / f64::from(self.config.horizon_days.max(1));
        let fit = (1.0 - conflicts / day_count) * MAX_DELAY_PENALTY.mul_add(-delay_ratio, 1.0);

        let profile_match = if required.is_some() {
            1.0
        } else {
            UNSPECIFIED_PROFILE_MATCH
        };
        let weights = &self.config.weights;
        let mut score = weights.fit.mul_add(
            fit,
            weights
                .profile_match
                .mul_add(profile_match, weights.health * health),
        );
        if state.familiar {
            score += FAMILIARITY_BONUS;
        }

        let profile_note = required.map_or_else(
            || "no profile required".to_string(),
            |p| format!("holds profile {p}"),
        );
        let reasoning = format!(
            "{} {profile_note}; {first_spare:.1}h free on {start}; current load {:.0}%{}",
            state.contributor.name,
            load * 100.0,
            if state.familiar {
                "; has worked on this project"
            } else {
                ""
            }
        );

        Some(Evaluation {
            start,
            end,
            daily_hours,
            confidence: Confidence::clamped(round2(score)),
            reasoning,
        })
    }

    fn health(&self, load: f64) -> f64 {
        let (healthy, overloaded) = (self.config.healthy_load, self.config.overloaded_load);
        if load <= healthy {
            1.0
        } else if load >= overloaded || overloaded <= healthy {
            0.0
        } else {
            1.0 - (load - healthy) / (overloaded - healthy)
        }
    }
}

fn load_state<S: StaffingSource + ProjectSource>(
    source: &S,
    contributor: Contributor,
    project_id: &ProjectId,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<CandidateState, EngineError> {
    let terms = source.employment_terms(&contributor.id)?;
    let allocations = source.planned_allocations(&contributor.id, start, end)?;
    let familiar = source.has_project_history(&contributor.id, project_id)?;
    Ok(CandidateState {
        contributor,
        terms,
        allocations,
        familiar,
    })
}

fn unassigned_task(task: &ProjectTask, reason: &str) -> UnassignedTask {
    UnassignedTask {
        task_id: task.id.clone(),
        task_name: task.name.clone(),
        reason: reason.to_string(),
    }
}

fn statistics(
    total_tasks: usize,
    suggestions: &[AssignmentSuggestion],
    unassigned_tasks: usize,
) -> AssignmentStatistics {
    let average_confidence = if suggestions.is_empty() {
        0.0
    } else {
        #[expect(clippy::cast_precision_loss, reason = "suggestion counts are small")]
        let count = suggestions.len() as f64;
        suggestions
            .iter()
            .map(|s| s.confidence.value())
            .sum::<f64>()
            / count
    };
    AssignmentStatistics {
        total_tasks,
        assigned_tasks: suggestions.len(),
        unassigned_tasks,
        average_confidence,
    }
}
