//! Staffing metric snapshots.
//!
//! Turns logged time, employment terms and planned allocations into one
//! immutable [`StaffingMetric`] per contributor and period.
//!
//! # Formulas
//!
//! For every working day `d` of the period on which an employment term is
//! active (the most recently started term wins when several overlap):
//!
//! - `expected_hours += daily_capacity(term)` where daily capacity is
//!   `weekly_hours × work_time_percentage / 100 / days_per_week`. A full
//!   week therefore expects exactly `weekly_hours × pct / 100`, and a
//!   partially covered period expects the covered fraction.
//! - `planned_hours += booked(d)` when `d >= as_of` and nothing was logged
//!   on `d`. Past days never contribute planned hours.
//!
//! `worked_hours` is every hour logged inside the period. Then
//!
//! - `staffing_rate = worked / expected × 100`
//! - `tace = (worked + planned) / expected × 100`
//!
//! both rounded to two decimals and `None` when `expected_hours` is zero.
//! For a period wholly before `as_of`, `tace == staffing_rate`.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Local, NaiveDate, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::calendar::{Granularity, Period, WorkingTime};
use crate::error::{EngineError, validate_range};
use crate::model::{Contributor, EmploymentTerm, PlannedAllocation, TimeEntry};
use crate::query::{MetricStore, StaffingSource};
use crate::types::{ContributorId, round2};

/// Default number of contributors fetched, computed and written per batch.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Configuration for metric calculation.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Working-day assumptions for capacity.
    pub working_time: WorkingTime,
    /// Contributors per batch. Default: 50.
    pub batch_size: usize,
    /// First day considered "future" for TACE. Default: today (local).
    pub as_of: NaiveDate,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            working_time: WorkingTime::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            as_of: Local::now().date_naive(),
        }
    }
}

/// An immutable utilization snapshot for one contributor and period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffingMetric {
    /// Deterministic ID derived from the uniqueness key.
    pub id: String,
    pub contributor_id: ContributorId,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub granularity: Granularity,
    pub expected_hours: f64,
    pub worked_hours: f64,
    /// Planned hours substituted for unlogged future working days.
    pub planned_hours: f64,
    /// `None` when `expected_hours` is zero.
    pub staffing_rate: Option<f64>,
    /// `None` when `expected_hours` is zero. May exceed 100.
    pub tace: Option<f64>,
    pub computed_at: DateTime<Utc>,
}

impl StaffingMetric {
    /// Returns the snapshot ID for a `(contributor, period_start, granularity)` key.
    pub fn snapshot_id(
        contributor: &ContributorId,
        period_start: NaiveDate,
        granularity: Granularity,
    ) -> String {
        let content = format!("staffing-metric|{contributor}|{period_start}|{granularity}");
        Uuid::new_v5(&Uuid::NAMESPACE_OID, content.as_bytes()).to_string()
    }
}

/// Counts reported by a calculation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsRunSummary {
    /// Snapshots written.
    pub created: usize,
    /// Pairs skipped because a snapshot already existed.
    pub skipped_existing: usize,
    /// Pairs skipped because no employment term overlapped the period.
    pub skipped_no_term: usize,
    /// Snapshots that could not be fetched or written.
    pub failed: usize,
    /// Snapshots removed by a forced recomputation.
    pub deleted: usize,
}

/// Everything needed to compute one contributor's snapshots.
#[derive(Debug, Clone)]
struct ContributorInputs {
    contributor: Contributor,
    terms: Vec<EmploymentTerm>,
    entries: Vec<TimeEntry>,
    allocations: Vec<PlannedAllocation>,
}

/// Per-pair result of the parallel compute step.
#[derive(Debug)]
enum PairOutcome {
    Computed(StaffingMetric),
    Existing,
    NoTerm,
}

/// Computes a single snapshot.
///
/// Returns `None` when no employment term overlaps the period, in which
/// case the pair is skipped rather than recorded with zero capacity.
pub fn compute_metric(
    contributor: &ContributorId,
    period: &Period,
    terms: &[EmploymentTerm],
    entries: &[TimeEntry],
    allocations: &[PlannedAllocation],
    config: &MetricsConfig,
    computed_at: DateTime<Utc>,
) -> Option<StaffingMetric> {
    let overlapping: Vec<&EmploymentTerm> = terms
        .iter()
        .filter(|term| term.overlaps(period.start, period.end))
        .collect();
    if overlapping.is_empty() {
        return None;
    }

    let mut logged_by_day: HashMap<NaiveDate, f64> = HashMap::new();
    let mut worked = 0.0;
    for entry in entries.iter().filter(|e| period.contains(e.date)) {
        worked += entry.hours;
        *logged_by_day.entry(entry.date).or_insert(0.0) += entry.hours;
    }

    let working_time = &config.working_time;
    let mut expected = 0.0;
    let mut planned = 0.0;
    for day in period.days() {
        if !working_time.is_working_day(day) {
            continue;
        }
        let Some(term) = active_term_on(&overlapping, day) else {
            continue;
        };
        expected += term.daily_capacity(working_time);

        let logged = logged_by_day.get(&day).copied().unwrap_or(0.0);
        if day >= config.as_of && logged <= 0.0 {
            planned += allocations
                .iter()
                .map(|alloc| alloc.booked_hours_on(day, working_time))
                .sum::<f64>();
        }
    }

    let expected_hours = round2(expected);
    let worked_hours = round2(worked);
    let planned_hours = round2(planned);
    let (staffing_rate, tace) = if expected_hours > 0.0 {
        (
            Some(round2(worked_hours / expected_hours * 100.0)),
            Some(round2((worked_hours + planned_hours) / expected_hours * 100.0)),
        )
    } else {
        (None, None)
    };

    Some(StaffingMetric {
        id: StaffingMetric::snapshot_id(contributor, period.start, period.granularity),
        contributor_id: contributor.clone(),
        period_start: period.start,
        period_end: period.end,
        granularity: period.granularity,
        expected_hours,
        worked_hours,
        planned_hours,
        staffing_rate,
        tace,
        computed_at,
    })
}

fn active_term_on<'a>(terms: &[&'a EmploymentTerm], day: NaiveDate) -> Option<&'a EmploymentTerm> {
    terms
        .iter()
        .copied()
        .filter(|term| term.is_active_on(day))
        .max_by_key(|term| term.start_date)
}

/// Computes and persists staffing metric snapshots.
#[derive(Debug, Clone, Default)]
pub struct MetricsCalculator {
    config: MetricsConfig,
}

impl MetricsCalculator {
    pub const fn new(config: MetricsConfig) -> Self {
        Self { config }
    }

    pub const fn config(&self) -> &MetricsConfig {
        &self.config
    }

    /// Computes snapshots for every active contributor and every period of
    /// `granularity` in `[start, end]`, and stores them.
    ///
    /// Without `force`, pairs that already have a snapshot are skipped, so
    /// repeated runs never create duplicates. With `force`, each batch's
    /// snapshots in the range are recomputed and swapped in atomically
    /// through [`MetricStore::replace_metrics`].
    ///
    /// Contributors are processed in batches of `batch_size`: inputs are
    /// fetched, snapshots computed in parallel, and the batch is written
    /// before the next one is fetched. Fetch and write failures are logged
    /// and counted in [`MetricsRunSummary::failed`]. A contributor whose
    /// inputs could not be fetched keeps its stored snapshots, even under
    /// `force`.
    pub fn calculate_and_store_metrics<S>(
        &self,
        store: &mut S,
        start: NaiveDate,
        end: NaiveDate,
        granularity: Granularity,
        force: bool,
    ) -> Result<MetricsRunSummary, EngineError>
    where
        S: StaffingSource + MetricStore,
    {
        validate_range(start, end)?;
        let periods = granularity.periods(start, end);
        let (Some(first), Some(last)) = (periods.first().copied(), periods.last().copied()) else {
            return Ok(MetricsRunSummary::default());
        };
        let (key_start, key_end) = (first.start, last.start);
        let fetch_end = last.end;

        let contributors = store.active_contributors()?;
        tracing::debug!(
            %granularity,
            periods = periods.len(),
            contributors = contributors.len(),
            force,
            "calculating staffing metrics"
        );

        let existing = if force {
            HashSet::new()
        } else {
            store.existing_metric_keys(granularity, key_start, key_end)?
        };

        let computed_at = Utc::now();
        let batch_size = self.config.batch_size.max(1);
        let mut summary = MetricsRunSummary::default();

        for batch in contributors.chunks(batch_size) {
            let mut inputs = Vec::with_capacity(batch.len());
            for contributor in batch {
                match fetch_inputs(store, contributor, first.start, fetch_end) {
                    Ok(input) => inputs.push(input),
                    Err(err) => {
                        tracing::warn!(
                            contributor = %contributor.id,
                            error = %err,
                            "failed to load staffing inputs"
                        );
                        summary.failed += periods.len();
                    }
                }
            }

            let outcomes: Vec<PairOutcome> = inputs
                .par_iter()
                .flat_map_iter(|input| {
                    periods.iter().map(|period| {
                        let id = &input.contributor.id;
                        if existing.contains(&(id.clone(), period.start)) {
                            return PairOutcome::Existing;
                        }
                        compute_metric(
                            id,
                            period,
                            &input.terms,
                            &input.entries,
                            &input.allocations,
                            &self.config,
                            computed_at,
                        )
                        .map_or(PairOutcome::NoTerm, PairOutcome::Computed)
                    })
                })
                .collect();

            let mut batch_metrics = Vec::new();
            for outcome in outcomes {
                match outcome {
                    PairOutcome::Computed(metric) => batch_metrics.push(metric),
                    PairOutcome::Existing => summary.skipped_existing += 1,
                    PairOutcome::NoTerm => summary.skipped_no_term += 1,
                }
            }

            let written = if force {
                if inputs.is_empty() {
                    continue;
                }
                let loaded: Vec<ContributorId> =
                    inputs.iter().map(|input| input.contributor.id.clone()).collect();
                store.replace_metrics(granularity, key_start, key_end, &loaded, &batch_metrics)
            } else {
                if batch_metrics.is_empty() {
                    continue;
                }
                store.insert_metrics(&batch_metrics)
            };
            match written {
                Ok(outcome) => {
                    summary.created += outcome.inserted;
                    summary.skipped_existing += outcome.duplicates;
                    summary.failed += outcome.failed;
                    summary.deleted += outcome.deleted;
                }
                Err(err) => {
                    tracing::warn!(
                        count = batch_metrics.len(),
                        error = %err,
                        "failed to write staffing metric batch"
                    );
                    summary.failed += batch_metrics.len();
                }
            }
        }

        tracing::debug!(
            created = summary.created,
            skipped_existing = summary.skipped_existing,
            skipped_no_term = summary.skipped_no_term,
            failed = summary.failed,
            deleted = summary.deleted,
            "staffing metrics complete"
        );
        Ok(summary)
    }
}

fn fetch_inputs<S: StaffingSource>(
    source: &S,
    contributor: &Contributor,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<ContributorInputs, crate::error::SourceError> {
    Ok(ContributorInputs {
        contributor: contributor.clone(),
        terms: source.employment_terms(&contributor.id)?,
        entries: source.time_entries(&contributor.id, start, end)?,
        allocations: source.planned_allocations(&contributor.id, start, end)?,
    })
}
