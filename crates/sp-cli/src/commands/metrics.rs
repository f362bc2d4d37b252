//! Compute and store staffing metric snapshots.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Args;

use sp_core::{Granularity, MetricsRunSummary, Period, StaffingSource};
use sp_db::Database;

use super::util::{month_bounds, resolve_range};
use crate::Config;

#[derive(Debug, Args)]
pub struct MetricsArgs {
    /// Period to compute: YYYY (whole year) or YYYY-MM (one month).
    /// Defaults to the current month.
    pub period: Option<String>,

    /// First day of the range (overrides PERIOD).
    #[arg(long)]
    pub start: Option<NaiveDate>,

    /// Last day of the range (overrides PERIOD).
    #[arg(long)]
    pub end: Option<NaiveDate>,

    /// Snapshot granularity: weekly, monthly or quarterly.
    #[arg(long, default_value = "weekly")]
    pub granularity: Granularity,

    /// Recompute and replace existing snapshots.
    #[arg(long)]
    pub force: bool,
}

/// Run metric computation for a range.
///
/// Without `--force`, a range already fully covered is reported and left
/// alone; a partially covered range only gets its missing snapshots. Only
/// pairs with an employment term overlapping the period count towards
/// coverage.
pub fn run<W: Write>(
    writer: &mut W,
    db: &mut Database,
    config: &Config,
    args: &MetricsArgs,
    today: NaiveDate,
) -> Result<Option<MetricsRunSummary>> {
    let (start, end) = resolve_range(
        args.period.as_deref(),
        args.start,
        args.end,
        month_bounds(today),
    )?;
    let granularity = args.granularity;

    if !args.force {
        let periods = granularity.periods(start, end);
        if let (Some(first), Some(last)) = (periods.first(), periods.last()) {
            let existing = db
                .metric_count(granularity, first.start, last.start)
                .context("failed to count existing metrics")?;
            let expected = eligible_pairs(db, &periods)?;
            if expected > 0 && existing >= expected {
                writeln!(
                    writer,
                    "Metrics already exist for {start} to {end} ({existing} {granularity} snapshots). Use --force to recompute."
                )?;
                return Ok(None);
            }
        }
    }

    writeln!(
        writer,
        "Computing {granularity} metrics for {start} to {end}..."
    )?;

    let calculator = config.metrics_calculator(today);
    let summary = calculator
        .calculate_and_store_metrics(db, start, end, granularity, args.force)
        .context("failed to compute metrics")?;

    tracing::debug!(?summary, "metrics run complete");

    write_summary(writer, &summary, args.force)?;
    Ok(Some(summary))
}

/// Counts (contributor, period) pairs that would receive a snapshot.
fn eligible_pairs(db: &Database, periods: &[Period]) -> Result<u64> {
    let contributors = db
        .active_contributors()
        .context("failed to load contributors")?;
    let mut pairs = 0_usize;
    for contributor in &contributors {
        let terms = db
            .employment_terms(&contributor.id)
            .with_context(|| format!("failed to load employment terms for {}", contributor.id))?;
        pairs += periods
            .iter()
            .filter(|period| terms.iter().any(|t| t.overlaps(period.start, period.end)))
            .count();
    }
    Ok(u64::try_from(pairs).unwrap_or(u64::MAX))
}

fn write_summary<W: Write>(writer: &mut W, summary: &MetricsRunSummary, force: bool) -> Result<()> {
    if force {
        writeln!(writer, "Deleted: {}", summary.deleted)?;
    }
    writeln!(writer, "Created: {}", summary.created)?;
    writeln!(writer, "Skipped (existing): {}", summary.skipped_existing)?;
    writeln!(
        writer,
        "Skipped (no employment term): {}",
        summary.skipped_no_term
    )?;
    writeln!(writer, "Failed: {}", summary.failed)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;
    use sp_core::{Contributor, ContributorId, EmploymentTerm, MetricStore, ProjectId, TimeEntry};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn seeded_db() -> Database {
        let mut db = Database::open_in_memory().unwrap();
        for id in ["alice", "bob"] {
            db.upsert_contributor(&Contributor {
                id: ContributorId::new(id).unwrap(),
                name: id.to_string(),
                active: true,
            })
            .unwrap();
        }
        db.insert_employment_term(&EmploymentTerm {
            contributor_id: ContributorId::new("alice").unwrap(),
            weekly_hours: 35.0,
            work_time_percentage: 100.0,
            start_date: date(2025, 1, 1),
            end_date: None,
            profiles: std::collections::BTreeSet::new(),
        })
        .unwrap();
        let entries: Vec<TimeEntry> = (13..=17)
            .map(|d| TimeEntry {
                contributor_id: ContributorId::new("alice").unwrap(),
                project_id: ProjectId::new("p1").unwrap(),
                date: date(2025, 1, d),
                hours: 7.0,
            })
            .collect();
        db.insert_time_entries(&entries).unwrap();
        db
    }

    fn args(force: bool) -> MetricsArgs {
        MetricsArgs {
            period: None,
            start: Some(date(2025, 1, 13)),
            end: Some(date(2025, 1, 26)),
            granularity: Granularity::Weekly,
            force,
        }
    }

    fn run_to_string(db: &mut Database, args: &MetricsArgs) -> String {
        let mut output = Vec::new();
        run(&mut output, db, &Config::default(), args, date(2025, 6, 1)).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn metrics_command_reports_summary() {
        let mut db = seeded_db();
        let output = run_to_string(&mut db, &args(false));
        assert_snapshot!(output, @r"
        Computing weekly metrics for 2025-01-13 to 2025-01-26...
        Created: 2
        Skipped (existing): 0
        Skipped (no employment term): 2
        Failed: 0
        ");

        let stored = db
            .metrics_in_range(Granularity::Weekly, date(2025, 1, 13), date(2025, 1, 13), None)
            .unwrap();
        assert_eq!(stored[0].tace, Some(100.0));
    }

    #[test]
    fn rerun_computes_only_missing_snapshots() {
        let mut db = seeded_db();
        let first_week = MetricsArgs {
            end: Some(date(2025, 1, 19)),
            ..args(false)
        };
        run_to_string(&mut db, &first_week);
        let output = run_to_string(&mut db, &args(false));
        assert!(output.contains("Created: 1"), "{output}");
        assert!(output.contains("Skipped (existing): 1"), "{output}");
    }

    #[test]
    fn contributor_without_term_does_not_block_short_circuit() {
        let mut db = seeded_db();
        run_to_string(&mut db, &args(false));
        let output = run_to_string(&mut db, &args(false));
        assert_snapshot!(output, @"Metrics already exist for 2025-01-13 to 2025-01-26 (2 weekly snapshots). Use --force to recompute.");
    }

    #[test]
    fn fully_covered_range_short_circuits_without_force() {
        let mut db = seeded_db();
        db.insert_employment_term(&EmploymentTerm {
            contributor_id: ContributorId::new("bob").unwrap(),
            weekly_hours: 35.0,
            work_time_percentage: 100.0,
            start_date: date(2025, 1, 1),
            end_date: None,
            profiles: std::collections::BTreeSet::new(),
        })
        .unwrap();
        run_to_string(&mut db, &args(false));

        let output = run_to_string(&mut db, &args(false));
        assert_snapshot!(output, @"Metrics already exist for 2025-01-13 to 2025-01-26 (4 weekly snapshots). Use --force to recompute.");

        let forced = run_to_string(&mut db, &args(true));
        assert!(forced.contains("Deleted: 4"));
        assert!(forced.contains("Created: 4"));
    }

    #[test]
    fn period_argument_selects_month() {
        let mut db = seeded_db();
        let month = MetricsArgs {
            period: Some("2025-01".to_string()),
            start: None,
            end: None,
            granularity: Granularity::Monthly,
            force: false,
        };
        let output = run_to_string(&mut db, &month);
        assert!(output.starts_with("Computing monthly metrics for 2025-01-01 to 2025-01-31..."));
        assert!(output.contains("Created: 1"));
    }
}
