//! Workload classification of contributors.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Args;

use sp_core::{Granularity, WorkloadAnalysis, WorkloadStatus};
use sp_db::Database;

use super::util::{month_bounds, resolve_range};
use crate::Config;

const STATUSES: [WorkloadStatus; 4] = [
    WorkloadStatus::Critical,
    WorkloadStatus::Overloaded,
    WorkloadStatus::Optimal,
    WorkloadStatus::Underutilized,
];

#[derive(Debug, Args)]
pub struct WorkloadArgs {
    /// First day of the window. Defaults to the first of the current month.
    #[arg(long)]
    pub start: Option<NaiveDate>,

    /// Last day of the window. Defaults to the end of the current month.
    #[arg(long)]
    pub end: Option<NaiveDate>,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    config: &Config,
    args: &WorkloadArgs,
    today: NaiveDate,
) -> Result<()> {
    let (start, end) = resolve_range(None, args.start, args.end, month_bounds(today))?;
    let classifier = config.classifier().context("invalid workload thresholds")?;
    let analysis = classifier
        .analyze_all_contributors(db, start, end)
        .context("failed to analyze workload")?;

    if args.json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&analysis)?)?;
    } else {
        write_text(writer, &analysis, start, end, classifier.granularity())?;
    }
    Ok(())
}

fn write_text<W: Write>(
    writer: &mut W,
    analysis: &WorkloadAnalysis,
    start: NaiveDate,
    end: NaiveDate,
    granularity: Granularity,
) -> Result<()> {
    if analysis.total() == 0 {
        writeln!(
            writer,
            "No applicable {granularity} metrics for {start} to {end}. Run `sp metrics` first."
        )?;
        return Ok(());
    }

    writeln!(writer, "Workload analysis {start} to {end} ({granularity})")?;
    for status in STATUSES {
        let bucket = analysis.bucket(status);
        writeln!(writer)?;
        writeln!(writer, "{} ({}):", capitalize(status.as_str()), bucket.len())?;
        for entry in bucket {
            writeln!(
                writer,
                "- {} ({}): TACE {:.2}%, deviation {:+.2}, {} snapshots",
                entry.contributor.id,
                entry.contributor.name,
                entry.tace,
                entry.deviation,
                entry.snapshots,
            )?;
        }
    }
    writeln!(writer)?;
    writeln!(writer, "{} contributors classified", analysis.total())?;
    Ok(())
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;

    use crate::commands::test_support::{add_contributor, date, store_weekly};

    fn seeded_db() -> Database {
        let mut db = Database::open_in_memory().unwrap();
        for id in ["alice", "bob", "carol", "dave"] {
            add_contributor(&mut db, id, &[]);
        }
        for week in [date(2025, 1, 6), date(2025, 1, 13)] {
            store_weekly(&mut db, "alice", week, 120.0);
            store_weekly(&mut db, "carol", week, 80.0);
        }
        store_weekly(&mut db, "bob", date(2025, 1, 6), 40.0);
        store_weekly(&mut db, "bob", date(2025, 1, 13), 60.0);
        db
    }

    fn args(json: bool) -> WorkloadArgs {
        WorkloadArgs {
            start: Some(date(2025, 1, 6)),
            end: Some(date(2025, 1, 19)),
            json,
        }
    }

    fn run_to_string(db: &Database, args: &WorkloadArgs) -> String {
        let mut output = Vec::new();
        run(&mut output, db, &Config::default(), args, date(2025, 1, 20)).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn workload_text_lists_buckets() {
        let db = seeded_db();
        let output = run_to_string(&db, &args(false));
        assert_snapshot!(output, @r"
        Workload analysis 2025-01-06 to 2025-01-19 (weekly)

        Critical (1):
        - alice (Alice): TACE 120.00%, deviation +40.00, 2 snapshots

        Overloaded (0):

        Optimal (1):
        - carol (Carol): TACE 80.00%, deviation +0.00, 2 snapshots

        Underutilized (1):
        - bob (Bob): TACE 50.00%, deviation -30.00, 2 snapshots

        3 contributors classified
        ");
    }

    #[test]
    fn workload_json_has_bucket_arrays() {
        let db = seeded_db();
        let output = run_to_string(&db, &args(true));
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["critical"][0]["contributor"]["id"], "alice");
        assert_eq!(value["critical"][0]["status"], "critical");
        assert_eq!(value["underutilized"][0]["tace"], 50.0);
        assert!(value["overloaded"].as_array().unwrap().is_empty());
    }

    #[test]
    fn workload_without_metrics_points_to_metrics_command() {
        let mut db = Database::open_in_memory().unwrap();
        add_contributor(&mut db, "alice", &[]);
        let output = run_to_string(&db, &args(false));
        assert_snapshot!(output, @"No applicable weekly metrics for 2025-01-06 to 2025-01-19. Run `sp metrics` first.");
    }

    #[test]
    fn capitalize_first_letter() {
        assert_eq!(capitalize("underutilized"), "Underutilized");
        assert_eq!(capitalize(""), "");
    }
}
