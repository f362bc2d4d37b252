//! Rebalancing recommendations.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{Months, NaiveDate};
use clap::Args;

use sp_core::RecommendationReport;
use sp_db::Database;

use super::util::{month_bounds, resolve_range};
use crate::Config;

#[derive(Debug, Args)]
pub struct RecommendArgs {
    /// First day of the window. Defaults to the first of the current month.
    #[arg(long)]
    pub start: Option<NaiveDate>,

    /// Last day of the window. Defaults to the end of next month.
    #[arg(long)]
    pub end: Option<NaiveDate>,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Current month through the end of next month.
fn default_window(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let (first, last) = month_bounds(today);
    let end = first
        .checked_add_months(Months::new(1))
        .map_or(last, |next| month_bounds(next).1);
    (first, end)
}

pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    config: &Config,
    args: &RecommendArgs,
    today: NaiveDate,
) -> Result<()> {
    let (start, end) = resolve_range(None, args.start, args.end, default_window(today))?;
    let recommender = config.recommender().context("invalid workload thresholds")?;
    let report = recommender
        .generate_recommendations(db, start, end)
        .context("failed to generate recommendations")?;

    if args.json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&report)?)?;
    } else {
        write_text(writer, &report, start, end)?;
    }
    Ok(())
}

fn write_text<W: Write>(
    writer: &mut W,
    report: &RecommendationReport,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<()> {
    if report.recommendations.is_empty() {
        writeln!(writer, "No recommendations for {start} to {end}.")?;
    } else {
        writeln!(writer, "Recommendations {start} to {end}")?;
        for (idx, rec) in report.recommendations.iter().enumerate() {
            writeln!(writer)?;
            writeln!(
                writer,
                "{}. [{}] {}: {}",
                idx + 1,
                rec.severity,
                rec.kind,
                rec.title
            )?;
            writeln!(writer, "   {}", rec.description)?;
            writeln!(writer, "   Impact: {}", rec.expected_impact)?;
            writeln!(writer, "   Reasoning: {}", rec.reasoning)?;
            writeln!(writer, "   Score: {:.2}", rec.priority_score)?;
        }
        writeln!(writer)?;
    }

    let summary = &report.summary;
    writeln!(
        writer,
        "Summary: {} recommendations ({} high, {} medium, {} low), {} contributors analyzed, {} critical",
        summary.total_recommendations,
        summary.high_priority_count,
        summary.medium_priority_count,
        summary.low_priority_count,
        summary.contributors_analyzed,
        summary.critical_workload_count,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;
    use sp_core::{ProfileId, Project, ProjectId, ProjectTask, TaskId, TaskStatus};

    use crate::commands::test_support::{add_contributor, date, store_weekly};

    fn seeded_db() -> Database {
        let mut db = Database::open_in_memory().unwrap();
        add_contributor(&mut db, "alice", &["backend"]);
        add_contributor(&mut db, "bob", &["backend"]);
        add_contributor(&mut db, "carol", &["design"]);
        for week in [date(2025, 1, 6), date(2025, 1, 13)] {
            store_weekly(&mut db, "alice", week, 120.0);
            store_weekly(&mut db, "bob", week, 50.0);
            store_weekly(&mut db, "carol", week, 80.0);
        }
        db
    }

    fn run_to_string(db: &Database, json: bool) -> String {
        let args = RecommendArgs {
            start: Some(date(2025, 1, 6)),
            end: Some(date(2025, 1, 19)),
            json,
        };
        let mut output = Vec::new();
        run(&mut output, db, &Config::default(), &args, date(2025, 1, 20)).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn default_window_spans_two_months() {
        assert_eq!(
            default_window(date(2025, 1, 20)),
            (date(2025, 1, 1), date(2025, 2, 28))
        );
        assert_eq!(
            default_window(date(2025, 12, 5)),
            (date(2025, 12, 1), date(2026, 1, 31))
        );
    }

    #[test]
    fn recommend_text_pairs_overload_with_capacity() {
        let db = seeded_db();
        let output = run_to_string(&db, false);
        assert!(output.starts_with("Recommendations 2025-01-06 to 2025-01-19"));
        assert!(output.contains("1. [critical] rebalance-overload: Move work from Alice to Bob"));
        assert!(!output.contains("staff-underutilized"));
        assert!(output.ends_with(
            "Summary: 1 recommendations (1 high, 0 medium, 0 low), 3 contributors analyzed, 1 critical\n"
        ));
    }

    #[test]
    fn recommend_json_includes_target() {
        let db = seeded_db();
        let output = run_to_string(&db, true);
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        let first = &value["recommendations"][0];
        assert_eq!(first["kind"], "rebalance-overload");
        assert_eq!(first["contributor"], "alice");
        assert_eq!(first["target"], "bob");
        assert_eq!(value["summary"]["total_recommendations"], 1);
    }

    #[test]
    fn staffing_recommendation_names_open_project() {
        let mut db = Database::open_in_memory().unwrap();
        add_contributor(&mut db, "carol", &["design"]);
        store_weekly(&mut db, "carol", date(2025, 1, 6), 40.0);
        db.upsert_project(&Project {
            id: ProjectId::new("brand").unwrap(),
            name: "Brand Refresh".to_string(),
            active: true,
            start_date: None,
        })
        .unwrap();
        db.upsert_task(&ProjectTask {
            id: TaskId::new("logo").unwrap(),
            project_id: ProjectId::new("brand").unwrap(),
            name: "Logo".to_string(),
            required_profile: Some(ProfileId::new("design").unwrap()),
            estimated_hours_sold: Some(20.0),
            estimated_hours_revised: None,
            logged_hours: 0.0,
            active: true,
            counts_for_profitability: true,
            status: TaskStatus::Todo,
            assigned_contributor: None,
            under_resourced: false,
            position: 0,
        })
        .unwrap();

        let output = run_to_string(&db, false);
        assert!(output.contains("staff-underutilized: Staff Carol on Brand Refresh"), "{output}");
        let json: serde_json::Value = serde_json::from_str(&run_to_string(&db, true)).unwrap();
        assert_eq!(json["recommendations"][0]["project"], "brand");
    }

    #[test]
    fn recommend_with_balanced_team_reports_nothing() {
        let mut db = Database::open_in_memory().unwrap();
        add_contributor(&mut db, "carol", &["design"]);
        store_weekly(&mut db, "carol", date(2025, 1, 6), 80.0);
        let output = run_to_string(&db, false);
        assert_snapshot!(output, @r"
        No recommendations for 2025-01-06 to 2025-01-19.
        Summary: 0 recommendations (0 high, 0 medium, 0 low), 1 contributors analyzed, 0 critical
        ");
    }
}
