//! Task assignment suggestions for a project.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Args;

use sp_core::{AssignmentPlan, ProjectId};
use sp_db::Database;

use crate::Config;

#[derive(Debug, Args)]
pub struct SuggestArgs {
    /// Project to plan.
    #[arg(long)]
    pub project: String,

    /// Earliest start date. Defaults to today; the project start wins if later.
    #[arg(long)]
    pub start: Option<NaiveDate>,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    config: &Config,
    args: &SuggestArgs,
    today: NaiveDate,
) -> Result<()> {
    let project_id = ProjectId::new(args.project.clone()).context("invalid project ID")?;
    let start = args.start.unwrap_or(today);
    let plan = config
        .advisor()
        .generate_suggestions(db, &project_id, start)
        .with_context(|| format!("failed to plan project {project_id}"))?;

    if args.json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&plan)?)?;
    } else {
        write_text(writer, &plan, start)?;
    }
    Ok(())
}

fn write_text<W: Write>(writer: &mut W, plan: &AssignmentPlan, start: NaiveDate) -> Result<()> {
    writeln!(
        writer,
        "Assignment plan for project {} (from {start})",
        plan.project_id
    )?;

    if !plan.suggestions.is_empty() {
        writeln!(writer)?;
        writeln!(writer, "Suggestions ({}):", plan.suggestions.len())?;
        for s in &plan.suggestions {
            writeln!(
                writer,
                "- {} {} -> {}: {} to {}, {:.2}h/day, confidence {:.2}",
                s.task_id,
                s.task_name,
                s.contributor,
                s.start_date,
                s.end_date,
                s.daily_hours,
                s.confidence.value(),
            )?;
            writeln!(writer, "  {}", s.reasoning)?;
        }
    }

    if !plan.unassigned.is_empty() {
        writeln!(writer)?;
        writeln!(writer, "Unassigned ({}):", plan.unassigned.len())?;
        for task in &plan.unassigned {
            writeln!(writer, "- {} {}: {}", task.task_id, task.task_name, task.reason)?;
        }
    }

    let stats = &plan.statistics;
    writeln!(writer)?;
    writeln!(
        writer,
        "Statistics: {} tasks, {} assigned, {} unassigned, average confidence {:.2}",
        stats.total_tasks, stats.assigned_tasks, stats.unassigned_tasks, stats.average_confidence
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use sp_core::{ProfileId, Project, ProjectTask, TaskId, TaskStatus};

    use crate::commands::test_support::{add_contributor, date};

    fn task(id: &str, name: &str, profile: &str, hours: f64) -> ProjectTask {
        ProjectTask {
            id: TaskId::new(id).unwrap(),
            project_id: ProjectId::new("p1").unwrap(),
            name: name.to_string(),
            required_profile: Some(ProfileId::new(profile).unwrap()),
            estimated_hours_sold: Some(hours),
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

    fn seeded_db() -> Database {
        let mut db = Database::open_in_memory().unwrap();
        add_contributor(&mut db, "alice", &["backend"]);
        add_contributor(&mut db, "bob", &["design"]);
        db.upsert_project(&Project {
            id: ProjectId::new("p1").unwrap(),
            name: "Portal".to_string(),
            active: true,
            start_date: Some(date(2025, 2, 3)),
        })
        .unwrap();
        db.upsert_task(&task("t1", "API", "backend", 14.0)).unwrap();
        db.upsert_task(&task("t2", "Contracts", "legal", 8.0)).unwrap();
        db
    }

    fn run_to_string(db: &Database, project: &str, json: bool) -> Result<String> {
        let args = SuggestArgs {
            project: project.to_string(),
            start: Some(date(2025, 1, 20)),
            json,
        };
        let mut output = Vec::new();
        run(&mut output, db, &Config::default(), &args, date(2025, 1, 20))?;
        Ok(String::from_utf8(output)?)
    }

    #[test]
    fn suggest_text_lists_suggestions_and_unassigned() {
        let db = seeded_db();
        let output = run_to_string(&db, "p1", false).unwrap();
        assert!(output.starts_with("Assignment plan for project p1 (from 2025-01-20)"));
        assert!(output.contains("Suggestions (1):\n- t1 API -> alice: 2025-02-03 to"));
        assert!(output.contains("Unassigned (1):\n- t2 Contracts:"));
        assert!(output.contains("Statistics: 2 tasks, 1 assigned, 1 unassigned"));
    }

    #[test]
    fn suggest_json_matches_plan_shape() {
        let db = seeded_db();
        let output = run_to_string(&db, "p1", true).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["project_id"], "p1");
        assert_eq!(value["suggestions"][0]["task_id"], "t1");
        assert_eq!(value["suggestions"][0]["start_date"], "2025-02-03");
        assert_eq!(value["unassigned"][0]["task_id"], "t2");
        assert_eq!(value["statistics"]["total_tasks"], 2);
    }

    #[test]
    fn suggest_unknown_project_fails() {
        let db = seeded_db();
        let err = run_to_string(&db, "nope", false).unwrap_err();
        assert!(err.to_string().contains("failed to plan project nope"));
    }
}
