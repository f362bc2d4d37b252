//! End-to-end tests for the planning flow through the `sp` binary.
//!
//! Tests the full pipeline: import → metrics → workload → recommend → suggest

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

fn sp_binary() -> String {
    env!("CARGO_BIN_EXE_sp").to_string()
}

/// A temp home with a config file pointing at a private database.
struct Workspace {
    temp: TempDir,
    config: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("sp.toml");
        let db_path = temp.path().join("data").join("sp.db");
        std::fs::write(
            &config,
            format!("database_path = {:?}\n", db_path.display().to_string()),
        )
        .unwrap();
        Self { temp, config }
    }

    fn path(&self) -> &Path {
        self.temp.path()
    }

    fn sp(&self, args: &[&str]) -> Output {
        Command::new(sp_binary())
            .env("HOME", self.path())
            .env("XDG_CONFIG_HOME", self.path().join("config"))
            .env("XDG_DATA_HOME", self.path().join("share"))
            .env_remove("RUST_LOG")
            .arg("--config")
            .arg(&self.config)
            .args(args)
            .output()
            .expect("failed to run sp")
    }

    fn sp_ok(&self, args: &[&str]) -> String {
        let output = self.sp(args);
        assert!(
            output.status.success(),
            "sp {args:?} should succeed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8(output.stdout).unwrap()
    }
}

/// Three 35h/week contributors over four weeks starting Monday 2025-01-06.
///
/// - alice (backend) logs 8.4h/day: 120% TACE, critical
/// - bob (backend) logs 3.5h/day: 50% TACE, underutilized
/// - carol (design) logs 5.6h/day: 80% TACE, optimal
fn fixture() -> String {
    let mut lines = String::new();
    let people = [
        ("alice", "Alice", "backend", 8.4),
        ("bob", "Bob", "backend", 3.5),
        ("carol", "Carol", "design", 5.6),
    ];
    for (id, name, profile, _) in people {
        writeln!(lines, r#"{{"kind":"contributor","id":"{id}","name":"{name}"}}"#).unwrap();
        writeln!(
            lines,
            r#"{{"kind":"employment_term","contributor_id":"{id}","weekly_hours":35,"start_date":"2024-01-01","profiles":["{profile}"]}}"#
        )
        .unwrap();
    }
    for week in 0..4 {
        for weekday in 0..5 {
            let day = 6 + week * 7 + weekday;
            let date = if day <= 31 {
                format!("2025-01-{day:02}")
            } else {
                format!("2025-02-{:02}", day - 31)
            };
            for (id, _, _, hours) in people {
                writeln!(
                    lines,
                    r#"{{"kind":"time_entry","contributor_id":"{id}","project_id":"ops","date":"{date}","hours":{hours}}}"#
                )
                .unwrap();
            }
        }
    }
    lines.push_str(r#"{"kind":"project","id":"portal","name":"Portal","start_date":"2025-02-03"}"#);
    lines.push('\n');
    lines.push_str(
        r#"{"kind":"task","id":"api","project_id":"portal","name":"API","required_profile":"backend","estimated_hours_sold":14}"#,
    );
    lines.push('\n');
    lines.push_str(
        r#"{"kind":"task","id":"brand","project_id":"portal","name":"Branding","required_profile":"design","estimated_hours_sold":7}"#,
    );
    lines.push('\n');
    lines
}

fn imported_workspace() -> Workspace {
    let ws = Workspace::new();
    let input = ws.path().join("input.jsonl");
    std::fs::write(&input, fixture()).unwrap();
    let out = ws.sp_ok(&["import", "--file", input.to_str().unwrap()]);
    assert!(
        out.contains("Imported 3 contributors, 3 employment terms, 60 time entries"),
        "{out}"
    );
    ws
}

const RANGE: [&str; 4] = ["--start", "2025-01-06", "--end", "2025-02-02"];

#[test]
fn test_status_on_fresh_database() {
    let ws = Workspace::new();
    let out = ws.sp_ok(&["status"]);
    assert!(out.contains("Staffing planner status"));
    assert!(out.contains("No records stored."));
}

#[test]
fn test_metrics_are_idempotent() {
    let ws = imported_workspace();

    let first = ws.sp_ok(&["metrics", RANGE[0], RANGE[1], RANGE[2], RANGE[3]]);
    assert!(first.contains("Created: 12"), "{first}");

    let second = ws.sp_ok(&["metrics", RANGE[0], RANGE[1], RANGE[2], RANGE[3]]);
    assert!(second.contains("Metrics already exist"), "{second}");

    let status = ws.sp_ok(&["status"]);
    assert!(status.contains("- staffing_metrics: 12"), "{status}");

    let forced = ws.sp_ok(&["metrics", RANGE[0], RANGE[1], RANGE[2], RANGE[3], "--force"]);
    assert!(forced.contains("Deleted: 12"), "{forced}");
    assert!(forced.contains("Created: 12"), "{forced}");

    let status = ws.sp_ok(&["status"]);
    assert!(status.contains("- staffing_metrics: 12"), "{status}");
}

#[test]
fn test_workload_and_recommendations_from_metrics() {
    let ws = imported_workspace();
    ws.sp_ok(&["metrics", RANGE[0], RANGE[1], RANGE[2], RANGE[3]]);

    let workload = ws.sp_ok(&["workload", RANGE[0], RANGE[1], RANGE[2], RANGE[3], "--json"]);
    let value: serde_json::Value = serde_json::from_str(&workload).unwrap();
    assert_eq!(value["critical"][0]["contributor"]["id"], "alice");
    assert_eq!(value["critical"][0]["tace"], 120.0);
    assert_eq!(value["optimal"][0]["contributor"]["id"], "carol");
    assert_eq!(value["underutilized"][0]["contributor"]["id"], "bob");

    let report = ws.sp_ok(&["recommend", RANGE[0], RANGE[1], RANGE[2], RANGE[3], "--json"]);
    let value: serde_json::Value = serde_json::from_str(&report).unwrap();
    assert_eq!(value["recommendations"][0]["kind"], "rebalance-overload");
    assert_eq!(value["recommendations"][0]["contributor"], "alice");
    assert_eq!(value["recommendations"][0]["target"], "bob");
    assert_eq!(value["summary"]["contributors_analyzed"], 3);
    assert_eq!(value["summary"]["critical_workload_count"], 1);
}

#[test]
fn test_suggest_plans_project_tasks() {
    let ws = imported_workspace();

    let plan = ws.sp_ok(&["suggest", "--project", "portal", "--start", "2025-01-27", "--json"]);
    let value: serde_json::Value = serde_json::from_str(&plan).unwrap();
    assert_eq!(value["statistics"]["total_tasks"], 2);
    assert_eq!(value["statistics"]["assigned_tasks"], 2);

    let suggestions = value["suggestions"].as_array().unwrap();
    let brand = suggestions
        .iter()
        .find(|s| s["task_id"] == "brand")
        .expect("branding task suggested");
    assert_eq!(brand["contributor"], "carol");
    assert_eq!(brand["start_date"], "2025-02-03");

    let missing = ws.sp(&["suggest", "--project", "nope"]);
    assert!(!missing.status.success());
    assert!(String::from_utf8_lossy(&missing.stderr).contains("project not found"));
}

#[test]
fn test_import_rejects_bad_line() {
    let ws = Workspace::new();
    let input = ws.path().join("bad.jsonl");
    std::fs::write(
        &input,
        "{\"kind\":\"contributor\",\"id\":\"a\",\"name\":\"A\"}\nnot json\n",
    )
    .unwrap();

    let output = ws.sp(&["import", "--file", input.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid record on line 2"));
}
