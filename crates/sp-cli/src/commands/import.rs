//! Import command for loading planning inputs into the local `SQLite` store.
//!
//! Input is JSON lines, one record per line, tagged by `kind`:
//!
//! ```text
//! {"kind":"contributor","id":"alice","name":"Alice"}
//! {"kind":"employment_term","contributor_id":"alice","weekly_hours":35,"start_date":"2025-01-01","profiles":["backend"]}
//! {"kind":"time_entry","contributor_id":"alice","project_id":"p1","date":"2025-01-06","hours":7}
//! ```

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde::{Deserialize, Serialize};

use sp_core::{
    Contributor, EmploymentTerm, PlannedAllocation, Project, ProjectTask, TimeEntry,
};
use sp_db::Database;

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// JSON-lines file to read; stdin when omitted.
    #[arg(long)]
    pub file: Option<PathBuf>,
}

/// One input record.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ImportRecord {
    Contributor(Contributor),
    EmploymentTerm(EmploymentTerm),
    TimeEntry(TimeEntry),
    Allocation(PlannedAllocation),
    Project(Project),
    Task(ProjectTask),
}

/// Records written per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub contributors: usize,
    pub employment_terms: usize,
    pub time_entries: usize,
    pub allocations: usize,
    pub projects: usize,
    pub tasks: usize,
}

#[derive(Debug, Default)]
struct ImportBatch {
    contributors: Vec<Contributor>,
    terms: Vec<EmploymentTerm>,
    entries: Vec<TimeEntry>,
    allocations: Vec<PlannedAllocation>,
    projects: Vec<Project>,
    tasks: Vec<ProjectTask>,
}

impl ImportBatch {
    fn push(&mut self, record: ImportRecord) {
        match record {
            ImportRecord::Contributor(c) => self.contributors.push(c),
            ImportRecord::EmploymentTerm(t) => self.terms.push(t),
            ImportRecord::TimeEntry(e) => self.entries.push(e),
            ImportRecord::Allocation(a) => self.allocations.push(a),
            ImportRecord::Project(p) => self.projects.push(p),
            ImportRecord::Task(t) => self.tasks.push(t),
        }
    }
}

pub fn run<R: BufRead, W: Write>(
    reader: R,
    writer: &mut W,
    db: &mut Database,
) -> Result<ImportSummary> {
    let batch = parse_records(reader)?;
    let summary = write_batch(db, &batch)?;

    writeln!(
        writer,
        "Imported {} contributors, {} employment terms, {} time entries, {} allocations, {} projects, {} tasks",
        summary.contributors,
        summary.employment_terms,
        summary.time_entries,
        summary.allocations,
        summary.projects,
        summary.tasks,
    )?;
    Ok(summary)
}

fn parse_records<R: BufRead>(reader: R) -> Result<ImportBatch> {
    let mut batch = ImportBatch::default();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", idx + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let record: ImportRecord = serde_json::from_str(trimmed)
            .with_context(|| format!("invalid record on line {}", idx + 1))?;
        batch.push(record);
    }
    Ok(batch)
}

/// Writes records in dependency order so foreign keys resolve.
fn write_batch(db: &mut Database, batch: &ImportBatch) -> Result<ImportSummary> {
    for contributor in &batch.contributors {
        db.upsert_contributor(contributor)
            .with_context(|| format!("failed to import contributor {}", contributor.id))?;
    }
    for project in &batch.projects {
        db.upsert_project(project)
            .with_context(|| format!("failed to import project {}", project.id))?;
    }
    for term in &batch.terms {
        db.insert_employment_term(term).with_context(|| {
            format!(
                "failed to import employment term for {} starting {}",
                term.contributor_id, term.start_date
            )
        })?;
    }
    for task in &batch.tasks {
        db.upsert_task(task)
            .with_context(|| format!("failed to import task {}", task.id))?;
    }
    db.insert_time_entries(&batch.entries)
        .context("failed to import time entries")?;
    db.insert_allocations(&batch.allocations)
        .context("failed to import allocations")?;

    tracing::debug!(
        contributors = batch.contributors.len(),
        time_entries = batch.entries.len(),
        "import complete"
    );

    Ok(ImportSummary {
        contributors: batch.contributors.len(),
        employment_terms: batch.terms.len(),
        time_entries: batch.entries.len(),
        allocations: batch.allocations.len(),
        projects: batch.projects.len(),
        tasks: batch.tasks.len(),
    })
}
