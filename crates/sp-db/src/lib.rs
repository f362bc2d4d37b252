//! Storage layer for the staffing planner.
//!
//! Provides persistence for contributors, employment terms, logged time,
//! planned allocations, project tasks and staffing metric snapshots using
//! `rusqlite`, and implements the `sp-core` query traits on top of it.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! A `Database` can be moved between threads but not shared. The metrics
//! calculator therefore fetches inputs on the calling thread and only
//! parallelizes the pure computation.
//!
//! # Schema
//!
//! ## Date Format
//!
//! Calendar dates are stored as TEXT in ISO 8601 format (`2025-01-13`) so
//! lexicographic ordering matches chronological ordering and range filters
//! can be pushed down to SQL. `computed_at` is stored as RFC 3339 UTC.
//!
//! ## Profiles
//!
//! `employment_terms.profiles` stores a JSON array of profile IDs. Lookups by
//! profile go through `json_each`.
//!
//! ## Snapshot Uniqueness
//!
//! `staffing_metrics` carries `UNIQUE(contributor_id, period_start, granularity)`.
//! Inserts use `INSERT OR IGNORE`, so repeated runs never duplicate rows.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use serde::Serialize;
use thiserror::Error;

use sp_core::{
    AllocationStatus, Contributor, ContributorId, EmploymentTerm, Granularity, MetricStore,
    PersistOutcome, PlannedAllocation, ProfileId, Project, ProjectId, ProjectSource, ProjectTask,
    SourceError, StaffingMetric, StaffingSource, TaskId, TaskStatus, TimeEntry, ValidationError,
};

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A stored date or timestamp could not be parsed.
    #[error("invalid date in {column}: {value}")]
    DateParse {
        column: &'static str,
        value: String,
        #[source]
        source: chrono::ParseError,
    },
    /// A stored value does not map back to a domain type.
    #[error("invalid data in {column}: {message}")]
    InvalidData {
        column: &'static str,
        message: String,
    },
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

/// Row count of one table, for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableCount {
    pub table: &'static str,
    pub rows: u64,
}

const TABLES: [&str; 7] = [
    "contributors",
    "employment_terms",
    "time_entries",
    "planned_allocations",
    "projects",
    "project_tasks",
    "staffing_metrics",
];

const METRIC_COLUMNS: &str = "id, contributor_id, period_start, period_end, granularity, \
     expected_hours, worked_hours, planned_hours, staffing_rate, tace, computed_at";

const TASK_COLUMNS: &str = "id, project_id, name, required_profile, estimated_hours_sold, \
     estimated_hours_revised, logged_hours, active, counts_for_profitability, status, \
     assigned_contributor, under_resourced, position";

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS contributors (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1
            );

            -- profiles: JSON array of profile IDs
            CREATE TABLE IF NOT EXISTS employment_terms (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                contributor_id TEXT NOT NULL,
                weekly_hours REAL NOT NULL,
                work_time_percentage REAL NOT NULL DEFAULT 100,
                start_date TEXT NOT NULL,
                end_date TEXT,
                profiles TEXT NOT NULL DEFAULT '[]',
                UNIQUE (contributor_id, start_date),
                FOREIGN KEY (contributor_id) REFERENCES contributors(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS time_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                contributor_id TEXT NOT NULL,
                project_id TEXT NOT NULL,
                date TEXT NOT NULL,
                hours REAL NOT NULL,
                UNIQUE (contributor_id, project_id, date),
                FOREIGN KEY (contributor_id) REFERENCES contributors(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_time_entries_contributor_date
                ON time_entries(contributor_id, date);

            CREATE TABLE IF NOT EXISTS planned_allocations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                contributor_id TEXT NOT NULL,
                project_id TEXT NOT NULL,
                start_date TEXT NOT NULL,
                end_date TEXT NOT NULL,
                daily_hours REAL NOT NULL,
                status TEXT NOT NULL DEFAULT 'planned',
                UNIQUE (contributor_id, project_id, start_date),
                FOREIGN KEY (contributor_id) REFERENCES contributors(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_allocations_contributor
                ON planned_allocations(contributor_id, start_date);

            CREATE TABLE IF NOT EXISTS projects (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                start_date TEXT
            );

            CREATE TABLE IF NOT EXISTS project_tasks (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                name TEXT NOT NULL,
                required_profile TEXT,
                estimated_hours_sold REAL,
                estimated_hours_revised REAL,
                logged_hours REAL NOT NULL DEFAULT 0,
                active INTEGER NOT NULL DEFAULT 1,
                counts_for_profitability INTEGER NOT NULL DEFAULT 1,
                status TEXT NOT NULL DEFAULT 'todo',
                assigned_contributor TEXT,
                under_resourced INTEGER NOT NULL DEFAULT 0,
                position INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_project_tasks_project ON project_tasks(project_id);
            CREATE INDEX IF NOT EXISTS idx_project_tasks_assignee ON project_tasks(assigned_contributor);

            -- Staffing metric snapshots, one per (contributor, period, granularity)
            -- staffing_rate / tace: NULL when expected_hours is zero
            CREATE TABLE IF NOT EXISTS staffing_metrics (
                id TEXT PRIMARY KEY,
                contributor_id TEXT NOT NULL,
                period_start TEXT NOT NULL,
                period_end TEXT NOT NULL,
                granularity TEXT NOT NULL,
                expected_hours REAL NOT NULL,
                worked_hours REAL NOT NULL,
                planned_hours REAL NOT NULL DEFAULT 0,
                staffing_rate REAL,
                tace REAL,
                computed_at TEXT NOT NULL,
                UNIQUE (contributor_id, period_start, granularity),
                FOREIGN KEY (contributor_id) REFERENCES contributors(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_staffing_metrics_period
                ON staffing_metrics(granularity, period_start);
            ",
        )?;
        Ok(())
    }

    /// Inserts or updates a contributor by ID.
    pub fn upsert_contributor(&mut self, contributor: &Contributor) -> Result<(), DbError> {
        self.conn.execute(
            "
            INSERT INTO contributors (id, name, active) VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET name = excluded.name, active = excluded.active
            ",
            params![contributor.id.as_str(), contributor.name, contributor.active],
        )?;
        Ok(())
    }

    /// Inserts an employment term, replacing the one with the same start date.
    pub fn insert_employment_term(&mut self, term: &EmploymentTerm) -> Result<(), DbError> {
        let profiles = profiles_to_json(&term.profiles)?;
        self.conn.execute(
            "
            INSERT INTO employment_terms
            (contributor_id, weekly_hours, work_time_percentage, start_date, end_date, profiles)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(contributor_id, start_date) DO UPDATE SET
                weekly_hours = excluded.weekly_hours,
                work_time_percentage = excluded.work_time_percentage,
                end_date = excluded.end_date,
                profiles = excluded.profiles
            ",
            params![
                term.contributor_id.as_str(),
                term.weekly_hours,
                term.work_time_percentage,
                format_date(term.start_date),
                term.end_date.map(format_date),
                profiles,
            ],
        )?;
        Ok(())
    }

    /// Inserts a batch of time entries in one transaction.
    ///
    /// An entry for an existing (contributor, project, date) replaces its hours.
    pub fn insert_time_entries(&mut self, entries: &[TimeEntry]) -> Result<usize, DbError> {
        if entries.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(
                "
                INSERT INTO time_entries (contributor_id, project_id, date, hours)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(contributor_id, project_id, date) DO UPDATE SET hours = excluded.hours
                ",
            )?;
            for entry in entries {
                written += stmt.execute(params![
                    entry.contributor_id.as_str(),
                    entry.project_id.as_str(),
                    format_date(entry.date),
                    entry.hours,
                ])?;
            }
        }
        tx.commit()?;
        Ok(written)
    }

    /// Inserts a batch of planned allocations in one transaction.
    ///
    /// An allocation for an existing (contributor, project, start date)
    /// replaces it.
    pub fn insert_allocations(&mut self, allocations: &[PlannedAllocation]) -> Result<usize, DbError> {
        if allocations.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(
                "
                INSERT INTO planned_allocations
                (contributor_id, project_id, start_date, end_date, daily_hours, status)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(contributor_id, project_id, start_date) DO UPDATE SET
                    end_date = excluded.end_date,
                    daily_hours = excluded.daily_hours,
                    status = excluded.status
                ",
            )?;
            for alloc in allocations {
                written += stmt.execute(params![
                    alloc.contributor_id.as_str(),
                    alloc.project_id.as_str(),
                    format_date(alloc.start_date),
                    format_date(alloc.end_date),
                    alloc.daily_hours,
                    alloc.status.as_str(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(written)
    }

    /// Inserts or updates a project by ID.
    pub fn upsert_project(&mut self, project: &Project) -> Result<(), DbError> {
        self.conn.execute(
            "
            INSERT INTO projects (id, name, active, start_date) VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                active = excluded.active,
                start_date = excluded.start_date
            ",
            params![
                project.id.as_str(),
                project.name,
                project.active,
                project.start_date.map(format_date),
            ],
        )?;
        Ok(())
    }

    /// Inserts or updates a task by ID.
    pub fn upsert_task(&mut self, task: &ProjectTask) -> Result<(), DbError> {
        self.conn.execute(
            &format!(
                "
                INSERT OR REPLACE INTO project_tasks ({TASK_COLUMNS})
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "
            ),
            params![
                task.id.as_str(),
                task.project_id.as_str(),
                task.name,
                task.required_profile.as_ref().map(ProfileId::as_str),
                task.estimated_hours_sold,
                task.estimated_hours_revised,
                task.logged_hours,
                task.active,
                task.counts_for_profitability,
                task.status.as_str(),
                task.assigned_contributor.as_ref().map(ContributorId::as_str),
                task.under_resourced,
                task.position,
            ],
        )?;
        Ok(())
    }

    /// Inserts snapshots in one transaction, ignoring existing keys.
    ///
    /// Rows that fail (e.g. unknown contributor) are logged and counted;
    /// the rest of the batch is still committed.
    pub fn insert_metrics(&mut self, metrics: &[StaffingMetric]) -> Result<PersistOutcome, DbError> {
        let tx = self.conn.transaction()?;
        let outcome = insert_metrics_tx(&tx, metrics)?;
        tx.commit()?;
        Ok(outcome)
    }

    /// Deletes the snapshots of `granularity` belonging to `contributors`
    /// whose period starts within `[start, end]` and inserts `metrics`, in
    /// one transaction.
    pub fn replace_metrics(
        &mut self,
        granularity: Granularity,
        start: NaiveDate,
        end: NaiveDate,
        contributors: &[ContributorId],
        metrics: &[StaffingMetric],
    ) -> Result<PersistOutcome, DbError> {
        let tx = self.conn.transaction()?;
        let deleted = delete_metrics_tx(&tx, granularity, start, end, contributors)?;
        let outcome = insert_metrics_tx(&tx, metrics)?;
        tx.commit()?;
        Ok(PersistOutcome { deleted, ..outcome })
    }

    /// Counts snapshots of `granularity` whose period starts within `[start, end]`.
    pub fn metric_count(
        &self,
        granularity: Granularity,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<u64, DbError> {
        let count: i64 = self.conn.query_row(
            "
            SELECT COUNT(*) FROM staffing_metrics
            WHERE granularity = ? AND period_start >= ? AND period_start <= ?
            ",
            params![granularity.as_str(), format_date(start), format_date(end)],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Row counts for every table.
    pub fn table_counts(&self) -> Result<Vec<TableCount>, DbError> {
        let mut counts = Vec::with_capacity(TABLES.len());
        for table in TABLES {
            let rows: i64 =
                self.conn
                    .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
            counts.push(TableCount {
                table,
                rows: u64::try_from(rows).unwrap_or_default(),
            });
        }
        Ok(counts)
    }

    fn query_contributors(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Contributor>, DbError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, bool>(2)?,
            ))
        })?;
        let mut contributors = Vec::new();
        for row in rows {
            let (id, name, active) = row?;
            contributors.push(Contributor {
                id: parse_id(id, "contributors.id")?,
                name,
                active,
            });
        }
        Ok(contributors)
    }

    fn query_tasks(&self, filter: &str, params: impl rusqlite::Params) -> Result<Vec<ProjectTask>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM project_tasks WHERE {filter} ORDER BY position ASC, id ASC"
        ))?;
        let rows = stmt.query_map(params, |row| {
            Ok(TaskRow {
                id: row.get(0)?,
                project_id: row.get(1)?,
                name: row.get(2)?,
                required_profile: row.get(3)?,
                estimated_hours_sold: row.get(4)?,
                estimated_hours_revised: row.get(5)?,
                logged_hours: row.get(6)?,
                active: row.get(7)?,
                counts_for_profitability: row.get(8)?,
                status: row.get(9)?,
                assigned_contributor: row.get(10)?,
                under_resourced: row.get(11)?,
                position: row.get(12)?,
            })
        })?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row?.into_task()?);
        }
        Ok(tasks)
    }

    fn load_terms(&self, contributor: &ContributorId) -> Result<Vec<EmploymentTerm>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT weekly_hours, work_time_percentage, start_date, end_date, profiles
            FROM employment_terms
            WHERE contributor_id = ?
            ORDER BY start_date ASC
            ",
        )?;
        let rows = stmt.query_map([contributor.as_str()], |row| {
            Ok((
                row.get::<_, f64>(0)?,
                row.get::<_, f64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;
        let mut terms = Vec::new();
        for row in rows {
            let (weekly_hours, work_time_percentage, start, end, profiles) = row?;
            terms.push(EmploymentTerm {
                contributor_id: contributor.clone(),
                weekly_hours,
                work_time_percentage,
                start_date: parse_date(&start, "employment_terms.start_date")?,
                end_date: end
                    .map(|end| parse_date(&end, "employment_terms.end_date"))
                    .transpose()?,
                profiles: profiles_from_json(&profiles)?,
            });
        }
        Ok(terms)
    }

    fn load_time_entries(
        &self,
        contributor: &ContributorId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<TimeEntry>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT project_id, date, hours
            FROM time_entries
            WHERE contributor_id = ? AND date >= ? AND date <= ?
            ORDER BY date ASC, project_id ASC
            ",
        )?;
        let rows = stmt.query_map(
            params![contributor.as_str(), format_date(start), format_date(end)],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                ))
            },
        )?;
        let mut entries = Vec::new();
        for row in rows {
            let (project_id, date, hours) = row?;
            entries.push(TimeEntry {
                contributor_id: contributor.clone(),
                project_id: parse_id(project_id, "time_entries.project_id")?,
                date: parse_date(&date, "time_entries.date")?,
                hours,
            });
        }
        Ok(entries)
    }

    fn load_allocations(
        &self,
        contributor: &ContributorId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PlannedAllocation>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT project_id, start_date, end_date, daily_hours, status
            FROM planned_allocations
            WHERE contributor_id = ? AND start_date <= ? AND end_date >= ?
            ORDER BY start_date ASC, project_id ASC
            ",
        )?;
        let rows = stmt.query_map(
            params![contributor.as_str(), format_date(end), format_date(start)],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )?;
        let mut allocations = Vec::new();
        for row in rows {
            let (project_id, start_date, end_date, daily_hours, status) = row?;
            allocations.push(PlannedAllocation {
                contributor_id: contributor.clone(),
                project_id: parse_id(project_id, "planned_allocations.project_id")?,
                start_date: parse_date(&start_date, "planned_allocations.start_date")?,
                end_date: parse_date(&end_date, "planned_allocations.end_date")?,
                daily_hours,
                status: status
                    .parse::<AllocationStatus>()
                    .map_err(|message| DbError::InvalidData {
                        column: "planned_allocations.status",
                        message,
                    })?,
            });
        }
        Ok(allocations)
    }

    fn load_project(&self, id: &ProjectId) -> Result<Option<Project>, DbError> {
        let row = self
            .conn
            .query_row(
                "SELECT name, active, start_date FROM projects WHERE id = ?",
                [id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, bool>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                },
            )
            .optional()?;
        let Some((name, active, start_date)) = row else {
            return Ok(None);
        };
        Ok(Some(Project {
            id: id.clone(),
            name,
            active,
            start_date: start_date
                .map(|d| parse_date(&d, "projects.start_date"))
                .transpose()?,
        }))
    }

    fn load_active_projects(&self) -> Result<Vec<Project>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, start_date FROM projects WHERE active = 1 ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })?;
        let mut projects = Vec::new();
        for row in rows {
            let (id, name, start_date) = row?;
            projects.push(Project {
                id: parse_id(id, "projects.id")?,
                name,
                active: true,
                start_date: start_date
                    .map(|d| parse_date(&d, "projects.start_date"))
                    .transpose()?,
            });
        }
        Ok(projects)
    }

    fn load_metrics(
        &self,
        granularity: Granularity,
        start: NaiveDate,
        end: NaiveDate,
        contributor: Option<&ContributorId>,
    ) -> Result<Vec<StaffingMetric>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "
            SELECT {METRIC_COLUMNS}
            FROM staffing_metrics
            WHERE granularity = ?1 AND period_start >= ?2 AND period_start <= ?3
              AND (?4 IS NULL OR contributor_id = ?4)
            ORDER BY contributor_id ASC, period_start ASC
            "
        ))?;
        let rows = stmt.query_map(
            params![
                granularity.as_str(),
                format_date(start),
                format_date(end),
                contributor.map(ContributorId::as_str),
            ],
            |row| {
                Ok(MetricRow {
                    id: row.get(0)?,
                    contributor_id: row.get(1)?,
                    period_start: row.get(2)?,
                    period_end: row.get(3)?,
                    granularity: row.get(4)?,
                    expected_hours: row.get(5)?,
                    worked_hours: row.get(6)?,
                    planned_hours: row.get(7)?,
                    staffing_rate: row.get(8)?,
                    tace: row.get(9)?,
                    computed_at: row.get(10)?,
                })
            },
        )?;
        let mut metrics = Vec::new();
        for row in rows {
            metrics.push(row?.into_metric()?);
        }
        Ok(metrics)
    }
}

struct TaskRow {
    id: String,
    project_id: String,
    name: String,
    required_profile: Option<String>,
    estimated_hours_sold: Option<f64>,
    estimated_hours_revised: Option<f64>,
    logged_hours: f64,
    active: bool,
    counts_for_profitability: bool,
    status: String,
    assigned_contributor: Option<String>,
    under_resourced: bool,
    position: i64,
}

impl TaskRow {
    fn into_task(self) -> Result<ProjectTask, DbError> {
        Ok(ProjectTask {
            id: parse_id::<TaskId>(self.id, "project_tasks.id")?,
            project_id: parse_id(self.project_id, "project_tasks.project_id")?,
            name: self.name,
            required_profile: self
                .required_profile
                .map(|p| parse_id(p, "project_tasks.required_profile"))
                .transpose()?,
            estimated_hours_sold: self.estimated_hours_sold,
            estimated_hours_revised: self.estimated_hours_revised,
            logged_hours: self.logged_hours,
            active: self.active,
            counts_for_profitability: self.counts_for_profitability,
            status: self
                .status
                .parse::<TaskStatus>()
                .map_err(|message| DbError::InvalidData {
                    column: "project_tasks.status",
                    message,
                })?,
            assigned_contributor: self
                .assigned_contributor
                .map(|c| parse_id(c, "project_tasks.assigned_contributor"))
                .transpose()?,
            under_resourced: self.under_resourced,
            position: self.position,
        })
    }
}

struct MetricRow {
    id: String,
    contributor_id: String,
    period_start: String,
    period_end: String,
    granularity: String,
    expected_hours: f64,
    worked_hours: f64,
    planned_hours: f64,
    staffing_rate: Option<f64>,
    tace: Option<f64>,
    computed_at: String,
}

impl MetricRow {
    fn into_metric(self) -> Result<StaffingMetric, DbError> {
        Ok(StaffingMetric {
            id: self.id,
            contributor_id: parse_id(self.contributor_id, "staffing_metrics.contributor_id")?,
            period_start: parse_date(&self.period_start, "staffing_metrics.period_start")?,
            period_end: parse_date(&self.period_end, "staffing_metrics.period_end")?,
            granularity: self
                .granularity
                .parse::<Granularity>()
                .map_err(|err| DbError::InvalidData {
                    column: "staffing_metrics.granularity",
                    message: err.to_string(),
                })?,
            expected_hours: self.expected_hours,
            worked_hours: self.worked_hours,
            planned_hours: self.planned_hours,
            staffing_rate: self.staffing_rate,
            tace: self.tace,
            computed_at: parse_timestamp(&self.computed_at)?,
        })
    }
}

fn insert_metrics_tx(tx: &Transaction<'_>, metrics: &[StaffingMetric]) -> Result<PersistOutcome, DbError> {
    let mut outcome = PersistOutcome::default();
    if metrics.is_empty() {
        return Ok(outcome);
    }
    let mut stmt = tx.prepare(&format!(
        "
        INSERT OR IGNORE INTO staffing_metrics ({METRIC_COLUMNS})
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "
    ))?;
    for metric in metrics {
        let result = stmt.execute(params![
            metric.id,
            metric.contributor_id.as_str(),
            format_date(metric.period_start),
            format_date(metric.period_end),
            metric.granularity.as_str(),
            metric.expected_hours,
            metric.worked_hours,
            metric.planned_hours,
            metric.staffing_rate,
            metric.tace,
            format_timestamp(metric.computed_at),
        ]);
        match result {
            Ok(0) => outcome.duplicates += 1,
            Ok(_) => outcome.inserted += 1,
            Err(err) => {
                tracing::warn!(
                    contributor = %metric.contributor_id,
                    period_start = %metric.period_start,
                    error = %err,
                    "failed to store staffing metric"
                );
                outcome.failed += 1;
            }
        }
    }
    Ok(outcome)
}

fn delete_metrics_tx(
    tx: &Transaction<'_>,
    granularity: Granularity,
    start: NaiveDate,
    end: NaiveDate,
    contributors: &[ContributorId],
) -> Result<usize, DbError> {
    let mut stmt = tx.prepare(
        "
        DELETE FROM staffing_metrics
        WHERE granularity = ? AND period_start >= ? AND period_start <= ?
          AND contributor_id = ?
        ",
    )?;
    let (start, end) = (format_date(start), format_date(end));
    let mut deleted = 0;
    for contributor in contributors {
        deleted += stmt.execute(params![
            granularity.as_str(),
            start,
            end,
            contributor.as_str()
        ])?;
    }
    Ok(deleted)
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn parse_date(value: &str, column: &'static str) -> Result<NaiveDate, DbError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|source| DbError::DateParse {
        column,
        value: value.to_string(),
        source,
    })
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::DateParse {
            column: "staffing_metrics.computed_at",
            value: value.to_string(),
            source,
        })
}

fn parse_id<T>(value: String, column: &'static str) -> Result<T, DbError>
where
    T: TryFrom<String, Error = ValidationError>,
{
    T::try_from(value).map_err(|err| DbError::InvalidData {
        column,
        message: err.to_string(),
    })
}

fn profiles_to_json(profiles: &BTreeSet<ProfileId>) -> Result<String, DbError> {
    serde_json::to_string(profiles).map_err(|err| DbError::InvalidData {
        column: "employment_terms.profiles",
        message: err.to_string(),
    })
}

fn profiles_from_json(value: &str) -> Result<BTreeSet<ProfileId>, DbError> {
    serde_json::from_str(value).map_err(|err| DbError::InvalidData {
        column: "employment_terms.profiles",
        message: err.to_string(),
    })
}

impl StaffingSource for Database {
    fn active_contributors(&self) -> Result<Vec<Contributor>, SourceError> {
        self.query_contributors(
            "SELECT id, name, active FROM contributors WHERE active = 1 ORDER BY id ASC",
            [],
        )
        .map_err(SourceError::new)
    }

    fn employment_terms(
        &self,
        contributor: &ContributorId,
    ) -> Result<Vec<EmploymentTerm>, SourceError> {
        self.load_terms(contributor).map_err(SourceError::new)
    }

    fn time_entries(
        &self,
        contributor: &ContributorId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<TimeEntry>, SourceError> {
        self.load_time_entries(contributor, start, end)
            .map_err(SourceError::new)
    }

    fn planned_allocations(
        &self,
        contributor: &ContributorId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PlannedAllocation>, SourceError> {
        self.load_allocations(contributor, start, end)
            .map_err(SourceError::new)
    }
}

impl ProjectSource for Database {
    fn project(&self, id: &ProjectId) -> Result<Option<Project>, SourceError> {
        self.load_project(id).map_err(SourceError::new)
    }

    fn active_projects(&self) -> Result<Vec<Project>, SourceError> {
        self.load_active_projects().map_err(SourceError::new)
    }

    fn project_tasks(&self, project: &ProjectId) -> Result<Vec<ProjectTask>, SourceError> {
        self.query_tasks("project_id = ?", [project.as_str()])
            .map_err(SourceError::new)
    }

    fn tasks_assigned_to(
        &self,
        contributor: &ContributorId,
    ) -> Result<Vec<ProjectTask>, SourceError> {
        self.query_tasks(
            "assigned_contributor = ? AND active = 1 AND status != 'completed'",
            [contributor.as_str()],
        )
        .map_err(SourceError::new)
    }

    fn contributors_with_profile(
        &self,
        profile: &ProfileId,
    ) -> Result<Vec<Contributor>, SourceError> {
        self.query_contributors(
            "
            SELECT DISTINCT c.id, c.name, c.active
            FROM contributors c
            JOIN employment_terms t ON t.contributor_id = c.id
            JOIN json_each(t.profiles) p
            WHERE c.active = 1 AND p.value = ?
            ORDER BY c.id ASC
            ",
            [profile.as_str()],
        )
        .map_err(SourceError::new)
    }

    fn has_project_history(
        &self,
        contributor: &ContributorId,
        project: &ProjectId,
    ) -> Result<bool, SourceError> {
        self.conn
            .query_row(
                "
                SELECT EXISTS (
                    SELECT 1 FROM time_entries WHERE contributor_id = ?1 AND project_id = ?2
                ) OR EXISTS (
                    SELECT 1 FROM planned_allocations
                    WHERE contributor_id = ?1 AND project_id = ?2 AND status != 'cancelled'
                )
                ",
                params![contributor.as_str(), project.as_str()],
                |row| row.get::<_, bool>(0),
            )
            .map_err(SourceError::new)
    }
}

impl MetricStore for Database {
    fn metrics_in_range(
        &self,
        granularity: Granularity,
        start: NaiveDate,
        end: NaiveDate,
        contributor: Option<&ContributorId>,
    ) -> Result<Vec<StaffingMetric>, SourceError> {
        self.load_metrics(granularity, start, end, contributor)
            .map_err(SourceError::new)
    }

    fn insert_metrics(&mut self, metrics: &[StaffingMetric]) -> Result<PersistOutcome, SourceError> {
        Self::insert_metrics(self, metrics).map_err(SourceError::new)
    }

    fn replace_metrics(
        &mut self,
        granularity: Granularity,
        start: NaiveDate,
        end: NaiveDate,
        contributors: &[ContributorId],
        metrics: &[StaffingMetric],
    ) -> Result<PersistOutcome, SourceError> {
        Self::replace_metrics(self, granularity, start, end, contributors, metrics)
            .map_err(SourceError::new)
    }
}
