use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::models::{Application, DocumentKind, Job, JobStatus, NewApplication, ScrapedJob};

impl ToSql for JobStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for JobStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

impl ToSql for DocumentKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for DocumentKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(i64),
    Duplicate(i64),
}

impl InsertOutcome {
    pub fn id(&self) -> i64 {
        match self {
            InsertOutcome::Inserted(id) | InsertOutcome::Duplicate(id) => *id,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    /// Only jobs with no generated application yet.
    pub pending: bool,
}

const JOB_COLUMNS: &str = "id, source, external_id, title, company, location, description, url,
     salary, posted_date, status, discovered_at, updated_at";

pub struct Database {
    conn: Connection,
    path: PathBuf,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source TEXT NOT NULL,
                external_id TEXT NOT NULL,
                title TEXT NOT NULL,
                company TEXT NOT NULL,
                location TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL DEFAULT '',
                url TEXT NOT NULL DEFAULT '',
                salary TEXT,
                posted_date TEXT,
                status TEXT NOT NULL DEFAULT 'not_applied'
                    CHECK (status IN ('not_applied', 'generated', 'applied')),
                discovered_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (source, external_id)
            );

            CREATE TABLE IF NOT EXISTS applications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                job_id INTEGER NOT NULL REFERENCES jobs(id),
                kind TEXT NOT NULL CHECK (kind IN ('resume', 'cover_letter')),
                markdown_path TEXT NOT NULL,
                pdf_path TEXT,
                model TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
            CREATE INDEX IF NOT EXISTS idx_applications_job ON applications(job_id);
            "#,
        )?;
        info!(path = %self.path.display(), "database initialized");
        Ok(())
    }

    pub fn ensure_initialized(&self) -> Result<()> {
        let tables: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('jobs', 'applications')",
            [],
            |row| row.get(0),
        )?;
        if tables < 2 {
            return Err(anyhow!("Database not initialized. Run 'jobkit init' first."));
        }
        Ok(())
    }

    // --- Job operations ---

    /// Stores a scraped posting unless `(source, external_id)` is already
    /// known, in which case the stored row is left untouched.
    pub fn insert_job(&self, job: &ScrapedJob) -> Result<InsertOutcome> {
        let now = Utc::now();
        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO jobs
                (source, external_id, title, company, location, description, url,
                 salary, posted_date, status, discovered_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
            params![
                job.source,
                job.external_id,
                job.title,
                job.company,
                job.location,
                job.description,
                job.url,
                job.salary,
                job.posted_date,
                JobStatus::NotApplied,
                now,
            ],
        )?;

        if changed == 1 {
            let id = self.conn.last_insert_rowid();
            debug!(id, source = %job.source, external_id = %job.external_id, "stored job");
            return Ok(InsertOutcome::Inserted(id));
        }

        let id: i64 = self
            .conn
            .query_row(
                "SELECT id FROM jobs WHERE source = ?1 AND external_id = ?2",
                params![job.source, job.external_id],
                |row| row.get(0),
            )
            .context("Insert was ignored but no existing job was found")?;
        debug!(id, external_id = %job.external_id, "job already stored");
        Ok(InsertOutcome::Duplicate(id))
    }

    /// Newest first.
    pub fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>> {
        let mut sql = format!("SELECT {} FROM jobs j WHERE 1=1", JOB_COLUMNS);
        if filter.status.is_some() {
            sql.push_str(" AND j.status = ?1");
        }
        if filter.pending {
            sql.push_str(" AND NOT EXISTS (SELECT 1 FROM applications a WHERE a.job_id = j.id)");
        }
        sql.push_str(" ORDER BY j.discovered_at DESC, j.id DESC");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = match filter.status {
            Some(status) => stmt.query_map([status], Self::row_to_job)?,
            None => stmt.query_map([], Self::row_to_job)?,
        };

        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list jobs")
    }

    pub fn get_job(&self, id: i64) -> Result<Option<Job>> {
        let result = self.conn.query_row(
            &format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS),
            [id],
            Self::row_to_job,
        );
        match result {
            Ok(job) => Ok(Some(job)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn find_job(&self, source: &str, external_id: &str) -> Result<Option<Job>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {} FROM jobs WHERE source = ?1 AND external_id = ?2",
                    JOB_COLUMNS
                ),
                params![source, external_id],
                Self::row_to_job,
            )
            .optional()
            .context("Failed to look up job")
    }

    pub fn set_status(&self, id: i64, status: JobStatus) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE jobs SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status, Utc::now(), id],
        )?;
        if changed == 0 {
            bail!("Job {} not found", id);
        }
        info!(id, %status, "job status updated");
        Ok(())
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<Job> {
        Ok(Job {
            id: row.get(0)?,
            source: row.get(1)?,
            external_id: row.get(2)?,
            title: row.get(3)?,
            company: row.get(4)?,
            location: row.get(5)?,
            description: row.get(6)?,
            url: row.get(7)?,
            salary: row.get(8)?,
            posted_date: row.get(9)?,
            status: row.get(10)?,
            discovered_at: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }

    // --- Application operations ---

    /// Records generated documents and marks the job as generated, all in
    /// one transaction. A job already marked applied keeps that status.
    pub fn record_applications(&self, job_id: i64, docs: &[NewApplication]) -> Result<Vec<i64>> {
        let tx = self.conn.unchecked_transaction()?;
        let now = Utc::now();
        let mut ids = Vec::with_capacity(docs.len());

        for doc in docs {
            tx.execute(
                "INSERT INTO applications (job_id, kind, markdown_path, pdf_path, model, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![job_id, doc.kind, doc.markdown_path, doc.pdf_path, doc.model, now],
            )?;
            ids.push(tx.last_insert_rowid());
        }

        let changed = tx.execute(
            "UPDATE jobs SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
            params![JobStatus::Generated, now, job_id, JobStatus::NotApplied],
        )?;
        tx.commit()?;

        debug!(job_id, documents = ids.len(), status_changed = changed == 1, "recorded applications");
        Ok(ids)
    }

    pub fn list_applications(&self, job_id: i64) -> Result<Vec<Application>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, job_id, kind, markdown_path, pdf_path, model, created_at
             FROM applications WHERE job_id = ?1 ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt.query_map([job_id], |row| {
            Ok(Application {
                id: row.get(0)?,
                job_id: row.get(1)?,
                kind: row.get(2)?,
                markdown_path: row.get(3)?,
                pdf_path: row.get(4)?,
                model: row.get(5)?,
                created_at: row.get(6)?,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list applications")
    }
}
