use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::FeedError;
use crate::filters::JobQuery;
use crate::models::{
    format_timestamp, parse_timestamp, Application, ApplicationStatus, JobPosting, NewJob,
    Profile, Role, SalaryRange,
};

const JOB_COLUMNS: &str = "id, title, company_name, location, location_type, job_type, \
    salary_min, salary_max, description, requirements, benefits, employer_id, created_at";

pub struct Database {
    conn: Connection,
    path: PathBuf,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        Self::configure(&conn)?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure(&conn)?;
        Ok(Self {
            conn,
            path: PathBuf::from(":memory:"),
        })
    }

    // Foreign keys are a per-connection setting in SQLite
    fn configure(conn: &Connection) -> Result<()> {
        conn.pragma_update(None, "foreign_keys", true)
            .context("Failed to enable foreign keys")?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS profiles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                full_name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE COLLATE NOCASE,
                role TEXT NOT NULL DEFAULT 'seeker' CHECK (role IN ('seeker', 'employer')),
                company_name TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                company_name TEXT NOT NULL,
                location TEXT,
                location_type TEXT NOT NULL DEFAULT 'onsite' CHECK (location_type IN ('onsite', 'remote', 'hybrid')),
                job_type TEXT NOT NULL DEFAULT 'full-time' CHECK (job_type IN ('full-time', 'part-time', 'contract', 'internship')),
                salary_min INTEGER,
                salary_max INTEGER,
                description TEXT NOT NULL,
                requirements TEXT NOT NULL DEFAULT '[]',
                benefits TEXT NOT NULL DEFAULT '[]',
                employer_id INTEGER NOT NULL REFERENCES profiles(id),
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS applications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                job_id INTEGER NOT NULL REFERENCES jobs(id),
                seeker_id INTEGER NOT NULL REFERENCES profiles(id),
                cover_letter TEXT,
                resume_url TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'reviewed', 'accepted', 'rejected')),
                applied_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_feed ON jobs(created_at DESC, id ASC);
            CREATE INDEX IF NOT EXISTS idx_jobs_employer ON jobs(employer_id);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_applications_once ON applications(job_id, seeker_id);
            "#,
        )?;
        Ok(())
    }

    pub fn ensure_initialized(&self) -> Result<()> {
        let tables: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='jobs'",
            [],
            |row| row.get(0),
        )?;
        if tables == 0 {
            return Err(anyhow!(
                "Database not initialized. Run 'jobboard init' first."
            ));
        }
        Ok(())
    }

    // --- Profile operations ---

    pub fn create_profile(
        &self,
        full_name: &str,
        email: &str,
        role: Role,
        company_name: Option<&str>,
    ) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO profiles (full_name, email, role, company_name) VALUES (?1, ?2, ?3, ?4)",
                params![full_name, email, role.as_str(), company_name],
            )
            .with_context(|| format!("Failed to create profile for {}", email))?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_profile(&self, id: i64) -> Result<Option<Profile>> {
        self.conn
            .query_row(
                "SELECT id, full_name, email, role, company_name, created_at
                 FROM profiles WHERE id = ?1",
                [id],
                Self::row_to_profile,
            )
            .optional()
            .context("Failed to load profile")
    }

    pub fn get_profile_by_email(&self, email: &str) -> Result<Option<Profile>> {
        self.conn
            .query_row(
                "SELECT id, full_name, email, role, company_name, created_at
                 FROM profiles WHERE email = ?1",
                [email],
                Self::row_to_profile,
            )
            .optional()
            .context("Failed to load profile")
    }

    fn row_to_profile(row: &rusqlite::Row) -> rusqlite::Result<Profile> {
        let role: String = row.get(3)?;
        Ok(Profile {
            id: row.get(0)?,
            full_name: row.get(1)?,
            email: row.get(2)?,
            role: role.parse().map_err(|e| conversion_error(3, e))?,
            company_name: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    // --- Job operations ---

    pub fn insert_job(&self, job: &NewJob, employer_id: i64) -> Result<i64> {
        let requirements = serde_json::to_string(&job.requirements)?;
        let benefits = serde_json::to_string(&job.benefits)?;
        self.conn.execute(
            "INSERT INTO jobs (title, company_name, location, location_type, job_type,
                               salary_min, salary_max, description, requirements, benefits,
                               employer_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                job.title,
                job.company_name,
                job.location,
                job.location_type.as_str(),
                job.job_type.as_str(),
                job.salary.min,
                job.salary.max,
                job.description,
                requirements,
                benefits,
                employer_id,
                format_timestamp(&Utc::now()),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_job(&self, id: i64) -> Result<Option<JobPosting>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS),
                [id],
                Self::row_to_job,
            )
            .optional()
            .context("Failed to load job")
    }

    pub fn fetch_page(
        &self,
        query: &JobQuery,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<JobPosting>, FeedError> {
        let page = query.to_sql(JOB_COLUMNS, offset, limit);
        debug!(sql = %page.sql, "fetching page from sqlite");
        let mut stmt = self.conn.prepare(&page.sql)?;
        let rows = stmt.query_map(params_from_iter(page.params.iter()), Self::row_to_job)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn list_jobs_for_employer(&self, employer_id: i64) -> Result<Vec<JobPosting>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM jobs WHERE employer_id = ?1 ORDER BY created_at DESC, id ASC",
            JOB_COLUMNS
        ))?;
        let rows = stmt.query_map([employer_id], Self::row_to_job)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list employer jobs")
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<JobPosting> {
        let location_type: String = row.get(4)?;
        let job_type: String = row.get(5)?;
        let requirements: String = row.get(9)?;
        let benefits: String = row.get(10)?;
        let created_at: String = row.get(12)?;
        Ok(JobPosting {
            id: row.get(0)?,
            title: row.get(1)?,
            company_name: row.get(2)?,
            location: row.get(3)?,
            location_type: location_type.parse().map_err(|e| conversion_error(4, e))?,
            job_type: job_type.parse().map_err(|e| conversion_error(5, e))?,
            salary: SalaryRange {
                min: row.get(6)?,
                max: row.get(7)?,
            },
            description: row.get(8)?,
            requirements: serde_json::from_str(&requirements).map_err(|e| conversion_error(9, e))?,
            benefits: serde_json::from_str(&benefits).map_err(|e| conversion_error(10, e))?,
            employer_id: row.get(11)?,
            created_at: parse_timestamp(&created_at).map_err(|e| conversion_error(12, e))?,
        })
    }

    // --- Application operations ---

    pub fn insert_application(
        &self,
        job_id: i64,
        seeker_id: i64,
        resume_url: &str,
        cover_letter: Option<&str>,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO applications (job_id, seeker_id, cover_letter, resume_url, applied_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                job_id,
                seeker_id,
                cover_letter,
                resume_url,
                format_timestamp(&Utc::now())
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn has_applied(&self, job_id: i64, seeker_id: i64) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM applications WHERE job_id = ?1 AND seeker_id = ?2",
                [job_id, seeker_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn list_applications(&self, job_id: i64) -> Result<Vec<Application>> {
        let mut stmt = self.conn.prepare(
            "SELECT a.id, a.job_id, a.seeker_id, p.full_name, p.email, a.cover_letter,
                    a.resume_url, a.status, a.applied_at
             FROM applications a
             JOIN profiles p ON a.seeker_id = p.id
             WHERE a.job_id = ?1
             ORDER BY a.applied_at DESC, a.id DESC",
        )?;
        let rows = stmt.query_map([job_id], Self::row_to_application)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list applications")
    }

    pub fn get_application(&self, id: i64) -> Result<Option<Application>> {
        self.conn
            .query_row(
                "SELECT a.id, a.job_id, a.seeker_id, p.full_name, p.email, a.cover_letter,
                        a.resume_url, a.status, a.applied_at
                 FROM applications a
                 JOIN profiles p ON a.seeker_id = p.id
                 WHERE a.id = ?1",
                [id],
                Self::row_to_application,
            )
            .optional()
            .context("Failed to load application")
    }

    pub fn update_application_status(&self, id: i64, status: ApplicationStatus) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE applications SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id],
        )?;
        if changed == 0 {
            return Err(anyhow!("Application #{} not found", id));
        }
        Ok(())
    }

    fn row_to_application(row: &rusqlite::Row) -> rusqlite::Result<Application> {
        let status: String = row.get(7)?;
        Ok(Application {
            id: row.get(0)?,
            job_id: row.get(1)?,
            seeker_id: row.get(2)?,
            seeker_name: row.get(3)?,
            seeker_email: row.get(4)?,
            cover_letter: row.get(5)?,
            resume_url: row.get(6)?,
            status: status.parse().map_err(|e| conversion_error(7, e))?,
            applied_at: row.get(8)?,
        })
    }
}

fn conversion_error<E>(column: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(err))
}
