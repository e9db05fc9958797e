use crate::error::StoreError;
use crate::i18n::MissReport;
use crate::jobs::{
    check_cooperative_cancel, check_delete, check_force_cancel, clamp_cleanup_days, cleanup_states,
    ImportJob, JobState,
};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex};

/// Most missing-key rows returned by a single read.
const MISSING_KEY_READ_LIMIT: i64 = 500;

/// One append-only log line attached to a job.
#[derive(Debug, Clone, Serialize)]
pub struct JobLogLine {
    pub timestamp: String,
    pub level: String,
    pub message: String,
    pub data: Option<Value>,
}

/// One missing-key counter row.
#[derive(Debug, Clone, Serialize)]
pub struct MissingKeyRow {
    pub id: i64,
    pub namespace: String,
    pub key: String,
    pub locale: String,
    pub path: String,
    pub count: i64,
    pub last_seen_at: String,
}

/// One hierarchical group row.
#[derive(Debug, Clone, Serialize)]
pub struct Group {
    pub id: i64,
    pub org_id: String,
    pub kind: String,
    pub name: String,
    pub parent_id: Option<i64>,
}

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open the database and create tables.
    pub fn new(database_path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(database_path)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS import_jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                requested_by TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'queued',
                cancelled INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                finished_at TEXT,
                stats TEXT
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS job_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                job_id INTEGER NOT NULL,
                timestamp TEXT NOT NULL,
                level TEXT NOT NULL,
                message TEXT NOT NULL,
                data TEXT
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS job_payloads (
                job_id INTEGER PRIMARY KEY,
                payload TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS missing_keys (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                namespace TEXT NOT NULL,
                key TEXT NOT NULL,
                locale TEXT NOT NULL,
                path TEXT NOT NULL,
                count INTEGER NOT NULL DEFAULT 1,
                last_seen_at TEXT NOT NULL,
                UNIQUE (namespace, key, locale)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS item_groups (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                org_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                name TEXT NOT NULL,
                parent_id INTEGER
            )",
            [],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // ==================== Import Jobs ====================

    /// Create a new import job in the queued state and attach its payload.
    pub fn create_job(&self, requested_by: &str, payload: &Value) -> Result<ImportJob, StoreError> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO import_jobs (requested_by, status, cancelled, created_at)
             VALUES (?1, 'queued', 0, ?2)",
            params![requested_by, now],
        )?;
        let id = conn.last_insert_rowid();

        conn.execute(
            "INSERT INTO job_payloads (job_id, payload) VALUES (?1, ?2)",
            params![id, payload.to_string()],
        )?;
        conn.execute(
            "INSERT INTO job_logs (job_id, timestamp, level, message, data) VALUES (?1, ?2, 'info', 'job created', NULL)",
            params![id, now],
        )?;

        drop(conn);
        self.get_job(requested_by, id)
    }

    /// Fetch a job, scoped to its owner. A job owned by someone else is
    /// indistinguishable from a missing one.
    pub fn get_job(&self, requested_by: &str, id: i64) -> Result<ImportJob, StoreError> {
        let conn = self.conn.lock().unwrap();
        let job = conn
            .query_row(
                "SELECT id, requested_by, status, cancelled, created_at, finished_at, stats
                 FROM import_jobs WHERE id = ?1 AND requested_by = ?2",
                params![id, requested_by],
                row_to_job,
            )
            .optional()?;
        job.ok_or(StoreError::NotFound)
    }

    /// List the caller's jobs, newest first.
    pub fn list_jobs(&self, requested_by: &str) -> Result<Vec<ImportJob>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, requested_by, status, cancelled, created_at, finished_at, stats
             FROM import_jobs WHERE requested_by = ?1
             ORDER BY created_at DESC, id DESC",
        )?;
        let jobs = stmt
            .query_map(params![requested_by], row_to_job)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    /// Set the cooperative cancel flag. The state axis is untouched; the
    /// worker observes the flag at its next poll and stops itself.
    pub fn request_cancel(&self, requested_by: &str, id: i64) -> Result<ImportJob, StoreError> {
        let job = self.get_job(requested_by, id)?;
        check_cooperative_cancel(job.state)?;

        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let updated = conn.execute(
            "UPDATE import_jobs SET cancelled = 1
             WHERE id = ?1 AND requested_by = ?2 AND status IN ('queued', 'running')",
            params![id, requested_by],
        )?;
        if updated == 0 {
            // The worker finished between our read and the write.
            return Err(StoreError::NotCancellable);
        }
        conn.execute(
            "INSERT INTO job_logs (job_id, timestamp, level, message, data) VALUES (?1, ?2, 'info', 'cancel requested', NULL)",
            params![id, now],
        )?;
        drop(conn);

        self.get_job(requested_by, id)
    }

    /// Force-cancel a stuck job, finalizing it as failed.
    ///
    /// The write is a single conditional update so that a concurrent worker
    /// completion (or a second force cancel) cannot both win.
    pub fn force_cancel(
        &self,
        requested_by: &str,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<ImportJob, StoreError> {
        let job = self.get_job(requested_by, id)?;
        check_force_cancel(job.state, job.cancelled, job.age_seconds(now))?;

        let conn = self.conn.lock().unwrap();
        let finished_at = now.to_rfc3339();
        let stats = serde_json::json!({ "error": "force_cancelled" }).to_string();
        let updated = conn.execute(
            "UPDATE import_jobs
             SET status = 'failed', cancelled = 1, finished_at = ?1, stats = ?2
             WHERE id = ?3 AND requested_by = ?4 AND status NOT IN ('done', 'failed')",
            params![finished_at, stats, id, requested_by],
        )?;
        if updated == 0 {
            return Err(StoreError::NotCancellable);
        }
        conn.execute(
            "INSERT INTO job_logs (job_id, timestamp, level, message, data) VALUES (?1, ?2, 'warn', 'job force-cancelled', NULL)",
            params![id, finished_at],
        )?;
        drop(conn);

        self.get_job(requested_by, id)
    }

    /// Delete a terminal job along with its logs and payload.
    pub fn delete_job(&self, requested_by: &str, id: i64) -> Result<(), StoreError> {
        let job = self.get_job(requested_by, id)?;
        check_delete(job.state)?;

        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM job_logs WHERE job_id = ?1", params![id])?;
        conn.execute("DELETE FROM job_payloads WHERE job_id = ?1", params![id])?;
        conn.execute(
            "DELETE FROM import_jobs WHERE id = ?1 AND requested_by = ?2",
            params![id, requested_by],
        )?;
        Ok(())
    }

    /// Bulk-remove the caller's aged terminal jobs.
    ///
    /// `days` is clamped to 1–365 (default 7); `states` defaults to both
    /// terminal states and may only name terminal ones. Age is measured from
    /// completion (`finished_at`), falling back to creation for rows that
    /// never recorded one. Returns the number of jobs removed.
    pub fn cleanup_jobs(
        &self,
        requested_by: &str,
        days: Option<i64>,
        states: Option<&[JobState]>,
    ) -> Result<usize, StoreError> {
        let days = clamp_cleanup_days(days);
        let states = cleanup_states(states)?;
        let cutoff = (Utc::now() - Duration::days(days)).to_rfc3339();

        let state_names: Vec<String> = states.iter().map(|s| format!("'{}'", s.as_str())).collect();
        let sql = format!(
            "SELECT id FROM import_jobs
             WHERE requested_by = ?1
               AND status IN ({})
               AND COALESCE(finished_at, created_at) < ?2",
            state_names.join(", ")
        );

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&sql)?;
        let ids = stmt
            .query_map(params![requested_by, cutoff], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);

        for id in &ids {
            conn.execute("DELETE FROM job_logs WHERE job_id = ?1", params![id])?;
            conn.execute("DELETE FROM job_payloads WHERE job_id = ?1", params![id])?;
            conn.execute("DELETE FROM import_jobs WHERE id = ?1", params![id])?;
        }
        Ok(ids.len())
    }

    /// Remove aged terminal jobs across all owners. Used by the scheduled
    /// retention sweep.
    pub fn retention_sweep(&self, days: i64) -> Result<usize, StoreError> {
        let days = clamp_cleanup_days(Some(days));
        let cutoff = (Utc::now() - Duration::days(days)).to_rfc3339();

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id FROM import_jobs
             WHERE status IN ('done', 'failed')
               AND COALESCE(finished_at, created_at) < ?1",
        )?;
        let ids = stmt
            .query_map(params![cutoff], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);

        for id in &ids {
            conn.execute("DELETE FROM job_logs WHERE job_id = ?1", params![id])?;
            conn.execute("DELETE FROM job_payloads WHERE job_id = ?1", params![id])?;
            conn.execute("DELETE FROM import_jobs WHERE id = ?1", params![id])?;
        }
        Ok(ids.len())
    }

    // ==================== Worker Transitions ====================
    //
    // The import worker runs out of process; these conditional updates are
    // the compare-and-set primitives it drives the state axis with. Each
    // returns whether the transition won.

    /// `queued → running`.
    pub fn mark_running(&self, id: i64) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE import_jobs SET status = 'running' WHERE id = ?1 AND status = 'queued'",
            params![id],
        )?;
        Ok(updated > 0)
    }

    /// `running → done`, attaching result stats.
    pub fn mark_done(&self, id: i64, stats: &Value) -> Result<bool, StoreError> {
        self.finish(id, JobState::Done, stats)
    }

    /// `running → failed`, attaching error stats.
    pub fn mark_failed(&self, id: i64, stats: &Value) -> Result<bool, StoreError> {
        self.finish(id, JobState::Failed, stats)
    }

    fn finish(&self, id: i64, state: JobState, stats: &Value) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let updated = conn.execute(
            "UPDATE import_jobs SET status = ?1, finished_at = ?2, stats = ?3
             WHERE id = ?4 AND status = 'running'",
            params![state.as_str(), now, stats.to_string(), id],
        )?;
        Ok(updated > 0)
    }

    // ==================== Job Logs & Payloads ====================

    /// Append a log line to a job.
    pub fn append_job_log(
        &self,
        job_id: i64,
        level: &str,
        message: &str,
        data: Option<&Value>,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO job_logs (job_id, timestamp, level, message, data) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![job_id, Utc::now().to_rfc3339(), level, message, data.map(|d| d.to_string())],
        )?;
        Ok(())
    }

    /// Fetch a job's log lines in append order, scoped to the owner.
    pub fn get_job_logs(&self, requested_by: &str, id: i64) -> Result<Vec<JobLogLine>, StoreError> {
        self.get_job(requested_by, id)?;

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT timestamp, level, message, data FROM job_logs WHERE job_id = ?1 ORDER BY id ASC",
        )?;
        let logs = stmt
            .query_map(params![id], |row| {
                Ok(JobLogLine {
                    timestamp: row.get(0)?,
                    level: row.get(1)?,
                    message: row.get(2)?,
                    data: row
                        .get::<_, Option<String>>(3)?
                        .and_then(|raw| serde_json::from_str(&raw).ok()),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(logs)
    }

    /// Fetch a job's raw payload blob, scoped to the owner.
    pub fn get_job_payload(&self, requested_by: &str, id: i64) -> Result<String, StoreError> {
        self.get_job(requested_by, id)?;

        let conn = self.conn.lock().unwrap();
        let payload = conn
            .query_row(
                "SELECT payload FROM job_payloads WHERE job_id = ?1",
                params![id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        payload.ok_or(StoreError::NotFound)
    }

    // ==================== Missing Keys ====================

    /// Record one observed resolution miss. Repeated misses of the same
    /// (namespace, key, locale) increment the counter instead of adding rows.
    pub fn record_missing_key(&self, report: &MissReport) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO missing_keys (namespace, key, locale, path, count, last_seen_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5)
             ON CONFLICT (namespace, key, locale) DO UPDATE SET
                 count = count + 1,
                 last_seen_at = excluded.last_seen_at,
                 path = excluded.path",
            params![
                report.namespace,
                report.key,
                report.locale,
                report.path,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    /// Most recently seen missing keys, capped at 500 rows.
    pub fn list_missing_keys(&self) -> Result<Vec<MissingKeyRow>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, namespace, key, locale, path, count, last_seen_at
             FROM missing_keys ORDER BY last_seen_at DESC, id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![MISSING_KEY_READ_LIMIT], |row| {
                Ok(MissingKeyRow {
                    id: row.get(0)?,
                    namespace: row.get(1)?,
                    key: row.get(2)?,
                    locale: row.get(3)?,
                    path: row.get(4)?,
                    count: row.get(5)?,
                    last_seen_at: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Delete one missing-key row. Returns whether a row was removed.
    pub fn delete_missing_key(&self, id: i64) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute("DELETE FROM missing_keys WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    /// Remove every missing-key row. Returns the number removed.
    pub fn clear_missing_keys(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute("DELETE FROM missing_keys", [])?;
        Ok(deleted)
    }

    // ==================== Groups ====================

    /// Create a group. `parent_id` may be absent for a root group.
    pub fn create_group(
        &self,
        org_id: &str,
        kind: &str,
        name: &str,
        parent_id: Option<i64>,
    ) -> Result<i64, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO item_groups (org_id, kind, name, parent_id) VALUES (?1, ?2, ?3, ?4)",
            params![org_id, kind, name, parent_id],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Fetch a group row.
    pub fn get_group(&self, id: i64) -> Result<Group, StoreError> {
        let conn = self.conn.lock().unwrap();
        let group = conn
            .query_row(
                "SELECT id, org_id, kind, name, parent_id FROM item_groups WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Group {
                        id: row.get(0)?,
                        org_id: row.get(1)?,
                        kind: row.get(2)?,
                        name: row.get(3)?,
                        parent_id: row.get(4)?,
                    })
                },
            )
            .optional()?;
        group.ok_or(StoreError::NotFound)
    }

    /// Parent id of a group; `None` for roots and for dangling references.
    fn group_parent(&self, id: i64) -> Result<Option<i64>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let parent = conn
            .query_row(
                "SELECT parent_id FROM item_groups WHERE id = ?1",
                params![id],
                |row| row.get::<_, Option<i64>>(0),
            )
            .optional()?;
        Ok(parent.flatten())
    }

    /// Move a group under a new parent.
    ///
    /// Both groups must exist in the caller's org (a group in another org
    /// reads as missing) and share a kind, and the move must not create a
    /// cycle in the ancestor chain.
    pub fn move_group(&self, org_id: &str, child: i64, new_parent: i64) -> Result<(), StoreError> {
        let child_row = self.get_group(child)?;
        let parent_row = self.get_group(new_parent)?;

        if child_row.org_id != org_id || parent_row.org_id != org_id {
            return Err(StoreError::NotFound);
        }
        if child_row.kind != parent_row.kind {
            return Err(StoreError::Invalid(
                "groups of different kinds cannot be nested".to_string(),
            ));
        }
        if !crate::groups::can_reparent(child, new_parent, |id| self.group_parent(id))? {
            return Err(StoreError::Invalid("move would create a cycle".to_string()));
        }

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE item_groups SET parent_id = ?1 WHERE id = ?2",
            params![new_parent, child],
        )?;
        Ok(())
    }
}

fn row_to_job(row: &Row<'_>) -> rusqlite::Result<ImportJob> {
    let state_raw: String = row.get(2)?;
    Ok(ImportJob {
        id: row.get(0)?,
        requested_by: row.get(1)?,
        // Unknown state strings only appear if the table was edited by hand;
        // read them as failed rather than refusing the whole row.
        state: JobState::parse(&state_raw).unwrap_or(JobState::Failed),
        cancelled: row.get::<_, i64>(3)? != 0,
        created_at: row.get(4)?,
        finished_at: row.get(5)?,
        stats: row
            .get::<_, Option<String>>(6)?
            .and_then(|raw| serde_json::from_str(&raw).ok()),
    })
}
