use crate::model::{EvaluationRecord, FeedbackCall, FeedbackStatus, StatusCounts};
use anyhow::Context;
use rusqlite::{params, params_from_iter, Connection, OpenFlags};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Per-recipe result store backed by one SQLite file.
#[derive(Clone)]
pub struct Store {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

/// A claimed scoring job.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackJob {
    pub id: i64,
    pub record_id: String,
    pub app_id: String,
    pub name: String,
}

impl Store {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite db {}", path.display()))?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        conn.busy_timeout(Duration::from_secs(5))?;
        // WAL lets a reader poll while the run is writing.
        let _mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |r| r.get(0))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an existing store without write access, for comparisons and
    /// status checks while another process is still running.
    pub fn open_read_only(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            anyhow::bail!("no result store at {}", path.display());
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("failed to open sqlite db {} read-only", path.display()))?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory sqlite db")?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// `<store_dir>/<recipe>.sqlite`
    pub fn path_for_recipe(store_dir: &Path, recipe: &str) -> PathBuf {
        store_dir.join(format!("{}.sqlite", recipe))
    }

    /// Opens (creating if needed) the store of `recipe` and ensures the schema.
    pub fn for_recipe(store_dir: &Path, recipe: &str) -> anyhow::Result<Self> {
        std::fs::create_dir_all(store_dir)
            .with_context(|| format!("failed to create store dir {}", store_dir.display()))?;
        let store = Self::open(&Self::path_for_recipe(store_dir, recipe))?;
        store.init_schema()?;
        Ok(store)
    }

    pub fn init_schema(&self) -> anyhow::Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(crate::storage::schema::DDL)?;
        Ok(())
    }

    fn conn(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("store connection lock poisoned"))
    }

    /// Records the feedback functions and run metadata for a dataset.
    pub fn register_app(
        &self,
        app_id: &str,
        feedback_names: &[String],
        metadata: &serde_json::Value,
    ) -> anyhow::Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO apps(app_id, feedback_names_json, metadata_json, registered_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(app_id) DO UPDATE SET
                feedback_names_json=excluded.feedback_names_json,
                metadata_json=excluded.metadata_json,
                registered_at=excluded.registered_at",
            params![
                app_id,
                serde_json::to_string(feedback_names)?,
                serde_json::to_string(metadata)?,
                now_rfc3339()
            ],
        )
        .context("register app")?;
        Ok(())
    }

    pub fn app_metadata(&self, app_id: &str) -> anyhow::Result<Option<serde_json::Value>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT metadata_json FROM apps WHERE app_id=?1")?;
        let mut rows = stmt.query(params![app_id])?;
        if let Some(row) = rows.next()? {
            let raw: Option<String> = row.get(0)?;
            Ok(raw.and_then(|s| serde_json::from_str(&s).ok()))
        } else {
            Ok(None)
        }
    }

    /// Dataset names that have a registration or at least one record.
    pub fn app_ids(&self) -> anyhow::Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT app_id FROM apps UNION SELECT DISTINCT app_id FROM records ORDER BY 1",
        )?;
        let ids = stmt
            .query_map([], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Persists a record and queues one pending scoring job per feedback.
    ///
    /// Record and jobs are written in one transaction, so a reader never
    /// sees a record without its pending jobs.
    pub fn insert_record(
        &self,
        record: &EvaluationRecord,
        feedback_names: &[String],
    ) -> anyhow::Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO records(record_id, app_id, input, output, record_json, metadata_json, total_tokens, latency_seconds, ts)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.record_id,
                record.app_id,
                record.input,
                record.output,
                serde_json::to_string(&record.raw_trace)?,
                serde_json::to_string(&record.metadata)?,
                record.total_tokens,
                record.latency_seconds,
                record.ts,
            ],
        )
        .with_context(|| format!("insert record {}", record.record_id))?;

        let updated_at = now_rfc3339();
        {
            let mut stmt = tx.prepare(
                "INSERT INTO feedback_results(record_id, app_id, name, status, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(record_id, name) DO NOTHING",
            )?;
            for name in feedback_names {
                stmt.execute(params![
                    record.record_id,
                    record.app_id,
                    name,
                    FeedbackStatus::None.as_str(),
                    updated_at
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Raw inputs of every record of a dataset (for resume filtering).
    pub fn get_inputs(&self, app_id: &str) -> anyhow::Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT input FROM records WHERE app_id=?1")?;
        let inputs = stmt
            .query_map(params![app_id], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(inputs)
    }

    /// All records of a dataset with their current scores, plus every metric
    /// name known for it (registered feedbacks first, then any extra names
    /// found on jobs).
    ///
    /// Scores of unfinished jobs read as absent; negative or non-finite
    /// results are treated as invalid and read as absent too.
    pub fn get_records(&self, app_id: &str) -> anyhow::Result<(Vec<EvaluationRecord>, Vec<String>)> {
        let conn = self.conn()?;

        let mut names: Vec<String> = Vec::new();
        {
            let mut stmt = conn.prepare("SELECT feedback_names_json FROM apps WHERE app_id=?1")?;
            let mut rows = stmt.query(params![app_id])?;
            if let Some(row) = rows.next()? {
                let raw: String = row.get(0)?;
                names = serde_json::from_str(&raw).unwrap_or_default();
            }
        }

        let mut feedback: HashMap<String, Vec<(String, FeedbackStatus, Option<f64>, Option<String>)>> =
            HashMap::new();
        {
            let mut stmt = conn.prepare(
                "SELECT record_id, name, status, result, calls_json
                 FROM feedback_results WHERE app_id=?1 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![app_id], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    FeedbackStatus::parse(&r.get::<_, String>(2)?),
                    r.get::<_, Option<f64>>(3)?,
                    r.get::<_, Option<String>>(4)?,
                ))
            })?;
            for row in rows {
                let (record_id, name, status, result, calls) = row?;
                if !names.contains(&name) {
                    names.push(name.clone());
                }
                feedback
                    .entry(record_id)
                    .or_default()
                    .push((name, status, result, calls));
            }
        }

        let mut stmt = conn.prepare(
            "SELECT record_id, app_id, input, output, record_json, metadata_json, total_tokens, latency_seconds, ts
             FROM records WHERE app_id=?1 ORDER BY ts, rowid",
        )?;
        let rows = stmt.query_map(params![app_id], |r| {
            let record_json: Option<String> = r.get(4)?;
            let metadata_json: Option<String> = r.get(5)?;
            Ok(EvaluationRecord {
                record_id: r.get(0)?,
                app_id: r.get(1)?,
                input: r.get(2)?,
                output: r.get(3)?,
                raw_trace: record_json
                    .and_then(|s| serde_json::from_str(&s).ok())
                    .unwrap_or(serde_json::Value::Null),
                metadata: metadata_json
                    .and_then(|s| serde_json::from_str(&s).ok())
                    .unwrap_or_default(),
                total_tokens: r.get(6)?,
                latency_seconds: r.get(7)?,
                ts: r.get(8)?,
                metric_scores: BTreeMap::new(),
                feedback_calls: BTreeMap::new(),
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            let mut record = row?;
            for name in &names {
                record.metric_scores.insert(name.clone(), None);
            }
            if let Some(results) = feedback.remove(&record.record_id) {
                for (name, status, result, calls) in results {
                    let score = match status {
                        FeedbackStatus::Done => result.filter(|v| v.is_finite() && *v >= 0.0),
                        _ => None,
                    };
                    record.metric_scores.insert(name.clone(), score);
                    if let Some(calls) = calls.and_then(|s| serde_json::from_str::<Vec<FeedbackCall>>(&s).ok()) {
                        record.feedback_calls.insert(name, calls);
                    }
                }
            }
            records.push(record);
        }

        Ok((records, names))
    }

    pub fn get_feedback_status_counts(&self) -> anyhow::Result<StatusCounts> {
        self.get_feedback_status_counts_for(&[])
    }

    /// Job counts of the given datasets only; an empty slice counts all.
    pub fn get_feedback_status_counts_for(&self, app_ids: &[String]) -> anyhow::Result<StatusCounts> {
        let conn = self.conn()?;
        let sql = if app_ids.is_empty() {
            "SELECT status, COUNT(*) FROM feedback_results GROUP BY status".to_string()
        } else {
            let placeholders = vec!["?"; app_ids.len()].join(", ");
            format!(
                "SELECT status, COUNT(*) FROM feedback_results WHERE app_id IN ({}) GROUP BY status",
                placeholders
            )
        };
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(app_ids.iter()), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?))
        })?;
        let mut counts = StatusCounts::default();
        for row in rows {
            let (status, n) = row?;
            let status = FeedbackStatus::parse(&status);
            counts.set(status, counts.get(status) + n.max(0) as u64);
        }
        Ok(counts)
    }

    /// Deletes every record, job and registration in this store.
    pub fn reset(&self) -> anyhow::Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM feedback_results", [])?;
        tx.execute("DELETE FROM records", [])?;
        tx.execute("DELETE FROM apps", [])?;
        tx.commit()?;
        Ok(())
    }

    pub fn get_record(&self, record_id: &str) -> anyhow::Result<Option<EvaluationRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT record_id, app_id, input, output, record_json, metadata_json, total_tokens, latency_seconds, ts
             FROM records WHERE record_id=?1",
        )?;
        let mut rows = stmt.query(params![record_id])?;
        let Some(r) = rows.next()? else {
            return Ok(None);
        };
        let record_json: Option<String> = r.get(4)?;
        let metadata_json: Option<String> = r.get(5)?;
        Ok(Some(EvaluationRecord {
            record_id: r.get(0)?,
            app_id: r.get(1)?,
            input: r.get(2)?,
            output: r.get(3)?,
            raw_trace: record_json
                .and_then(|s| serde_json::from_str(&s).ok())
                .unwrap_or(serde_json::Value::Null),
            metadata: metadata_json
                .and_then(|s| serde_json::from_str(&s).ok())
                .unwrap_or_default(),
            total_tokens: r.get(6)?,
            latency_seconds: r.get(7)?,
            ts: r.get(8)?,
            metric_scores: BTreeMap::new(),
            feedback_calls: BTreeMap::new(),
        }))
    }

    // scoring jobs

    /// Moves up to `limit` pending jobs to running and returns them.
    pub fn claim_pending_feedback(&self, limit: usize) -> anyhow::Result<Vec<FeedbackJob>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let jobs = {
            let mut stmt = tx.prepare(
                "SELECT id, record_id, app_id, name FROM feedback_results
                 WHERE status=?1 ORDER BY id LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![FeedbackStatus::None.as_str(), limit as i64], |r| {
                Ok(FeedbackJob {
                    id: r.get(0)?,
                    record_id: r.get(1)?,
                    app_id: r.get(2)?,
                    name: r.get(3)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        let updated_at = now_rfc3339();
        for job in &jobs {
            tx.execute(
                "UPDATE feedback_results SET status=?1, updated_at=?2 WHERE id=?3",
                params![FeedbackStatus::Running.as_str(), updated_at, job.id],
            )?;
        }
        tx.commit()?;
        Ok(jobs)
    }

    pub fn complete_feedback(
        &self,
        job_id: i64,
        result: f64,
        calls: &[FeedbackCall],
    ) -> anyhow::Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE feedback_results SET status=?1, result=?2, calls_json=?3, error=NULL, updated_at=?4 WHERE id=?5",
            params![
                FeedbackStatus::Done.as_str(),
                result,
                serde_json::to_string(calls)?,
                now_rfc3339(),
                job_id
            ],
        )?;
        Ok(())
    }

    pub fn fail_feedback(&self, job_id: i64, status: FeedbackStatus, error: &str) -> anyhow::Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE feedback_results SET status=?1, error=?2, updated_at=?3 WHERE id=?4",
            params![status.as_str(), error, now_rfc3339(), job_id],
        )?;
        Ok(())
    }

    /// Puts jobs left running by an interrupted process back in the queue.
    pub fn requeue_running(&self) -> anyhow::Result<usize> {
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE feedback_results SET status=?1, updated_at=?2 WHERE status=?3",
            params![
                FeedbackStatus::None.as_str(),
                now_rfc3339(),
                FeedbackStatus::Running.as_str()
            ],
        )?;
        Ok(n)
    }
}

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

/// `record_` + 32 hex chars derived from dataset, input and insertion time.
pub fn new_record_id(app_id: &str, input: &str) -> String {
    let nanos = chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(app_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(input.as_bytes());
    hasher.update([0u8]);
    hasher.update(nanos.to_le_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("record_{}", &digest[..32])
}
