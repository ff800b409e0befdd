//! Durable store of aggregated research results
//!
//! One row per idempotency key. The unique constraint on
//! `(subject_id, as_of_date, scenario_type)` makes the first write win when
//! two identical requests race through a cache miss.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::error::{Result, StockError};
use crate::request::{IdempotencyKey, ResearchRequest};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Final texts of one pipeline run: node name to output, plus the conclusion
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedState {
    #[serde(flatten)]
    outputs: BTreeMap<String, String>,
    #[serde(default)]
    conclusion: String,
}

impl AggregatedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, node: impl Into<String>, text: impl Into<String>) -> Self {
        self.outputs.insert(node.into(), text.into());
        self
    }

    pub fn with_conclusion(mut self, text: impl Into<String>) -> Self {
        self.conclusion = text.into();
        self
    }

    /// Output of a node, empty when the node produced nothing
    pub fn output(&self, node: &str) -> &str {
        self.outputs.get(node).map_or("", String::as_str)
    }

    pub fn conclusion(&self) -> &str {
        &self.conclusion
    }

    /// Whether any node or the conclusion produced text
    pub fn has_content(&self) -> bool {
        !self.conclusion.is_empty() || self.outputs.values().any(|text| !text.is_empty())
    }
}

/// A persisted result row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub subject_id: String,
    pub user_input: String,
    pub as_of_date: NaiveDate,
    pub state: AggregatedState,
    pub scenario_type: i64,
    pub created_at: DateTime<Utc>,
}

impl StoredRecord {
    /// Record for a finished request, stamped now
    pub fn new(request: &ResearchRequest, scenario_type: i64, state: AggregatedState) -> Self {
        Self {
            subject_id: request.subject_id.clone(),
            user_input: request.user_input.clone(),
            as_of_date: request.as_of_date,
            state,
            scenario_type,
            created_at: Utc::now(),
        }
    }

    pub fn key(&self) -> IdempotencyKey {
        IdempotencyKey {
            subject_id: self.subject_id.clone(),
            as_of_date: self.as_of_date,
            scenario_type: self.scenario_type,
        }
    }
}

/// Durable store behind the result cache
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Most recent record for the key
    async fn latest(&self, key: &IdempotencyKey) -> Result<Option<StoredRecord>>;

    /// Insert a record; `false` when a record for the key already exists
    async fn save(&self, record: StoredRecord) -> Result<bool>;
}

/// SQLite-backed [`StateStore`]
#[derive(Clone)]
pub struct SqliteStateStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStateStore {
    /// Open or create the database file
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StockError::Persistence(e.to_string()))?;
            }
        }
        Self::with_connection(Connection::open(path.as_ref())?)
    }

    /// Private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS research_states (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                subject_id TEXT NOT NULL,
                user_input TEXT NOT NULL,
                as_of_date TEXT NOT NULL,
                state TEXT NOT NULL,
                scenario_type INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (subject_id, as_of_date, scenario_type)
            );
            ",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure against the connection on the blocking pool
    async fn call<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| StockError::Persistence(format!("Lock error: {e}")))?;
            f(&conn)
        })
        .await
        .map_err(|e| StockError::Persistence(e.to_string()))?
    }
}

fn latest_record(conn: &Connection, key: &IdempotencyKey) -> Result<Option<StoredRecord>> {
    let row = conn
        .query_row(
            r"
            SELECT subject_id, user_input, as_of_date, state, scenario_type, created_at
            FROM research_states
            WHERE subject_id = ?1 AND as_of_date = ?2 AND scenario_type = ?3
            ORDER BY created_at DESC
            LIMIT 1
            ",
            params![
                key.subject_id,
                key.as_of_date.format(DATE_FORMAT).to_string(),
                key.scenario_type
            ],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, String>(5)?,
                ))
            },
        )
        .optional()?;

    let Some((subject_id, user_input, as_of_date, state, scenario_type, created_at)) = row else {
        return Ok(None);
    };

    Ok(Some(StoredRecord {
        subject_id,
        user_input,
        as_of_date: NaiveDate::parse_from_str(&as_of_date, DATE_FORMAT)
            .map_err(|e| StockError::Persistence(format!("bad as_of_date {as_of_date}: {e}")))?,
        state: serde_json::from_str(&state)?,
        scenario_type,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| StockError::Persistence(format!("bad created_at {created_at}: {e}")))?
            .with_timezone(&Utc),
    }))
}

fn insert_record(conn: &Connection, record: &StoredRecord) -> Result<bool> {
    let inserted = conn.execute(
        r"
        INSERT INTO research_states
            (subject_id, user_input, as_of_date, state, scenario_type, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT (subject_id, as_of_date, scenario_type) DO NOTHING
        ",
        params![
            record.subject_id,
            record.user_input,
            record.as_of_date.format(DATE_FORMAT).to_string(),
            serde_json::to_string(&record.state)?,
            record.scenario_type,
            record.created_at.to_rfc3339(),
        ],
    )?;
    Ok(inserted > 0)
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn latest(&self, key: &IdempotencyKey) -> Result<Option<StoredRecord>> {
        let key = key.clone();
        self.call(move |conn| latest_record(conn, &key)).await
    }

    async fn save(&self, record: StoredRecord) -> Result<bool> {
        let inserted = self.call(move |conn| insert_record(conn, &record)).await?;
        debug!(inserted, "research state written");
        Ok(inserted)
    }
}

impl std::fmt::Debug for SqliteStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStateStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(subject: &str) -> ResearchRequest {
        ResearchRequest::parse("分析", subject, "2025-03-07", 6).unwrap()
    }

    fn state(conclusion: &str) -> AggregatedState {
        AggregatedState::new()
            .with_output("fundamental_A", "稳健")
            .with_output("fundamental_B", "")
            .with_conclusion(conclusion)
    }

    #[test]
    fn test_state_json_shape() {
        let value = serde_json::to_value(state("买入")).unwrap();
        assert_eq!(
            value,
            json!({"fundamental_A": "稳健", "fundamental_B": "", "conclusion": "买入"})
        );

        let back: AggregatedState = serde_json::from_value(value).unwrap();
        assert_eq!(back.output("fundamental_A"), "稳健");
        assert_eq!(back.output("emotional_A"), "");
        assert_eq!(back.conclusion(), "买入");
    }

    #[test]
    fn test_has_content() {
        assert!(!AggregatedState::new().with_output("a", "").has_content());
        assert!(AggregatedState::new().with_conclusion("x").has_content());
    }

    #[tokio::test]
    async fn test_save_then_latest() {
        let store = SqliteStateStore::open_in_memory().unwrap();
        let record = StoredRecord::new(&request("600519"), 1, state("买入"));

        assert!(store.save(record.clone()).await.unwrap());

        let found = store.latest(&record.key()).await.unwrap().unwrap();
        assert_eq!(found.state, record.state);
        assert_eq!(found.user_input, "分析");

        let mut other = record.key();
        other.scenario_type = 2;
        assert!(store.latest(&other).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_first_write_wins() {
        let store = SqliteStateStore::open_in_memory().unwrap();
        let first = StoredRecord::new(&request("600519"), 1, state("买入"));
        let second = StoredRecord::new(&request("600519"), 1, state("卖出"));

        assert!(store.save(first.clone()).await.unwrap());
        assert!(!store.save(second).await.unwrap());

        let found = store.latest(&first.key()).await.unwrap().unwrap();
        assert_eq!(found.state.conclusion(), "买入");
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("states.db");
        let record = StoredRecord::new(&request("000001"), 1, state("观望"));

        {
            let store = SqliteStateStore::open_at(&path).unwrap();
            store.save(record.clone()).await.unwrap();
        }

        let store = SqliteStateStore::open_at(&path).unwrap();
        let found = store.latest(&record.key()).await.unwrap().unwrap();
        assert_eq!(found.state.conclusion(), "观望");
        assert_eq!(found.as_of_date, record.as_of_date);
    }
}
