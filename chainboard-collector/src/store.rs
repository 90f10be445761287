//! Storage gateway: a minimal document store contract.
//!
//! The collector only ever needs three operations — find one document,
//! query many, and upsert by natural key — so that is the whole trait.
//! Every write is an upsert keyed by the document's natural key, which
//! makes retried writes idempotent and lets a crashed run safely repeat
//! its last block.
//!
//! [`MemoryStore`] documents the contract and backs the tests;
//! [`SqliteStore`] persists documents as JSON rows so the binary runs
//! standalone.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use rusqlite::{Connection, params_from_iter};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;

/// Collection names used by the collector.
pub mod collections {
    /// Normalized block records, keyed `(chain, number)`.
    pub const BLOCKS: &str = "blocks";

    /// Per-chain sync checkpoints, keyed `name`.
    pub const CHECKPOINTS: &str = "checkpoints";

    /// Rolling-window chain statistics, keyed `chain`.
    pub const CHAIN_STATS: &str = "chain_stats";
}

/// A storage failure.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying SQLite call failed.
    #[error("sqlite failure: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A document could not be serialized or parsed.
    #[error("document serialization failed: {0}")]
    Document(#[from] serde_json::Error),
}

/// Conjunction of predicates over top-level document fields.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    clauses: Vec<Clause>,
}

#[derive(Debug, Clone)]
enum Clause {
    Eq(String, Value),
    Between(String, u64, u64),
}

impl Filter {
    /// An empty filter matching every document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field` to equal `value`.
    #[must_use]
    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.clauses.push(Clause::Eq(field.to_owned(), value.into()));
        self
    }

    /// Require numeric `field` to lie in `[low, high]`, inclusive.
    #[must_use]
    pub fn between(mut self, field: &str, low: u64, high: u64) -> Self {
        self.clauses.push(Clause::Between(field.to_owned(), low, high));
        self
    }

    fn matches(&self, document: &Value) -> bool {
        self.clauses.iter().all(|clause| match clause {
            Clause::Eq(field, value) => document.get(field) == Some(value),
            Clause::Between(field, low, high) => document
                .get(field)
                .and_then(Value::as_u64)
                .is_some_and(|actual| *low <= actual && actual <= *high),
        })
    }
}

/// The document store consumed by the collector and aggregator.
pub trait Store {
    /// Find the first document matching `filter`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the underlying store fails.
    async fn find(&self, collection: &str, filter: &Filter) -> Result<Option<Value>, StoreError>;

    /// Return every document matching `filter`, in stable key order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the underlying store fails.
    async fn query(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>, StoreError>;

    /// Create or replace the document identified by `keys`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the underlying store fails.
    async fn upsert(
        &self,
        collection: &str,
        keys: &[(&str, Value)],
        document: Value,
    ) -> Result<(), StoreError>;
}

fn key_part(value: &Value) -> String {
    value.as_str().map_or_else(|| value.to_string(), str::to_owned)
}

fn doc_key(keys: &[(&str, Value)]) -> String {
    keys.iter()
        .map(|(field, value)| format!("{field}={}", key_part(value)))
        .collect::<Vec<_>>()
        .join("&")
}

/// In-memory reference implementation of the gateway contract.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, BTreeMap<String, Value>>>,
}

impl MemoryStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    async fn find(&self, collection: &str, filter: &Filter) -> Result<Option<Value>, StoreError> {
        let data = self.data.lock().await;
        Ok(data.get(collection).and_then(|documents| {
            documents.values().find(|document| filter.matches(document)).cloned()
        }))
    }

    async fn query(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>, StoreError> {
        let data = self.data.lock().await;
        Ok(data.get(collection).map_or_else(Vec::new, |documents| {
            documents
                .values()
                .filter(|document| filter.matches(document))
                .cloned()
                .collect()
        }))
    }

    async fn upsert(
        &self,
        collection: &str,
        keys: &[(&str, Value)],
        document: Value,
    ) -> Result<(), StoreError> {
        let mut data = self.data.lock().await;
        data.entry(collection.to_owned())
            .or_default()
            .insert(doc_key(keys), document);
        Ok(())
    }
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS documents (
    collection TEXT NOT NULL,
    doc_key    TEXT NOT NULL,
    body       TEXT NOT NULL,
    PRIMARY KEY (collection, doc_key)
)";

/// SQLite-backed document store: one table, JSON bodies, natural-key rows.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and bootstrap the schema.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the database cannot be opened.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the database cannot be opened.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    async fn select(
        &self,
        collection: &str,
        filter: &Filter,
        limit: Option<usize>,
    ) -> Result<Vec<Value>, StoreError> {
        let mut sql = "SELECT body FROM documents WHERE collection = ?".to_owned();
        let mut params: Vec<rusqlite::types::Value> = vec![collection.to_owned().into()];

        for clause in &filter.clauses {
            match clause {
                Clause::Eq(field, value) => {
                    sql.push_str(&format!(" AND json_extract(body, '$.{field}') = ?"));
                    params.push(sql_param(value));
                }
                Clause::Between(field, low, high) => {
                    sql.push_str(&format!(" AND json_extract(body, '$.{field}') BETWEEN ? AND ?"));
                    params.push(clamped(*low).into());
                    params.push(clamped(*high).into());
                }
            }
        }

        sql.push_str(" ORDER BY doc_key");
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let conn = self.conn.lock().await;
        let mut statement = conn.prepare(&sql)?;
        let rows = statement.query_map(params_from_iter(params), |row| row.get::<_, String>(0))?;

        let mut documents = Vec::new();
        for body in rows {
            documents.push(serde_json::from_str(&body?)?);
        }
        Ok(documents)
    }
}

fn clamped(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn sql_param(value: &Value) -> rusqlite::types::Value {
    match value {
        Value::Null => rusqlite::types::Value::Null,
        Value::Bool(flag) => i64::from(*flag).into(),
        Value::Number(number) => number.as_i64().map_or_else(
            || {
                number
                    .as_f64()
                    .map_or_else(|| rusqlite::types::Value::Text(number.to_string()), Into::into)
            },
            Into::into,
        ),
        Value::String(text) => text.clone().into(),
        other => other.to_string().into(),
    }
}

impl Store for SqliteStore {
    async fn find(&self, collection: &str, filter: &Filter) -> Result<Option<Value>, StoreError> {
        Ok(self.select(collection, filter, Some(1)).await?.into_iter().next())
    }

    async fn query(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>, StoreError> {
        self.select(collection, filter, None).await
    }

    async fn upsert(
        &self,
        collection: &str,
        keys: &[(&str, Value)],
        document: Value,
    ) -> Result<(), StoreError> {
        let body = serde_json::to_string(&document)?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO documents (collection, doc_key, body) VALUES (?1, ?2, ?3)
             ON CONFLICT (collection, doc_key) DO UPDATE SET body = excluded.body",
            (collection, doc_key(keys), body),
        )?;
        Ok(())
    }
}
