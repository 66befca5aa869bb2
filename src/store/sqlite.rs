//! SQLite-backed collection storage.
//!
//! One database file holds every collection. Each collection row carries its fixed embedding
//! dimension and a monotonic `next_id` counter; records are append-only and ordered by `seq`.
//! All statements run on tokio's blocking pool so the async dispatcher never waits on disk.

use super::distance::{blob_to_embedding, cosine_similarity, embedding_to_blob};
use super::types::{NewRecord, ScoredRecord, StoreError, StoredRecord};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS collections (
    name TEXT PRIMARY KEY,
    dimension INTEGER,
    next_id INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS records (
    collection TEXT NOT NULL REFERENCES collections(name),
    seq INTEGER NOT NULL,
    id TEXT NOT NULL,
    document TEXT NOT NULL,
    metadata TEXT NOT NULL,
    embedding BLOB NOT NULL,
    content_hash TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (collection, id)
);

CREATE INDEX IF NOT EXISTS idx_records_collection_seq
    ON records(collection, seq);
"#;

/// Handle to the store's database file, cheap to clone.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create the database at `path`, creating parent directories as needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!(path = %path.display(), journal_mode = %mode, "Opened vector database");

        Self::initialize(conn)
    }

    /// Open a private in-memory database; contents vanish with the last handle.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::initialize(Connection::open_in_memory()?)
    }

    fn initialize(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create the named collection if missing and return a handle to it.
    ///
    /// Idempotent: an existing collection keeps its records, dimension, and id counter.
    pub async fn ensure_collection(&self, name: &str) -> Result<CollectionHandle, StoreError> {
        let collection = name.to_string();
        let created_at = super::current_timestamp_rfc3339();
        let created = self
            .run(move |conn| {
                let inserted = conn.execute(
                    "INSERT OR IGNORE INTO collections (name, dimension, next_id, created_at)
                     VALUES (?1, NULL, 0, ?2)",
                    params![collection, created_at],
                )?;
                Ok(inserted > 0)
            })
            .await?;

        if created {
            tracing::info!(collection = name, "Created collection");
        } else {
            tracing::debug!(collection = name, "Opened existing collection");
        }

        Ok(CollectionHandle {
            db: self.clone(),
            name: name.to_string(),
            write_lock: Arc::new(tokio::sync::Mutex::new(())),
        })
    }

    async fn run<T, F>(&self, task: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Worker("connection lock poisoned".into()))?;
            task(&mut *guard)
        })
        .await
        .map_err(|error| StoreError::Worker(error.to_string()))?
    }
}

/// Ready handle to one collection. Clones share the same insert lock.
#[derive(Clone)]
pub struct CollectionHandle {
    db: Database,
    name: String,
    write_lock: Arc<tokio::sync::Mutex<()>>,
}

impl CollectionHandle {
    /// Collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append records, assigning ids `chunk_{n}` from the collection's counter.
    ///
    /// Inserts are serialized per handle and the counter is read and bumped inside one
    /// `IMMEDIATE` transaction, so concurrent writers (even across processes) never share an
    /// id. Either every record is written or none is.
    pub async fn append(&self, records: Vec<NewRecord>) -> Result<Vec<String>, StoreError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let _guard = self.write_lock.lock().await;
        let collection = self.name.clone();
        self.db
            .run(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let (dimension, next_id) = tx
                    .query_row(
                        "SELECT dimension, next_id FROM collections WHERE name = ?1",
                        params![collection],
                        |row| Ok((row.get::<_, Option<i64>>(0)?, row.get::<_, i64>(1)?)),
                    )
                    .optional()?
                    .ok_or_else(|| StoreError::CollectionMissing(collection.clone()))?;

                let expected = match dimension {
                    Some(value) => value as usize,
                    None => records[0].embedding.len(),
                };
                if expected == 0 {
                    return Err(StoreError::EmptyEmbedding);
                }
                if let Some(record) = records.iter().find(|r| r.embedding.len() != expected) {
                    return Err(StoreError::DimensionMismatch {
                        collection,
                        expected,
                        actual: record.embedding.len(),
                    });
                }
                if dimension.is_none() {
                    tx.execute(
                        "UPDATE collections SET dimension = ?1 WHERE name = ?2",
                        params![expected as i64, collection],
                    )?;
                }

                let mut ids = Vec::with_capacity(records.len());
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO records (
                            collection, seq, id, document, metadata, embedding,
                            content_hash, created_at
                         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    )?;
                    for (offset, record) in records.iter().enumerate() {
                        let seq = next_id + offset as i64;
                        let id = format!("chunk_{seq}");
                        stmt.execute(params![
                            collection,
                            seq,
                            id,
                            record.document,
                            serde_json::to_string(&record.metadata)?,
                            embedding_to_blob(&record.embedding),
                            record.content_hash,
                            record.created_at,
                        ])?;
                        ids.push(id);
                    }
                }

                tx.execute(
                    "UPDATE collections SET next_id = ?1 WHERE name = ?2",
                    params![next_id + records.len() as i64, collection],
                )?;
                tx.commit()?;
                Ok(ids)
            })
            .await
    }

    /// Embedding dimension fixed by the first insert, `None` while the collection is empty.
    pub async fn dimension(&self) -> Result<Option<usize>, StoreError> {
        let collection = self.name.clone();
        self.db
            .run(move |conn| {
                let dimension: Option<i64> = conn
                    .query_row(
                        "SELECT dimension FROM collections WHERE name = ?1",
                        params![collection],
                        |row| row.get(0),
                    )
                    .optional()?
                    .ok_or_else(|| StoreError::CollectionMissing(collection.clone()))?;
                Ok(dimension.map(|value| value as usize))
            })
            .await
    }

    /// Number of records in the collection.
    pub async fn count(&self) -> Result<u64, StoreError> {
        let collection = self.name.clone();
        self.db
            .run(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM records WHERE collection = ?1",
                    params![collection],
                    |row| row.get(0),
                )?;
                Ok(count as u64)
            })
            .await
    }

    /// Every record in insertion order.
    pub async fn records(&self) -> Result<Vec<StoredRecord>, StoreError> {
        let collection = self.name.clone();
        self.db
            .run(move |conn| load_records(conn, &collection))
            .await
    }

    /// Up to `k` records ranked by descending cosine similarity to `query`.
    ///
    /// Ties keep insertion order. An empty collection or `k == 0` yields no results.
    pub async fn nearest(
        &self,
        query: Vec<f32>,
        k: usize,
    ) -> Result<Vec<ScoredRecord>, StoreError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        if query.is_empty() {
            return Err(StoreError::EmptyEmbedding);
        }

        let collection = self.name.clone();
        self.db
            .run(move |conn| {
                let dimension: Option<i64> = conn
                    .query_row(
                        "SELECT dimension FROM collections WHERE name = ?1",
                        params![collection],
                        |row| row.get(0),
                    )
                    .optional()?
                    .ok_or_else(|| StoreError::CollectionMissing(collection.clone()))?;

                let Some(dimension) = dimension.map(|value| value as usize) else {
                    return Ok(Vec::new());
                };
                if dimension != query.len() {
                    return Err(StoreError::DimensionMismatch {
                        collection,
                        expected: dimension,
                        actual: query.len(),
                    });
                }

                let mut scored: Vec<ScoredRecord> = load_records(conn, &collection)?
                    .into_iter()
                    .map(|record| ScoredRecord {
                        score: cosine_similarity(&query, &record.embedding),
                        record,
                    })
                    .collect();
                scored.sort_by(|a, b| b.score.total_cmp(&a.score));
                scored.truncate(k);
                Ok(scored)
            })
            .await
    }
}

fn load_records(conn: &Connection, collection: &str) -> Result<Vec<StoredRecord>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, document, metadata, embedding, content_hash, created_at
         FROM records WHERE collection = ?1 ORDER BY seq",
    )?;
    let rows = stmt.query_map(params![collection], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Vec<u8>>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
        ))
    })?;

    let mut records = Vec::new();
    for row in rows {
        let (id, document, metadata, blob, content_hash, created_at) = row?;
        let metadata: BTreeMap<String, String> = serde_json::from_str(&metadata)?;
        records.push(StoredRecord {
            id,
            embedding: blob_to_embedding(&blob),
            document,
            metadata,
            content_hash,
            created_at,
        });
    }
    Ok(records)
}
