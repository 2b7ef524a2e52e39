//! Candidate persistence: the store contract, upsert-by-email reconciliation,
//! and PostgreSQL / in-memory implementations.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use candor_core::{CandidateRecord, StoredCandidate};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

pub const CRATE_NAME: &str = "candor-storage";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("candidate record json: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("candidate {0} not found")]
    NotFound(Uuid),
    #[error("a candidate with email {0} already exists")]
    DuplicateEmail(String),
}

/// Storage contract consumed by the reconciler. Email is the natural key and
/// must be unique across stored candidates.
#[async_trait]
pub trait CandidateStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<StoredCandidate>, StoreError>;

    async fn insert(
        &self,
        record: &CandidateRecord,
        now: DateTime<Utc>,
    ) -> Result<StoredCandidate, StoreError>;

    /// Replaces every record field; `id` and `created_at` are kept.
    async fn update(
        &self,
        id: Uuid,
        record: &CandidateRecord,
        now: DateTime<Utc>,
    ) -> Result<StoredCandidate, StoreError>;

    /// Releases the underlying connection. Called once at the end of a run.
    async fn close(&self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

#[derive(Debug, Clone)]
pub struct Reconciled {
    pub outcome: UpsertOutcome,
    pub stored: StoredCandidate,
}

/// Update-if-present, insert-if-absent keyed by exact contact email.
///
/// The lookup and the write are not one transaction: two concurrent calls for
/// the same email can both miss, and the store's uniqueness check decides.
pub async fn upsert_by_email(
    store: &dyn CandidateStore,
    record: &CandidateRecord,
    now: DateTime<Utc>,
) -> Result<Reconciled, StoreError> {
    match store.find_by_email(record.email()).await? {
        Some(existing) => {
            let stored = store.update(existing.id, record, now).await?;
            debug!(id = %stored.id, email = record.email(), "updated existing candidate");
            Ok(Reconciled {
                outcome: UpsertOutcome::Updated,
                stored,
            })
        }
        None => {
            let stored = store.insert(record, now).await?;
            debug!(id = %stored.id, email = record.email(), "inserted new candidate");
            Ok(Reconciled {
                outcome: UpsertOutcome::Inserted,
                stored,
            })
        }
    }
}

#[derive(Debug)]
pub struct PgCandidateStore {
    pool: PgPool,
}

impl PgCandidateStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("candidate store migrations applied");
        Ok(())
    }
}

#[async_trait]
impl CandidateStore for PgCandidateStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<StoredCandidate>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, created_at, updated_at, record_json
              FROM candidates
             WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let record_json: serde_json::Value = row.try_get("record_json")?;
        Ok(Some(StoredCandidate {
            id: row.try_get("id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            record: serde_json::from_value(record_json)?,
        }))
    }

    async fn insert(
        &self,
        record: &CandidateRecord,
        now: DateTime<Utc>,
    ) -> Result<StoredCandidate, StoreError> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO candidates (id, email, candidate_name, record_json, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            "#,
        )
        .bind(id)
        .bind(record.email())
        .bind(&record.candidate_name)
        .bind(serde_json::to_value(record)?)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(StoredCandidate {
            id,
            created_at: now,
            updated_at: now,
            record: record.clone(),
        })
    }

    async fn update(
        &self,
        id: Uuid,
        record: &CandidateRecord,
        now: DateTime<Utc>,
    ) -> Result<StoredCandidate, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE candidates
               SET email = $2,
                   candidate_name = $3,
                   record_json = $4,
                   updated_at = $5
             WHERE id = $1
            RETURNING created_at
            "#,
        )
        .bind(id)
        .bind(record.email())
        .bind(&record.candidate_name)
        .bind(serde_json::to_value(record)?)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound(id))?;

        Ok(StoredCandidate {
            id,
            created_at: row.try_get("created_at")?,
            updated_at: now,
            record: record.clone(),
        })
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("candidate store connection closed");
    }
}

/// Process-local store with the same uniqueness rules as the SQL table.
#[derive(Debug, Default)]
pub struct MemoryCandidateStore {
    rows: Mutex<BTreeMap<Uuid, StoredCandidate>>,
    closed: AtomicBool,
}

impl MemoryCandidateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.lock().await.is_empty()
    }

    pub async fn all(&self) -> Vec<StoredCandidate> {
        self.rows.lock().await.values().cloned().collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CandidateStore for MemoryCandidateStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<StoredCandidate>, StoreError> {
        let rows = self.rows.lock().await;
        Ok(rows.values().find(|c| c.record.email() == email).cloned())
    }

    async fn insert(
        &self,
        record: &CandidateRecord,
        now: DateTime<Utc>,
    ) -> Result<StoredCandidate, StoreError> {
        let mut rows = self.rows.lock().await;
        if rows.values().any(|c| c.record.email() == record.email()) {
            return Err(StoreError::DuplicateEmail(record.email().to_string()));
        }
        let stored = StoredCandidate {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            record: record.clone(),
        };
        rows.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn update(
        &self,
        id: Uuid,
        record: &CandidateRecord,
        now: DateTime<Utc>,
    ) -> Result<StoredCandidate, StoreError> {
        let mut rows = self.rows.lock().await;
        if rows
            .values()
            .any(|c| c.id != id && c.record.email() == record.email())
        {
            return Err(StoreError::DuplicateEmail(record.email().to_string()));
        }
        let existing = rows.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        existing.record = record.clone();
        existing.updated_at = now;
        Ok(existing.clone())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
