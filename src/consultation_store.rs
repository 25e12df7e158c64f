//! Persistence of paid consultations.
//!
//! [`PgConsultationStore`] is the production store; every query runs through
//! the shared circuit breaker so a failing database is refused fast instead of
//! holding webhook deliveries open. [`MemoryConsultationStore`] backs the
//! router tests.

use async_trait::async_trait;
use failsafe::futures::CircuitBreaker;
use sqlx::PgPool;
use std::str::FromStr;
use std::sync::Mutex;

use crate::circuit_breaker::{create_db_circuit_breaker, StoreCircuitBreaker};
use crate::errors::AppError;
use crate::models::ConsultationRecord;

/// How a completed checkout is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// One row per checkout session; redelivered events are ignored.
    Insert,
    /// One row per customer email; the latest checkout replaces the previous one.
    UpsertByEmail,
}

impl FromStr for WriteMode {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "insert" => Ok(WriteMode::Insert),
            "upsert" | "upsert_by_email" => Ok(WriteMode::UpsertByEmail),
            other => anyhow::bail!(
                "CONSULTATION_WRITE_MODE must be 'insert' or 'upsert', got '{}'",
                other
            ),
        }
    }
}

/// Result of a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Inserted,
    Updated,
    /// A record for the same checkout session already exists.
    Duplicate,
}

#[async_trait]
pub trait ConsultationStore: Send + Sync {
    async fn save(&self, record: ConsultationRecord) -> Result<SaveOutcome, AppError>;

    async fn find_by_session(
        &self,
        session_id: &str,
    ) -> Result<Option<ConsultationRecord>, AppError>;
}

fn breaker_error(err: failsafe::Error<sqlx::Error>) -> AppError {
    match err {
        failsafe::Error::Rejected => {
            AppError::StoreUnavailable("circuit open after repeated database failures".to_string())
        }
        failsafe::Error::Inner(e) => e.into(),
    }
}

pub struct PgConsultationStore {
    pool: PgPool,
    mode: WriteMode,
    breaker: StoreCircuitBreaker,
}

impl PgConsultationStore {
    pub fn new(pool: PgPool, mode: WriteMode) -> Self {
        Self {
            pool,
            mode,
            breaker: create_db_circuit_breaker(),
        }
    }

    async fn insert(&self, record: &ConsultationRecord) -> Result<SaveOutcome, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO consultations
                (id, session_id, customer_email, answers, payment_status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (session_id) DO NOTHING
            "#,
        )
        .bind(record.id)
        .bind(&record.session_id)
        .bind(&record.customer_email)
        .bind(&record.answers)
        .bind(&record.payment_status)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(if result.rows_affected() == 0 {
            SaveOutcome::Duplicate
        } else {
            SaveOutcome::Inserted
        })
    }

    async fn upsert_by_email(
        &self,
        record: &ConsultationRecord,
        email: &str,
    ) -> Result<SaveOutcome, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        // Serializes deliveries for the same email until commit
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(email)
            .execute(&mut *tx)
            .await?;

        let recorded: Option<(uuid::Uuid,)> =
            sqlx::query_as("SELECT id FROM consultations WHERE session_id = $1")
                .bind(&record.session_id)
                .fetch_optional(&mut *tx)
                .await?;
        if recorded.is_some() {
            tx.commit().await?;
            return Ok(SaveOutcome::Duplicate);
        }

        let updated: Option<(uuid::Uuid,)> = sqlx::query_as(
            r#"
            UPDATE consultations
            SET session_id = $2, answers = $3, payment_status = $4, created_at = $5
            WHERE id = (
                SELECT id FROM consultations
                WHERE customer_email = $1
                ORDER BY created_at DESC
                LIMIT 1
            )
            RETURNING id
            "#,
        )
        .bind(email)
        .bind(&record.session_id)
        .bind(&record.answers)
        .bind(&record.payment_status)
        .bind(record.created_at)
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = if updated.is_some() {
            SaveOutcome::Updated
        } else {
            sqlx::query(
                r#"
                INSERT INTO consultations
                    (id, session_id, customer_email, answers, payment_status, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(record.id)
            .bind(&record.session_id)
            .bind(email)
            .bind(&record.answers)
            .bind(&record.payment_status)
            .bind(record.created_at)
            .execute(&mut *tx)
            .await?;
            SaveOutcome::Inserted
        };

        tx.commit().await?;
        Ok(outcome)
    }
}

#[async_trait]
impl ConsultationStore for PgConsultationStore {
    async fn save(&self, record: ConsultationRecord) -> Result<SaveOutcome, AppError> {
        let outcome = match (self.mode, record.customer_email.as_deref()) {
            (WriteMode::UpsertByEmail, Some(email)) => {
                self.breaker.call(self.upsert_by_email(&record, email)).await
            }
            _ => self.breaker.call(self.insert(&record)).await,
        }
        .map_err(breaker_error)?;

        tracing::debug!(
            "Consultation for session {} saved: {:?}",
            record.session_id,
            outcome
        );
        Ok(outcome)
    }

    async fn find_by_session(
        &self,
        session_id: &str,
    ) -> Result<Option<ConsultationRecord>, AppError> {
        let query = sqlx::query_as::<_, ConsultationRecord>(
            r#"
            SELECT id, session_id, customer_email, answers, payment_status, created_at
            FROM consultations
            WHERE session_id = $1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool);

        self.breaker.call(query).await.map_err(breaker_error)
    }
}

/// In-process store with the same write semantics as the database.
pub struct MemoryConsultationStore {
    mode: WriteMode,
    records: Mutex<Vec<ConsultationRecord>>,
    unavailable: bool,
}

impl MemoryConsultationStore {
    pub fn new(mode: WriteMode) -> Self {
        Self {
            mode,
            records: Mutex::new(Vec::new()),
            unavailable: false,
        }
    }

    /// A store whose every call fails as if the circuit were open.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::new(WriteMode::Insert)
        }
    }

    /// Snapshot of the stored records, oldest first.
    pub fn records(&self) -> Vec<ConsultationRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    fn check_available(&self) -> Result<(), AppError> {
        if self.unavailable {
            return Err(AppError::StoreUnavailable("in-memory store disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ConsultationStore for MemoryConsultationStore {
    async fn save(&self, record: ConsultationRecord) -> Result<SaveOutcome, AppError> {
        self.check_available()?;
        let mut records = self
            .records
            .lock()
            .map_err(|_| AppError::InternalError("consultation store lock poisoned".to_string()))?;

        // session_id is unique in both modes
        if records.iter().any(|r| r.session_id == record.session_id) {
            return Ok(SaveOutcome::Duplicate);
        }

        if let (WriteMode::UpsertByEmail, Some(email)) = (self.mode, record.customer_email.as_deref())
        {
            if let Some(existing) = records
                .iter_mut()
                .filter(|r| r.customer_email.as_deref() == Some(email))
                .max_by_key(|r| r.created_at)
            {
                existing.session_id = record.session_id;
                existing.answers = record.answers;
                existing.payment_status = record.payment_status;
                existing.created_at = record.created_at;
                return Ok(SaveOutcome::Updated);
            }
        }

        records.push(record);
        Ok(SaveOutcome::Inserted)
    }

    async fn find_by_session(
        &self,
        session_id: &str,
    ) -> Result<Option<ConsultationRecord>, AppError> {
        self.check_available()?;
        Ok(self
            .records()
            .into_iter()
            .find(|r| r.session_id == session_id))
    }
}
