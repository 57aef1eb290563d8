//! Backing store for harvested records
//!
//! The pipeline talks to [`RecordStore`] only; [`PgStudentStore`] is the
//! PostgreSQL implementation used by the binary.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::Duration;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::error::StoreError;
use crate::models::StudentRecord;

/// What happened to an insert that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The key was already in the table, typically left by an earlier run
    AlreadyPresent,
}

/// Destination for persisted records
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create tables if they are missing; safe to call repeatedly
    async fn create_schema(&self) -> Result<(), StoreError>;

    /// Write one record
    async fn insert(&self, record: &StudentRecord) -> Result<InsertOutcome, StoreError>;
}

const CREATE_STUDENTS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS students (
        roll        TEXT PRIMARY KEY,
        username    TEXT NOT NULL DEFAULT '',
        name        TEXT NOT NULL DEFAULT '',
        program     TEXT NOT NULL DEFAULT '',
        dept        TEXT NOT NULL DEFAULT '',
        hall        TEXT NOT NULL DEFAULT '',
        room        TEXT NOT NULL DEFAULT '',
        blood_group TEXT NOT NULL DEFAULT '',
        gender      TEXT NOT NULL DEFAULT '',
        hometown    TEXT NOT NULL DEFAULT '',
        updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
"#;

/// PostgreSQL-backed [`RecordStore`]
#[derive(Clone)]
pub struct PgStudentStore {
    pool: PgPool,
}

impl PgStudentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool using `config`
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await?;

        info!(max_connections = config.max_connections, "Connected to database");
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Every stored student, ordered by roll number
    pub async fn fetch_all(&self) -> Result<Vec<StudentRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT roll, username, name, program, dept, hall, room,
                   blood_group, gender, hometown, updated_at
            FROM students
            ORDER BY roll
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(student_from_row).collect::<Result<_, _>>().map_err(StoreError::from)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn student_from_row(row: &PgRow) -> Result<StudentRecord, sqlx::Error> {
    Ok(StudentRecord {
        roll: row.try_get("roll")?,
        username: row.try_get("username")?,
        name: row.try_get("name")?,
        program: row.try_get("program")?,
        dept: row.try_get("dept")?,
        hall: row.try_get("hall")?,
        room: row.try_get("room")?,
        blood_group: row.try_get("blood_group")?,
        gender: row.try_get("gender")?,
        hometown: row.try_get("hometown")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl RecordStore for PgStudentStore {
    async fn create_schema(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_STUDENTS_TABLE).execute(&self.pool).await?;
        info!("Students schema ready");
        Ok(())
    }

    async fn insert(&self, record: &StudentRecord) -> Result<InsertOutcome, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO students (
                roll, username, name, program, dept, hall, room,
                blood_group, gender, hometown, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&record.roll)
        .bind(&record.username)
        .bind(&record.name)
        .bind(&record.program)
        .bind(&record.dept)
        .bind(&record.hall)
        .bind(&record.room)
        .bind(&record.blood_group)
        .bind(&record.gender)
        .bind(&record.hometown)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Ok(InsertOutcome::AlreadyPresent)
            },
            Err(e) => Err(e.into()),
        }
    }
}
