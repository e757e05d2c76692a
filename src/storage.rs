//! SQLite record store for telemetry probes.
//!
//! One table, one row per probe, keyed by the generated `record_id`. Rows are
//! inserted once and never updated; nothing in the request path reads them
//! back.

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::config::is_identifier;
use crate::error::ServiceError;
use crate::model::TelemetryRecord;
use crate::services::RecordStore;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
    table: String,
}

impl Storage {
    /// Create a new storage instance and initialize the schema.
    ///
    /// # Arguments
    ///
    /// * `database_url` - SQLite connection string (e.g., "sqlite:portfolio-edge.db"
    ///   or "sqlite::memory:")
    /// * `table` - Table holding telemetry records; must be a plain identifier
    pub async fn new(database_url: &str, table: &str) -> anyhow::Result<Self> {
        if !is_identifier(table) {
            anyhow::bail!("invalid table name {table:?}");
        }

        // Every in-memory connection is its own database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        let storage = Self {
            pool,
            table: table.to_string(),
        };
        storage.initialize_schema().await?;

        Ok(storage)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the table if it doesn't exist.
    async fn initialize_schema(&self) -> anyhow::Result<()> {
        let create_table = format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{table}" (
                record_id TEXT PRIMARY KEY,
                ts TEXT NOT NULL,
                ip_address TEXT NOT NULL,
                city TEXT NOT NULL,
                country TEXT NOT NULL,
                isp TEXT NOT NULL,
                lat REAL NOT NULL,
                lon REAL NOT NULL,
                user_agent TEXT NOT NULL,
                status TEXT NOT NULL
            )
            "#,
            table = self.table
        );
        sqlx::query(&create_table).execute(&self.pool).await?;

        // Index for time-range analytics
        let create_index = format!(
            r#"CREATE INDEX IF NOT EXISTS "idx_{table}_ts" ON "{table}"(ts)"#,
            table = self.table
        );
        sqlx::query(&create_index).execute(&self.pool).await?;

        Ok(())
    }

    /// Insert one telemetry record.
    pub async fn insert_record(&self, record: &TelemetryRecord) -> Result<(), ServiceError> {
        let insert = format!(
            r#"
            INSERT INTO "{table}"
                (record_id, ts, ip_address, city, country, isp, lat, lon, user_agent, status)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            table = self.table
        );

        sqlx::query(&insert)
            .bind(record.record_id.to_string())
            .bind(&record.timestamp)
            .bind(&record.ip_address)
            .bind(&record.city)
            .bind(&record.country)
            .bind(&record.isp)
            .bind(record.lat)
            .bind(record.lon)
            .bind(&record.user_agent)
            .bind(record.status.as_str())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

impl RecordStore for Storage {
    async fn put_record(&self, record: &TelemetryRecord) -> Result<(), ServiceError> {
        self.insert_record(record).await
    }
}
