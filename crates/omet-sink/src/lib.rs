//! Relational sink and baseline persistence for orchestrator metrics.
//!
//! The sink contract is deliberately narrow: ensure a table exists with
//! text columns, optionally truncate it, append rows. Column types are all
//! VARCHAR(255); downstream reporting casts as needed.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use omet_core::{Row, Scalar, Snapshot, MISSING_PLACEHOLDER};
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use sqlx::MySqlPool;
use thiserror::Error;
use tokio::fs;
use tracing::info;
use uuid::Uuid;

pub const CRATE_NAME: &str = "omet-sink";

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum BaselineError {
    #[error("baseline io at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("baseline codec at {path}: {source}")]
    Codec {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Write contract against the relational store.
#[async_trait]
pub trait MetricSink: Send + Sync {
    async fn ensure_table(&self, table: &str, columns: &[String]) -> Result<(), PersistError>;
    async fn truncate(&self, table: &str) -> Result<(), PersistError>;
    async fn append_rows(&self, table: &str, rows: &[Row]) -> Result<(), PersistError>;
}

/// Keyed store holding the last persisted snapshot per metric family,
/// durable across process restarts.
#[async_trait]
pub trait BaselineStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<Snapshot>, BaselineError>;
    async fn store(&self, key: &str, snapshot: &Snapshot) -> Result<(), BaselineError>;
}

#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub host: String,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl SinkConfig {
    fn connect_options(&self) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&self.host)
            .username(&self.user)
            .password(&self.password)
    }
}

#[derive(Debug, Clone)]
pub struct MySqlSink {
    pool: MySqlPool,
}

impl MySqlSink {
    /// Creates the schema if it does not exist yet, then pools against it.
    pub async fn connect(config: &SinkConfig) -> Result<Self, PersistError> {
        let server = MySqlPoolOptions::new()
            .max_connections(1)
            .connect_with(config.connect_options())
            .await?;
        sqlx::query(&format!(
            "CREATE DATABASE IF NOT EXISTS `{}`",
            sanitize_ident(&config.database)
        ))
        .execute(&server)
        .await?;
        server.close().await;

        let pool = MySqlPoolOptions::new()
            .connect_with(config.connect_options().database(&config.database))
            .await?;
        info!(database = %config.database, "metric schema ready");
        Ok(Self { pool })
    }
}

#[async_trait]
impl MetricSink for MySqlSink {
    async fn ensure_table(&self, table: &str, columns: &[String]) -> Result<(), PersistError> {
        if columns.is_empty() {
            return Ok(());
        }
        sqlx::query(&create_table_sql(table, columns))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn truncate(&self, table: &str) -> Result<(), PersistError> {
        sqlx::query(&format!("TRUNCATE TABLE `{}`", sanitize_ident(table)))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn append_rows(&self, table: &str, rows: &[Row]) -> Result<(), PersistError> {
        let columns = column_union(rows);
        if columns.is_empty() {
            return Ok(());
        }
        let sql = insert_sql(table, &columns);
        for row in rows {
            let mut query = sqlx::query(&sql);
            for column in &columns {
                let cell = row
                    .get(column)
                    .map(Scalar::to_string)
                    .unwrap_or_else(|| MISSING_PLACEHOLDER.to_string());
                query = query.bind(cell);
            }
            query.execute(&self.pool).await?;
        }
        Ok(())
    }
}

/// Union of column names across a row batch. Rows may be heterogeneous when
/// a Replace pairs a new snapshot with an older baseline whose field set has
/// since drifted; absent cells are filled with the placeholder at insert.
pub fn column_union(rows: &[Row]) -> Vec<String> {
    rows.iter()
        .flat_map(|row| row.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn sanitize_ident(name: &str) -> String {
    name.replace('`', "")
}

fn create_table_sql(table: &str, columns: &[String]) -> String {
    let columns = columns
        .iter()
        .map(|c| format!("`{}` VARCHAR(255)", sanitize_ident(c)))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CREATE TABLE IF NOT EXISTS `{}` ({columns})",
        sanitize_ident(table)
    )
}

fn insert_sql(table: &str, columns: &[String]) -> String {
    let names = columns
        .iter()
        .map(|c| format!("`{}`", sanitize_ident(c)))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = vec!["?"; columns.len()].join(", ");
    format!(
        "INSERT INTO `{}` ({names}) VALUES ({placeholders})",
        sanitize_ident(table)
    )
}

/// One JSON file per metric family, replaced atomically on every store.
#[derive(Debug, Clone)]
pub struct FileBaselineStore {
    dir: PathBuf,
}

impl FileBaselineStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

#[async_trait]
impl BaselineStore for FileBaselineStore {
    async fn load(&self, key: &str) -> Result<Option<Snapshot>, BaselineError> {
        let path = self.path_for(key);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(BaselineError::Io { path, source }),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| BaselineError::Codec { path, source })
    }

    async fn store(&self, key: &str, snapshot: &Snapshot) -> Result<(), BaselineError> {
        let path = self.path_for(key);
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| BaselineError::Io {
                path: self.dir.clone(),
                source,
            })?;

        let bytes = serde_json::to_vec_pretty(snapshot).map_err(|source| BaselineError::Codec {
            path: path.clone(),
            source,
        })?;

        let temp_path = self.dir.join(format!(".{key}.{}.tmp", Uuid::new_v4()));
        fs::write(&temp_path, &bytes)
            .await
            .map_err(|source| BaselineError::Io {
                path: temp_path.clone(),
                source,
            })?;
        match fs::rename(&temp_path, &path).await {
            Ok(()) => Ok(()),
            Err(source) => {
                let _ = fs::remove_file(&temp_path).await;
                Err(BaselineError::Io { path, source })
            }
        }
    }
}
