use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use sqlx::FromRow;
use sqlx::migrate::{MigrateError, Migrator};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::config::StoreConfig;
use crate::error::{LibError, Result};
use crate::models::{DataRoom, NormalizedGraph, OwnerId, RoomId};
use crate::store::RecordStore;

pub static MIGRATOR: Lazy<Migrator> = Lazy::new(|| {
    let mut migrator = sqlx::migrate!("./migrations");
    migrator.set_ignore_missing(true);
    migrator
});

pub async fn create_room_tables(pool: &SqlitePool) -> std::result::Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

/// Opens a pool for `config` and runs migrations.
///
/// An in-memory database lives only as long as its connection, so such
/// pools are pinned to a single connection that is never recycled.
pub async fn connect(config: &StoreConfig) -> Result<SqlitePool> {
    let options = if config.is_in_memory() {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(config.max_connections)
    };

    let pool = options
        .connect(&config.database_url)
        .await
        .map_err(|err| db_err("Failed to open room database", err))?;
    create_room_tables(&pool).await.map_err(|err| {
        LibError::storage("Failed to prepare room database", anyhow!(err))
    })?;
    Ok(pool)
}

#[derive(Debug, Clone, FromRow)]
struct RoomRow {
    id: String,
    owner_id: String,
    name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    graph: String,
}

impl TryFrom<RoomRow> for DataRoom {
    type Error = LibError;

    fn try_from(row: RoomRow) -> Result<Self> {
        let id = row.id.parse::<RoomId>().map_err(|err| {
            LibError::storage("Stored record could not be decoded", anyhow!(err))
        })?;
        let owner_id = row.owner_id.parse::<OwnerId>().map_err(|err| {
            LibError::storage("Stored record could not be decoded", anyhow!(err))
        })?;
        let graph: NormalizedGraph = serde_json::from_str(&row.graph)?;
        Ok(DataRoom {
            id,
            name: row.name,
            owner_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            graph,
        })
    }
}

fn db_err(public: &'static str, err: sqlx::Error) -> LibError {
    LibError::storage(public, anyhow!(err))
}

/// [`RecordStore`] backed by a SQLite `rooms` table. Each room graph is
/// stored as a single JSON document.
#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        Ok(Self::new(connect(config).await?))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn get(&self, room_id: RoomId) -> Result<Option<DataRoom>> {
        let row = sqlx::query_as::<_, RoomRow>(
            r#"
            SELECT id, owner_id, name, created_at, updated_at, graph
            FROM rooms
            WHERE id = ?1
            "#,
        )
        .bind(room_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| db_err("Failed to query room", err))?;

        row.map(DataRoom::try_from).transpose()
    }

    async fn list_by_owner(&self, owner_id: OwnerId) -> Result<Vec<DataRoom>> {
        let rows = sqlx::query_as::<_, RoomRow>(
            r#"
            SELECT id, owner_id, name, created_at, updated_at, graph
            FROM rooms
            WHERE owner_id = ?1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(owner_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|err| db_err("Failed to list rooms", err))?;

        rows.into_iter().map(DataRoom::try_from).collect()
    }

    async fn put(&self, room: &DataRoom) -> Result<()> {
        let graph = serde_json::to_string(&room.graph)?;
        sqlx::query(
            r#"
            INSERT INTO rooms (id, owner_id, name, created_at, updated_at, graph)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT (id) DO UPDATE SET
                owner_id = excluded.owner_id,
                name = excluded.name,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                graph = excluded.graph
            "#,
        )
        .bind(room.id.to_string())
        .bind(room.owner_id.to_string())
        .bind(&room.name)
        .bind(room.created_at)
        .bind(room.updated_at)
        .bind(graph)
        .execute(&self.pool)
        .await
        .map_err(|err| db_err("Failed to write room record", err))?;
        Ok(())
    }

    async fn delete(&self, room_id: RoomId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM rooms WHERE id = ?1")
            .bind(room_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|err| db_err("Failed to delete room record", err))?;
        Ok(result.rows_affected() > 0)
    }
}
