//! SQLite database for object and block metadata.

use std::path::Path;

use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions},
    Row, SqliteConnection,
};

use crate::error::Result;

/// Object row stored in SQLite.
#[derive(Debug, Clone)]
pub(crate) struct ObjectRow {
    pub name: String,
    pub size: i64,
    pub data_key: Option<String>,
    pub content_type: Option<String>,
    pub tier: Option<String>,
    pub metadata: String,
    pub lease_owner: Option<String>,
    pub created_at: i64,
    pub modified_at: i64,
}

/// A staged or committed block row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BlockRow {
    pub block_id: String,
    pub size: i64,
    pub storage_key: String,
}

/// Fields written by a whole-object put or a block commit.
#[derive(Debug, Clone)]
pub(crate) struct ObjectWrite<'a> {
    pub name: &'a str,
    pub size: i64,
    pub data_key: Option<&'a str>,
    pub content_type: Option<&'a str>,
    pub tier: Option<&'a str>,
    /// `None` keeps the current metadata of an existing object.
    pub metadata: Option<&'a str>,
    pub now: i64,
}

const OBJECT_COLUMNS: &str =
    "name, size, data_key, content_type, tier, metadata, lease_owner, created_at, modified_at";

fn object_from_row(r: &sqlx::sqlite::SqliteRow) -> ObjectRow {
    ObjectRow {
        name: r.get("name"),
        size: r.get("size"),
        data_key: r.get("data_key"),
        content_type: r.get("content_type"),
        tier: r.get("tier"),
        metadata: r.get("metadata"),
        lease_owner: r.get("lease_owner"),
        created_at: r.get("created_at"),
        modified_at: r.get("modified_at"),
    }
}

fn block_from_row(r: &sqlx::sqlite::SqliteRow) -> BlockRow {
    BlockRow {
        block_id: r.get("block_id"),
        size: r.get("size"),
        storage_key: r.get("storage_key"),
    }
}

/// SQLite database connection pool.
#[derive(Debug, Clone)]
pub(crate) struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection from a file path.
    pub async fn new(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Create an in-memory database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .journal_mode(SqliteJournalMode::Wal);

        // The database lives exactly as long as its only connection
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Get an object row by name.
    pub async fn get_object(&self, name: &str) -> Result<Option<ObjectRow>> {
        let mut conn = self.pool.acquire().await?;
        fetch_object(&mut conn, name).await
    }

    /// Objects whose name starts with `prefix` and sorts after `after`,
    /// in name order.
    pub async fn list_objects_after(
        &self,
        prefix: &str,
        after: &str,
        limit: i64,
    ) -> Result<Vec<ObjectRow>> {
        let sql = format!(
            "SELECT {} FROM objects
             WHERE substr(name, 1, ?) = ? AND name > ?
             ORDER BY name
             LIMIT ?",
            OBJECT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(prefix.chars().count() as i64)
            .bind(prefix)
            .bind(after)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(object_from_row).collect())
    }

    /// Committed blocks of an object in commit order.
    pub async fn committed_blocks(&self, name: &str) -> Result<Vec<BlockRow>> {
        let mut conn = self.pool.acquire().await?;
        fetch_committed(&mut conn, name).await
    }

    /// Uncommitted blocks of an object.
    pub async fn staged_blocks(&self, name: &str) -> Result<Vec<BlockRow>> {
        let rows = sqlx::query(
            r#"
            SELECT block_id, size, storage_key FROM staged_blocks
            WHERE object_name = ?
            ORDER BY staged_at, block_id
            "#,
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(block_from_row).collect())
    }

    /// Record a staged block, returning the storage key it replaced.
    pub async fn stage_block(&self, name: &str, block: &BlockRow, now: i64) -> Result<Option<String>> {
        let mut tx = self.pool.begin().await?;
        let previous: Option<String> = sqlx::query(
            r#"
            SELECT storage_key FROM staged_blocks WHERE object_name = ? AND block_id = ?
            "#,
        )
        .bind(name)
        .bind(&block.block_id)
        .fetch_optional(&mut *tx)
        .await?
        .map(|r| r.get("storage_key"));

        sqlx::query(
            r#"
            INSERT INTO staged_blocks (object_name, block_id, size, storage_key, staged_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(object_name, block_id) DO UPDATE SET
                size = excluded.size,
                storage_key = excluded.storage_key,
                staged_at = excluded.staged_at
            "#,
        )
        .bind(name)
        .bind(&block.block_id)
        .bind(block.size)
        .bind(&block.storage_key)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(previous)
    }

    /// Replace an object with a whole payload. Committed and staged blocks
    /// are dropped; returns every storage key the object stopped using.
    pub async fn put_object(&self, write: &ObjectWrite<'_>) -> Result<Vec<String>> {
        let mut tx = self.pool.begin().await?;
        let mut released = content_keys(&mut tx, write.name).await?;
        released.extend(staged_keys(&mut tx, write.name).await?);
        clear_blocks(&mut tx, write.name).await?;
        upsert_object(&mut tx, write).await?;
        tx.commit().await?;
        Ok(released)
    }

    /// Atomically replace the committed block list of an object. Staged
    /// blocks are discarded; returns storage keys no longer used by it.
    pub async fn commit_blocks(
        &self,
        write: &ObjectWrite<'_>,
        blocks: &[BlockRow],
    ) -> Result<Vec<String>> {
        let mut tx = self.pool.begin().await?;
        let mut released = content_keys(&mut tx, write.name).await?;
        released.extend(staged_keys(&mut tx, write.name).await?);
        clear_blocks(&mut tx, write.name).await?;

        for (position, block) in blocks.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO committed_blocks (object_name, position, block_id, size, storage_key)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(write.name)
            .bind(position as i64)
            .bind(&block.block_id)
            .bind(block.size)
            .bind(&block.storage_key)
            .execute(&mut *tx)
            .await?;
        }

        upsert_object(&mut tx, write).await?;
        tx.commit().await?;

        released.retain(|key| !blocks.iter().any(|b| &b.storage_key == key));
        Ok(released)
    }

    /// Delete an object and its blocks, returning its storage keys.
    pub async fn delete_object(&self, name: &str) -> Result<Option<Vec<String>>> {
        let mut tx = self.pool.begin().await?;
        if fetch_object(&mut tx, name).await?.is_none() {
            return Ok(None);
        }
        let mut released = content_keys(&mut tx, name).await?;
        released.extend(staged_keys(&mut tx, name).await?);
        clear_blocks(&mut tx, name).await?;
        sqlx::query("DELETE FROM objects WHERE name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(Some(released))
    }

    /// Copy an object row and its committed blocks to `target`. Payload keys
    /// are shared between both objects. Returns keys the previous target
    /// released, or `None` when the source does not exist.
    pub async fn copy_object(&self, source: &str, target: &str, now: i64) -> Result<Option<Vec<String>>> {
        let mut tx = self.pool.begin().await?;
        let Some(src) = fetch_object(&mut tx, source).await? else {
            return Ok(None);
        };
        let blocks = fetch_committed(&mut tx, source).await?;

        let mut released = content_keys(&mut tx, target).await?;
        released.extend(staged_keys(&mut tx, target).await?);
        clear_blocks(&mut tx, target).await?;

        for (position, block) in blocks.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO committed_blocks (object_name, position, block_id, size, storage_key)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(target)
            .bind(position as i64)
            .bind(&block.block_id)
            .bind(block.size)
            .bind(&block.storage_key)
            .execute(&mut *tx)
            .await?;
        }

        upsert_object(
            &mut tx,
            &ObjectWrite {
                name: target,
                size: src.size,
                data_key: src.data_key.as_deref(),
                content_type: src.content_type.as_deref(),
                tier: src.tier.as_deref(),
                metadata: Some(&src.metadata),
                now,
            },
        )
        .await?;
        tx.commit().await?;

        released.retain(|key| {
            src.data_key.as_deref() != Some(key.as_str())
                && !blocks.iter().any(|b| &b.storage_key == key)
        });
        Ok(Some(released))
    }

    /// Replace the metadata of an object. Returns false when it is missing.
    pub async fn set_metadata(&self, name: &str, metadata: &str, now: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE objects SET metadata = ?, modified_at = ? WHERE name = ?
            "#,
        )
        .bind(metadata)
        .bind(now)
        .bind(name)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Set or clear the lease owner. Returns false when the object is missing.
    pub async fn set_lease(&self, name: &str, owner: Option<&str>) -> Result<bool> {
        let result = sqlx::query("UPDATE objects SET lease_owner = ? WHERE name = ?")
            .bind(owner)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Whether any object or block still references a storage key.
    pub async fn is_key_referenced(&self, key: &str) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT 1 FROM committed_blocks WHERE storage_key = ?1
            UNION ALL
            SELECT 1 FROM staged_blocks WHERE storage_key = ?1
            UNION ALL
            SELECT 1 FROM objects WHERE data_key = ?1
            LIMIT 1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }
}

async fn fetch_object(conn: &mut SqliteConnection, name: &str) -> Result<Option<ObjectRow>> {
    let sql = format!("SELECT {} FROM objects WHERE name = ?", OBJECT_COLUMNS);
    let row = sqlx::query(&sql).bind(name).fetch_optional(&mut *conn).await?;
    Ok(row.as_ref().map(object_from_row))
}

async fn fetch_committed(conn: &mut SqliteConnection, name: &str) -> Result<Vec<BlockRow>> {
    let rows = sqlx::query(
        r#"
        SELECT block_id, size, storage_key FROM committed_blocks
        WHERE object_name = ?
        ORDER BY position
        "#,
    )
    .bind(name)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.iter().map(block_from_row).collect())
}

/// Storage keys holding the committed content of an object.
async fn content_keys(conn: &mut SqliteConnection, name: &str) -> Result<Vec<String>> {
    let mut keys: Vec<String> = fetch_committed(&mut *conn, name)
        .await?
        .into_iter()
        .map(|b| b.storage_key)
        .collect();
    if let Some(row) = fetch_object(&mut *conn, name).await? {
        keys.extend(row.data_key);
    }
    Ok(keys)
}

async fn staged_keys(conn: &mut SqliteConnection, name: &str) -> Result<Vec<String>> {
    let rows = sqlx::query("SELECT storage_key FROM staged_blocks WHERE object_name = ?")
        .bind(name)
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows.iter().map(|r| r.get("storage_key")).collect())
}

async fn clear_blocks(conn: &mut SqliteConnection, name: &str) -> Result<()> {
    sqlx::query("DELETE FROM committed_blocks WHERE object_name = ?")
        .bind(name)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM staged_blocks WHERE object_name = ?")
        .bind(name)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn upsert_object(conn: &mut SqliteConnection, write: &ObjectWrite<'_>) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO objects (name, size, data_key, content_type, tier, metadata, lease_owner, created_at, modified_at)
        VALUES (?1, ?2, ?3, ?4, ?5, COALESCE(?6, '{}'), NULL, ?7, ?7)
        ON CONFLICT(name) DO UPDATE SET
            size = excluded.size,
            data_key = excluded.data_key,
            content_type = excluded.content_type,
            tier = excluded.tier,
            metadata = COALESCE(?6, objects.metadata),
            modified_at = excluded.modified_at
        "#,
    )
    .bind(write.name)
    .bind(write.size)
    .bind(write.data_key)
    .bind(write.content_type)
    .bind(write.tier)
    .bind(write.metadata)
    .bind(write.now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[cfg(test)]
impl Database {
    /// Count objects.
    pub async fn count_objects(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM objects")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("count"))
    }
}
