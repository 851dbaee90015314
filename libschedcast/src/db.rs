//! SQLite storage for Schedcast
//!
//! Implements [`PostRepository`] and [`ConnectionRegistry`] on one pool.
//! Instants are stored as Unix seconds, so sub-second precision is dropped on
//! write and the returned records always match what a later read yields.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;
use tracing::debug;

use crate::error::{Result, SchedcastError, StorageError};
use crate::repository::{ConnectionRegistry, PostRepository};
use crate::types::{Connection, NewConnection, PostDraft, PostUpdate, ScheduledPost};

const POST_COLUMNS: &str = "id, owner_id, connection_id, platform, image_url, caption, \
                            scheduled_at, status, external_post_id, created_at";

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database at `db_path` and run migrations
    pub async fn new(db_path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(StorageError::IoError)?;
        }

        // Forward slashes work on both Windows and Unix; mode=rwc creates the file
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));
        Self::connect(&db_url).await
    }

    /// Private in-memory database, gone when the value is dropped
    pub async fn in_memory() -> Result<Self> {
        Self::connect("sqlite::memory:").await
    }

    async fn connect(url: &str) -> Result<Self> {
        // One connection: SQLite has a single writer anyway, and it keeps
        // read-modify-write updates serialized.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            // An in-memory database lives only as long as its connection
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(url)
            .await
            .map_err(StorageError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(StorageError::MigrationError)?;

        Ok(Self { pool })
    }

    async fn fetch_post(&self, id: &str) -> Result<Option<ScheduledPost>> {
        let row = sqlx::query(&format!("SELECT {} FROM posts WHERE id = ?", POST_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::SqlxError)?;

        row.as_ref().map(row_to_post).transpose()
    }
}

fn to_timestamp(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}

fn from_timestamp(table: &'static str, ts: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0).ok_or_else(|| {
        StorageError::CorruptRow {
            table,
            reason: format!("timestamp {} out of range", ts),
        }
        .into()
    })
}

fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name)
        .map_err(|e| SchedcastError::Storage(StorageError::SqlxError(e)))
}

fn parse_enum<T: std::str::FromStr<Err = String>>(table: &'static str, raw: &str) -> Result<T> {
    raw.parse::<T>()
        .map_err(|reason| StorageError::CorruptRow { table, reason }.into())
}

fn row_to_post(row: &SqliteRow) -> Result<ScheduledPost> {
    let platform: String = column(row, "platform")?;
    let status: String = column(row, "status")?;

    Ok(ScheduledPost {
        id: column(row, "id")?,
        owner_id: column(row, "owner_id")?,
        connection_id: column(row, "connection_id")?,
        platform: parse_enum("posts", &platform)?,
        image_url: column(row, "image_url")?,
        caption: column(row, "caption")?,
        scheduled_at: from_timestamp("posts", column(row, "scheduled_at")?)?,
        status: parse_enum("posts", &status)?,
        external_post_id: column(row, "external_post_id")?,
        created_at: from_timestamp("posts", column(row, "created_at")?)?,
    })
}

fn row_to_connection(row: &SqliteRow) -> Result<Connection> {
    let platform: String = column(row, "platform")?;

    Ok(Connection {
        id: column(row, "id")?,
        owner_id: column(row, "owner_id")?,
        platform: parse_enum("connections", &platform)?,
        account_label: column(row, "account_label")?,
        scope: column(row, "scope")?,
        created_at: from_timestamp("connections", column(row, "created_at")?)?,
    })
}

#[async_trait]
impl PostRepository for Database {
    async fn list_posts(&self, owner_id: &str) -> Result<Vec<ScheduledPost>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM posts WHERE owner_id = ?",
            POST_COLUMNS
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::SqlxError)?;

        rows.iter().map(row_to_post).collect()
    }

    async fn get_post(&self, id: &str) -> Result<ScheduledPost> {
        self.fetch_post(id)
            .await?
            .ok_or_else(|| SchedcastError::post_not_found(id))
    }

    async fn create_post(&self, owner_id: &str, draft: PostDraft) -> Result<ScheduledPost> {
        let mut post = ScheduledPost::from_draft(owner_id, draft);
        post.scheduled_at = from_timestamp("posts", to_timestamp(post.scheduled_at))?;
        post.created_at = from_timestamp("posts", to_timestamp(post.created_at))?;

        debug!(post_id = %post.id, owner_id, "inserting post");

        sqlx::query(
            r#"
            INSERT INTO posts (id, owner_id, connection_id, platform, image_url, caption,
                               scheduled_at, status, external_post_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&post.owner_id)
        .bind(&post.connection_id)
        .bind(post.platform.as_str())
        .bind(&post.image_url)
        .bind(&post.caption)
        .bind(to_timestamp(post.scheduled_at))
        .bind(post.status.as_str())
        .bind(&post.external_post_id)
        .bind(to_timestamp(post.created_at))
        .execute(&self.pool)
        .await
        .map_err(StorageError::SqlxError)?;

        Ok(post)
    }

    async fn update_post(&self, id: &str, update: PostUpdate) -> Result<ScheduledPost> {
        let mut tx = self.pool.begin().await.map_err(StorageError::SqlxError)?;

        let row = sqlx::query(&format!("SELECT {} FROM posts WHERE id = ?", POST_COLUMNS))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(StorageError::SqlxError)?;

        // Dropping `tx` on the early returns rolls back
        let mut post = match row {
            Some(row) => row_to_post(&row)?,
            None => return Err(SchedcastError::post_not_found(id)),
        };
        post.apply(&update)?;
        post.scheduled_at = from_timestamp("posts", to_timestamp(post.scheduled_at))?;

        debug!(post_id = id, ?update, "updating post");

        sqlx::query(
            r#"
            UPDATE posts SET scheduled_at = ?, status = ?, external_post_id = ? WHERE id = ?
            "#,
        )
        .bind(to_timestamp(post.scheduled_at))
        .bind(post.status.as_str())
        .bind(&post.external_post_id)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(StorageError::SqlxError)?;

        tx.commit().await.map_err(StorageError::SqlxError)?;
        Ok(post)
    }

    async fn delete_post(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StorageError::SqlxError)?;

        if result.rows_affected() == 0 {
            return Err(SchedcastError::post_not_found(id));
        }
        Ok(())
    }
}

#[async_trait]
impl ConnectionRegistry for Database {
    async fn list_connections(&self, owner_id: &str) -> Result<Vec<Connection>> {
        let rows = sqlx::query(
            r#"
            SELECT id, owner_id, platform, account_label, scope, created_at
            FROM connections
            WHERE owner_id = ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::SqlxError)?;

        rows.iter().map(row_to_connection).collect()
    }

    async fn create_connection(&self, owner_id: &str, new: NewConnection) -> Result<Connection> {
        let mut connection = Connection::new(owner_id, new);
        connection.created_at = from_timestamp("connections", to_timestamp(connection.created_at))?;

        sqlx::query(
            r#"
            INSERT INTO connections (id, owner_id, platform, account_label, scope, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&connection.id)
        .bind(&connection.owner_id)
        .bind(connection.platform.as_str())
        .bind(&connection.account_label)
        .bind(&connection.scope)
        .bind(to_timestamp(connection.created_at))
        .execute(&self.pool)
        .await
        .map_err(StorageError::SqlxError)?;

        Ok(connection)
    }

    async fn delete_connection(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM connections WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StorageError::SqlxError)?;

        if result.rows_affected() == 0 {
            return Err(SchedcastError::connection_not_found(id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Platform, PostStatus};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn draft(connection_id: &str) -> PostDraft {
        PostDraft {
            connection_id: connection_id.to_string(),
            platform: Platform::Instagram,
            image_url: "https://cdn.example.com/croissant.jpg".to_string(),
            caption: "Fresh out of the oven".to_string(),
            scheduled_at: Utc.with_ymd_and_hms(2024, 7, 10, 14, 30, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_database_initialization_with_invalid_path() {
        #[cfg(unix)]
        let invalid_path = "/tmp/test\0invalid.db";

        #[cfg(windows)]
        let invalid_path = "C:\\invalid<>path\\test.db";

        let result = Database::new(invalid_path).await;
        assert!(matches!(result, Err(SchedcastError::Storage(_))));
    }

    #[tokio::test]
    async fn test_file_database_persists_across_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("posts.db");
        let db_path = db_path.to_str().unwrap();

        let post = {
            let db = Database::new(db_path).await.unwrap();
            db.create_post("owner-1", draft("conn-1")).await.unwrap()
        };

        let reopened = Database::new(db_path).await.unwrap();
        assert_eq!(reopened.get_post(&post.id).await.unwrap(), post);
    }

    #[tokio::test]
    async fn test_create_and_retrieve_post() {
        let db = Database::in_memory().await.unwrap();
        let created = db.create_post("owner-1", draft("conn-1")).await.unwrap();

        let fetched = db.get_post(&created.id).await.unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.status, PostStatus::Scheduled);
        assert_eq!(fetched.external_post_id, None);
        assert_eq!(fetched.caption, "Fresh out of the oven");
    }

    #[tokio::test]
    async fn test_created_at_truncated_to_seconds() {
        let db = Database::in_memory().await.unwrap();
        let mut d = draft("conn-1");
        d.scheduled_at = Utc.timestamp_opt(1_720_621_800, 123_456_789).unwrap();

        let created = db.create_post("owner-1", d).await.unwrap();
        assert_eq!(created.scheduled_at.timestamp_subsec_nanos(), 0);
        assert_eq!(created.created_at.timestamp_subsec_nanos(), 0);
    }

    #[tokio::test]
    async fn test_get_nonexistent_post_is_not_found() {
        let db = Database::in_memory().await.unwrap();
        assert!(matches!(
            db.get_post("nonexistent").await,
            Err(SchedcastError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_posts_scoped_by_owner() {
        let db = Database::in_memory().await.unwrap();
        db.create_post("owner-1", draft("conn-1")).await.unwrap();
        db.create_post("owner-1", draft("conn-1")).await.unwrap();
        db.create_post("owner-2", draft("conn-9")).await.unwrap();

        assert_eq!(db.list_posts("owner-1").await.unwrap().len(), 2);
        assert_eq!(db.list_posts("owner-2").await.unwrap().len(), 1);
        assert!(db.list_posts("owner-3").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_scheduled_at_only_changes_date() {
        let db = Database::in_memory().await.unwrap();
        let created = db.create_post("owner-1", draft("conn-1")).await.unwrap();
        let target = Utc.with_ymd_and_hms(2024, 7, 15, 14, 30, 0).unwrap();

        let updated = db
            .update_post(&created.id, PostUpdate::scheduled_at(target))
            .await
            .unwrap();

        assert_eq!(updated.scheduled_at, target);
        assert_eq!(updated.status, created.status);
        assert_eq!(updated.created_at, created.created_at);
        assert_eq!(db.get_post(&created.id).await.unwrap(), updated);
    }

    #[tokio::test]
    async fn test_update_status_cannot_revert() {
        let db = Database::in_memory().await.unwrap();
        let created = db.create_post("owner-1", draft("conn-1")).await.unwrap();
        db.update_post(&created.id, PostUpdate::status(PostStatus::Failed))
            .await
            .unwrap();

        let result = db
            .update_post(&created.id, PostUpdate::status(PostStatus::Scheduled))
            .await;
        assert!(matches!(result, Err(SchedcastError::Validation(_))));

        let stored = db.get_post(&created.id).await.unwrap();
        assert_eq!(stored.status, PostStatus::Failed);
    }

    #[tokio::test]
    async fn test_external_id_set_once() {
        let db = Database::in_memory().await.unwrap();
        let created = db.create_post("owner-1", draft("conn-1")).await.unwrap();

        db.update_post(&created.id, PostUpdate::external_post_id("ig_1"))
            .await
            .unwrap();
        let result = db
            .update_post(&created.id, PostUpdate::external_post_id("ig_2"))
            .await;

        assert!(matches!(result, Err(SchedcastError::Validation(_))));
        assert_eq!(
            db.get_post(&created.id).await.unwrap().external_post_id.as_deref(),
            Some("ig_1")
        );
    }

    #[tokio::test]
    async fn test_update_missing_post_is_not_found() {
        let db = Database::in_memory().await.unwrap();
        let result = db
            .update_post("missing", PostUpdate::status(PostStatus::Cancelled))
            .await;
        assert!(matches!(result, Err(SchedcastError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_post_twice() {
        let db = Database::in_memory().await.unwrap();
        let created = db.create_post("owner-1", draft("conn-1")).await.unwrap();

        db.delete_post(&created.id).await.unwrap();
        assert!(matches!(
            db.delete_post(&created.id).await,
            Err(SchedcastError::NotFound(_))
        ));
        assert!(matches!(
            db.get_post(&created.id).await,
            Err(SchedcastError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_image_url_rejected_by_schema() {
        let db = Database::in_memory().await.unwrap();
        let mut d = draft("conn-1");
        d.image_url = String::new();

        let result = db.create_post("owner-1", d).await;
        assert!(matches!(result, Err(SchedcastError::Storage(_))));
    }

    #[tokio::test]
    async fn test_corrupt_status_surfaces_as_storage_error() {
        let db = Database::in_memory().await.unwrap();
        let created = db.create_post("owner-1", draft("conn-1")).await.unwrap();

        // Simulate a row written by a newer schema
        sqlx::query("PRAGMA ignore_check_constraints = ON")
            .execute(&db.pool)
            .await
            .unwrap();
        sqlx::query("UPDATE posts SET status = 'archived' WHERE id = ?")
            .bind(&created.id)
            .execute(&db.pool)
            .await
            .unwrap();

        let result = db.get_post(&created.id).await;
        assert!(matches!(
            result,
            Err(SchedcastError::Storage(StorageError::CorruptRow { table: "posts", .. }))
        ));
    }

    #[tokio::test]
    async fn test_connections_round_trip_and_no_cascade() {
        let db = Database::in_memory().await.unwrap();
        let connection = db
            .create_connection(
                "owner-1",
                NewConnection {
                    platform: Platform::Facebook,
                    account_label: "Corner Bakery".to_string(),
                    scope: None,
                },
            )
            .await
            .unwrap();

        let listed = db.list_connections("owner-1").await.unwrap();
        assert_eq!(listed, vec![connection.clone()]);

        let post = db.create_post("owner-1", draft(&connection.id)).await.unwrap();
        db.delete_connection(&connection.id).await.unwrap();

        // The post keeps its now-dangling connection id
        let stored = db.get_post(&post.id).await.unwrap();
        assert_eq!(stored.connection_id, connection.id);

        assert!(matches!(
            db.delete_connection(&connection.id).await,
            Err(SchedcastError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_updates_last_write_wins() {
        let db = Database::in_memory().await.unwrap();
        let created = db.create_post("owner-1", draft("conn-1")).await.unwrap();
        let a = Utc.with_ymd_and_hms(2024, 7, 15, 14, 30, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2024, 7, 20, 14, 30, 0).unwrap();

        let (ra, rb) = tokio::join!(
            db.update_post(&created.id, PostUpdate::scheduled_at(a)),
            db.update_post(&created.id, PostUpdate::scheduled_at(b)),
        );

        let ra = ra.unwrap();
        let rb = rb.unwrap();
        let stored = db.get_post(&created.id).await.unwrap();
        assert!(stored.scheduled_at == ra.scheduled_at || stored.scheduled_at == rb.scheduled_at);
        assert!(stored.scheduled_at == a || stored.scheduled_at == b);
    }
}
