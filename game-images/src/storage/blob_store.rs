//! Content-addressed, reference-counted image storage
//!
//! Images live in the `images` table, deduplicated on
//! `(content_hash, mime_type)`. Identical bytes declared under two MIME
//! types are two rows, since the declared type is what gets served.
//!
//! `store` and `release` are the only mutating operations. Both run on a
//! connection supplied by the caller, normally `&mut *tx` of the owner's
//! transaction, so an image mutation commits or rolls back together with
//! the owner row that points at it. Neither opens or commits a transaction.
//!
//! Each mutation is a single statement against one row. SQLite holds the
//! database write lock from that statement until the caller commits, so
//! concurrent `store` calls for the same content serialize and both
//! increments land.

use super::hash::digest;
use crate::database::{Blob, BlobMetadata};
use crate::error::Result;
use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

/// Reference-counted blob store backed by SQLite
#[derive(Clone)]
pub struct BlobStore {
    pool: SqlitePool,
}

impl BlobStore {
    /// Create a blob store reading through `pool`
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Store `data` under `mime_type` and return the image id.
    ///
    /// If a row with the same digest and MIME type exists its reference
    /// count is incremented and its id returned; otherwise a new row is
    /// inserted with a count of 1. Payload validation is the caller's job.
    pub async fn store(
        &self,
        conn: &mut SqliteConnection,
        data: &[u8],
        mime_type: &str,
    ) -> Result<String> {
        self.store_hashed(conn, data, &digest(data), mime_type).await
    }

    /// `store` for a payload whose digest the caller already holds.
    ///
    /// `content_hash` must be `digest(data)`.
    pub async fn store_hashed(
        &self,
        conn: &mut SqliteConnection,
        data: &[u8],
        content_hash: &str,
        mime_type: &str,
    ) -> Result<String> {
        let candidate_id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let id: String = sqlx::query_scalar(
            r#"
            INSERT INTO images (id, content_hash, mime_type, data, reference_count, created_at, updated_at)
            VALUES (?, ?, ?, ?, 1, ?, ?)
            ON CONFLICT (content_hash, mime_type) DO UPDATE SET
                reference_count = images.reference_count + 1,
                updated_at = excluded.updated_at
            RETURNING id
            "#,
        )
        .bind(&candidate_id)
        .bind(content_hash)
        .bind(mime_type)
        .bind(data)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;

        if id == candidate_id {
            tracing::debug!("Stored new image: {} ({} bytes, {})", id, data.len(), mime_type);
        } else {
            tracing::debug!("Deduplicated image: {} ({})", id, mime_type);
        }

        Ok(id)
    }

    /// Drop one reference to the image `id`.
    ///
    /// `None` and unknown ids are no-ops, so release is idempotent on
    /// compensating paths. The stored count is clamped at zero and a row
    /// reaching zero is deleted by the same caller transaction.
    pub async fn release(&self, conn: &mut SqliteConnection, id: Option<&str>) -> Result<()> {
        let Some(id) = id else {
            return Ok(());
        };

        let remaining: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE images
            SET reference_count = MAX(reference_count - 1, 0), updated_at = ?
            WHERE id = ?
            RETURNING reference_count
            "#,
        )
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        match remaining {
            None => {
                tracing::debug!("Release of unknown image ignored: {}", id);
            }
            Some(count) if count <= 0 => {
                sqlx::query("DELETE FROM images WHERE id = ? AND reference_count <= 0")
                    .bind(id)
                    .execute(&mut *conn)
                    .await?;
                tracing::debug!("Deleted unreferenced image: {}", id);
            }
            Some(count) => {
                tracing::debug!("Released image: {} ({} references left)", id, count);
            }
        }

        Ok(())
    }

    /// Whether image `id` holds the content with digest `content_hash` under this MIME type
    pub async fn has_content(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
        content_hash: &str,
        mime_type: &str,
    ) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM images WHERE id = ? AND content_hash = ? AND mime_type = ?",
        )
        .bind(id)
        .bind(content_hash)
        .bind(mime_type)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(found.is_some())
    }

    /// Point lookup used by the public endpoint. Runs outside any transaction.
    pub async fn get(&self, id: &str) -> Result<Option<Blob>> {
        let blob = sqlx::query_as::<_, Blob>("SELECT * FROM images WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(blob)
    }

    /// Image metadata without loading the payload
    pub async fn metadata(&self, id: &str) -> Result<Option<BlobMetadata>> {
        let meta = sqlx::query_as::<_, BlobMetadata>(
            r#"
            SELECT id, mime_type, length(data) AS size, reference_count, created_at, updated_at
            FROM images WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::initialize_database;
    use sqlx::sqlite::SqlitePoolOptions;

    const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x01];

    async fn create_test_store() -> BlobStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        initialize_database(&pool).await.unwrap();

        BlobStore::new(pool)
    }

    async fn row_count(store: &BlobStore) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM images")
            .fetch_one(&store.pool)
            .await
            .unwrap()
    }

    async fn reference_count(store: &BlobStore, id: &str) -> Option<i64> {
        store.metadata(id).await.unwrap().map(|m| m.reference_count)
    }

    #[tokio::test]
    async fn test_store_and_get() {
        let store = create_test_store().await;

        let mut conn = store.pool.acquire().await.unwrap();
        let id = store.store(&mut conn, PNG, "image/png").await.unwrap();
        drop(conn);

        let blob = store.get(&id).await.unwrap().unwrap();
        assert_eq!(blob.data, PNG);
        assert_eq!(blob.mime_type, "image/png");
        assert_eq!(blob.reference_count, 1);
        assert_eq!(blob.content_hash, digest(PNG));
    }

    #[tokio::test]
    async fn test_store_deduplicates() {
        let store = create_test_store().await;

        let mut conn = store.pool.acquire().await.unwrap();
        let first = store.store(&mut conn, PNG, "image/png").await.unwrap();
        let second = store.store(&mut conn, PNG, "image/png").await.unwrap();
        drop(conn);

        assert_eq!(first, second);
        assert_eq!(row_count(&store).await, 1);
        assert_eq!(reference_count(&store, &first).await, Some(2));
    }

    #[tokio::test]
    async fn test_same_bytes_different_mime_are_distinct() {
        let store = create_test_store().await;

        let mut conn = store.pool.acquire().await.unwrap();
        let png = store.store(&mut conn, PNG, "image/png").await.unwrap();
        let jpeg = store.store(&mut conn, PNG, "image/jpeg").await.unwrap();
        store.store(&mut conn, PNG, "image/jpeg").await.unwrap();
        drop(conn);

        assert_ne!(png, jpeg);
        assert_eq!(row_count(&store).await, 2);
        assert_eq!(reference_count(&store, &png).await, Some(1));
        assert_eq!(reference_count(&store, &jpeg).await, Some(2));
        assert_eq!(store.get(&jpeg).await.unwrap().unwrap().mime_type, "image/jpeg");
    }

    #[tokio::test]
    async fn test_release_decrements_then_deletes() {
        let store = create_test_store().await;

        let mut conn = store.pool.acquire().await.unwrap();
        let id = store.store(&mut conn, PNG, "image/png").await.unwrap();
        store.store(&mut conn, PNG, "image/png").await.unwrap();
        store.store(&mut conn, PNG, "image/png").await.unwrap();

        store.release(&mut conn, Some(id.as_str())).await.unwrap();
        store.release(&mut conn, Some(id.as_str())).await.unwrap();
        drop(conn);
        assert_eq!(reference_count(&store, &id).await, Some(1));

        let mut conn = store.pool.acquire().await.unwrap();
        store.release(&mut conn, Some(id.as_str())).await.unwrap();
        drop(conn);
        assert!(store.get(&id).await.unwrap().is_none());
        assert_eq!(row_count(&store).await, 0);
    }

    #[tokio::test]
    async fn test_release_missing_and_none_are_noops() {
        let store = create_test_store().await;

        let mut conn = store.pool.acquire().await.unwrap();
        store.release(&mut conn, None).await.unwrap();
        store
            .release(&mut conn, Some("00000000-0000-0000-0000-000000000000"))
            .await
            .unwrap();

        let id = store.store(&mut conn, PNG, "image/png").await.unwrap();
        store.release(&mut conn, Some(id.as_str())).await.unwrap();
        // Second release of an already deleted row
        store.release(&mut conn, Some(id.as_str())).await.unwrap();
        drop(conn);

        assert_eq!(row_count(&store).await, 0);
    }

    #[tokio::test]
    async fn test_release_clamps_corrupted_count() {
        let store = create_test_store().await;

        let mut conn = store.pool.acquire().await.unwrap();
        let id = store.store(&mut conn, PNG, "image/png").await.unwrap();
        sqlx::query("UPDATE images SET reference_count = 0 WHERE id = ?")
            .bind(&id)
            .execute(&mut *conn)
            .await
            .unwrap();

        store.release(&mut conn, Some(id.as_str())).await.unwrap();
        drop(conn);

        assert!(store.get(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rollback_discards_store_and_release() {
        let store = create_test_store().await;

        let mut tx = store.pool.begin().await.unwrap();
        let kept = store.store(&mut tx, PNG, "image/png").await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.pool.begin().await.unwrap();
        let discarded = store.store(&mut tx, b"other", "image/gif").await.unwrap();
        store.release(&mut tx, Some(kept.as_str())).await.unwrap();
        tx.rollback().await.unwrap();

        assert!(store.get(&discarded).await.unwrap().is_none());
        assert_eq!(reference_count(&store, &kept).await, Some(1));
    }

    #[tokio::test]
    async fn test_has_content() {
        let store = create_test_store().await;

        let mut conn = store.pool.acquire().await.unwrap();
        let id = store.store(&mut conn, PNG, "image/png").await.unwrap();

        let png_hash = digest(PNG);
        assert!(store.has_content(&mut conn, &id, &png_hash, "image/png").await.unwrap());
        assert!(!store.has_content(&mut conn, &id, &png_hash, "image/jpeg").await.unwrap());
        assert!(!store
            .has_content(&mut conn, &id, &digest(b"other"), "image/png")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_store_hashed_deduplicates_with_store() {
        let store = create_test_store().await;

        let mut conn = store.pool.acquire().await.unwrap();
        let first = store.store(&mut conn, PNG, "image/png").await.unwrap();
        let second = store
            .store_hashed(&mut conn, PNG, &digest(PNG), "image/png")
            .await
            .unwrap();
        drop(conn);

        assert_eq!(first, second);
        assert_eq!(row_count(&store).await, 1);
        assert_eq!(reference_count(&store, &first).await, Some(2));
    }

    #[tokio::test]
    async fn test_metadata_hides_payload() {
        let store = create_test_store().await;

        let mut conn = store.pool.acquire().await.unwrap();
        let id = store.store(&mut conn, PNG, "image/png").await.unwrap();
        drop(conn);

        let meta = store.metadata(&id).await.unwrap().unwrap();
        assert_eq!(meta.size, PNG.len() as i64);
        assert_eq!(meta.mime_type, "image/png");
        assert!(store.metadata("missing").await.unwrap().is_none());
    }
}
