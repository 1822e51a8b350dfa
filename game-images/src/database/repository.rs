//! Repository layer for owner rows
//!
//! Read operations go through the pool. Mutations take a connection so
//! they join the caller's transaction alongside the matching image
//! mutations.

use super::models::*;
use crate::error::Result;
use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

/// Repository for game rows
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a new game row
    pub async fn insert_game(
        &self,
        conn: &mut SqliteConnection,
        title: &str,
        thumbnail_id: Option<&str>,
        banner_id: Option<&str>,
    ) -> Result<Game> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let game = sqlx::query_as::<_, Game>(
            r#"
            INSERT INTO games (id, title, thumbnail_id, banner_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(title)
        .bind(thumbnail_id)
        .bind(banner_id)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;

        tracing::debug!("Inserted game: {}", id);
        Ok(game)
    }

    /// Lock a game row for the rest of the caller's transaction.
    ///
    /// A no-op write takes SQLite's write lock before the current image
    /// pointers are read, so a concurrent update cannot act on the same
    /// pointers.
    pub async fn lock_game(&self, conn: &mut SqliteConnection, id: &str) -> Result<Option<Game>> {
        let game = sqlx::query_as::<_, Game>(
            "UPDATE games SET updated_at = updated_at WHERE id = ? RETURNING *",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(game)
    }

    /// Overwrite the mutable columns of a game row
    pub async fn update_game(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
        title: &str,
        thumbnail_id: Option<&str>,
        banner_id: Option<&str>,
    ) -> Result<Game> {
        let game = sqlx::query_as::<_, Game>(
            r#"
            UPDATE games
            SET title = ?, thumbnail_id = ?, banner_id = ?, updated_at = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(title)
        .bind(thumbnail_id)
        .bind(banner_id)
        .bind(Utc::now())
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;

        tracing::debug!("Updated game: {}", id);
        Ok(game)
    }

    /// Delete a game row, returning it so its image pointers can be released
    pub async fn delete_game(&self, conn: &mut SqliteConnection, id: &str) -> Result<Option<Game>> {
        let game = sqlx::query_as::<_, Game>("DELETE FROM games WHERE id = ? RETURNING *")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        if game.is_some() {
            tracing::debug!("Deleted game: {}", id);
        }
        Ok(game)
    }

    /// Get a game by ID
    pub async fn get_game(&self, id: &str) -> Result<Option<Game>> {
        let game = sqlx::query_as::<_, Game>("SELECT * FROM games WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(game)
    }

    /// List all games, most recently updated first
    pub async fn list_games(&self) -> Result<Vec<Game>> {
        let games = sqlx::query_as::<_, Game>("SELECT * FROM games ORDER BY updated_at DESC")
            .fetch_all(&self.pool)
            .await?;

        Ok(games)
    }
}
