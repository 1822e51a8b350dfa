//! Games service
//!
//! Owner-side business logic for games carrying a thumbnail and a banner.
//! Each mutation is one transaction covering the game row and every image
//! store/release it causes.

use crate::config::image_url;
use crate::database::{CreateGameRequest, Game, ImageUpload, Repository, UpdateGameRequest};
use crate::error::{AppError, Result};
use crate::services::ImageBinder;

/// Service for managing games and their images
#[derive(Clone)]
pub struct GamesService {
    repo: Repository,
    images: ImageBinder,
    max_image_bytes: usize,
    public_base_url: String,
}

impl GamesService {
    pub fn new(
        repo: Repository,
        images: ImageBinder,
        max_image_bytes: usize,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            repo,
            images,
            max_image_bytes,
            public_base_url: public_base_url.into(),
        }
    }

    /// Validate raw bytes against the configured image size limit
    pub fn upload(&self, data: Vec<u8>, mime_type: &str) -> Result<ImageUpload> {
        ImageUpload::new(data, mime_type, self.max_image_bytes)
    }

    /// Public URL of the game's thumbnail
    pub fn thumbnail_url(&self, game: &Game) -> Option<String> {
        game.thumbnail_url(&self.public_base_url)
    }

    /// Public URL of the game's banner
    pub fn banner_url(&self, game: &Game) -> Option<String> {
        game.banner_url(&self.public_base_url)
    }

    /// Public URL of any image this service stored
    pub fn image_url(&self, image_id: &str) -> String {
        image_url(&self.public_base_url, image_id)
    }

    /// Create a game, storing any supplied images
    pub async fn create_game(&self, req: CreateGameRequest) -> Result<Game> {
        tracing::info!("Creating game: {}", req.title);

        let mut tx = self.repo.pool().begin().await?;

        let thumbnail_id = self.images.on_create(&mut tx, req.thumbnail.as_ref()).await?;
        let banner_id = self.images.on_create(&mut tx, req.banner.as_ref()).await?;

        let game = self
            .repo
            .insert_game(
                &mut tx,
                &req.title,
                thumbnail_id.as_deref(),
                banner_id.as_deref(),
            )
            .await?;

        tx.commit().await?;

        tracing::info!("Game created successfully: {}", game.id);
        Ok(game)
    }

    /// Get a game by ID
    pub async fn get_game(&self, id: &str) -> Result<Game> {
        self.repo
            .get_game(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("game {}", id)))
    }

    /// List all games
    pub async fn list_games(&self) -> Result<Vec<Game>> {
        self.repo.list_games().await
    }

    /// Update a game's title and image slots
    pub async fn update_game(&self, id: &str, req: UpdateGameRequest) -> Result<Game> {
        tracing::debug!("Updating game: {}", id);

        let mut tx = self.repo.pool().begin().await?;

        let current = self
            .repo
            .lock_game(&mut tx, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("game {}", id)))?;

        let thumbnail_id = self
            .images
            .on_update(&mut tx, current.thumbnail_id.as_deref(), &req.thumbnail)
            .await?;
        let banner_id = self
            .images
            .on_update(&mut tx, current.banner_id.as_deref(), &req.banner)
            .await?;

        let title = req.title.as_deref().unwrap_or(current.title.as_str());

        let game = self
            .repo
            .update_game(
                &mut tx,
                id,
                title,
                thumbnail_id.as_deref(),
                banner_id.as_deref(),
            )
            .await?;

        tx.commit().await?;

        tracing::debug!("Game updated successfully: {}", game.id);
        Ok(game)
    }

    /// Delete a game and release its images
    pub async fn delete_game(&self, id: &str) -> Result<()> {
        tracing::info!("Deleting game: {}", id);

        let mut tx = self.repo.pool().begin().await?;

        let game = self
            .repo
            .delete_game(&mut tx, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("game {}", id)))?;

        self.images.on_delete(&mut tx, game.image_ids()).await?;

        tx.commit().await?;

        tracing::info!("Game deleted successfully: {}", id);
        Ok(())
    }
}
