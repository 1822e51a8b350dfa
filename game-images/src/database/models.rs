//! Database models
//!
//! Rust structs representing stored images, owner entities, and the
//! requests that mutate them.

use crate::config::{image_url, IMAGE_MIME_PREFIX};
use crate::error::{AppError, Result};
use crate::storage::digest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A stored image payload.
///
/// `content_hash` is the deduplication key and never leaves the crate's
/// storage layer; it is deliberately not serialized.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Blob {
    pub id: String,
    #[serde(skip)]
    pub content_hash: String,
    pub mime_type: String,
    #[serde(skip)]
    pub data: Vec<u8>,
    pub reference_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Image metadata without the payload
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BlobMetadata {
    pub id: String,
    pub mime_type: String,
    pub size: i64,
    pub reference_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A validated image payload ready to be stored.
///
/// The digest is computed once here and reused for every lookup and store
/// the payload goes through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    data: Vec<u8>,
    mime_type: String,
    content_hash: String,
}

impl ImageUpload {
    /// Validate a caller-supplied payload.
    ///
    /// Rejects empty data, payloads over `max_bytes`, and MIME types that
    /// are empty or not `image/*`.
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>, max_bytes: usize) -> Result<Self> {
        let mime_type = mime_type.into().trim().to_string();

        if data.is_empty() {
            return Err(AppError::Validation("Image payload is empty".to_string()));
        }

        if data.len() > max_bytes {
            return Err(AppError::Validation(format!(
                "Image is {} bytes, limit is {} bytes",
                data.len(),
                max_bytes
            )));
        }

        if mime_type.len() <= IMAGE_MIME_PREFIX.len()
            || !mime_type.to_ascii_lowercase().starts_with(IMAGE_MIME_PREFIX)
        {
            return Err(AppError::Validation(format!(
                "Unsupported image type: {:?}",
                mime_type
            )));
        }

        let content_hash = digest(&data);
        Ok(Self {
            data,
            mime_type,
            content_hash,
        })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }
}

/// Requested change to one image slot of an owner entity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ImageChange {
    /// Field omitted: keep the current pointer
    #[default]
    Unchanged,
    /// Clear the slot
    Remove,
    /// Store new bytes and point the slot at them
    Replace(ImageUpload),
}

/// A scheduled game carrying optional thumbnail and banner images
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Game {
    pub id: String,
    pub title: String,
    pub thumbnail_id: Option<String>,
    pub banner_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Game {
    pub fn thumbnail_url(&self, base_url: &str) -> Option<String> {
        self.thumbnail_id.as_deref().map(|id| image_url(base_url, id))
    }

    pub fn banner_url(&self, base_url: &str) -> Option<String> {
        self.banner_id.as_deref().map(|id| image_url(base_url, id))
    }

    /// Every image pointer this game currently holds
    pub fn image_ids(&self) -> impl Iterator<Item = &str> {
        self.thumbnail_id
            .as_deref()
            .into_iter()
            .chain(self.banner_id.as_deref())
    }
}

/// Create game request
#[derive(Debug, Clone)]
pub struct CreateGameRequest {
    pub title: String,
    pub thumbnail: Option<ImageUpload>,
    pub banner: Option<ImageUpload>,
}

/// Update game request
#[derive(Debug, Clone, Default)]
pub struct UpdateGameRequest {
    pub title: Option<String>,
    pub thumbnail: ImageChange,
    pub banner: ImageChange,
}
