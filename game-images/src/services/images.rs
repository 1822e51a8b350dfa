//! Image lifecycle binding
//!
//! Keeps an owner's image pointers in lock-step with blob reference counts.
//! Every call runs on the owner's open transaction and never commits;
//! the owner service commits or rolls back the whole unit of work.
//!
//! Each `store` handed out here must be balanced by exactly one `release`
//! when the pointer it produced is cleared, replaced, or its owner deleted.

use crate::database::{ImageChange, ImageUpload};
use crate::error::Result;
use crate::storage::BlobStore;
use sqlx::SqliteConnection;

/// Translates owner create/update/delete into blob store calls
#[derive(Clone)]
pub struct ImageBinder {
    blob_store: BlobStore,
}

impl ImageBinder {
    pub fn new(blob_store: BlobStore) -> Self {
        Self { blob_store }
    }

    /// Resolve the pointer for a slot of a newly created owner
    pub async fn on_create(
        &self,
        conn: &mut SqliteConnection,
        upload: Option<&ImageUpload>,
    ) -> Result<Option<String>> {
        match upload {
            Some(upload) => {
                let id = self.store(conn, upload).await?;
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }

    /// Resolve the new pointer for a slot of an updated owner.
    ///
    /// `current` is the pointer the owner holds now. The returned value is
    /// what the owner row must hold after the update.
    pub async fn on_update(
        &self,
        conn: &mut SqliteConnection,
        current: Option<&str>,
        change: &ImageChange,
    ) -> Result<Option<String>> {
        match change {
            ImageChange::Unchanged => Ok(current.map(str::to_string)),
            ImageChange::Remove => {
                self.blob_store.release(conn, current).await?;
                Ok(None)
            }
            ImageChange::Replace(upload) => {
                // Release followed by store of the same content nets to zero.
                // Skipping both keeps the row and its id instead of deleting
                // and re-creating it when this was the last reference.
                if let Some(id) = current {
                    if self
                        .blob_store
                        .has_content(conn, id, upload.content_hash(), upload.mime_type())
                        .await?
                    {
                        tracing::debug!("Replacement matches current image: {}", id);
                        return Ok(Some(id.to_string()));
                    }
                }

                self.blob_store.release(conn, current).await?;
                let id = self.store(conn, upload).await?;
                Ok(Some(id))
            }
        }
    }

    async fn store(&self, conn: &mut SqliteConnection, upload: &ImageUpload) -> Result<String> {
        self.blob_store
            .store_hashed(conn, upload.data(), upload.content_hash(), upload.mime_type())
            .await
    }

    /// Release every pointer held by a deleted owner
    pub async fn on_delete<'a, I>(&self, conn: &mut SqliteConnection, pointers: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        for id in pointers {
            self.blob_store.release(conn, Some(id)).await?;
        }
        Ok(())
    }
}
