//! Show directory - lazily spawned show actors.
//!
//! A show actor is started the first time a client touches the show, after
//! storage confirms the show exists. Afterwards every request for that show
//! goes to the same actor.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use seat_core::ShowId;

use crate::show::{spawn_show, ShowError, ShowHandle, ShowSettings};
use crate::storage::{Storage, StorageError};

pub struct ShowDirectory {
    storage: Arc<dyn Storage>,
    settings: ShowSettings,
    shows: RwLock<HashMap<ShowId, ShowHandle>>,
}

impl ShowDirectory {
    pub fn new(storage: Arc<dyn Storage>, settings: ShowSettings) -> Self {
        Self {
            storage,
            settings,
            shows: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the handle for `show_id`, starting its actor if needed.
    ///
    /// # Errors
    ///
    /// - `ShowError::UnknownShow` if storage has no such show
    /// - `ShowError::Storage` if storage could not be read
    pub async fn get(&self, show_id: &ShowId) -> Result<ShowHandle, ShowError> {
        if let Some(handle) = self.existing(show_id).await {
            return Ok(handle);
        }

        let show = self
            .storage
            .read_show(show_id)
            .await
            .map_err(|e| match e {
                StorageError::ShowNotFound(id) => ShowError::UnknownShow(id),
                other => ShowError::Storage(other),
            })?;

        let mut shows = self.shows.write().await;
        // Another connection may have started it while we were reading
        let handle = shows
            .entry(show_id.clone())
            .or_insert_with(|| {
                info!(show_id = %show_id, "Starting show actor");
                spawn_show(show, Arc::clone(&self.storage), self.settings)
            })
            .clone();
        Ok(handle)
    }

    /// Returns the handle only if the actor is already running.
    pub async fn existing(&self, show_id: &ShowId) -> Option<ShowHandle> {
        self.shows.read().await.get(show_id).cloned()
    }

    /// Number of running show actors.
    pub async fn len(&self) -> usize {
        self.shows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.shows.read().await.is_empty()
    }
}
