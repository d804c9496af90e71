//! Session registry - what each connection owns.
//!
//! Tracks the authenticated user of every live connection and the shows it
//! has joined, so a dropped connection can release its holds everywhere.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use seat_core::{ConnectionId, ShowId, UserId};

use crate::directory::ShowDirectory;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("connection id {0} is already in use")]
    DuplicateConnection(ConnectionId),

    #[error("connection {0} has not completed the handshake")]
    UnknownConnection(ConnectionId),
}

#[derive(Debug)]
struct Session {
    user: UserId,
    /// Shows joined at any point; kept after `leave` because holds survive it
    shows: HashSet<ShowId>,
}

pub struct SessionRegistry {
    directory: Arc<ShowDirectory>,
    sessions: Mutex<HashMap<ConnectionId, Session>>,
}

impl SessionRegistry {
    pub fn new(directory: Arc<ShowDirectory>) -> Self {
        Self {
            directory,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub async fn register(&self, connection: ConnectionId, user: UserId) -> Result<(), SessionError> {
        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(&connection) {
            return Err(SessionError::DuplicateConnection(connection));
        }
        debug!(connection = %connection, user = %user, "Session registered");
        sessions.insert(
            connection,
            Session {
                user,
                shows: HashSet::new(),
            },
        );
        Ok(())
    }

    pub async fn user_of(&self, connection: &ConnectionId) -> Option<UserId> {
        self.sessions
            .lock()
            .await
            .get(connection)
            .map(|s| s.user.clone())
    }

    /// Records that `connection` joined `show_id`.
    pub async fn record_join(
        &self,
        connection: &ConnectionId,
        show_id: ShowId,
    ) -> Result<(), SessionError> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .get_mut(connection)
            .ok_or_else(|| SessionError::UnknownConnection(connection.clone()))?;
        session.shows.insert(show_id);
        Ok(())
    }

    /// Shows `connection` has joined, sorted.
    pub async fn shows_of(&self, connection: &ConnectionId) -> Vec<ShowId> {
        let sessions = self.sessions.lock().await;
        let mut shows: Vec<ShowId> = sessions
            .get(connection)
            .map(|s| s.shows.iter().cloned().collect())
            .unwrap_or_default();
        shows.sort();
        shows
    }

    /// Forgets `connection` and releases its holds in every joined show.
    ///
    /// Returns the number of shows notified.
    pub async fn disconnect(&self, connection: &ConnectionId) -> usize {
        let Some(session) = self.sessions.lock().await.remove(connection) else {
            return 0;
        };

        let mut notified = 0;
        for show_id in &session.shows {
            if let Some(handle) = self.directory.existing(show_id).await {
                handle.disconnect(connection.clone()).await;
                notified += 1;
            }
        }
        debug!(
            connection = %connection,
            user = %session.user,
            shows = notified,
            "Session closed"
        );
        notified
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}
