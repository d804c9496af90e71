//! Fan-out of show events to the connections watching it.
//!
//! Every member has a bounded outbound queue that its connection's writer
//! drains. Sends never wait: a member whose queue is full or closed is
//! dropped from the room so one slow client cannot stall the show.
//!
//! A connection that leaves, or is evicted for a full queue, may still own
//! holds in the show. Its queue is parked so directed messages such as
//! `hold_expired` still reach it; the actor prunes parked queues once the
//! connection holds nothing.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use seat_core::{ConnectionId, ShowId};
use seat_protocol::ServerMessage;

/// Outbound queue of one connection.
pub type Outbox = mpsc::Sender<ServerMessage>;

/// Capacity of each connection's outbound queue.
pub const OUTBOX_CAPACITY: usize = 256;

/// Watchers of one show.
#[derive(Debug)]
pub struct Room {
    show_id: ShowId,
    members: HashMap<ConnectionId, Outbox>,
    /// Former members that may still receive directed messages
    parked: HashMap<ConnectionId, Outbox>,
}

impl Room {
    pub fn new(show_id: ShowId) -> Self {
        Self {
            show_id,
            members: HashMap::new(),
            parked: HashMap::new(),
        }
    }

    /// Adds (or re-adds) a watcher.
    pub fn join(&mut self, connection: ConnectionId, outbox: Outbox) {
        self.parked.remove(&connection);
        self.members.insert(connection, outbox);
    }

    /// Stops broadcasting to `connection`; its queue is parked for
    /// directed messages.
    pub fn leave(&mut self, connection: &ConnectionId) -> bool {
        match self.members.remove(connection) {
            Some(outbox) => {
                self.parked.insert(connection.clone(), outbox);
                true
            }
            None => false,
        }
    }

    /// Drops every trace of `connection`.
    pub fn forget(&mut self, connection: &ConnectionId) {
        self.members.remove(connection);
        self.parked.remove(connection);
    }

    /// Keeps only the parked queues for which `keep` returns true.
    pub fn retain_parked(&mut self, mut keep: impl FnMut(&ConnectionId) -> bool) {
        self.parked.retain(|connection, _| keep(connection));
    }

    pub fn parked_len(&self) -> usize {
        self.parked.len()
    }

    pub fn contains(&self, connection: &ConnectionId) -> bool {
        self.members.contains_key(connection)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Sends `message` to every member except `except`.
    pub fn broadcast(&mut self, message: &ServerMessage, except: Option<&ConnectionId>) {
        let mut evicted = Vec::new();
        for (connection, outbox) in &self.members {
            if Some(connection) == except {
                continue;
            }
            if let Err(reason) = outbox.try_send(message.clone()) {
                evicted.push((connection.clone(), reason));
            }
        }
        for (connection, reason) in evicted {
            self.evict(&connection, reason);
        }
    }

    /// Sends `message` to one member or parked connection.
    ///
    /// Returns false if the connection is unknown or the send failed.
    pub fn send_to(&mut self, connection: &ConnectionId, message: ServerMessage) -> bool {
        if let Some(outbox) = self.members.get(connection) {
            return match outbox.try_send(message) {
                Ok(()) => true,
                Err(reason) => {
                    self.evict(connection, reason);
                    false
                }
            };
        }

        let Some(outbox) = self.parked.get(connection) else {
            debug!(
                show_id = %self.show_id,
                connection = %connection,
                "Directed message for unknown connection dropped"
            );
            return false;
        };
        match outbox.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    show_id = %self.show_id,
                    connection = %connection,
                    "Directed message dropped, outbox full"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.parked.remove(connection);
                false
            }
        }
    }

    fn evict(
        &mut self,
        connection: &ConnectionId,
        reason: mpsc::error::TrySendError<ServerMessage>,
    ) {
        let Some(outbox) = self.members.remove(connection) else {
            return;
        };
        let reason = match reason {
            mpsc::error::TrySendError::Full(_) => {
                // Still alive, may yet drain
                self.parked.insert(connection.clone(), outbox);
                "outbox full"
            }
            mpsc::error::TrySendError::Closed(_) => "connection closed",
        };
        warn!(
            show_id = %self.show_id,
            connection = %connection,
            reason,
            "Evicted watcher"
        );
    }
}
