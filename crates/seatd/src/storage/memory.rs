//! In-process storage with optional JSON snapshot durability.
//!
//! All state sits behind one async mutex. A transaction runs against a
//! copy-on-write staging area; its writes are applied to the live state only
//! after the closure succeeds, and are rolled back again if the snapshot file
//! cannot be written.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use seat_core::{Money, Show, ShowId, Ticket, UserAccount, UserId};

use super::{BookingReceipt, Storage, StorageError, Transaction, TransactionFn, TxAbort};

/// Serialized form of the whole store.
///
/// Used for the on-disk snapshot file and for seeding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub shows: Vec<Show>,
    #[serde(default)]
    pub users: Vec<UserAccount>,
    #[serde(default)]
    pub tickets: Vec<Ticket>,
}

#[derive(Debug, Default)]
struct StoreState {
    shows: HashMap<ShowId, Show>,
    users: HashMap<UserId, UserAccount>,
    tickets: Vec<Ticket>,
}

impl StoreState {
    fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            shows: snapshot
                .shows
                .into_iter()
                .map(|s| (s.id.clone(), s))
                .collect(),
            users: snapshot
                .users
                .into_iter()
                .map(|u| (u.id.clone(), u))
                .collect(),
            tickets: snapshot.tickets,
        }
    }

    fn to_snapshot(&self) -> Snapshot {
        let mut shows: Vec<Show> = self.shows.values().cloned().collect();
        shows.sort_by(|a, b| a.id.cmp(&b.id));
        let mut users: Vec<UserAccount> = self.users.values().cloned().collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));
        Snapshot {
            shows,
            users,
            tickets: self.tickets.clone(),
        }
    }

    /// Applies staged writes and returns what is needed to undo them.
    fn apply(&mut self, writes: Writes) -> Undo {
        let mut undo = Undo {
            shows: Vec::with_capacity(writes.shows.len()),
            users: Vec::with_capacity(writes.users.len()),
            ticket_count: self.tickets.len(),
        };
        for (id, show) in writes.shows {
            let previous = self.shows.insert(id.clone(), show);
            undo.shows.push((id, previous));
        }
        for (id, user) in writes.users {
            let previous = self.users.insert(id.clone(), user);
            undo.users.push((id, previous));
        }
        self.tickets.extend(writes.tickets);
        undo
    }

    fn revert(&mut self, undo: Undo) {
        for (id, previous) in undo.shows {
            match previous {
                Some(show) => {
                    self.shows.insert(id, show);
                }
                None => {
                    self.shows.remove(&id);
                }
            }
        }
        for (id, previous) in undo.users {
            match previous {
                Some(user) => {
                    self.users.insert(id, user);
                }
                None => {
                    self.users.remove(&id);
                }
            }
        }
        self.tickets.truncate(undo.ticket_count);
    }
}

#[derive(Default)]
struct Writes {
    shows: HashMap<ShowId, Show>,
    users: HashMap<UserId, UserAccount>,
    tickets: Vec<Ticket>,
}

struct Undo {
    shows: Vec<(ShowId, Option<Show>)>,
    users: Vec<(UserId, Option<UserAccount>)>,
    ticket_count: usize,
}

/// Copy-on-write view handed to transaction closures.
struct Staged<'a> {
    base: &'a StoreState,
    writes: Writes,
}

impl<'a> Staged<'a> {
    fn new(base: &'a StoreState) -> Self {
        Self {
            base,
            writes: Writes::default(),
        }
    }

    fn into_writes(self) -> Writes {
        self.writes
    }
}

impl Transaction for Staged<'_> {
    fn show(&self, id: &ShowId) -> Option<&Show> {
        self.writes
            .shows
            .get(id)
            .or_else(|| self.base.shows.get(id))
    }

    fn show_mut(&mut self, id: &ShowId) -> Option<&mut Show> {
        if !self.writes.shows.contains_key(id) {
            let show = self.base.shows.get(id)?.clone();
            self.writes.shows.insert(id.clone(), show);
        }
        self.writes.shows.get_mut(id)
    }

    fn user(&self, id: &UserId) -> Option<&UserAccount> {
        self.writes
            .users
            .get(id)
            .or_else(|| self.base.users.get(id))
    }

    fn adjust_balance(&mut self, id: &UserId, delta: Money) -> Result<Money, TxAbort> {
        if !self.writes.users.contains_key(id) {
            let user = self
                .base
                .users
                .get(id)
                .cloned()
                .ok_or_else(|| TxAbort::UnknownUser(id.clone()))?;
            self.writes.users.insert(id.clone(), user);
        }
        let user = self
            .writes
            .users
            .get_mut(id)
            .ok_or_else(|| TxAbort::UnknownUser(id.clone()))?;

        let new_balance = user.balance + delta;
        if new_balance.is_negative() {
            return Err(TxAbort::InsufficientBalance(id.clone()));
        }
        user.balance = new_balance;
        Ok(new_balance)
    }

    fn insert_ticket(&mut self, ticket: Ticket) {
        self.writes.tickets.push(ticket);
    }
}

/// In-memory [`Storage`] implementation.
pub struct MemoryStore {
    state: Mutex<StoreState>,
    /// When set, every committed transaction is also written here
    snapshot_path: Option<PathBuf>,
}

impl MemoryStore {
    /// Creates an empty, non-durable store.
    pub fn new() -> Self {
        Self::from_snapshot(Snapshot::default())
    }

    /// Creates a non-durable store pre-filled with `snapshot`.
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            state: Mutex::new(StoreState::from_snapshot(snapshot)),
            snapshot_path: None,
        }
    }

    /// Opens a durable store backed by a JSON snapshot file.
    ///
    /// Loads the file if it exists; otherwise starts empty and creates the
    /// file on the first commit.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let snapshot = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| StorageError::Unavailable(format!("{}: {e}", path.display())))?;
            serde_json::from_str(&raw)
                .map_err(|e| StorageError::Unavailable(format!("{}: {e}", path.display())))?
        } else {
            Snapshot::default()
        };

        info!(
            path = %path.display(),
            shows = snapshot.shows.len(),
            users = snapshot.users.len(),
            tickets = snapshot.tickets.len(),
            "Opened snapshot store"
        );

        Ok(Self {
            state: Mutex::new(StoreState::from_snapshot(snapshot)),
            snapshot_path: Some(path),
        })
    }

    /// Inserts or replaces a show.
    pub async fn insert_show(&self, show: Show) {
        self.state.lock().await.shows.insert(show.id.clone(), show);
    }

    /// Inserts or replaces a user account.
    pub async fn insert_user(&self, user: UserAccount) {
        self.state.lock().await.users.insert(user.id.clone(), user);
    }

    /// Loads `snapshot` into the store if it holds no shows and no users yet.
    ///
    /// Returns `true` if the seed was applied.
    pub async fn seed_if_empty(&self, snapshot: Snapshot) -> Result<bool, StorageError> {
        let mut state = self.state.lock().await;
        if !state.shows.is_empty() || !state.users.is_empty() {
            debug!("Store already populated, skipping seed");
            return Ok(false);
        }
        *state = StoreState::from_snapshot(snapshot);
        if let Some(path) = &self.snapshot_path {
            write_snapshot(path, &state.to_snapshot())?;
        }
        Ok(true)
    }

    pub async fn tickets(&self) -> Vec<Ticket> {
        self.state.lock().await.tickets.clone()
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.state.lock().await.to_snapshot()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn read_show(&self, id: &ShowId) -> Result<Show, StorageError> {
        self.state
            .lock()
            .await
            .shows
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::ShowNotFound(id.clone()))
    }

    async fn read_user(&self, id: &UserId) -> Result<UserAccount, StorageError> {
        self.state
            .lock()
            .await
            .users
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::UserNotFound(id.clone()))
    }

    async fn run_transaction(&self, work: TransactionFn) -> Result<BookingReceipt, StorageError> {
        let mut state = self.state.lock().await;

        let (receipt, writes) = {
            let mut staged = Staged::new(&state);
            let receipt = work(&mut staged)?;
            (receipt, staged.into_writes())
        };

        let undo = state.apply(writes);

        if let Some(path) = &self.snapshot_path {
            if let Err(e) = write_snapshot(path, &state.to_snapshot()) {
                warn!(error = %e, "Snapshot write failed, rolling back transaction");
                state.revert(undo);
                return Err(e);
            }
        }

        debug!(ticket = %receipt.ticket.id, "Transaction committed");
        Ok(receipt)
    }
}

/// Writes the snapshot via a temp file and rename so readers never see a
/// half-written file.
fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<(), StorageError> {
    let json =
        serde_json::to_vec_pretty(snapshot).map_err(|e| StorageError::Persist(e.to_string()))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Persist(e.to_string()))?;
        }
    }

    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, json).map_err(|e| StorageError::Persist(e.to_string()))?;
    std::fs::rename(&tmp, path).map_err(|e| StorageError::Persist(e.to_string()))?;
    Ok(())
}
