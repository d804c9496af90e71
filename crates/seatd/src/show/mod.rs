//! Per-show state using the actor pattern.
//!
//! Each show gets its own actor task. Different shows never block each other;
//! everything touching one show is serialized through its actor.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  ShowCommand   ┌──────────────┐  ServerMessage  ┌──────────────┐
//! │  Connection  │───────────────▶│  ShowActor   │────────────────▶│ Room outboxes│
//! │   handlers   │  (mpsc)        │              │  (per client)   │              │
//! └──────────────┘                └──────┬───────┘                 └──────────────┘
//!                                        │  ▲
//!                  HoldRegistry ◀────────┤  │ Expire { key }
//!                                        │  │
//!                   BookingCoordinator ──┘  └── hold timer tasks
//!                          │
//!                          ▼
//!                       Storage
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Duration;

use seat_core::Show;

mod actor;
pub mod booking;
mod commands;
mod handle;
pub mod holds;
mod room;

pub use actor::ShowActor;
pub use booking::{BookingCoordinator, CommitError, CommitRejection};
pub use commands::{HeldSeat, ShowCommand, ShowError, ShowSnapshot};
pub use handle::ShowHandle;
pub use holds::{HoldError, HoldRegistry, Holder, DEFAULT_HOLD_DURATION, DEFAULT_MAX_HOLDS_PER_HOLDER};
pub use room::{Outbox, Room, OUTBOX_CAPACITY};

use crate::storage::Storage;

/// Command buffer size of each show actor.
const COMMAND_BUFFER: usize = 100;

/// Tunables shared by every show actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShowSettings {
    pub hold_duration: Duration,
    pub max_holds_per_holder: usize,
}

impl Default for ShowSettings {
    fn default() -> Self {
        Self {
            hold_duration: DEFAULT_HOLD_DURATION,
            max_holds_per_holder: DEFAULT_MAX_HOLDS_PER_HOLDER,
        }
    }
}

/// Spawns the actor for `show` and returns a handle to it.
///
/// The actor stops when every handle has been dropped.
pub fn spawn_show(show: Show, storage: Arc<dyn Storage>, settings: ShowSettings) -> ShowHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let handle = ShowHandle::new(show.id.clone(), cmd_tx.clone());

    let actor = ShowActor::new(
        show,
        cmd_rx,
        cmd_tx.downgrade(),
        BookingCoordinator::new(storage),
        settings,
    );
    tokio::spawn(actor.run());

    handle
}
