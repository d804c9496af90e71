//! Show actor commands, replies and errors.
//!
//! Request/response commands carry a oneshot `respond_to`; `Expire` and
//! `Disconnect` are fire-and-forget.

use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::Duration;

use seat_core::{ConnectionId, Money, SeatCode, ShowId};

use super::booking::CommitError;
use super::holds::{HoldError, HoldKey, Holder};
use super::room::Outbox;
use crate::storage::{BookingReceipt, StorageError};

// ============================================================================
// Show Commands
// ============================================================================

#[derive(Debug)]
pub enum ShowCommand {
    /// Add a watcher. The actor pushes the `joined` snapshot into `outbox`
    /// itself, so it is queued ahead of any later event.
    Join {
        connection: ConnectionId,
        outbox: Outbox,
        respond_to: oneshot::Sender<Result<(), ShowError>>,
    },

    /// Remove a watcher. Holds are kept.
    Leave {
        connection: ConnectionId,
        respond_to: oneshot::Sender<bool>,
    },

    Select {
        holder: Holder,
        seat: SeatCode,
        respond_to: oneshot::Sender<Result<HeldSeat, ShowError>>,
    },

    Unselect {
        holder: Holder,
        seat: SeatCode,
        respond_to: oneshot::Sender<Result<(), ShowError>>,
    },

    Commit {
        holder: Holder,
        seats: Vec<SeatCode>,
        amount: Money,
        respond_to: oneshot::Sender<Result<BookingReceipt, ShowError>>,
    },

    BookGeneral {
        holder: Holder,
        quantity: u32,
        amount: Money,
        respond_to: oneshot::Sender<Result<BookingReceipt, ShowError>>,
    },

    /// Sent by a hold's timer task when its deadline passes.
    Expire { key: HoldKey },

    /// The connection is gone: leave the room and drop all of its holds.
    Disconnect { connection: ConnectionId },

    Snapshot {
        respond_to: oneshot::Sender<ShowSnapshot>,
    },
}

/// Reply to a successful select.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeldSeat {
    pub seat: SeatCode,
    /// Time left until the hold expires
    pub expires_in: Duration,
}

/// Point-in-time view of a show's soft and durable state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShowSnapshot {
    pub show_id: ShowId,
    pub held_seats: Vec<SeatCode>,
    pub booked_seats: Vec<SeatCode>,
    pub watchers: usize,
}

// ============================================================================
// Show Errors
// ============================================================================

#[derive(Debug, Clone, Error)]
pub enum ShowError {
    #[error(transparent)]
    Hold(#[from] HoldError),

    #[error(transparent)]
    Commit(#[from] CommitError),

    #[error("show not found: {0}")]
    UnknownShow(ShowId),

    #[error("join show {0} first")]
    NotJoined(ShowId),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The show actor has shut down
    #[error("show channel closed")]
    ChannelClosed,
}

impl ShowError {
    /// Stable error code sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Hold(err) => err.code(),
            Self::Commit(err) if err.is_retryable() => "transaction_failed",
            Self::Commit(_) => "commit_rejected",
            Self::UnknownShow(_) => "unknown_show",
            Self::NotJoined(_) => "not_joined",
            Self::Storage(_) => "storage_error",
            Self::ChannelClosed => "unavailable",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = ShowError::from(HoldError::AlreadyHeld(SeatCode::from("B5")));
        assert_eq!(err.code(), "already_held");
        assert_eq!(err.to_string(), "seat B5 is held by another buyer");

        let err = ShowError::from(CommitError::TransactionFailed("disk full".into()));
        assert_eq!(err.code(), "transaction_failed");

        assert_eq!(ShowError::NotJoined(ShowId::new("S1")).code(), "not_joined");
        assert_eq!(ShowError::ChannelClosed.to_string(), "show channel closed");
    }

    #[tokio::test]
    async fn test_dropped_responder_is_observable() {
        let (tx, rx) = oneshot::channel::<Result<HeldSeat, ShowError>>();
        drop(tx);
        assert!(rx.await.is_err());
    }
}
