//! Client interface for one show actor.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `ShowError::ChannelClosed`

use tokio::sync::{mpsc, oneshot};

use seat_core::{ConnectionId, Money, SeatCode, ShowId};

use super::commands::{HeldSeat, ShowCommand, ShowError, ShowSnapshot};
use super::holds::Holder;
use super::room::Outbox;
use crate::storage::BookingReceipt;

/// Cheap-to-clone handle for sending commands to a show actor.
#[derive(Debug, Clone)]
pub struct ShowHandle {
    show_id: ShowId,
    sender: mpsc::Sender<ShowCommand>,
}

impl ShowHandle {
    pub fn new(show_id: ShowId, sender: mpsc::Sender<ShowCommand>) -> Self {
        Self { show_id, sender }
    }

    pub fn show_id(&self) -> &ShowId {
        &self.show_id
    }

    /// Starts watching the show.
    ///
    /// The `joined` snapshot is delivered through `outbox`.
    pub async fn join(&self, connection: ConnectionId, outbox: Outbox) -> Result<(), ShowError> {
        let (tx, rx) = oneshot::channel();
        self.send(ShowCommand::Join {
            connection,
            outbox,
            respond_to: tx,
        })
        .await?;
        rx.await.map_err(|_| ShowError::ChannelClosed)?
    }

    /// Stops watching. Returns whether the connection was watching.
    pub async fn leave(&self, connection: ConnectionId) -> Result<bool, ShowError> {
        let (tx, rx) = oneshot::channel();
        self.send(ShowCommand::Leave {
            connection,
            respond_to: tx,
        })
        .await?;
        rx.await.map_err(|_| ShowError::ChannelClosed)
    }

    /// Places a hold on one seat.
    ///
    /// # Errors
    ///
    /// - `ShowError::NotJoined` if the connection has not joined the show
    /// - `ShowError::Hold` for admission failures (`AlreadyHeld`, ...)
    /// - `ShowError::ChannelClosed` if the actor has shut down
    pub async fn select(&self, holder: Holder, seat: SeatCode) -> Result<HeldSeat, ShowError> {
        let (tx, rx) = oneshot::channel();
        self.send(ShowCommand::Select {
            holder,
            seat,
            respond_to: tx,
        })
        .await?;
        rx.await.map_err(|_| ShowError::ChannelClosed)?
    }

    pub async fn unselect(&self, holder: Holder, seat: SeatCode) -> Result<(), ShowError> {
        let (tx, rx) = oneshot::channel();
        self.send(ShowCommand::Unselect {
            holder,
            seat,
            respond_to: tx,
        })
        .await?;
        rx.await.map_err(|_| ShowError::ChannelClosed)?
    }

    /// Books held seats.
    ///
    /// # Errors
    ///
    /// - `ShowError::Commit` with `CommitError::Rejected` when validation
    ///   fails, or `CommitError::TransactionFailed` when storage fails
    /// - `ShowError::ChannelClosed` if the actor has shut down
    pub async fn commit(
        &self,
        holder: Holder,
        seats: Vec<SeatCode>,
        amount: Money,
    ) -> Result<BookingReceipt, ShowError> {
        let (tx, rx) = oneshot::channel();
        self.send(ShowCommand::Commit {
            holder,
            seats,
            amount,
            respond_to: tx,
        })
        .await?;
        rx.await.map_err(|_| ShowError::ChannelClosed)?
    }

    /// Books places on a general-admission show.
    pub async fn book_general(
        &self,
        holder: Holder,
        quantity: u32,
        amount: Money,
    ) -> Result<BookingReceipt, ShowError> {
        let (tx, rx) = oneshot::channel();
        self.send(ShowCommand::BookGeneral {
            holder,
            quantity,
            amount,
            respond_to: tx,
        })
        .await?;
        rx.await.map_err(|_| ShowError::ChannelClosed)?
    }

    /// Releases everything `connection` owns in this show.
    ///
    /// Fire-and-forget: errors are ignored (the actor may be shutting down).
    pub async fn disconnect(&self, connection: ConnectionId) {
        let _ = self.sender.send(ShowCommand::Disconnect { connection }).await;
    }

    /// Returns `None` if the actor has shut down.
    pub async fn snapshot(&self) -> Option<ShowSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ShowCommand::Snapshot { respond_to: tx })
            .await
            .ok()?;
        rx.await.ok()
    }

    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }

    async fn send(&self, cmd: ShowCommand) -> Result<(), ShowError> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| ShowError::ChannelClosed)
    }
}
