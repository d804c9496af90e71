//! Durable storage contract used by the booking coordinator.
//!
//! The daemon only needs three things from storage: read a show, read a
//! user, and run a closure atomically. Everything a booking writes (seat
//! statuses, balances, the ticket) goes through one [`Storage::run_transaction`]
//! call, so either all of it lands or none of it does.
//!
//! # Isolation
//!
//! Implementations must not let one transaction observe another's
//! uncommitted writes. [`MemoryStore`] gets this by holding a single lock
//! for the whole transaction.

mod fixture;
mod memory;

pub use fixture::{Fixture, FixtureError, ShowFixture};
pub use memory::{MemoryStore, Snapshot};

use async_trait::async_trait;
use thiserror::Error;

use seat_core::{DomainError, Money, SeatCode, Show, ShowId, Ticket, UserAccount, UserId};

/// Result of a successful booking transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingReceipt {
    pub ticket: Ticket,
    /// Buyer's balance after the transaction
    pub new_balance: Money,
}

/// Work executed inside a transaction.
///
/// Returning `Err` aborts the transaction and discards every write made
/// through the [`Transaction`] view.
pub type TransactionFn =
    Box<dyn FnOnce(&mut dyn Transaction) -> Result<BookingReceipt, TxAbort> + Send>;

/// Transactional view over storage.
///
/// Reads see the transaction's own writes. Nothing is visible outside the
/// transaction until it commits.
pub trait Transaction {
    fn show(&self, id: &ShowId) -> Option<&Show>;

    fn show_mut(&mut self, id: &ShowId) -> Option<&mut Show>;

    fn user(&self, id: &UserId) -> Option<&UserAccount>;

    /// Adds `delta` to a user's balance and returns the new balance.
    fn adjust_balance(&mut self, id: &UserId, delta: Money) -> Result<Money, TxAbort>;

    fn insert_ticket(&mut self, ticket: Ticket);
}

/// Reasons a transaction closure gives up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TxAbort {
    #[error("show {0} not found")]
    UnknownShow(ShowId),

    #[error("user {0} not found")]
    UnknownUser(UserId),

    /// Seat was booked by someone else after validation
    #[error("seat {0} was booked concurrently")]
    SeatTaken(SeatCode),

    /// Buyer balance would go negative
    #[error("balance of {0} would go negative")]
    InsufficientBalance(UserId),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// Errors returned by storage operations.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("show not found: {0}")]
    ShowNotFound(ShowId),

    #[error("user not found: {0}")]
    UserNotFound(UserId),

    /// The transaction closure aborted; no write was applied
    #[error("transaction aborted: {0}")]
    Aborted(#[from] TxAbort),

    /// Writing the durable copy failed; no write was applied
    #[error("failed to persist snapshot: {0}")]
    Persist(String),

    /// Backend-specific failure (connection lost, conflict, ...)
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Durable storage backend.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    async fn read_show(&self, id: &ShowId) -> Result<Show, StorageError>;

    async fn read_user(&self, id: &UserId) -> Result<UserAccount, StorageError>;

    /// Runs `work` atomically: all of its writes are applied, or none.
    async fn run_transaction(&self, work: TransactionFn) -> Result<BookingReceipt, StorageError>;
}
