//! Booking coordinator - turns held seats into a paid ticket.
//!
//! A commit is checked in stages before storage is touched:
//!
//! 1. the claimed amount is positive and matches the seat prices
//! 2. every seat exists
//! 3. every seat is still available in storage
//! 4. every seat is held by the buyer and the hold has not run out
//! 5. the buyer can afford the amount
//!
//! Stage 1 is reported on its own. Stages 2-4 report the first failure of
//! each seat, all seats at once. Stage 5 runs only on a clean request.
//! The transaction itself re-checks seat availability and the buyer's
//! balance, so a booking made behind the hold layer is still caught.

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use seat_core::{
    BalanceSheet, DomainError, Money, SeatCode, Show, ShowId, Ticket, TicketSeats, UserAccount,
    UserId,
};

use super::holds::HoldRegistry;
use crate::storage::{BookingReceipt, Storage, StorageError, Transaction, TxAbort};

// ============================================================================
// Errors
// ============================================================================

/// One reason a commit was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommitRejection {
    #[error("Invalid amount {claimed}{}", expected_suffix(.expected))]
    InvalidAmount {
        claimed: Money,
        expected: Option<Money>,
    },

    #[error("No seats requested")]
    NoSeats,

    #[error("Seat {0} requested more than once")]
    DuplicateSeat(SeatCode),

    #[error("Seat {0} not found")]
    SeatNotFound(SeatCode),

    #[error("Seat {0} is already booked")]
    SeatAlreadyBooked(SeatCode),

    #[error("Seat {0} cannot be sold")]
    SeatNotSellable(SeatCode),

    #[error("Seat {0} is not held by you")]
    SeatNotHeld(SeatCode),

    #[error("Insufficient balance for {required}")]
    InsufficientBalance { required: Money },

    #[error("Unknown user {0}")]
    UnknownUser(UserId),

    #[error("Show has no seat map")]
    NotSeatMapped,

    #[error("Show is seat-mapped, select seats instead")]
    SeatMapped,

    #[error("Sold out: {remaining} places left, {requested} requested")]
    SoldOut { requested: u32, remaining: u32 },
}

/// Why a commit did not produce a ticket. Nothing was changed in either case.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommitError {
    #[error("commit rejected: {}", reasons_joined(.0))]
    Rejected(Vec<CommitRejection>),

    /// Storage failed; the identical request may be retried
    #[error("transaction failed: {0}")]
    TransactionFailed(String),
}

fn expected_suffix(expected: &Option<Money>) -> String {
    expected
        .map(|e| format!(", expected {e}"))
        .unwrap_or_default()
}

fn reasons_joined(rejections: &[CommitRejection]) -> String {
    rejections
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl CommitError {
    fn reject(rejection: CommitRejection) -> Self {
        Self::Rejected(vec![rejection])
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransactionFailed(_))
    }

    /// Human-readable reasons for the client.
    pub fn reasons(&self) -> Vec<String> {
        match self {
            Self::Rejected(rejections) => rejections.iter().map(ToString::to_string).collect(),
            Self::TransactionFailed(_) => vec!["Booking could not be completed, please retry".to_string()],
        }
    }

    pub fn rejections(&self) -> &[CommitRejection] {
        match self {
            Self::Rejected(rejections) => rejections,
            Self::TransactionFailed(_) => &[],
        }
    }

    fn from_storage(err: StorageError, buyer: &UserId, amount: Money) -> Self {
        match err {
            StorageError::Aborted(TxAbort::SeatTaken(code))
            | StorageError::Aborted(TxAbort::Domain(DomainError::SeatAlreadyBooked { code })) => {
                Self::reject(CommitRejection::SeatAlreadyBooked(code))
            }
            StorageError::Aborted(TxAbort::InsufficientBalance(user)) if &user == buyer => {
                Self::reject(CommitRejection::InsufficientBalance { required: amount })
            }
            StorageError::Aborted(TxAbort::Domain(DomainError::CapacityExceeded {
                requested,
                remaining,
            })) => Self::reject(CommitRejection::SoldOut {
                requested,
                remaining,
            }),
            StorageError::Aborted(TxAbort::UnknownUser(user))
            | StorageError::UserNotFound(user) => Self::reject(CommitRejection::UnknownUser(user)),
            other => Self::TransactionFailed(other.to_string()),
        }
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Runs stages 1-5 against a freshly read show and buyer.
pub fn validate_commit(
    show: &Show,
    holds: &HoldRegistry,
    buyer: &UserAccount,
    seats: &[SeatCode],
    amount: Money,
    now: Instant,
) -> Result<(), CommitError> {
    if seats.is_empty() {
        return Err(CommitError::reject(CommitRejection::NoSeats));
    }
    let mut seen = HashSet::with_capacity(seats.len());
    for seat in seats {
        if !seen.insert(seat) {
            return Err(CommitError::reject(CommitRejection::DuplicateSeat(
                seat.clone(),
            )));
        }
    }
    let layout = show
        .layout()
        .ok_or_else(|| CommitError::reject(CommitRejection::NotSeatMapped))?;

    // Stage 1. Without a price for every seat only positivity is checked.
    let expected: Option<Money> = seats.iter().map(|s| show.price_of_seat(s)).sum();
    let amount_ok = amount.is_positive() && expected.map_or(true, |e| e == amount);
    if !amount_ok {
        return Err(CommitError::reject(CommitRejection::InvalidAmount {
            claimed: amount,
            expected,
        }));
    }

    // Stages 2-4, first failure per seat
    let rejections: Vec<CommitRejection> = seats
        .iter()
        .filter_map(|code| {
            let Some(seat) = layout.find(code) else {
                return Some(CommitRejection::SeatNotFound(code.clone()));
            };
            if seat.is_booked() {
                return Some(CommitRejection::SeatAlreadyBooked(code.clone()));
            }
            if !seat.seat_type.is_sellable() {
                return Some(CommitRejection::SeatNotSellable(code.clone()));
            }
            match holds.holder_of(code) {
                Some(hold) if hold.holder.user == buyer.id && hold.is_fresh(now) => None,
                _ => Some(CommitRejection::SeatNotHeld(code.clone())),
            }
        })
        .collect();
    if !rejections.is_empty() {
        return Err(CommitError::Rejected(rejections));
    }

    // Stage 5
    if !buyer.can_afford(amount) {
        return Err(CommitError::reject(CommitRejection::InsufficientBalance {
            required: amount,
        }));
    }

    Ok(())
}

/// Checks a general-admission booking request.
pub fn validate_general(
    show: &Show,
    buyer: &UserAccount,
    quantity: u32,
    amount: Money,
) -> Result<(), CommitError> {
    let remaining = show
        .remaining_capacity()
        .ok_or_else(|| CommitError::reject(CommitRejection::SeatMapped))?;
    if quantity == 0 {
        return Err(CommitError::reject(CommitRejection::NoSeats));
    }

    let expected = show.prices.regular.times(quantity);
    if !amount.is_positive() || amount != expected {
        return Err(CommitError::reject(CommitRejection::InvalidAmount {
            claimed: amount,
            expected: Some(expected),
        }));
    }
    if quantity > remaining {
        return Err(CommitError::reject(CommitRejection::SoldOut {
            requested: quantity,
            remaining,
        }));
    }
    if !buyer.can_afford(amount) {
        return Err(CommitError::reject(CommitRejection::InsufficientBalance {
            required: amount,
        }));
    }
    Ok(())
}

// ============================================================================
// Transactions
// ============================================================================

/// Moves `amount` from the buyer to the show's vendors and records the ticket.
///
/// Shared by seat-mapped and general-admission bookings.
fn settle(
    tx: &mut dyn Transaction,
    show_id: &ShowId,
    buyer: &UserId,
    seats: TicketSeats,
    amount: Money,
) -> Result<BookingReceipt, TxAbort> {
    let split = tx
        .show(show_id)
        .map(|show| show.revenue_split.clone())
        .ok_or_else(|| TxAbort::UnknownShow(show_id.clone()))?;
    if tx.user(buyer).is_none() {
        return Err(TxAbort::UnknownUser(buyer.clone()));
    }

    let sheet = BalanceSheet::for_booking(buyer, amount, &split);
    for (user, delta) in sheet.iter() {
        tx.adjust_balance(user, *delta)?;
    }
    let new_balance = tx
        .user(buyer)
        .map(|account| account.balance)
        .ok_or_else(|| TxAbort::UnknownUser(buyer.clone()))?;

    let ticket = Ticket::issue(show_id.clone(), buyer.clone(), seats, amount);
    tx.insert_ticket(ticket.clone());
    Ok(BookingReceipt {
        ticket,
        new_balance,
    })
}

fn book_seats(
    tx: &mut dyn Transaction,
    show_id: &ShowId,
    buyer: &UserId,
    seats: Vec<SeatCode>,
    amount: Money,
) -> Result<BookingReceipt, TxAbort> {
    let show = tx
        .show_mut(show_id)
        .ok_or_else(|| TxAbort::UnknownShow(show_id.clone()))?;
    let layout = show.layout_mut()?;
    for code in &seats {
        layout.mark_booked(code).map_err(|err| match err {
            DomainError::SeatAlreadyBooked { code } => TxAbort::SeatTaken(code),
            other => TxAbort::Domain(other),
        })?;
    }
    settle(tx, show_id, buyer, TicketSeats::Codes(seats), amount)
}

fn book_places(
    tx: &mut dyn Transaction,
    show_id: &ShowId,
    buyer: &UserId,
    quantity: u32,
    amount: Money,
) -> Result<BookingReceipt, TxAbort> {
    tx.show_mut(show_id)
        .ok_or_else(|| TxAbort::UnknownShow(show_id.clone()))?
        .sell_places(quantity)?;
    settle(tx, show_id, buyer, TicketSeats::Count(quantity), amount)
}

// ============================================================================
// Coordinator
// ============================================================================

/// Runs validation and the durable transaction for one show.
#[derive(Clone)]
pub struct BookingCoordinator {
    storage: Arc<dyn Storage>,
}

impl BookingCoordinator {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Commits held seats.
    ///
    /// `show` is the caller's cached copy of the show; it is replaced with
    /// the freshly read version and, on success, updated with the new
    /// bookings. The hold registry is not modified.
    pub async fn commit(
        &self,
        show: &mut Show,
        holds: &HoldRegistry,
        buyer: &UserId,
        seats: Vec<SeatCode>,
        amount: Money,
    ) -> Result<BookingReceipt, CommitError> {
        let show_id = show.id.clone();
        let (fresh, account) = self.read(&show_id, buyer, amount).await?;
        *show = fresh;

        if let Err(err) = validate_commit(show, holds, &account, &seats, amount, Instant::now()) {
            debug!(show_id = %show_id, buyer = %buyer, error = %err, "Commit rejected");
            return Err(err);
        }

        let tx_show = show_id.clone();
        let tx_buyer = buyer.clone();
        let tx_seats = seats.clone();
        let result = self
            .storage
            .run_transaction(Box::new(move |tx: &mut dyn Transaction| {
                book_seats(tx, &tx_show, &tx_buyer, tx_seats, amount)
            }))
            .await;

        match result {
            Ok(receipt) => {
                if let Ok(layout) = show.layout_mut() {
                    for code in &seats {
                        let _ = layout.mark_booked(code);
                    }
                }
                info!(
                    show_id = %show_id,
                    buyer = %buyer,
                    ticket = %receipt.ticket.id,
                    seats = seats.len(),
                    amount = %amount,
                    "Seats booked"
                );
                Ok(receipt)
            }
            Err(err) => Err(self.transaction_error(&show_id, buyer, amount, err)),
        }
    }

    /// Books `quantity` places on a general-admission show.
    pub async fn book_general(
        &self,
        show: &mut Show,
        buyer: &UserId,
        quantity: u32,
        amount: Money,
    ) -> Result<BookingReceipt, CommitError> {
        let show_id = show.id.clone();
        let (fresh, account) = self.read(&show_id, buyer, amount).await?;
        *show = fresh;

        validate_general(show, &account, quantity, amount)?;

        let tx_show = show_id.clone();
        let tx_buyer = buyer.clone();
        let result = self
            .storage
            .run_transaction(Box::new(move |tx: &mut dyn Transaction| {
                book_places(tx, &tx_show, &tx_buyer, quantity, amount)
            }))
            .await;

        match result {
            Ok(receipt) => {
                let _ = show.sell_places(quantity);
                info!(
                    show_id = %show_id,
                    buyer = %buyer,
                    ticket = %receipt.ticket.id,
                    quantity,
                    amount = %amount,
                    "Places booked"
                );
                Ok(receipt)
            }
            Err(err) => Err(self.transaction_error(&show_id, buyer, amount, err)),
        }
    }

    async fn read(
        &self,
        show_id: &ShowId,
        buyer: &UserId,
        amount: Money,
    ) -> Result<(Show, UserAccount), CommitError> {
        let show = self
            .storage
            .read_show(show_id)
            .await
            .map_err(|e| CommitError::from_storage(e, buyer, amount))?;
        let account = self
            .storage
            .read_user(buyer)
            .await
            .map_err(|e| CommitError::from_storage(e, buyer, amount))?;
        Ok((show, account))
    }

    fn transaction_error(
        &self,
        show_id: &ShowId,
        buyer: &UserId,
        amount: Money,
        err: StorageError,
    ) -> CommitError {
        let mapped = CommitError::from_storage(err, buyer, amount);
        match &mapped {
            CommitError::TransactionFailed(reason) => {
                warn!(show_id = %show_id, buyer = %buyer, reason = %reason, "Booking transaction failed");
            }
            CommitError::Rejected(_) => {
                warn!(show_id = %show_id, buyer = %buyer, error = %mapped, "Booking aborted inside transaction");
            }
        }
        mapped
    }
}
