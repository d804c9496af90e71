//! Domain-specific error types following panic-free policy.

use crate::SeatCode;
use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Seat code is not part of the layout
    #[error("Seat {code} not found")]
    SeatNotFound { code: SeatCode },

    /// Seat was already booked
    #[error("Seat {code} is already booked")]
    SeatAlreadyBooked { code: SeatCode },

    /// Seat is disabled and can never be sold
    #[error("Seat {code} is not sellable")]
    SeatNotSellable { code: SeatCode },

    /// Operation requires a seat-mapped show
    #[error("Show has no seat map")]
    NotSeatMapped,

    /// General-admission capacity would be exceeded
    #[error("Only {remaining} seats remaining, {requested} requested")]
    CapacityExceeded { requested: u32, remaining: u32 },

    /// Invalid field value
    #[error("Invalid {field}: {value} (expected {expected})")]
    InvalidFieldValue {
        field: String,
        value: String,
        expected: String,
    },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
