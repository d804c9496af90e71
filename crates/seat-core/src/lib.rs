//! seatlock core - shared domain types for seat reservation
//!
//! This crate provides the domain types shared between the daemon
//! (`seatd`) and the wire protocol (`seat-protocol`): identifiers, money,
//! seat maps, shows, tickets and revenue-split policies.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod ids;
pub mod money;
pub mod payout;
pub mod seat;
pub mod show;
pub mod ticket;

// Re-exports for convenience
pub use error::{DomainError, DomainResult};
pub use ids::{row_label, ConnectionId, SeatCode, ShowId, TicketId, UserId};
pub use money::Money;
pub use payout::{BalanceSheet, Payout, PayoutPolicy, RevenueSplit};
pub use seat::{Seat, SeatLayout, SeatStatus, SeatType};
pub use show::{PriceTable, Seating, Show};
pub use ticket::{Ticket, TicketSeats, TicketStatus, UserAccount};
