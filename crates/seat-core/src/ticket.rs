//! Durable booking records and user accounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Money, SeatCode, ShowId, TicketId, UserId};

/// Lifecycle of a ticket. Only `Active` is produced by this crate; the other
/// states belong to the cancellation flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    #[default]
    Active,
    Cancelled,
    Expired,
}

/// What a ticket grants: specific seats or a number of places.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketSeats {
    Codes(Vec<SeatCode>),
    Count(u32),
}

impl TicketSeats {
    pub fn count(&self) -> usize {
        match self {
            Self::Codes(codes) => codes.len(),
            Self::Count(n) => *n as usize,
        }
    }
}

/// Durable record of a completed booking. Amount and seats never change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub show_id: ShowId,
    pub buyer: UserId,
    pub seats: TicketSeats,
    pub amount: Money,
    #[serde(default)]
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
}

impl Ticket {
    /// Creates a new active ticket with a fresh id.
    pub fn issue(show_id: ShowId, buyer: UserId, seats: TicketSeats, amount: Money) -> Self {
        Self {
            id: TicketId::generate(),
            show_id,
            buyer,
            seats,
            amount,
            status: TicketStatus::Active,
            created_at: Utc::now(),
        }
    }
}

/// A user record as far as booking is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub balance: Money,
}

impl UserAccount {
    pub fn new(id: UserId, balance: Money) -> Self {
        Self {
            id,
            name: None,
            balance,
        }
    }

    pub fn can_afford(&self, amount: Money) -> bool {
        self.balance >= amount
    }
}
