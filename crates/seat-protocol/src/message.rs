//! Protocol message types for daemon communication.
//!
//! Messages are newline-delimited JSON objects with a `type` tag. Every
//! client message also carries the sender's `protocol_version`.

use crate::version::ProtocolVersion;
use seat_core::{ConnectionId, Money, SeatCode, ShowId, Ticket, UserId};
use serde::{Deserialize, Serialize};

/// Message types that can be sent by clients to the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageType {
    /// Handshake. `user_id` becomes the holder identity for every later
    /// request on this connection.
    Connect {
        user_id: UserId,
        /// Client-chosen connection id (optional)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_id: Option<String>,
    },

    /// Start watching a show's seat map
    Join { show_id: ShowId },

    /// Stop watching a show. Holds are kept until they expire or are released.
    Leave { show_id: ShowId },

    /// Request a hold on one seat
    Select { show_id: ShowId, seat: SeatCode },

    /// Release a hold
    Unselect { show_id: ShowId, seat: SeatCode },

    /// Convert held seats into a ticket
    Commit {
        show_id: ShowId,
        seats: Vec<SeatCode>,
        /// Total the client expects to pay
        amount: Money,
    },

    /// Book places on a general-admission show
    BookGeneral {
        show_id: ShowId,
        quantity: u32,
        amount: Money,
    },

    /// Ping to check connection
    Ping { seq: u64 },

    /// Client disconnecting gracefully
    Disconnect,
}

/// Messages sent from client to daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMessage {
    pub protocol_version: ProtocolVersion,

    #[serde(flatten)]
    pub message: MessageType,
}

impl ClientMessage {
    /// Creates a new client message with current protocol version.
    pub fn new(message: MessageType) -> Self {
        Self {
            protocol_version: ProtocolVersion::CURRENT,
            message,
        }
    }

    pub fn connect(user_id: impl Into<UserId>, client_id: Option<String>) -> Self {
        Self::new(MessageType::Connect {
            user_id: user_id.into(),
            client_id,
        })
    }

    pub fn join(show_id: impl Into<ShowId>) -> Self {
        Self::new(MessageType::Join {
            show_id: show_id.into(),
        })
    }

    pub fn leave(show_id: impl Into<ShowId>) -> Self {
        Self::new(MessageType::Leave {
            show_id: show_id.into(),
        })
    }

    pub fn select(show_id: impl Into<ShowId>, seat: impl Into<SeatCode>) -> Self {
        Self::new(MessageType::Select {
            show_id: show_id.into(),
            seat: seat.into(),
        })
    }

    pub fn unselect(show_id: impl Into<ShowId>, seat: impl Into<SeatCode>) -> Self {
        Self::new(MessageType::Unselect {
            show_id: show_id.into(),
            seat: seat.into(),
        })
    }

    pub fn commit(show_id: impl Into<ShowId>, seats: Vec<SeatCode>, amount: Money) -> Self {
        Self::new(MessageType::Commit {
            show_id: show_id.into(),
            seats,
            amount,
        })
    }

    pub fn book_general(show_id: impl Into<ShowId>, quantity: u32, amount: Money) -> Self {
        Self::new(MessageType::BookGeneral {
            show_id: show_id.into(),
            quantity,
            amount,
        })
    }

    pub fn ping(seq: u64) -> Self {
        Self::new(MessageType::Ping { seq })
    }

    pub fn disconnect() -> Self {
        Self::new(MessageType::Disconnect)
    }
}

/// Messages sent from daemon to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection accepted
    Connected {
        protocol_version: ProtocolVersion,
        client_id: ConnectionId,
    },

    /// Connection rejected (version mismatch, capacity, etc.)
    Rejected {
        reason: String,
        protocol_version: ProtocolVersion,
    },

    /// Snapshot sent after a join. Holder identities are never exposed.
    Joined {
        show_id: ShowId,
        held_seats: Vec<SeatCode>,
        booked_seats: Vec<SeatCode>,
    },

    /// Acknowledges a leave
    Left { show_id: ShowId },

    /// Your select succeeded
    Held {
        show_id: ShowId,
        seat: SeatCode,
        expires_in_ms: u64,
    },

    /// Your unselect succeeded
    Released { show_id: ShowId, seat: SeatCode },

    /// Someone else now holds this seat
    Locked { show_id: ShowId, seat: SeatCode },

    /// The seat is free again
    Unlocked { show_id: ShowId, seat: SeatCode },

    /// The seat has been sold
    Booked { show_id: ShowId, seat: SeatCode },

    /// Your hold on this seat timed out
    HoldExpired { show_id: ShowId, seat: SeatCode },

    /// Your commit went through
    CommitSuccess {
        show_id: ShowId,
        ticket: Box<Ticket>,
        new_balance: Money,
    },

    /// Your commit was refused; nothing changed
    CommitError {
        show_id: ShowId,
        reasons: Vec<String>,
        /// True when the identical request may simply be retried
        retryable: bool,
    },

    /// Pong response to ping
    Pong { seq: u64 },

    /// Request-level error
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

impl ServerMessage {
    pub fn connected(client_id: ConnectionId) -> Self {
        Self::Connected {
            protocol_version: ProtocolVersion::CURRENT,
            client_id,
        }
    }

    pub fn rejected(reason: &str) -> Self {
        Self::Rejected {
            reason: reason.to_string(),
            protocol_version: ProtocolVersion::CURRENT,
        }
    }

    pub fn locked(show_id: ShowId, seat: SeatCode) -> Self {
        Self::Locked { show_id, seat }
    }

    pub fn unlocked(show_id: ShowId, seat: SeatCode) -> Self {
        Self::Unlocked { show_id, seat }
    }

    pub fn booked(show_id: ShowId, seat: SeatCode) -> Self {
        Self::Booked { show_id, seat }
    }

    pub fn hold_expired(show_id: ShowId, seat: SeatCode) -> Self {
        Self::HoldExpired { show_id, seat }
    }

    pub fn pong(seq: u64) -> Self {
        Self::Pong { seq }
    }

    pub fn error(message: &str) -> Self {
        Self::Error {
            message: message.to_string(),
            code: None,
        }
    }

    pub fn error_with_code(message: &str, code: &str) -> Self {
        Self::Error {
            message: message.to_string(),
            code: Some(code.to_string()),
        }
    }

    /// The show this message concerns, if any.
    pub fn show_id(&self) -> Option<&ShowId> {
        match self {
            Self::Joined { show_id, .. }
            | Self::Left { show_id }
            | Self::Held { show_id, .. }
            | Self::Released { show_id, .. }
            | Self::Locked { show_id, .. }
            | Self::Unlocked { show_id, .. }
            | Self::Booked { show_id, .. }
            | Self::HoldExpired { show_id, .. }
            | Self::CommitSuccess { show_id, .. }
            | Self::CommitError { show_id, .. } => Some(show_id),
            Self::Connected { .. }
            | Self::Rejected { .. }
            | Self::Pong { .. }
            | Self::Error { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_serialization() {
        let msg = ClientMessage::select("S1", "A1");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "select");
        assert_eq!(json["show_id"], "S1");
        assert_eq!(json["seat"], "A1");
        assert_eq!(json["protocol_version"]["major"], 1);
    }

    #[test]
    fn test_commit_parses_amount_in_rupees() {
        let raw = r#"{"protocol_version":{"major":1,"minor":0},"type":"commit","show_id":"S1","seats":["A1","A2"],"amount":400}"#;
        let parsed: ClientMessage = serde_json::from_str(raw).unwrap();
        match parsed.message {
            MessageType::Commit { seats, amount, .. } => {
                assert_eq!(seats.len(), 2);
                assert_eq!(amount, Money::rupees(400));
            }
            other => panic!("Expected Commit, got {other:?}"),
        }
    }

    #[test]
    fn test_server_message_tags() {
        let msg = ServerMessage::hold_expired(ShowId::new("S1"), SeatCode::from("C3"));
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"hold_expired\""));

        let msg = ServerMessage::error_with_code("seat is held", "already_held");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["code"], "already_held");
    }

    #[test]
    fn test_show_id_accessor() {
        let msg = ServerMessage::booked(ShowId::new("S1"), SeatCode::from("A1"));
        assert_eq!(msg.show_id().map(ShowId::as_str), Some("S1"));
        assert!(ServerMessage::pong(1).show_id().is_none());
    }
}
