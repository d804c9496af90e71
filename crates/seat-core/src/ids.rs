//! Type-safe identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Identifier of one sellable show (a date/time/venue instance of an event).
    ShowId
);

string_id!(
    /// Identifier of a user account (buyers and vendors alike).
    UserId
);

string_id!(
    /// Identifier of one client connection.
    ///
    /// Assigned by the server at handshake ("conn-<n>") unless the client
    /// supplies its own.
    ConnectionId
);

/// Seat code: row letters followed by a 1-based column number, e.g. "A1", "J10".
///
/// Rows past `Z` continue spreadsheet-style (`AA`, `AB`, ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeatCode(String);

impl SeatCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Builds the code for a zero-based grid position.
    pub fn at(row: usize, col: usize) -> Self {
        Self(format!("{}{}", row_label(row), col + 1))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Spreadsheet-style row label for a zero-based row index.
pub fn row_label(row: usize) -> String {
    let mut n = row + 1;
    let mut label = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        label.push(char::from(b'A' + rem as u8));
        n = (n - 1) / 26;
    }
    label.iter().rev().collect()
}

impl fmt::Display for SeatCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SeatCode {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SeatCode {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier of a durable ticket record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(Uuid);

impl TicketId {
    /// Generates a fresh random ticket id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
