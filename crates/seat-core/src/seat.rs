//! Seats and the durable seat map of a show.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{DomainError, DomainResult, SeatCode};

/// Seat category. Drives pricing and whether the seat is sellable at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatType {
    #[default]
    Regular,
    Vip,
    /// A gap in the grid (aisle, removed seat). Never sellable.
    Disabled,
}

impl SeatType {
    pub fn is_sellable(&self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

impl fmt::Display for SeatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Regular => "regular",
            Self::Vip => "vip",
            Self::Disabled => "disabled",
        };
        write!(f, "{label}")
    }
}

/// Durable seat status.
///
/// "Held" and "selected" are soft states that live in the hold registry and
/// client views only; storage never sees them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatStatus {
    #[default]
    Available,
    Booked,
}

/// One cell of a show's seat grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    pub code: SeatCode,
    #[serde(rename = "type", default)]
    pub seat_type: SeatType,
    #[serde(default)]
    pub status: SeatStatus,
}

impl Seat {
    pub fn new(code: SeatCode, seat_type: SeatType) -> Self {
        Self {
            code,
            seat_type,
            status: SeatStatus::Available,
        }
    }

    pub fn is_booked(&self) -> bool {
        self.status == SeatStatus::Booked
    }
}

/// Two-dimensional seat grid, row-major.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeatLayout {
    rows: Vec<Vec<Seat>>,
}

impl SeatLayout {
    pub fn from_rows(rows: Vec<Vec<Seat>>) -> Self {
        Self { rows }
    }

    /// Builds a `rows × cols` grid where every seat has the same type.
    pub fn grid(rows: usize, cols: usize, seat_type: SeatType) -> Self {
        let rows = (0..rows)
            .map(|r| {
                (0..cols)
                    .map(|c| Seat::new(SeatCode::at(r, c), seat_type))
                    .collect()
            })
            .collect();
        Self { rows }
    }

    /// Changes the type of every seat in row `row` (zero-based).
    #[must_use]
    pub fn with_row_type(mut self, row: usize, seat_type: SeatType) -> Self {
        if let Some(cells) = self.rows.get_mut(row) {
            for seat in cells {
                seat.seat_type = seat_type;
            }
        }
        self
    }

    /// Changes the type of a single seat. Unknown codes are ignored.
    #[must_use]
    pub fn with_seat_type(mut self, code: &SeatCode, seat_type: SeatType) -> Self {
        if let Some(seat) = self.find_mut(code) {
            seat.seat_type = seat_type;
        }
        self
    }

    pub fn rows(&self) -> &[Vec<Seat>] {
        &self.rows
    }

    pub fn seats(&self) -> impl Iterator<Item = &Seat> {
        self.rows.iter().flatten()
    }

    pub fn find(&self, code: &SeatCode) -> Option<&Seat> {
        self.seats().find(|s| &s.code == code)
    }

    fn find_mut(&mut self, code: &SeatCode) -> Option<&mut Seat> {
        self.rows.iter_mut().flatten().find(|s| &s.code == code)
    }

    /// Number of sellable (non-disabled) seats.
    pub fn sellable_count(&self) -> usize {
        self.seats().filter(|s| s.seat_type.is_sellable()).count()
    }

    pub fn booked_codes(&self) -> Vec<SeatCode> {
        self.seats()
            .filter(|s| s.is_booked())
            .map(|s| s.code.clone())
            .collect()
    }

    /// Flips a seat from available to booked.
    ///
    /// The transition happens at most once: booking an already booked seat
    /// is an error, and there is no way back to available.
    pub fn mark_booked(&mut self, code: &SeatCode) -> DomainResult<()> {
        let seat = self.find_mut(code).ok_or_else(|| DomainError::SeatNotFound {
            code: code.clone(),
        })?;
        if seat.is_booked() {
            return Err(DomainError::SeatAlreadyBooked { code: code.clone() });
        }
        if !seat.seat_type.is_sellable() {
            return Err(DomainError::SeatNotSellable { code: code.clone() });
        }
        seat.status = SeatStatus::Booked;
        Ok(())
    }
}
