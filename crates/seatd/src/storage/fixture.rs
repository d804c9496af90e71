//! Seed data loaded into an empty store at startup.
//!
//! Writing out every seat of a grid in TOML is impractical, so shows are
//! described by shape:
//!
//! ```toml
//! [[shows]]
//! id = "S1"
//! rows = 10
//! cols = 10
//! vip_rows = ["A"]
//! disabled = ["J10"]
//! regular_price = 200
//! vip_price = 350
//!
//! [shows.revenue_split]
//! policy = "single_vendor"
//! vendor = "vendor"
//!
//! [[users]]
//! id = "u1"
//! balance = 1000
//! ```

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use seat_core::{
    row_label, DomainError, Money, PriceTable, RevenueSplit, SeatCode, SeatLayout, SeatType, Show,
    ShowId, UserAccount,
};

use super::Snapshot;

/// Errors raised while loading a fixture.
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("failed to read fixture {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse fixture: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("show {show}: {reason}")]
    InvalidShow { show: ShowId, reason: String },

    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// Shows and users to seed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub shows: Vec<ShowFixture>,
    #[serde(default)]
    pub users: Vec<UserAccount>,
}

/// Shape of one show.
///
/// Either `rows`/`cols` (seat-mapped) or `capacity` (general admission)
/// must be given, not both.
#[derive(Debug, Clone, Deserialize)]
pub struct ShowFixture {
    pub id: ShowId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub rows: Option<usize>,
    #[serde(default)]
    pub cols: Option<usize>,
    /// Row letters whose seats are VIP
    #[serde(default)]
    pub vip_rows: Vec<String>,
    /// Seat codes that can never be sold
    #[serde(default)]
    pub disabled: Vec<SeatCode>,
    #[serde(default)]
    pub capacity: Option<u32>,
    pub regular_price: Money,
    #[serde(default)]
    pub vip_price: Option<Money>,
    pub revenue_split: RevenueSplit,
}

impl ShowFixture {
    /// Expands the shorthand into a full [`Show`].
    pub fn build(&self) -> Result<Show, FixtureError> {
        let invalid = |reason: String| FixtureError::InvalidShow {
            show: self.id.clone(),
            reason,
        };

        self.revenue_split.validate()?;
        if !self.regular_price.is_positive() {
            return Err(invalid("regular_price must be positive".to_string()));
        }

        let show = match (self.rows, self.cols, self.capacity) {
            (Some(rows), Some(cols), None) => {
                if rows == 0 || cols == 0 {
                    return Err(invalid("rows and cols must be non-zero".to_string()));
                }

                let mut layout = SeatLayout::grid(rows, cols, SeatType::Regular);
                for label in &self.vip_rows {
                    let row = (0..rows)
                        .find(|&r| row_label(r) == *label)
                        .ok_or_else(|| invalid(format!("vip row {label} outside the grid")))?;
                    layout = layout.with_row_type(row, SeatType::Vip);
                }
                for code in &self.disabled {
                    if layout.find(code).is_none() {
                        return Err(invalid(format!("disabled seat {code} outside the grid")));
                    }
                    layout = layout.with_seat_type(code, SeatType::Disabled);
                }

                let vip_price = self.vip_price.unwrap_or(self.regular_price);
                Show::reserved(
                    self.id.clone(),
                    layout,
                    PriceTable::new(self.regular_price, vip_price),
                    self.revenue_split.clone(),
                )
            }
            (None, None, Some(capacity)) => {
                if capacity == 0 {
                    return Err(invalid("capacity must be non-zero".to_string()));
                }
                Show::general_admission(
                    self.id.clone(),
                    capacity,
                    self.regular_price,
                    self.revenue_split.clone(),
                )
            }
            _ => {
                return Err(invalid(
                    "give either rows and cols, or capacity".to_string(),
                ))
            }
        };

        Ok(match &self.title {
            Some(title) => show.with_title(title.clone()),
            None => show,
        })
    }
}

impl Fixture {
    /// Reads a fixture from a TOML file.
    pub fn load(path: &Path) -> Result<Self, FixtureError> {
        let raw = std::fs::read_to_string(path).map_err(|source| FixtureError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, FixtureError> {
        Ok(toml::from_str(raw)?)
    }

    /// Builds every show and returns the seed as a store snapshot.
    pub fn into_snapshot(self) -> Result<Snapshot, FixtureError> {
        let shows = self
            .shows
            .iter()
            .map(ShowFixture::build)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Snapshot {
            shows,
            users: self.users,
            tickets: Vec::new(),
        })
    }
}
