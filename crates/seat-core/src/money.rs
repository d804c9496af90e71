//! Money value object used for prices, ticket amounts and balances.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub};

/// A monetary amount in rupees.
///
/// Internally stored as paise (hundredths of a rupee) so that price sums and
/// balance transfers are exact. Negative values are legal and represent
/// debits in a balance delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money {
    /// Amount in paise (1 INR = 100 paise)
    paise: i64,
}

impl Money {
    const PAISE_PER_RUPEE: i64 = 100;

    /// Creates Money from a rupee amount, rounding to the nearest paisa.
    pub fn from_rupees(rupees: f64) -> Self {
        let paise = (rupees * Self::PAISE_PER_RUPEE as f64).round() as i64;
        Self { paise }
    }

    /// Creates Money from whole rupees.
    pub const fn rupees(rupees: i64) -> Self {
        Self {
            paise: rupees.saturating_mul(Self::PAISE_PER_RUPEE),
        }
    }

    /// Creates Money from paise.
    pub const fn from_paise(paise: i64) -> Self {
        Self { paise }
    }

    pub const fn zero() -> Self {
        Self { paise: 0 }
    }

    /// Returns the amount in rupees as a float.
    pub fn as_rupees(&self) -> f64 {
        self.paise as f64 / Self::PAISE_PER_RUPEE as f64
    }

    pub const fn as_paise(&self) -> i64 {
        self.paise
    }

    pub const fn is_zero(&self) -> bool {
        self.paise == 0
    }

    pub const fn is_positive(&self) -> bool {
        self.paise > 0
    }

    pub const fn is_negative(&self) -> bool {
        self.paise < 0
    }

    /// Multiplies by a seat count. Saturates instead of wrapping.
    pub fn times(&self, count: u32) -> Self {
        Self {
            paise: self.paise.saturating_mul(i64::from(count)),
        }
    }

    /// Takes `percent`% of this amount, rounded down to whole paise.
    pub fn percent(&self, percent: u8) -> Self {
        Self {
            paise: self.paise.saturating_mul(i64::from(percent)) / 100,
        }
    }

    /// Subtraction that returns `None` on overflow.
    pub fn checked_sub(&self, other: Money) -> Option<Self> {
        self.paise
            .checked_sub(other.paise)
            .map(|paise| Self { paise })
    }

    /// Formats the amount for display, e.g. "₹200.00".
    pub fn format(&self) -> String {
        let sign = if self.paise < 0 { "-" } else { "" };
        let abs = self.paise.unsigned_abs();
        format!("{sign}₹{}.{:02}", abs / 100, abs % 100)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            paise: self.paise.saturating_add(other.paise),
        }
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, other: Self) {
        self.paise = self.paise.saturating_add(other.paise);
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self {
            paise: self.paise.saturating_sub(other.paise),
        }
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self {
        Self {
            paise: self.paise.saturating_neg(),
        }
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), |acc, m| acc + m)
    }
}

impl Serialize for Money {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        // Serialize as rupees for JSON compatibility
        serializer.serialize_f64(self.as_rupees())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let rupees = f64::deserialize(deserializer)?;
        if !rupees.is_finite() {
            return Err(serde::de::Error::custom("amount must be a finite number"));
        }
        Ok(Money::from_rupees(rupees))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format())
    }
}
