//! Shows: the unit of sale and the unit of serialization in the daemon.

use serde::{Deserialize, Serialize};

use crate::{
    DomainError, DomainResult, Money, RevenueSplit, SeatCode, SeatLayout, SeatType, ShowId,
};

/// Per-seat-type prices of a show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceTable {
    pub regular: Money,
    pub vip: Money,
}

impl PriceTable {
    pub fn new(regular: Money, vip: Money) -> Self {
        Self { regular, vip }
    }

    /// Price of a seat of the given type. Disabled seats have no price.
    pub fn price_of(&self, seat_type: SeatType) -> Option<Money> {
        match seat_type {
            SeatType::Regular => Some(self.regular),
            SeatType::Vip => Some(self.vip),
            SeatType::Disabled => None,
        }
    }
}

/// How seats of a show are sold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Seating {
    /// Seat-mapped: buyers hold and book individual seat codes.
    Reserved { layout: SeatLayout },

    /// Count-based: buyers book a number of places, priced at the regular rate.
    GeneralAdmission {
        capacity: u32,
        #[serde(default)]
        sold: u32,
    },
}

/// One sellable instance of an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Show {
    pub id: ShowId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub seating: Seating,
    pub prices: PriceTable,
    pub revenue_split: RevenueSplit,
}

impl Show {
    /// Creates a seat-mapped show.
    pub fn reserved(
        id: ShowId,
        layout: SeatLayout,
        prices: PriceTable,
        revenue_split: RevenueSplit,
    ) -> Self {
        Self {
            id,
            title: None,
            seating: Seating::Reserved { layout },
            prices,
            revenue_split,
        }
    }

    /// Creates a general-admission show.
    pub fn general_admission(
        id: ShowId,
        capacity: u32,
        price: Money,
        revenue_split: RevenueSplit,
    ) -> Self {
        Self {
            id,
            title: None,
            seating: Seating::GeneralAdmission { capacity, sold: 0 },
            prices: PriceTable::new(price, price),
            revenue_split,
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn layout(&self) -> Option<&SeatLayout> {
        match &self.seating {
            Seating::Reserved { layout } => Some(layout),
            Seating::GeneralAdmission { .. } => None,
        }
    }

    pub fn layout_mut(&mut self) -> DomainResult<&mut SeatLayout> {
        match &mut self.seating {
            Seating::Reserved { layout } => Ok(layout),
            Seating::GeneralAdmission { .. } => Err(DomainError::NotSeatMapped),
        }
    }

    /// Total number of sellable places.
    pub fn total_seats(&self) -> usize {
        match &self.seating {
            Seating::Reserved { layout } => layout.sellable_count(),
            Seating::GeneralAdmission { capacity, .. } => *capacity as usize,
        }
    }

    /// Price of one seat by code, if the seat exists and is sellable.
    pub fn price_of_seat(&self, code: &SeatCode) -> Option<Money> {
        let seat = self.layout()?.find(code)?;
        self.prices.price_of(seat.seat_type)
    }

    /// Remaining general-admission places, `None` for seat-mapped shows.
    pub fn remaining_capacity(&self) -> Option<u32> {
        match &self.seating {
            Seating::GeneralAdmission { capacity, sold } => Some(capacity.saturating_sub(*sold)),
            Seating::Reserved { .. } => None,
        }
    }

    /// Sells `quantity` general-admission places.
    pub fn sell_places(&mut self, quantity: u32) -> DomainResult<()> {
        match &mut self.seating {
            Seating::GeneralAdmission { capacity, sold } => {
                let remaining = capacity.saturating_sub(*sold);
                if quantity > remaining {
                    return Err(DomainError::CapacityExceeded {
                        requested: quantity,
                        remaining,
                    });
                }
                *sold += quantity;
                Ok(())
            }
            Seating::Reserved { .. } => Err(DomainError::NotSeatMapped),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::UserId;

    fn vendor() -> RevenueSplit {
        RevenueSplit::SingleVendor {
            vendor: UserId::new("v1"),
        }
    }

    #[test]
    fn test_price_of_seat() {
        let layout = SeatLayout::grid(3, 3, SeatType::Regular)
            .with_row_type(0, SeatType::Vip)
            .with_seat_type(&SeatCode::from("C3"), SeatType::Disabled);
        let show = Show::reserved(
            ShowId::new("S1"),
            layout,
            PriceTable::new(Money::rupees(200), Money::rupees(350)),
            vendor(),
        );
        assert_eq!(show.price_of_seat(&SeatCode::from("A1")), Some(Money::rupees(350)));
        assert_eq!(show.price_of_seat(&SeatCode::from("B1")), Some(Money::rupees(200)));
        assert_eq!(show.price_of_seat(&SeatCode::from("C3")), None);
        assert_eq!(show.price_of_seat(&SeatCode::from("Z9")), None);
        assert_eq!(show.total_seats(), 8);
    }

    #[test]
    fn test_general_admission_capacity() {
        let mut show =
            Show::general_admission(ShowId::new("G1"), 5, Money::rupees(500), vendor());
        assert!(show.layout().is_none());
        show.sell_places(3).unwrap();
        assert_eq!(show.remaining_capacity(), Some(2));
        assert_eq!(
            show.sell_places(3),
            Err(DomainError::CapacityExceeded {
                requested: 3,
                remaining: 2
            })
        );
        assert_eq!(show.remaining_capacity(), Some(2));
    }

    #[test]
    fn test_show_toml_shape() {
        let json = serde_json::json!({
            "id": "S9",
            "seating": {"kind": "general_admission", "capacity": 100},
            "prices": {"regular": 250.0, "vip": 250.0},
            "revenue_split": {"policy": "single_vendor", "vendor": "v1"}
        });
        let show: Show = serde_json::from_value(json).unwrap();
        assert_eq!(show.remaining_capacity(), Some(100));
    }
}
