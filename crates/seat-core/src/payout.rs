//! Revenue split policies and balance delta sheets.
//!
//! A booking moves money, it never creates it: the buyer is debited the
//! ticket amount and the same amount is credited across one or more vendors
//! according to the show's [`RevenueSplit`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{DomainError, DomainResult, Money, UserId};

/// One credit leg of a booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payout {
    pub vendor: UserId,
    pub amount: Money,
}

/// Decides how a ticket amount is shared between vendors.
///
/// Implementations must return legs whose amounts sum to exactly `amount`.
pub trait PayoutPolicy {
    fn payouts(&self, amount: Money) -> Vec<Payout>;
}

/// Revenue split configuration attached to a show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum RevenueSplit {
    /// Everything goes to one vendor (concert style).
    SingleVendor { vendor: UserId },

    /// `commission_percent` of the amount goes to the content vendor (the
    /// film distributor), the rest to the venue vendor (the theatre).
    Commission {
        content_vendor: UserId,
        venue_vendor: UserId,
        commission_percent: u8,
    },
}

impl RevenueSplit {
    /// Checks the configuration is usable.
    pub fn validate(&self) -> DomainResult<()> {
        match self {
            Self::SingleVendor { .. } => Ok(()),
            Self::Commission {
                commission_percent, ..
            } if *commission_percent > 100 => Err(DomainError::InvalidFieldValue {
                field: "commission_percent".to_string(),
                value: commission_percent.to_string(),
                expected: "0..=100".to_string(),
            }),
            Self::Commission { .. } => Ok(()),
        }
    }
}

impl PayoutPolicy for RevenueSplit {
    fn payouts(&self, amount: Money) -> Vec<Payout> {
        match self {
            Self::SingleVendor { vendor } => vec![Payout {
                vendor: vendor.clone(),
                amount,
            }],
            Self::Commission {
                content_vendor,
                venue_vendor,
                commission_percent,
            } => {
                let content_cut = amount.percent((*commission_percent).min(100));
                vec![
                    Payout {
                        vendor: content_vendor.clone(),
                        amount: content_cut,
                    },
                    Payout {
                        vendor: venue_vendor.clone(),
                        amount: amount - content_cut,
                    },
                ]
            }
        }
    }
}

/// Net balance change per user for one booking transaction.
///
/// Deltas for the same user are merged so each account is touched once, and
/// users whose net change is zero are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BalanceSheet {
    deltas: BTreeMap<UserId, Money>,
}

impl BalanceSheet {
    /// Builds the sheet for `buyer` paying `amount` under `policy`.
    pub fn for_booking(buyer: &UserId, amount: Money, policy: &dyn PayoutPolicy) -> Self {
        let mut sheet = Self::default();
        sheet.add(buyer.clone(), -amount);
        for leg in policy.payouts(amount) {
            sheet.add(leg.vendor, leg.amount);
        }
        sheet.deltas.retain(|_, delta| !delta.is_zero());
        sheet
    }

    fn add(&mut self, user: UserId, delta: Money) {
        *self.deltas.entry(user).or_default() += delta;
    }

    pub fn delta_for(&self, user: &UserId) -> Money {
        self.deltas.get(user).copied().unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&UserId, &Money)> {
        self.deltas.iter()
    }

    /// Sum of all deltas. Zero for every sheet built by [`Self::for_booking`].
    pub fn total(&self) -> Money {
        self.deltas.values().copied().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commission(percent: u8) -> RevenueSplit {
        RevenueSplit::Commission {
            content_vendor: UserId::new("studio"),
            venue_vendor: UserId::new("theatre"),
            commission_percent: percent,
        }
    }

    #[test]
    fn test_single_vendor_gets_everything() {
        let split = RevenueSplit::SingleVendor {
            vendor: UserId::new("v1"),
        };
        let legs = split.payouts(Money::rupees(400));
        assert_eq!(legs.len(), 1);
        assert_eq!(legs[0].amount, Money::rupees(400));
    }

    #[test]
    fn test_commission_split_sums_to_amount() {
        let amount = Money::from_paise(99_999);
        let legs = commission(15).payouts(amount);
        let total: Money = legs.iter().map(|l| l.amount).sum();
        assert_eq!(total, amount);
        assert_eq!(legs[0].amount, Money::from_paise(14_999));
    }

    #[test]
    fn test_commission_validation() {
        assert!(commission(100).validate().is_ok());
        assert!(commission(101).validate().is_err());
    }

    #[test]
    fn test_balance_sheet_is_zero_sum() {
        let buyer = UserId::new("u1");
        let sheet = BalanceSheet::for_booking(&buyer, Money::rupees(400), &commission(10));
        assert_eq!(sheet.total(), Money::zero());
        assert_eq!(sheet.delta_for(&buyer), Money::rupees(-400));
        assert_eq!(sheet.delta_for(&UserId::new("studio")), Money::rupees(40));
        assert_eq!(sheet.delta_for(&UserId::new("theatre")), Money::rupees(360));
    }

    #[test]
    fn test_balance_sheet_nets_buyer_who_is_vendor() {
        let buyer = UserId::new("theatre");
        let sheet = BalanceSheet::for_booking(&buyer, Money::rupees(100), &commission(0));
        // Buyer pays 100 and receives 100 back as venue vendor
        assert_eq!(sheet.iter().count(), 0);
        assert_eq!(sheet.total(), Money::zero());
    }
}
