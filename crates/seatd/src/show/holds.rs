//! Hold registry - the soft, in-memory seat locks of one show.
//!
//! Holds live in an arena of slots. Each slot carries a generation counter
//! that is bumped whenever its hold is removed, so a [`HoldKey`] handed to an
//! expiry timer stops matching as soon as the hold is released, consumed or
//! replaced. A timer that fires late can therefore never remove somebody
//! else's hold.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()` or direct slice indexing
//! - Lookups with a stale key return `None`

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::task::AbortHandle;
use tokio::time::{Duration, Instant};

use seat_core::{ConnectionId, SeatCode, Show, UserId};

// ============================================================================
// Resource Limits
// ============================================================================

/// Default hold lifetime.
pub const DEFAULT_HOLD_DURATION: Duration = Duration::from_secs(60);

/// Default number of seats one user may hold in one show.
pub const DEFAULT_MAX_HOLDS_PER_HOLDER: usize = 10;

// ============================================================================
// Types
// ============================================================================

/// Who owns a hold.
///
/// Ownership checks compare the user; the connection is where directed
/// notifications go and what a disconnect cleans up.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Holder {
    pub user: UserId,
    pub connection: ConnectionId,
}

impl Holder {
    pub fn new(user: UserId, connection: ConnectionId) -> Self {
        Self { user, connection }
    }
}

/// Generation-checked reference to a hold slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HoldKey {
    index: usize,
    generation: u64,
}

/// An active hold.
#[derive(Debug)]
pub struct Hold {
    pub seat: SeatCode,
    pub holder: Holder,
    pub created_at: DateTime<Utc>,
    pub deadline: Instant,
    timer: Option<AbortHandle>,
}

impl Hold {
    /// Whether the hold is still valid at `now`.
    pub fn is_fresh(&self, now: Instant) -> bool {
        now < self.deadline
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u64,
    hold: Option<Hold>,
}

/// Outcome of a successful select.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selected {
    pub key: HoldKey,
    pub deadline: Instant,
    /// False when the same holder already held the seat
    pub created: bool,
}

/// Admission errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HoldError {
    #[error("seat {0} is held by another buyer")]
    AlreadyHeld(SeatCode),

    #[error("seat {0} is not available")]
    SeatUnavailable(SeatCode),

    #[error("seat {0} is not held by you")]
    NotHolder(SeatCode),

    #[error("seat {0} does not exist")]
    SeatNotFound(SeatCode),

    #[error("show has no seat map")]
    NotSeatMapped,

    #[error("hold limit reached ({max} seats)")]
    TooManyHolds { max: usize },
}

impl HoldError {
    /// Stable error code sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AlreadyHeld(_) => "already_held",
            Self::SeatUnavailable(_) => "seat_unavailable",
            Self::NotHolder(_) => "not_holder",
            Self::SeatNotFound(_) => "seat_not_found",
            Self::NotSeatMapped => "not_seat_mapped",
            Self::TooManyHolds { .. } => "too_many_holds",
        }
    }
}

// ============================================================================
// Hold Registry
// ============================================================================

/// Per-show map from seat code to its active hold.
///
/// At most one hold exists per seat code. The registry is owned by the show
/// actor and is never shared.
#[derive(Debug)]
pub struct HoldRegistry {
    slots: Vec<Slot>,
    free: Vec<usize>,
    by_seat: HashMap<SeatCode, HoldKey>,
    hold_duration: Duration,
    max_per_holder: usize,
}

impl HoldRegistry {
    pub fn new(hold_duration: Duration, max_per_holder: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            by_seat: HashMap::new(),
            hold_duration,
            max_per_holder,
        }
    }

    pub fn hold_duration(&self) -> Duration {
        self.hold_duration
    }

    /// Places a hold on `seat` for `holder`.
    ///
    /// `show` is the actor's view of the durable seat map and is only used
    /// to reject unknown, disabled or booked seats.
    pub fn select(
        &mut self,
        show: &Show,
        seat: &SeatCode,
        holder: Holder,
        now: Instant,
    ) -> Result<Selected, HoldError> {
        let layout = show.layout().ok_or(HoldError::NotSeatMapped)?;
        let state = layout
            .find(seat)
            .ok_or_else(|| HoldError::SeatNotFound(seat.clone()))?;
        if state.is_booked() || !state.seat_type.is_sellable() {
            return Err(HoldError::SeatUnavailable(seat.clone()));
        }

        // Re-select only from the connection that placed the hold
        if let Some((key, existing)) = self.lookup(seat) {
            if existing.holder == holder {
                return Ok(Selected {
                    key,
                    deadline: existing.deadline,
                    created: false,
                });
            }
            return Err(HoldError::AlreadyHeld(seat.clone()));
        }

        if self.count_for(&holder.user) >= self.max_per_holder {
            return Err(HoldError::TooManyHolds {
                max: self.max_per_holder,
            });
        }

        let deadline = now + self.hold_duration;
        let hold = Hold {
            seat: seat.clone(),
            holder,
            created_at: Utc::now(),
            deadline,
            timer: None,
        };
        let key = self.insert(hold);
        self.by_seat.insert(seat.clone(), key);

        Ok(Selected {
            key,
            deadline,
            created: true,
        })
    }

    /// Attaches the expiry timer task to a hold.
    ///
    /// If the key went stale in the meantime the timer is aborted right away.
    pub fn attach_timer(&mut self, key: HoldKey, timer: AbortHandle) {
        match self.get_mut(key) {
            Some(hold) => hold.timer = Some(timer),
            None => timer.abort(),
        }
    }

    /// Releases a hold owned by `user`.
    pub fn release(&mut self, seat: &SeatCode, user: &UserId) -> Result<Hold, HoldError> {
        let key = match self.lookup(seat) {
            Some((key, hold)) if &hold.holder.user == user => key,
            _ => return Err(HoldError::NotHolder(seat.clone())),
        };
        self.remove(key)
            .ok_or_else(|| HoldError::NotHolder(seat.clone()))
    }

    /// Removes the hold behind `key` if the key is still current.
    pub fn expire(&mut self, key: HoldKey) -> Option<Hold> {
        self.remove(key)
    }

    /// Removes every hold placed from `connection`.
    pub fn release_connection(&mut self, connection: &ConnectionId) -> Vec<Hold> {
        let keys: Vec<HoldKey> = self
            .by_seat
            .values()
            .copied()
            .filter(|&key| {
                self.get(key)
                    .is_some_and(|hold| &hold.holder.connection == connection)
            })
            .collect();
        keys.into_iter().filter_map(|key| self.remove(key)).collect()
    }

    /// Removes the holds on `seats` after a successful booking.
    pub fn consume(&mut self, seats: &[SeatCode]) -> Vec<Hold> {
        let keys: Vec<HoldKey> = seats
            .iter()
            .filter_map(|seat| self.by_seat.get(seat).copied())
            .collect();
        keys.into_iter().filter_map(|key| self.remove(key)).collect()
    }

    /// The hold currently on `seat`.
    pub fn holder_of(&self, seat: &SeatCode) -> Option<&Hold> {
        self.lookup(seat).map(|(_, hold)| hold)
    }

    /// Whether any hold was placed from `connection`.
    pub fn has_connection(&self, connection: &ConnectionId) -> bool {
        self.holds()
            .any(|hold| &hold.holder.connection == connection)
    }

    /// Number of holds owned by `user`.
    pub fn count_for(&self, user: &UserId) -> usize {
        self.holds().filter(|hold| &hold.holder.user == user).count()
    }

    /// Sorted codes of all held seats. Holder identities are not exposed.
    pub fn held_seats(&self) -> Vec<SeatCode> {
        let mut seats: Vec<SeatCode> = self.by_seat.keys().cloned().collect();
        seats.sort();
        seats
    }

    pub fn len(&self) -> usize {
        self.by_seat.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_seat.is_empty()
    }

    // ========================================================================
    // Arena
    // ========================================================================

    fn holds(&self) -> impl Iterator<Item = &Hold> {
        self.slots.iter().filter_map(|slot| slot.hold.as_ref())
    }

    fn lookup(&self, seat: &SeatCode) -> Option<(HoldKey, &Hold)> {
        let key = *self.by_seat.get(seat)?;
        self.get(key).map(|hold| (key, hold))
    }

    fn get(&self, key: HoldKey) -> Option<&Hold> {
        self.slots
            .get(key.index)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.hold.as_ref())
    }

    fn get_mut(&mut self, key: HoldKey) -> Option<&mut Hold> {
        self.slots
            .get_mut(key.index)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.hold.as_mut())
    }

    fn insert(&mut self, hold: Hold) -> HoldKey {
        if let Some(index) = self.free.pop() {
            if let Some(slot) = self.slots.get_mut(index) {
                slot.hold = Some(hold);
                return HoldKey {
                    index,
                    generation: slot.generation,
                };
            }
        }
        let index = self.slots.len();
        self.slots.push(Slot {
            generation: 0,
            hold: Some(hold),
        });
        HoldKey {
            index,
            generation: 0,
        }
    }

    fn remove(&mut self, key: HoldKey) -> Option<Hold> {
        let slot = self
            .slots
            .get_mut(key.index)
            .filter(|slot| slot.generation == key.generation)?;
        let mut hold = slot.hold.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(key.index);
        self.by_seat.remove(&hold.seat);
        hold.cancel_timer();
        Some(hold)
    }
}
