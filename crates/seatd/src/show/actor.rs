//! Show actor - the single owner of one show's soft state.
//!
//! Every select, unselect, commit, expiry and disconnect for a show is
//! processed here, one command at a time, so the hold registry needs no
//! locking and events reach each watcher's queue in processing order.
//!
//! The cached seat map is refreshed from storage on join, on every commit
//! and after a commit finds a seat already booked. Between refreshes a seat
//! sold by another process can still be held; the commit re-read rejects it
//! and the refresh then drops such holds.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - A failing request is answered with an error; it never stops the actor
//! - Responder send failures are ignored (the caller went away)

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use seat_core::{ConnectionId, Money, SeatCode, Show};
use seat_protocol::ServerMessage;

use super::booking::{BookingCoordinator, CommitError, CommitRejection};
use super::commands::{HeldSeat, ShowCommand, ShowError, ShowSnapshot};
use super::holds::{HoldKey, HoldRegistry, Holder};
use super::room::{Outbox, Room};
use super::ShowSettings;
use crate::storage::BookingReceipt;

/// The show actor.
pub struct ShowActor {
    receiver: mpsc::Receiver<ShowCommand>,

    /// Used by hold timers to post `Expire` back to this actor. Weak so the
    /// actor still stops once every handle is dropped.
    timer_sender: mpsc::WeakSender<ShowCommand>,

    /// Last known durable state of the show, refreshed on join and commit
    show: Show,

    holds: HoldRegistry,
    room: Room,
    coordinator: BookingCoordinator,
}

impl ShowActor {
    pub fn new(
        show: Show,
        receiver: mpsc::Receiver<ShowCommand>,
        timer_sender: mpsc::WeakSender<ShowCommand>,
        coordinator: BookingCoordinator,
        settings: ShowSettings,
    ) -> Self {
        Self {
            receiver,
            timer_sender,
            room: Room::new(show.id.clone()),
            show,
            holds: HoldRegistry::new(settings.hold_duration, settings.max_holds_per_holder),
            coordinator,
        }
    }

    /// Runs the actor event loop until every sender is dropped.
    pub async fn run(mut self) {
        info!(show_id = %self.show.id, "Show actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd).await;
        }

        info!(
            show_id = %self.show.id,
            holds = self.holds.len(),
            "Show actor stopped"
        );
    }

    async fn handle_command(&mut self, cmd: ShowCommand) {
        match cmd {
            ShowCommand::Join {
                connection,
                outbox,
                respond_to,
            } => {
                self.handle_join(connection, outbox).await;
                let _ = respond_to.send(Ok(()));
            }
            ShowCommand::Leave {
                connection,
                respond_to,
            } => {
                let was_member = self.room.leave(&connection);
                debug!(show_id = %self.show.id, connection = %connection, "Watcher left");
                let _ = respond_to.send(was_member);
            }
            ShowCommand::Select {
                holder,
                seat,
                respond_to,
            } => {
                let result = self.handle_select(holder, seat);
                let _ = respond_to.send(result);
            }
            ShowCommand::Unselect {
                holder,
                seat,
                respond_to,
            } => {
                let result = self.handle_unselect(&holder, seat);
                let _ = respond_to.send(result);
            }
            ShowCommand::Commit {
                holder,
                seats,
                amount,
                respond_to,
            } => {
                let result = self.handle_commit(&holder, seats, amount).await;
                let _ = respond_to.send(result);
            }
            ShowCommand::BookGeneral {
                holder,
                quantity,
                amount,
                respond_to,
            } => {
                let result = self
                    .coordinator
                    .book_general(&mut self.show, &holder.user, quantity, amount)
                    .await
                    .map_err(ShowError::from);
                let _ = respond_to.send(result);
            }
            ShowCommand::Expire { key } => {
                self.handle_expire(key);
            }
            ShowCommand::Disconnect { connection } => {
                self.handle_disconnect(&connection);
            }
            ShowCommand::Snapshot { respond_to } => {
                let _ = respond_to.send(self.snapshot());
            }
        }
        self.prune_parked();
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    async fn handle_join(&mut self, connection: ConnectionId, outbox: Outbox) {
        self.refresh_show().await;

        self.room.join(connection.clone(), outbox);
        let snapshot = self.snapshot();
        self.room.send_to(
            &connection,
            ServerMessage::Joined {
                show_id: snapshot.show_id,
                held_seats: snapshot.held_seats,
                booked_seats: snapshot.booked_seats,
            },
        );
        debug!(
            show_id = %self.show.id,
            connection = %connection,
            watchers = self.room.len(),
            "Watcher joined"
        );
    }

    fn handle_select(&mut self, holder: Holder, seat: SeatCode) -> Result<HeldSeat, ShowError> {
        if !self.room.contains(&holder.connection) {
            return Err(ShowError::NotJoined(self.show.id.clone()));
        }

        let origin = holder.connection.clone();
        let user = holder.user.clone();
        let now = Instant::now();
        let selected = self
            .holds
            .select(&self.show, &seat, holder, now)
            .inspect_err(|e| {
                debug!(show_id = %self.show.id, seat = %seat, user = %user, error = %e, "Select refused");
            })?;

        if selected.created {
            self.spawn_expiry_timer(selected.key, selected.deadline);
            self.room.broadcast(
                &ServerMessage::locked(self.show.id.clone(), seat.clone()),
                Some(&origin),
            );
            debug!(show_id = %self.show.id, seat = %seat, user = %user, "Seat held");
        }

        Ok(HeldSeat {
            seat,
            expires_in: selected.deadline.saturating_duration_since(now),
        })
    }

    fn handle_unselect(&mut self, holder: &Holder, seat: SeatCode) -> Result<(), ShowError> {
        let hold = self.holds.release(&seat, &holder.user)?;
        self.room
            .broadcast(&ServerMessage::unlocked(self.show.id.clone(), hold.seat), None);
        debug!(show_id = %self.show.id, seat = %seat, user = %holder.user, "Seat released");
        Ok(())
    }

    async fn handle_commit(
        &mut self,
        holder: &Holder,
        seats: Vec<SeatCode>,
        amount: Money,
    ) -> Result<BookingReceipt, ShowError> {
        let result = self
            .coordinator
            .commit(
                &mut self.show,
                &self.holds,
                &holder.user,
                seats.clone(),
                amount,
            )
            .await;
        let receipt = match result {
            Ok(receipt) => receipt,
            Err(err) => {
                if found_booked_seat(&err) {
                    self.refresh_show().await;
                }
                return Err(err.into());
            }
        };

        self.holds.consume(&seats);
        for seat in seats {
            self.room
                .broadcast(&ServerMessage::booked(self.show.id.clone(), seat), None);
        }
        Ok(receipt)
    }

    fn handle_expire(&mut self, key: HoldKey) {
        let Some(hold) = self.holds.expire(key) else {
            // Released or consumed before the timer fired
            return;
        };

        info!(
            show_id = %self.show.id,
            seat = %hold.seat,
            user = %hold.holder.user,
            "Hold expired"
        );
        self.room.broadcast(
            &ServerMessage::unlocked(self.show.id.clone(), hold.seat.clone()),
            None,
        );
        self.room.send_to(
            &hold.holder.connection,
            ServerMessage::hold_expired(self.show.id.clone(), hold.seat),
        );
    }

    fn handle_disconnect(&mut self, connection: &ConnectionId) {
        self.room.forget(connection);
        let released = self.holds.release_connection(connection);
        if released.is_empty() {
            return;
        }

        info!(
            show_id = %self.show.id,
            connection = %connection,
            released = released.len(),
            "Released holds of disconnected client"
        );
        for hold in released {
            self.room
                .broadcast(&ServerMessage::unlocked(self.show.id.clone(), hold.seat), None);
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Re-reads the show and drops holds on seats booked elsewhere.
    async fn refresh_show(&mut self) {
        match self.coordinator.storage().read_show(&self.show.id).await {
            Ok(show) => self.show = show,
            Err(e) => {
                warn!(show_id = %self.show.id, error = %e, "Could not refresh show, using cached seat map");
                return;
            }
        }

        let Some(layout) = self.show.layout() else {
            return;
        };
        let booked: Vec<SeatCode> = self
            .holds
            .held_seats()
            .into_iter()
            .filter(|code| layout.find(code).is_some_and(|seat| seat.is_booked()))
            .collect();
        if booked.is_empty() {
            return;
        }

        let dropped = self.holds.consume(&booked);
        info!(
            show_id = %self.show.id,
            dropped = dropped.len(),
            "Dropped holds on seats booked elsewhere"
        );
        for hold in dropped {
            self.room
                .broadcast(&ServerMessage::booked(self.show.id.clone(), hold.seat), None);
        }
    }

    /// Drops parked queues of connections that no longer hold anything here.
    fn prune_parked(&mut self) {
        let holds = &self.holds;
        self.room
            .retain_parked(|connection| holds.has_connection(connection));
    }

    fn spawn_expiry_timer(&mut self, key: HoldKey, deadline: Instant) {
        let sender = self.timer_sender.clone();
        let timer = tokio::spawn(async move {
            sleep_until(deadline).await;
            // Fire-and-forget; a stale key is ignored by the actor
            if let Some(sender) = sender.upgrade() {
                let _ = sender.send(ShowCommand::Expire { key }).await;
            }
        });
        self.holds.attach_timer(key, timer.abort_handle());
    }

    fn snapshot(&self) -> ShowSnapshot {
        ShowSnapshot {
            show_id: self.show.id.clone(),
            held_seats: self.holds.held_seats(),
            booked_seats: self
                .show
                .layout()
                .map(|layout| layout.booked_codes())
                .unwrap_or_default(),
            watchers: self.room.len(),
        }
    }
}

fn found_booked_seat(err: &CommitError) -> bool {
    match err {
        CommitError::Rejected(reasons) => reasons
            .iter()
            .any(|r| matches!(r, CommitRejection::SeatAlreadyBooked(_))),
        CommitError::TransactionFailed(_) => false,
    }
}
