//! Hold expiry timing, driven by tokio's paused clock.
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};

use seat_core::{
    ConnectionId, Money, PriceTable, RevenueSplit, SeatCode, SeatLayout, SeatType, Show, ShowId,
    UserAccount, UserId,
};
use seat_protocol::ServerMessage;
use seatd::show::{
    spawn_show, CommitError, CommitRejection, Holder, ShowError, ShowHandle, ShowSettings,
    OUTBOX_CAPACITY,
};
use seatd::storage::MemoryStore;

const HOLD: Duration = Duration::from_secs(5);

async fn spawn() -> ShowHandle {
    let show = Show::reserved(
        ShowId::new("S1"),
        SeatLayout::grid(5, 5, SeatType::Regular),
        PriceTable::new(Money::rupees(200), Money::rupees(300)),
        RevenueSplit::SingleVendor {
            vendor: UserId::new("V1"),
        },
    );
    let store = Arc::new(MemoryStore::new());
    store.insert_show(show.clone()).await;
    for user in ["U1", "U2", "V1"] {
        store
            .insert_user(UserAccount::new(UserId::new(user), Money::rupees(1000)))
            .await;
    }
    spawn_show(
        show,
        store,
        ShowSettings {
            hold_duration: HOLD,
            max_holds_per_holder: 4,
        },
    )
}

async fn join(handle: &ShowHandle, connection: &str) -> mpsc::Receiver<ServerMessage> {
    let (outbox, mut rx) = mpsc::channel(OUTBOX_CAPACITY);
    handle
        .join(ConnectionId::new(connection), outbox)
        .await
        .unwrap();
    assert!(matches!(rx.recv().await, Some(ServerMessage::Joined { .. })));
    rx
}

fn holder(user: &str, connection: &str) -> Holder {
    Holder::new(UserId::new(user), ConnectionId::new(connection))
}

async fn drain(handle: &ShowHandle, rx: &mut mpsc::Receiver<ServerMessage>) -> Vec<ServerMessage> {
    handle.snapshot().await.unwrap();
    let mut events = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        events.push(msg);
    }
    events
}

#[tokio::test(start_paused = true)]
async fn test_hold_expires_and_notifies_holder_only() {
    let handle = spawn().await;
    let mut rx1 = join(&handle, "c1").await;
    let mut rx2 = join(&handle, "c2").await;

    let held = handle.select(holder("U1", "c1"), "A1".into()).await.unwrap();
    assert_eq!(held.expires_in, HOLD);

    sleep(HOLD - Duration::from_secs(1)).await;
    assert_eq!(
        handle.snapshot().await.unwrap().held_seats,
        vec![SeatCode::from("A1")]
    );

    sleep(Duration::from_secs(2)).await;
    assert!(handle.snapshot().await.unwrap().held_seats.is_empty());

    let show = ShowId::new("S1");
    assert_eq!(
        drain(&handle, &mut rx1).await,
        vec![
            ServerMessage::unlocked(show.clone(), "A1".into()),
            ServerMessage::hold_expired(show.clone(), "A1".into()),
        ]
    );
    assert_eq!(
        drain(&handle, &mut rx2).await,
        vec![
            ServerMessage::locked(show.clone(), "A1".into()),
            ServerMessage::unlocked(show, "A1".into()),
        ]
    );

    // Free for anyone again
    handle.select(holder("U2", "c2"), "A1".into()).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_expired_hold_cannot_be_committed() {
    let handle = spawn().await;
    let _rx = join(&handle, "c1").await;

    handle.select(holder("U1", "c1"), "B2".into()).await.unwrap();
    sleep(HOLD + Duration::from_secs(1)).await;

    let err = handle
        .commit(holder("U1", "c1"), vec!["B2".into()], Money::rupees(200))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ShowError::Commit(CommitError::Rejected(ref r)) if r == &[CommitRejection::SeatNotHeld("B2".into())]
    ));
}

#[tokio::test(start_paused = true)]
async fn test_released_hold_timer_does_not_touch_new_holder() {
    let handle = spawn().await;
    let _rx1 = join(&handle, "c1").await;
    let mut rx2 = join(&handle, "c2").await;

    handle.select(holder("U1", "c1"), "C3".into()).await.unwrap();
    sleep(Duration::from_secs(1)).await;
    handle
        .unselect(holder("U1", "c1"), "C3".into())
        .await
        .unwrap();

    sleep(Duration::from_secs(1)).await;
    handle.select(holder("U2", "c2"), "C3".into()).await.unwrap();

    // Past U1's original deadline, inside U2's
    sleep(Duration::from_secs(4)).await;
    assert_eq!(
        handle.snapshot().await.unwrap().held_seats,
        vec![SeatCode::from("C3")]
    );
    let events = drain(&handle, &mut rx2).await;
    assert!(
        !events
            .iter()
            .any(|m| matches!(m, ServerMessage::HoldExpired { .. })),
        "unexpected expiry: {events:?}"
    );

    // U2's own hold still runs out on time
    sleep(Duration::from_secs(2)).await;
    assert!(handle.snapshot().await.unwrap().held_seats.is_empty());
    assert_eq!(
        drain(&handle, &mut rx2).await,
        vec![
            ServerMessage::unlocked(ShowId::new("S1"), "C3".into()),
            ServerMessage::hold_expired(ShowId::new("S1"), "C3".into()),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_reselect_by_holder_keeps_deadline() {
    let handle = spawn().await;
    let _rx = join(&handle, "c1").await;

    handle.select(holder("U1", "c1"), "D1".into()).await.unwrap();
    sleep(Duration::from_secs(3)).await;

    let again = handle.select(holder("U1", "c1"), "D1".into()).await.unwrap();
    assert_eq!(again.expires_in, HOLD - Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_hold_limit_per_holder() {
    let handle = spawn().await;
    let _rx = join(&handle, "c1").await;

    for seat in ["E1", "E2", "E3", "E4"] {
        handle.select(holder("U1", "c1"), seat.into()).await.unwrap();
    }
    let err = handle
        .select(holder("U1", "c1"), "E5".into())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "too_many_holds");

    // Expiry frees the quota
    sleep(HOLD + Duration::from_secs(1)).await;
    handle.select(holder("U1", "c1"), "E5".into()).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_holder_that_left_still_hears_expiry() {
    let handle = spawn().await;
    let mut rx1 = join(&handle, "c1").await;
    let mut rx2 = join(&handle, "c2").await;

    handle.select(holder("U1", "c1"), "A1".into()).await.unwrap();
    assert!(handle.leave(ConnectionId::new("c1")).await.unwrap());
    assert_eq!(
        handle.snapshot().await.unwrap().held_seats,
        vec![SeatCode::from("A1")]
    );

    // No broadcasts after leaving
    handle.select(holder("U2", "c2"), "A2".into()).await.unwrap();

    sleep(HOLD + Duration::from_secs(1)).await;
    assert!(!handle
        .snapshot()
        .await
        .unwrap()
        .held_seats
        .contains(&SeatCode::from("A1")));

    let show = ShowId::new("S1");
    assert_eq!(
        drain(&handle, &mut rx1).await,
        vec![ServerMessage::hold_expired(show.clone(), "A1".into())]
    );
    let watcher = drain(&handle, &mut rx2).await;
    assert!(watcher.contains(&ServerMessage::unlocked(show.clone(), "A1".into())));
    assert!(!watcher.contains(&ServerMessage::hold_expired(show, "A1".into())));
}

#[tokio::test(start_paused = true)]
async fn test_left_connection_without_holds_gets_nothing() {
    let handle = spawn().await;
    let mut rx1 = join(&handle, "c1").await;
    let _rx2 = join(&handle, "c2").await;

    handle.select(holder("U1", "c1"), "B1".into()).await.unwrap();
    handle
        .unselect(holder("U1", "c1"), "B1".into())
        .await
        .unwrap();
    assert_eq!(
        drain(&handle, &mut rx1).await,
        vec![ServerMessage::unlocked(ShowId::new("S1"), "B1".into())]
    );
    assert!(handle.leave(ConnectionId::new("c1")).await.unwrap());

    handle.select(holder("U2", "c2"), "B2".into()).await.unwrap();
    sleep(HOLD + Duration::from_secs(1)).await;
    assert!(drain(&handle, &mut rx1).await.is_empty());
}
