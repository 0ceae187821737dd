//! The asynchronous DH handshake as the two participants drive it, each
//! step decided against the stored row exactly as the coordinator does.

use chrono::Utc;
use messenger_service::error::AppError;
use messenger_service::models::{KeyExchange, KeyExchangeStatus};
use messenger_service::services::key_exchange_service::{
    validate_complete, validate_init, CompleteAction, InitAction,
};

const ALICE: i64 = 1;
const BOB: i64 = 2;

fn initiated_row() -> KeyExchange {
    let now = Utc::now();
    KeyExchange {
        id: 1,
        chat_id: 10,
        initiator_id: ALICE,
        recipient_id: BOB,
        dh_g: Some("2".into()),
        dh_p: Some("227".into()),
        dh_a: Some("116".into()),
        dh_b: None,
        status: KeyExchangeStatus::Initiated.as_str().into(),
        created_at: now,
        updated_at: now,
    }
}

fn completed_row() -> KeyExchange {
    let mut row = initiated_row();
    row.dh_b = Some("173".into());
    row.status = KeyExchangeStatus::Completed.as_str().into();
    row
}

#[test]
fn async_handshake_reaches_completed() {
    // Alice initiates while Bob is offline: no row exists yet.
    assert_eq!(validate_init(None, ALICE).unwrap(), InitAction::Insert);

    // Bob comes online later and completes against the stored row.
    let row = initiated_row();
    assert_eq!(
        validate_complete(Some(&row), BOB, "173").unwrap(),
        CompleteAction::Apply(row.id)
    );

    // Either participant reading the completed row sees all four params.
    let done = completed_row();
    assert_eq!(done.status(), KeyExchangeStatus::Completed);
    assert!(done.dh_g.is_some() && done.dh_p.is_some());
    assert!(done.dh_a.is_some() && done.dh_b.is_some());
}

#[test]
fn concurrent_init_by_peer_is_rejected() {
    // Alice initiated; before Bob completes, Bob tries to initiate too.
    let row = initiated_row();
    let err = validate_init(Some(&row), BOB).unwrap_err();
    assert!(matches!(err, AppError::FailedPrecondition(_)));

    // Alice retrying her own init stays idempotent.
    assert_eq!(
        validate_init(Some(&row), ALICE).unwrap(),
        InitAction::Overwrite(row.id)
    );
}

#[test]
fn completed_exchange_rejects_rekey_but_tolerates_replay() {
    let row = completed_row();

    // A new Init after completion is a re-key request: rejected.
    assert!(matches!(
        validate_init(Some(&row), ALICE).unwrap_err(),
        AppError::FailedPrecondition(_)
    ));

    // Bob re-sending the identical Complete (client retry) is a no-op.
    assert_eq!(
        validate_complete(Some(&row), BOB, "173").unwrap(),
        CompleteAction::AlreadyApplied
    );

    // Anyone else completing is a permission failure, not a precondition one.
    assert!(matches!(
        validate_complete(Some(&row), ALICE, "173").unwrap_err(),
        AppError::PermissionDenied(_)
    ));
}
