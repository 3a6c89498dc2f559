use chrono::{Duration, Utc};
use futures::future::join_all;

use crm_auth::error::AuthServiceError;
use crm_auth::usecase::otp::code_matches;
use crm_domain::phone::Phone;

use crate::helpers::{MockOtpRepo, otp_manager, phone};

// ── request_otp ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_replace_previous_challenge_on_new_request() {
    let store = MockOtpRepo::empty();
    let records = store.records_handle();
    let manager = otp_manager(store, None);
    let phone = phone();
    let t0 = Utc::now();

    let first = manager.request_otp_at(&phone, t0).await.unwrap();
    let second = manager
        .request_otp_at(&phone, t0 + Duration::seconds(10))
        .await
        .unwrap();

    let records = records.lock().unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[&phone];
    assert_eq!(record.attempts, 0);
    assert_eq!(record.expires_at, t0 + Duration::seconds(10) + Duration::minutes(2));
    assert!(code_matches(&record.code_hash, &second.code));
    if first.code != second.code {
        assert!(!code_matches(&record.code_hash, &first.code));
    }
}

#[tokio::test]
async fn should_never_store_plaintext_code() {
    let store = MockOtpRepo::empty();
    let records = store.records_handle();
    let manager = otp_manager(store, None);

    let issued = manager.request_otp(&phone()).await.unwrap();

    let records = records.lock().unwrap();
    let hash = &records[&phone()].code_hash;
    assert_ne!(hash, &issued.code);
    assert!(!issued.is_test);
    assert_eq!(issued.code.len(), 4);
}

#[tokio::test]
async fn should_use_fixed_code_in_test_mode() {
    let manager = otp_manager(MockOtpRepo::empty(), Some("4321"));
    let issued = manager.request_otp(&phone()).await.unwrap();
    assert!(issued.is_test);
    assert_eq!(issued.code, "4321");
    manager.verify_otp(&phone(), "4321").await.unwrap();
}

// ── verify_otp ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_consume_challenge_on_success() {
    let store = MockOtpRepo::empty();
    let records = store.records_handle();
    let manager = otp_manager(store, None);
    let issued = manager.request_otp(&phone()).await.unwrap();

    manager.verify_otp(&phone(), &issued.code).await.unwrap();
    assert!(records.lock().unwrap().is_empty());

    let err = manager.verify_otp(&phone(), &issued.code).await.unwrap_err();
    assert!(matches!(err, AuthServiceError::OtpNotRequested), "{err:?}");
}

#[tokio::test]
async fn should_reject_when_nothing_was_requested() {
    let manager = otp_manager(MockOtpRepo::empty(), None);
    let err = manager.verify_otp(&phone(), "1234").await.unwrap_err();
    assert!(matches!(err, AuthServiceError::OtpNotRequested));
}

#[tokio::test]
async fn should_reject_and_delete_expired_challenge() {
    let store = MockOtpRepo::empty();
    let records = store.records_handle();
    let manager = otp_manager(store, None);
    let t0 = Utc::now();
    let issued = manager.request_otp_at(&phone(), t0).await.unwrap();

    let err = manager
        .verify_otp_at(&phone(), &issued.code, t0 + Duration::minutes(2) + Duration::seconds(1))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthServiceError::OtpExpired), "{err:?}");
    assert!(records.lock().unwrap().is_empty());
}

#[tokio::test]
async fn should_accept_code_exactly_at_expiry() {
    let manager = otp_manager(MockOtpRepo::empty(), None);
    let t0 = Utc::now();
    let issued = manager.request_otp_at(&phone(), t0).await.unwrap();

    manager
        .verify_otp_at(&phone(), &issued.code, t0 + Duration::minutes(2))
        .await
        .unwrap();
}

#[tokio::test]
async fn should_prune_only_challenges_past_expiry() {
    let store = MockOtpRepo::empty();
    let records = store.records_handle();
    let manager = otp_manager(store, None);
    let stale = phone();
    let fresh = Phone::parse("09130000000").unwrap();
    let t0 = Utc::now();

    manager.request_otp_at(&stale, t0).await.unwrap();
    manager
        .request_otp_at(&fresh, t0 + Duration::minutes(1))
        .await
        .unwrap();

    // At exactly its expiry the stale challenge is still verifiable and survives.
    let at_expiry = t0 + Duration::minutes(2);
    assert_eq!(manager.prune_expired(at_expiry).await.unwrap(), 0);

    let removed = manager
        .prune_expired(at_expiry + Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(removed, 1);
    let records = records.lock().unwrap();
    assert!(!records.contains_key(&stale));
    assert!(records.contains_key(&fresh));
}

fn wrong_code(code: &str) -> String {
    if code == "1000" { "1001" } else { "1000" }.to_owned()
}

#[tokio::test]
async fn should_count_mismatches_and_report_remaining_attempts() {
    let store = MockOtpRepo::empty();
    let records = store.records_handle();
    let manager = otp_manager(store, None);
    let issued = manager.request_otp(&phone()).await.unwrap();
    let wrong = wrong_code(&issued.code);

    let err = manager.verify_otp(&phone(), &wrong).await.unwrap_err();
    assert!(
        matches!(err, AuthServiceError::OtpMismatch { remaining_attempts: 4 }),
        "{err:?}"
    );
    assert_eq!(records.lock().unwrap()[&phone()].attempts, 1);

    // The right code still works after a mismatch.
    manager.verify_otp(&phone(), &issued.code).await.unwrap();
}

#[tokio::test]
async fn should_lock_out_on_sixth_wrong_code() {
    let store = MockOtpRepo::empty();
    let records = store.records_handle();
    let manager = otp_manager(store, None);
    let issued = manager.request_otp(&phone()).await.unwrap();
    let wrong = wrong_code(&issued.code);

    for expected_remaining in (0..5).rev() {
        let err = manager.verify_otp(&phone(), &wrong).await.unwrap_err();
        assert!(
            matches!(err, AuthServiceError::OtpMismatch { remaining_attempts } if remaining_attempts == expected_remaining),
            "{err:?}"
        );
        assert!(records.lock().unwrap()[&phone()].attempts <= 5);
    }

    let err = manager.verify_otp(&phone(), &wrong).await.unwrap_err();
    assert!(matches!(err, AuthServiceError::MaxAttemptsExceeded), "{err:?}");
    assert!(records.lock().unwrap().is_empty());

    // The original code is gone with the record.
    let err = manager.verify_otp(&phone(), &issued.code).await.unwrap_err();
    assert!(matches!(err, AuthServiceError::OtpNotRequested), "{err:?}");
}

#[tokio::test]
async fn should_count_every_concurrent_mismatch() {
    let store = MockOtpRepo::empty();
    let records = store.records_handle();
    let manager = otp_manager(store, None);
    let issued = manager.request_otp(&phone()).await.unwrap();
    let wrong = wrong_code(&issued.code);
    let phone = phone();

    let results = join_all((0..4).map(|_| manager.verify_otp(&phone, &wrong))).await;

    assert!(
        results
            .iter()
            .all(|r| matches!(r, Err(AuthServiceError::OtpMismatch { .. })))
    );
    assert_eq!(records.lock().unwrap()[&phone].attempts, 4);
}

#[tokio::test]
async fn should_let_only_one_concurrent_correct_submission_win() {
    let manager = otp_manager(MockOtpRepo::empty(), None);
    let issued = manager.request_otp(&phone()).await.unwrap();
    let phone = phone();

    let results = join_all((0..3).map(|_| manager.verify_otp(&phone, &issued.code))).await;

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, AuthServiceError::OtpNotRequested))
    );
}
