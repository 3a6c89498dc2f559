use crm_auth::error::AuthServiceError;
use crm_auth::usecase::login::{
    RequestOtpInput, RequestOtpUseCase, VerifyOtpInput, VerifyOtpUseCase,
};
use crm_auth::usecase::otp::code_matches;
use crm_auth_types::token::validate_access_token;
use crm_domain::user::UserRole;

use crate::helpers::{
    MockOtpRepo, MockRequestLog, MockSms, MockUserRepo, SmsMode, TEST_ACCESS_SECRET, TEST_PHONE,
    durable_limiter, issuer, otp_manager, phone, test_user,
};

fn request_usecase(
    store: MockOtpRepo,
    log: MockRequestLog,
    sms: MockSms,
    test_code: Option<&str>,
) -> RequestOtpUseCase<MockRequestLog, MockOtpRepo, MockSms> {
    RequestOtpUseCase {
        limiter: durable_limiter(log),
        otp: otp_manager(store, test_code),
        sms,
    }
}

fn input(phone: &str) -> RequestOtpInput {
    RequestOtpInput {
        phone: phone.to_owned(),
    }
}

// ── RequestOtpUseCase ────────────────────────────────────────────────────────

#[tokio::test]
async fn should_send_issued_code_by_sms() {
    let store = MockOtpRepo::empty();
    let records = store.records_handle();
    let sms = MockSms::new(SmsMode::Deliver);
    let sent = sms.sent_handle();
    let usecase = request_usecase(store, MockRequestLog::empty(), sms, None);

    let output = usecase.execute(input("+98 912 123 4567")).await.unwrap();

    assert_eq!(output.phone.as_str(), TEST_PHONE);
    assert_eq!(output.remaining, 4);
    assert_eq!(output.message_id.as_deref(), Some("msg-1"));
    assert!(output.test_code.is_none());

    let sent = sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, phone());
    assert!(code_matches(&records.lock().unwrap()[&phone()].code_hash, &sent[0].1));
}

#[tokio::test]
async fn should_reject_invalid_phone_before_any_side_effect() {
    let store = MockOtpRepo::empty();
    let records = store.records_handle();
    let log = MockRequestLog::empty();
    let entries = log.entries_handle();
    let usecase = request_usecase(store, log, MockSms::default(), None);

    let err = usecase.execute(input("12345")).await.unwrap_err();

    assert!(matches!(err, AuthServiceError::Validation(_)), "{err:?}");
    assert!(records.lock().unwrap().is_empty());
    assert!(entries.lock().unwrap().is_empty());
}

#[tokio::test]
async fn should_skip_sms_in_test_mode() {
    let sms = MockSms::new(SmsMode::Deliver);
    let sent = sms.sent_handle();
    let usecase = request_usecase(MockOtpRepo::empty(), MockRequestLog::empty(), sms, Some("1234"));

    let output = usecase.execute(input(TEST_PHONE)).await.unwrap();

    assert_eq!(output.test_code.as_deref(), Some("1234"));
    assert!(sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn should_keep_challenge_when_sms_is_not_configured() {
    let store = MockOtpRepo::empty();
    let records = store.records_handle();
    let usecase = request_usecase(
        store,
        MockRequestLog::empty(),
        MockSms::new(SmsMode::NotConfigured),
        None,
    );

    let err = usecase.execute(input(TEST_PHONE)).await.unwrap_err();

    assert!(matches!(err, AuthServiceError::Config(_)), "{err:?}");
    assert!(records.lock().unwrap().contains_key(&phone()));
}

#[tokio::test]
async fn should_report_vendor_failure_and_keep_challenge() {
    let store = MockOtpRepo::empty();
    let records = store.records_handle();
    let usecase = request_usecase(
        store,
        MockRequestLog::empty(),
        MockSms::new(SmsMode::Reject),
        None,
    );

    let err = usecase.execute(input(TEST_PHONE)).await.unwrap_err();

    assert!(matches!(err, AuthServiceError::SmsDelivery(_)), "{err:?}");
    assert!(records.lock().unwrap().contains_key(&phone()));
}

#[tokio::test]
async fn should_not_issue_code_once_rate_limited() {
    let store = MockOtpRepo::empty();
    let records = store.records_handle();
    let sms = MockSms::new(SmsMode::Deliver);
    let sent = sms.sent_handle();
    let usecase = request_usecase(store, MockRequestLog::empty(), sms, None);

    for _ in 0..5 {
        usecase.execute(input(TEST_PHONE)).await.unwrap();
    }
    let before = records.lock().unwrap()[&phone()].code_hash.clone();

    let err = usecase.execute(input(TEST_PHONE)).await.unwrap_err();

    assert!(
        matches!(err, AuthServiceError::RateLimitExceeded { remaining: 0, .. }),
        "{err:?}"
    );
    assert_eq!(records.lock().unwrap()[&phone()].code_hash, before);
    assert_eq!(sent.lock().unwrap().len(), 5);
}

// ── VerifyOtpUseCase ─────────────────────────────────────────────────────────

fn verify_usecase(store: MockOtpRepo, users: MockUserRepo) -> VerifyOtpUseCase<MockOtpRepo, MockUserRepo> {
    VerifyOtpUseCase {
        otp: otp_manager(store, None),
        users,
        issuer: issuer(),
    }
}

async fn issue_code(store: &MockOtpRepo) -> String {
    otp_manager(store.clone(), None)
        .request_otp(&phone())
        .await
        .unwrap()
        .code
}

#[tokio::test]
async fn should_provision_unknown_phone_as_user() {
    let store = MockOtpRepo::empty();
    let users = MockUserRepo::empty();
    let users_handle = users.users_handle();
    let code = issue_code(&store).await;

    let output = verify_usecase(store, users)
        .execute(VerifyOtpInput {
            phone: "0912 123 4567".to_owned(),
            code,
        })
        .await
        .unwrap();

    assert!(output.is_new_user);
    assert_eq!(output.user.role, UserRole::User);
    assert!(output.user.is_active);

    let stored = users_handle.lock().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].phone, phone());
    assert!(stored[0].last_login_at.is_some());

    let info = validate_access_token(&output.tokens.access_token, TEST_ACCESS_SECRET).unwrap();
    assert_eq!(info.user_id, output.user.id);
    assert_eq!(info.role, UserRole::User);
}

#[tokio::test]
async fn should_log_in_existing_user_with_their_role() {
    let store = MockOtpRepo::empty();
    let existing = test_user(UserRole::Manager);
    let users = MockUserRepo::new(vec![existing.clone()]);
    let code = issue_code(&store).await;

    let output = verify_usecase(store, users)
        .execute(VerifyOtpInput {
            phone: TEST_PHONE.to_owned(),
            code,
        })
        .await
        .unwrap();

    assert!(!output.is_new_user);
    assert_eq!(output.user.id, existing.id);
    let info = validate_access_token(&output.tokens.access_token, TEST_ACCESS_SECRET).unwrap();
    assert_eq!(info.role, UserRole::Manager);
}

#[tokio::test]
async fn should_refuse_inactive_user() {
    let store = MockOtpRepo::empty();
    let mut inactive = test_user(UserRole::Marketer);
    inactive.is_active = false;
    let code = issue_code(&store).await;

    let err = verify_usecase(store, MockUserRepo::new(vec![inactive]))
        .execute(VerifyOtpInput {
            phone: TEST_PHONE.to_owned(),
            code,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, AuthServiceError::UserNotFoundOrInactive), "{err:?}");
}

#[tokio::test]
async fn should_reject_malformed_code_without_counting_attempt() {
    let store = MockOtpRepo::empty();
    let records = store.records_handle();
    issue_code(&store).await;

    let err = verify_usecase(store, MockUserRepo::empty())
        .execute(VerifyOtpInput {
            phone: TEST_PHONE.to_owned(),
            code: "12a4".to_owned(),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, AuthServiceError::Validation(_)), "{err:?}");
    assert_eq!(records.lock().unwrap()[&phone()].attempts, 0);
}
