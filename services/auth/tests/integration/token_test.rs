use std::collections::HashSet;

use jsonwebtoken::{EncodingKey, Header, encode};
use uuid::Uuid;

use crm_auth::error::AuthServiceError;
use crm_auth::usecase::token::{LogoutUseCase, RefreshTokenUseCase};
use crm_auth_types::token::{RefreshClaims, TokenType, validate_access_token};
use crm_domain::user::UserRole;

use crate::helpers::{
    MockUserRepo, TEST_ACCESS_SECRET, TEST_PHONE, TEST_REFRESH_SECRET, issuer, test_user,
};

fn refresh_usecase(users: MockUserRepo) -> RefreshTokenUseCase<MockUserRepo> {
    RefreshTokenUseCase {
        users,
        issuer: issuer(),
    }
}

#[tokio::test]
async fn should_rotate_session_on_every_refresh() {
    let user = test_user(UserRole::Marketer);
    let usecase = refresh_usecase(MockUserRepo::new(vec![user.clone()]));
    let initial = issuer().mint(&user).unwrap();

    let mut sessions = HashSet::from([initial.session_id]);
    let mut token = initial.refresh_token;
    for _ in 0..3 {
        let output = usecase.execute(&token).await.unwrap();
        assert_eq!(output.user.id, user.id);
        assert!(sessions.insert(output.tokens.session_id), "session id reused");
        token = output.tokens.refresh_token;
    }
}

#[tokio::test]
async fn should_reflect_role_change_at_refresh() {
    let mut user = test_user(UserRole::Marketer);
    let pair = issuer().mint(&user).unwrap();
    user.role = UserRole::Manager;
    let usecase = refresh_usecase(MockUserRepo::new(vec![user]));

    let output = usecase.execute(&pair.refresh_token).await.unwrap();

    let info = validate_access_token(&output.tokens.access_token, TEST_ACCESS_SECRET).unwrap();
    assert_eq!(info.role, UserRole::Manager);
}

#[tokio::test]
async fn should_report_expired_refresh_token() {
    let user = test_user(UserRole::User);
    let claims = RefreshClaims {
        sub: user.id.to_string(),
        phone: TEST_PHONE.to_owned(),
        token_type: TokenType::Refresh,
        sid: Uuid::new_v4().to_string(),
        iat: 1_000,
        exp: 1_000 + 604_800,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_REFRESH_SECRET.as_bytes()),
    )
    .unwrap();

    let err = refresh_usecase(MockUserRepo::new(vec![user]))
        .execute(&token)
        .await
        .unwrap_err();

    assert!(matches!(err, AuthServiceError::TokenExpired), "{err:?}");
}

#[tokio::test]
async fn should_reject_access_token_presented_for_refresh() {
    let user = test_user(UserRole::Admin);
    let pair = issuer().mint(&user).unwrap();

    let err = refresh_usecase(MockUserRepo::new(vec![user]))
        .execute(&pair.access_token)
        .await
        .unwrap_err();

    assert!(matches!(err, AuthServiceError::InvalidToken), "{err:?}");
}

#[tokio::test]
async fn should_reject_garbage_refresh_token() {
    let err = refresh_usecase(MockUserRepo::empty())
        .execute("not-a-jwt")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthServiceError::InvalidToken), "{err:?}");
}

#[tokio::test]
async fn should_refuse_refresh_for_deactivated_user() {
    let mut user = test_user(UserRole::Marketer);
    let pair = issuer().mint(&user).unwrap();
    user.is_active = false;

    let err = refresh_usecase(MockUserRepo::new(vec![user]))
        .execute(&pair.refresh_token)
        .await
        .unwrap_err();

    assert!(matches!(err, AuthServiceError::UserNotFoundOrInactive), "{err:?}");
}

#[tokio::test]
async fn should_refuse_refresh_for_unknown_user() {
    let pair = issuer().mint(&test_user(UserRole::User)).unwrap();

    let err = refresh_usecase(MockUserRepo::empty())
        .execute(&pair.refresh_token)
        .await
        .unwrap_err();

    assert!(matches!(err, AuthServiceError::UserNotFoundOrInactive), "{err:?}");
}

#[test]
fn should_accept_any_logout_input() {
    let usecase = LogoutUseCase { issuer: issuer() };
    let pair = issuer().mint(&test_user(UserRole::User)).unwrap();

    usecase.execute(Some(&pair.refresh_token));
    usecase.execute(Some("garbage"));
    usecase.execute(None);
}
