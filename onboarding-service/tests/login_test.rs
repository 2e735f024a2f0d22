mod common;

use common::TestApp;
use onboarding_service::services::ServiceError;
use onboarding_service::utils::Password;
use uuid::Uuid;

async fn app_with_account() -> (TestApp, Uuid) {
    let app = TestApp::new();
    let created = app
        .onboarding
        .create_account("a@x.com", &Password::new("password123"), "Ana Ruiz")
        .await
        .expect("seed account");
    (app, created.user.user_id)
}

#[tokio::test]
async fn login_with_correct_secret_issues_token_for_account() {
    let (app, user_id) = app_with_account().await;

    let token = app
        .accounts
        .login("a@x.com", &Password::new("password123"))
        .await
        .expect("login");

    assert_eq!(
        app.credentials.validate_token(&token).unwrap(),
        user_id.to_string()
    );
}

#[tokio::test]
async fn unknown_email_and_wrong_secret_are_indistinguishable() {
    let (app, _) = app_with_account().await;

    let wrong_secret = app
        .accounts
        .login("a@x.com", &Password::new("not-the-password"))
        .await
        .unwrap_err();
    let unknown_email = app
        .accounts
        .login("nobody@x.com", &Password::new("password123"))
        .await
        .unwrap_err();

    assert!(matches!(wrong_secret, ServiceError::InvalidCredentials));
    assert!(matches!(unknown_email, ServiceError::InvalidCredentials));
    assert_eq!(wrong_secret.to_string(), unknown_email.to_string());
    assert_eq!(wrong_secret.status_code(), unknown_email.status_code());
}

#[tokio::test]
async fn login_email_match_is_exact() {
    let (app, _) = app_with_account().await;

    let err = app
        .accounts
        .login("A@X.COM", &Password::new("password123"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidCredentials));
}

#[tokio::test]
async fn login_reports_store_outage() {
    let (app, _) = app_with_account().await;
    app.store.set_unavailable(true);

    let err = app
        .accounts
        .login("a@x.com", &Password::new("password123"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Store(_)));
}

#[tokio::test]
async fn get_account_returns_projection() {
    let (app, user_id) = app_with_account().await;

    let account = app.accounts.get_account(user_id).await.unwrap();
    assert_eq!(account.user_id, user_id);
    assert_eq!(account.email, "a@x.com");
    assert_eq!(account.display_name, "Ana Ruiz");
}

#[tokio::test]
async fn get_account_for_unknown_id_is_not_found() {
    let (app, _) = app_with_account().await;

    let err = app.accounts.get_account(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, ServiceError::AccountNotFound));
}

#[tokio::test]
async fn tokens_from_other_secrets_are_rejected() {
    let (app, user_id) = app_with_account().await;

    let foreign = onboarding_service::services::CredentialService::new(
        &onboarding_service::config::JwtConfig {
            secret: secrecy::Secret::new("some-other-secret".to_string()),
            token_ttl_minutes: 60,
        },
    )
    .unwrap();
    let token = foreign.issue_token(&user_id.to_string()).unwrap();

    assert!(matches!(
        app.credentials.validate_token(&token),
        Err(ServiceError::InvalidToken)
    ));
}

#[tokio::test]
async fn expired_tokens_are_rejected() {
    let expired = common::credentials_with_ttl(-5);
    let token = expired.issue_token(&Uuid::new_v4().to_string()).unwrap();

    assert!(matches!(
        common::credentials().validate_token(&token),
        Err(ServiceError::InvalidToken)
    ));
}
