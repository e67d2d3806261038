mod common;

use common::{gatehouse, register_verified};

use gatehouse::flows::{ExternalIdentity, SettingsInput, SettingsOutcome};
use gatehouse::UserId;

const EMAIL: &str = "alice@example.com";
const PASSWORD: &str = "correct horse battery staple";

fn identity() -> ExternalIdentity {
    ExternalIdentity {
        provider: "github".to_string(),
        subject: "1234567".to_string(),
        email: EMAIL.to_string(),
        name: Some("Alice".to_string()),
        image: Some("https://avatars.example.com/alice".to_string()),
    }
}

#[tokio::test]
async fn test_oauth_sign_in_creates_verified_account() {
    let (gatehouse, _) = gatehouse().await;

    let session = gatehouse.oauth_sign_in(identity(), None).await.unwrap();
    let claims = gatehouse.verify_session(&session.token).await.unwrap();
    assert_eq!(claims.email, EMAIL);
    assert!(claims.is_oauth);
    // The provider asserted the address, so it arrives verified
    assert!(claims.email_verified);

    let user = gatehouse
        .get_user(&UserId::from(claims.sub.as_str()))
        .await
        .unwrap()
        .unwrap();
    assert!(user.is_email_verified());
    assert!(!user.has_password());
    assert_eq!(user.name.as_deref(), Some("Alice"));
}

#[tokio::test]
async fn test_oauth_sign_in_is_idempotent_per_subject() {
    let (gatehouse, _) = gatehouse().await;

    let first = gatehouse.oauth_sign_in(identity(), None).await.unwrap();
    let second = gatehouse.oauth_sign_in(identity(), None).await.unwrap();

    let a = gatehouse.verify_session(&first.token).await.unwrap();
    let b = gatehouse.verify_session(&second.token).await.unwrap();
    assert_eq!(a.sub, b.sub);
}

#[tokio::test]
async fn test_oauth_links_to_existing_credentials_account() {
    let (gatehouse, _) = gatehouse().await;
    let user = register_verified(&gatehouse, EMAIL, PASSWORD).await;

    let session = gatehouse.oauth_sign_in(identity(), None).await.unwrap();
    let claims = gatehouse.verify_session(&session.token).await.unwrap();
    assert_eq!(claims.sub, user.id.as_str());
}

#[tokio::test]
async fn test_oauth_account_cannot_change_email_or_password() {
    let (gatehouse, mailer) = gatehouse().await;

    let session = gatehouse.oauth_sign_in(identity(), None).await.unwrap();
    let claims = gatehouse.verify_session(&session.token).await.unwrap();
    let user_id = UserId::from(claims.sub.as_str());

    // Credential fields are dropped for provider-managed accounts
    let outcome = gatehouse
        .update_settings(
            &user_id,
            SettingsInput {
                email: Some("elsewhere@example.com".to_string()),
                password: Some(PASSWORD.to_string()),
                new_password: Some("a different long passphrase".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome, SettingsOutcome::NoChangesRequired);
    assert!(mailer.sent().is_empty());

    let user = gatehouse.get_user(&user_id).await.unwrap().unwrap();
    assert_eq!(user.email, EMAIL);
}
