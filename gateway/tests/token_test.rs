//! Magic-link issuance and redemption semantics.

mod support;

use chrono::Utc;

use paygate::config::TokenReuse;
use paygate::domain::services::token_codec;
use paygate::{CreateIntentRequest, PayError};

use support::{TestGateway, SECRET};

fn intent_request() -> CreateIntentRequest {
    CreateIntentRequest {
        amount_sats: 50_000,
        required_confs: Some(1),
        expires_in_minutes: Some(60),
        email: None,
        customer_id: None,
        memo: None,
    }
}

#[tokio::test]
async fn replay_before_expiry_is_idempotent() {
    let gw = TestGateway::new().await;
    let intent = gw.service.create_intent(intent_request()).await.unwrap();
    let issued = gw.service.issue_token(intent.id, Some(3600)).await.unwrap();

    let first = gw.service.redeem_token(&issued.token).await.unwrap();
    assert_eq!(first, intent.id);

    let row = gw
        .repos
        .tokens
        .find_by_token(&issued.token)
        .await
        .unwrap()
        .unwrap();
    assert!(row.consumed);
    let consumed_at = row.consumed_at.expect("consumed_at set on first redeem");

    // replay succeeds and leaves consumed_at untouched
    let second = gw.service.redeem_token(&issued.token).await.unwrap();
    assert_eq!(second, intent.id);
    let row = gw
        .repos
        .tokens
        .find_by_token(&issued.token)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.consumed_at, Some(consumed_at));
}

#[tokio::test]
async fn redemption_after_expiry_is_rejected() {
    let gw = TestGateway::new().await;
    let intent = gw.service.create_intent(intent_request()).await.unwrap();
    let issued = gw.service.issue_token(intent.id, Some(1)).await.unwrap();

    gw.service.redeem_token(&issued.token).await.unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(1_200)).await;
    let err = gw.service.redeem_token(&issued.token).await.unwrap_err();
    assert!(matches!(err, PayError::Expired(_)), "got {err:?}");
}

#[tokio::test]
async fn tampered_token_is_rejected() {
    let gw = TestGateway::new().await;
    let intent = gw.service.create_intent(intent_request()).await.unwrap();
    let issued = gw.service.issue_token(intent.id, Some(3600)).await.unwrap();

    let mut forged = issued.token.clone();
    let last = forged.pop().unwrap();
    forged.push(if last == 'A' { 'B' } else { 'A' });

    let err = gw.service.redeem_token(&forged).await.unwrap_err();
    assert!(matches!(err, PayError::Auth(_)), "got {err:?}");
}

#[tokio::test]
async fn foreign_secret_token_is_rejected() {
    let gw = TestGateway::new().await;
    let intent = gw.service.create_intent(intent_request()).await.unwrap();

    let foreign = token_codec::issue(intent.id, "a-different-but-equally-long-secret!", 3600, Utc::now());
    let err = gw.service.redeem_token(&foreign).await.unwrap_err();
    assert!(matches!(err, PayError::Auth(_)), "got {err:?}");
}

#[tokio::test]
async fn valid_signature_without_row_is_not_found() {
    let gw = TestGateway::new().await;
    let intent = gw.service.create_intent(intent_request()).await.unwrap();

    // signed with the live secret but never persisted: rotated-secret or
    // forgery territory
    let ghost = token_codec::issue(intent.id, SECRET, 3600, Utc::now());
    let err = gw.service.redeem_token(&ghost).await.unwrap_err();
    assert!(matches!(err, PayError::NotFound(_)), "got {err:?}");
}

#[tokio::test]
async fn single_use_mode_blocks_replay() {
    let gw = TestGateway::with_config(|config| {
        config.advanced.token_reuse = TokenReuse::SingleUse;
    })
    .await;
    let intent = gw.service.create_intent(intent_request()).await.unwrap();
    let issued = gw.service.issue_token(intent.id, Some(3600)).await.unwrap();

    gw.service.redeem_token(&issued.token).await.unwrap();
    let err = gw.service.redeem_token(&issued.token).await.unwrap_err();
    assert!(matches!(err, PayError::Expired(_)), "got {err:?}");
}

#[tokio::test]
async fn no_magic_link_for_dead_intents() {
    let gw = TestGateway::new().await;
    let intent = gw.service.create_intent(intent_request()).await.unwrap();

    // expire it
    {
        use paygate::infrastructure::persistence::entities::payment_intents;
        use sea_orm::{ActiveModelTrait, Set};
        let row = gw.repos.intents.find(intent.id).await.unwrap().unwrap();
        let mut active: payment_intents::ActiveModel = row.into();
        active.status = Set("expired".to_string());
        active.update(gw.pool.get_connection()).await.unwrap();
    }

    let err = gw.service.issue_token(intent.id, None).await.unwrap_err();
    assert!(matches!(err, PayError::InvalidState(_)), "got {err:?}");
}
