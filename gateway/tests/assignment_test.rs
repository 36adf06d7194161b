//! Address derivation, assignment discipline, and watcher lifecycle.

mod support;

use paygate::config::Network;
use paygate::domain::services::descriptor::DescriptorEngine;
use paygate::{CreateIntentRequest, PayError};

use support::{descriptor, test_txid, TestGateway};

fn intent_request() -> CreateIntentRequest {
    CreateIntentRequest {
        amount_sats: 25_000,
        required_confs: Some(1),
        expires_in_minutes: Some(60),
        email: None,
        customer_id: None,
        memo: None,
    }
}

#[tokio::test]
async fn assigned_indices_form_a_gap_free_prefix() {
    let gw = TestGateway::new().await;
    let engine = DescriptorEngine::parse(&descriptor(), Network::Regtest).unwrap();

    for expected_index in 0..5u32 {
        let intent = gw.service.create_intent(intent_request()).await.unwrap();
        let details = gw.service.ensure_assigned(intent.id).await.unwrap();
        assert_eq!(
            details.address,
            engine.derive(expected_index).unwrap().address
        );

        let row = gw
            .repos
            .addresses
            .find_by_address(&details.address)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.derivation_index, expected_index as i32);
    }

    assert_eq!(
        gw.repos.addresses.max_derivation_index().await.unwrap(),
        Some(4)
    );
}

#[tokio::test]
async fn assignment_is_idempotent_and_bidirectional() {
    let gw = TestGateway::new().await;
    let intent = gw.service.create_intent(intent_request()).await.unwrap();

    let first = gw.service.ensure_assigned(intent.id).await.unwrap();
    let second = gw.service.ensure_assigned(intent.id).await.unwrap();
    assert_eq!(first.address, second.address);

    // address row points at the intent, intent row points back
    let address_row = gw
        .repos
        .addresses
        .find_by_address(&first.address)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(address_row.intent_id, Some(intent.id));
    assert!(address_row.assigned_at.is_some());

    let intent_row = gw.repos.intents.find(intent.id).await.unwrap().unwrap();
    assert_eq!(intent_row.address_id, Some(address_row.id));
}

#[tokio::test]
async fn warm_pool_respects_gap_limit_and_feeds_assignment() {
    let gw = TestGateway::with_config(|config| {
        config.advanced.gap_limit = 5;
    })
    .await;

    let created = gw.service.warm_address_pool().await.unwrap();
    assert_eq!(created, 5);
    assert_eq!(gw.repos.addresses.count_unassigned().await.unwrap(), 5);

    // warming again is a no-op
    assert_eq!(gw.service.warm_address_pool().await.unwrap(), 0);

    // assignment drains from the lowest index of the pool
    let engine = DescriptorEngine::parse(&descriptor(), Network::Regtest).unwrap();
    let intent = gw.service.create_intent(intent_request()).await.unwrap();
    let details = gw.service.ensure_assigned(intent.id).await.unwrap();
    assert_eq!(details.address, engine.derive(0).unwrap().address);
    assert_eq!(gw.repos.addresses.count_unassigned().await.unwrap(), 4);

    // topping back up continues past the assigned prefix
    assert_eq!(gw.service.warm_address_pool().await.unwrap(), 1);
    assert_eq!(
        gw.repos.addresses.max_derivation_index().await.unwrap(),
        Some(5)
    );
}

#[tokio::test]
async fn watcher_lifecycle_start_stop_restart() {
    let gw = TestGateway::new().await;
    assert!(!gw.service.watcher_running().await);

    // forced scans need a live watcher
    let intent = gw.service.create_intent(intent_request()).await.unwrap();
    let err = gw.service.scan_for_payments(intent.id).await.unwrap_err();
    assert!(matches!(err, PayError::Transient(_)), "got {err:?}");

    gw.service.start_watcher().await.unwrap();
    assert!(gw.service.watcher_running().await);

    let err = gw.service.start_watcher().await.unwrap_err();
    assert!(matches!(err, PayError::InvalidState(_)), "got {err:?}");

    // a forced scan now reaches the scripted chain
    let details = gw.service.ensure_assigned(intent.id).await.unwrap();
    let script = gw.script_of(&details.address).await;
    let txid = test_txid(0x44);
    gw.chain
        .put_tx(gw.payment_tx(&txid, &details.address, &script, 25_000, 1));
    gw.service.scan_for_payments(intent.id).await.unwrap();
    assert_eq!(
        gw.service.get_status(intent.id).await.unwrap().status,
        "confirmed"
    );

    gw.service.stop_watcher().await;
    assert!(!gw.service.watcher_running().await);

    // a second start after stop is allowed
    gw.service.start_watcher().await.unwrap();
    assert!(gw.service.watcher_running().await);
    gw.service.stop_watcher().await;
}

#[tokio::test]
async fn customers_are_upserted_from_intent_fields() {
    let gw = TestGateway::new().await;

    let mut request = intent_request();
    request.email = Some("merchant@example.com".to_string());
    request.customer_id = Some("cust-42".to_string());
    let first = gw.service.create_intent(request.clone()).await.unwrap();
    let second = gw.service.create_intent(request).await.unwrap();

    // both intents share one customer row
    assert!(first.customer_id.is_some());
    assert_eq!(first.customer_id, second.customer_id);
}
