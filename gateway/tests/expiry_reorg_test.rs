//! Expiry sweep and reorg recovery.

mod support;

use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, Set};

use paygate::domain::models::{DeltaSource, ObservationDelta, ObservationStatus};
use paygate::infrastructure::persistence::entities::payment_intents;
use paygate::{CreateIntentRequest, PayError};

use support::{test_txid, TestGateway};

fn intent_request(expires_in_minutes: i64) -> CreateIntentRequest {
    CreateIntentRequest {
        amount_sats: 50_000,
        required_confs: Some(1),
        expires_in_minutes: Some(expires_in_minutes),
        email: None,
        customer_id: None,
        memo: None,
    }
}

/// Backdate an intent's deadline so the sweep sees it as due.
async fn rewind_expiry(gw: &TestGateway, intent_id: i64) {
    let intent = gw.repos.intents.find(intent_id).await.unwrap().unwrap();
    let mut active: payment_intents::ActiveModel = intent.into();
    active.expires_at = Set(Utc::now() - Duration::seconds(70));
    active.update(gw.pool.get_connection()).await.unwrap();
}

#[tokio::test]
async fn sweep_expires_pending_intent() {
    let gw = TestGateway::new().await;

    let intent = gw.service.create_intent(intent_request(1)).await.unwrap();
    rewind_expiry(&gw, intent.id).await;

    gw.service.sweep_expired().await;

    assert_eq!(
        gw.service.get_status(intent.id).await.unwrap().status,
        "expired"
    );
    assert_eq!(gw.events.count(&format!("expired:{}", intent.id)), 1);

    // sweeping again changes nothing
    gw.service.sweep_expired().await;
    assert_eq!(gw.events.count(&format!("expired:{}", intent.id)), 1);

    // a dead intent takes no address
    let err = gw.service.ensure_assigned(intent.id).await.unwrap_err();
    assert!(matches!(err, PayError::InvalidState(_)));
}

#[tokio::test]
async fn sweep_spares_intents_with_a_sighting() {
    let gw = TestGateway::new().await;

    let intent = gw.service.create_intent(intent_request(1)).await.unwrap();
    let details = gw.service.ensure_assigned(intent.id).await.unwrap();
    let address_row = gw
        .repos
        .addresses
        .find_by_address(&details.address)
        .await
        .unwrap()
        .unwrap();

    // write the observation row directly, leaving the intent pending
    let delta = ObservationDelta {
        txid: test_txid(0x11),
        vout: 0,
        value_sats: 50_000,
        confirmations: 0,
        seen_at: Utc::now(),
        source: DeltaSource::Manual,
    };
    gw.repos
        .observations
        .upsert(
            address_row.id,
            &address_row.script_pubkey_hex,
            &delta,
            ObservationStatus::Mempool,
        )
        .await
        .unwrap();

    rewind_expiry(&gw, intent.id).await;
    gw.service.sweep_expired().await;

    // still pending: an observed intent is never expired by the sweep
    assert_eq!(
        gw.service.get_status(intent.id).await.unwrap().status,
        "pending"
    );
    assert_eq!(gw.events.count(&format!("expired:{}", intent.id)), 0);
}

#[tokio::test]
async fn reorg_demotes_and_reconfirms() {
    let gw = TestGateway::new().await;

    let intent = gw.service.create_intent(intent_request(60)).await.unwrap();
    let details = gw.service.ensure_assigned(intent.id).await.unwrap();
    let script = gw.script_of(&details.address).await;
    let txid = test_txid(0x22);

    gw.chain
        .put_tx(gw.payment_tx(&txid, &details.address, &script, 50_000, 1));
    gw.service.process_incoming_tx(&txid).await.unwrap();
    assert_eq!(
        gw.service.get_status(intent.id).await.unwrap().status,
        "confirmed"
    );

    // the chain forgets the transaction
    gw.chain.remove_tx(&txid);
    gw.service.process_incoming_tx(&txid).await.unwrap();

    let status = gw.service.get_status(intent.id).await.unwrap();
    assert_eq!(status.status, "processing");
    assert_eq!(status.confirmed_at, None);
    assert_eq!(status.confs, 0);
    assert_eq!(gw.events.count(&format!("reorg:{}", intent.id)), 1);

    // the observation row is kept, demoted in place
    let rows = gw.repos.observations.find_by_txid(&txid).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, "mempool");
    assert_eq!(rows[0].confirmations, 0);

    // still missing on a second look: no duplicate reorg event
    gw.service.process_incoming_tx(&txid).await.unwrap();
    assert_eq!(gw.events.count(&format!("reorg:{}", intent.id)), 1);

    // the replacement block confirms it again
    gw.chain
        .put_tx(gw.payment_tx(&txid, &details.address, &script, 50_000, 1));
    gw.service.process_incoming_tx(&txid).await.unwrap();

    let status = gw.service.get_status(intent.id).await.unwrap();
    assert_eq!(status.status, "confirmed");
    assert!(status.confirmed_at.is_some());
    assert_eq!(gw.events.count(&format!("confirmed:{}", intent.id)), 2);
    assert_eq!(gw.events.count(&format!("reorg:{}", intent.id)), 1);
}

#[tokio::test]
async fn pending_poll_discovers_payment_by_address() {
    let gw = TestGateway::new().await;

    let intent = gw.service.create_intent(intent_request(60)).await.unwrap();
    let details = gw.service.ensure_assigned(intent.id).await.unwrap();
    let script = gw.script_of(&details.address).await;
    let txid = test_txid(0x33);

    // the push path missed this tx; only the poll can find it
    gw.chain
        .put_tx(gw.payment_tx(&txid, &details.address, &script, 50_000, 1));
    gw.service.poll_pending().await;

    let status = gw.service.get_status(intent.id).await.unwrap();
    assert_eq!(status.status, "confirmed");
    assert_eq!(status.txid.as_deref(), Some(txid.as_str()));
}
