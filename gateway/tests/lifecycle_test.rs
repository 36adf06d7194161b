//! End-to-end intent lifecycle against in-memory storage and a scripted
//! chain backend.

mod support;

use paygate::config::{MatchMode, Network};
use paygate::domain::services::descriptor::DescriptorEngine;
use paygate::infrastructure::bitcoin::{ChainTx, ChainTxOut};
use paygate::CreateIntentRequest;

use support::{descriptor, test_txid, TestGateway};

fn intent_request(amount_sats: i64) -> CreateIntentRequest {
    CreateIntentRequest {
        amount_sats,
        required_confs: Some(1),
        expires_in_minutes: Some(60),
        email: None,
        customer_id: None,
        memo: None,
    }
}

#[tokio::test]
async fn happy_path_single_confirmation() {
    let gw = TestGateway::new().await;

    let intent = gw.service.create_intent(intent_request(50_000)).await.unwrap();
    assert_eq!(intent.status, "pending");
    assert_eq!(gw.events.count(&format!("created:{}", intent.id)), 1);

    let issued = gw.service.issue_token(intent.id, Some(24 * 3600)).await.unwrap();
    assert!(issued.url.contains("/api/pay/pay/"));

    // redeeming the link reveals the first derived address
    let details = gw.service.redeem_magic_link(&issued.token).await.unwrap();
    let engine = DescriptorEngine::parse(&descriptor(), Network::Regtest).unwrap();
    assert_eq!(details.address, engine.derive(0).unwrap().address);
    assert_eq!(
        details.bip21,
        format!("bitcoin:{}?amount=0.00050000", details.address)
    );

    // one output meeting the amount at required confirmations
    let txid = test_txid(0xa1);
    let script = gw.script_of(&details.address).await;
    gw.chain
        .put_tx(gw.payment_tx(&txid, &details.address, &script, 50_000, 1));
    gw.service.process_incoming_tx(&txid).await.unwrap();

    let status = gw.service.get_status(intent.id).await.unwrap();
    assert_eq!(status.status, "confirmed");
    assert_eq!(status.confs, 1);
    assert_eq!(status.txid.as_deref(), Some(txid.as_str()));
    assert_eq!(status.value_sats, Some(50_000));
    assert!(status.confirmed_at.is_some());

    // pending → confirmed in one step: no processing event
    assert_eq!(gw.events.count(&format!("confirmed:{}", intent.id)), 1);
    assert_eq!(gw.events.count(&format!("processing:{}", intent.id)), 0);
}

#[tokio::test]
async fn mempool_sighting_then_confirmation() {
    let gw = TestGateway::new().await;

    let intent = gw.service.create_intent(intent_request(50_000)).await.unwrap();
    let details = gw.service.ensure_assigned(intent.id).await.unwrap();
    let script = gw.script_of(&details.address).await;
    let txid = test_txid(0xb2);

    gw.chain
        .put_tx(gw.payment_tx(&txid, &details.address, &script, 50_000, 0));
    gw.service.process_incoming_tx(&txid).await.unwrap();
    assert_eq!(
        gw.service.get_status(intent.id).await.unwrap().status,
        "processing"
    );

    gw.chain
        .put_tx(gw.payment_tx(&txid, &details.address, &script, 50_000, 1));
    gw.service.process_incoming_tx(&txid).await.unwrap();
    assert_eq!(
        gw.service.get_status(intent.id).await.unwrap().status,
        "confirmed"
    );

    assert_eq!(
        gw.events.all(),
        vec![
            format!("created:{}", intent.id),
            format!("processing:{}", intent.id),
            format!("confirmed:{}", intent.id),
        ]
    );
}

#[tokio::test]
async fn replayed_observations_emit_once() {
    let gw = TestGateway::new().await;

    let intent = gw.service.create_intent(intent_request(50_000)).await.unwrap();
    let details = gw.service.ensure_assigned(intent.id).await.unwrap();
    let script = gw.script_of(&details.address).await;
    let txid = test_txid(0xc3);

    gw.chain
        .put_tx(gw.payment_tx(&txid, &details.address, &script, 50_000, 1));
    for _ in 0..3 {
        gw.service.process_incoming_tx(&txid).await.unwrap();
    }

    assert_eq!(gw.events.count(&format!("confirmed:{}", intent.id)), 1);
    assert_eq!(gw.events.count(&format!("processing:{}", intent.id)), 0);

    // one row, in place
    let rows = gw.repos.observations.find_by_txid(&txid).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].confirmations, 1);
    assert_eq!(rows[0].status, "confirmed");
}

#[tokio::test]
async fn under_payment_stays_processing() {
    let gw = TestGateway::new().await;

    let intent = gw.service.create_intent(intent_request(50_000)).await.unwrap();
    let details = gw.service.ensure_assigned(intent.id).await.unwrap();
    let script = gw.script_of(&details.address).await;

    // deeply confirmed but short of the amount
    let low = test_txid(0xd4);
    gw.chain
        .put_tx(gw.payment_tx(&low, &details.address, &script, 40_000, 6));
    gw.service.process_incoming_tx(&low).await.unwrap();
    assert_eq!(
        gw.service.get_status(intent.id).await.unwrap().status,
        "processing"
    );

    // a second independent under-payment does not combine with the first
    let low2 = test_txid(0xd5);
    gw.chain
        .put_tx(gw.payment_tx(&low2, &details.address, &script, 10_000, 1));
    gw.service.process_incoming_tx(&low2).await.unwrap();

    let status = gw.service.get_status(intent.id).await.unwrap();
    assert_eq!(status.status, "processing");
    assert_eq!(gw.events.count(&format!("confirmed:{}", intent.id)), 0);

    // both outputs tracked independently
    assert_eq!(gw.repos.observations.find_by_txid(&low).await.unwrap().len(), 1);
    assert_eq!(gw.repos.observations.find_by_txid(&low2).await.unwrap().len(), 1);
}

#[tokio::test]
async fn sum_mode_combines_outputs_of_one_tx() {
    fn split_payment(address: &str, script: &str) -> ChainTx {
        ChainTx {
            txid: test_txid(0xe5),
            confirmations: 1,
            outputs: vec![
                ChainTxOut {
                    vout: 0,
                    value_sats: 30_000,
                    address: Some(address.to_string()),
                    script_pubkey_hex: script.to_string(),
                },
                ChainTxOut {
                    vout: 1,
                    value_sats: 25_000,
                    address: Some(address.to_string()),
                    script_pubkey_hex: script.to_string(),
                },
            ],
        }
    }

    // default mode: neither output alone meets 50k
    let gw = TestGateway::new().await;
    let intent = gw.service.create_intent(intent_request(50_000)).await.unwrap();
    let details = gw.service.ensure_assigned(intent.id).await.unwrap();
    let script = gw.script_of(&details.address).await;
    gw.chain.put_tx(split_payment(&details.address, &script));
    gw.service.process_incoming_tx(&test_txid(0xe5)).await.unwrap();
    assert_eq!(
        gw.service.get_status(intent.id).await.unwrap().status,
        "processing"
    );

    // sum mode: 30k + 25k ≥ 50k confirms
    let gw = TestGateway::with_config(|config| {
        config.advanced.match_mode = MatchMode::SumOfOutputsMeets;
    })
    .await;
    let intent = gw.service.create_intent(intent_request(50_000)).await.unwrap();
    let details = gw.service.ensure_assigned(intent.id).await.unwrap();
    let script = gw.script_of(&details.address).await;
    gw.chain.put_tx(split_payment(&details.address, &script));
    gw.service.process_incoming_tx(&test_txid(0xe5)).await.unwrap();
    assert_eq!(
        gw.service.get_status(intent.id).await.unwrap().status,
        "confirmed"
    );
}
