//! Outbound gateway over the shipped registry with a mock client

mod common;

use aps_gateway::config::{BufferSettings, default_priority_map};
use aps_gateway::messages::{FtsCommand, OrderType, WorkpieceColor};
use aps_gateway::mqtt::{BuildRequest, MessageKind, SendOptions};
use serde_json::json;
use uuid::Uuid;

/// CCU order request for a red workpiece: the seed CCU scenario
#[tokio::test]
async fn ccu_order_request_for_red_workpiece() {
    let (gateway, client) = common::mock_gateway().await;
    client
        .subscribe_many(&["ccu/order/request".to_string()], 1)
        .await
        .unwrap();

    let report = gateway
        .send(
            &BuildRequest::CcuOrder {
                color: WorkpieceColor::Red,
                order_type: OrderType::Production,
                workpiece_id: None,
                ai_inspection: None,
            },
            &SendOptions::default(),
        )
        .await
        .unwrap();

    assert!(report.published);
    assert_eq!(report.topic, "ccu/order/request");
    assert_eq!(report.qos, 1, "registry declares qos 1");
    assert!(report.findings.is_empty());

    let buffered = client.buffer_snapshot("ccu/order/request");
    let payload = buffered[0].payload.as_json().unwrap();
    assert_eq!(payload["type"], "RED");
    assert_eq!(payload["orderType"], "PRODUCTION");
    assert!(payload["timestamp"].as_str().unwrap().ends_with('Z'));
}

/// FTS dock instant action: the seed instant-action scenario
#[tokio::test]
async fn fts_dock_instant_action() {
    let (gateway, client) = common::mock_gateway().await;
    client
        .subscribe_many(&["fts/v1/ff/+/instantAction".to_string()], 1)
        .await
        .unwrap();

    let report = gateway
        .send(
            &BuildRequest::FtsInstantAction {
                command: FtsCommand::Dock,
                metadata: Some(json!({"nodeId": "SVR4H73275"})),
            },
            &SendOptions::default(),
        )
        .await
        .unwrap();

    assert!(report.published);
    assert_eq!(report.topic, "fts/v1/ff/5iO4/instantAction");
    assert_eq!(report.qos, 2, "registry declares qos 2");
    assert!(report.retain, "registry declares retain");

    let buffered = client.buffer_snapshot("fts/v1/ff/+/instantAction");
    let payload = buffered[0].payload.as_json().unwrap();
    assert_eq!(payload["serialNumber"], "5iO4");
    assert_eq!(payload["actions"][0]["actionType"], "findInitialDockPosition");
    assert_eq!(payload["actions"][0]["metadata"]["nodeId"], "SVR4H73275");
    let action_id: Uuid = payload["actions"][0]["actionId"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();
    assert_eq!(action_id.get_version_num(), 4);
}

/// Per-filter buffers drop the oldest entries at capacity
#[tokio::test]
async fn buffer_capacity_is_fifo() {
    let client = common::mock_client(&BufferSettings {
        topic_capacity: 3,
        history_capacity: 100,
    })
    .await;
    client.subscribe_many(&["t/#".to_string()], 1).await.unwrap();

    for n in 1..=5 {
        client.inject_incoming("t/x", json!(n).to_string().as_bytes(), 0, false);
    }

    let payloads: Vec<_> = client
        .buffer_snapshot("t/#")
        .into_iter()
        .map(|m| m.payload.as_json().unwrap().clone())
        .collect();
    assert_eq!(payloads, vec![json!(3), json!(4), json!(5)]);

    let stats = client.history_stats();
    assert_eq!(stats.received, 5, "history keeps what the buffer evicted");
    assert_eq!(stats.len, 5);
}

/// Enriching a payload twice changes nothing
#[tokio::test]
async fn enrich_is_idempotent() {
    let (gateway, _client) = common::mock_gateway().await;

    let mut payload = json!({"command": "PICK"});
    gateway.enrich(&mut payload, true);
    let once = payload.clone();
    gateway.enrich(&mut payload, true);

    assert_eq!(payload, once);
    assert!(payload["orderId"].is_u64());
    assert!(payload["timestamp"].is_string());
}

/// Raw sends to mapped topics are validated, findings never block
#[tokio::test]
async fn raw_send_is_validated_advisorily() {
    let (gateway, client) = common::mock_gateway().await;
    client
        .subscribe_many(&["module/v1/ff/+/order".to_string()], 1)
        .await
        .unwrap();

    let report = gateway
        .send_raw(
            "module/v1/ff/SVR4H76449/order",
            json!({"action": {"command": "LEVITATE"}}),
            &SendOptions::default(),
        )
        .await;

    assert!(report.published);
    assert!(report.findings.iter().any(|f| f.contains("LEVITATE")));
    assert_eq!(client.buffer_snapshot("module/v1/ff/+/order").len(), 1);
}

/// Subscribing twice leaves a single subscription and buffer
#[tokio::test]
async fn subscription_set_is_idempotent() {
    let client = common::mock_client(&BufferSettings::default()).await;

    let filters = vec!["ccu/state".to_string(), "module/v1/ff/+/state".to_string()];
    client.subscribe_many(&filters, 1).await.unwrap();
    client.subscribe_many(&filters, 1).await.unwrap();

    assert_eq!(client.subscriptions().len(), 2);
}

/// The priority selector installs the cumulative filter union
#[tokio::test]
async fn priority_level_selects_cumulative_filters() {
    let client = common::mock_client(&BufferSettings::default()).await;
    let priorities = default_priority_map();

    client
        .set_message_center_priority(3, &priorities, 2000)
        .await
        .unwrap();

    let subs = client.subscriptions();
    assert!(subs.contains(&"ccu/state".to_string()));
    assert!(subs.contains(&"module/v1/ff/+/connection".to_string()));
    assert!(subs.contains(&"fts/v1/ff/+/state".to_string()));
    assert!(!subs.contains(&"module/v1/ff/+/order".to_string()), "level 4 excluded");
    assert_eq!(client.history_stats().capacity, 2000);
}

/// Sent and received copies are distinguishable in the same buffer
#[tokio::test]
async fn buffers_tag_message_direction() {
    let (gateway, client) = common::mock_gateway().await;
    client
        .subscribe_many(&["ccu/order/request".to_string()], 1)
        .await
        .unwrap();

    client.inject_incoming("ccu/order/request", b"{}", 1, false);
    gateway
        .send(
            &BuildRequest::CcuOrder {
                color: WorkpieceColor::Blue,
                order_type: OrderType::Storage,
                workpiece_id: None,
                ai_inspection: None,
            },
            &SendOptions::default(),
        )
        .await
        .unwrap();

    let kinds: Vec<_> = client
        .buffer_snapshot("ccu/order/request")
        .into_iter()
        .map(|m| m.kind)
        .collect();
    assert_eq!(kinds, vec![MessageKind::Received, MessageKind::Sent]);
}
