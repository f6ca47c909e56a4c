//! End-to-end workflow: one orderId, monotonic update ids, real publishes

mod common;

use aps_gateway::mqtt::{BuildRequest, SendOptions};
use aps_gateway::{ModuleOrderParams, WorkflowOrderManager, WorkflowState};
use std::collections::HashSet;
use uuid::Uuid;

/// A full DRILL sequence shares one orderId and counts 1, 2, 3
#[tokio::test]
async fn drill_sequence_shares_order_identity() {
    let (gateway, client) = common::mock_gateway().await;
    client
        .subscribe_many(&["module/v1/ff/+/order".to_string()], 1)
        .await
        .unwrap();

    let workflows = WorkflowOrderManager::new();
    let order_id = workflows.start_workflow(
        "DRILL",
        vec!["PICK".to_string(), "DRILL".to_string(), "DROP".to_string()],
    );

    for command in ["PICK", "DRILL", "DROP"] {
        let step = workflows.execute_command(order_id, command).unwrap();
        let report = gateway
            .send(
                &BuildRequest::ModuleOrder {
                    module: "DRILL".to_string(),
                    command: command.to_string(),
                    params: ModuleOrderParams {
                        order_id: Some(step.order_id),
                        order_update_id: step.order_update_id,
                        ..ModuleOrderParams::default()
                    },
                },
                &SendOptions::default(),
            )
            .await
            .unwrap();
        assert!(report.published);
        assert!(report.findings.is_empty(), "shipped templates accept the order");
        assert_eq!(report.topic, "module/v1/ff/SVR4H76449/order");
    }
    workflows.complete_workflow(order_id).unwrap();

    let published = client.buffer_snapshot("module/v1/ff/+/order");
    assert_eq!(published.len(), 3);

    let mut action_ids = HashSet::new();
    for (i, message) in published.iter().enumerate() {
        let payload = message.payload.as_json().unwrap();
        assert_eq!(payload["orderId"], order_id.to_string());
        assert_eq!(payload["orderUpdateId"], u64::try_from(i).unwrap() + 1);
        assert_eq!(payload["action"]["command"], ["PICK", "DRILL", "DROP"][i]);
        let action_id: Uuid = payload["action"]["id"].as_str().unwrap().parse().unwrap();
        assert!(action_ids.insert(action_id), "action ids are distinct uuids");
    }

    let snapshot = workflows.get_workflow(order_id).unwrap();
    assert_eq!(snapshot.state, WorkflowState::Completed);
    assert_eq!(snapshot.executed, vec!["PICK", "DRILL", "DROP"]);
}

/// Sequence enforcement catches a skipped step without burning an update id
#[tokio::test]
async fn out_of_order_command_is_rejected_cleanly() {
    let workflows = WorkflowOrderManager::new();
    let order_id = workflows.start_workflow("MILL", aps_gateway::messages::planned_commands("MILL").unwrap());

    workflows.execute_command(order_id, "PICK").unwrap();
    assert!(workflows.execute_command(order_id, "DROP").is_err());

    let step = workflows.execute_command(order_id, "MILL").unwrap();
    assert_eq!(step.order_update_id, 2);
}

/// Cancellation makes the workflow inert but keeps its history
#[tokio::test]
async fn cancelled_workflow_keeps_history() {
    let workflows = WorkflowOrderManager::new();
    let order_id = workflows.start_workflow("AIQS", Vec::new());
    workflows.execute_command(order_id, "PICK").unwrap();
    workflows.cancel_workflow(order_id).unwrap();

    assert!(workflows.execute_command(order_id, "CHECK_QUALITY").is_err());
    let snapshot = workflows.get_workflow(order_id).unwrap();
    assert_eq!(snapshot.state, WorkflowState::Cancelled);
    assert_eq!(snapshot.last_update_id, 1);

    assert_eq!(workflows.prune_finished(), 1);
    assert!(workflows.get_workflow(order_id).is_none());
}
