//! Shared test utilities

use std::path::PathBuf;
use std::sync::Arc;

use aps_gateway::config::{BufferSettings, Environment, MqttSettings};
use aps_gateway::mqtt::{MqttClient, MqttGateway};
use aps_gateway::registry::{Registry, TemplateManager, TopicResolver};

/// Root of the registry shipped with the crate
#[must_use]
pub fn shipped_registry_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("registry/model/v1")
}

/// Load the shipped registry
#[must_use]
pub fn shipped_registry() -> Arc<Registry> {
    Arc::new(Registry::load(shipped_registry_root()).expect("shipped registry must load"))
}

/// Create a connected mock client with the given buffer capacities
pub async fn mock_client(buffers: &BufferSettings) -> Arc<MqttClient> {
    let client = Arc::new(MqttClient::new(buffers));
    let connected = client
        .connect(MqttSettings {
            environment: Environment::Mock,
            ..MqttSettings::default()
        })
        .await
        .expect("mock connect");
    assert!(connected);
    client
}

/// Full gateway stack over the shipped registry and a mock client
pub async fn mock_gateway() -> (Arc<MqttGateway>, Arc<MqttClient>) {
    let registry = shipped_registry();
    let client = mock_client(&BufferSettings::default()).await;
    let gateway = Arc::new(MqttGateway::new(
        Arc::clone(&registry),
        Arc::new(TemplateManager::new(Arc::clone(&registry))),
        Arc::new(TopicResolver::new(Arc::clone(&registry))),
        Arc::clone(&client),
    ));
    (gateway, client)
}
