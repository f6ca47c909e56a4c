//! Long-running gateway service
//!
//! Wires the registry, resolver, templates, client, gateway, and
//! workflow manager together, applies the configured message-center
//! priority, and runs until interrupted. A periodic tick logs a
//! telemetry snapshot so unknown topics and validation findings stay
//! visible in operation.

use std::sync::Arc;
use std::time::Duration;

use crate::Result;
use crate::config::Config;
use crate::mqtt::{MqttClient, MqttGateway};
use crate::registry::{Registry, TemplateManager, TopicResolver};
use crate::workflow::WorkflowOrderManager;

/// Interval between telemetry snapshot logs
const STATS_INTERVAL: Duration = Duration::from_secs(60);

/// Point-in-time view of the running gateway
#[derive(Debug, Clone)]
pub struct TelemetrySnapshot {
    /// Connection state as a display string
    pub connection: String,

    /// Messages routed from the broker
    pub messages_received: u64,

    /// Successful publishes
    pub messages_sent: u64,

    /// Entries currently in the history
    pub history_len: usize,

    /// History evictions since start
    pub history_evicted: u64,

    /// Topics seen but never resolved to a template
    pub unknown_topics: Vec<String>,

    /// Template keys looked up but never found
    pub missing_templates: Vec<String>,

    /// Payloads that produced validation findings
    pub validation_failures: u64,

    /// Workflows currently active
    pub active_workflows: usize,
}

/// The assembled gateway service
pub struct Daemon {
    config: Config,
    registry: Arc<Registry>,
    resolver: Arc<TopicResolver>,
    templates: Arc<TemplateManager>,
    client: Arc<MqttClient>,
    gateway: Arc<MqttGateway>,
    workflows: Arc<WorkflowOrderManager>,
}

impl Daemon {
    /// Assemble the service from resolved configuration
    ///
    /// Loads the registry in watch mode so YAML edits land without a
    /// restart.
    ///
    /// # Errors
    ///
    /// Returns the registry's load errors, including the fatal version
    /// pin.
    pub fn new(config: Config) -> Result<Self> {
        let registry = Arc::new(Registry::load_watching(&config.registry_root)?);
        let resolver = Arc::new(TopicResolver::new(Arc::clone(&registry)));
        let templates = Arc::new(TemplateManager::new(Arc::clone(&registry)));
        let client = Arc::new(MqttClient::new(&config.buffers));
        let gateway = Arc::new(MqttGateway::new(
            Arc::clone(&registry),
            Arc::clone(&templates),
            Arc::clone(&resolver),
            Arc::clone(&client),
        ));

        Ok(Self {
            config,
            registry,
            resolver,
            templates,
            client,
            gateway,
            workflows: Arc::new(WorkflowOrderManager::new()),
        })
    }

    /// The shared registry
    #[must_use]
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// The topic resolver
    #[must_use]
    pub fn resolver(&self) -> Arc<TopicResolver> {
        Arc::clone(&self.resolver)
    }

    /// The template manager
    #[must_use]
    pub fn templates(&self) -> Arc<TemplateManager> {
        Arc::clone(&self.templates)
    }

    /// The MQTT client
    #[must_use]
    pub fn client(&self) -> Arc<MqttClient> {
        Arc::clone(&self.client)
    }

    /// The outbound gateway
    #[must_use]
    pub fn gateway(&self) -> Arc<MqttGateway> {
        Arc::clone(&self.gateway)
    }

    /// The workflow manager
    #[must_use]
    pub fn workflows(&self) -> Arc<WorkflowOrderManager> {
        Arc::clone(&self.workflows)
    }

    /// Connect and install the configured subscriptions
    ///
    /// # Errors
    ///
    /// Returns connect and subscribe errors; an unreachable broker is
    /// not an error, the client keeps retrying in the background.
    pub async fn start(&self) -> Result<()> {
        let connected = self.client.connect(self.config.mqtt.clone()).await?;
        tracing::info!(
            host = %self.config.mqtt.host,
            port = self.config.mqtt.port,
            environment = %self.config.mqtt.environment,
            connected,
            "gateway starting"
        );

        self.client
            .set_message_center_priority(
                self.config.priority_level,
                &self.config.priorities,
                self.config.buffers.history_capacity,
            )
            .await?;
        Ok(())
    }

    /// Run until ctrl-c, logging a telemetry snapshot each minute
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Daemon::start`].
    pub async fn run(&self) -> Result<()> {
        self.start().await?;
        let mut ticker = tokio::time::interval(STATS_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await; // the first tick fires immediately

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutdown requested");
                    break;
                }
                _ = ticker.tick() => self.log_snapshot(),
            }
        }

        self.client.disconnect().await;
        tracing::info!("gateway stopped");
        Ok(())
    }

    /// Capture the current telemetry
    #[must_use]
    pub fn snapshot(&self) -> TelemetrySnapshot {
        let status = self.client.connection_status();
        let history = self.client.history_stats();
        TelemetrySnapshot {
            connection: status.state.to_string(),
            messages_received: status.messages_received,
            messages_sent: status.messages_sent,
            history_len: history.len,
            history_evicted: history.evicted,
            unknown_topics: self.resolver.unknown_topics(),
            missing_templates: self.templates.missing_templates(),
            validation_failures: self.templates.validation_failures(),
            active_workflows: self.workflows.active_count(),
        }
    }

    fn log_snapshot(&self) {
        let snapshot = self.snapshot();
        tracing::info!(
            connection = %snapshot.connection,
            received = snapshot.messages_received,
            sent = snapshot.messages_sent,
            history = snapshot.history_len,
            evicted = snapshot.history_evicted,
            unknown_topics = snapshot.unknown_topics.len(),
            missing_templates = snapshot.missing_templates.len(),
            validation_failures = snapshot.validation_failures,
            active_workflows = snapshot.active_workflows,
            "telemetry"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Environment, MqttSettings};
    use std::fs;
    use tempfile::TempDir;

    fn mock_config() -> (Config, TempDir) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("manifest.yml"), "version: \"1.0.0\"").unwrap();
        let config = Config {
            mqtt: MqttSettings {
                environment: Environment::Mock,
                ..MqttSettings::default()
            },
            registry_root: dir.path().to_path_buf(),
            ..Config::default()
        };
        (config, dir)
    }

    #[tokio::test]
    async fn start_applies_priority_subscriptions() {
        let (config, _dir) = mock_config();
        let daemon = Daemon::new(config).unwrap();
        daemon.start().await.unwrap();

        let subs = daemon.client().subscriptions();
        assert!(subs.contains(&"ccu/state".to_string()));
        assert!(subs.contains(&"/j1/txt/1/i/cam".to_string()), "level 5 included");
    }

    #[tokio::test]
    async fn snapshot_reflects_traffic() {
        let (config, _dir) = mock_config();
        let daemon = Daemon::new(config).unwrap();
        daemon.start().await.unwrap();

        daemon.client().inject_incoming("ccu/state", b"{}", 1, false);
        daemon.resolver().route("never/mapped");

        let snapshot = daemon.snapshot();
        assert_eq!(snapshot.connection, "connected");
        assert_eq!(snapshot.messages_received, 1);
        assert_eq!(snapshot.unknown_topics, vec!["never/mapped".to_string()]);
        assert_eq!(snapshot.active_workflows, 0);
    }

    #[test]
    fn bad_registry_version_is_fatal_at_assembly() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("manifest.yml"), "version: \"2.0.0\"").unwrap();
        let config = Config {
            registry_root: dir.path().to_path_buf(),
            ..Config::default()
        };

        assert!(Daemon::new(config).is_err());
    }
}
