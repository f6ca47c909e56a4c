//! Configuration for the APS gateway
//!
//! Configuration is layered: built-in defaults, then an optional
//! `aps.toml` overlay, then `APS_*` environment variables. All file
//! fields are optional so a partial file only overrides what it names.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{Error, Result};

/// Default capacity of each per-filter ring buffer
pub const DEFAULT_TOPIC_BUFFER_CAPACITY: usize = 1000;

/// Default capacity of the cross-topic history deque
pub const DEFAULT_HISTORY_CAPACITY: usize = 10_000;

/// Highest message-center priority level
pub const MAX_PRIORITY_LEVEL: u8 = 5;

/// Broker connection environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Connect to a real broker
    #[default]
    Live,
    /// Connect to a replay broker (same transport, different source)
    Replay,
    /// No network; publishes are recorded to buffers only
    Mock,
}

impl Environment {
    /// Parse from a config/env string
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for unknown values.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "live" => Ok(Self::Live),
            "replay" => Ok(Self::Replay),
            "mock" => Ok(Self::Mock),
            other => Err(Error::Config(format!("unknown environment: {other}"))),
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Live => "live",
            Self::Replay => "replay",
            Self::Mock => "mock",
        };
        f.write_str(s)
    }
}

/// MQTT broker connection settings
#[derive(Debug, Clone)]
pub struct MqttSettings {
    /// Broker hostname or IP
    pub host: String,

    /// Broker port
    pub port: u16,

    /// Optional username
    pub username: Option<String>,

    /// Optional password
    pub password: Option<String>,

    /// Client identifier presented to the broker
    pub client_id: String,

    /// Keep-alive interval in seconds
    pub keepalive_secs: u64,

    /// Request a clean session on connect
    pub clean_session: bool,

    /// Enable TLS transport
    pub tls: bool,

    /// Connection environment (live, replay, mock)
    pub environment: Environment,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            username: None,
            password: None,
            client_id: "aps-gateway".to_string(),
            keepalive_secs: 60,
            clean_session: true,
            tls: false,
            environment: Environment::Live,
        }
    }
}

impl MqttSettings {
    /// Keep-alive as a `Duration`
    #[must_use]
    pub const fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }
}

/// Ring buffer capacities
#[derive(Debug, Clone)]
pub struct BufferSettings {
    /// Capacity of each per-filter buffer
    pub topic_capacity: usize,

    /// Capacity of the cross-topic history
    pub history_capacity: usize,
}

impl Default for BufferSettings {
    fn default() -> Self {
        Self {
            topic_capacity: DEFAULT_TOPIC_BUFFER_CAPACITY,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

/// Resolved gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// MQTT connection settings
    pub mqtt: MqttSettings,

    /// Buffer capacities
    pub buffers: BufferSettings,

    /// Root directory of the topic/template registry
    pub registry_root: PathBuf,

    /// Active message-center priority level (1..=5)
    pub priority_level: u8,

    /// Subscription filters per priority level
    pub priorities: BTreeMap<u8, Vec<String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mqtt: MqttSettings::default(),
            buffers: BufferSettings::default(),
            registry_root: default_registry_root(),
            priority_level: MAX_PRIORITY_LEVEL,
            priorities: default_priority_map(),
        }
    }
}

/// Default registry root: `./registry/model/v1` relative to the working
/// directory, falling back to the platform data dir when absent there
#[must_use]
pub fn default_registry_root() -> PathBuf {
    let local = PathBuf::from("registry/model/v1");
    if local.exists() {
        return local;
    }
    directories::ProjectDirs::from("", "", "aps-gateway")
        .map_or(local, |dirs| dirs.data_dir().join("registry/model/v1"))
}

/// Built-in priority map covering the factory's inbound topic surface
///
/// Level 1 is the control-plane minimum; each higher level adds filters.
#[must_use]
pub fn default_priority_map() -> BTreeMap<u8, Vec<String>> {
    let mut map = BTreeMap::new();
    map.insert(
        1,
        vec![
            "ccu/state".to_string(),
            "ccu/pairing/state".to_string(),
            "ccu/order/active".to_string(),
            "ccu/order/completed".to_string(),
        ],
    );
    map.insert(
        2,
        vec![
            "module/v1/ff/+/state".to_string(),
            "module/v1/ff/+/connection".to_string(),
        ],
    );
    map.insert(
        3,
        vec![
            "fts/v1/ff/+/state".to_string(),
            "fts/v1/ff/+/connection".to_string(),
        ],
    );
    map.insert(
        4,
        vec![
            "module/v1/ff/+/factsheet".to_string(),
            "module/v1/ff/+/order".to_string(),
        ],
    );
    map.insert(
        5,
        vec![
            "/j1/txt/1/i/bme680".to_string(),
            "/j1/txt/1/i/ldr".to_string(),
            "/j1/txt/1/i/cam".to_string(),
        ],
    );
    map
}

/// Union of filters for priority levels `1..=level`, declaration order,
/// duplicates removed
#[must_use]
pub fn filters_for_level(priorities: &BTreeMap<u8, Vec<String>>, level: u8) -> Vec<String> {
    let mut out = Vec::new();
    for (_, filters) in priorities.range(1..=level) {
        for f in filters {
            if !out.contains(f) {
                out.push(f.clone());
            }
        }
    }
    out
}

impl Config {
    /// Load configuration from an optional TOML file plus env overrides
    ///
    /// # Errors
    ///
    /// Returns error when the file exists but cannot be read or parsed,
    /// or when a value fails validation. An explicitly passed path that
    /// does not exist is an error; the default path is allowed to be
    /// absent.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        let file_path = path.map_or_else(default_config_path, Path::to_path_buf);
        if file_path.exists() {
            let raw = std::fs::read_to_string(&file_path)?;
            let overlay: ConfigFile = toml::from_str(&raw)?;
            config.apply_overlay(overlay)?;
            tracing::debug!(path = %file_path.display(), "loaded config file");
        } else if path.is_some() {
            return Err(Error::Config(format!(
                "config file not found: {}",
                file_path.display()
            )));
        }

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_overlay(&mut self, overlay: ConfigFile) -> Result<()> {
        let mqtt = overlay.mqtt;
        if let Some(host) = mqtt.host {
            self.mqtt.host = host;
        }
        if let Some(port) = mqtt.port {
            self.mqtt.port = port;
        }
        if mqtt.username.is_some() {
            self.mqtt.username = mqtt.username;
        }
        if mqtt.password.is_some() {
            self.mqtt.password = mqtt.password;
        }
        if let Some(client_id) = mqtt.client_id {
            self.mqtt.client_id = client_id;
        }
        if let Some(keepalive) = mqtt.keepalive_secs {
            self.mqtt.keepalive_secs = keepalive;
        }
        if let Some(clean) = mqtt.clean_session {
            self.mqtt.clean_session = clean;
        }
        if let Some(tls) = mqtt.tls {
            self.mqtt.tls = tls;
        }
        if let Some(env) = mqtt.environment {
            self.mqtt.environment = env;
        }

        if let Some(cap) = overlay.buffers.topic_capacity {
            self.buffers.topic_capacity = cap;
        }
        if let Some(cap) = overlay.buffers.history_capacity {
            self.buffers.history_capacity = cap;
        }

        if let Some(root) = overlay.registry_root {
            self.registry_root = root;
        }
        if let Some(level) = overlay.priority_level {
            self.priority_level = level;
        }
        if let Some(priorities) = overlay.priorities {
            let mut map = BTreeMap::new();
            for (key, filters) in priorities {
                let level: u8 = key
                    .parse()
                    .map_err(|_| Error::Config(format!("invalid priority level: {key}")))?;
                map.insert(level, filters);
            }
            self.priorities = map;
        }
        Ok(())
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(host) = std::env::var("APS_MQTT_HOST") {
            self.mqtt.host = host;
        }
        if let Ok(port) = std::env::var("APS_MQTT_PORT") {
            self.mqtt.port = port
                .parse()
                .map_err(|_| Error::Config(format!("invalid APS_MQTT_PORT: {port}")))?;
        }
        if let Ok(user) = std::env::var("APS_MQTT_USERNAME") {
            self.mqtt.username = Some(user);
        }
        if let Ok(pass) = std::env::var("APS_MQTT_PASSWORD") {
            self.mqtt.password = Some(pass);
        }
        if let Ok(env) = std::env::var("APS_ENVIRONMENT") {
            self.mqtt.environment = Environment::parse(&env)?;
        }
        if let Ok(root) = std::env::var("APS_REGISTRY_ROOT") {
            self.registry_root = PathBuf::from(root);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if !(1..=MAX_PRIORITY_LEVEL).contains(&self.priority_level) {
            return Err(Error::Config(format!(
                "priority_level must be 1..={MAX_PRIORITY_LEVEL}, got {}",
                self.priority_level
            )));
        }
        if self.buffers.topic_capacity == 0 || self.buffers.history_capacity == 0 {
            return Err(Error::Config(
                "buffer capacities must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Subscription filters implied by the configured priority level
    #[must_use]
    pub fn active_filters(&self) -> Vec<String> {
        filters_for_level(&self.priorities, self.priority_level)
    }
}

/// Default config file path: platform config dir `aps.toml`, or
/// `./aps.toml` when no home directory is available
fn default_config_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "aps-gateway").map_or_else(
        || PathBuf::from("aps.toml"),
        |dirs| dirs.config_dir().join("aps.toml"),
    )
}

/// Top-level TOML schema; every field is an optional overlay
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    mqtt: MqttFileConfig,

    #[serde(default)]
    buffers: BuffersFileConfig,

    registry_root: Option<PathBuf>,

    priority_level: Option<u8>,

    /// TOML table keys are strings; parsed to levels on apply
    priorities: Option<BTreeMap<String, Vec<String>>>,
}

#[derive(Debug, Default, Deserialize)]
struct MqttFileConfig {
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    client_id: Option<String>,
    keepalive_secs: Option<u64>,
    clean_session: Option<bool>,
    tls: Option<bool>,
    environment: Option<Environment>,
}

#[derive(Debug, Default, Deserialize)]
struct BuffersFileConfig {
    topic_capacity: Option<usize>,
    history_capacity: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_partial_file() {
        let overlay: ConfigFile = toml::from_str(
            r#"
            [mqtt]
            host = "broker.factory.local"
            environment = "mock"

            [buffers]
            topic_capacity = 3
            "#,
        )
        .unwrap();

        let mut config = Config::default();
        config.apply_overlay(overlay).unwrap();

        assert_eq!(config.mqtt.host, "broker.factory.local");
        assert_eq!(config.mqtt.environment, Environment::Mock);
        assert_eq!(config.buffers.topic_capacity, 3);
        // untouched defaults survive
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.buffers.history_capacity, DEFAULT_HISTORY_CAPACITY);
    }

    #[test]
    fn priority_union_is_cumulative_and_deduped() {
        let priorities = default_priority_map();

        let level1 = filters_for_level(&priorities, 1);
        assert_eq!(level1.len(), 4);

        let level3 = filters_for_level(&priorities, 3);
        assert!(level3.contains(&"ccu/state".to_string()));
        assert!(level3.contains(&"fts/v1/ff/+/state".to_string()));
        assert!(!level3.contains(&"module/v1/ff/+/order".to_string()));

        let level5 = filters_for_level(&priorities, 5);
        let unique: std::collections::HashSet<_> = level5.iter().collect();
        assert_eq!(unique.len(), level5.len());
    }

    #[test]
    fn environment_parse_rejects_unknown() {
        assert_eq!(Environment::parse("MOCK").unwrap(), Environment::Mock);
        assert!(Environment::parse("staging").is_err());
    }

    #[test]
    fn validate_rejects_bad_priority_level() {
        let config = Config {
            priority_level: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
