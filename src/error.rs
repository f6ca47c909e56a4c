//! Error types for the APS gateway core

use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the gateway core
///
/// Data-path soft failures (unknown topic, missing template, payload
/// validation findings) are deliberately *not* represented here; those
/// surface as values plus warnings so the message path never aborts.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Registry manifest version outside the supported major line
    #[error("registry version mismatch: expected 1.*, found {0}")]
    VersionMismatch(String),

    /// Registry loading error (missing root, unreadable manifest)
    #[error("registry error: {0}")]
    Registry(String),

    /// Module not present in the registry
    #[error("unknown module: {0}")]
    UnknownModule(String),

    /// Command not declared for the addressed module
    #[error("module {module} does not support command {command}")]
    UnsupportedCommand {
        /// Module identifier as addressed by the caller
        module: String,
        /// Rejected command
        command: String,
    },

    /// Workflow lookup failed
    #[error("workflow not found: {0}")]
    WorkflowNotFound(uuid::Uuid),

    /// Operation requires an active workflow
    #[error("workflow {order_id} is {state}, not active")]
    WorkflowNotActive {
        /// Workflow order id
        order_id: uuid::Uuid,
        /// State the workflow was found in
        state: String,
    },

    /// Executed command does not match the planned step
    #[error("command out of sequence: expected {expected}, got {got}")]
    CommandOutOfSequence {
        /// Next planned command
        expected: String,
        /// Command the caller attempted
        got: String,
    },

    /// MQTT client error
    #[error("mqtt error: {0}")]
    Mqtt(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
