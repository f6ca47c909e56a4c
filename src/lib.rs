//! APS Gateway - Order workflow and message coordination for the model factory
//!
//! This library provides the core functionality for the APS gateway:
//! - Versioned topic/template registry with hot reload
//! - Topic resolution and non-blocking payload validation
//! - Protocol-conformant message generation (modules, CCU, FTS)
//! - Buffered MQTT client and the outbound gateway
//! - Workflow order lifecycle with monotonic update counters
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  MQTT Broker                         │
//! │   ccu/*  │  module/v1/ff/*  │  fts/v1/ff/*  │  ...  │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                  APS Gateway                         │
//! │   Client  │  Gateway  │  Generator  │  Workflows    │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │              Registry (YAML, v1)                     │
//! │   Mappings  │  Templates  │  Modules  │  Topics     │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod daemon;
pub mod error;
pub mod messages;
pub mod mqtt;
pub mod registry;
pub mod workflow;

pub use config::{Config, Environment};
pub use daemon::{Daemon, TelemetrySnapshot};
pub use error::{Error, Result};
pub use messages::{
    FtsCommand, MessageGenerator, ModuleOrderParams, OrderType, WorkpieceColor,
};
pub use mqtt::{
    BufferedMessage, BuildRequest, ConnectionState, MqttClient, MqttGateway, SendOptions,
    SendReport,
};
pub use registry::{Registry, RouteMatch, TemplateManager, TopicResolver};
pub use workflow::{OrderStep, WorkflowOrderManager, WorkflowState};
