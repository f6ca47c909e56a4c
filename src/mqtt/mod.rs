//! MQTT transport, buffering, and the outbound gateway

pub mod buffer;
pub mod client;
pub mod gateway;
pub mod topic;

pub use buffer::{BufferedMessage, MessageKind, MessagePayload, RingBuffer};
pub use client::{ConnectionState, ConnectionStatus, HistoryStats, MqttClient};
pub use gateway::{BuildRequest, MqttGateway, OutboundMessage, SendOptions, SendReport};
pub use topic::matches;
