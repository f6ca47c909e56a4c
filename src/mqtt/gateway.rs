//! Outbound message gateway
//!
//! Single choke point for everything this process publishes. A closed
//! set of build requests maps to generator output plus the right topic
//! and template key; raw payloads go through the same enrichment,
//! validation, and QoS resolution. Template validation never blocks a
//! send, it only reports findings.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;
use uuid::Uuid;

use crate::messages::{
    FtsCommand, MessageGenerator, ModuleOrderParams, OrderType, WorkpieceColor, iso_timestamp,
};
use crate::registry::{Registry, TemplateManager, TopicResolver};
use crate::{Error, Result};

use super::client::MqttClient;

/// First integer orderId minted by [`MqttGateway::enrich`]
const DEFAULT_ID_START: u64 = 1000;

/// The message families the gateway can build and send
#[derive(Debug, Clone)]
pub enum BuildRequest {
    /// Order one command on a processing module
    ModuleOrder {
        /// Module id or serial
        module: String,
        /// Module command (`PICK`, `DRILL`, …)
        command: String,
        /// Order knobs
        params: ModuleOrderParams,
    },
    /// Production/storage/retrieval request to the CCU
    CcuOrder {
        /// Workpiece color
        color: WorkpieceColor,
        /// Order kind
        order_type: OrderType,
        /// Specific workpiece NFC id
        workpiece_id: Option<String>,
        /// Request AI quality inspection
        ai_inspection: Option<bool>,
    },
    /// Instant action for the transport vehicle
    FtsInstantAction {
        /// Symbolic command
        command: FtsCommand,
        /// Action-specific metadata
        metadata: Option<Value>,
    },
    /// Multi-node navigation order for the transport vehicle
    FtsNavigation {
        /// Declared route name (`DPS_HBW`, …)
        route: String,
        /// Workpiece type being carried
        load_type: String,
        /// Workpiece NFC id
        load_id: Option<String>,
        /// Explicit order id; minted when absent
        order_id: Option<String>,
    },
}

/// Per-send knobs; registry topic configuration still wins for QoS/retain
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Stamp an integer `orderId` when the payload has none
    pub ensure_order_id: bool,

    /// QoS when the registry declares none for the topic
    pub qos: Option<u8>,

    /// Retain flag when the registry declares none for the topic
    pub retain: Option<bool>,
}

/// A built message, ready to publish
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    /// Concrete topic
    pub topic: String,

    /// Template key used for validation
    pub template: String,

    /// The JSON payload
    pub payload: Value,
}

/// What happened to one send
#[derive(Debug, Clone)]
pub struct SendReport {
    /// Topic the message went to
    pub topic: String,

    /// Whether the broker accepted the publish
    pub published: bool,

    /// QoS actually used
    pub qos: u8,

    /// Retain flag actually used
    pub retain: bool,

    /// Validation findings; never blocks the send
    pub findings: Vec<String>,
}

/// The outbound gateway
pub struct MqttGateway {
    registry: Arc<Registry>,
    templates: Arc<TemplateManager>,
    resolver: Arc<TopicResolver>,
    generator: MessageGenerator,
    client: Arc<MqttClient>,
    next_order_id: AtomicU64,
}

impl MqttGateway {
    /// Create a gateway over the shared registry and client
    #[must_use]
    pub fn new(
        registry: Arc<Registry>,
        templates: Arc<TemplateManager>,
        resolver: Arc<TopicResolver>,
        client: Arc<MqttClient>,
    ) -> Self {
        Self {
            generator: MessageGenerator::new(Arc::clone(&registry)),
            registry,
            templates,
            resolver,
            client,
            next_order_id: AtomicU64::new(DEFAULT_ID_START),
        }
    }

    /// The generator used for building payloads
    #[must_use]
    pub const fn generator(&self) -> &MessageGenerator {
        &self.generator
    }

    /// Build a message without sending it
    ///
    /// # Errors
    ///
    /// Returns the generator's errors: `UnknownModule`,
    /// `UnsupportedCommand`, or `Config` for an unknown route, plus
    /// `Serialization` if a payload cannot be represented as JSON.
    pub fn build(&self, request: &BuildRequest) -> Result<OutboundMessage> {
        match request {
            BuildRequest::ModuleOrder {
                module,
                command,
                params,
            } => {
                let order = self.generator.module_order(module, command, params.clone())?;
                Ok(OutboundMessage {
                    topic: self.generator.module_order_topic(module)?,
                    template: "module.order".to_string(),
                    payload: serde_json::to_value(order)?,
                })
            }
            BuildRequest::CcuOrder {
                color,
                order_type,
                workpiece_id,
                ai_inspection,
            } => {
                let request = self.generator.ccu_order_request(
                    *color,
                    *order_type,
                    workpiece_id.clone(),
                    *ai_inspection,
                );
                Ok(OutboundMessage {
                    topic: "ccu/order/request".to_string(),
                    template: "ccu.order.request".to_string(),
                    payload: serde_json::to_value(request)?,
                })
            }
            BuildRequest::FtsInstantAction { command, metadata } => {
                let action = self.generator.fts_instant_action(*command, metadata.clone());
                Ok(OutboundMessage {
                    topic: self.generator.fts_instant_action_topic(),
                    template: "fts.instant_action".to_string(),
                    payload: serde_json::to_value(action)?,
                })
            }
            BuildRequest::FtsNavigation {
                route,
                load_type,
                load_id,
                order_id,
            } => {
                let order = self
                    .generator
                    .fts_navigation(route, load_type, load_id.clone(), order_id.clone())
                    .ok_or_else(|| Error::Config(format!("unknown route: {route}")))?;
                Ok(OutboundMessage {
                    topic: self.generator.fts_order_topic(),
                    template: "fts.order".to_string(),
                    payload: serde_json::to_value(order)?,
                })
            }
        }
    }

    /// Build, enrich, validate, and publish one message
    ///
    /// # Errors
    ///
    /// Same as [`MqttGateway::build`]; publish failures are reported in
    /// the returned [`SendReport`], not as errors.
    pub async fn send(&self, request: &BuildRequest, options: &SendOptions) -> Result<SendReport> {
        let message = self.build(request)?;
        Ok(self.dispatch(message, options).await)
    }

    /// Enrich, validate, and publish an arbitrary payload
    ///
    /// The template key comes from the topic mapping; unmapped topics
    /// skip validation.
    pub async fn send_raw(
        &self,
        concrete_topic: &str,
        payload: Value,
        options: &SendOptions,
    ) -> SendReport {
        let template = self
            .resolver
            .route(concrete_topic)
            .map(|m| m.template)
            .unwrap_or_default();
        let message = OutboundMessage {
            topic: concrete_topic.to_string(),
            template,
            payload,
        };
        self.dispatch(message, options).await
    }

    /// Stamp the standard envelope fields, idempotently
    ///
    /// Adds `timestamp` when the payload has none. With `ensure_order_id`
    /// set, adds an integer `orderId` from the gateway's counter when the
    /// payload has none; an existing `orderId` of any shape is left
    /// untouched, so enriching twice changes nothing.
    pub fn enrich(&self, payload: &mut Value, ensure_order_id: bool) {
        let Some(object) = payload.as_object_mut() else {
            return;
        };
        object
            .entry("timestamp")
            .or_insert_with(|| Value::String(iso_timestamp()));
        if ensure_order_id && !object.contains_key("orderId") {
            let id = self.next_order_id.fetch_add(1, Ordering::SeqCst);
            object.insert("orderId".to_string(), Value::from(id));
        }
    }

    /// Mint a fresh workflow orderId
    #[must_use]
    pub fn mint_workflow_id(&self) -> Uuid {
        Uuid::new_v4()
    }

    async fn dispatch(&self, mut message: OutboundMessage, options: &SendOptions) -> SendReport {
        self.enrich(&mut message.payload, options.ensure_order_id);

        let findings = if message.template.is_empty() {
            Vec::new()
        } else {
            self.templates.validate_payload(&message.template, &message.payload)
        };

        let (qos, retain) = self.qos_retain(&message.topic, options);
        let published = self
            .client
            .publish_json(&message.topic, &message.payload, qos, retain)
            .await;

        if published {
            tracing::debug!(topic = %message.topic, qos, retain, "message sent");
        }

        SendReport {
            topic: message.topic,
            published,
            qos,
            retain,
            findings,
        }
    }

    /// Registry topic configuration wins over per-send options
    fn qos_retain(&self, concrete_topic: &str, options: &SendOptions) -> (u8, bool) {
        let config = self.registry.topic_config(concrete_topic);
        let qos = config
            .as_ref()
            .and_then(|c| c.qos)
            .or(options.qos)
            .unwrap_or(1);
        let retain = config
            .as_ref()
            .and_then(|c| c.retain)
            .or(options.retain)
            .unwrap_or(false);
        (qos, retain)
    }
}
