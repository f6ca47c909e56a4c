//! Typed payloads for the factory's MQTT message families
//!
//! One tagged struct per outbound family; JSON field naming follows the
//! wire protocol (camelCase, ISO-8601 UTC timestamps with `Z`, lowercase
//! hyphenated v4 UUIDs). Serialization to `serde_json::Value` happens at
//! the gateway boundary, not here.

pub mod generator;
pub mod routes;
pub mod sequence;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};
pub use generator::{FTS_SERIAL, FtsCommand, MessageGenerator, ModuleOrderParams};
pub use routes::{Route, RouteSegment, route, route_names};
pub use sequence::{SequenceStep, planned_commands, sequence_for};

/// Current wall-clock time as ISO-8601 UTC with a trailing `Z`
#[must_use]
pub fn iso_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Workpiece color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WorkpieceColor {
    Red,
    White,
    Blue,
}

impl WorkpieceColor {
    /// Parse from a case-insensitive string
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for unknown colors.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "RED" => Ok(Self::Red),
            "WHITE" => Ok(Self::White),
            "BLUE" => Ok(Self::Blue),
            other => Err(Error::Config(format!("unknown workpiece color: {other}"))),
        }
    }
}

/// CCU order kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Production,
    Storage,
    Retrieval,
}

impl OrderType {
    /// Parse from a case-insensitive string
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for unknown order types.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PRODUCTION" => Ok(Self::Production),
            "STORAGE" => Ok(Self::Storage),
            "RETRIEVAL" => Ok(Self::Retrieval),
            other => Err(Error::Config(format!("unknown order type: {other}"))),
        }
    }
}

/// Metadata of a module order action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleActionMetadata {
    /// Scheduling priority (`NORMAL`, `HIGH`)
    pub priority: String,

    /// Step timeout in seconds
    pub timeout: u64,

    /// Workpiece type the step operates on
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub workpiece: Option<WorkpieceColor>,
}

impl Default for ModuleActionMetadata {
    fn default() -> Self {
        Self {
            priority: "NORMAL".to_string(),
            timeout: 300,
            workpiece: None,
        }
    }
}

/// The single action of a module order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleOrderAction {
    /// Fresh v4 UUID per action
    pub id: Uuid,

    /// Module command (`PICK`, `DRILL`, …)
    pub command: String,

    /// Action metadata
    pub metadata: ModuleActionMetadata,
}

/// Order for one processing module, VDA 5050 dialect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleOrder {
    /// Target module serial
    pub serial_number: String,

    /// Workflow identity, constant across the workflow
    pub order_id: Uuid,

    /// Monotonic counter within the order
    pub order_update_id: u32,

    /// The commanded action
    pub action: ModuleOrderAction,

    /// ISO-8601 UTC emission time
    pub timestamp: String,
}

/// Production/logistics request addressed to the CCU
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CcuOrderRequest {
    /// Workpiece color
    #[serde(rename = "type")]
    pub color: WorkpieceColor,

    /// Order kind
    pub order_type: OrderType,

    /// Specific workpiece (NFC id), when targeting one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workpiece_id: Option<String>,

    /// Request AI quality inspection during production
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_inspection: Option<bool>,

    /// ISO-8601 UTC emission time
    pub timestamp: String,
}

/// One instant action for the transport vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FtsAction {
    /// Wire-level action type (`findInitialDockPosition`, …)
    pub action_type: String,

    /// Fresh v4 UUID per action
    pub action_id: Uuid,

    /// Action-specific metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Instant action envelope for the transport vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FtsInstantAction {
    /// FTS serial
    pub serial_number: String,

    /// ISO-8601 UTC emission time
    pub timestamp: String,

    /// Actions to execute immediately
    pub actions: Vec<FtsAction>,
}

/// Node action kind on a navigation route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeActionType {
    /// Traverse without stopping
    Pass,
    /// Dock at the node (terminal only)
    Dock,
}

/// Load metadata of a DOCK action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationActionMetadata {
    /// Workpiece type being carried
    pub load_type: String,

    /// Workpiece NFC id, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_id: Option<String>,
}

/// Action attached to a navigation node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationAction {
    /// Fresh v4 UUID per action
    pub id: Uuid,

    /// PASS on intermediate nodes, DOCK on the terminal node
    #[serde(rename = "type")]
    pub kind: NodeActionType,

    /// Present on DOCK actions only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<NavigationActionMetadata>,
}

/// One node of a navigation route graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationNode {
    /// Node id (module serial or crossing number)
    pub id: String,

    /// Ids of the edges touching this node on the route
    pub linked_edges: Vec<String>,

    /// The node's action
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<NavigationAction>,
}

/// One edge of a navigation route graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationEdge {
    /// Edge id (`<from>_<to>`)
    pub id: String,

    /// Segment length in millimeters
    pub length: u32,

    /// The two nodes this edge connects, route order
    pub linked_nodes: [String; 2],
}

/// Multi-node navigation order for the transport vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FtsNavigationOrder {
    /// FTS serial
    pub serial_number: String,

    /// Order identity; defaults to `fts-navigation-<route>-<hex8>`
    pub order_id: String,

    /// Starts at 0 for a fresh navigation order
    pub order_update_id: u32,

    /// ISO-8601 UTC emission time
    pub timestamp: String,

    /// Route nodes in traversal order
    pub nodes: Vec<NavigationNode>,

    /// Route edges; `len == nodes.len() - 1`
    pub edges: Vec<NavigationEdge>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    #[test]
    fn timestamp_is_utc_with_z() {
        let ts = iso_timestamp();
        assert!(ts.ends_with('Z'));
        let parsed = DateTime::parse_from_rfc3339(&ts).unwrap();
        assert_eq!(parsed.offset().local_minus_utc(), 0);
    }

    #[test]
    fn module_order_wire_naming() {
        let order = ModuleOrder {
            serial_number: "SVR4H76449".to_string(),
            order_id: Uuid::new_v4(),
            order_update_id: 1,
            action: ModuleOrderAction {
                id: Uuid::new_v4(),
                command: "DRILL".to_string(),
                metadata: ModuleActionMetadata::default(),
            },
            timestamp: iso_timestamp(),
        };
        let value = serde_json::to_value(&order).unwrap();

        assert!(value.get("serialNumber").is_some());
        assert!(value.get("orderId").is_some());
        assert_eq!(value["orderUpdateId"], 1);
        assert_eq!(value["action"]["command"], "DRILL");
        assert_eq!(value["action"]["metadata"]["priority"], "NORMAL");
    }

    #[test]
    fn ccu_order_omits_absent_optionals() {
        let request = CcuOrderRequest {
            color: WorkpieceColor::Red,
            order_type: OrderType::Production,
            workpiece_id: None,
            ai_inspection: None,
            timestamp: iso_timestamp(),
        };
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["type"], "RED");
        assert_eq!(value["orderType"], "PRODUCTION");
        assert!(value.get("workpieceId").is_none());
        assert!(value.get("aiInspection").is_none());
    }

    #[test]
    fn navigation_action_type_casing() {
        let action = NavigationAction {
            id: Uuid::new_v4(),
            kind: NodeActionType::Dock,
            metadata: Some(NavigationActionMetadata {
                load_type: "WHITE".to_string(),
                load_id: Some("04798eca341290".to_string()),
            }),
        };
        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(value["type"], "DOCK");
        assert_eq!(value["metadata"]["loadType"], "WHITE");
        assert_eq!(value["metadata"]["loadId"], "04798eca341290");
    }

    #[test]
    fn color_parse_is_case_insensitive() {
        assert_eq!(WorkpieceColor::parse("red").unwrap(), WorkpieceColor::Red);
        assert!(WorkpieceColor::parse("GREEN").is_err());
    }
}
