//! Protocol-conformant payload construction
//!
//! Builds module orders, CCU order requests, FTS instant actions, and
//! multi-node FTS navigation orders. Every minted orderId/action id is a
//! fresh v4 UUID; the generator touches no shared state beyond reading
//! the registry.

use std::sync::Arc;

use uuid::Uuid;

use crate::registry::Registry;
use crate::{Error, Result};

use super::routes;
use super::{
    CcuOrderRequest, FtsAction, FtsInstantAction, FtsNavigationOrder, ModuleActionMetadata,
    ModuleOrder, ModuleOrderAction, NavigationAction, NavigationActionMetadata, NavigationEdge,
    NavigationNode, NodeActionType, OrderType, WorkpieceColor, iso_timestamp,
};

/// Serial of the autonomous transport vehicle
pub const FTS_SERIAL: &str = "5iO4";

/// Symbolic instant-action commands for the transport vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FtsCommand {
    /// Find and take the initial docking position
    Dock,
    /// Start charging at the charger
    Charge,
    /// Stop charging
    StopCharging,
    /// Reset the vehicle controller
    Reset,
}

impl FtsCommand {
    /// Parse from a case-insensitive symbolic name
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for unknown commands.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "DOCK" => Ok(Self::Dock),
            "CHARGE" => Ok(Self::Charge),
            "STOP_CHARGING" => Ok(Self::StopCharging),
            "RESET" => Ok(Self::Reset),
            other => Err(Error::Config(format!("unknown FTS command: {other}"))),
        }
    }

    /// Wire-level VDA action type
    #[must_use]
    pub const fn action_type(self) -> &'static str {
        match self {
            Self::Dock => "findInitialDockPosition",
            Self::Charge => "startCharging",
            Self::StopCharging => "stopCharging",
            Self::Reset => "reset",
        }
    }
}

/// Optional knobs of a module order
#[derive(Debug, Clone)]
pub struct ModuleOrderParams {
    /// Reuse an existing workflow orderId instead of minting one
    pub order_id: Option<Uuid>,

    /// Update counter within the order
    pub order_update_id: u32,

    /// Scheduling priority
    pub priority: String,

    /// Step timeout in seconds
    pub timeout: u64,

    /// Workpiece type the step operates on
    pub workpiece: Option<WorkpieceColor>,
}

impl Default for ModuleOrderParams {
    fn default() -> Self {
        Self {
            order_id: None,
            order_update_id: 1,
            priority: "NORMAL".to_string(),
            timeout: 300,
            workpiece: None,
        }
    }
}

/// Builder for all outbound message families
pub struct MessageGenerator {
    registry: Arc<Registry>,
}

impl MessageGenerator {
    /// Create a generator over the given registry
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Build an order for one module command
    ///
    /// # Errors
    ///
    /// Returns `UnknownModule` when `module_id` is not an enabled module
    /// and `UnsupportedCommand` when the module does not declare the
    /// command.
    pub fn module_order(
        &self,
        module_id: &str,
        command: &str,
        params: ModuleOrderParams,
    ) -> Result<ModuleOrder> {
        let module = self
            .registry
            .module(module_id)
            .ok_or_else(|| Error::UnknownModule(module_id.to_string()))?;
        if !module.commands.iter().any(|c| c == command) {
            return Err(Error::UnsupportedCommand {
                module: module_id.to_string(),
                command: command.to_string(),
            });
        }

        Ok(ModuleOrder {
            serial_number: module.serial,
            order_id: params.order_id.unwrap_or_else(Uuid::new_v4),
            order_update_id: params.order_update_id,
            action: ModuleOrderAction {
                id: Uuid::new_v4(),
                command: command.to_string(),
                metadata: ModuleActionMetadata {
                    priority: params.priority,
                    timeout: params.timeout,
                    workpiece: params.workpiece,
                },
            },
            timestamp: iso_timestamp(),
        })
    }

    /// Order topic of a module: `module/v1/ff/<serial>/order`
    ///
    /// # Errors
    ///
    /// Returns `UnknownModule` when the module is not registered.
    pub fn module_order_topic(&self, module_id: &str) -> Result<String> {
        let module = self
            .registry
            .module(module_id)
            .ok_or_else(|| Error::UnknownModule(module_id.to_string()))?;
        Ok(format!("module/v1/ff/{}/order", module.serial))
    }

    /// Build a CCU production/storage/retrieval order request
    #[must_use]
    pub fn ccu_order_request(
        &self,
        color: WorkpieceColor,
        order_type: OrderType,
        workpiece_id: Option<String>,
        ai_inspection: Option<bool>,
    ) -> CcuOrderRequest {
        CcuOrderRequest {
            color,
            order_type,
            workpiece_id,
            ai_inspection,
            timestamp: iso_timestamp(),
        }
    }

    /// Build an instant action for the transport vehicle
    #[must_use]
    pub fn fts_instant_action(
        &self,
        command: FtsCommand,
        metadata: Option<serde_json::Value>,
    ) -> FtsInstantAction {
        FtsInstantAction {
            serial_number: FTS_SERIAL.to_string(),
            timestamp: iso_timestamp(),
            actions: vec![FtsAction {
                action_type: command.action_type().to_string(),
                action_id: Uuid::new_v4(),
                metadata,
            }],
        }
    }

    /// Instant-action topic of the transport vehicle
    #[must_use]
    pub fn fts_instant_action_topic(&self) -> String {
        format!("fts/v1/ff/{FTS_SERIAL}/instantAction")
    }

    /// Navigation-order topic of the transport vehicle
    #[must_use]
    pub fn fts_order_topic(&self) -> String {
        format!("fts/v1/ff/{FTS_SERIAL}/order")
    }

    /// Build a multi-node navigation order for a declared route
    ///
    /// Intermediate nodes carry PASS actions; the terminal node carries a
    /// DOCK action with the load metadata. Returns `None` for unknown
    /// route names and records nothing.
    #[must_use]
    pub fn fts_navigation(
        &self,
        route_type: &str,
        load_type: &str,
        load_id: Option<String>,
        order_id: Option<String>,
    ) -> Option<FtsNavigationOrder> {
        let route = routes::route(route_type)?;
        let segments = route.segments();

        let edges: Vec<NavigationEdge> = segments
            .iter()
            .map(|s| NavigationEdge {
                id: format!("{}_{}", s.from, s.to),
                length: s.length,
                linked_nodes: [s.from.to_string(), s.to.to_string()],
            })
            .collect();

        let last = route.nodes.len() - 1;
        let nodes: Vec<NavigationNode> = route
            .nodes
            .iter()
            .enumerate()
            .map(|(i, node)| {
                let mut linked_edges = Vec::new();
                if i > 0 {
                    linked_edges.push(edges[i - 1].id.clone());
                }
                if i < last {
                    linked_edges.push(edges[i].id.clone());
                }
                let action = if i == last {
                    NavigationAction {
                        id: Uuid::new_v4(),
                        kind: NodeActionType::Dock,
                        metadata: Some(NavigationActionMetadata {
                            load_type: load_type.to_string(),
                            load_id: load_id.clone(),
                        }),
                    }
                } else {
                    NavigationAction {
                        id: Uuid::new_v4(),
                        kind: NodeActionType::Pass,
                        metadata: None,
                    }
                };
                NavigationNode {
                    id: (*node).to_string(),
                    linked_edges,
                    action: Some(action),
                }
            })
            .collect();

        Some(FtsNavigationOrder {
            serial_number: FTS_SERIAL.to_string(),
            order_id: order_id.unwrap_or_else(|| default_navigation_order_id(route.name)),
            order_update_id: 0,
            timestamp: iso_timestamp(),
            nodes,
            edges,
        })
    }
}

/// `fts-navigation-<route_lower>-<8 hex>`
fn default_navigation_order_id(route_name: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("fts-navigation-{}-{}", route_name.to_lowercase(), &hex[..8])
}
