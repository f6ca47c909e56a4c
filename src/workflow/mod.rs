//! Workflow order lifecycle
//!
//! A workflow groups every command sent to one module under a single
//! orderId. The manager owns the counters: the orderId is a fresh v4
//! UUID at start, and each executed command gets the next
//! orderUpdateId, strictly monotonic within the workflow. Finished
//! workflows stay queryable until pruned.

use std::collections::HashMap;
use std::sync::Mutex;

use uuid::Uuid;

use crate::{Error, Result};

/// Lifecycle state of a workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    /// Accepting commands
    Active,
    /// Finished normally
    Completed,
    /// Aborted by the operator
    Cancelled,
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// One executed command within a workflow
#[derive(Debug, Clone)]
pub struct OrderStep {
    /// Workflow identity, constant across steps
    pub order_id: Uuid,

    /// Strictly monotonic within the workflow, starting at 1
    pub order_update_id: u32,

    /// The module command executed
    pub command: String,

    /// Zero-based position within the workflow
    pub index: usize,
}

/// Snapshot of one workflow
#[derive(Debug, Clone)]
pub struct WorkflowSnapshot {
    /// Workflow orderId
    pub order_id: Uuid,

    /// Target module id
    pub module: String,

    /// Lifecycle state
    pub state: WorkflowState,

    /// Commands executed so far, in order
    pub executed: Vec<String>,

    /// Last issued orderUpdateId (0 before the first command)
    pub last_update_id: u32,
}

struct Workflow {
    module: String,
    state: WorkflowState,
    executed: Vec<String>,
    next_update_id: u32,
    /// Planned command sequence; empty means freeform
    planned: Vec<String>,
}

/// Manager of per-module workflow orders
pub struct WorkflowOrderManager {
    workflows: Mutex<HashMap<Uuid, Workflow>>,
}

impl Default for WorkflowOrderManager {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowOrderManager {
    /// Create an empty manager
    #[must_use]
    pub fn new() -> Self {
        Self {
            workflows: Mutex::new(HashMap::new()),
        }
    }

    /// Start a workflow for a module and return its fresh orderId
    ///
    /// `commands` is the planned sequence; with a non-empty plan,
    /// commands must arrive in the planned order. An empty plan accepts
    /// any commands. [`crate::messages::planned_commands`] supplies the
    /// standard sequence for the processing modules.
    #[must_use]
    pub fn start_workflow(&self, module: &str, commands: Vec<String>) -> Uuid {
        let order_id = Uuid::new_v4();
        let workflow = Workflow {
            module: module.to_string(),
            state: WorkflowState::Active,
            executed: Vec::new(),
            next_update_id: 1,
            planned: commands,
        };
        self.lock().insert(order_id, workflow);
        tracing::info!(order_id = %order_id, module, "workflow started");
        order_id
    }

    /// Execute one command within a workflow
    ///
    /// Returns the step carrying the workflow's orderId and the next
    /// strictly monotonic orderUpdateId.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowNotFound` for unknown ids, `WorkflowNotActive`
    /// after completion or cancellation, and `CommandOutOfSequence` when
    /// the workflow has a plan and the command deviates from it.
    pub fn execute_command(&self, order_id: Uuid, command: &str) -> Result<OrderStep> {
        let mut workflows = self.lock();
        let workflow = workflows
            .get_mut(&order_id)
            .ok_or(Error::WorkflowNotFound(order_id))?;

        if workflow.state != WorkflowState::Active {
            return Err(Error::WorkflowNotActive {
                order_id,
                state: workflow.state.to_string(),
            });
        }

        if !workflow.planned.is_empty() {
            match workflow.planned.get(workflow.executed.len()) {
                Some(expected) if expected.as_str() == command => {}
                Some(expected) => {
                    return Err(Error::CommandOutOfSequence {
                        expected: expected.clone(),
                        got: command.to_string(),
                    });
                }
                None => {
                    return Err(Error::CommandOutOfSequence {
                        expected: "<sequence complete>".to_string(),
                        got: command.to_string(),
                    });
                }
            }
        }

        let order_update_id = workflow.next_update_id;
        workflow.next_update_id += 1;
        let index = workflow.executed.len();
        workflow.executed.push(command.to_string());

        tracing::debug!(
            order_id = %order_id,
            order_update_id,
            command,
            "workflow command executed"
        );

        Ok(OrderStep {
            order_id,
            order_update_id,
            command: command.to_string(),
            index,
        })
    }

    /// Mark a workflow completed
    ///
    /// # Errors
    ///
    /// Returns `WorkflowNotFound` for unknown ids and `WorkflowNotActive`
    /// when the workflow already finished.
    pub fn complete_workflow(&self, order_id: Uuid) -> Result<()> {
        self.finish(order_id, WorkflowState::Completed)
    }

    /// Mark a workflow cancelled
    ///
    /// # Errors
    ///
    /// Same as [`WorkflowOrderManager::complete_workflow`].
    pub fn cancel_workflow(&self, order_id: Uuid) -> Result<()> {
        self.finish(order_id, WorkflowState::Cancelled)
    }

    /// Snapshot of one workflow, finished ones included until pruned
    #[must_use]
    pub fn get_workflow(&self, order_id: Uuid) -> Option<WorkflowSnapshot> {
        self.lock().get(&order_id).map(|w| WorkflowSnapshot {
            order_id,
            module: w.module.clone(),
            state: w.state,
            executed: w.executed.clone(),
            last_update_id: w.next_update_id - 1,
        })
    }

    /// Snapshots of all workflows
    #[must_use]
    pub fn workflows(&self) -> Vec<WorkflowSnapshot> {
        self.lock()
            .iter()
            .map(|(order_id, w)| WorkflowSnapshot {
                order_id: *order_id,
                module: w.module.clone(),
                state: w.state,
                executed: w.executed.clone(),
                last_update_id: w.next_update_id - 1,
            })
            .collect()
    }

    /// Number of active workflows
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.lock()
            .values()
            .filter(|w| w.state == WorkflowState::Active)
            .count()
    }

    /// Drop finished workflows, returning how many were removed
    pub fn prune_finished(&self) -> usize {
        let mut workflows = self.lock();
        let before = workflows.len();
        workflows.retain(|_, w| w.state == WorkflowState::Active);
        before - workflows.len()
    }

    fn finish(&self, order_id: Uuid, state: WorkflowState) -> Result<()> {
        let mut workflows = self.lock();
        let workflow = workflows
            .get_mut(&order_id)
            .ok_or(Error::WorkflowNotFound(order_id))?;
        if workflow.state != WorkflowState::Active {
            return Err(Error::WorkflowNotActive {
                order_id,
                state: workflow.state.to_string(),
            });
        }
        workflow.state = state;
        tracing::info!(
            order_id = %order_id,
            state = %state,
            steps = workflow.executed.len(),
            "workflow finished"
        );
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Workflow>> {
        self.workflows
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
