//! Command lifecycle: records, the reducing state store, the executor, and
//! cooperative interruption.
//!
//! A command is the lifecycle-tracked unit of work created from a validated
//! invocation. Its record is created by `command_requested`, mutated only by
//! the state store's reducer, and becomes immutable once terminal.

use serde::{Deserialize, Serialize};

pub mod executor;
pub mod interrupt;
pub mod store;

pub use executor::{CommandExecutor, CommandExecutorHandle};
pub use interrupt::{
    ExecutionOutcome, InterruptCoordinator, InterruptCoordinatorHandle, InterruptState,
    INTERRUPTED_BY_USER,
};
pub use store::{CommandMap, CommandSnapshot, CommandStore, CommandStoreHandle};

/// Lifecycle status of a command. Transitions are monotonic toward a
/// terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Requested,
    Approved,
    Executing,
    Completed,
    Failed,
    Rejected,
    Interrupted,
}

impl CommandStatus {
    /// Whether this status ends the lifecycle.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CommandStatus::Completed
                | CommandStatus::Failed
                | CommandStatus::Rejected
                | CommandStatus::Interrupted
        )
    }
}

/// One command's lifecycle record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRecord {
    pub id: String,
    pub tool_name: String,
    pub parameters: serde_json::Value,
    pub status: CommandStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandRecord {
    /// A fresh record in the `Requested` state.
    pub fn requested(
        id: impl Into<String>,
        tool_name: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            tool_name: tool_name.into(),
            parameters,
            status: CommandStatus::Requested,
            result: None,
            error: None,
        }
    }
}
