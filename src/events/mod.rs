//! Event types flowing through the pipeline bus.
//!
//! Every inter-component message is an immutable [`Event`]: parsed stream
//! items for live transcripts, the command lifecycle set, and interrupt
//! signals. Events are never mutated after publish; subscribers receive
//! clones. [`EventKind`] gives a cheap discriminant for whitelist predicates.

use serde::{Deserialize, Serialize};

use crate::parser::ValidationFailure;

pub mod bus;

pub use bus::{BusError, EventBus, Subscription};

/// Any event type (for publication and serialization).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A message from the human-in-the-loop surface.
    UserMessage { content: String },
    /// Raw parsed text item, for transcript display.
    StreamText { text: String },
    /// A complete thinking block, verbatim.
    StreamThinking { text: String },
    /// An invocation the parser rejected.
    ValidationFailed { failure: ValidationFailure },
    /// A validated invocation entering the command lifecycle.
    CommandRequested {
        id: String,
        tool: String,
        parameters: serde_json::Value,
    },
    /// Human approval for a requested command.
    ExecutionApproved { id: String },
    /// Human rejection; terminal for the command.
    ExecutionRejected { id: String, reason: String },
    /// Republished by the state store on first approval, exactly once per id.
    CommandStarted { id: String },
    /// Terminal: the tool action succeeded.
    CommandCompleted { id: String, result: String },
    /// Terminal: the tool action failed, was rejected by the runtime, or was
    /// interrupted.
    CommandFailed { id: String, error: String },
    /// Request to interrupt whatever is in flight.
    InterruptRequested { reason: String },
    /// Interrupt drain finished; the pending flag clears.
    InterruptCleanupCompleted,
}

/// Discriminant of an [`Event`], used in subscription whitelists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    UserMessage,
    StreamText,
    StreamThinking,
    ValidationFailed,
    CommandRequested,
    ExecutionApproved,
    ExecutionRejected,
    CommandStarted,
    CommandCompleted,
    CommandFailed,
    InterruptRequested,
    InterruptCleanupCompleted,
}

impl Event {
    /// The event's kind discriminant.
    pub fn kind(&self) -> EventKind {
        match self {
            Event::UserMessage { .. } => EventKind::UserMessage,
            Event::StreamText { .. } => EventKind::StreamText,
            Event::StreamThinking { .. } => EventKind::StreamThinking,
            Event::ValidationFailed { .. } => EventKind::ValidationFailed,
            Event::CommandRequested { .. } => EventKind::CommandRequested,
            Event::ExecutionApproved { .. } => EventKind::ExecutionApproved,
            Event::ExecutionRejected { .. } => EventKind::ExecutionRejected,
            Event::CommandStarted { .. } => EventKind::CommandStarted,
            Event::CommandCompleted { .. } => EventKind::CommandCompleted,
            Event::CommandFailed { .. } => EventKind::CommandFailed,
            Event::InterruptRequested { .. } => EventKind::InterruptRequested,
            Event::InterruptCleanupCompleted => EventKind::InterruptCleanupCompleted,
        }
    }

    /// The command id this event refers to, if any.
    pub fn command_id(&self) -> Option<&str> {
        match self {
            Event::CommandRequested { id, .. }
            | Event::ExecutionApproved { id }
            | Event::ExecutionRejected { id, .. }
            | Event::CommandStarted { id }
            | Event::CommandCompleted { id, .. }
            | Event::CommandFailed { id, .. } => Some(id),
            _ => None,
        }
    }

    /// Create a user message event.
    pub fn user_message(content: impl Into<String>) -> Self {
        Self::UserMessage {
            content: content.into(),
        }
    }

    /// Create a stream text event.
    pub fn stream_text(text: impl Into<String>) -> Self {
        Self::StreamText { text: text.into() }
    }

    /// Create a thinking event.
    pub fn stream_thinking(text: impl Into<String>) -> Self {
        Self::StreamThinking { text: text.into() }
    }

    /// Create a validation failure event.
    pub fn validation_failed(failure: ValidationFailure) -> Self {
        Self::ValidationFailed { failure }
    }

    /// Create a command request event.
    pub fn command_requested(
        id: impl Into<String>,
        tool: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self::CommandRequested {
            id: id.into(),
            tool: tool.into(),
            parameters,
        }
    }

    /// Create an approval event.
    pub fn execution_approved(id: impl Into<String>) -> Self {
        Self::ExecutionApproved { id: id.into() }
    }

    /// Create a rejection event.
    pub fn execution_rejected(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ExecutionRejected {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Create a command started event.
    pub fn command_started(id: impl Into<String>) -> Self {
        Self::CommandStarted { id: id.into() }
    }

    /// Create a command completed event.
    pub fn command_completed(id: impl Into<String>, result: impl Into<String>) -> Self {
        Self::CommandCompleted {
            id: id.into(),
            result: result.into(),
        }
    }

    /// Create a command failed event.
    pub fn command_failed(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self::CommandFailed {
            id: id.into(),
            error: error.into(),
        }
    }

    /// Create an interrupt request event.
    pub fn interrupt_requested(reason: impl Into<String>) -> Self {
        Self::InterruptRequested {
            reason: reason.into(),
        }
    }
}
