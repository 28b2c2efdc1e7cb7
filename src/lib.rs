//! Tagflow Library
//!
//! Event-driven command pipeline for tag-structured model output: an
//! incremental parser for the ANTML streamed tag protocol, a typed
//! publish/subscribe event bus, a schema-validating tool registry, a
//! reducing command state store with approval idempotency, and an
//! interruptible command executor.
//!
//! ## Main Components
//!
//! - [`parser`] - Incremental ANTML parser (StreamParser, ParsedItem)
//! - [`events`] - Event types and the in-process bus (Event, EventBus)
//! - [`tools`] - Tool trait, registry, and parameter validation
//! - [`commands`] - Command lifecycle: state store, executor, interruption
//! - [`config`] - Pipeline configuration
//! - [`pipeline`] - Wired-up pipeline and streaming session facade
//!
//! ## Quick Start
//!
//! ```ignore
//! use tagflow::{Pipeline, PipelineConfig, ToolRegistry};
//!
//! let pipeline = Pipeline::new(ToolRegistry::new(my_tools), PipelineConfig::default());
//! let mut session = pipeline.session();
//! for id in session.push_chunk(&chunk) {
//!     pipeline.approve(&id);
//! }
//! ```

pub mod commands;
pub mod config;
pub mod events;
pub mod parser;
pub mod pipeline;
pub mod tools;

// Re-export commonly used types
pub use commands::{
    CommandExecutor, CommandExecutorHandle, CommandMap, CommandRecord, CommandSnapshot,
    CommandStatus, CommandStore, CommandStoreHandle, ExecutionOutcome, InterruptCoordinator,
    InterruptCoordinatorHandle, InterruptState, INTERRUPTED_BY_USER,
};
pub use config::PipelineConfig;
pub use events::{BusError, Event, EventBus, EventKind, Subscription};
pub use parser::{
    FunctionCall, ParsedItem, StreamParser, ValidationErrorKind, ValidationFailure,
};
pub use pipeline::{Pipeline, StreamSession};
pub use tools::{validate_parameters, ArcTool, Tool, ToolDefinition, ToolError, ToolRegistry};
