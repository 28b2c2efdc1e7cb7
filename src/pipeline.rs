//! Assembled pipeline: bus, state store, interrupt coordinator, and
//! executor wired together, plus the streaming session facade that turns
//! parsed items into bus events.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::commands::{
    CommandExecutor, CommandExecutorHandle, CommandStore, CommandStoreHandle,
    InterruptCoordinator, InterruptCoordinatorHandle, InterruptState,
};
use crate::config::PipelineConfig;
use crate::events::{Event, EventBus};
use crate::parser::{ParsedItem, StreamParser};
use crate::tools::ToolRegistry;

/// One fully wired pipeline instance.
///
/// Construction spawns the state store first, then the interrupt
/// coordinator, then the executor, so every background task is subscribed
/// before the first event can be published through this handle.
pub struct Pipeline {
    bus: EventBus,
    registry: Arc<ToolRegistry>,
    config: PipelineConfig,
    store: CommandStoreHandle,
    interrupts: InterruptCoordinatorHandle,
    executor: CommandExecutorHandle,
}

impl Pipeline {
    /// Wire up a pipeline over `registry` with the given configuration.
    pub fn new(registry: ToolRegistry, config: PipelineConfig) -> Self {
        let registry = Arc::new(registry);
        let bus = EventBus::new();
        let store = CommandStore::spawn(&bus);
        let interrupts = InterruptCoordinator::spawn(&bus);
        let executor = CommandExecutor::spawn(
            &bus,
            registry.clone(),
            store.watch(),
            interrupts.watch(),
            &config,
        );
        info!(tools = registry.len(), "pipeline started");
        Self {
            bus,
            registry,
            config,
            store,
            interrupts,
            executor,
        }
    }

    /// The shared event bus.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Read access to the command state store.
    pub fn commands(&self) -> &CommandStoreHandle {
        &self.store
    }

    /// Current interrupt drain state.
    pub fn interrupt_state(&self) -> InterruptState {
        self.interrupts.state()
    }

    /// Approve a requested command.
    pub fn approve(&self, id: &str) {
        self.bus.publish(Event::execution_approved(id));
    }

    /// Reject a pending command.
    pub fn reject(&self, id: &str, reason: &str) {
        self.bus.publish(Event::execution_rejected(id, reason));
    }

    /// Request an interrupt of whatever is in flight.
    pub fn interrupt(&self, reason: &str) {
        self.bus.publish(Event::interrupt_requested(reason));
    }

    /// Publish a user message onto the bus.
    pub fn user_message(&self, content: &str) {
        self.bus.publish(Event::user_message(content));
    }

    /// Begin a new streaming session against this pipeline's registry.
    pub fn session(&self) -> StreamSession {
        StreamSession {
            parser: StreamParser::new(self.registry.clone()),
            bus: self.bus.clone(),
            id_prefix: self.config.command_id_prefix.clone(),
        }
    }

    /// Stop every background task. In-flight tool actions are left to their
    /// cancellation tokens.
    pub fn shutdown(&self) {
        self.executor.abort();
        self.interrupts.abort();
        self.store.abort();
        debug!("pipeline shut down");
    }
}

/// One model response being streamed through the parser and onto the bus.
///
/// Each complete parsed item becomes an event immediately; validated
/// invocations are minted a fresh command id and enter the lifecycle as
/// `command_requested`.
pub struct StreamSession {
    parser: StreamParser,
    bus: EventBus,
    id_prefix: String,
}

impl StreamSession {
    /// Feed one chunk of model output.
    ///
    /// Returns the command ids minted for any invocations completed by this
    /// chunk, in invocation order.
    pub fn push_chunk(&mut self, chunk: &str) -> Vec<String> {
        let items = self.parser.push(chunk);
        publish_items(&self.bus, &self.id_prefix, items)
    }

    /// End the session, flushing any residual buffered text.
    pub fn finish(self) -> Vec<String> {
        let items = self.parser.finish();
        publish_items(&self.bus, &self.id_prefix, items)
    }
}

fn publish_items(bus: &EventBus, id_prefix: &str, items: Vec<ParsedItem>) -> Vec<String> {
    let mut minted = Vec::new();
    for item in items {
        match item {
            ParsedItem::Text { text } => {
                bus.publish(Event::stream_text(text));
            }
            ParsedItem::Thinking { text } => {
                bus.publish(Event::stream_thinking(text));
            }
            ParsedItem::ValidationError(failure) => {
                bus.publish(Event::validation_failed(failure));
            }
            ParsedItem::FunctionCall(call) => {
                let id = format!("{id_prefix}-{}", Uuid::new_v4());
                debug!(id = %id, tool = %call.tool, "minted command from invocation");
                bus.publish(Event::command_requested(&id, call.tool, call.parameters));
                minted.push(id);
            }
        }
    }
    minted
}
