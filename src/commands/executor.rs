//! Command executor.
//!
//! Subscribes to `command_started`, looks the command up in the state
//! store's snapshot, runs the named tool interruptibly, and publishes the
//! terminal lifecycle event. One command runs at a time, in start order,
//! and each id is launched at most once for the lifetime of the executor.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::interrupt::{run_interruptible, ExecutionOutcome, InterruptState, INTERRUPTED_BY_USER};
use super::store::CommandSnapshot;
use crate::config::PipelineConfig;
use crate::events::{Event, EventBus, EventKind};
use crate::tools::ToolRegistry;

/// Error text published when the start gate is enabled and a drain is
/// in progress.
const BLOCKED_WHILE_DRAINING: &str = "Execution blocked while interrupt drain in progress";

/// Spawns the execution loop; see [`CommandExecutor::spawn`].
pub struct CommandExecutor;

impl CommandExecutor {
    /// Spawn the executor task on `bus`.
    ///
    /// `commands` must come from a running state store on the same bus; the
    /// store publishes its snapshot before republishing `command_started`,
    /// so the lookup here always sees the approved record.
    pub fn spawn(
        bus: &EventBus,
        registry: Arc<ToolRegistry>,
        commands: watch::Receiver<CommandSnapshot>,
        interrupt_state: watch::Receiver<InterruptState>,
        config: &PipelineConfig,
    ) -> CommandExecutorHandle {
        let mut starts = bus.subscribe_kinds(&[EventKind::CommandStarted]);
        let mut interrupts = bus.subscribe_kinds(&[
            EventKind::InterruptRequested,
            EventKind::InterruptCleanupCompleted,
        ]);
        let block_while_draining = config.block_starts_while_draining;
        let bus = bus.clone();

        let task = tokio::spawn(async move {
            let mut launched: HashSet<String> = HashSet::new();
            while let Some(event) = starts.recv().await {
                let Event::CommandStarted { id } = event else {
                    continue;
                };

                // Settled ids no longer need the launch guard; the terminal
                // status check below blocks their re-launch.
                {
                    let snapshot = commands.borrow().clone();
                    launched.retain(|prior| {
                        snapshot.get(prior).map_or(true, |r| !r.status.is_terminal())
                    });
                }

                let record = match lookup(&commands, &id) {
                    Some(record) => record,
                    None => {
                        warn!(id = %id, "start event for unknown command ignored");
                        continue;
                    }
                };
                if record.status.is_terminal() {
                    debug!(id = %id, status = ?record.status, "start for settled command ignored");
                    continue;
                }
                if !launched.insert(id.clone()) {
                    debug!(id = %id, "command already launched, ignoring");
                    continue;
                }

                if block_while_draining && interrupt_state.borrow().pending {
                    info!(id = %id, "refusing start while interrupt drain pending");
                    bus.publish(Event::command_failed(&id, BLOCKED_WHILE_DRAINING));
                    continue;
                }

                let tool = match registry.get(&record.tool_name) {
                    Some(tool) => tool.clone(),
                    None => {
                        warn!(id = %id, tool = %record.tool_name, "tool missing at launch");
                        bus.publish(Event::command_failed(
                            &id,
                            format!("Unknown tool: {}", record.tool_name),
                        ));
                        continue;
                    }
                };

                // Settle interrupts queued since the last launch. A request
                // whose drain has not completed interrupts this command
                // before its action starts; one a cleanup already answered
                // is spent.
                let mut interrupt_waiting = false;
                while let Ok(Some(queued)) = interrupts.try_recv() {
                    match queued {
                        Event::InterruptRequested { .. } => interrupt_waiting = true,
                        Event::InterruptCleanupCompleted => interrupt_waiting = false,
                        _ => {}
                    }
                }
                if interrupt_waiting {
                    info!(id = %id, "interrupt pending at launch");
                    bus.publish(Event::command_failed(&id, INTERRUPTED_BY_USER));
                    bus.publish(Event::InterruptCleanupCompleted);
                    continue;
                }

                info!(id = %id, tool = %record.tool_name, "launching command");
                let outcome =
                    run_interruptible(tool, record.parameters.clone(), &mut interrupts).await;
                match outcome {
                    ExecutionOutcome::Completed(result) => {
                        info!(id = %id, "command completed");
                        bus.publish(Event::command_completed(&id, result));
                    }
                    ExecutionOutcome::Failed(error) => {
                        warn!(id = %id, error = %error, "command failed");
                        bus.publish(Event::command_failed(&id, error));
                    }
                    ExecutionOutcome::Interrupted => {
                        info!(id = %id, "command interrupted");
                        bus.publish(Event::command_failed(&id, INTERRUPTED_BY_USER));
                        bus.publish(Event::InterruptCleanupCompleted);
                    }
                }
            }
            debug!("command executor exited");
        });

        CommandExecutorHandle { task }
    }
}

fn lookup(
    commands: &watch::Receiver<CommandSnapshot>,
    id: &str,
) -> Option<super::CommandRecord> {
    commands.borrow().get(id).cloned()
}

/// Handle to the running executor task.
pub struct CommandExecutorHandle {
    task: JoinHandle<()>,
}

impl CommandExecutorHandle {
    /// Stop the executor task.
    pub fn abort(&self) {
        self.task.abort();
    }
}
