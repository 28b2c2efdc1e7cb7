//! Reactive command state store.
//!
//! One reducer task owns the command map and folds the lifecycle event
//! stream into it; everything outside the task sees only immutable
//! snapshots through a watch channel. Approving a `Requested` command
//! republishes `command_started` exactly once, which is the idempotency
//! contract under duplicate approval events.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{CommandRecord, CommandStatus, INTERRUPTED_BY_USER};
use crate::events::{Event, EventBus, EventKind};

/// The full command map.
pub type CommandMap = HashMap<String, CommandRecord>;

/// An immutable snapshot of the command map.
pub type CommandSnapshot = Arc<CommandMap>;

/// Event kinds the reducer folds. `CommandStarted` is included so the
/// store itself can move `Approved` records to `Executing` when its own
/// republished start event comes back around.
const REDUCED_KINDS: [EventKind; 6] = [
    EventKind::CommandRequested,
    EventKind::ExecutionApproved,
    EventKind::ExecutionRejected,
    EventKind::CommandStarted,
    EventKind::CommandCompleted,
    EventKind::CommandFailed,
];

/// Outcome of applying one event to the map.
struct Transition {
    changed: bool,
    republish: Option<Event>,
}

impl Transition {
    fn none() -> Self {
        Self {
            changed: false,
            republish: None,
        }
    }

    fn changed() -> Self {
        Self {
            changed: true,
            republish: None,
        }
    }
}

/// Spawns and owns nothing itself; see [`CommandStore::spawn`].
pub struct CommandStore;

impl CommandStore {
    /// Spawn the reducer task on `bus`.
    ///
    /// The subscription starts at the moment of the call, so the store must
    /// be running before lifecycle events are published (there is no replay).
    pub fn spawn(bus: &EventBus) -> CommandStoreHandle {
        let mut events = bus.subscribe_kinds(&REDUCED_KINDS);
        let (snapshot_tx, snapshot_rx) = watch::channel(CommandSnapshot::default());
        let bus = bus.clone();

        let task = tokio::spawn(async move {
            let mut commands = CommandMap::new();
            while let Some(event) = events.recv().await {
                let transition = apply_event(&mut commands, &event);
                if transition.changed {
                    // Snapshot before republishing, so a subscriber reacting
                    // to the follow-up event always observes the new state.
                    let _ = snapshot_tx.send(Arc::new(commands.clone()));
                }
                if let Some(follow_up) = transition.republish {
                    bus.publish(follow_up);
                }
            }
            debug!("command store reducer exited");
        });

        CommandStoreHandle { snapshot_rx, task }
    }
}

/// Read access to the store: immutable snapshots plus change notification.
pub struct CommandStoreHandle {
    snapshot_rx: watch::Receiver<CommandSnapshot>,
    task: JoinHandle<()>,
}

impl CommandStoreHandle {
    /// Current snapshot of the command map.
    pub fn snapshot(&self) -> CommandSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// One command's record, cloned out of the current snapshot.
    pub fn get(&self, id: &str) -> Option<CommandRecord> {
        self.snapshot_rx.borrow().get(id).cloned()
    }

    /// A fresh watch receiver for other readers (executor, sinks).
    pub fn watch(&self) -> watch::Receiver<CommandSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Wait for the next snapshot change. Returns `false` once the reducer
    /// task is gone.
    pub async fn changed(&mut self) -> bool {
        self.snapshot_rx.changed().await.is_ok()
    }

    /// Stop the reducer task.
    pub fn abort(&self) {
        self.task.abort();
    }
}

/// The pure reducer: applies one event to the command map per the
/// transition table. Unknown ids and out-of-order events are no-ops, never
/// fatal; terminal records are immutable.
fn apply_event(commands: &mut CommandMap, event: &Event) -> Transition {
    match event {
        Event::CommandRequested {
            id,
            tool,
            parameters,
        } => {
            if commands.contains_key(id) {
                warn!(id = %id, "duplicate command request ignored");
                return Transition::none();
            }
            commands.insert(
                id.clone(),
                CommandRecord::requested(id.clone(), tool.clone(), parameters.clone()),
            );
            debug!(id = %id, tool = %tool, "command requested");
            Transition::changed()
        }
        Event::ExecutionApproved { id } => match commands.get_mut(id) {
            Some(record) if record.status == CommandStatus::Requested => {
                record.status = CommandStatus::Approved;
                debug!(id = %id, "command approved");
                Transition {
                    changed: true,
                    republish: Some(Event::command_started(id.clone())),
                }
            }
            Some(record) => {
                debug!(id = %id, status = ?record.status, "redundant approval ignored");
                Transition::none()
            }
            None => {
                debug!(id = %id, "approval for unknown command ignored");
                Transition::none()
            }
        },
        Event::CommandStarted { id } => match commands.get_mut(id) {
            Some(record) if record.status == CommandStatus::Approved => {
                record.status = CommandStatus::Executing;
                Transition::changed()
            }
            _ => Transition::none(),
        },
        Event::ExecutionRejected { id, reason } => match commands.get_mut(id) {
            Some(record)
                if matches!(
                    record.status,
                    CommandStatus::Requested | CommandStatus::Approved
                ) =>
            {
                record.status = CommandStatus::Rejected;
                record.error = Some(reason.clone());
                debug!(id = %id, "command rejected");
                Transition::changed()
            }
            _ => Transition::none(),
        },
        Event::CommandCompleted { id, result } => match commands.get_mut(id) {
            Some(record) if record.status == CommandStatus::Executing => {
                record.status = CommandStatus::Completed;
                record.result = Some(result.clone());
                debug!(id = %id, "command completed");
                Transition::changed()
            }
            _ => Transition::none(),
        },
        Event::CommandFailed { id, error } => match commands.get_mut(id) {
            Some(record) if record.status == CommandStatus::Executing => {
                record.status = if error == INTERRUPTED_BY_USER {
                    CommandStatus::Interrupted
                } else {
                    CommandStatus::Failed
                };
                record.error = Some(error.clone());
                debug!(id = %id, status = ?record.status, "command failed");
                Transition::changed()
            }
            _ => Transition::none(),
        },
        _ => Transition::none(),
    }
}
