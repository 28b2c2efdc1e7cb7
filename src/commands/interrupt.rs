//! Cooperative interruption.
//!
//! [`run_interruptible`] races a tool action against the interrupt signal;
//! [`InterruptCoordinator`] tracks the pending/cleared drain flag for the
//! rest of the system. Interruption here is cooperative only: the action is
//! handed a cancellation token and is expected to observe it at safe
//! checkpoints; it is never preemptively killed.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::{Event, EventBus, EventKind, Subscription};
use crate::tools::ArcTool;

/// Canonical error text for a command interrupted mid-flight.
pub const INTERRUPTED_BY_USER: &str = "Execution interrupted by user";

/// What a single interruptible run observed. Exactly one of these per
/// invocation, never both an outcome and an interruption.
#[derive(Debug, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// The action settled successfully.
    Completed(String),
    /// The action settled with an error, or faulted.
    Failed(String),
    /// The interrupt won the race; the action was asked to cancel.
    Interrupted,
}

/// Run a tool action, racing it against `interrupts`.
///
/// The action runs in its own task so that a panic inside the tool becomes
/// a `Failed` outcome instead of tearing down the caller's loop. If the
/// interrupt arrives first, the cancellation token is signalled and the
/// task is left to drain on its own.
pub(crate) async fn run_interruptible(
    tool: ArcTool,
    parameters: serde_json::Value,
    interrupts: &mut Subscription,
) -> ExecutionOutcome {
    let cancel = CancellationToken::new();
    let action_cancel = cancel.clone();
    let mut action =
        tokio::spawn(async move { tool.run(parameters, &action_cancel).await });

    loop {
        tokio::select! {
            joined = &mut action => {
                return match joined {
                    Ok(Ok(result)) => ExecutionOutcome::Completed(result),
                    Ok(Err(e)) => ExecutionOutcome::Failed(e.to_string()),
                    Err(join_err) if join_err.is_panic() => {
                        let payload = join_err.into_panic();
                        let message = payload
                            .downcast_ref::<&str>()
                            .map(|s| (*s).to_string())
                            .or_else(|| payload.downcast_ref::<String>().cloned())
                            .unwrap_or_else(|| "tool panicked".to_string());
                        warn!(error = %message, "tool action panicked");
                        ExecutionOutcome::Failed(format!("tool panicked: {message}"))
                    }
                    Err(_) => {
                        ExecutionOutcome::Failed("tool task was cancelled".to_string())
                    }
                };
            }
            Some(event) = interrupts.recv() => {
                // The subscription may also carry cleanup events; only a
                // live request wins the race.
                if matches!(event, Event::InterruptRequested { .. }) {
                    info!("interrupt won the race, signalling cooperative cancel");
                    cancel.cancel();
                    return ExecutionOutcome::Interrupted;
                }
            }
        }
    }
}

/// Pending interrupt drain state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterruptState {
    /// An interrupt was requested and its cleanup has not completed yet.
    pub pending: bool,
    /// Reason given with the most recent request.
    pub reason: Option<String>,
}

/// Spawns the interrupt-tracking task; see [`InterruptCoordinator::spawn`].
pub struct InterruptCoordinator;

impl InterruptCoordinator {
    /// Spawn the coordinator task on `bus`.
    ///
    /// Sets the pending flag on `interrupt_requested` and clears it on
    /// `interrupt_cleanup_completed`. The flag is advisory: enforcement of
    /// a start gate is the executor's configuration choice.
    pub fn spawn(bus: &EventBus) -> InterruptCoordinatorHandle {
        let mut events = bus.subscribe_kinds(&[
            EventKind::InterruptRequested,
            EventKind::InterruptCleanupCompleted,
        ]);
        let (state_tx, state_rx) = watch::channel(InterruptState::default());

        let task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    Event::InterruptRequested { reason } => {
                        debug!(reason = %reason, "interrupt pending");
                        let _ = state_tx.send(InterruptState {
                            pending: true,
                            reason: Some(reason),
                        });
                    }
                    Event::InterruptCleanupCompleted => {
                        debug!("interrupt drain completed");
                        let _ = state_tx.send(InterruptState::default());
                    }
                    _ => {}
                }
            }
            debug!("interrupt coordinator exited");
        });

        InterruptCoordinatorHandle { state_rx, task }
    }
}

/// Read access to the interrupt drain state.
pub struct InterruptCoordinatorHandle {
    state_rx: watch::Receiver<InterruptState>,
    task: JoinHandle<()>,
}

impl InterruptCoordinatorHandle {
    /// Current drain state.
    pub fn state(&self) -> InterruptState {
        self.state_rx.borrow().clone()
    }

    /// Whether an interrupt drain is in progress.
    pub fn is_draining(&self) -> bool {
        self.state_rx.borrow().pending
    }

    /// A fresh watch receiver for other readers.
    pub fn watch(&self) -> watch::Receiver<InterruptState> {
        self.state_rx.clone()
    }

    /// Stop the coordinator task.
    pub fn abort(&self) {
        self.task.abort();
    }
}
