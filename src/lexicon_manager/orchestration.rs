use log::{debug, error, info};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::LexiconManager;
use crate::controller::{ControllerEvent, PollOutcome};
use crate::poll_scheduler::PollKind;
use crate::{CommandFailure, ManagerError, ManagerOutputMessage, ReceiverCommand};

// ------------------------------------------------------------------------------------------------
// Orchestration between the Manager, the poll scheduler, and the controller
//
// These functions are invoked as a result of:
//
//  * A received `ManagerMessage` from the caller.
//  * A poll falling due in the scheduler.
//  * A completed poll or command task.
//  * A `ControllerEvent` from the controller.
// ------------------------------------------------------------------------------------------------

impl LexiconManager {
    /// Run a poll as a tracked task. The result arrives on the poll-done channel.
    pub(crate) fn start_poll(
        &mut self,
        task_tracker: &TaskTracker,
        cancel_token: &CancellationToken,
        kind: PollKind,
    ) {
        debug!("Starting {:?} poll (phase: {})", kind, self.scheduler.phase());

        self.poll_in_flight = true;

        let controller = self.controller.clone();
        let poll_done_tx = self.poll_done_tx.clone();
        let cancel_token = cancel_token.clone();

        task_tracker.spawn(async move {
            if cancel_token.is_cancelled() {
                debug!("Manager is shutting down; skipping {:?} poll", kind);
                return;
            }

            let outcome = controller.poll(kind).await;
            let _ = poll_done_tx.send(outcome);
        });
    }

    /// Feed a completed poll back into the scheduler.
    pub(crate) async fn handle_poll_done(&mut self, outcome: PollOutcome) {
        self.poll_in_flight = false;

        debug!(
            "{:?} poll complete: power {:?}, ready: {}",
            outcome.kind, outcome.observation, outcome.is_ready
        );

        let phase_change =
            self.scheduler
                .record_poll(outcome.kind, outcome.observation, Instant::now());

        if let Some(phase) = phase_change {
            info!(
                "Poll phase is now {}; next poll in {:?}",
                phase,
                self.scheduler.interval()
            );
            self.emit_poll_phase().await;
        }
    }

    /// Run a receiver command as a tracked task. The result arrives on the command-done channel.
    ///
    /// Accepted commands are always run, even if a shutdown arrives before they reach the
    /// receiver.
    pub(crate) fn start_command(&mut self, task_tracker: &TaskTracker, command: ReceiverCommand) {
        info!("Sending command to receiver: {}", command);

        let controller = self.controller.clone();
        let command_done_tx = self.command_done_tx.clone();

        task_tracker.spawn(async move {
            let result = controller.send(&command).await;
            let _ = command_done_tx.send((command, result));
        });
    }

    /// Report a completed command to the caller.
    pub(crate) async fn handle_command_done(
        &mut self,
        command: ReceiverCommand,
        result: Result<(), CommandFailure>,
    ) {
        match &result {
            Ok(()) => debug!("Command succeeded: {}", command),
            Err(failure) => error!("Command failed: {}: {}", command, failure),
        }

        let error = result.as_ref().err().map(ManagerError::from);

        let _ = self
            .send_out(ManagerOutputMessage::CommandResult(command, result))
            .await;

        if let Some(error) = error {
            let _ = self.send_out(ManagerOutputMessage::Error(error)).await;
        }
    }

    /// Act on a notification from the controller.
    pub(crate) async fn handle_controller_event(&mut self, event: ControllerEvent) {
        match event {
            ControllerEvent::StateChanged(state) => {
                let _ = self
                    .send_out(ManagerOutputMessage::ReceiverState(state))
                    .await;
            }
            ControllerEvent::VerificationRequested(at) => {
                self.scheduler.schedule_one_shot(at);

                debug!(
                    "Scheduled boot verification poll in {:?} ({} pending)",
                    at.saturating_duration_since(Instant::now()),
                    self.scheduler.pending_one_shots()
                );
            }
        }
    }
}
