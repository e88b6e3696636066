mod message_senders;
mod orchestration;
mod out_emitters;

use log::{debug, info, warn};
use tokio::select;
use tokio::sync::mpsc::{
    channel, unbounded_channel, Receiver, Sender, UnboundedReceiver, UnboundedSender,
};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

pub use crate::commands::ReceiverCommand;
pub use crate::error::CommandFailure;
pub use crate::poll_scheduler::PollPhase;
pub use crate::state::ReceiverState;

use crate::connection_settings::ConnectionSettings;
use crate::controller::{ControllerEvent, LexiconController, PollOutcome};
use crate::input_mapping::InputMapping;
use crate::poll_scheduler::{PollKind, PollScheduler};
use crate::poll_settings::PollSettings;

#[cfg(doc)]
use crate::LexiconManagerBuilder;

// CHANNEL MESSAGES -------------------------------------------------------------------------------

/// Messages sent from the caller to the [`LexiconManager`].
#[derive(Debug, Clone, PartialEq)]
pub enum ManagerMessage {
    /// Request sending of all currently-known receiver state as instances of
    /// `ManagerOutputMessage`.
    EmitAllState,
    /// Poll the receiver now, without waiting for the next scheduled poll. Ignored while a poll
    /// is already running.
    PollNow,
    /// Send the given [`ReceiverCommand`] to the receiver.
    SendCommand(ReceiverCommand),
    /// Shut down the [`LexiconManager`]. Waits for in-flight receiver operations to complete and
    /// stops the manager task.
    ShutDown,
}

/// Messages sent from the [`LexiconManager`] back to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum ManagerOutputMessage {
    /// The outcome of a [`ManagerMessage::SendCommand`].
    CommandResult(ReceiverCommand, Result<(), CommandFailure>),
    /// A [`LexiconManager`] error occurred.
    Error(ManagerError),
    /// The current poll cadence phase.
    PollPhase(PollPhase),
    /// Receiver state (power, readiness, volume, source, etc).
    ReceiverState(ReceiverState),
    /// Selectable source names.
    SourceList(Vec<String>),
}

// ================================================================================================
// Additional structs

/// Errors sent from the [`LexiconManager`] back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ManagerError {
    /// The receiver could not be reached (not on the network, or another client holds its single
    /// TCP connection).
    Unreachable(String),
    /// The receiver rejected a command.
    Refused(String),
    /// An attempt to act on a received [`ManagerMessage`] was not possible. For example, selecting
    /// an unknown source.
    Action(String),
}

impl From<&CommandFailure> for ManagerError {
    fn from(failure: &CommandFailure) -> Self {
        match failure {
            CommandFailure::Unreachable | CommandFailure::Transport(_) => {
                ManagerError::Unreachable(failure.to_string())
            }
            CommandFailure::Refused { .. } => ManagerError::Refused(failure.to_string()),
            CommandFailure::UnknownSource(_) | CommandFailure::InvalidVolume(_) => {
                ManagerError::Action(failure.to_string())
            }
        }
    }
}

// ================================================================================================
// LexiconManager
//
// Design notes:
//
//  - The manager expects to be run once by the caller, and to run until told to shut down.
//  - All input from the caller is received over a receiver channel.
//  - All output to the caller is sent over a sender channel.
//  - The receiver accepts a single TCP client, so the manager never holds a connection open. Each
//    poll and each command is one short gated operation run through the shared controller.
//  - Polls and commands run as tracked tasks so the loop stays responsive. At most one poll is in
//    flight at a time; commands queue behind it at the connection gate.
//  - The poll scheduler (owned by the loop) decides when the next poll is due. The controller
//    asks for one-shot boot verification polls via its event channel.
//  - On shutdown nothing new is scheduled, a poll task that has not yet started is skipped, and
//    in-flight operations (including accepted commands) are awaited.
// ================================================================================================

/// Manage a Lexicon AV receiver.
///
/// The interface to `LexiconManager` (after instantiation with [`LexiconManager::new()`] and
/// running with [`LexiconManager::run()`]) is the sending and receiving of [`ManagerMessage`] and
/// [`ManagerOutputMessage`].
pub struct LexiconManager {
    controller: LexiconController,
    scheduler: PollScheduler,
    poll_in_flight: bool,

    // Manager in/out channels
    command_rx: Receiver<ManagerMessage>, // Receives ManagerMessage from the caller
    output_tx: Sender<ManagerOutputMessage>, // Sends ManagerOutputMessage back to the caller

    // Controller and task channels
    controller_rx: UnboundedReceiver<ControllerEvent>,
    poll_done_tx: UnboundedSender<PollOutcome>,
    poll_done_rx: UnboundedReceiver<PollOutcome>,
    command_done_tx: UnboundedSender<(ReceiverCommand, Result<(), CommandFailure>)>,
    command_done_rx: UnboundedReceiver<(ReceiverCommand, Result<(), CommandFailure>)>,
}

/// Usage example:
///
/// ```no_run
/// use lexicon_av::{ConnectionSettings, LexiconManager};
/// use tokio::sync::mpsc;
///
/// #[tokio::main]
/// async fn main() {
///     let (to_manager, to_manager_rx) = mpsc::channel(32);
///     let (mut manager, mut from_manager) =
///         LexiconManager::new(ConnectionSettings::new("10.0.0.150"), to_manager_rx);
///
///     // Start a task to receive `ManagerOutputMessage` messages on `from_manager`
///     // Start a task to send `ManagerMessage` messages on `to_manager`
///
///     manager.run().await;
/// }
/// ```
impl LexiconManager {
    /// Creates a `LexiconManager` instance with default poll settings and no input names.
    ///
    /// Expects to be given a tokio mpsc `Receiver` of [`ManagerMessage`]s from the caller. Returns
    /// a tuple of itself and a `Receiver` of [`ManagerOutputMessage`]s back to the caller.
    ///
    /// Use [`LexiconManagerBuilder`] to override any `LexiconManager` defaults.
    pub fn new(
        settings: ConnectionSettings,
        command_rx: Receiver<ManagerMessage>,
    ) -> (LexiconManager, Receiver<ManagerOutputMessage>) {
        LexiconManager::with_parts(
            settings,
            PollSettings::default(),
            InputMapping::default(),
            command_rx,
        )
    }

    pub(crate) fn with_parts(
        settings: ConnectionSettings,
        poll_settings: PollSettings,
        inputs: InputMapping,
        command_rx: Receiver<ManagerMessage>,
    ) -> (LexiconManager, Receiver<ManagerOutputMessage>) {
        let (output_tx, manager_channel_rx) = channel(32);
        let (poll_done_tx, poll_done_rx) = unbounded_channel();
        let (command_done_tx, command_done_rx) = unbounded_channel();

        let scheduler = PollScheduler::new(&poll_settings, Instant::now());
        let (controller, controller_rx) = LexiconController::new(settings, poll_settings, inputs);

        let manager = LexiconManager {
            controller,
            scheduler,
            poll_in_flight: false,
            command_rx,
            output_tx,
            controller_rx,
            poll_done_tx,
            poll_done_rx,
            command_done_tx,
            command_done_rx,
        };

        (manager, manager_channel_rx)
    }

    /// A handle on the controller shared by the manager's tasks.
    pub fn controller(&self) -> LexiconController {
        self.controller.clone()
    }

    /// Run the manager.
    ///
    /// Loops until a [`ManagerMessage::ShutDown`] is received (or the caller's channel closes),
    /// doing the following:
    ///
    /// * Accepting (and acting on) `ManagerMessage` messages from the caller.
    /// * Starting a poll whenever the scheduler says one is due.
    /// * Folding poll results back into the scheduler.
    /// * Sending `ManagerOutputMessage` messages back to the caller.
    pub async fn run(&mut self) {
        info!(
            "Manager starting up for receiver at {}:{}",
            self.controller.connection_settings().host,
            self.controller.connection_settings().port
        );

        let task_tracker = TaskTracker::new();
        let cancel_token = CancellationToken::new();

        self.emit_all_state().await;

        info!("Manager ready to receive commands");

        loop {
            let next_due = self.scheduler.next_due();

            select! {
                // FROM THE CALLER ----------------------------------------------------------------

                manager_msg = self.command_rx.recv() => {
                    match manager_msg {
                        Some(ManagerMessage::EmitAllState) => {
                            self.emit_all_state().await;
                        }
                        Some(ManagerMessage::PollNow) => {
                            if self.poll_in_flight {
                                debug!("Poll already in progress; poll request ignored");
                            } else {
                                self.start_poll(&task_tracker, &cancel_token, PollKind::Periodic);
                            }
                        }
                        Some(ManagerMessage::SendCommand(command)) => {
                            self.start_command(&task_tracker, command);
                        }
                        Some(ManagerMessage::ShutDown) => {
                            info!("Manager shutting down");
                            break;
                        }
                        None => {
                            warn!("Manager input channel closed; shutting down");
                            break;
                        }
                    }
                }

                // FROM THE POLL SCHEDULER --------------------------------------------------------

                _ = sleep_until(next_due), if !self.poll_in_flight => {
                    if let Some(kind) = self.scheduler.take_due(Instant::now()) {
                        self.start_poll(&task_tracker, &cancel_token, kind);
                    }
                }

                // FROM THE TASKS -----------------------------------------------------------------

                Some(outcome) = self.poll_done_rx.recv() => {
                    self.handle_poll_done(outcome).await;
                }

                Some((command, result)) = self.command_done_rx.recv() => {
                    self.handle_command_done(command, result).await;
                }

                // FROM THE CONTROLLER ------------------------------------------------------------

                Some(event) = self.controller_rx.recv() => {
                    self.handle_controller_event(event).await;
                }
            }
        }

        cancel_token.cancel();
        task_tracker.close();

        info!("Manager waiting for in-flight receiver operations");
        task_tracker.wait().await;

        info!("Manager shut down successfully");
    }
}

// ================================================================================================
// Tests
