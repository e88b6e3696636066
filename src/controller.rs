//! The receiver command façade.
//!
//! [`LexiconController`] turns each high-level operation into a sequence of frame-level calls run
//! through the [`OperationExecutor`], and keeps the observed receiver state. It is cheap to clone
//! and safe to use from many tasks at once: the executor serializes all receiver traffic.
//!
//! The state lock is never held across an operation. Observed state is only written after an
//! operation completes (or optimistically, right before a power command is sent).

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use log::{debug, error, info};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::boot_sequencer::{BootSequencer, BootState, BootWindow, ReadinessEvidence};
use crate::commands::ReceiverCommand;
use crate::connection_settings::ConnectionSettings;
use crate::error::{CommandFailure, LinkError};
use crate::gate::{Link, OperationExecutor};
use crate::helpers::native_volume;
use crate::input_mapping::InputMapping;
use crate::poll_scheduler::{run_poll_cycle, PollKind, PollPlan, PollReport, PowerObservation};
use crate::poll_settings::PollSettings;
use crate::protocol::{CommandCode, Rc5Command};
use crate::queries::{query_source, query_volume};
use crate::state::{ObservedState, PowerState, ReceiverState};

// CHANNEL MESSAGES -------------------------------------------------------------------------------

/// Notifications sent from the controller to its host.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    /// The observed state changed.
    StateChanged(ReceiverState),
    /// A power-on was sent; run a [`PollKind::BootVerification`] poll at the given instant.
    VerificationRequested(Instant),
}

// ------------------------------------------------------------------------------------------------

/// Result of one poll.
#[derive(Debug, Clone, PartialEq)]
pub struct PollOutcome {
    pub kind: PollKind,
    pub observation: PowerObservation,
    pub is_ready: bool,
}

struct ControllerState {
    observed: ObservedState,
    boot: BootSequencer,
}

struct Inner {
    executor: OperationExecutor,
    inputs: InputMapping,
    poll_settings: PollSettings,
    state: Mutex<ControllerState>,
    events: UnboundedSender<ControllerEvent>,
}

// ================================================================================================
// LexiconController

#[derive(Clone)]
pub struct LexiconController {
    inner: Arc<Inner>,
}

impl LexiconController {
    /// Create a controller and the channel its [`ControllerEvent`] notifications arrive on.
    pub fn new(
        settings: ConnectionSettings,
        poll_settings: PollSettings,
        inputs: InputMapping,
    ) -> (Self, UnboundedReceiver<ControllerEvent>) {
        let (events, events_rx) = unbounded_channel();

        let state = ControllerState {
            observed: ObservedState::default(),
            boot: BootSequencer::new(&poll_settings),
        };

        let controller = LexiconController {
            inner: Arc::new(Inner {
                executor: OperationExecutor::new(settings),
                inputs,
                poll_settings,
                state: Mutex::new(state),
                events,
            }),
        };

        (controller, events_rx)
    }

    pub fn poll_settings(&self) -> &PollSettings {
        &self.inner.poll_settings
    }

    pub fn connection_settings(&self) -> &ConnectionSettings {
        self.inner.executor.settings()
    }

    /// Selectable source names.
    pub fn source_list(&self) -> Vec<String> {
        self.inner.inputs.source_list()
    }

    /// Snapshot of the current observed state.
    pub async fn state(&self) -> ReceiverState {
        let state = self.inner.state.lock().await;

        state.observed.snapshot(&self.inner.inputs, Instant::now())
    }

    /// The boot sequence state, and the power transition window if one is open or awaiting
    /// verification.
    pub async fn boot_status(&self) -> (BootState, Option<BootWindow>) {
        let state = self.inner.state.lock().await;

        (state.boot.state(), state.boot.window())
    }

    /// Send a [`ReceiverCommand`].
    pub async fn send(&self, command: &ReceiverCommand) -> Result<(), CommandFailure> {
        debug!("Controller handling command: {}", command);

        match command {
            ReceiverCommand::TurnOn => self.turn_on().await,
            ReceiverCommand::TurnOff => self.turn_off().await,
            ReceiverCommand::VolumeUp => self.volume_up().await,
            ReceiverCommand::VolumeDown => self.volume_down().await,
            ReceiverCommand::SetVolume(level) => self.set_volume(*level).await,
            ReceiverCommand::SetMute(mute) => self.mute(*mute).await,
            ReceiverCommand::SelectSource(name) => self.select_source(name).await,
        }
    }

    // --------------------------------------------------------------------------------------------
    // Power

    /// Turn the receiver on.
    ///
    /// The state is set to on (not ready) before anything is sent. If the toggle fails the
    /// previous state is restored; otherwise the boot window restarts from the moment the toggle
    /// was sent, and a verification poll is requested for when it has closed and settled.
    pub async fn turn_on(&self) -> Result<(), CommandFailure> {
        let previous = {
            let mut state = self.inner.state.lock().await;

            if state.observed.power == PowerState::On {
                info!("Receiver already on; not sending power toggle");
                return Ok(());
            }

            info!("Turning receiver on (power toggle)");
            let previous = (
                state.observed.power,
                state.observed.is_ready,
                state.boot.begin_power_on(Instant::now()),
            );

            state.observed.power = PowerState::On;
            state.observed.is_ready = false;
            self.notify_state(&state);

            previous
        };

        match self.send_power_toggle("turn on").await {
            Ok(sent_at) => {
                self.inner.state.lock().await.boot.rearm(sent_at);

                let verify_at = sent_at + self.inner.poll_settings.verification_delay();
                self.emit(ControllerEvent::VerificationRequested(verify_at));

                Ok(())
            }
            Err(failure) => {
                error!("Failed to turn receiver on: {}", failure);

                let mut state = self.inner.state.lock().await;
                let (power, is_ready, boot_state) = previous;
                state.boot.abort(boot_state);
                state.observed.power = power;
                state.observed.is_ready = is_ready;
                self.notify_state(&state);

                Err(failure)
            }
        }
    }

    /// Turn the receiver off. Volume and source are cleared optimistically.
    pub async fn turn_off(&self) -> Result<(), CommandFailure> {
        let previous = {
            let mut state = self.inner.state.lock().await;

            if state.observed.power == PowerState::Off {
                info!("Receiver already off; not sending power toggle");
                return Ok(());
            }

            info!("Turning receiver off (power toggle)");
            let observed = &state.observed;
            let previous = (
                observed.power,
                observed.is_ready,
                observed.volume,
                observed.source,
            );
            let boot_state = state.boot.begin_power_off(Instant::now());

            state.observed.power = PowerState::Off;
            state.observed.is_ready = false;
            state.observed.volume = None;
            state.observed.source = None;
            self.notify_state(&state);

            (previous, boot_state)
        };

        match self.send_power_toggle("turn off").await {
            Ok(sent_at) => {
                self.inner.state.lock().await.boot.rearm(sent_at);

                Ok(())
            }
            Err(failure) => {
                error!("Failed to turn receiver off: {}", failure);

                let mut state = self.inner.state.lock().await;
                let ((power, is_ready, volume, source), boot_state) = previous;
                state.boot.abort(boot_state);
                state.observed.power = power;
                state.observed.is_ready = is_ready;
                state.observed.volume = volume;
                state.observed.source = source;
                self.notify_state(&state);

                Err(failure)
            }
        }
    }

    // --------------------------------------------------------------------------------------------
    // Volume and mute

    pub async fn volume_up(&self) -> Result<(), CommandFailure> {
        self.step_volume("volume up", Rc5Command::VolumeUp).await
    }

    pub async fn volume_down(&self) -> Result<(), CommandFailure> {
        self.step_volume("volume down", Rc5Command::VolumeDown).await
    }

    /// Send a volume step, then confirm the new volume after a short delay.
    async fn step_volume(&self, name: &str, command: Rc5Command) -> Result<(), CommandFailure> {
        let confirm_delay = self.inner.poll_settings.volume_confirm_delay;
        let query_timeout = self.inner.poll_settings.query_timeout;

        let volume = self
            .run_command(name, move |link| {
                async move {
                    link.send_rc5(command).await?;
                    sleep(confirm_delay).await;

                    Ok::<_, LinkError>(query_volume(link, query_timeout).await)
                }
                .boxed()
            })
            .await?;

        match volume {
            Some(volume) => {
                let mut state = self.inner.state.lock().await;
                state.observed.volume = Some(volume);
                self.notify_state(&state);
            }
            None => debug!("Could not confirm volume after {}", name),
        }

        Ok(())
    }

    /// Set the volume to a level between 0.0 and 1.0. Out-of-range levels fail without
    /// contacting the receiver.
    pub async fn set_volume(&self, level: f32) -> Result<(), CommandFailure> {
        let volume = native_volume(level).map_err(|e| {
            error!("Cannot set volume: {}", e);
            CommandFailure::InvalidVolume(e)
        })?;

        debug!("Setting volume to {} ({:.2})", volume, level);

        self.run_command("set volume", move |link| {
            async move { link.send_command(CommandCode::Volume, &[volume]).await }.boxed()
        })
        .await?;

        let mut state = self.inner.state.lock().await;
        state.observed.volume = Some(volume);
        self.notify_state(&state);
        info!("Volume set to {}", volume);

        Ok(())
    }

    /// Mute or unmute, using the discrete mute-on/mute-off codes.
    pub async fn mute(&self, mute: bool) -> Result<(), CommandFailure> {
        let command = match mute {
            true => Rc5Command::MuteOn,
            false => Rc5Command::MuteOff,
        };

        self.run_rc5("mute", command).await?;

        let mut state = self.inner.state.lock().await;
        state.observed.is_muted = Some(mute);
        self.notify_state(&state);

        Ok(())
    }

    // --------------------------------------------------------------------------------------------
    // Source

    /// Select a source by configured display name or physical input name.
    ///
    /// Unknown names fail without contacting the receiver. Selecting the current source still
    /// sends the command.
    pub async fn select_source(&self, name: &str) -> Result<(), CommandFailure> {
        let Some(input) = self.inner.inputs.resolve(name) else {
            error!(
                "Unknown source: {} (available: {:?})",
                name,
                self.source_list()
            );
            return Err(CommandFailure::UnknownSource(name.to_string()));
        };

        debug!(
            "Selecting source {} (physical: {}, code: 0x{:02X})",
            name,
            input,
            input.rc5_code()
        );

        let confirm_delay = self.inner.poll_settings.source_confirm_delay;
        let query_timeout = self.inner.poll_settings.query_timeout;

        let source = self
            .run_command("select source", move |link| {
                async move {
                    link.send_rc5(Rc5Command::SelectInput(input.rc5_code()))
                        .await?;
                    sleep(confirm_delay).await;

                    Ok::<_, LinkError>(query_source(link, query_timeout).await)
                }
                .boxed()
            })
            .await?;

        match source {
            Some(source) => {
                let mut state = self.inner.state.lock().await;
                state.observed.source = Some(source);
                self.notify_state(&state);
            }
            None => debug!("Could not confirm source after selecting {}", name),
        }

        Ok(())
    }

    // --------------------------------------------------------------------------------------------
    // Polling

    /// Run one poll cycle and fold its results into the observed state.
    ///
    /// A state change is only notified when the readings differ from before the poll.
    pub async fn poll(&self, kind: PollKind) -> PollOutcome {
        let (plan, planned_window) = {
            let state = self.inner.state.lock().await;

            let plan = PollPlan {
                assumed_power: state.boot.assumed_power(Instant::now()),
                query_timeout: self.inner.poll_settings.query_timeout,
                audio_attributes: self.inner.poll_settings.poll_audio_attributes,
            };

            (plan, state.boot.window())
        };

        debug!("Running {:?} poll", kind);

        let mut report = self
            .inner
            .executor
            .execute("poll", move |link| run_poll_cycle(link, plan).boxed())
            .await
            .unwrap_or_else(|| PollReport {
                assumed_power: plan.assumed_power,
                ..Default::default()
            });

        let completed_at = Instant::now();
        let mut state = self.inner.state.lock().await;
        let before = state.observed.snapshot(&self.inner.inputs, completed_at);

        // A power command issued while the poll ran makes its readings stale
        if let Some(target) = state.boot.assumed_power(completed_at) {
            if state.boot.window() != planned_window {
                info!("Power changed during {:?} poll; assuming {}", kind, target);

                report = PollReport {
                    assumed_power: Some(target),
                    ..Default::default()
                };
            }
        }

        report.apply_to(&mut state.observed, completed_at);
        let is_ready = state.boot.evaluate(
            completed_at,
            ReadinessEvidence {
                power: report.power,
                data_ok: report.data_ok(),
            },
        );
        state.observed.is_ready = is_ready;

        let after = state.observed.snapshot(&self.inner.inputs, completed_at);
        if !after.same_readings(&before) {
            self.emit(ControllerEvent::StateChanged(after));
        }

        PollOutcome {
            kind,
            observation: report.observation(),
            is_ready,
        }
    }

    // --------------------------------------------------------------------------------------------
    // Internals

    async fn run_rc5(&self, name: &str, command: Rc5Command) -> Result<(), CommandFailure> {
        self.run_command(name, move |link| link.send_rc5(command).boxed())
            .await
    }

    /// Send the power toggle. Returns when it was written to the receiver.
    async fn send_power_toggle(&self, name: &str) -> Result<Instant, CommandFailure> {
        self.run_command(name, |link| {
            async move {
                let sent_at = Instant::now();
                link.send_rc5(Rc5Command::PowerToggle).await?;

                Ok::<_, LinkError>(sent_at)
            }
            .boxed()
        })
        .await
    }

    /// Run a command operation through the executor, flattening "unreachable" and Link failures
    /// into a [`CommandFailure`].
    async fn run_command<T, F>(&self, name: &str, operation: F) -> Result<T, CommandFailure>
    where
        F: for<'l> FnOnce(&'l mut Link) -> BoxFuture<'l, Result<T, LinkError>> + Send,
        T: Send,
    {
        match self.inner.executor.execute(name, operation).await {
            Some(result) => result.map_err(CommandFailure::from),
            None => {
                error!("Could not reach receiver for command: {}", name);
                Err(CommandFailure::Unreachable)
            }
        }
    }

    fn notify_state(&self, state: &ControllerState) {
        let snapshot = state
            .observed
            .snapshot(&self.inner.inputs, Instant::now());

        self.emit(ControllerEvent::StateChanged(snapshot));
    }

    fn emit(&self, event: ControllerEvent) {
        if self.inner.events.send(event).is_err() {
            debug!("Controller event channel closed; dropping event");
        }
    }
}

// ================================================================================================
// Tests

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::sleep_until;

    use super::*;
    use crate::codes::Input;
    use crate::test_support::{unreachable_settings, FakeReceiver};

    fn fast_poll_settings() -> PollSettings {
        PollSettings {
            query_timeout: Duration::from_millis(200),
            boot_timeout: Duration::from_millis(300),
            power_off_window: Duration::from_millis(100),
            boot_settle: Duration::from_millis(100),
            volume_confirm_delay: Duration::from_millis(10),
            source_confirm_delay: Duration::from_millis(20),
            ..Default::default()
        }
    }

    fn controller(
        settings: ConnectionSettings,
        inputs: InputMapping,
    ) -> (LexiconController, UnboundedReceiver<ControllerEvent>) {
        LexiconController::new(settings, fast_poll_settings(), inputs)
    }

    fn drain_events(events: &mut UnboundedReceiver<ControllerEvent>) -> Vec<ControllerEvent> {
        let mut drained = vec![];
        while let Ok(event) = events.try_recv() {
            drained.push(event);
        }

        drained
    }

    #[tokio::test]
    async fn power_on_then_select_source() {
        let receiver = FakeReceiver::start().await;
        receiver.update(|state| state.volume = 25);
        let inputs = InputMapping::new([(Input::Radio, "DAB")]);
        let (controller, mut events) = controller(receiver.settings(), inputs);

        controller.turn_on().await.unwrap();

        let state = controller.state().await;
        assert_eq!(state.power, PowerState::On);
        assert!(!state.is_ready);
        assert_eq!(receiver.rc5_received(), vec![Rc5Command::PowerToggle.code()]);

        let (boot_state, window) = controller.boot_status().await;
        assert_eq!(boot_state, BootState::Booting);
        assert_eq!(window.map(|window| window.target), Some(PowerState::On));

        let verify_at = drain_events(&mut events)
            .into_iter()
            .find_map(|event| match event {
                ControllerEvent::VerificationRequested(at) => Some(at),
                _ => None,
            })
            .unwrap();

        sleep_until(verify_at).await;
        let outcome = controller.poll(PollKind::BootVerification).await;
        assert!(outcome.is_ready);
        assert_eq!(outcome.observation, PowerObservation::On);
        assert_eq!(controller.boot_status().await, (BootState::Ready, None));

        controller.select_source("DAB").await.unwrap();

        let state = controller.state().await;
        assert!(state.is_ready);
        assert_eq!(state.volume, Some(25));
        assert_eq!(state.source, Some("DAB".to_string()));
        assert!(state.staleness.is_some());
    }

    #[tokio::test]
    async fn boot_stays_unready_when_data_queries_fail() {
        let receiver = FakeReceiver::start().await;
        receiver.update(|state| {
            state.refused_queries.extend([
                CommandCode::Volume.code(),
                CommandCode::Mute.code(),
                CommandCode::CurrentSource.code(),
            ])
        });
        let (controller, _events) = controller(receiver.settings(), InputMapping::default());

        controller.turn_on().await.unwrap();

        sleep(fast_poll_settings().verification_delay()).await;
        let outcome = controller.poll(PollKind::BootVerification).await;

        assert!(!outcome.is_ready);
        assert!(!controller.state().await.is_ready);
    }

    #[tokio::test]
    async fn poll_during_boot_window_does_not_query_power() {
        let receiver = FakeReceiver::start().await;
        let (controller, _events) = controller(receiver.settings(), InputMapping::default());

        controller.turn_on().await.unwrap();
        controller.poll(PollKind::Periodic).await;

        let power_queries = receiver
            .requests()
            .iter()
            .filter(|frame| frame.code == CommandCode::Power.code())
            .count();

        assert_eq!(power_queries, 0);
        assert_eq!(controller.state().await.power, PowerState::On);
        assert!(!controller.state().await.is_ready);
    }

    #[tokio::test]
    async fn failed_power_on_reverts_optimistic_state() {
        let (controller, mut events) =
            controller(unreachable_settings().await, InputMapping::default());

        assert_eq!(controller.turn_on().await, Err(CommandFailure::Unreachable));

        let state = controller.state().await;
        assert_eq!(state.power, PowerState::Unknown);
        assert!(!state.is_ready);
        assert!(drain_events(&mut events)
            .iter()
            .all(|event| matches!(event, ControllerEvent::StateChanged(_))));
    }

    #[tokio::test]
    async fn refused_power_on_is_reported_as_refusal() {
        let receiver = FakeReceiver::start().await;
        receiver.update(|state| state.refused_rc5.push(Rc5Command::PowerToggle.code()));
        let (controller, _events) = controller(receiver.settings(), InputMapping::default());

        assert!(matches!(
            controller.turn_on().await,
            Err(CommandFailure::Refused { code: 0x08, .. })
        ));
        assert_eq!(controller.state().await.power, PowerState::Unknown);
    }

    #[tokio::test]
    async fn power_commands_matching_cached_state_are_local() {
        let receiver = FakeReceiver::start().await;
        receiver.update(|state| state.power_on = true);
        let (controller, _events) = controller(receiver.settings(), InputMapping::default());

        controller.poll(PollKind::Periodic).await;
        let connections = receiver.connection_count();

        controller.turn_on().await.unwrap();

        assert_eq!(receiver.connection_count(), connections);
        assert!(receiver.rc5_received().is_empty());
    }

    #[tokio::test]
    async fn turn_off_clears_volume_and_source() {
        let receiver = FakeReceiver::start().await;
        receiver.update(|state| {
            state.power_on = true;
            state.volume = 50;
        });
        let (controller, _events) = controller(receiver.settings(), InputMapping::default());
        controller.poll(PollKind::Periodic).await;
        assert!(controller.state().await.is_ready);

        controller.turn_off().await.unwrap();

        let state = controller.state().await;
        assert_eq!(state.power, PowerState::Off);
        assert!(!state.is_ready);
        assert_eq!(state.volume, None);
        assert_eq!(state.source, None);
        assert!(!receiver.read(|state| state.power_on));
    }

    #[tokio::test]
    async fn volume_step_is_confirmed() {
        let receiver = FakeReceiver::start().await;
        receiver.update(|state| {
            state.power_on = true;
            state.volume = 40;
        });
        let (controller, _events) = controller(receiver.settings(), InputMapping::default());

        controller.volume_up().await.unwrap();
        assert_eq!(controller.state().await.volume, Some(41));

        controller.volume_down().await.unwrap();
        controller.volume_down().await.unwrap();
        assert_eq!(controller.state().await.volume, Some(39));
        assert_eq!(controller.state().await.volume_level, Some(0.39));
    }

    #[tokio::test]
    async fn set_volume_validates_locally() {
        let receiver = FakeReceiver::start().await;
        receiver.update(|state| state.power_on = true);
        let (controller, _events) = controller(receiver.settings(), InputMapping::default());

        assert!(matches!(
            controller.set_volume(1.5).await,
            Err(CommandFailure::InvalidVolume(_))
        ));
        assert_eq!(receiver.connection_count(), 0);

        controller.set_volume(0.5).await.unwrap();
        assert_eq!(receiver.read(|state| state.volume), 49);
        assert_eq!(controller.state().await.volume, Some(49));
    }

    #[tokio::test]
    async fn mute_uses_discrete_codes() {
        let receiver = FakeReceiver::start().await;
        receiver.update(|state| state.power_on = true);
        let (controller, _events) = controller(receiver.settings(), InputMapping::default());

        controller.mute(true).await.unwrap();
        assert_eq!(controller.state().await.is_muted, Some(true));
        controller.mute(false).await.unwrap();
        assert_eq!(controller.state().await.is_muted, Some(false));

        assert_eq!(receiver.rc5_received(), vec![0x1A, 0x78]);
    }

    #[tokio::test]
    async fn unknown_source_fails_without_connecting() {
        let receiver = FakeReceiver::start().await;
        let (controller, _events) = controller(receiver.settings(), InputMapping::default());

        assert_eq!(
            controller.select_source("Vinyl").await,
            Err(CommandFailure::UnknownSource("Vinyl".to_string()))
        );
        assert_eq!(receiver.connection_count(), 0);
    }

    #[tokio::test]
    async fn redundant_source_selection_is_still_sent() {
        let receiver = FakeReceiver::start().await;
        receiver.update(|state| {
            state.power_on = true;
            state.source = 0x02;
        });
        let (controller, _events) = controller(receiver.settings(), InputMapping::default());

        controller.select_source("BD").await.unwrap();
        controller.select_source("BD").await.unwrap();

        assert_eq!(receiver.rc5_received(), vec![0x62, 0x62]);
        assert_eq!(controller.state().await.source, Some("BD".to_string()));
    }

    #[tokio::test]
    async fn failed_poll_keeps_cached_volume() {
        let receiver = FakeReceiver::start().await;
        receiver.update(|state| {
            state.power_on = true;
            state.volume = 42;
        });
        let (controller, _events) = controller(receiver.settings(), InputMapping::default());
        controller.poll(PollKind::Periodic).await;

        receiver.update(|state| state.refused_queries.push(CommandCode::Volume.code()));
        controller.poll(PollKind::Periodic).await;

        assert_eq!(controller.state().await.volume, Some(42));
    }

    #[tokio::test]
    async fn unreachable_receiver_poll_is_bounded() {
        let (controller, _events) =
            controller(unreachable_settings().await, InputMapping::default());

        let start = Instant::now();
        let outcome = controller.poll(PollKind::Periodic).await;

        assert_eq!(outcome.observation, PowerObservation::Unreachable);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn command_waits_for_in_flight_poll() {
        let receiver = FakeReceiver::start().await;
        receiver.update(|state| {
            state.power_on = true;
            state.volume = 10;
            state.response_delay = Duration::from_millis(20);
        });
        let (controller, _events) = controller(receiver.settings(), InputMapping::default());

        let poll = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.poll(PollKind::Periodic).await })
        };
        let command = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.volume_up().await })
        };

        poll.await.unwrap();
        command.await.unwrap().unwrap();

        assert_eq!(receiver.connection_count(), 2);
        assert_eq!(receiver.max_concurrent_connections(), 1);
        assert!(receiver.connection_windows_are_disjoint());
    }

    #[tokio::test]
    async fn send_dispatches_commands() {
        let receiver = FakeReceiver::start().await;
        receiver.update(|state| state.power_on = true);
        let (controller, _events) = controller(receiver.settings(), InputMapping::default());

        controller
            .send(&ReceiverCommand::SetMute(true))
            .await
            .unwrap();
        controller
            .send(&ReceiverCommand::SelectSource("usb".to_string()))
            .await
            .unwrap();

        let state = controller.state().await;
        assert_eq!(state.is_muted, Some(true));
        assert_eq!(state.source, Some("USB".to_string()));
    }

    #[tokio::test]
    async fn power_on_during_in_flight_poll_keeps_assumed_power() {
        let receiver = FakeReceiver::start().await;
        receiver.update(|state| state.response_delay = Duration::from_millis(100));
        let (controller, _events) = controller(receiver.settings(), InputMapping::default());

        // The poll reads "off" from the receiver while the power-on is queued behind it
        let poll = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.poll(PollKind::Periodic).await })
        };
        sleep(Duration::from_millis(30)).await;
        controller.turn_on().await.unwrap();
        let outcome = poll.await.unwrap();

        assert_eq!(outcome.observation, PowerObservation::On);
        assert_eq!(controller.state().await.power, PowerState::On);
        assert_eq!(controller.boot_status().await.0, BootState::Booting);

        controller.turn_on().await.unwrap();
        assert_eq!(receiver.rc5_received(), vec![Rc5Command::PowerToggle.code()]);
        assert!(receiver.read(|state| state.power_on));
    }

    #[tokio::test]
    async fn boot_window_starts_when_toggle_is_sent() {
        let receiver = FakeReceiver::start().await;
        receiver.update(|state| state.response_delay = Duration::from_millis(100));
        let (controller, mut events) = controller(receiver.settings(), InputMapping::default());

        let poll = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.poll(PollKind::Periodic).await })
        };
        sleep(Duration::from_millis(30)).await;

        let requested_at = Instant::now();
        controller.turn_on().await.unwrap();
        poll.await.unwrap();

        let (_, window) = controller.boot_status().await;
        let window = window.unwrap();
        assert!(window.opened_at >= requested_at + Duration::from_millis(50));
        assert_eq!(
            window.closes_at,
            window.opened_at + fast_poll_settings().boot_timeout
        );

        let verify_at = drain_events(&mut events)
            .into_iter()
            .find_map(|event| match event {
                ControllerEvent::VerificationRequested(at) => Some(at),
                _ => None,
            })
            .unwrap();
        assert_eq!(
            verify_at,
            window.opened_at + fast_poll_settings().verification_delay()
        );
    }

    #[tokio::test]
    async fn unchanged_poll_emits_no_state_change() {
        let receiver = FakeReceiver::start().await;
        receiver.update(|state| {
            state.power_on = true;
            state.volume = 30;
        });
        let (controller, mut events) = controller(receiver.settings(), InputMapping::default());

        controller.poll(PollKind::Periodic).await;
        assert_eq!(drain_events(&mut events).len(), 1);

        controller.poll(PollKind::Periodic).await;
        assert!(drain_events(&mut events).is_empty());

        receiver.update(|state| state.volume = 31);
        controller.poll(PollKind::Periodic).await;

        let changes = drain_events(&mut events);
        assert_eq!(changes.len(), 1);
        assert!(matches!(
            &changes[0],
            ControllerEvent::StateChanged(state) if state.volume == Some(31)
        ));
    }
}
