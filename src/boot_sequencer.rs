//! Reconciles optimistic power commands with what the receiver eventually reports.
//!
//! The receiver only exposes a power *toggle*, and takes several seconds to boot (its relay
//! clicks roughly six seconds after the command). Power commands therefore set the observed state
//! optimistically and open a [`BootWindow`] during which raw power readings are not trusted. After
//! a power-on, a dedicated verification poll runs once the window has closed, and the receiver is
//! only declared ready when all of these hold:
//!
//! * The observed power is on.
//! * The boot timeout has elapsed.
//! * The settle time after the boot timeout has also elapsed.
//! * At least one real data query succeeded in the same poll.
//!
//! Outside of a boot, a poll which sees the receiver on and answering data queries marks it
//! ready; anything else marks it not ready.

use std::fmt;
use std::time::Duration;

use log::{debug, info, warn};
use rust_fsm::*;
use tokio::time::Instant;

use crate::poll_settings::PollSettings;
use crate::state::PowerState;

// ------------------------------------------------------------------------------------------------
// States, Inputs, Outputs

/// Boot status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootState {
    /// Off, unknown, or on but not answering data queries.
    Idle,
    /// Power-on issued; optimistically on but not yet ready.
    Booting,
    /// On and answering queries.
    Ready,
}

impl fmt::Display for BootState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone)]
pub(crate) enum BootInput {
    PowerOnIssued,
    PowerOffIssued,
    /// The power command failed; return to the state held before it was issued.
    Revert(BootState),
    Verified,
    ObservedReady,
    ObservedNotReady,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum BootOutput {
    ScheduleVerification,
    BootComplete,
    BootFailed,
    BecameReady,
    BecameNotReady,
}

// Mermaid format:
//
// ---
// title: Boot sequencer state machine
// ---
// stateDiagram-v2
// [*] --> Idle
// Idle --> Booting: PowerOnIssued
// Idle --> Ready: ObservedReady
// Idle --> Idle: PowerOffIssued / ObservedNotReady
//
// Booting --> Ready: Verified
// Booting --> Idle: PowerOffIssued / ObservedNotReady
// Booting --> Booting: PowerOnIssued
//
// Ready --> Booting: PowerOnIssued
// Ready --> Idle: PowerOffIssued / ObservedNotReady
// Ready --> Ready: ObservedReady
//
// (any) --> (previous): Revert

// ================================================================================================
// BootMachine

#[derive(Debug)]
pub(crate) struct BootMachine;

impl StateMachineImpl for BootMachine {
    type Input = BootInput;
    type State = BootState;
    type Output = BootOutput;

    const INITIAL_STATE: Self::State = BootState::Idle;

    fn transition(state: &Self::State, input: &Self::Input) -> Option<Self::State> {
        match (state, input) {
            (_, BootInput::PowerOnIssued) => Some(BootState::Booting),
            (_, BootInput::PowerOffIssued) => Some(BootState::Idle),
            (_, BootInput::Revert(previous)) => Some(*previous),

            (BootState::Booting, BootInput::Verified) => Some(BootState::Ready),

            (BootState::Idle | BootState::Ready, BootInput::ObservedReady) => Some(BootState::Ready),
            (_, BootInput::ObservedNotReady) => Some(BootState::Idle),

            _ => None,
        }
    }

    fn output(state: &Self::State, input: &Self::Input) -> Option<Self::Output> {
        match (state, input) {
            (_, BootInput::PowerOnIssued) => Some(BootOutput::ScheduleVerification),
            (BootState::Booting, BootInput::Verified) => Some(BootOutput::BootComplete),
            (BootState::Booting, BootInput::ObservedNotReady) => Some(BootOutput::BootFailed),
            (BootState::Idle, BootInput::ObservedReady) => Some(BootOutput::BecameReady),
            (BootState::Ready, BootInput::ObservedNotReady) => Some(BootOutput::BecameNotReady),

            _ => None,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// BootWindow

/// The interval after a power command during which power readings are not trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootWindow {
    /// The optimistically-assumed power state for the duration of the window.
    pub target: PowerState,
    pub opened_at: Instant,
    pub closes_at: Instant,
}

impl BootWindow {
    fn new(target: PowerState, opened_at: Instant, duration: Duration) -> Self {
        BootWindow {
            target,
            opened_at,
            closes_at: opened_at + duration,
        }
    }

    pub fn is_open(&self, now: Instant) -> bool {
        now < self.closes_at
    }
}

/// What a poll cycle observed, as far as readiness is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReadinessEvidence {
    /// Power as actually read from the receiver (`None` when unreachable or not queried).
    pub power: Option<PowerState>,
    /// At least one data query (volume, source, ...) succeeded.
    pub data_ok: bool,
}

// ================================================================================================
// BootSequencer

pub(crate) struct BootSequencer {
    fsm: StateMachine<BootMachine>,
    window: Option<BootWindow>,
    /// The power toggle has not been sent yet. The window stays open until it is.
    awaiting_send: bool,
    boot_timeout: Duration,
    power_off_window: Duration,
    boot_settle: Duration,
}

impl BootSequencer {
    pub fn new(settings: &PollSettings) -> Self {
        BootSequencer {
            fsm: StateMachine::new(),
            window: None,
            awaiting_send: false,
            boot_timeout: settings.boot_timeout,
            power_off_window: settings.power_off_window,
            boot_settle: settings.boot_settle,
        }
    }

    pub fn state(&self) -> BootState {
        *self.fsm.state()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == BootState::Ready
    }

    pub fn window(&self) -> Option<BootWindow> {
        self.window
    }

    /// The power to assume instead of querying, while a window is open.
    pub fn assumed_power(&self, now: Instant) -> Option<PowerState> {
        self.window
            .filter(|window| self.awaiting_send || window.is_open(now))
            .map(|window| window.target)
    }

    /// Open the boot window for a power-on. Returns the state to revert to if the command fails.
    pub fn begin_power_on(&mut self, now: Instant) -> BootState {
        let previous = self.state();
        self.window = Some(BootWindow::new(PowerState::On, now, self.boot_timeout));
        self.awaiting_send = true;
        self.apply(BootInput::PowerOnIssued);

        previous
    }

    /// Open the (shorter) power-off window. Returns the state to revert to if the command fails.
    pub fn begin_power_off(&mut self, now: Instant) -> BootState {
        let previous = self.state();
        self.window = Some(BootWindow::new(PowerState::Off, now, self.power_off_window));
        self.awaiting_send = true;
        self.apply(BootInput::PowerOffIssued);

        previous
    }

    /// The power toggle reached the receiver at `sent_at`: restart the window from there.
    pub fn rearm(&mut self, sent_at: Instant) {
        self.awaiting_send = false;

        if let Some(window) = self.window {
            let duration = match window.target {
                PowerState::On => self.boot_timeout,
                _ => self.power_off_window,
            };

            self.window = Some(BootWindow::new(window.target, sent_at, duration));
            debug!("Power toggle sent; window open until {:?}", sent_at + duration);
        }
    }

    /// The power command failed: drop the window and return to the previous state.
    pub fn abort(&mut self, previous: BootState) {
        warn!("Power command failed; reverting boot state to {}", previous);

        self.window = None;
        self.awaiting_send = false;
        self.apply(BootInput::Revert(previous));
    }

    /// Re-evaluate readiness after a poll cycle. Returns the resulting ready flag.
    pub fn evaluate(&mut self, now: Instant, evidence: ReadinessEvidence) -> bool {
        if let Some(window) = self.window {
            if self.awaiting_send {
                debug!("Power toggle not sent yet; readiness unchanged");
                return self.is_ready();
            }

            if window.is_open(now) {
                debug!("Boot window open until {:?}; readiness unchanged", window.closes_at);
                return self.is_ready();
            }

            if self.state() == BootState::Booting {
                return self.evaluate_boot(now, window, evidence);
            }

            debug!("Power-off window closed");
            self.window = None;
        }

        match evidence {
            ReadinessEvidence {
                power: Some(PowerState::On),
                data_ok: true,
            } => self.apply(BootInput::ObservedReady),
            _ => self.apply(BootInput::ObservedNotReady),
        };

        self.is_ready()
    }

    fn evaluate_boot(&mut self, now: Instant, window: BootWindow, evidence: ReadinessEvidence) -> bool {
        let observed_on = evidence.power == Some(PowerState::On);
        let timeout_elapsed = now >= window.closes_at;
        let settled = now >= window.closes_at + self.boot_settle;

        if observed_on && timeout_elapsed && settled && evidence.data_ok {
            self.window = None;
            self.apply(BootInput::Verified);
        } else if evidence.power == Some(PowerState::Off) {
            self.window = None;
            self.apply(BootInput::ObservedNotReady);
        } else {
            debug!(
                "Boot not yet verified (on: {}, timeout elapsed: {}, settled: {}, data: {})",
                observed_on, timeout_elapsed, settled, evidence.data_ok
            );
        }

        self.is_ready()
    }

    fn apply(&mut self, input: BootInput) -> Option<BootOutput> {
        let entry_state = self.state();

        match self.fsm.consume(&input) {
            Ok(output) => {
                let exit_state = self.state();

                match &output {
                    Some(BootOutput::ScheduleVerification) => {
                        info!("Power-on issued; receiver is booting")
                    }
                    Some(BootOutput::BootComplete) => info!("Receiver finished booting and is ready"),
                    Some(BootOutput::BootFailed) => warn!("Receiver did not come up after power-on"),
                    Some(BootOutput::BecameReady) => info!("Receiver is now ready"),
                    Some(BootOutput::BecameNotReady) => info!("Receiver is no longer ready"),
                    None => {}
                }

                debug!(
                    "Boot FSM acting on input [{:?}]: {:?} -> {:?}, with output [{:?}]",
                    &input, entry_state, exit_state, &output
                );

                output
            }
            Err(e) => {
                debug!(
                    "Boot FSM ignoring input [{:?}] while in state '{:?}': {:?}",
                    &input, entry_state, e
                );

                None
            }
        }
    }
}

// ================================================================================================
// Tests
