//! Decides when to poll the receiver, and runs a single fast-fail poll cycle.
//!
//! Poll cadence depends on the [`PollPhase`]:
//!
//! * `Starting`: a few quick polls right after startup.
//! * `On`: the full query set every 30 seconds.
//! * `OffOrUnknown`: a single power query every 60 seconds.
//!
//! The scheduler holds two kinds of entries: the periodic poll (re-armed after every periodic
//! poll, and whenever the phase changes) and one-shot boot verification polls.
//!
//! A poll cycle runs inside one gated operation. The receiver serves only one TCP client, so
//! every second a poll holds the connection is a second the vendor app cannot connect. If the
//! first query of a cycle fails the whole cycle is abandoned, bounding the hold time to roughly one
//! query timeout.

use std::fmt;
use std::time::Duration;

use log::{debug, info};
use rust_fsm::*;
use tokio::time::Instant;

use crate::codes::Source;
use crate::gate::Link;
use crate::poll_settings::PollSettings;
use crate::queries::{
    query_audio_format, query_decode_mode, query_direct_mode, query_mute, query_power,
    query_sample_rate, query_source, query_volume,
};
use crate::state::{ObservedState, PowerState};

// ------------------------------------------------------------------------------------------------
// States, Inputs, Outputs

/// Poll cadence phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    Starting,
    On,
    OffOrUnknown,
}

impl fmt::Display for PollPhase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Power as seen by a completed poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerObservation {
    On,
    Off,
    Unreachable,
}

impl From<Option<PowerState>> for PowerObservation {
    fn from(power: Option<PowerState>) -> Self {
        match power {
            Some(PowerState::On) => PowerObservation::On,
            Some(PowerState::Off) => PowerObservation::Off,
            Some(PowerState::Unknown) | None => PowerObservation::Unreachable,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum PhaseInput {
    Observed(PowerObservation),
    /// The startup polls are done; carries the first confirmed power state seen during startup.
    StartupExhausted(PowerObservation),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PhaseOutput {
    EnteredOn,
    EnteredOffOrUnknown,
}

// Mermaid format:
//
// ---
// title: Poll phase state machine
// ---
// stateDiagram-v2
// [*] --> Starting
// Starting --> Starting: Observed
// Starting --> On: StartupExhausted(On)
// Starting --> OffOrUnknown: StartupExhausted(Off | Unreachable)
//
// On --> On: Observed(On)
// On --> OffOrUnknown: Observed(Off | Unreachable)
//
// OffOrUnknown --> On: Observed(On)
// OffOrUnknown --> OffOrUnknown: Observed(Off | Unreachable)

// ================================================================================================
// PollPhaseMachine

#[derive(Debug)]
pub(crate) struct PollPhaseMachine;

impl StateMachineImpl for PollPhaseMachine {
    type Input = PhaseInput;
    type State = PollPhase;
    type Output = PhaseOutput;

    const INITIAL_STATE: Self::State = PollPhase::Starting;

    fn transition(state: &Self::State, input: &Self::Input) -> Option<Self::State> {
        match (state, input) {
            (PollPhase::Starting, PhaseInput::Observed(_)) => Some(PollPhase::Starting),
            (PollPhase::Starting, PhaseInput::StartupExhausted(PowerObservation::On)) => {
                Some(PollPhase::On)
            }
            (PollPhase::Starting, PhaseInput::StartupExhausted(_)) => Some(PollPhase::OffOrUnknown),

            (PollPhase::On | PollPhase::OffOrUnknown, PhaseInput::Observed(PowerObservation::On)) => {
                Some(PollPhase::On)
            }
            (PollPhase::On | PollPhase::OffOrUnknown, PhaseInput::Observed(_)) => {
                Some(PollPhase::OffOrUnknown)
            }

            _ => None,
        }
    }

    fn output(state: &Self::State, input: &Self::Input) -> Option<Self::Output> {
        match (state, input) {
            (PollPhase::Starting, PhaseInput::StartupExhausted(PowerObservation::On)) => {
                Some(PhaseOutput::EnteredOn)
            }
            (PollPhase::Starting, PhaseInput::StartupExhausted(_)) => {
                Some(PhaseOutput::EnteredOffOrUnknown)
            }
            (PollPhase::OffOrUnknown, PhaseInput::Observed(PowerObservation::On)) => {
                Some(PhaseOutput::EnteredOn)
            }
            (PollPhase::On, PhaseInput::Observed(PowerObservation::Off))
            | (PollPhase::On, PhaseInput::Observed(PowerObservation::Unreachable)) => {
                Some(PhaseOutput::EnteredOffOrUnknown)
            }

            _ => None,
        }
    }
}

// ================================================================================================
// PollScheduler

/// Why a poll is being run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollKind {
    Periodic,
    BootVerification,
}

pub(crate) struct PollScheduler {
    fsm: StateMachine<PollPhaseMachine>,
    startup_interval: Duration,
    startup_polls: u32,
    on_interval: Duration,
    off_interval: Duration,
    next_periodic: Instant,
    one_shots: Vec<Instant>,
    polls_completed: u32,
    first_confirmed: Option<PowerObservation>,
}

impl PollScheduler {
    /// The first periodic poll is due immediately.
    pub fn new(settings: &PollSettings, now: Instant) -> Self {
        PollScheduler {
            fsm: StateMachine::new(),
            startup_interval: settings.startup_interval,
            startup_polls: settings.startup_polls,
            on_interval: settings.on_interval,
            off_interval: settings.off_interval,
            next_periodic: now,
            one_shots: vec![],
            polls_completed: 0,
            first_confirmed: None,
        }
    }

    pub fn phase(&self) -> PollPhase {
        *self.fsm.state()
    }

    pub fn interval(&self) -> Duration {
        match self.phase() {
            PollPhase::Starting => self.startup_interval,
            PollPhase::On => self.on_interval,
            PollPhase::OffOrUnknown => self.off_interval,
        }
    }

    /// When the earliest entry is due.
    pub fn next_due(&self) -> Instant {
        match self.one_shots.first() {
            Some(one_shot) => (*one_shot).min(self.next_periodic),
            None => self.next_periodic,
        }
    }

    /// Take the entry due at `now`, if any. One-shots take priority. A taken periodic entry is
    /// provisionally re-armed one interval later; [`PollScheduler::record_poll`] re-arms it from
    /// the completion time.
    pub fn take_due(&mut self, now: Instant) -> Option<PollKind> {
        if self.one_shots.first().is_some_and(|due| *due <= now) {
            self.one_shots.remove(0);
            return Some(PollKind::BootVerification);
        }

        if self.next_periodic <= now {
            self.next_periodic = now + self.interval();
            return Some(PollKind::Periodic);
        }

        None
    }

    pub fn schedule_one_shot(&mut self, at: Instant) {
        let index = self.one_shots.partition_point(|due| *due <= at);
        self.one_shots.insert(index, at);
    }

    pub fn pending_one_shots(&self) -> usize {
        self.one_shots.len()
    }

    /// Record a completed poll. Returns the new phase if it changed.
    pub fn record_poll(
        &mut self,
        kind: PollKind,
        observation: PowerObservation,
        now: Instant,
    ) -> Option<PollPhase> {
        self.polls_completed += 1;

        let mut changed = None;

        if self.phase() == PollPhase::Starting {
            if self.first_confirmed.is_none() && observation != PowerObservation::Unreachable {
                self.first_confirmed = Some(observation);
            }

            if self.polls_completed >= self.startup_polls {
                let first_confirmed = self.first_confirmed.unwrap_or(PowerObservation::Unreachable);
                changed = self.apply(PhaseInput::StartupExhausted(first_confirmed));
            }
        }

        if self.phase() != PollPhase::Starting {
            changed = self.apply(PhaseInput::Observed(observation)).or(changed);
        }

        if kind == PollKind::Periodic || changed.is_some() {
            self.next_periodic = now + self.interval();
        }

        debug!(
            "Poll #{} ({:?}) recorded: {:?}; phase {}, next periodic poll in {:?}",
            self.polls_completed,
            kind,
            observation,
            self.phase(),
            self.next_periodic.saturating_duration_since(now)
        );

        changed.map(|_| self.phase())
    }

    fn apply(&mut self, input: PhaseInput) -> Option<PhaseOutput> {
        let entry_phase = self.phase();

        match self.fsm.consume(&input) {
            Ok(output) => {
                if output.is_some() {
                    info!("Poll phase: {} -> {}", entry_phase, self.phase());
                }

                output
            }
            Err(e) => {
                debug!(
                    "Poll FSM ignoring input [{:?}] while in phase '{}': {:?}",
                    &input, entry_phase, e
                );

                None
            }
        }
    }
}

// ================================================================================================
// Poll cycle

/// How to run one poll cycle.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PollPlan {
    /// Skip the power query and assume this instead (boot window open).
    pub assumed_power: Option<PowerState>,
    pub query_timeout: Duration,
    pub audio_attributes: bool,
}

/// Results of one poll cycle. `None` fields were not read (failed or skipped).
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct PollReport {
    /// Power as read from the receiver.
    pub power: Option<PowerState>,
    pub assumed_power: Option<PowerState>,
    pub volume: Option<u8>,
    pub is_muted: Option<bool>,
    pub source: Option<Source>,
    pub is_direct_mode: Option<bool>,
    pub decode_mode: Option<String>,
    pub audio_format: Option<String>,
    pub sample_rate: Option<String>,
}

impl PollReport {
    pub fn effective_power(&self) -> Option<PowerState> {
        self.power.or(self.assumed_power)
    }

    pub fn observation(&self) -> PowerObservation {
        self.effective_power().into()
    }

    /// At least one real data query succeeded.
    pub fn data_ok(&self) -> bool {
        self.volume.is_some() || self.is_muted.is_some() || self.source.is_some()
    }

    /// Merge into the observed state. Failed reads keep the previous value.
    pub fn apply_to(&self, observed: &mut ObservedState, now: Instant) {
        if let Some(power) = self.effective_power() {
            observed.power = power;
        }

        if self.power.is_some() {
            observed.last_successful_poll = Some(now);
        }

        fn keep<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
            if value.is_some() {
                target.clone_from(value);
            }
        }

        keep(&mut observed.volume, &self.volume);
        keep(&mut observed.is_muted, &self.is_muted);
        keep(&mut observed.source, &self.source);
        keep(&mut observed.is_direct_mode, &self.is_direct_mode);
        keep(&mut observed.decode_mode, &self.decode_mode);
        keep(&mut observed.audio_format, &self.audio_format);
        keep(&mut observed.sample_rate, &self.sample_rate);
    }
}

/// Run one fast-fail poll cycle over a lent link.
///
/// 1. Query power (or assume it while a boot window is open).
/// 2. No answer: the receiver is unreachable, stop.
/// 3. Off: stop.
/// 4. On: query each attribute independently; a failed attribute keeps its cached value.
///
/// When the power query is skipped, the first data query doubles as the reachability probe.
pub(crate) async fn run_poll_cycle(link: &mut Link, plan: PollPlan) -> PollReport {
    let timeout = plan.query_timeout;
    let mut report = PollReport {
        assumed_power: plan.assumed_power,
        ..Default::default()
    };

    if plan.assumed_power.is_none() {
        report.power = query_power(link, timeout).await;

        match report.power {
            None => {
                info!("Receiver did not answer the power query; abandoning poll cycle");
                return report;
            }
            Some(PowerState::On) => {}
            Some(power) => {
                debug!("Receiver power is {}; skipping remaining queries", power);
                return report;
            }
        }
    } else {
        debug!(
            "Boot window open; assuming power {:?} without querying",
            plan.assumed_power
        );

        if plan.assumed_power != Some(PowerState::On) {
            return report;
        }
    }

    report.volume = query_volume(link, timeout).await;

    if report.volume.is_none() && report.power.is_none() {
        info!("Receiver did not answer the volume query during boot window; abandoning poll cycle");
        return report;
    }

    report.is_muted = query_mute(link, timeout).await;
    report.source = query_source(link, timeout).await;

    if plan.audio_attributes {
        report.is_direct_mode = query_direct_mode(link, timeout).await;
        report.decode_mode = query_decode_mode(link, timeout).await;
        report.audio_format = query_audio_format(link, timeout).await;
        report.sample_rate = query_sample_rate(link, timeout).await;
    }

    report
}

// ================================================================================================
// Tests
