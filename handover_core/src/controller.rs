//! CPR session controller.
//!
//! Owns the whole CPR session state: phase, compression and cycle counters,
//! the metronome and elapsed timers (through a [`TimerQueue`]), the three
//! record logs and the store they persist to. Timer callbacks are dispatched
//! by [`CprController::advance_to`] with `&mut self`, so there is no ambient
//! state and every transition can be driven directly from tests.
//!
//! Presentation never happens here. Each transition pushes [`Signal`]s that a
//! front-end drains with [`CprController::drain_signals`] and renders, and
//! [`CprController::snapshot`] provides the display counters.

use crate::catalog::get_default_catalog;
use crate::config::CprConfig;
use crate::error::ValidationError;
use crate::metronome::{Metronome, SessionTimer};
use crate::scheduler::{TimerKind, TimerQueue};
use crate::store::{CprRecords, KeyValueStore};
use crate::{
    display_time, format_mm_ss, CprEvent, CprEventKind, CprPhase, CprSession, CprSnapshot,
    Signal, TimelineEntry, TimelineKind, Tone,
};
use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

/// Controller tunables, usually taken from [`CprConfig`]
#[derive(Clone, Debug)]
pub struct ControllerSettings {
    pub rate: u32,
    pub cycle_target: u32,
    pub audio_enabled: bool,
    pub tone: Tone,
    pub log_cap: usize,
}

impl From<&CprConfig> for ControllerSettings {
    fn from(config: &CprConfig) -> Self {
        Self {
            rate: config.rate_bpm,
            cycle_target: config.cycle_target,
            audio_enabled: config.audio_enabled,
            tone: config.tone(),
            log_cap: config.log_cap,
        }
    }
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self::from(&CprConfig::default())
    }
}

/// Parse a shock energy field; empty, non-numeric and non-positive input is
/// rejected.
pub fn parse_shock_energy(input: &str) -> Result<f64, ValidationError> {
    let joules: f64 = input
        .trim()
        .parse()
        .map_err(|_| ValidationError::InvalidShockEnergy)?;
    validate_shock_energy(joules)
}

fn validate_shock_energy(joules: f64) -> Result<f64, ValidationError> {
    if joules.is_finite() && joules > 0.0 {
        Ok(joules)
    } else {
        Err(ValidationError::InvalidShockEnergy)
    }
}

fn format_joules(joules: f64) -> String {
    if joules.fract() == 0.0 {
        format!("{}J", joules as u64)
    } else {
        format!("{:.1}J", joules)
    }
}

const RHYTHM_PREFIX: &str = "Rhythm: ";

/// Most recent rhythm in a restored event log
fn latest_rhythm(records: &CprRecords) -> Option<String> {
    records
        .events
        .iter()
        .find(|e| e.kind == CprEventKind::Rhythm)
        .and_then(|e| e.details.strip_prefix(RHYTHM_PREFIX))
        .map(str::to_string)
}

fn required(input: &str, missing: ValidationError) -> Result<&str, ValidationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        Err(missing)
    } else {
        Ok(trimmed)
    }
}

/// CPR session state machine
#[derive(Debug)]
pub struct CprController<S: KeyValueStore> {
    store: S,
    records: CprRecords,
    queue: TimerQueue,
    metronome: Metronome,
    timer: SessionTimer,
    phase: CprPhase,
    /// Cycle number within the current session (1-based while active)
    cycle_count: u32,
    last_rhythm: Option<String>,
    audio_enabled: bool,
    tone: Tone,
    /// Wall time corresponding to queue time zero
    wall_epoch: DateTime<Utc>,
    signals: Vec<Signal>,
}

impl<S: KeyValueStore> CprController<S> {
    /// Create a controller, loading any previously persisted records
    pub fn new(store: S, settings: ControllerSettings) -> Self {
        Self::with_epoch(store, settings, Utc::now())
    }

    /// Create a controller whose queue time zero maps to `wall_epoch`
    pub fn with_epoch(store: S, settings: ControllerSettings, wall_epoch: DateTime<Utc>) -> Self {
        let records = CprRecords::load(&store, settings.log_cap);
        let last_rhythm = latest_rhythm(&records);
        Self {
            store,
            records,
            queue: TimerQueue::new(),
            metronome: Metronome::new(settings.rate, settings.cycle_target),
            timer: SessionTimer::new(),
            phase: CprPhase::Idle,
            cycle_count: 0,
            last_rhythm,
            audio_enabled: settings.audio_enabled,
            tone: settings.tone,
            wall_epoch,
            signals: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------

    /// `Idle → Running`. Returns false (no-op) when a session is active.
    pub fn start(&mut self) -> bool {
        if self.phase != CprPhase::Idle {
            tracing::debug!("Start ignored: session already {:?}", self.phase);
            return false;
        }

        self.phase = CprPhase::Running;
        self.cycle_count = 1;
        self.metronome.reset_count();
        self.timer.start(&mut self.queue);
        self.metronome.start(&mut self.queue);

        let rate = self.metronome.rate();
        self.push_timeline(
            TimelineKind::SessionStart,
            format!("CPR started at {}/min", rate),
        );
        self.signals.push(Signal::SessionStarted { rate });
        self.persist();

        tracing::info!("CPR session started at {}/min", rate);
        true
    }

    /// End the active session and log it. Returns `None` when idle.
    pub fn stop(&mut self) -> Option<CprSession> {
        if self.phase == CprPhase::Idle {
            tracing::debug!("Stop ignored: no active session");
            return None;
        }
        Some(self.end_session(false))
    }

    /// Start when idle, stop otherwise
    pub fn toggle(&mut self) {
        if self.phase == CprPhase::Idle {
            self.start();
        } else {
            self.stop();
        }
    }

    /// Record a pulse check outcome.
    ///
    /// Pulse detected ends and logs the session; it is accepted mid-cycle as
    /// well as at the gate. No pulse only resolves a pending check: it resets
    /// the compression count, advances the cycle and resumes the metronome
    /// while the session timer keeps running. Returns false when the outcome
    /// does not apply to the current phase.
    pub fn pulse_check(&mut self, pulse_detected: bool) -> bool {
        if pulse_detected && self.phase != CprPhase::Idle {
            self.end_session(true);
            return true;
        }

        if self.phase != CprPhase::AwaitingPulseCheck {
            tracing::debug!("Pulse check ignored in phase {:?}", self.phase);
            return false;
        }

        self.push_timeline(
            TimelineKind::PulseCheck,
            format!(
                "Pulse check: no pulse - continuing CPR (cycle {})",
                self.cycle_count + 1
            ),
        );
        self.metronome.reset_count();
        self.cycle_count += 1;
        self.metronome.start(&mut self.queue);
        self.phase = CprPhase::Running;
        self.persist();

        tracing::info!("No pulse, resuming compressions for cycle {}", self.cycle_count);
        true
    }

    /// Change the compression rate; a running metronome is hot-swapped
    /// without losing the count or elapsed time.
    pub fn set_rate(&mut self, bpm: u32) -> Result<(), ValidationError> {
        if bpm == 0 {
            return Err(ValidationError::InvalidRate);
        }
        self.metronome.set_rate(bpm, &mut self.queue);
        self.signals.push(Signal::RateChanged { bpm });
        tracing::debug!("Compression rate set to {}/min", bpm);
        Ok(())
    }

    pub fn set_audio_enabled(&mut self, enabled: bool) {
        self.audio_enabled = enabled;
    }

    /// One metronome beat. Ignored unless compressions are running.
    pub fn on_compression_tick(&mut self) {
        if self.phase != CprPhase::Running {
            tracing::debug!("Compression tick ignored in phase {:?}", self.phase);
            return;
        }

        let beat = self.metronome.tick();
        self.signals.push(Signal::Beat {
            count: beat.count,
            tone: self.audio_enabled.then_some(self.tone),
        });

        if beat.cycle_complete {
            self.metronome.stop(&mut self.queue);
            self.phase = CprPhase::AwaitingPulseCheck;
            self.signals.push(Signal::PulseCheckDue {
                cycle: self.cycle_count,
            });
            tracing::info!(
                "Cycle {} complete after {} compressions, pulse check due",
                self.cycle_count,
                beat.count
            );
        }
    }

    /// Pump the timers up to queue time `t`, firing every due beat and clock
    /// tick in deadline order.
    pub fn advance_to(&mut self, t: Duration) {
        while let Some(fired) = self.queue.pop_due(t) {
            match fired.kind {
                TimerKind::Compression if self.metronome.handle() == Some(fired.id) => {
                    self.on_compression_tick();
                }
                TimerKind::Clock if self.timer.handle() == Some(fired.id) => {
                    let elapsed = self.timer.elapsed(fired.at);
                    self.signals.push(Signal::Clock { elapsed });
                }
                _ => {
                    tracing::warn!("Dropping stale timer {:?}", fired.id);
                    self.queue.cancel(fired.id);
                }
            }
        }
        self.queue.advance_to(t);
    }

    pub fn advance_by(&mut self, d: Duration) {
        self.advance_to(self.queue.now() + d);
    }

    /// Earliest pending timer deadline on the queue clock
    pub fn next_deadline(&self) -> Option<Duration> {
        self.queue.next_deadline()
    }

    // ------------------------------------------------------------------
    // Event recording
    // ------------------------------------------------------------------

    pub fn record_rhythm(&mut self, code: &str) -> Result<(), ValidationError> {
        let code = required(code, ValidationError::MissingRhythm)?;
        let code = get_default_catalog().normalize_rhythm(code);
        self.record_event(CprEventKind::Rhythm, format!("{}{}", RHYTHM_PREFIX, code));
        self.last_rhythm = Some(code);
        Ok(())
    }

    pub fn record_shock(&mut self, joules: f64) -> Result<(), ValidationError> {
        let joules = validate_shock_energy(joules)?;
        self.record_event(
            CprEventKind::Shock,
            format!("Shock delivered: {}", format_joules(joules)),
        );
        Ok(())
    }

    pub fn record_medication(&mut self, details: &str) -> Result<(), ValidationError> {
        let details = required(details, ValidationError::MissingMedication)?;
        let details = get_default_catalog().normalize_medication(details);
        self.record_event(CprEventKind::Medication, format!("Medication: {}", details));
        Ok(())
    }

    pub fn record_intervention(&mut self, details: &str) -> Result<(), ValidationError> {
        let details = required(details, ValidationError::MissingIntervention)?;
        let details = get_default_catalog().normalize_intervention(details);
        self.record_event(
            CprEventKind::Intervention,
            format!("Intervention: {}", details),
        );
        Ok(())
    }

    pub fn record_note(&mut self, text: &str) -> Result<(), ValidationError> {
        let text = required(text, ValidationError::EmptyNote)?;
        self.record_event(CprEventKind::Note, text.to_string());
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read accessors
    // ------------------------------------------------------------------

    pub fn phase(&self) -> CprPhase {
        self.phase
    }

    pub fn compression_count(&self) -> u32 {
        self.metronome.compression_count()
    }

    pub fn cycle_count(&self) -> u32 {
        self.cycle_count
    }

    pub fn rate(&self) -> u32 {
        self.metronome.rate()
    }

    pub fn last_rhythm(&self) -> Option<&str> {
        self.last_rhythm.as_deref()
    }

    /// Period of the live compression timer, if one is scheduled
    pub fn metronome_interval(&self) -> Option<Duration> {
        self.metronome
            .handle()
            .and_then(|id| self.queue.period_of(id))
    }

    pub fn is_metronome_running(&self) -> bool {
        self.metronome
            .handle()
            .is_some_and(|id| self.queue.is_active(id))
    }

    pub fn is_timer_running(&self) -> bool {
        self.timer.is_running()
    }

    /// Elapsed time of the active session
    pub fn elapsed(&self) -> Duration {
        self.timer.elapsed(self.queue.now())
    }

    /// Current position on the queue clock
    pub fn now(&self) -> Duration {
        self.queue.now()
    }

    pub fn snapshot(&self) -> CprSnapshot {
        CprSnapshot {
            phase: self.phase,
            compression_count: self.metronome.compression_count(),
            cycle_count: self.cycle_count,
            current_cycle: self.metronome.current_cycle(),
            cycle_progress: self.metronome.cycle_progress(),
            cycle_target: self.metronome.cycle_target(),
            rate: self.metronome.rate(),
            elapsed: self.elapsed(),
        }
    }

    /// Take all signals emitted since the last drain
    pub fn drain_signals(&mut self) -> Vec<Signal> {
        std::mem::take(&mut self.signals)
    }

    pub fn records(&self) -> &CprRecords {
        &self.records
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn wall_now(&self) -> DateTime<Utc> {
        let offset = TimeDelta::from_std(self.queue.now()).unwrap_or(TimeDelta::zero());
        self.wall_epoch + offset
    }

    fn push_timeline(&mut self, kind: TimelineKind, details: String) {
        let entry = TimelineEntry::new(self.wall_now(), kind, details);
        self.records.timeline.append(entry);
    }

    fn record_event(&mut self, kind: CprEventKind, details: String) {
        let event = CprEvent::new(self.wall_now(), kind, details);
        self.records.timeline.append(TimelineEntry::from(&event));
        self.records.events.append(event);
        self.persist();
        tracing::info!("Recorded {} event", kind);
    }

    /// Shared exit path for pulse-detected and manual stop
    fn end_session(&mut self, pulse_detected: bool) -> CprSession {
        let at = self.wall_now();
        let duration = format_mm_ss(self.elapsed());
        let cycles = self
            .cycle_count
            .max(self.metronome.current_cycle())
            .max(1);

        let session = CprSession {
            time: display_time(at),
            iso: at,
            duration: duration.clone(),
            rate: self.metronome.rate(),
            cycles,
            rhythm: self.last_rhythm.clone(),
        };

        if pulse_detected {
            self.push_timeline(
                TimelineKind::PulseCheck,
                "Pulse check: pulse detected (ROSC)".to_string(),
            );
        }
        self.push_timeline(
            TimelineKind::SessionEnd,
            format!("CPR ended after {} ({} cycles)", duration, cycles),
        );
        self.records.sessions.append(session.clone());

        self.reset();
        self.signals.push(Signal::SessionEnded(session.clone()));
        self.persist();

        tracing::info!("CPR session ended after {} with {} cycles", duration, cycles);
        session
    }

    /// Cancel both timers and clear session counters
    fn reset(&mut self) {
        self.metronome.stop(&mut self.queue);
        self.timer.stop(&mut self.queue);
        self.metronome.reset_count();
        self.cycle_count = 0;
        self.phase = CprPhase::Idle;
    }

    /// Write-through; failures are logged and the in-memory state stays
    /// authoritative for the rest of the session.
    fn persist(&mut self) {
        if let Err(e) = self.records.save(&mut self.store) {
            tracing::error!("Failed to persist CPR records: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, CPR_EVENTS_KEY, CPR_LOG_KEY};
    use crate::{Error, Result};

    fn controller() -> CprController<MemoryStore> {
        crate::logging::init_test();
        CprController::new(MemoryStore::new(), ControllerSettings::default())
    }

    fn controller_at_rate(rate: u32) -> CprController<MemoryStore> {
        let settings = ControllerSettings {
            rate,
            ..ControllerSettings::default()
        };
        CprController::new(MemoryStore::new(), settings)
    }

    fn timeline_kinds(ctl: &CprController<MemoryStore>) -> Vec<TimelineKind> {
        ctl.records().timeline.iter().map(|e| e.kind).collect()
    }

    /// Store whose writes always fail
    #[derive(Debug, Default)]
    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            Ok(None)
        }

        fn set(&mut self, _key: &str, _value: &str) -> Result<()> {
            Err(Error::Other("disk full".into()))
        }
    }

    #[test]
    fn test_start_then_stop_logs_one_session() {
        let mut ctl = controller();
        assert!(ctl.start());
        let session = ctl.stop().unwrap();

        assert_eq!(ctl.records().sessions.len(), 1);
        assert_eq!(session.cycles, 1);
        assert!(session.duration == "00:00" || session.duration == "00:01");
        assert_eq!(ctl.phase(), CprPhase::Idle);
        assert!(!ctl.is_metronome_running());
        assert!(!ctl.is_timer_running());
        assert_eq!(ctl.next_deadline(), None);
    }

    #[test]
    fn test_start_is_noop_when_active() {
        let mut ctl = controller();
        assert!(ctl.start());
        assert!(!ctl.start());
        assert_eq!(timeline_kinds(&ctl), vec![TimelineKind::SessionStart]);
    }

    #[test]
    fn test_stop_is_noop_when_idle() {
        let mut ctl = controller();
        assert!(ctl.stop().is_none());
        assert!(ctl.records().sessions.is_empty());
        assert!(ctl.records().timeline.is_empty());
    }

    #[test]
    fn test_120_ticks_gate_pulse_check() {
        let mut ctl = controller();
        ctl.start();
        for _ in 0..120 {
            ctl.on_compression_tick();
        }

        assert_eq!(ctl.phase(), CprPhase::AwaitingPulseCheck);
        assert!(!ctl.is_metronome_running());
        assert_eq!(ctl.snapshot().cycle_progress, 120);
        assert_eq!(ctl.snapshot().current_cycle, 1);

        // No further counting without an explicit resume
        ctl.on_compression_tick();
        ctl.advance_by(Duration::from_secs(30));
        assert_eq!(ctl.compression_count(), 120);
        // Session timer keeps running while the decision is pending
        assert!(ctl.is_timer_running());
    }

    #[test]
    fn test_pulse_check_due_signal() {
        let mut ctl = controller();
        ctl.start();
        for _ in 0..120 {
            ctl.on_compression_tick();
        }
        let signals = ctl.drain_signals();
        assert!(signals.contains(&Signal::PulseCheckDue { cycle: 1 }));
        let beats = signals
            .iter()
            .filter(|s| matches!(s, Signal::Beat { .. }))
            .count();
        assert_eq!(beats, 120);
    }

    #[test]
    fn test_set_rate_hot_swaps_without_reset() {
        let mut ctl = controller_at_rate(100);
        ctl.start();
        ctl.advance_by(Duration::from_secs(3));
        let count = ctl.compression_count();
        assert_eq!(count, 5);

        ctl.set_rate(120).unwrap();
        assert_eq!(ctl.metronome_interval(), Some(Duration::from_millis(500)));
        assert_eq!(ctl.compression_count(), count);
        assert_eq!(ctl.elapsed(), Duration::from_secs(3));

        ctl.advance_by(Duration::from_secs(1));
        assert_eq!(ctl.compression_count(), count + 2);
    }

    #[test]
    fn test_set_rate_rejects_zero() {
        let mut ctl = controller();
        assert_eq!(ctl.set_rate(0), Err(ValidationError::InvalidRate));
        assert_eq!(ctl.rate(), 110);
    }

    #[test]
    fn test_set_rate_while_awaiting_keeps_metronome_stopped() {
        let mut ctl = controller();
        ctl.start();
        for _ in 0..120 {
            ctl.on_compression_tick();
        }
        ctl.set_rate(100).unwrap();
        assert!(!ctl.is_metronome_running());

        ctl.pulse_check(false);
        assert_eq!(
            ctl.metronome_interval(),
            Some(Duration::from_millis(600))
        );
    }

    #[test]
    fn test_full_scenario_two_cycles() {
        let mut ctl = controller_at_rate(60);
        ctl.start();

        ctl.advance_to(Duration::from_secs(120));
        assert_eq!(ctl.phase(), CprPhase::AwaitingPulseCheck);
        assert_eq!(ctl.compression_count(), 120);

        assert!(ctl.pulse_check(false));
        assert_eq!(ctl.phase(), CprPhase::Running);
        assert_eq!(ctl.compression_count(), 0);
        assert_eq!(ctl.cycle_count(), 2);

        ctl.advance_to(Duration::from_secs(180));
        assert_eq!(ctl.compression_count(), 60);
        assert_eq!(ctl.elapsed(), Duration::from_secs(180));

        // "No pulse" only applies at the cycle gate
        assert!(!ctl.pulse_check(false));
        assert_eq!(ctl.compression_count(), 60);
        ctl.stop();

        let sessions = ctl.records().sessions.all();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].cycles, 2);
        assert_eq!(sessions[0].duration, "03:00");
        assert_eq!(sessions[0].rate, 60);
    }

    #[test]
    fn test_no_pulse_then_pulse_timeline_order() {
        let mut ctl = controller_at_rate(60);
        ctl.start();
        for _ in 0..120 {
            ctl.on_compression_tick();
        }
        ctl.pulse_check(false);
        for _ in 0..60 {
            ctl.on_compression_tick();
        }
        assert_eq!(ctl.phase(), CprPhase::Running);
        assert!(ctl.pulse_check(true));

        assert_eq!(ctl.records().sessions.len(), 1);
        assert_eq!(ctl.records().sessions.latest().unwrap().cycles, 2);
        assert_eq!(
            timeline_kinds(&ctl),
            vec![
                TimelineKind::SessionEnd,
                TimelineKind::PulseCheck,
                TimelineKind::PulseCheck,
                TimelineKind::SessionStart,
            ]
        );
        let timeline = ctl.records().timeline.all();
        assert!(timeline[1].details.contains("pulse detected"));
        assert!(timeline[2].details.contains("no pulse"));
    }

    #[test]
    fn test_pulse_check_ignored_when_idle() {
        let mut ctl = controller();
        assert!(!ctl.pulse_check(true));
        assert!(!ctl.pulse_check(false));
        assert!(ctl.records().sessions.is_empty());
        assert!(ctl.records().timeline.is_empty());
    }

    #[test]
    fn test_elapsed_survives_pulse_check_pause() {
        let mut ctl = controller_at_rate(120);
        ctl.start();
        ctl.advance_to(Duration::from_secs(60));
        assert_eq!(ctl.phase(), CprPhase::AwaitingPulseCheck);

        // Decision takes 15 seconds
        ctl.advance_to(Duration::from_secs(75));
        ctl.pulse_check(false);
        ctl.advance_to(Duration::from_secs(80));

        assert_eq!(ctl.elapsed(), Duration::from_secs(80));
        assert_eq!(ctl.compression_count(), 10);
    }

    #[test]
    fn test_clock_signals_every_second() {
        let mut ctl = controller_at_rate(100);
        ctl.start();
        ctl.drain_signals();
        ctl.advance_to(Duration::from_secs(3));

        let clocks: Vec<_> = ctl
            .drain_signals()
            .into_iter()
            .filter_map(|s| match s {
                Signal::Clock { elapsed } => Some(elapsed.as_secs()),
                _ => None,
            })
            .collect();
        assert_eq!(clocks, vec![1, 2, 3]);
    }

    #[test]
    fn test_beat_tone_follows_audio_toggle() {
        let mut ctl = controller();
        ctl.start();
        ctl.drain_signals();

        ctl.on_compression_tick();
        ctl.set_audio_enabled(false);
        ctl.on_compression_tick();

        let tones: Vec<_> = ctl
            .drain_signals()
            .into_iter()
            .filter_map(|s| match s {
                Signal::Beat { tone, .. } => Some(tone),
                _ => None,
            })
            .collect();
        assert_eq!(tones.len(), 2);
        assert!(tones[0].is_some());
        assert!(tones[1].is_none());
    }

    #[test]
    fn test_stop_cancels_timers() {
        let mut ctl = controller();
        ctl.start();
        ctl.advance_by(Duration::from_secs(5));
        ctl.stop();
        ctl.drain_signals();

        ctl.advance_by(Duration::from_secs(60));
        assert!(ctl.drain_signals().is_empty());
        assert_eq!(ctl.compression_count(), 0);
    }

    #[test]
    fn test_new_session_after_stop_starts_fresh() {
        let mut ctl = controller_at_rate(120);
        ctl.start();
        ctl.advance_by(Duration::from_secs(10));
        ctl.stop();

        ctl.start();
        assert_eq!(ctl.compression_count(), 0);
        assert_eq!(ctl.cycle_count(), 1);
        assert_eq!(ctl.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_shock_validation() {
        let mut ctl = controller();
        assert_eq!(ctl.record_shock(0.0), Err(ValidationError::InvalidShockEnergy));
        assert_eq!(ctl.record_shock(-150.0), Err(ValidationError::InvalidShockEnergy));
        assert_eq!(ctl.record_shock(f64::NAN), Err(ValidationError::InvalidShockEnergy));
        assert_eq!(parse_shock_energy(""), Err(ValidationError::InvalidShockEnergy));
        assert_eq!(parse_shock_energy("abc"), Err(ValidationError::InvalidShockEnergy));
        assert!(ctl.records().events.is_empty());
        assert!(ctl.records().timeline.is_empty());

        ctl.record_shock(parse_shock_energy(" 200 ").unwrap()).unwrap();
        assert_eq!(ctl.records().events.len(), 1);
        assert_eq!(
            ctl.records().events.latest().unwrap().details,
            "Shock delivered: 200J"
        );
    }

    #[test]
    fn test_required_inputs_rejected_without_mutation() {
        let mut ctl = controller();
        assert_eq!(ctl.record_rhythm("  "), Err(ValidationError::MissingRhythm));
        assert_eq!(ctl.record_medication(""), Err(ValidationError::MissingMedication));
        assert_eq!(
            ctl.record_intervention(""),
            Err(ValidationError::MissingIntervention)
        );
        assert_eq!(ctl.record_note("\n"), Err(ValidationError::EmptyNote));
        assert!(ctl.records().events.is_empty());
        assert_eq!(ctl.store().get(CPR_EVENTS_KEY).unwrap(), None);
    }

    #[test]
    fn test_events_mirror_to_timeline() {
        let mut ctl = controller();
        ctl.record_rhythm("vf").unwrap();
        ctl.record_shock(150.0).unwrap();
        ctl.record_medication("Adrenaline 1mg").unwrap();
        ctl.record_intervention("IO access").unwrap();

        let events: Vec<_> = ctl.records().events.iter().map(|e| e.kind).collect();
        assert_eq!(
            events,
            vec![
                CprEventKind::Intervention,
                CprEventKind::Medication,
                CprEventKind::Shock,
                CprEventKind::Rhythm,
            ]
        );
        assert_eq!(ctl.records().timeline.len(), 4);
        assert_eq!(ctl.last_rhythm(), Some("VF"));
    }

    #[test]
    fn test_known_drug_and_procedure_codes_are_canonicalised() {
        let mut ctl = controller();
        ctl.record_medication("amiodarone 300MG").unwrap();
        ctl.record_intervention("sga").unwrap();
        ctl.record_medication("Magnesium 2g").unwrap();

        let details: Vec<&str> = ctl
            .records()
            .events
            .iter()
            .map(|e| e.details.as_str())
            .collect();
        assert_eq!(
            details,
            vec![
                "Medication: Magnesium 2g",
                "Intervention: SGA",
                "Medication: Amiodarone 300mg",
            ]
        );
    }

    #[test]
    fn test_session_records_last_rhythm() {
        let mut ctl = controller();
        ctl.start();
        ctl.record_rhythm("VF").unwrap();
        ctl.record_rhythm("PEA").unwrap();
        let session = ctl.stop().unwrap();
        assert_eq!(session.rhythm.as_deref(), Some("PEA"));
    }

    #[test]
    fn test_every_mutation_persists() {
        let mut ctl = controller();
        ctl.start();
        assert!(ctl.store().get(CPR_LOG_KEY).unwrap().is_some());

        ctl.record_medication("Amiodarone 300mg").unwrap();
        let raw = ctl.store().get(CPR_EVENTS_KEY).unwrap().unwrap();
        assert!(raw.contains("Amiodarone 300mg"));

        ctl.stop();
        let raw = ctl.store().get(CPR_LOG_KEY).unwrap().unwrap();
        let sessions: Vec<CprSession> = serde_json::from_str(&raw).unwrap();
        assert_eq!(sessions.len(), 1);
    }

    #[test]
    fn test_records_reload_on_next_launch() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = crate::store::FileStore::new(temp_dir.path());

        let mut ctl = CprController::new(store.clone(), ControllerSettings::default());
        ctl.start();
        ctl.record_rhythm("Asystole").unwrap();
        ctl.stop();
        let before = ctl.records().clone();

        let reloaded = CprController::new(store, ControllerSettings::default());
        assert_eq!(reloaded.records(), &before);
        assert_eq!(reloaded.phase(), CprPhase::Idle);
    }

    #[test]
    fn test_last_rhythm_restored_from_event_log() {
        let store = MemoryStore::new();
        let mut ctl = CprController::new(store, ControllerSettings::default());
        ctl.record_rhythm("pea").unwrap();
        ctl.record_note("rhythm check done").unwrap();

        let mut next = CprController::new(ctl.store().clone(), ControllerSettings::default());
        assert_eq!(next.last_rhythm(), Some("PEA"));

        next.start();
        let session = next.stop().unwrap();
        assert_eq!(session.rhythm.as_deref(), Some("PEA"));

        let empty = CprController::new(MemoryStore::new(), ControllerSettings::default());
        assert_eq!(empty.last_rhythm(), None);
    }

    #[test]
    fn test_persist_failure_keeps_memory_state() {
        let mut ctl = CprController::new(BrokenStore, ControllerSettings::default());
        ctl.start();
        ctl.record_note("Family on scene").unwrap();
        ctl.stop();

        assert_eq!(ctl.records().sessions.len(), 1);
        assert_eq!(ctl.records().events.len(), 1);
    }

    #[test]
    fn test_timestamps_follow_queue_clock() {
        let epoch = DateTime::parse_from_rfc3339("2024-05-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut ctl =
            CprController::with_epoch(MemoryStore::new(), ControllerSettings::default(), epoch);
        ctl.start();
        ctl.advance_to(Duration::from_secs(90));
        ctl.record_shock(200.0).unwrap();

        let event = ctl.records().events.latest().unwrap();
        assert_eq!(event.iso, epoch + TimeDelta::seconds(90));
    }

    #[test]
    fn test_toggle() {
        let mut ctl = controller();
        ctl.toggle();
        assert_eq!(ctl.phase(), CprPhase::Running);
        ctl.toggle();
        assert_eq!(ctl.phase(), CprPhase::Idle);
        assert_eq!(ctl.records().sessions.len(), 1);
    }

    #[test]
    fn test_event_log_cap_applies() {
        let settings = ControllerSettings {
            log_cap: 200,
            ..ControllerSettings::default()
        };
        let mut ctl = CprController::new(MemoryStore::new(), settings);
        for i in 0..250 {
            ctl.record_note(&format!("note {}", i)).unwrap();
        }
        assert_eq!(ctl.records().events.len(), 200);
        assert_eq!(ctl.records().timeline.len(), 200);
        assert_eq!(ctl.records().events.latest().unwrap().details, "note 249");
    }
}
