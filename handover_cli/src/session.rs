//! Interactive CPR session: reads responder commands line by line and drives
//! the controller's timers, either against the real clock or a simulated one.

use handover_core::*;
use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

/// Longest single step of the simulated clock
const MAX_WAIT: Duration = Duration::from_secs(3600);

#[derive(Debug, PartialEq)]
enum Action {
    Start,
    Stop,
    Toggle,
    Rate(String),
    Rhythm(String),
    Shock(String),
    Medication(String),
    Intervention(String),
    Note(String),
    Pulse(bool),
    Audio(bool),
    Wait(String),
    Status,
    Catalog,
    Help,
    Quit,
    Unknown(String),
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

enum Input {
    Line(String),
    Eof,
}

/// Parse one input line; blank lines yield `None`
fn parse_action(line: &str) -> Option<Action> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let (command, rest) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim().to_string()),
        None => (line, String::new()),
    };

    let action = match command.to_lowercase().as_str() {
        "start" => Action::Start,
        "stop" => Action::Stop,
        "toggle" | "t" => Action::Toggle,
        "rate" => Action::Rate(rest),
        "rhythm" | "r" => Action::Rhythm(rest),
        "shock" => Action::Shock(rest),
        "med" | "medication" => Action::Medication(rest),
        "intervention" | "int" => Action::Intervention(rest),
        "note" => Action::Note(rest),
        "yes" | "y" | "pulse" => Action::Pulse(true),
        "no" | "n" => Action::Pulse(false),
        "audio" => match rest.to_lowercase().as_str() {
            "on" => Action::Audio(true),
            "off" => Action::Audio(false),
            _ => Action::Unknown(line.to_string()),
        },
        "wait" => Action::Wait(rest),
        "status" | "s" => Action::Status,
        "catalog" | "list" => Action::Catalog,
        "help" | "?" => Action::Help,
        "quit" | "exit" | "q" => Action::Quit,
        _ => Action::Unknown(command.to_string()),
    };
    Some(action)
}

fn parse_wait(arg: &str) -> Option<Duration> {
    let secs: f64 = arg.parse().ok()?;
    Duration::try_from_secs_f64(secs)
        .ok()
        .filter(|step| *step <= MAX_WAIT)
}

fn format_status(snapshot: &CprSnapshot) -> String {
    let phase = match snapshot.phase {
        CprPhase::Idle => "IDLE",
        CprPhase::Running => "COMPRESS",
        CprPhase::AwaitingPulseCheck => "PULSE CHECK",
    };
    format!(
        "[{:<11}] cycle {}  {:>3}/{}  {}  {}/min",
        phase,
        snapshot.current_cycle.max(snapshot.cycle_count),
        snapshot.cycle_progress,
        snapshot.cycle_target,
        format_mm_ss(snapshot.elapsed),
        snapshot.rate
    )
}

fn print_help() {
    println!("─────────────────────────────────────────");
    println!("  start | stop | toggle      session control");
    println!("  yes | no                   pulse check outcome");
    println!("  rate N                     compressions per minute");
    println!("  rhythm CODE | shock J      log rhythm / defibrillation");
    println!("  med TEXT | int TEXT        log medication / intervention");
    println!("  note TEXT                  free-text note");
    println!("  audio on|off | status      metronome beep / counters");
    println!("  catalog                    known rhythm, drug and procedure codes");
    println!("  wait SECS                  advance simulated time");
    println!("  quit                       end (an active session is logged)");
    println!("─────────────────────────────────────────");
}

/// Terminal-side rendering of controller signals
struct Console {
    /// Real-time mode: redraw a status line and ring the bell on beats
    live: bool,
    status_pending: bool,
}

impl Console {
    fn new(live: bool) -> Self {
        Self {
            live,
            status_pending: false,
        }
    }

    fn line(&mut self, text: impl AsRef<str>) {
        if self.status_pending {
            println!();
            self.status_pending = false;
        }
        println!("{}", text.as_ref());
    }

    fn beep(&self, tone: Tone) {
        // The terminal bell has no pitch; audio failures never interrupt CPR
        tracing::trace!("Beep {} Hz for {} ms", tone.frequency_hz, tone.duration_ms);
        let mut stderr = io::stderr();
        let _ = stderr.write_all(b"\x07");
        let _ = stderr.flush();
    }

    fn render<S: KeyValueStore>(&mut self, ctl: &mut CprController<S>) {
        let snapshot = ctl.snapshot();
        let mut redraw = false;

        for signal in ctl.drain_signals() {
            match signal {
                Signal::SessionStarted { rate } => {
                    self.line(format!("CPR started at {}/min. Compress!", rate));
                }
                Signal::Beat { tone, .. } => {
                    if let (true, Some(tone)) = (self.live, tone) {
                        self.beep(tone);
                    }
                    redraw = true;
                }
                Signal::Clock { .. } => redraw = true,
                Signal::PulseCheckDue { cycle } => {
                    self.line(format!(
                        "PULSE CHECK: cycle {} complete. Pulse present? (yes/no)",
                        cycle
                    ));
                }
                Signal::RateChanged { bpm } => self.line(format!("Rate set to {}/min", bpm)),
                Signal::SessionEnded(session) => {
                    self.line(format!(
                        "✓ CPR session logged: {}, {} cycles at {}/min",
                        session.duration, session.cycles, session.rate
                    ));
                }
            }
        }

        if self.live && redraw && snapshot.phase != CprPhase::Idle {
            print!("\r{}", format_status(&snapshot));
            let _ = io::stdout().flush();
            self.status_pending = true;
        }
    }
}

/// Confirmation for the newest event; shockable rhythms are flagged
fn event_echo<S: KeyValueStore>(ctl: &CprController<S>) -> Option<String> {
    let event = ctl.records().events.latest()?;
    let mut line = format!("✓ {} {}", event.time, event.details);
    let shockable = event.kind == CprEventKind::Rhythm
        && ctl
            .last_rhythm()
            .is_some_and(|r| get_default_catalog().is_shockable(r));
    if shockable {
        line.push_str("  [shockable]");
    }
    Some(line)
}

fn apply<S: KeyValueStore>(
    ctl: &mut CprController<S>,
    console: &mut Console,
    action: Action,
    virtual_clock: bool,
) -> Flow {
    let recorded = match action {
        Action::Start => {
            if !ctl.start() {
                console.line("A session is already running");
            }
            Ok(false)
        }
        Action::Stop => {
            if ctl.stop().is_none() {
                console.line("No active session");
            }
            Ok(false)
        }
        Action::Toggle => {
            ctl.toggle();
            Ok(false)
        }
        Action::Rate(arg) => arg
            .parse::<u32>()
            .map_err(|_| ValidationError::InvalidRate)
            .and_then(|bpm| ctl.set_rate(bpm))
            .map(|_| false),
        Action::Rhythm(code) => ctl.record_rhythm(&code).map(|_| true),
        Action::Shock(arg) => parse_shock_energy(&arg)
            .and_then(|joules| ctl.record_shock(joules))
            .map(|_| true),
        Action::Medication(text) => ctl.record_medication(&text).map(|_| true),
        Action::Intervention(text) => ctl.record_intervention(&text).map(|_| true),
        Action::Note(text) => ctl.record_note(&text).map(|_| true),
        Action::Pulse(detected) => {
            if !ctl.pulse_check(detected) {
                console.line("No pulse check pending");
            }
            Ok(false)
        }
        Action::Audio(enabled) => {
            ctl.set_audio_enabled(enabled);
            console.line(if enabled { "Audio on" } else { "Audio off" });
            Ok(false)
        }
        Action::Wait(arg) => {
            if !virtual_clock {
                console.line("'wait' is only available with --virtual-clock");
            } else {
                match parse_wait(&arg) {
                    Some(step) => ctl.advance_by(step),
                    None => console.line(format!(
                        "Usage: wait SECONDS (0 to {})",
                        MAX_WAIT.as_secs()
                    )),
                }
            }
            Ok(false)
        }
        Action::Status => {
            let mut status = format_status(&ctl.snapshot());
            if let Some(rhythm) = ctl.last_rhythm() {
                status.push_str(&format!("  rhythm {}", rhythm));
            }
            console.line(status);
            Ok(false)
        }
        Action::Catalog => {
            console.line(get_default_catalog().listing().trim_end());
            Ok(false)
        }
        Action::Help => {
            print_help();
            Ok(false)
        }
        Action::Quit => return Flow::Quit,
        Action::Unknown(command) => {
            console.line(format!("Unknown command '{}'. Type 'help'.", command));
            Ok(false)
        }
    };

    match recorded {
        Ok(true) => {
            if let Some(line) = event_echo(ctl) {
                console.line(line);
            }
        }
        Ok(false) => {}
        Err(e) => console.line(format!("! {}", e)),
    }
    Flow::Continue
}

/// Run a session until `quit` or end of input; an active session is stopped
/// and logged on the way out.
pub fn run<S: KeyValueStore>(mut ctl: CprController<S>, virtual_clock: bool) -> Result<()> {
    let mut console = Console::new(!virtual_clock);
    print_help();

    if virtual_clock {
        run_simulated(&mut ctl, &mut console)?;
    } else {
        run_realtime(&mut ctl, &mut console);
    }

    if ctl.phase() != CprPhase::Idle {
        ctl.stop();
        console.render(&mut ctl);
    }
    Ok(())
}

/// Commands are applied in order; time only moves on `wait`
fn run_simulated<S: KeyValueStore>(ctl: &mut CprController<S>, console: &mut Console) -> Result<()> {
    for line in io::stdin().lock().lines() {
        let line = line?;
        let Some(action) = parse_action(&line) else {
            continue;
        };
        let flow = apply(ctl, console, action, true);
        console.render(ctl);
        if flow == Flow::Quit {
            break;
        }
    }
    Ok(())
}

/// Stdin is read on its own thread; the main loop sleeps until the next
/// timer deadline or the next input line, whichever comes first.
fn run_realtime<S: KeyValueStore>(ctl: &mut CprController<S>, console: &mut Console) {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(Input::Line(line)).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to read input: {}", e);
                    break;
                }
            }
        }
        let _ = tx.send(Input::Eof);
    });

    let origin = Instant::now();
    loop {
        let received = match ctl.next_deadline() {
            Some(deadline) => rx.recv_timeout(deadline.saturating_sub(origin.elapsed())),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        ctl.advance_to(origin.elapsed());

        match received {
            Ok(Input::Line(line)) => {
                if let Some(action) = parse_action(&line) {
                    if apply(ctl, console, action, false) == Flow::Quit {
                        break;
                    }
                }
            }
            Ok(Input::Eof) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
        console.render(ctl);
    }
}
