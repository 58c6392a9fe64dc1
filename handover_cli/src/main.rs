use clap::{Args, Parser, Subcommand, ValueEnum};
use handover_core::*;
use std::path::{Path, PathBuf};

mod session;

#[derive(Parser)]
#[command(name = "handover")]
#[command(about = "Patient handover and resuscitation log", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Use a specific config file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an interactive CPR session (metronome, pulse checks, events)
    Cpr {
        /// Compressions per minute (overrides config)
        #[arg(long)]
        rate: Option<u32>,

        /// Silence the metronome beep
        #[arg(long)]
        no_audio: bool,

        /// Simulated time: 'wait SECS' advances the clock instead of sleeping
        #[arg(long)]
        virtual_clock: bool,
    },

    /// Record a single CPR event
    Event {
        #[arg(value_enum)]
        kind: EventKind,

        /// Rhythm code, shock energy in joules, or free text
        #[arg(num_args = 0.., trailing_var_arg = true, allow_hyphen_values = true)]
        value: Vec<String>,
    },

    /// Show the CPR session log, event log or timeline
    Log {
        #[arg(value_enum, default_value_t = LogKind::Timeline)]
        which: LogKind,

        /// Maximum entries to show
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Manage patient records
    Patient {
        #[command(subcommand)]
        action: PatientCommand,
    },

    /// Record a set of vital signs for a patient
    Vitals {
        /// Patient id or unique id prefix
        patient: String,

        /// Heart rate (bpm)
        #[arg(long)]
        hr: Option<u16>,

        /// Respiratory rate (/min)
        #[arg(long)]
        rr: Option<u16>,

        /// Blood pressure as SYS/DIA
        #[arg(long)]
        bp: Option<String>,

        /// Oxygen saturation (%)
        #[arg(long)]
        spo2: Option<u8>,

        /// Temperature (C)
        #[arg(long)]
        temp: Option<f32>,

        /// Blood glucose (mmol/L)
        #[arg(long)]
        glucose: Option<f32>,
    },

    /// Record a Glasgow Coma Scale assessment
    Gcs {
        /// Patient id or unique id prefix
        patient: String,

        #[arg(long)]
        eye: u8,

        #[arg(long)]
        verbal: u8,

        #[arg(long)]
        motor: u8,
    },

    /// Add a free-text note to a patient
    Note {
        /// Patient id or unique id prefix
        patient: String,

        #[arg(num_args = 1.., trailing_var_arg = true)]
        text: Vec<String>,
    },

    /// Print the handover report
    Report {
        /// Patient id or prefix (defaults to the most recent patient)
        patient: Option<String>,
    },

    /// List known rhythm, medication and intervention codes
    Catalog,

    /// Export CPR records to CSV files
    Export {
        /// Output directory
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(Subcommand)]
enum PatientCommand {
    /// Create a patient record
    New {
        name: String,

        #[command(flatten)]
        fields: PatientFields,
    },
    /// List patients, newest first
    List,
    /// Show one patient record
    Show { patient: String },
    /// Edit identity/history fields
    Update {
        patient: String,

        #[arg(long)]
        name: Option<String>,

        #[command(flatten)]
        fields: PatientFields,
    },
    /// Delete a patient record
    Delete { patient: String },
}

#[derive(Args)]
struct PatientFields {
    #[arg(long)]
    age: Option<u8>,
    #[arg(long)]
    sex: Option<String>,
    #[arg(long)]
    location: Option<String>,
    #[arg(long)]
    complaint: Option<String>,
    #[arg(long)]
    history: Option<String>,
    #[arg(long)]
    allergies: Option<String>,
    #[arg(long)]
    medications: Option<String>,
}

impl PatientFields {
    fn into_update(self, name: Option<String>) -> PatientUpdate {
        PatientUpdate {
            name,
            age: self.age,
            sex: self.sex,
            location: self.location,
            chief_complaint: self.complaint,
            history: self.history,
            allergies: self.allergies,
            medications: self.medications,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum EventKind {
    Rhythm,
    Shock,
    Medication,
    Intervention,
    Note,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogKind {
    Sessions,
    Events,
    Timeline,
}

fn main() {
    handover_core::logging::init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let data_dir = cli.data_dir.unwrap_or_else(|| config.data.data_dir.clone());
    let store = FileStore::new(&data_dir);

    match cli.command {
        Commands::Cpr {
            rate,
            no_audio,
            virtual_clock,
        } => {
            let mut settings = ControllerSettings::from(&config.cpr);
            if let Some(rate) = rate {
                if rate == 0 {
                    return Err(ValidationError::InvalidRate.into());
                }
                settings.rate = rate;
            }
            if no_audio {
                settings.audio_enabled = false;
            }
            session::run(CprController::new(store, settings), virtual_clock)
        }
        Commands::Event { kind, value } => cmd_event(store, &config, kind, &value.join(" ")),
        Commands::Log { which, limit } => cmd_log(&store, &config, which, limit),
        Commands::Patient { action } => cmd_patient(store, action),
        Commands::Vitals {
            patient,
            hr,
            rr,
            bp,
            spo2,
            temp,
            glucose,
        } => {
            let mut vitals = VitalSigns::taken_at(chrono::Utc::now());
            vitals.heart_rate = hr;
            vitals.resp_rate = rr;
            if let Some(bp) = bp {
                let (systolic, diastolic) = parse_blood_pressure(&bp)?;
                vitals.systolic = Some(systolic);
                vitals.diastolic = diastolic;
            }
            vitals.spo2 = spo2;
            vitals.temperature = temp;
            vitals.glucose = glucose;

            let mut registry = PatientRegistry::load(store);
            let id = registry.resolve(&patient)?;
            registry.add_vitals(id, vitals)?;
            println!("✓ Vitals recorded");
            Ok(())
        }
        Commands::Gcs {
            patient,
            eye,
            verbal,
            motor,
        } => {
            let assessment = GcsAssessment::new(chrono::Utc::now(), eye, verbal, motor)?;
            let summary = format!("{} ({})", assessment.breakdown(), assessment.severity());

            let mut registry = PatientRegistry::load(store);
            let id = registry.resolve(&patient)?;
            registry.add_gcs(id, assessment)?;
            println!("✓ GCS recorded: {}", summary);
            Ok(())
        }
        Commands::Note { patient, text } => {
            let mut registry = PatientRegistry::load(store);
            let id = registry.resolve(&patient)?;
            registry.add_note(id, &text.join(" "))?;
            println!("✓ Note added");
            Ok(())
        }
        Commands::Report { patient } => cmd_report(store, &config, patient),
        Commands::Catalog => {
            print!("{}", get_default_catalog().listing());
            Ok(())
        }
        Commands::Export { out } => cmd_export(&store, &config, &out),
    }
}

fn cmd_event(store: FileStore, config: &Config, kind: EventKind, value: &str) -> Result<()> {
    let mut ctl = CprController::new(store, ControllerSettings::from(&config.cpr));
    match kind {
        EventKind::Rhythm => ctl.record_rhythm(value)?,
        EventKind::Shock => ctl.record_shock(parse_shock_energy(value)?)?,
        EventKind::Medication => ctl.record_medication(value)?,
        EventKind::Intervention => ctl.record_intervention(value)?,
        EventKind::Note => ctl.record_note(value)?,
    }

    if let Some(event) = ctl.records().events.latest() {
        println!("✓ Logged {} at {}: {}", event.kind, event.time, event.details);
    }
    Ok(())
}

fn cmd_log(store: &FileStore, config: &Config, which: LogKind, limit: usize) -> Result<()> {
    let records = CprRecords::load(store, config.cpr.log_cap);

    match which {
        LogKind::Sessions => {
            if records.sessions.is_empty() {
                println!("No CPR sessions recorded.");
            }
            for s in records.sessions.iter().take(limit) {
                println!(
                    "{}  duration {}  cycles {}  rate {}/min  rhythm {}",
                    s.time,
                    s.duration,
                    s.cycles,
                    s.rate,
                    s.rhythm.as_deref().unwrap_or("-")
                );
            }
        }
        LogKind::Events => {
            if records.events.is_empty() {
                println!("No CPR events recorded.");
            }
            for e in records.events.iter().take(limit) {
                println!("{}  {:<13} {}", e.time, e.kind, e.details);
            }
        }
        LogKind::Timeline => {
            if records.timeline.is_empty() {
                println!("Timeline is empty.");
            }
            for e in records.timeline.iter().take(limit) {
                println!("{}  {:<13} {}", e.time, e.kind, e.details);
            }
        }
    }
    Ok(())
}

fn cmd_patient(store: FileStore, action: PatientCommand) -> Result<()> {
    let mut registry = PatientRegistry::load(store);

    match action {
        PatientCommand::New { name, fields } => {
            let id = registry.create(&name, fields.into_update(None))?;
            println!("✓ Created patient {}", id);
        }
        PatientCommand::List => {
            if registry.list().is_empty() {
                println!("No patients recorded.");
            }
            for p in registry.list() {
                let short = p.id.to_string();
                println!(
                    "{}  {:<24} {}",
                    &short[..8],
                    p.name,
                    p.chief_complaint.as_deref().unwrap_or("")
                );
            }
        }
        PatientCommand::Show { patient } => {
            let id = registry.resolve(&patient)?;
            if let Some(record) = registry.get(id) {
                print!("{}", render_patient_summary(record));
            }
        }
        PatientCommand::Update {
            patient,
            name,
            fields,
        } => {
            let id = registry.resolve(&patient)?;
            registry.update(id, fields.into_update(name))?;
            println!("✓ Updated patient {}", id);
        }
        PatientCommand::Delete { patient } => {
            let id = registry.resolve(&patient)?;
            let removed = registry.delete(id)?;
            println!("✓ Deleted patient {} ({})", removed.name, id);
        }
    }
    Ok(())
}

fn cmd_report(store: FileStore, config: &Config, patient: Option<String>) -> Result<()> {
    let records = CprRecords::load(&store, config.cpr.log_cap);
    let registry = PatientRegistry::load(store);

    let record = match patient {
        Some(p) => {
            let id = registry.resolve(&p)?;
            registry.get(id)
        }
        None => registry.latest(),
    };

    print!("{}", render_handover(record, &records, chrono::Utc::now()));
    Ok(())
}

fn cmd_export(store: &FileStore, config: &Config, out: &Path) -> Result<()> {
    let records = CprRecords::load(store, config.cpr.log_cap);
    let count = export_records(&records, out)?;
    println!("✓ Exported {} rows to {}", count, out.display());
    Ok(())
}
