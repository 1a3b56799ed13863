use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

use posturelab::config::{PipelineConfig, APP_NAME, APP_VERSION};
use posturelab::pipeline::annotation::base_filename;
use posturelab::pipeline::narrative::{AnamnesisIntake, ExamResults, ImageSlot, PatientSummary};
use posturelab::{provider_from_config, FindingsMap, PostureError, PosturePipeline, ProviderSet, ViewType};

#[derive(Parser, Debug)]
#[command(name = "posturelab", version, about = "Postural analysis of clinical photographs")]
struct Cli {
    #[arg(long, global = true, help = "Configuration file (JSON)")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Detect, analyze, annotate and store one photograph. Prints the result as JSON.
    Annotate {
        file: PathBuf,
        #[arg(long, default_value = "frontal")]
        view: ViewType,
        /// Base of the stored file name. Built from patient/date/slot when omitted.
        #[arg(long)]
        base_name: Option<String>,
        #[arg(long)]
        patient: Option<String>,
        /// Session date, YYYY-MM-DD. Defaults to today.
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        slot: Option<String>,
    },
    /// Narrative paragraph from a findings JSON file.
    Narrative {
        #[arg(long)]
        findings: Option<PathBuf>,
        #[arg(long, default_value = "")]
        notes: String,
    },
    /// Anamnesis paragraph from an intake JSON file.
    Anamnesis { intake: PathBuf },
    /// Multimodal posture report over stored relative image paths.
    PostureReport {
        #[arg(long)]
        frontal: Option<String>,
        #[arg(long)]
        lateral_left: Option<String>,
        #[arg(long)]
        lateral_right: Option<String>,
        #[arg(long)]
        findings: Option<PathBuf>,
        #[arg(long, default_value = "")]
        notes: String,
    },
    /// Multimodal footprint report. All three foot images are required.
    FootprintReport {
        #[arg(long)]
        feet_frontal: Option<String>,
        #[arg(long)]
        feet_rear: Option<String>,
        #[arg(long)]
        footprint: Option<String>,
        #[arg(long)]
        findings: Option<PathBuf>,
        #[arg(long, default_value = "")]
        notes: String,
    },
    /// Integrated report from a JSON file with patient, anamnesis, exam and findings.
    IntegratedReport { input: PathBuf },
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct IntegratedInput {
    patient: PatientSummary,
    anamnesis: AnamnesisIntake,
    exam: ExamResults,
    findings: FindingsMap,
}

#[derive(Error, Debug)]
enum CliError {
    #[error("Cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Either --base-name or --patient with --slot is required")]
    MissingBaseName,

    #[error(transparent)]
    Pipeline(#[from] PostureError),
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CliError> {
    let file = File::open(path).map_err(|source| CliError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_reader(file).map_err(|source| CliError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn read_findings(path: Option<&Path>) -> Result<FindingsMap, CliError> {
    path.map(read_json::<FindingsMap>).transpose().map(Option::unwrap_or_default)
}

fn collect_paths<K: Ord>(entries: impl IntoIterator<Item = (K, Option<String>)>) -> BTreeMap<K, String> {
    entries
        .into_iter()
        .filter_map(|(key, path)| path.map(|p| (key, p)))
        .collect()
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = PipelineConfig::load(cli.config.as_deref());
    let providers = ProviderSet::from_config(&config.narrative);
    let narrator = providers.orchestrator(&config);

    match cli.command {
        Commands::Annotate {
            file,
            view,
            base_name,
            patient,
            date,
            slot,
        } => {
            let base_name = match (base_name, patient, slot) {
                (Some(base), _, _) => base,
                (None, Some(patient), Some(slot)) => {
                    let date = date.unwrap_or_else(|| chrono::Local::now().date_naive());
                    base_filename(&patient, date, &slot)
                }
                _ => return Err(CliError::MissingBaseName),
            };
            let original_filename = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let reader = File::open(&file).map_err(|source| CliError::Open {
                path: file.clone(),
                source,
            })?;

            let detector = provider_from_config(&config.detection);
            let pipeline = PosturePipeline::new(&config, detector.as_ref());
            let upload = pipeline.annotate_and_analyze(reader, &original_filename, &base_name, view)?;
            let json = serde_json::to_string_pretty(&upload).map_err(|source| CliError::Json {
                path: file,
                source,
            })?;
            println!("{json}");
        }
        Commands::Narrative { findings, notes } => {
            let findings = read_findings(findings.as_deref())?;
            println!("{}", narrator.generate_narrative(&findings, &notes));
        }
        Commands::Anamnesis { intake } => {
            let intake: AnamnesisIntake = read_json(&intake)?;
            println!("{}", narrator.generate_anamnesis_narrative(&intake));
        }
        Commands::PostureReport {
            frontal,
            lateral_left,
            lateral_right,
            findings,
            notes,
        } => {
            let paths = collect_paths([
                (ViewType::Frontal, frontal),
                (ViewType::LateralLeft, lateral_left),
                (ViewType::LateralRight, lateral_right),
            ]);
            let findings = read_findings(findings.as_deref())?;
            println!("{}", narrator.generate_posture_report(&paths, &notes, &findings));
        }
        Commands::FootprintReport {
            feet_frontal,
            feet_rear,
            footprint,
            findings,
            notes,
        } => {
            let paths = collect_paths([
                (ImageSlot::FeetFrontal, feet_frontal),
                (ImageSlot::FeetRear, feet_rear),
                (ImageSlot::Footprint, footprint),
            ]);
            let findings = read_findings(findings.as_deref())?;
            println!("{}", narrator.generate_footprint_report(&paths, &notes, &findings));
        }
        Commands::IntegratedReport { input } => {
            let input: IntegratedInput = read_json(&input)?;
            println!(
                "{}",
                narrator.generate_integrated_report(&input.patient, &input.anamnesis, &input.exam, &input.findings)
            );
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    posturelab::init_tracing();
    tracing::info!("{} starting v{}", APP_NAME, APP_VERSION);

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
