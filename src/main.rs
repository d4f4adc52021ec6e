use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use critiq::{
    GenerationBackend, ModelSelection, OllamaClient, Pipeline, PipelineConfig, Sender,
    StageConfig, StageName, default_guidelines, parse_guidelines_file, parse_transcript_file,
    write_report, write_run_json,
};

#[derive(Parser)]
#[command(name = "critiq")]
#[command(author, version, about = "Customer service chat assessment pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full assessment pipeline over a transcript
    Process {
        /// Input transcript file (JSON message list)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file for the run record (JSON)
        #[arg(short, long)]
        output: PathBuf,

        /// Output file for a human-readable report (text)
        #[arg(long)]
        report: Option<PathBuf>,

        /// Model to use for every stage (default: first available)
        #[arg(long)]
        model: Option<String>,

        /// JSON file overriding the built-in guideline set
        #[arg(long)]
        guidelines: Option<PathBuf>,

        /// Retry budget per stage
        #[arg(long, default_value = "3")]
        max_attempts: u32,

        /// Generation timeout per call, in seconds
        #[arg(long, default_value = "300")]
        timeout_secs: u64,

        /// Reviewer note forwarded to the analysis stage
        #[arg(long)]
        case_hint: Option<String>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Print transcript statistics without calling the backend
    Inspect {
        /// Input transcript file (JSON message list)
        #[arg(short, long)]
        input: PathBuf,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show backend availability and the models it serves
    Models {
        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Process {
            input,
            output,
            report,
            model,
            guidelines,
            max_attempts,
            timeout_secs,
            case_hint,
            verbose,
        } => {
            setup_logging(verbose);
            process_transcript(
                input,
                output,
                report,
                model,
                guidelines,
                max_attempts,
                timeout_secs,
                case_hint,
            )
            .await
        }
        Commands::Inspect { input, verbose } => {
            setup_logging(verbose);
            inspect_transcript(input)
        }
        Commands::Models { verbose } => {
            setup_logging(verbose);
            list_models().await
        }
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

async fn process_transcript(
    input: PathBuf,
    output: PathBuf,
    report: Option<PathBuf>,
    model: Option<String>,
    guidelines: Option<PathBuf>,
    max_attempts: u32,
    timeout_secs: u64,
    case_hint: Option<String>,
) -> Result<()> {
    info!("Loading transcript from {:?}", input);
    let transcript =
        parse_transcript_file(&input).context("Failed to parse input transcript")?;
    anyhow::ensure!(!transcript.is_empty(), "Transcript contains no messages");

    info!(
        "Loaded {} messages ({} customer, {} agent)",
        transcript.len(),
        transcript.count_from(Sender::Customer),
        transcript.count_from(Sender::Agent)
    );

    let guidelines = match guidelines {
        Some(path) => parse_guidelines_file(&path).context("Failed to parse guidelines file")?,
        None => default_guidelines(),
    };

    let transcript_id = input
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("transcript")
        .to_string();

    let config = PipelineConfig {
        stage: StageConfig {
            max_attempts,
            generation_timeout: Duration::from_secs(timeout_secs),
            ..Default::default()
        },
        models: ModelSelection {
            override_model: model,
            ..Default::default()
        },
        guidelines,
        case_hint,
    };

    let backend = Arc::new(OllamaClient::from_env());
    let pipeline = Pipeline::new(backend, config);

    let run = pipeline.process(&transcript, &transcript_id).await;

    for stage in StageName::ALL {
        if let Some(outcome) = run.stage(stage) {
            match &outcome.error_message {
                Some(error) => info!("Stage {}: failed ({})", stage, error),
                None => info!("Stage {}: completed", stage),
            }
        }
    }

    write_run_json(&run, &output).context("Failed to write run output")?;
    info!("Run record written to {:?}", output);

    if let Some(report_path) = report {
        write_report(&run, &report_path).context("Failed to write report")?;
        info!("Report written to {:?}", report_path);
    }

    info!("Complete: overall status {:?}", run.overall_status);
    Ok(())
}

fn inspect_transcript(input: PathBuf) -> Result<()> {
    let transcript =
        parse_transcript_file(&input).context("Failed to parse input transcript")?;

    println!("Transcript Statistics");
    println!("=====================");
    println!("Total messages: {}", transcript.len());
    println!(
        "Customer messages: {}",
        transcript.count_from(Sender::Customer)
    );
    println!("Agent messages: {}", transcript.count_from(Sender::Agent));
    println!("Unknown senders: {}", transcript.count_from(Sender::Unknown));

    let total_chars: usize = transcript.messages.iter().map(|m| m.text.len()).sum();
    let avg_chars = if transcript.is_empty() {
        0
    } else {
        total_chars / transcript.len()
    };
    println!("Average message length: {} chars", avg_chars);

    let with_timestamps = transcript
        .messages
        .iter()
        .filter(|m| m.timestamp.is_some())
        .count();
    println!(
        "Messages with timestamps: {}/{}",
        with_timestamps,
        transcript.len()
    );

    Ok(())
}

async fn list_models() -> Result<()> {
    let backend = OllamaClient::from_env();

    if !backend.is_available().await {
        println!("Backend: not reachable");
        return Ok(());
    }
    println!("Backend: available");

    let models = backend
        .list_models()
        .await
        .context("Failed to list models")?;
    println!("Models: {}", models.len());
    for model in models {
        if model.size > 0 {
            println!(
                "  {} ({:.1} GB)",
                model.name,
                model.size as f64 / 1_073_741_824.0
            );
        } else {
            println!("  {}", model.name);
        }
    }

    Ok(())
}
