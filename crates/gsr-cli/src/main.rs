use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "gsr")]
#[command(about = "Game-state timeline reconciliation CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile a raw state stream into a corrected timeline
    Correct {
        /// Raw stream: JSON array of {frame, timestamp, readings, confidence?}
        #[arg(long)]
        input: String,

        /// Layered config paths in merge order (base -> game -> overrides...)
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Where to write the corrected timeline JSON
        #[arg(long)]
        out: String,

        /// Pretty-print the timeline JSON
        #[arg(long, default_value_t = false)]
        pretty: bool,

        /// Also write the timeline as CSV
        #[arg(long)]
        csv: Option<String>,

        /// Write a full run directory (timeline, csv, quality, manifest) under this root
        #[arg(long)]
        exports: Option<String>,

        /// Ignore raw frames before this index (overrides sampling.first_frame)
        #[arg(long)]
        first_frame: Option<u64>,

        /// Ignore raw frames at or after this index; negative = no limit (overrides sampling.last_frame)
        #[arg(long, allow_hyphen_values = true)]
        last_frame: Option<i64>,

        /// Fail on config keys nothing reads
        #[arg(long, default_value_t = false)]
        strict_config: bool,
    },

    /// Reconcile a raw stream and print only the quality report
    Quality {
        #[arg(long)]
        input: String,

        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Print JSON instead of the text report
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Ignore raw frames before this index (overrides sampling.first_frame)
        #[arg(long)]
        first_frame: Option<u64>,

        /// Ignore raw frames at or after this index; negative = no limit (overrides sampling.last_frame)
        #[arg(long, allow_hyphen_values = true)]
        last_frame: Option<i64>,

        #[arg(long, default_value_t = false)]
        strict_config: bool,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Print which frames a sampling plan would read from a video
    SamplePlan {
        /// Total frames in the video
        #[arg(long)]
        frame_count: u64,

        /// Video frame rate
        #[arg(long)]
        fps: f64,

        /// Target samples per second
        #[arg(long, default_value_t = gsr_capture::DEFAULT_FRAMES_PER_SEC)]
        frames_per_sec: f64,

        #[arg(long, default_value_t = 0)]
        first_frame: u64,

        /// Exclusive end frame; -1 = end of video
        #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
        last_frame: i64,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.cmd {
        Commands::Correct {
            input,
            config_paths,
            out,
            pretty,
            csv,
            exports,
            first_frame,
            last_frame,
            strict_config,
        } => commands::correct::run_correct(commands::correct::CorrectArgs {
            input,
            config_paths,
            out,
            pretty,
            csv,
            exports,
            first_frame,
            last_frame,
            strict_config,
        })?,

        Commands::Quality {
            input,
            config_paths,
            json,
            first_frame,
            last_frame,
            strict_config,
        } => commands::correct::run_quality(commands::correct::QualityArgs {
            input,
            config_paths,
            json,
            first_frame,
            last_frame,
            strict_config,
        })?,

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = gsr_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::SamplePlan {
            frame_count,
            fps,
            frames_per_sec,
            first_frame,
            last_frame,
        } => commands::sample_plan::run_sample_plan(frame_count, fps, frames_per_sec, first_frame, last_frame)?,
    }

    Ok(())
}

// Logs go to stderr; stdout carries command output.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}
