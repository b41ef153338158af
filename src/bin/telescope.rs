//! # Telescope Binary Entry Point
//!
//! Thin command-line wrapper around [`NovaClient`].
//!
//! ## Usage
//!
//! ```bash
//! telescope --config telescope.toml upload m31.fits m42.fits --wait
//! telescope --api-key XXXX review 9012345 --annotations
//! telescope header m31.fits
//! telescope convert m31.fits m31.png
//! ```
//!
//! With `--wait`, uploads are polled every `polling.interval_secs` until every
//! submission has finished or `polling.max_rounds` rounds have passed. Reviews
//! are printed to stdout as JSON; logs go to stderr.

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::{info, warn, LevelFilter};
use std::path::PathBuf;

use telescope::common::config::ClientConfig;
use telescope::common::logging::init_logger;
use telescope::fits::{self, FitsDecoder, HeaderData};
use telescope::{NovaClient, Review, ReviewDetail};

/// Command-line arguments for the telescope binary
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (TOML format)
    #[arg(short, long)]
    config: Option<String>,

    /// API key, overrides `service.api_key` from the configuration
    #[arg(long, env = "ASTROMETRY_API_KEY")]
    api_key: Option<String>,

    /// Log debug output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload images for solving
    Upload {
        files: Vec<PathBuf>,

        /// Poll until every upload has finished, then print the reviews
        #[arg(long)]
        wait: bool,

        /// Skip the local FITS check before uploading
        #[arg(long)]
        no_check: bool,
    },
    /// Print the review of an existing submission
    Review {
        submission_id: u64,

        /// Also fetch object positions
        #[arg(long)]
        annotations: bool,
    },
    /// Print observation data from a FITS header
    Header { file: PathBuf },
    /// Convert a FITS image to PNG or JPEG
    Convert { input: PathBuf, output: PathBuf },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logger(if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    });

    match args.command {
        Command::Header { ref file } => {
            let header = fits::read_header(file)?;
            let data = HeaderData::from_header(&header)?;
            println!("{}", serde_json::to_string_pretty(&data)?);
            Ok(())
        }
        Command::Convert {
            ref input,
            ref output,
        } => {
            fits::convert_file(input, output)?;
            Ok(())
        }
        Command::Upload {
            ref files,
            wait,
            no_check,
        } => {
            let config = load_config(&args)?;
            let mut client = NovaClient::connect(&config.service)?;

            for file in files {
                let is_fits = file
                    .extension()
                    .is_some_and(|e| e.eq_ignore_ascii_case("fits") || e.eq_ignore_ascii_case("fit"));
                let submission_id = if is_fits && !no_check {
                    client.upload_checked(file, &FitsDecoder)?
                } else {
                    client.upload(file)?
                };
                info!("{} → submission {}", file.display(), submission_id);
            }

            if wait {
                wait_for_submissions(&mut client, &config)?;
            }

            let mut reviews = Vec::new();
            for key in client.finished() {
                reviews.push(client.review_submission(&key, ReviewDetail::Results)?);
            }
            for key in client.pending() {
                warn!("⏳ {} is still being solved", key);
            }
            print_reviews(&reviews)
        }
        Command::Review {
            submission_id,
            annotations,
        } => {
            let config = load_config(&args)?;
            let mut client = NovaClient::connect(&config.service)?;

            let key = format!("submission-{}", submission_id);
            client.track(&key, submission_id)?;

            let detail = if annotations {
                ReviewDetail::Annotated
            } else {
                ReviewDetail::Results
            };
            let review = client.review_submission(&key, detail)?;
            print_reviews(&[review])
        }
    }
}

/// Configuration from `--config` (or defaults), with the command-line API
/// key applied on top.
fn load_config(args: &Args) -> anyhow::Result<ClientConfig> {
    let mut config = match &args.config {
        Some(path) => ClientConfig::from_file(path)
            .with_context(|| format!("failed to load configuration from {}", path))?,
        None => ClientConfig::default(),
    };

    if let Some(api_key) = &args.api_key {
        config.service.api_key = api_key.clone();
    }

    config.validate()?;
    Ok(config)
}

/// Caller-driven polling: one `refresh_all` per interval.
fn wait_for_submissions(client: &mut NovaClient, config: &ClientConfig) -> anyhow::Result<()> {
    for round in 1..=config.polling.max_rounds {
        let finished = client.refresh_all(ReviewDetail::CalibrationOnly)?;
        for key in &finished {
            info!("✅ {} finished", key);
        }

        let pending = client.pending().len();
        if pending == 0 {
            return Ok(());
        }

        info!(
            "Round {}/{}: {} submission(s) pending, next check in {}s",
            round, config.polling.max_rounds, pending, config.polling.interval_secs
        );
        std::thread::sleep(config.polling.interval());
    }

    warn!(
        "Stopped polling after {} rounds with {} submission(s) pending",
        config.polling.max_rounds,
        client.pending().len()
    );
    Ok(())
}

fn print_reviews(reviews: &[Review]) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(reviews)?);
    Ok(())
}
