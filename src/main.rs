use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use whatspeed::config::Config;
use whatspeed::throughput::report;
use whatspeed::{select, RunError, SpeedTest};

#[derive(Parser)]
#[command(
    name = "whatspeed",
    about = "Portable download/upload speed test against the nearest public endpoint",
    version,
    long_about = None
)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, env = "WHATSPEED_CONFIG")]
    config: Option<PathBuf>,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Measure download and upload speed against the nearest endpoint
    SpeedTest {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,

        /// Skip the download phase
        #[arg(long)]
        no_download: bool,

        /// Skip the upload phase
        #[arg(long)]
        no_upload: bool,

        /// Directory source URL (repeatable, replaces the configured list)
        #[arg(long = "source")]
        sources: Vec<String>,

        /// Use the endpoint with this id instead of the nearest one
        #[arg(long)]
        server_id: Option<i64>,

        /// Per-request timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// List discovered endpoints, nearest first
    Servers {
        /// How many endpoints to show
        #[arg(long, default_value = "10")]
        limit: usize,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,

        /// Directory source URL (repeatable, replaces the configured list)
        #[arg(long = "source")]
        sources: Vec<String>,
    },

    /// Show the client location as seen by the directory service
    Location {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // stdout carries results and --json; logs go to stderr.
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        // A void measurement still has a report worth showing.
        if let Some(RunError::Measurement { report: r }) = e.downcast_ref::<RunError>() {
            eprint!("{}", report::format_summary(r));
        }
        eprintln!("whatspeed: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::SpeedTest {
            json,
            no_download,
            no_upload,
            sources,
            server_id,
            timeout,
        } => {
            if !sources.is_empty() {
                config.discovery.sources = sources;
            }
            if let Some(secs) = timeout {
                config.http.timeout_secs = secs;
            }
            config.measurement.skip_download |= no_download;
            config.measurement.skip_upload |= no_upload;
            config.validate()?;

            tracing::info!(
                sources = config.discovery.sources.len(),
                ?server_id,
                "Running speed test"
            );
            let speedtest = SpeedTest::from_config(config)?;

            let report = speedtest
                .run(server_id, |sample| {
                    if !json {
                        println!("{}", report::format_sample(sample));
                    }
                })
                .await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!();
                print!("{}", report::format_summary(&report));
            }
        }
        Commands::Servers {
            limit,
            json,
            sources,
        } => {
            if !sources.is_empty() {
                config.discovery.sources = sources;
            }
            config.validate()?;

            let speedtest = SpeedTest::from_config(config)?;
            let location = speedtest.locate().await?;
            let endpoints = speedtest.discover().await?;
            let ranked = select::rank_by_distance(&location, &endpoints);

            if json {
                let shown: Vec<_> = ranked.iter().take(limit).collect();
                println!("{}", serde_json::to_string_pretty(&shown)?);
                return Ok(());
            }

            println!("{:>8} | {:>9} | Endpoint", "Id", "Distance");
            println!("{:->8}-|-{:->9}-|-{:-<40}", "", "", "");
            for r in ranked.iter().take(limit) {
                println!(
                    "{:>8} | {:>6.0} km | {}",
                    r.endpoint.id,
                    r.distance_m / 1000.0,
                    r.endpoint
                );
            }
            println!("({} of {} endpoints shown)", ranked.len().min(limit), ranked.len());
        }
        Commands::Location { json } => {
            let speedtest = SpeedTest::from_config(config)?;
            let location = speedtest.locate().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&location)?);
            } else {
                println!("IP:        {}", location.public_ip);
                println!("ISP:       {}", location.isp_name);
                println!("Country:   {}", location.country_code);
                println!("Latitude:  {:.4}", location.latitude);
                println!("Longitude: {:.4}", location.longitude);
            }
        }
    }

    Ok(())
}
