//! apcheck - Activity Provider conformance checker
//!
//! A small operator tool that exercises the Activity Provider protocol
//! against a live provider base URL and reports which endpoints conform.
//!
//! Exit codes:
//!   0 - All checks passed
//!   1 - Runtime error (config, connection setup)
//!   2 - One or more protocol checks failed

use anyhow::{Context, Result};
use clap::Parser;
use invenira_core::config::Config;
use invenira_core::provider::{HttpProviderClient, ProviderClient};
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::FmtSubscriber;

/// apcheck - Activity Provider conformance checker
///
/// Probes a provider's protocol endpoints and reports which of them
/// conform: parameter discovery, analytics contract, and (optionally)
/// a deploy plus analytics round trip for a given activity id.
///
/// Examples:
///   apcheck https://quiz-provider.example.com
///   apcheck https://quiz-provider.example.com --activity-id demo-1
///   apcheck https://quiz-provider.example.com --config invenira.toml -v
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Base URL of the Activity Provider to check
    ///
    /// A trailing slash is tolerated and stripped.
    #[arg(value_name = "BASE_URL")]
    pub base_url: String,

    /// Activity id to deploy during the check
    ///
    /// When set, apcheck also calls the deploy endpoint and fetches
    /// analytics for this id. The provider-side deployment is not
    /// cleaned up afterwards.
    #[arg(short, long, value_name = "ID")]
    pub activity_id: Option<String>,

    /// Path to configuration file
    ///
    /// If not specified, looks for invenira.toml in the current directory.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Validate the parsed arguments.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err("Provider base URL must start with 'http://' or 'https://'".to_string());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    init_logging(&args);

    info!("apcheck v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run_check(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            eprintln!("\n❌ Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level())
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Run the protocol checks. Returns exit code (0 or 2).
async fn run_check(args: Args) -> Result<i32> {
    let config = load_config(&args)?;
    let client = HttpProviderClient::new(config.provider_paths, config.http);
    let base_url = args.base_url.trim_end_matches('/').to_string();

    println!("🔎 Checking Activity Provider: {}\n", base_url);

    let mut failures = 0;

    // Check 1: parameter discovery
    match client.parameters(&base_url).await {
        Ok(names) => {
            println!("✅ Parameter discovery: {} parameter(s)", names.len());
            for name in &names {
                println!("     • {}", name);
            }
        }
        Err(e) => {
            failures += 1;
            println!("❌ Parameter discovery failed: {}", e);
        }
    }

    // Check 2: configuration interface URL (composition only; the page
    // is fetched client-side)
    println!(
        "ℹ️  Config interface URL: {}",
        client.config_interface_url(&base_url)
    );

    // Check 3: analytics contract
    match client.analytics_contract(&base_url).await {
        Ok(contract) => {
            println!(
                "✅ Analytics contract: {} qualitative, {} quantitative metric(s)",
                contract.qual_analytics.len(),
                contract.quant_analytics.len()
            );
        }
        Err(e) => {
            failures += 1;
            println!("❌ Analytics contract failed: {}", e);
        }
    }

    // Check 4 (optional): deploy + analytics round trip
    if let Some(ref activity_id) = args.activity_id {
        match client.deploy(&base_url, activity_id).await {
            Ok(url) => {
                println!("✅ Deploy: external URL {}", url);
            }
            Err(e) => {
                failures += 1;
                println!("❌ Deploy failed: {}", e);
            }
        }

        match client.analytics(&base_url, activity_id).await {
            Ok(rows) => {
                println!("✅ Analytics: {} student row(s)", rows.len());
            }
            Err(e) => {
                failures += 1;
                println!("❌ Analytics failed: {}", e);
            }
        }
    }

    if failures == 0 {
        println!("\n✅ Provider conforms to the protocol.");
        Ok(0)
    } else {
        println!("\n⛔ {} check(s) failed.", failures);
        Ok(2)
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path).context("Failed to load configuration");
    }

    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from invenira.toml");
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            eprintln!("⚠️  Failed to load config, using defaults: {}", e);
            Ok(Config::default())
        }
    }
}
