//! nPod Control CLI
//!
//! Command-line access to the stateless parts of the control plane:
//! - `check-sdk`: check a client SDK version against an allow-list
//! - `spu-config`: build SPU network configuration from an inventory file

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use npod_control::{
    ControlPlaneConfig, Error, Inventory, LookupKeys, Result, SdkValidator, SpuLookup,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// nPod Control - volume access, SDK and SPU network tooling
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (YAML or JSON)
    #[arg(long, env = "NPOD_CONTROL_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check an SDK version against the allowed version patterns
    CheckSdk {
        /// Installed SDK version; omit when the SDK is not installed
        #[arg(long, env = "NPOD_SDK_VERSION")]
        sdk_version: Option<String>,

        /// Allowed version pattern, replaces the configured list (repeatable)
        #[arg(long = "allow")]
        allow: Vec<String>,
    },

    /// Print the SPU network configuration for inventory host groups as JSON
    SpuConfig {
        /// Inventory document with groups, hostvars and vars
        #[arg(long)]
        inventory: PathBuf,

        /// Read a setting from another variable, as key=variable (repeatable)
        #[arg(long = "alias")]
        aliases: Vec<String>,

        /// Host groups to include
        #[arg(required = true)]
        groups: Vec<String>,
    },
}

// =============================================================================
// Main
// =============================================================================

fn main() -> ExitCode {
    let args = Args::parse();

    init_logging(&args);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => ControlPlaneConfig::from_file(path)
            .with_context(|| format!("failed to load configuration {}", path.display()))?,
        None => ControlPlaneConfig::default(),
    };
    debug!("Configuration: {:?}", config);

    match args.command {
        Command::CheckSdk { sdk_version, allow } => {
            let validator = SdkValidator::new(config.sdk.clone());
            let allowed = (!allow.is_empty()).then_some(allow.as_slice());
            validator.validate_with(sdk_version.as_deref(), allowed)?;

            let version = sdk_version.as_deref().unwrap_or_default();
            info!("SDK version {} is compatible", version);
            println!("{} {} is compatible", config.sdk.library, version);
        }
        Command::SpuConfig {
            inventory,
            aliases,
            groups,
        } => {
            let keys = LookupKeys::from_overrides(parse_aliases(&aliases)?)?;
            let inventory = Inventory::from_file(&inventory)
                .with_context(|| format!("failed to load inventory {}", inventory.display()))?;
            let entries = SpuLookup::new(config.network.clone())
                .with_keys(keys)
                .build_network_configs(groups.as_slice(), &inventory)?;

            info!("Built network configuration for {} SPUs", entries.len());
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
    }

    Ok(())
}

/// Split `key=variable` pairs
fn parse_aliases(aliases: &[String]) -> Result<Vec<(&str, &str)>> {
    aliases
        .iter()
        .map(|alias| {
            alias
                .split_once('=')
                .filter(|(key, variable)| !key.is_empty() && !variable.is_empty())
                .ok_or_else(|| {
                    Error::Configuration(format!(
                        "Invalid alias '{}', expected key=variable",
                        alias
                    ))
                })
        })
        .collect()
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    // stdout carries command output
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
