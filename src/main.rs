//! Digit Keypad - virtual numeric keypad daemon
//!
//! Usage:
//!   digit-keypad run              - Register the keypad and serve the device node
//!   digit-keypad run --dry-run    - Serve the node but only log key events
//!   digit-keypad send 5           - Press a digit through a running keypad
//!   digit-keypad init-config      - Write the default config file

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use digit_keypad::{
    config::Config,
    keyboard::{uinput_status, Digit, EventSink, LogSink, UinputSink},
    node::send_digit,
    KeypadService,
};

#[derive(Parser)]
#[command(name = "digit-keypad")]
#[command(about = "Virtual numeric keypad driven by a device node", version)]
struct Cli {
    /// Config file (default: platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register the virtual keypad and serve the device node
    Run {
        /// Device node path (overrides config)
        #[arg(short, long)]
        node: Option<PathBuf>,

        /// Log key events instead of injecting them
        #[arg(long)]
        dry_run: bool,
    },

    /// Write one digit to a running keypad
    Send {
        /// Digit to press (0-9)
        #[arg(value_parser = parse_digit)]
        digit: Digit,

        /// Device node path (overrides config)
        #[arg(short, long)]
        node: Option<PathBuf>,
    },

    /// Write the default config file
    InitConfig,
}

fn parse_digit(s: &str) -> Result<Digit, String> {
    match s.as_bytes() {
        [byte] => Digit::from_ascii(*byte).ok_or_else(|| format!("'{}' is not a digit (0-9)", s)),
        _ => Err("enter a single digit (0-9)".to_string()),
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Config::load().context("loading config"),
    }
}

fn init_logging(config: &Config) {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();
}

fn serve<S: EventSink + Send>(service: KeypadService<S>) -> Result<()> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || handler_flag.store(true, Ordering::Relaxed))
        .context("installing Ctrl-C handler")?;

    let served = service.run(&shutdown);
    let report = service.teardown();

    let requests = served.context("serving device node")?;
    log::info!(
        "Handled {} request(s): {} accepted, {} busy",
        requests,
        report.accepted,
        report.busy
    );
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = match cli.command {
        Commands::InitConfig => Config::default(),
        _ => load_config(cli.config.as_ref())?,
    };
    init_logging(&config);

    match cli.command {
        Commands::Run { node, dry_run } => {
            if let Some(node) = node {
                config.node.path = node;
            }

            if dry_run {
                let service = KeypadService::start(&config, || {
                    Ok::<_, std::convert::Infallible>(LogSink::new())
                })?;
                serve(service)
            } else {
                let service = KeypadService::start(&config, || UinputSink::new(&config.device))
                    .with_context(|| format!("starting keypad ({})", uinput_status()))?;
                serve(service)
            }
        }
        Commands::Send { digit, node } => {
            let path = node.unwrap_or(config.node.path);
            send_digit(&path, digit)
                .with_context(|| format!("pressing {} via {}", digit, path.display()))?;
            println!("Pressed {} via {}", digit, path.display());
            Ok(())
        }
        Commands::InitConfig => {
            let path = match cli.config {
                Some(path) => {
                    config.save_to(&path)?;
                    path
                }
                None => config.save()?,
            };
            println!("Config written to {}", path.display());
            Ok(())
        }
    }
}
