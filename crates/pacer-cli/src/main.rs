//! Pacer CLI - host for cyclically executed robot control programs.

mod colors;
mod partition;
mod run;
mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use pacer_core::Isolation;

#[derive(Parser)]
#[command(name = "pacer")]
#[command(about = "Run robot control programs at a fixed cadence")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the WebSocket session host
    Serve {
        /// Address to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value = "1905")]
        port: u16,

        /// Where programs run: process or thread
        #[arg(long, default_value = "process")]
        isolation: Isolation,

        /// Milliseconds a replaced program gets to stop before it is killed
        #[arg(long, default_value = "0")]
        grace_ms: u64,

        /// Milliseconds between unsolicited telemetry messages
        #[arg(long, default_value = "2000")]
        telemetry_ms: u64,

        /// Initial executor cycle time in milliseconds
        #[arg(long, default_value = "80")]
        cycle_ms: f64,

        /// Initial renderer cycle time in milliseconds
        #[arg(long, default_value = "80")]
        gui_cycle_ms: f64,
    },

    /// Show how a program is split into setup and loop code
    Partition {
        /// Program file
        file: PathBuf,

        /// Debug level (1 strips GUI calls); ignored with --raw
        #[arg(short, long, default_value = "1")]
        debug_level: u8,

        /// Treat the file as a raw submission including its header
        #[arg(long)]
        raw: bool,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a program headlessly against a terminal simulation
    Run {
        /// Program file
        file: PathBuf,

        /// Target cycle time in milliseconds
        #[arg(long, default_value = "80")]
        cycle_ms: f64,

        /// Stop after this many milliseconds (default: until Ctrl+C)
        #[arg(long)]
        duration_ms: Option<u64>,

        /// Debug level (1 strips GUI calls)
        #[arg(short, long, default_value = "0")]
        debug_level: u8,

        /// Where the program runs: process or thread
        #[arg(long, default_value = "thread")]
        isolation: Isolation,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve {
            host,
            port,
            isolation,
            grace_ms,
            telemetry_ms,
            cycle_ms,
            gui_cycle_ms,
        } => {
            let config = serve::config(
                host,
                port,
                isolation,
                grace_ms,
                telemetry_ms,
                cycle_ms,
                gui_cycle_ms,
            );
            serve::execute(config).await?;
        }

        Commands::Partition {
            file,
            debug_level,
            raw,
            json,
        } => partition::execute(&file, debug_level, raw, json)?,

        Commands::Run {
            file,
            cycle_ms,
            duration_ms,
            debug_level,
            isolation,
        } => run::execute(&file, cycle_ms, duration_ms, debug_level, isolation).await?,
    }

    Ok(())
}
