//! 🚀 liftx-cli: the front door, the bouncer, the lift operator scanning your pass.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 This binary parses arguments, sets up logging, loads config, and hands the
//! real work to the `liftx` library. Like a manager. 🦆
//!
//! ⚠️ Logs go to stderr. Stdout belongs to `liftx generate`, which pipes straight
//! into the other subcommands:
//! ```text
//! liftx generate 10000 | liftx copy-into 1000 --config liftx.toml
//! ```

use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use liftx::Variant;
use liftx::generator::TimestampStyle;
use tokio::io::BufReader;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "liftx", version, about = "🎿 Lift tickets from stdin into the warehouse")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 🚛 Batch, stage, and COPY INTO. Staged files are purged after the load.
    CopyInto {
        /// Tickets per Parquet file. Must be positive.
        #[arg(allow_negative_numbers = true)]
        batch_size: i64,
        /// Optional TOML config, merged over the environment.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// 📨 Batch, stage, and notify the pipe. Success means submitted, not loaded.
    Snowpipe {
        #[arg(allow_negative_numbers = true)]
        batch_size: i64,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// ✍️ One INSERT per ticket. No batches, no stage.
    Insert {
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// 🎰 Print fake tickets, one per line, then a blank line.
    Generate {
        count: u64,
        /// Write purchase_time as epoch seconds instead of ISO-8601.
        #[arg(long)]
        epoch_timestamps: bool,
    },
}

/// 🚀 main(): the "I pressed enter and held my breath" moment.
///
/// 🔧 Steps:
/// 1. Init tracing (to stderr, always)
/// 2. Parse args
/// 3. Load config and run the variant, or generate
/// 4. On error: log the cause chain, hint at connectivity, exit 1
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(err) = dispatch(cli.command).await {
        error!("💀 error: {}", err);
        // -- 🧅 peel the onion, one layer at a time
        let mut the_vibes_are_giving_connection_issues = false;
        for cause in err.chain().skip(1) {
            error!("⚠️  cause: {}", cause);
            let cause_str = cause.to_string();
            if cause_str.contains("error sending request")
                || cause_str.contains("connection refused")
                || cause_str.contains("Connection refused")
                || cause_str.contains("tcp connect error")
                || cause_str.contains("dns error")
                || cause_str.contains("operation timed out")
            {
                the_vibes_are_giving_connection_issues = true;
            }
        }

        if the_vibes_are_giving_connection_issues {
            error!(
                "🔧 hint: looks like the warehouse or the stage isn't reachable. \
                Check the account URL, the network path, and that the token hasn't expired. \
                Nothing was retried; re-run the job once it's reachable. ☕"
            );
        }

        std::process::exit(1);
    }

    Ok(())
}

async fn dispatch(command: Command) -> Result<()> {
    let (variant, config_path) = match command {
        Command::Generate {
            count,
            epoch_timestamps,
        } => {
            let style = if epoch_timestamps {
                TimestampStyle::Epoch
            } else {
                TimestampStyle::Iso
            };
            let stdout = std::io::stdout();
            return liftx::generate(BufWriter::new(stdout.lock()), count, style)
                .context("💀 Ticket generation failed. The fake skiers went home early.");
        }
        Command::CopyInto { batch_size, config } => (Variant::CopyInto { batch_size }, config),
        Command::Snowpipe { batch_size, config } => (Variant::Snowpipe { batch_size }, config),
        Command::Insert { config } => (Variant::Insert, config),
    };

    let app_config = liftx::app_config::load_config(config_path.as_deref())
        .context("💀 Couldn't load the config. Check the file, check the LIFTX_/SNOWFLAKE_ variables, check for a tab where a space should be.")?;

    let summary = liftx::run(app_config, variant, BufReader::new(tokio::io::stdin()))
        .await
        .context("💀 Ingest stopped. Nothing is retried; fix the cause and re-run the job.")?;
    summary.log();
    Ok(())
}
