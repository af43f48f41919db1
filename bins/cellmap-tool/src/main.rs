mod cmd;

use clap::{Parser, Subcommand};
use cmd::keys::KeyFormat;

#[derive(Parser)]
#[command(name = "cellmap-tool", about = "Row key and cell mapping toolbox")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the exclusive upper bound of every key starting with KEY.
    Successor {
        key: String,
        #[arg(long, value_enum, default_value_t)]
        format: KeyFormat,
    },
    /// Print the scan range a query with row key KEY produces.
    ScanRange {
        key: String,
        /// Leading row-key bytes that form the scan prefix.
        #[arg(long)]
        size: Option<usize>,
        #[arg(long, value_enum, default_value_t)]
        format: KeyFormat,
    },
    /// Write and read back sample users through the in-memory store.
    Demo {
        /// Path to a TOML or HCL configuration file.
        #[arg(long, env = "CELLMAP_CONFIG")]
        config: Option<String>,
    },
}

fn run(command: Command) -> Result<String, cmd::error::ToolError> {
    match command {
        Command::Successor { key, format } => {
            let key = cmd::keys::parse_key(&key, format)?;
            Ok(cmd::keys::successor(&key))
        }
        Command::ScanRange { key, size, format } => {
            let key = cmd::keys::parse_key(&key, format)?;
            let range = cmd::keys::scan_range(&key, size)?;
            Ok(cmd::keys::format_range(&range))
        }
        Command::Demo { config } => {
            tracing::info!(config = ?config, "running demo");
            cmd::demo::run(config.as_deref())
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    match run(cli.command) {
        Ok(output) => println!("{output}"),
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            std::process::exit(1);
        }
    }
}
