//! unikv command-line interface.
//!
//! Thin wrapper over [`unikv::Store`] for inspecting and editing stores
//! from a shell.

mod commands;
mod ui;
mod utils;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use commands::StoreArgs;

#[derive(Parser, Debug)]
#[command(name = "unikv")]
#[command(about = "Inspect and edit unikv key-value stores")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(flatten)]
    store: StoreArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the value stored under a key
    Get {
        key: String,

        /// Write a blob value's raw bytes to this file instead of printing it
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Store a value under a key
    Set {
        key: String,

        /// JSON value (or plain text with --text)
        #[arg(required_unless_present = "blob_file")]
        value: Option<String>,

        /// Store the contents of a file as a blob
        #[arg(long, conflicts_with_all = ["value", "text"])]
        blob_file: Option<PathBuf>,

        /// Store VALUE as a string instead of parsing it as JSON
        #[arg(long)]
        text: bool,
    },

    /// Remove a key
    Rm { key: String },

    /// Remove every entry of the store
    Clear,

    /// Print the number of entries
    Len,

    /// List keys in insertion order
    Keys,

    /// Print the key at an index
    Key { index: u64 },

    /// Print every entry
    Dump {
        /// Print one JSON object per line
        #[arg(long)]
        json: bool,
    },

    /// List registered drivers and whether they are usable here
    Drivers,

    /// Drop the store's namespace
    Drop,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match commands::execute(cli.command, &cli.store).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            ui::print_error(&err);
            ExitCode::FAILURE
        },
    }
}
