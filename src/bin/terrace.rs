//! terrace: state tooling for the terrace orchestrator
//!
//! This binary wires the core crates together behind a small CLI. Today it
//! exposes state snapshot inspection:
//!
//! ```bash
//! # Summarize a state snapshot
//! terrace state inspect ./snapshot.json
//!
//! # Include every address in the output
//! terrace state inspect ./snapshot.json --detail
//! ```
//!
//! A snapshot file is a JSON object mapping state tracking keys to
//! base64-encoded record payloads — the byte-level envelope around the
//! state codec's record set.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use base64::Engine;
use clap::{Parser, Subcommand};

use terrace_state::decode_state;

#[derive(Parser)]
#[command(
    name = "terrace",
    author,
    version,
    about = "State tooling for the terrace orchestrator",
    long_about = "Inspect persisted terrace state snapshots: decode the record set, \
                  apply forward-compatibility policies, and summarize the state tree."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// State snapshot operations
    #[command(subcommand)]
    State(StateCmd),
}

#[derive(Subcommand)]
enum StateCmd {
    /// Decode a snapshot file and summarize its contents
    Inspect {
        /// Path to the snapshot file
        file: PathBuf,

        /// List every component instance and resource object address
        #[arg(long)]
        detail: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::State(StateCmd::Inspect { file, detail }) => inspect(&file, detail),
    }
}

fn inspect(file: &Path, detail: bool) -> Result<()> {
    let records = read_snapshot(file)?;
    let state = decode_state(&records)
        .with_context(|| format!("failed to load state from {}", file.display()))?;

    println!("components: {}", state.component_instances().len());
    println!(
        "resource instance objects: {}",
        state.resource_instance_objects().len()
    );
    println!(
        "keys marked for discard: {}",
        state.discard_unsupported_keys().len()
    );

    if detail {
        for addr in state.component_instances().keys() {
            println!("  {addr}");
        }
        for (addr, object) in state.resource_instance_objects() {
            println!("  {addr} ({})", object.record.status);
        }
        for key in state.discard_unsupported_keys() {
            println!("  discarding {key}");
        }
    }
    Ok(())
}

/// Read the snapshot envelope: a JSON object of key to base64 payload.
fn read_snapshot(file: &Path) -> Result<BTreeMap<String, Vec<u8>>> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let encoded: BTreeMap<String, String> =
        serde_json::from_str(&text).context("snapshot is not a JSON object of string records")?;

    let mut records = BTreeMap::new();
    for (key, payload) in encoded {
        let raw = base64::engine::general_purpose::STANDARD
            .decode(&payload)
            .with_context(|| format!("record {key:?} is not valid base64"))?;
        records.insert(key, raw);
    }
    Ok(records)
}
