//! Workspace chores for Tether: `cargo run -p xtask -- <command>`

use clap::{Parser, Subcommand};
use std::process::Command;

const FUZZ_TARGETS: [&str; 4] = ["fuzz_packet", "fuzz_envelope", "fuzz_crypto", "fuzz_peer_store"];

#[derive(Parser)]
#[command(name = "xtask", about = "Tether workspace chores")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Formatting, clippy with warnings denied, then the test suite
    Check {
        /// Stop after clippy
        #[arg(long)]
        no_test: bool,
    },

    /// Fuzz the wire codecs and stores (cargo-fuzz on nightly)
    Fuzz {
        /// One of the fuzz targets; all of them when omitted
        target: Option<String>,
        /// Seconds per target
        #[arg(long, default_value_t = 60)]
        seconds: u64,
    },

    /// Run the tether-crypto benchmarks
    Bench,
}

fn main() -> anyhow::Result<()> {
    match Cli::parse().command {
        Commands::Check { no_test } => {
            cargo(&["fmt", "--all", "--check"])?;
            cargo(&["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"])?;
            if !no_test {
                cargo(&["test", "--workspace"])?;
            }
        }
        Commands::Fuzz { target, seconds } => {
            let targets = match target {
                Some(t) if FUZZ_TARGETS.contains(&t.as_str()) => vec![t],
                Some(t) => anyhow::bail!("unknown fuzz target {t}; expected one of {FUZZ_TARGETS:?}"),
                None => FUZZ_TARGETS.iter().map(|t| (*t).to_string()).collect(),
            };
            let budget = format!("-max_total_time={seconds}");
            for t in &targets {
                cargo(&["+nightly", "fuzz", "run", "--fuzz-dir", "fuzz", t, "--", &budget])?;
            }
        }
        Commands::Bench => cargo(&["bench", "-p", "tether-crypto"])?,
    }
    Ok(())
}

fn cargo(args: &[&str]) -> anyhow::Result<()> {
    println!("$ cargo {}", args.join(" "));
    // the rustup proxy, so `+nightly` resolves
    let status = Command::new("cargo").args(args).status()?;
    anyhow::ensure!(status.success(), "cargo {} failed: {status}", args.join(" "));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_fuzz_targets_exist() {
        let manifest =
            std::fs::read_to_string(concat!(env!("CARGO_MANIFEST_DIR"), "/../fuzz/Cargo.toml"))
                .unwrap();
        for target in FUZZ_TARGETS {
            assert!(manifest.contains(&format!("name = \"{target}\"")), "{target}");
        }
    }
}
