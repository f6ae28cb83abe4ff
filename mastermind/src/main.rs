//! Mastermind benchmark CLI.
//!
//! `play` runs games against a model and appends each result to a JSONL file;
//! `init` writes a default `mastermind.toml`.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use mastermind::exit_codes;
use mastermind::io::config::{DEFAULT_CONFIG_PATH, MastermindConfig, write_config};
use mastermind::logging;
use mastermind::play::{PlayArgs, run_play};

#[derive(Parser)]
#[command(
    name = "mastermind",
    version,
    about = "Benchmark language-model agents at Mastermind"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Play one or more games and append results to a JSONL file.
    Play(PlayArgs),
    /// Write a default configuration file.
    Init {
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(exit_codes::INVALID);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Play(args) => {
            logging::init(args.verbose);
            // A missing .env is normal.
            let _ = dotenvy::dotenv();
            let interrupt = install_interrupt_handler()?;
            let stdout = io::stdout();
            run_play(&args, &mut stdout.lock(), &interrupt)?;
            Ok(())
        }
        Command::Init { config, force } => cmd_init(config, force),
    }
}

/// First Ctrl-C finishes the current game as an error; a second one exits.
fn install_interrupt_handler() -> Result<Arc<AtomicBool>> {
    let interrupt = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupt);
    ctrlc::set_handler(move || {
        if flag.swap(true, Ordering::SeqCst) {
            std::process::exit(exit_codes::INTERRUPTED);
        }
        eprintln!("interrupt: stopping after the current turn (Ctrl-C again to exit now)");
    })
    .context("install Ctrl-C handler")?;
    Ok(interrupt)
}

fn cmd_init(path: PathBuf, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(&path, &MastermindConfig::default())?;
    println!("init: wrote {}", path.display());
    Ok(())
}
