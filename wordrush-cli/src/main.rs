mod commands;
mod config;

use clap::{Parser, Subcommand};
use config::CliConfig;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wordrush_core::GameError;

#[derive(Parser)]
#[command(name = "wordrush")]
#[command(about = "WordRush - play the on-chain word game from your terminal")]
#[command(version)]
struct Cli {
    /// Data directory for the local guess database
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// JSON config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play interactively against the simulated contract
    Play(commands::PlayArgs),

    /// Inspect or clear locally stored guesses
    #[command(subcommand)]
    Guesses(commands::GuessCommands),

    /// Score a guess against an answer
    Evaluate {
        /// Five letter guess
        guess: String,
        /// Five letter answer
        answer: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!(
            "wordrush={},wordrush_core={}",
            log_level, log_level
        )))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = CliConfig::load(cli.config.as_deref()).await?;
    let data_dir = cli.data_dir.unwrap_or_else(config::default_data_dir);
    tokio::fs::create_dir_all(&data_dir).await?;

    let ctx = commands::Context { data_dir, config };

    let result = match cli.command {
        Commands::Play(args) => commands::handle_play_command(args, &ctx).await,
        Commands::Guesses(cmd) => commands::handle_guess_command(cmd, &ctx).await,
        Commands::Evaluate { guess, answer } => commands::handle_evaluate_command(&guess, &answer),
    };

    if let Err(e) = result {
        match &e {
            GameError::Validation(msg) => {
                eprintln!("Error: {}", msg);
                eprintln!("Guesses are five letters, A to Z");
            }
            GameError::PreconditionFailed(msg) => {
                eprintln!("Error: {}", msg);
            }
            GameError::Storage(_) => {
                eprintln!("Error: {}", e);
                eprintln!("Check that the data directory is writable");
            }
            _ => {
                eprintln!("Error: {}", e);
            }
        }
        std::process::exit(1);
    }

    Ok(())
}
