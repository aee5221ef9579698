mod display;
mod evaluate;
mod guesses;
mod play;

pub use evaluate::handle_evaluate_command;
pub use guesses::{handle_guess_command, GuessCommands};
pub use play::{handle_play_command, PlayArgs};

use crate::config::{CliConfig, DB_FILE};
use std::path::PathBuf;
use std::sync::Arc;
use wordrush_core::{GuessLedger, Result, SqliteStore};

/// Shared state handed to every command.
pub struct Context {
    pub data_dir: PathBuf,
    pub config: CliConfig,
}

impl Context {
    pub async fn guess_ledger(&self) -> Result<Arc<GuessLedger>> {
        let db_path = self.data_dir.join(DB_FILE);
        tracing::debug!("Opening guess store at {}", db_path.display());
        let store = SqliteStore::new(&db_path).await?;
        Ok(Arc::new(GuessLedger::new(Arc::new(store))))
    }
}
