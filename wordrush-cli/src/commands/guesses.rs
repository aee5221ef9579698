use super::display::evaluation_table;
use super::Context;
use clap::Subcommand;
use comfy_table::{presets::UTF8_FULL, Table};
use dialoguer::Confirm;
use wordrush_core::{GameError, Result};

#[derive(Subcommand)]
pub enum GuessCommands {
    /// List stored guesses
    List {
        /// Player address
        #[arg(short, long)]
        player: Option<String>,
        /// Only this game
        #[arg(short, long)]
        game: Option<u64>,
    },
    /// Delete stored guesses
    Clear {
        /// Player address
        #[arg(short, long)]
        player: Option<String>,
        /// Only this game
        #[arg(short, long)]
        game: Option<u64>,
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

pub async fn handle_guess_command(cmd: GuessCommands, ctx: &Context) -> Result<()> {
    let guesses = ctx.guess_ledger().await?;

    match cmd {
        GuessCommands::List { player, game } => {
            let player = player.unwrap_or_else(|| ctx.config.player.clone());
            let games = match game {
                Some(id) => vec![id],
                None => guesses.games(&player).await?,
            };

            if games.is_empty() {
                println!("No stored guesses for {}", player);
                return Ok(());
            }

            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec!["Game", "Word index", "Guess", "Submitted", "Evaluated"]);

            let mut evaluated = Vec::new();
            for game_id in games {
                for record in guesses.list(&player, game_id).await? {
                    table.add_row(vec![
                        record.game_id.to_string(),
                        record.word_index.to_string(),
                        record.guess.to_string(),
                        record.submitted_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                        if record.is_evaluated() { "yes" } else { "pending" }.to_string(),
                    ]);
                    if let Some(evaluation) = record.evaluation {
                        evaluated.push((record.guess, evaluation));
                    }
                }
            }
            println!("{}", table);

            for (guess, evaluation) in evaluated {
                println!("{}", evaluation_table(&guess, &evaluation));
            }
        }

        GuessCommands::Clear { player, game, yes } => {
            let player = player.unwrap_or_else(|| ctx.config.player.clone());
            let target = match game {
                Some(id) => format!("game {}", id),
                None => "all games".to_string(),
            };

            if !yes {
                let confirmed = Confirm::new()
                    .with_prompt(format!("Delete stored guesses for {} of {}?", target, player))
                    .default(false)
                    .interact()
                    .map_err(|e| GameError::internal(format!("Dialog error: {}", e)))?;
                if !confirmed {
                    println!("Cancelled");
                    return Ok(());
                }
            }

            match game {
                Some(id) => {
                    guesses.clear(&player, id).await?;
                    println!("✅ Cleared guesses for game {}", id);
                }
                None => {
                    let cleared = guesses.clear_all(&player).await?;
                    println!("✅ Cleared {} game(s)", cleared);
                }
            }
        }
    }

    Ok(())
}
