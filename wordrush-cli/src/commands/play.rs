use super::display::print_view;
use super::Context;
use clap::Args;
use comfy_table::{presets::UTF8_FULL, Table};
use dialoguer::{Confirm, Input, Select};
use std::sync::Arc;
use std::time::Duration;
use wordrush_core::types::MICRO_UNITS;
use wordrush_core::{
    GameController, GameError, LedgerGateway, RequestCache, Result, Signer, SimSigner,
    SimulatedContract,
};

#[derive(Args)]
pub struct PlayArgs {
    /// Player address, overrides the config file
    #[arg(short, long)]
    pub player: Option<String>,

    /// Play without a connected wallet (read-only)
    #[arg(long)]
    pub no_wallet: bool,

    /// Simulated confirmation latency in milliseconds
    #[arg(long, default_value = "0")]
    pub latency_ms: u64,

    /// Words loaded into the simulated contract
    #[arg(long, value_delimiter = ',')]
    pub words: Option<Vec<String>>,
}

const ACTIONS: &[&str] = &[
    "Start game",
    "Guess",
    "Refresh",
    "Forfeit",
    "Stats",
    "Fund bounty",
    "Claim bounty",
    "Quit",
];

fn dialog_error(e: dialoguer::Error) -> GameError {
    GameError::internal(format!("Dialog error: {}", e))
}

pub async fn handle_play_command(args: PlayArgs, ctx: &Context) -> Result<()> {
    let client = &ctx.config.client;
    let player = args.player.unwrap_or_else(|| ctx.config.player.clone());
    let words = args.words.unwrap_or_else(|| ctx.config.words.clone());

    let contract = SimulatedContract::new(words)
        .with_confirmation_latency(Duration::from_millis(args.latency_ms));
    let signer: Option<Arc<dyn Signer>> = if args.no_wallet {
        None
    } else {
        Some(Arc::new(SimSigner::new(player.clone(), contract.clone())))
    };

    let gateway = Arc::new(LedgerGateway::new(
        Arc::new(contract),
        RequestCache::new(client.cache.clone()),
        client.contract_id(),
    ));
    let controller = Arc::new(GameController::new(
        player.clone(),
        gateway,
        ctx.guess_ledger().await?,
        signer,
        client.sync.clone(),
    ));

    println!("🎮 WordRush on {} as {}", client.network, player);
    if let Err(e) = controller.load().await {
        println!("⚠️  {}", e.user_message());
    }
    let _refresh = controller.spawn_refresh();

    loop {
        print_view(&controller.view());

        let choice = Select::new()
            .with_prompt("Action")
            .items(ACTIONS)
            .default(if controller.view().is_active() { 1 } else { 0 })
            .interact()
            .map_err(dialog_error)?;

        let outcome = match ACTIONS[choice] {
            "Start game" => controller.start_game().await,
            "Guess" => {
                let guess: String = Input::new()
                    .with_prompt("Guess")
                    .interact_text()
                    .map_err(dialog_error)?;
                controller.submit_guess(&guess).await
            }
            "Refresh" => controller.refresh().await,
            "Forfeit" => {
                let confirmed = Confirm::new()
                    .with_prompt("Forfeit the current game?")
                    .default(false)
                    .interact()
                    .map_err(dialog_error)?;
                if confirmed {
                    controller.forfeit().await
                } else {
                    Ok(())
                }
            }
            "Stats" => show_stats(&controller).await,
            "Fund bounty" => fund_bounty(&controller).await,
            "Claim bounty" => claim_bounty(&controller).await,
            _ => break,
        };

        if let Err(e) = outcome {
            println!("❌ {}", e.user_message());
        }
    }

    Ok(())
}

async fn show_stats(controller: &GameController) -> Result<()> {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Played", "Won", "Win rate", "Streak", "Best", "Avg attempts"]);

    match controller.player_stats().await? {
        Some(stats) => {
            table.add_row(vec![
                stats.total_games.to_string(),
                stats.games_won.to_string(),
                format!("{:.0}%", stats.win_rate() * 100.0),
                stats.current_streak.to_string(),
                stats.max_streak.to_string(),
                stats.average_attempts.to_string(),
            ]);
            println!("{}", table);
        }
        None => println!("No games played yet"),
    }

    let cache = controller.gateway().cache_stats().await;
    println!(
        "Cache: {} entries, {} in flight, {}/{} requests in window",
        cache.entries,
        cache.pending_requests,
        cache.requests_in_window,
        cache.max_requests_per_window
    );
    Ok(())
}

fn prompt_word_index(controller: &GameController) -> Result<u64> {
    let default = controller
        .view()
        .session
        .map(|s| s.word_index)
        .unwrap_or_default();
    Input::new()
        .with_prompt("Word index")
        .default(default)
        .interact_text()
        .map_err(dialog_error)
}

async fn fund_bounty(controller: &GameController) -> Result<()> {
    let word_index = prompt_word_index(controller)?;
    let amount: f64 = Input::new()
        .with_prompt("Amount")
        .interact_text()
        .map_err(dialog_error)?;
    let micro = (amount * MICRO_UNITS as f64).round() as u64;

    let txid = controller.fund_bounty(word_index, micro).await?;
    println!("✅ Bounty funded ({})", txid);
    Ok(())
}

async fn claim_bounty(controller: &GameController) -> Result<()> {
    let word_index = prompt_word_index(controller)?;
    let txid = controller.claim_bounty(word_index).await?;
    println!("✅ Bounty claimed ({})", txid);
    Ok(())
}
