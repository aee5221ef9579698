//! Game synchronization controller.
//!
//! Keeps one [`GameView`] consistent with the ledger. Every action runs under
//! a single operation lock, so a background refresh never interleaves with
//! a submission and its confirmation re-reads.

pub mod refresh;
pub mod view;

pub use crate::config::{ConfirmationPolicy, SyncConfig};
pub use refresh::RefreshHandle;
pub use view::{
    BountySummary, GameSession, GameStatus, GameView, Row, SyncPhase, Tile, TileState,
};

use crate::error::{GameError, Result};
use crate::evaluator::{evaluate, Word};
use crate::gateway::LedgerGateway;
use crate::ledger::{Signer, TxId};
use crate::storage::{GuessLedger, GuessRecord};
use crate::types::{GameRecord, PlayerStats};
use chrono::Utc;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct GameController {
    player: String,
    gateway: Arc<LedgerGateway>,
    guesses: Arc<GuessLedger>,
    signer: Option<Arc<dyn Signer>>,
    config: SyncConfig,
    view: RwLock<GameView>,
    op_lock: Mutex<()>,
}

impl GameController {
    pub fn new(
        player: impl Into<String>,
        gateway: Arc<LedgerGateway>,
        guesses: Arc<GuessLedger>,
        signer: Option<Arc<dyn Signer>>,
        config: SyncConfig,
    ) -> Self {
        Self {
            player: player.into(),
            gateway,
            guesses,
            signer,
            config,
            view: RwLock::new(GameView::default()),
            op_lock: Mutex::new(()),
        }
    }

    pub fn player(&self) -> &str {
        &self.player
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn gateway(&self) -> &LedgerGateway {
        &self.gateway
    }

    pub fn view(&self) -> GameView {
        self.view.read().clone()
    }

    fn signer(&self) -> Option<&dyn Signer> {
        self.signer.as_deref()
    }

    fn set_phase(&self, phase: SyncPhase) {
        let mut view = self.view.write();
        if view.phase != phase {
            tracing::debug!("Phase {} -> {}", view.phase, phase);
            view.phase = phase;
        }
    }

    /// Record the outcome of a public action on the view.
    fn finish<T>(&self, result: Result<T>) -> Result<T> {
        let mut view = self.view.write();
        match &result {
            Ok(_) => view.error = None,
            Err(e) => {
                view.error = Some(e.user_message());
                if view.session.is_none() && view.phase == SyncPhase::Loading {
                    view.phase = SyncPhase::Error;
                }
            }
        }
        result
    }

    /// Load the player's game from the ledger.
    pub async fn load(&self) -> Result<()> {
        let _op = self.op_lock.lock().await;
        if self.view.read().session.is_none() {
            self.set_phase(SyncPhase::Loading);
        }
        let result = self.sync().await;
        self.finish(result)
    }

    /// Re-read the ledger without entering the loading phase. On failure the
    /// last known state stays visible.
    pub async fn refresh(&self) -> Result<()> {
        let _op = self.op_lock.lock().await;
        let result = self.sync().await;
        self.finish(result)
    }

    pub async fn start_game(&self) -> Result<()> {
        let _op = self.op_lock.lock().await;
        let result = self.start_game_inner().await;
        self.finish(result)
    }

    async fn start_game_inner(&self) -> Result<()> {
        let before = self.view();
        if before.is_active() {
            return Err(GameError::invalid_state("A game is already in progress"));
        }
        let previous = before.session.as_ref().map(|s| s.game_id);

        self.set_phase(SyncPhase::StartingGame);
        if let Err(e) = self.gateway.start_game(self.signer()).await {
            self.rollback(before).await;
            return Err(e);
        }

        self.set_phase(SyncPhase::ConfirmPending);
        self.confirm("start-game", |view| {
            view.session
                .as_ref()
                .is_some_and(|s| Some(s.game_id) != previous)
        })
        .await;
        Ok(())
    }

    /// Submit a guess with an optimistic grid update.
    pub async fn submit_guess(&self, guess: &str) -> Result<()> {
        let _op = self.op_lock.lock().await;
        let result = self.submit_guess_inner(guess).await;
        self.finish(result)
    }

    async fn submit_guess_inner(&self, guess: &str) -> Result<()> {
        let word = Word::parse(guess)?;

        let (game_id, word_index, before, snapshot) = {
            let mut view = self.view.write();
            let snapshot = view.clone();
            let session = match view.session.as_mut() {
                Some(session) if session.status == GameStatus::Active => session,
                _ => return Err(GameError::invalid_state("No active game")),
            };
            if session.apply_optimistic(&word).is_none() {
                return Err(GameError::invalid_state("No attempts remaining"));
            }
            let ids = (
                session.game_id,
                session.word_index,
                session.attempts_used,
                snapshot,
            );
            view.phase = SyncPhase::SubmittingGuess;
            ids
        };

        tracing::info!("Submitting guess {} for game {}", word, game_id);
        if let Err(e) = self.gateway.submit_guess(self.signer(), &word).await {
            self.rollback(snapshot).await;
            return Err(e);
        }

        if let Err(e) = self
            .guesses
            .record(&self.player, game_id, word_index, &word)
            .await
        {
            tracing::warn!("[Storage] Could not record guess {}: {}", word, e);
        }

        self.set_phase(SyncPhase::ConfirmPending);
        self.confirm("submit-guess", |view| {
            view.phase == SyncPhase::NoGame
                || view
                    .session
                    .as_ref()
                    .is_some_and(|s| s.game_id == game_id && s.attempts_used > before)
        })
        .await;
        Ok(())
    }

    /// Forfeit the active game. Local state is dropped as soon as the ledger
    /// accepts the call.
    pub async fn forfeit(&self) -> Result<()> {
        let _op = self.op_lock.lock().await;
        let result = self.forfeit_inner().await;
        self.finish(result)
    }

    async fn forfeit_inner(&self) -> Result<()> {
        let before = self.view();
        let game_id = match before.session.as_ref() {
            Some(session) if session.status == GameStatus::Active => session.game_id,
            _ => return Err(GameError::invalid_state("No active game")),
        };

        self.set_phase(SyncPhase::Forfeiting);
        if let Err(e) = self.gateway.forfeit_game(self.signer()).await {
            self.rollback(before).await;
            return Err(e);
        }

        self.clear_local(game_id).await;
        let mut view = self.view.write();
        view.session = None;
        view.phase = SyncPhase::NoGame;
        view.last_synced = Some(Utc::now());
        tracing::info!("Forfeited game {}", game_id);
        Ok(())
    }

    pub async fn fund_bounty(&self, word_index: u64, amount: u64) -> Result<TxId> {
        let _op = self.op_lock.lock().await;
        let result = self
            .write_then_reload(self.gateway.fund_bounty(self.signer(), word_index, amount))
            .await;
        self.finish(result)
    }

    pub async fn claim_bounty(&self, word_index: u64) -> Result<TxId> {
        let _op = self.op_lock.lock().await;
        let result = self
            .write_then_reload(self.gateway.claim_bounty(self.signer(), word_index))
            .await;
        self.finish(result)
    }

    async fn write_then_reload(
        &self,
        write: impl std::future::Future<Output = Result<TxId>>,
    ) -> Result<TxId> {
        let txid = write.await?;
        tokio::time::sleep(self.config.confirmation.initial_delay).await;
        if let Err(e) = self.sync().await {
            tracing::warn!("Reload after {} failed: {}", txid, e);
        }
        Ok(txid)
    }

    pub async fn player_stats(&self) -> Result<Option<PlayerStats>> {
        self.gateway.player_stats(&self.player).await
    }

    /// Re-derive the view from the ledger after a failed write. If the ledger
    /// cannot be read either, restore the view as it was before the write.
    async fn rollback(&self, before: GameView) {
        if let Err(e) = self.sync().await {
            tracing::warn!("Rollback reload failed, restoring last known state: {}", e);
            let mut view = self.view.write();
            view.session = before.session;
            view.phase = before.phase;
        }
    }

    /// Wait for an accepted write to show up in authoritative reads.
    ///
    /// Re-reads once after the initial delay, then with exponential backoff,
    /// invalidating the player's cached reads before each re-check. Returns
    /// whether the write was observed.
    async fn confirm(&self, operation: &str, landed: impl Fn(&GameView) -> bool) -> bool {
        let policy = &self.config.confirmation;
        tokio::time::sleep(policy.initial_delay).await;

        for attempt in 0..=policy.max_rechecks {
            if attempt > 0 {
                self.gateway.invalidate_address(&self.player);
                tokio::time::sleep(policy.backoff(attempt - 1)).await;
            }

            match self.sync().await {
                Ok(()) if landed(&self.view.read()) => {
                    tracing::info!("{} confirmed after {} re-check(s)", operation, attempt);
                    return true;
                }
                Ok(()) => tracing::debug!("{} not visible yet (check {})", operation, attempt + 1),
                Err(e) => tracing::warn!("Confirmation read for {} failed: {}", operation, e),
            }
        }

        tracing::warn!(
            "{} not confirmed after {} re-checks; keeping local pending state",
            operation,
            policy.max_rechecks
        );
        false
    }

    /// Read the ledger and rebuild the view.
    async fn sync(&self) -> Result<()> {
        let session = if self.gateway.has_active_game(&self.player).await? {
            match self.gateway.active_game(&self.player).await? {
                Some(record) => Some(self.build_session(record).await),
                None => self.finalize_inactive().await?,
            }
        } else {
            self.finalize_inactive().await?
        };

        let keep: Vec<u64> = session.iter().map(|s| s.game_id).collect();
        self.prune_local(&keep).await;

        let mut view = self.view.write();
        view.phase = match &session {
            Some(session) => session.status.phase(),
            None => SyncPhase::NoGame,
        };
        if let Some(session) = &session {
            tracing::info!(
                "Game {}: {:?}, {}/{} attempts",
                session.game_id,
                session.status,
                session.attempts_used,
                session.max_attempts
            );
        }
        view.session = session;
        view.last_synced = Some(Utc::now());
        Ok(())
    }

    /// No active game on the ledger. If the game on screen (or the newest one
    /// with local records) has just ended, finish it from the history read.
    async fn finalize_inactive(&self) -> Result<Option<GameSession>> {
        let current = self.view.read().session.clone();

        let candidate = match &current {
            Some(s) if s.status == GameStatus::Active || s.answer.is_none() => Some(s.game_id),
            Some(_) => return Ok(current),
            None => self.local_games().await.last().copied(),
        };
        let Some(game_id) = candidate else {
            return Ok(None);
        };

        match self.gateway.game_history(&self.player, game_id).await? {
            Some(record) if GameStatus::from_record(&record, self.config.max_attempts).is_complete() => {
                Ok(Some(self.build_session(record).await))
            }
            _ => {
                tracing::info!("Game {} is no longer active", game_id);
                self.clear_local(game_id).await;
                Ok(None)
            }
        }
    }

    async fn build_session(&self, record: GameRecord) -> GameSession {
        let max_attempts = self.config.max_attempts;
        let status = GameStatus::from_record(&record, max_attempts);
        let local = self.local_records(record.game_id).await;

        let answer = if status.is_complete() {
            self.reveal_answer(record.word_index).await
        } else {
            None
        };

        let grid = view::merge_rows(&record, &local, status, answer.as_ref(), max_attempts);

        if let Some(answer) = &answer {
            self.settle_local(&record, &local, answer).await;
        }

        GameSession {
            game_id: record.game_id,
            word_index: record.word_index,
            attempts_used: record.attempts,
            max_attempts,
            grid,
            status,
            bounty: self.bounty_summary(record.word_index).await,
            answer,
        }
    }

    async fn reveal_answer(&self, word_index: u64) -> Option<Word> {
        match self.gateway.word_at_index(word_index).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!("Answer for word {} unavailable: {}", word_index, e);
                None
            }
        }
    }

    async fn bounty_summary(&self, word_index: u64) -> Option<BountySummary> {
        match self.gateway.bounty(word_index).await {
            Ok(bounty) => bounty.map(|b| BountySummary {
                active: b.is_active,
                remaining_amount: b.remaining_amount(),
            }),
            Err(e) => {
                tracing::warn!("Bounty read for word {} failed: {}", word_index, e);
                None
            }
        }
    }

    /// Attach final evaluations to local records, then drop the game's entry.
    async fn settle_local(&self, record: &GameRecord, local: &[GuessRecord], answer: &Word) {
        for entry in local.iter().filter(|r| !r.is_evaluated()) {
            let evaluation = evaluate(&entry.guess, answer);
            if let Err(e) = self
                .guesses
                .record_evaluation(&self.player, record.game_id, &entry.guess, evaluation)
                .await
            {
                tracing::warn!("[Storage] Could not store evaluation: {}", e);
            }
        }
        self.clear_local(record.game_id).await;
    }

    async fn local_records(&self, game_id: u64) -> Vec<GuessRecord> {
        self.guesses
            .list(&self.player, game_id)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("[Storage] Ignoring local guesses for game {}: {}", game_id, e);
                Vec::new()
            })
    }

    async fn local_games(&self) -> Vec<u64> {
        self.guesses.games(&self.player).await.unwrap_or_else(|e| {
            tracing::warn!("[Storage] Could not list local games: {}", e);
            Vec::new()
        })
    }

    async fn clear_local(&self, game_id: u64) {
        if let Err(e) = self.guesses.clear(&self.player, game_id).await {
            tracing::warn!("[Storage] Could not clear game {}: {}", game_id, e);
        }
    }

    /// Drop local entries for games that are neither active nor on screen.
    async fn prune_local(&self, keep: &[u64]) {
        for game_id in self.local_games().await {
            if !keep.contains(&game_id) {
                self.clear_local(game_id).await;
            }
        }
    }
}
