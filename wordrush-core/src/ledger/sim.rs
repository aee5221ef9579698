//! In-process contract simulation.
//!
//! Mirrors the word game contract closely enough to drive the client end to
//! end: one active game per player, six attempts, per-word bounties and
//! player statistics. Writes are validated when broadcast and applied after a
//! configurable confirmation latency, so readers observe the same
//! "accepted but not yet visible" window a real chain has.

use super::codes::*;
use super::functions::*;
use super::{ContractArg, Ledger, LedgerError, Signer, SignerError, TxId};
use crate::types::{BountyInfo, GameRecord, PlayerStats};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const MAX_ATTEMPTS: u32 = 6;
pub const WORD_LENGTH: usize = 5;

#[derive(Default, Clone)]
struct ContractState {
    words: Vec<String>,
    last_game_id: u64,
    height: u64,
    active: HashMap<String, GameRecord>,
    history: HashMap<(String, u64), GameRecord>,
    bounties: HashMap<u64, BountyInfo>,
    claims: HashSet<(u64, String)>,
    stats: HashMap<String, PlayerStats>,
}

impl ContractState {
    /// Run one mutation. Returns the contract error code on rejection.
    fn execute(
        &mut self,
        sender: &str,
        function: &str,
        args: &[ContractArg],
    ) -> std::result::Result<(), u32> {
        self.height += 1;

        match function {
            START_GAME => {
                if self.active.contains_key(sender) {
                    return Err(ERR_GAME_IN_PROGRESS);
                }
                if self.words.is_empty() {
                    return Err(ERR_NO_WORDS);
                }

                self.last_game_id += 1;
                let game = GameRecord {
                    game_id: self.last_game_id,
                    word_index: (self.last_game_id - 1) % self.words.len() as u64,
                    attempts: 0,
                    won: false,
                    guesses: Vec::new(),
                };
                self.history
                    .insert((sender.to_string(), game.game_id), game.clone());
                self.active.insert(sender.to_string(), game);
                Ok(())
            }
            SUBMIT_GUESS => {
                let guess = string_arg(args, 0).ok_or(ERR_INVALID_WORD_LENGTH)?;
                let mut game = self
                    .active
                    .get(sender)
                    .cloned()
                    .ok_or(ERR_GAME_NOT_FOUND)?;
                if guess.len() != WORD_LENGTH {
                    return Err(ERR_INVALID_WORD_LENGTH);
                }

                let answer = self
                    .words
                    .get(game.word_index as usize)
                    .ok_or(ERR_INVALID_WORD_INDEX)?;
                game.won = guess.eq_ignore_ascii_case(answer);
                game.attempts += 1;
                game.guesses.push(guess.to_ascii_uppercase());

                self.history
                    .insert((sender.to_string(), game.game_id), game.clone());
                if game.won || game.attempts >= MAX_ATTEMPTS {
                    self.active.remove(sender);
                    self.stats
                        .entry(sender.to_string())
                        .or_default()
                        .record_game(game.won, game.attempts);
                } else {
                    self.active.insert(sender.to_string(), game);
                }
                Ok(())
            }
            FORFEIT_GAME => {
                let game = self.active.remove(sender).ok_or(ERR_GAME_NOT_FOUND)?;
                self.stats
                    .entry(sender.to_string())
                    .or_default()
                    .record_game(false, game.attempts);
                Ok(())
            }
            FUND_BOUNTY => {
                let word_index = uint_arg(args, 0).ok_or(ERR_INVALID_WORD_INDEX)?;
                let amount = uint_arg(args, 1).unwrap_or(0);
                if amount == 0 {
                    return Err(ERR_INVALID_AMOUNT);
                }
                if word_index as usize >= self.words.len() {
                    return Err(ERR_INVALID_WORD_INDEX);
                }

                let height = self.height;
                let bounty = self.bounties.entry(word_index).or_insert_with(|| BountyInfo {
                    total_bounty: 0,
                    remaining_bounty: 0,
                    is_active: true,
                    created_by: sender.to_string(),
                    created_at: height,
                    winner_count: 0,
                });
                bounty.total_bounty += amount;
                bounty.remaining_bounty += amount;
                bounty.is_active = true;
                Ok(())
            }
            CLAIM_BOUNTY => {
                let word_index = uint_arg(args, 0).ok_or(ERR_INVALID_WORD_INDEX)?;
                let solved = self
                    .history
                    .iter()
                    .any(|((player, _), game)| {
                        player == sender && game.won && game.word_index == word_index
                    });

                let bounty = self
                    .bounties
                    .get_mut(&word_index)
                    .ok_or(ERR_BOUNTY_NOT_FOUND)?;
                if !bounty.is_active || self.claims.contains(&(word_index, sender.to_string())) {
                    return Err(ERR_BOUNTY_CLAIMED);
                }
                if !solved {
                    return Err(ERR_GAME_NOT_FOUND);
                }

                bounty.remaining_bounty = 0;
                bounty.winner_count += 1;
                bounty.is_active = false;
                self.claims.insert((word_index, sender.to_string()));
                Ok(())
            }
            _ => Err(ERR_GAME_NOT_FOUND),
        }
    }

    fn read(&self, function: &str, args: &[ContractArg]) -> Result<serde_json::Value, LedgerError> {
        match function {
            HAS_ACTIVE_GAME => {
                let player = principal_arg(function, args, 0)?;
                Ok(serde_json::Value::Bool(self.active.contains_key(player)))
            }
            GET_ACTIVE_GAME => {
                let player = principal_arg(function, args, 0)?;
                to_json(&self.active.get(player))
            }
            GET_GAME_HISTORY => {
                let player = principal_arg(function, args, 0)?;
                let game_id = uint_arg(args, 1)
                    .ok_or_else(|| LedgerError::decode(format!("{}: missing game id", function)))?;
                to_json(&self.history.get(&(player.to_string(), game_id)))
            }
            GET_WORD_AT_INDEX => {
                let index = uint_arg(args, 0)
                    .ok_or_else(|| LedgerError::decode(format!("{}: missing index", function)))?;
                to_json(&self.words.get(index as usize))
            }
            GET_BOUNTY => {
                let index = uint_arg(args, 0)
                    .ok_or_else(|| LedgerError::decode(format!("{}: missing index", function)))?;
                to_json(&self.bounties.get(&index))
            }
            GET_PLAYER_STATS => {
                let player = principal_arg(function, args, 0)?;
                to_json(&self.stats.get(player))
            }
            GET_TOTAL_WORDS => to_json(&(self.words.len() as u64)),
            other => Err(LedgerError::decode(format!("Unknown read-only function: {}", other))),
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<serde_json::Value, LedgerError> {
    serde_json::to_value(value).map_err(|e| LedgerError::decode(e.to_string()))
}

fn uint_arg(args: &[ContractArg], index: usize) -> Option<u64> {
    args.get(index).and_then(ContractArg::as_uint)
}

fn string_arg(args: &[ContractArg], index: usize) -> Option<&str> {
    args.get(index).and_then(ContractArg::as_str)
}

fn principal_arg<'a>(
    function: &str,
    args: &'a [ContractArg],
    index: usize,
) -> Result<&'a str, LedgerError> {
    string_arg(args, index)
        .ok_or_else(|| LedgerError::decode(format!("{}: missing principal", function)))
}

struct SimInner {
    state: Mutex<ContractState>,
    confirmation_latency: Mutex<Duration>,
    read_failures: Mutex<VecDeque<(Option<String>, LedgerError)>>,
    broadcast_rejections: Mutex<VecDeque<String>>,
    reads: Mutex<HashMap<String, usize>>,
    nonce: AtomicU64,
}

/// Simulated contract. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SimulatedContract {
    inner: Arc<SimInner>,
}

impl SimulatedContract {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let words = words
            .into_iter()
            .map(|w| w.into().to_ascii_lowercase())
            .collect();

        Self {
            inner: Arc::new(SimInner {
                state: Mutex::new(ContractState {
                    words,
                    ..Default::default()
                }),
                confirmation_latency: Mutex::new(Duration::ZERO),
                read_failures: Mutex::new(VecDeque::new()),
                broadcast_rejections: Mutex::new(VecDeque::new()),
                reads: Mutex::new(HashMap::new()),
                nonce: AtomicU64::new(0),
            }),
        }
    }

    /// Delay between a broadcast being accepted and its effect becoming
    /// visible to reads.
    pub fn with_confirmation_latency(self, latency: Duration) -> Self {
        *self.inner.confirmation_latency.lock() = latency;
        self
    }

    pub fn set_confirmation_latency(&self, latency: Duration) {
        *self.inner.confirmation_latency.lock() = latency;
    }

    pub fn word_count(&self) -> usize {
        self.inner.state.lock().words.len()
    }

    /// Fail the next `count` reads with `error`.
    pub fn fail_next_reads(&self, error: LedgerError, count: usize) {
        let mut failures = self.inner.read_failures.lock();
        for _ in 0..count {
            failures.push_back((None, error.clone()));
        }
    }

    /// Fail the next `count` reads of `function` with `error`.
    pub fn fail_next_reads_of(&self, function: &str, error: LedgerError, count: usize) {
        let mut failures = self.inner.read_failures.lock();
        for _ in 0..count {
            failures.push_back((Some(function.to_string()), error.clone()));
        }
    }

    /// Reject the next broadcast with `reason`.
    pub fn reject_next_broadcast(&self, reason: impl Into<String>) {
        self.inner.broadcast_rejections.lock().push_back(reason.into());
    }

    /// Physical reads served so far, across all functions.
    pub fn read_count(&self) -> usize {
        self.inner.reads.lock().values().sum()
    }

    pub fn read_count_of(&self, function: &str) -> usize {
        self.inner.reads.lock().get(function).copied().unwrap_or(0)
    }

    /// Validate a call against the current state and schedule it. Returns the
    /// transaction id once accepted.
    pub fn broadcast(
        &self,
        sender: &str,
        function: &str,
        args: &[ContractArg],
    ) -> std::result::Result<TxId, SignerError> {
        if let Some(reason) = self.inner.broadcast_rejections.lock().pop_front() {
            return Err(SignerError::BroadcastRejected(reason));
        }

        {
            // Dry run against a scratch copy so rejections surface at broadcast.
            let mut scratch = self.inner.state.lock().clone();
            scratch.execute(sender, function, args).map_err(|code| {
                SignerError::BroadcastRejected(format!("{} failed with (err u{})", function, code))
            })?;
        }

        let txid = self.txid(sender, function, args);
        let latency = *self.inner.confirmation_latency.lock();

        if latency.is_zero() {
            self.apply(sender, function, args, &txid);
        } else {
            let contract = self.clone();
            let sender = sender.to_string();
            let function = function.to_string();
            let args = args.to_vec();
            let scheduled = txid.clone();
            tokio::spawn(async move {
                tokio::time::sleep(latency).await;
                contract.apply(&sender, &function, &args, &scheduled);
            });
        }

        Ok(txid)
    }

    fn apply(&self, sender: &str, function: &str, args: &[ContractArg], txid: &TxId) {
        let mut state = self.inner.state.lock();
        match state.execute(sender, function, args) {
            Ok(()) => tracing::debug!("[Sim] {} confirmed {} for {}", txid, function, sender),
            Err(code) => tracing::warn!(
                "[Sim] {} aborted at confirmation: {} (err u{})",
                txid,
                function,
                code
            ),
        }
    }

    fn txid(&self, sender: &str, function: &str, args: &[ContractArg]) -> TxId {
        let nonce = self.inner.nonce.fetch_add(1, Ordering::Relaxed);
        let mut hasher = Sha256::new();
        hasher.update(sender.as_bytes());
        hasher.update(function.as_bytes());
        hasher.update(serde_json::to_vec(args).unwrap_or_default());
        hasher.update(nonce.to_be_bytes());
        TxId(hex::encode(hasher.finalize()))
    }
}

#[async_trait]
impl Ledger for SimulatedContract {
    async fn read_only(
        &self,
        function: &str,
        args: &[ContractArg],
        _sender: &str,
    ) -> Result<serde_json::Value, LedgerError> {
        *self
            .inner
            .reads
            .lock()
            .entry(function.to_string())
            .or_insert(0) += 1;

        {
            let mut failures = self.inner.read_failures.lock();
            let matching = failures
                .iter()
                .position(|(target, _)| target.as_deref().map_or(true, |f| f == function));
            if let Some((_, err)) = matching.and_then(|i| failures.remove(i)) {
                return Err(err);
            }
        }

        self.inner.state.lock().read(function, args)
    }
}

/// Signer bound to one address on a [`SimulatedContract`].
pub struct SimSigner {
    address: String,
    contract: SimulatedContract,
    connected: bool,
}

impl SimSigner {
    pub fn new(address: impl Into<String>, contract: SimulatedContract) -> Self {
        Self {
            address: address.into(),
            contract,
            connected: true,
        }
    }

    /// A signer whose wallet is not connected; every broadcast fails with
    /// [`SignerError::NoWallet`].
    pub fn disconnected(address: impl Into<String>, contract: SimulatedContract) -> Self {
        Self {
            connected: false,
            ..Self::new(address, contract)
        }
    }
}

#[async_trait]
impl Signer for SimSigner {
    fn address(&self) -> &str {
        &self.address
    }

    async fn sign_and_broadcast(
        &self,
        function: &str,
        args: &[ContractArg],
    ) -> std::result::Result<TxId, SignerError> {
        if !self.connected {
            return Err(SignerError::NoWallet);
        }
        self.contract.broadcast(&self.address, function, args)
    }
}
