//! Typed access to the word game contract.
//!
//! Reads go through the shared [`RequestCache`]; writes go through a
//! [`Signer`] and purge every cached read for the acting address.

use crate::cache::{CacheStats, RequestCache};
use crate::error::{GameError, Result};
use crate::evaluator::Word;
use crate::ledger::functions::*;
use crate::ledger::{ContractArg, Ledger, Signer, SignerError, TxId};
use crate::types::{BountyInfo, GameRecord, PlayerStats};
use serde::de::DeserializeOwned;
use std::sync::Arc;

pub struct LedgerGateway {
    ledger: Arc<dyn Ledger>,
    cache: RequestCache<serde_json::Value>,
    /// Sender used for reads made without a caller.
    default_sender: String,
}

impl LedgerGateway {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        cache: RequestCache<serde_json::Value>,
        default_sender: impl Into<String>,
    ) -> Self {
        Self {
            ledger,
            cache,
            default_sender: default_sender.into(),
        }
    }

    pub fn cache(&self) -> &RequestCache<serde_json::Value> {
        &self.cache
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Deterministic cache key for one read.
    pub fn cache_key(function: &str, args: &[ContractArg], caller: Option<&str>) -> Result<String> {
        let args = serde_json::to_string(args)?;
        Ok(format!("{}:{}:{}", function, args, caller.unwrap_or("")))
    }

    /// Read-only call through the cache.
    pub async fn call(
        &self,
        function: &str,
        args: &[ContractArg],
        caller: Option<&str>,
    ) -> Result<serde_json::Value> {
        let key = Self::cache_key(function, args, caller)?;
        let ttl = self.cache.ttl_for(function);

        let ledger = Arc::clone(&self.ledger);
        let function_name = function.to_string();
        let call_args = args.to_vec();
        let sender = caller.unwrap_or(self.default_sender.as_str()).to_string();

        let value = self
            .cache
            .get_cached(
                &key,
                move || async move { ledger.read_only(&function_name, &call_args, &sender).await },
                ttl,
            )
            .await?;
        Ok(value)
    }

    async fn call_as<T: DeserializeOwned>(
        &self,
        function: &str,
        args: &[ContractArg],
        caller: Option<&str>,
    ) -> Result<T> {
        let value = self.call(function, args, caller).await?;
        serde_json::from_value(value)
            .map_err(|e| GameError::Decode(format!("{}: {}", function, e)))
    }

    /// Submit a state-changing call. Requires a signer; on success every
    /// cached read for the signer's address is invalidated.
    pub async fn submit(
        &self,
        function: &str,
        args: &[ContractArg],
        signer: Option<&dyn Signer>,
    ) -> Result<TxId> {
        let signer =
            signer.ok_or_else(|| GameError::precondition("Wallet not connected"))?;

        tracing::info!("Submitting {} for {}", function, signer.address());

        let txid = signer
            .sign_and_broadcast(function, args)
            .await
            .map_err(|e| match e {
                SignerError::NoWallet => GameError::precondition("Wallet not connected"),
                SignerError::BroadcastRejected(reason) => GameError::BroadcastRejected(reason),
            })
            .inspect_err(|e| tracing::error!("{} failed: {}", function, e))?;

        tracing::info!("{} broadcast: {}", function, txid);
        self.invalidate_address(signer.address());
        Ok(txid)
    }

    pub fn invalidate_call(
        &self,
        function: &str,
        args: &[ContractArg],
        caller: Option<&str>,
    ) -> Result<()> {
        let key = Self::cache_key(function, args, caller)?;
        self.cache.invalidate(&key);
        Ok(())
    }

    pub fn invalidate_address(&self, address: &str) -> usize {
        self.cache.invalidate_pattern(address)
    }

    // Reads

    pub async fn has_active_game(&self, player: &str) -> Result<bool> {
        self.call_as(HAS_ACTIVE_GAME, &[ContractArg::principal(player)], Some(player))
            .await
    }

    pub async fn active_game(&self, player: &str) -> Result<Option<GameRecord>> {
        self.call_as(GET_ACTIVE_GAME, &[ContractArg::principal(player)], Some(player))
            .await
    }

    pub async fn game_history(&self, player: &str, game_id: u64) -> Result<Option<GameRecord>> {
        self.call_as(
            GET_GAME_HISTORY,
            &[ContractArg::principal(player), ContractArg::uint(game_id)],
            Some(player),
        )
        .await
    }

    /// The answer for a word index. Only revealed once the game using it is over.
    pub async fn word_at_index(&self, word_index: u64) -> Result<Option<Word>> {
        let word: Option<String> = self
            .call_as(GET_WORD_AT_INDEX, &[ContractArg::uint(word_index)], None)
            .await?;
        word.map(|w| {
            Word::parse(&w).map_err(|_| GameError::Decode(format!("Malformed answer word: {}", w)))
        })
        .transpose()
    }

    pub async fn bounty(&self, word_index: u64) -> Result<Option<BountyInfo>> {
        self.call_as(GET_BOUNTY, &[ContractArg::uint(word_index)], None)
            .await
    }

    pub async fn player_stats(&self, player: &str) -> Result<Option<PlayerStats>> {
        self.call_as(GET_PLAYER_STATS, &[ContractArg::principal(player)], Some(player))
            .await
    }

    pub async fn total_words(&self) -> Result<u64> {
        self.call_as(GET_TOTAL_WORDS, &[], None).await
    }

    // Writes

    pub async fn start_game(&self, signer: Option<&dyn Signer>) -> Result<TxId> {
        self.submit(START_GAME, &[], signer).await
    }

    pub async fn submit_guess(&self, signer: Option<&dyn Signer>, guess: &Word) -> Result<TxId> {
        self.submit(SUBMIT_GUESS, &[ContractArg::ascii(guess.as_str())], signer)
            .await
    }

    pub async fn forfeit_game(&self, signer: Option<&dyn Signer>) -> Result<TxId> {
        self.submit(FORFEIT_GAME, &[], signer).await
    }

    pub async fn fund_bounty(
        &self,
        signer: Option<&dyn Signer>,
        word_index: u64,
        amount: u64,
    ) -> Result<TxId> {
        if amount == 0 {
            return Err(GameError::validation("Bounty amount must be greater than 0"));
        }
        self.submit(
            FUND_BOUNTY,
            &[ContractArg::uint(word_index), ContractArg::uint(amount)],
            signer,
        )
        .await
    }

    pub async fn claim_bounty(&self, signer: Option<&dyn Signer>, word_index: u64) -> Result<TxId> {
        self.submit(CLAIM_BOUNTY, &[ContractArg::uint(word_index)], signer)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use crate::ledger::{LedgerError, SimSigner, SimulatedContract};
    use std::time::Duration;

    const PLAYER: &str = "ST1PLAYER";

    fn gateway(contract: &SimulatedContract) -> LedgerGateway {
        let config = CacheConfig::new().with_min_interval(Duration::ZERO);
        LedgerGateway::new(
            Arc::new(contract.clone()),
            RequestCache::new(config),
            "ST000CONTRACT",
        )
    }

    #[test]
    fn test_cache_key_is_deterministic() {
        let args = [ContractArg::principal(PLAYER)];
        let a = LedgerGateway::cache_key(HAS_ACTIVE_GAME, &args, Some(PLAYER)).unwrap();
        let b = LedgerGateway::cache_key(HAS_ACTIVE_GAME, &args, Some(PLAYER)).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            a,
            r#"has-active-game:[{"type":"principal","value":"ST1PLAYER"}]:ST1PLAYER"#
        );
        assert_eq!(
            LedgerGateway::cache_key(GET_TOTAL_WORDS, &[], None).unwrap(),
            "get-total-words:[]:"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reads_are_cached() {
        let contract = SimulatedContract::new(["apple", "crane"]);
        let gateway = gateway(&contract);

        assert_eq!(gateway.total_words().await.unwrap(), 2);
        assert_eq!(gateway.total_words().await.unwrap(), 2);
        assert_eq!(contract.read_count_of(GET_TOTAL_WORDS), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_without_signer_fails_before_network() {
        let contract = SimulatedContract::new(["apple"]);
        let gateway = gateway(&contract);

        let err = gateway.start_game(None).await.unwrap_err();
        assert!(matches!(err, GameError::PreconditionFailed(_)));

        let signer = SimSigner::disconnected(PLAYER, contract.clone());
        let err = gateway.start_game(Some(&signer)).await.unwrap_err();
        assert!(matches!(err, GameError::PreconditionFailed(_)));
        assert_eq!(contract.read_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_invalidates_caller_reads() {
        let contract = SimulatedContract::new(["apple"]);
        let gateway = gateway(&contract);
        let signer = SimSigner::new(PLAYER, contract.clone());

        assert!(!gateway.has_active_game(PLAYER).await.unwrap());
        gateway.total_words().await.unwrap();

        gateway.start_game(Some(&signer)).await.unwrap();

        assert!(gateway.has_active_game(PLAYER).await.unwrap());
        assert_eq!(contract.read_count_of(HAS_ACTIVE_GAME), 2);
        // Reads not keyed by the player survive.
        assert_eq!(gateway.cache_stats().await.entries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_broadcast_rejection_keeps_reason() {
        let contract = SimulatedContract::new(["apple"]);
        let gateway = gateway(&contract);
        let signer = SimSigner::new(PLAYER, contract.clone());

        gateway.start_game(Some(&signer)).await.unwrap();
        let err = gateway.start_game(Some(&signer)).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Broadcast rejected: start-game failed with (err u102)"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_errors_propagate() {
        let contract = SimulatedContract::new(["apple"]);
        let gateway = gateway(&contract);
        contract.fail_next_reads(LedgerError::network("connection refused"), 1);

        let err = gateway.active_game(PLAYER).await.unwrap_err();
        assert!(matches!(err, GameError::Network(_)));
        assert_eq!(gateway.active_game(PLAYER).await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_word_at_index_is_parsed() {
        let contract = SimulatedContract::new(["apple"]);
        let gateway = gateway(&contract);

        assert_eq!(
            gateway.word_at_index(0).await.unwrap(),
            Some(Word::parse("APPLE").unwrap())
        );
        assert_eq!(gateway.word_at_index(5).await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_call_forces_refetch() {
        let contract = SimulatedContract::new(["apple"]);
        let gateway = gateway(&contract);

        gateway.total_words().await.unwrap();
        gateway.invalidate_call(GET_TOTAL_WORDS, &[], None).unwrap();
        gateway.total_words().await.unwrap();
        assert_eq!(contract.read_count_of(GET_TOTAL_WORDS), 2);
    }
}
