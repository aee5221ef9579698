//! Write-ahead log of guesses submitted from this client.
//!
//! The ledger stores guesses but never their letter classification, and it
//! takes seconds to reflect a new guess. Each submission is recorded here
//! first; the record gains its evaluation once the answer is revealed and
//! the whole game entry is dropped when the game completes.

use super::KeyValueStore;
use crate::error::Result;
use crate::evaluator::{Evaluation, Word};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

const KEY_PREFIX: &str = "game_evaluations";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuessRecord {
    pub guess: Word,
    pub game_id: u64,
    pub word_index: u64,
    pub submitted_at: DateTime<Utc>,
    #[serde(default)]
    pub evaluation: Option<Evaluation>,
}

impl GuessRecord {
    pub fn is_evaluated(&self) -> bool {
        self.evaluation.is_some()
    }
}

pub struct GuessLedger {
    store: Arc<dyn KeyValueStore>,
    // Serializes read-modify-write cycles on a game entry.
    write_lock: Mutex<()>,
}

impl GuessLedger {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    fn key(address: &str, game_id: u64) -> String {
        format!("{}:{}:{}", KEY_PREFIX, address, game_id)
    }

    fn address_prefix(address: &str) -> String {
        format!("{}:{}:", KEY_PREFIX, address)
    }

    async fn load(&self, key: &str) -> Result<Vec<GuessRecord>> {
        match self.store.get(key).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    async fn save(&self, key: &str, records: &[GuessRecord]) -> Result<()> {
        let raw = serde_json::to_string(records)?;
        self.store.set(key, &raw).await
    }

    /// Append a guess. No deduplication and no validation against the ledger.
    pub async fn record(
        &self,
        address: &str,
        game_id: u64,
        word_index: u64,
        guess: &Word,
    ) -> Result<GuessRecord> {
        let _guard = self.write_lock.lock().await;
        let key = Self::key(address, game_id);
        let mut records = self.load(&key).await?;

        let record = GuessRecord {
            guess: guess.clone(),
            game_id,
            word_index,
            submitted_at: Utc::now(),
            evaluation: None,
        };
        records.push(record.clone());
        self.save(&key, &records).await?;

        tracing::debug!(
            "[Storage] Recorded guess {} for game {} ({} total)",
            guess,
            game_id,
            records.len()
        );
        Ok(record)
    }

    /// Attach an evaluation to the first unevaluated record of `guess`.
    /// Evaluations already attached are never replaced. Returns whether a
    /// record was updated.
    pub async fn record_evaluation(
        &self,
        address: &str,
        game_id: u64,
        guess: &Word,
        evaluation: Evaluation,
    ) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let key = Self::key(address, game_id);
        let mut records = self.load(&key).await?;

        let Some(record) = records
            .iter_mut()
            .find(|r| r.guess == *guess && r.evaluation.is_none())
        else {
            return Ok(false);
        };
        record.evaluation = Some(evaluation);

        self.save(&key, &records).await?;
        Ok(true)
    }

    /// Records for one game in submission order.
    pub async fn list(&self, address: &str, game_id: u64) -> Result<Vec<GuessRecord>> {
        self.load(&Self::key(address, game_id)).await
    }

    pub async fn latest(&self, address: &str, game_id: u64) -> Result<Option<GuessRecord>> {
        Ok(self.list(address, game_id).await?.pop())
    }

    /// Whether any recorded guess is still waiting for its evaluation.
    pub async fn has_pending(&self, address: &str, game_id: u64) -> Result<bool> {
        Ok(self
            .list(address, game_id)
            .await?
            .iter()
            .any(|r| !r.is_evaluated()))
    }

    /// Game ids with local records for `address`.
    pub async fn games(&self, address: &str) -> Result<Vec<u64>> {
        let prefix = Self::address_prefix(address);
        let mut ids: Vec<u64> = self
            .store
            .list_keys_with_prefix(&prefix)
            .await?
            .iter()
            .filter_map(|key| key[prefix.len()..].parse().ok())
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    pub async fn clear(&self, address: &str, game_id: u64) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.store.remove(&Self::key(address, game_id)).await?;
        tracing::info!("[Storage] Cleared guesses for game {}", game_id);
        Ok(())
    }

    /// Remove every game entry for `address`. Returns the number removed.
    pub async fn clear_all(&self, address: &str) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let keys = self
            .store
            .list_keys_with_prefix(&Self::address_prefix(address))
            .await?;
        for key in &keys {
            self.store.remove(key).await?;
        }
        tracing::info!("[Storage] Cleared all guesses for {}", address);
        Ok(keys.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::{evaluate, LetterResult};
    use crate::storage::{MemoryStore, SqliteStore};
    use tempfile::tempdir;

    const PLAYER: &str = "ST1PLAYER";

    fn word(s: &str) -> Word {
        Word::parse(s).unwrap()
    }

    fn ledger() -> GuessLedger {
        GuessLedger::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_record_appends_in_order() {
        let ledger = ledger();
        ledger.record(PLAYER, 1, 0, &word("crane")).await.unwrap();
        ledger.record(PLAYER, 1, 0, &word("crane")).await.unwrap();
        ledger.record(PLAYER, 1, 0, &word("slate")).await.unwrap();

        let guesses: Vec<_> = ledger
            .list(PLAYER, 1)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.guess.to_string())
            .collect();
        assert_eq!(guesses, vec!["CRANE", "CRANE", "SLATE"]);
        assert_eq!(
            ledger.latest(PLAYER, 1).await.unwrap().unwrap().guess,
            word("slate")
        );
    }

    #[tokio::test]
    async fn test_evaluation_is_set_once() {
        let ledger = ledger();
        let guess = word("crane");
        ledger.record(PLAYER, 1, 0, &guess).await.unwrap();
        assert!(ledger.has_pending(PLAYER, 1).await.unwrap());

        let first = evaluate(&guess, &word("react"));
        assert!(ledger
            .record_evaluation(PLAYER, 1, &guess, first)
            .await
            .unwrap());
        assert!(!ledger
            .record_evaluation(PLAYER, 1, &guess, [LetterResult::Correct; 5])
            .await
            .unwrap());

        let records = ledger.list(PLAYER, 1).await.unwrap();
        assert_eq!(records[0].evaluation, Some(first));
        assert!(!ledger.has_pending(PLAYER, 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_clear_is_scoped_to_game_and_address() {
        let ledger = ledger();
        ledger.record(PLAYER, 1, 0, &word("crane")).await.unwrap();
        ledger.record(PLAYER, 2, 1, &word("slate")).await.unwrap();
        ledger.record("ST2OTHER", 1, 0, &word("pious")).await.unwrap();

        ledger.clear(PLAYER, 1).await.unwrap();
        assert!(ledger.list(PLAYER, 1).await.unwrap().is_empty());
        assert_eq!(ledger.games(PLAYER).await.unwrap(), vec![2]);

        assert_eq!(ledger.clear_all(PLAYER).await.unwrap(), 1);
        assert!(ledger.games(PLAYER).await.unwrap().is_empty());
        assert_eq!(ledger.list("ST2OTHER", 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_records_survive_restart() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("wordrush.db");

        {
            let store = SqliteStore::new(&path).await.unwrap();
            let ledger = GuessLedger::new(Arc::new(store));
            ledger.record(PLAYER, 7, 3, &word("crane")).await.unwrap();
        }

        let ledger = GuessLedger::new(Arc::new(SqliteStore::new(&path).await.unwrap()));
        let records = ledger.list(PLAYER, 7).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].word_index, 3);
        assert_eq!(records[0].evaluation, None);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_an_error() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(&format!("{}:{}:1", KEY_PREFIX, PLAYER), "not json")
            .await
            .unwrap();

        let ledger = GuessLedger::new(store);
        assert!(ledger.list(PLAYER, 1).await.is_err());
    }
}
