//! WordRush SDK - client-side synchronization for an on-chain word game
//!
//! The contract is slow to confirm writes, rate limits reads and never returns
//! per-letter results. This library keeps a responsive local view of a game
//! consistent with it: a rate-limited read cache, a typed gateway over the
//! contract, a local log of submitted guesses and the controller that merges
//! them.

pub mod cache;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod gateway;
pub mod ledger;
pub mod storage;
pub mod sync;
pub mod types;

pub use cache::{CacheConfig, CacheStats, RequestCache};
pub use config::{ClientConfig, ConfirmationPolicy, Network, SyncConfig};
pub use error::{GameError, Result};
pub use evaluator::{evaluate, Evaluation, LetterResult, Word};
pub use gateway::LedgerGateway;
pub use ledger::{ContractArg, Ledger, LedgerError, Signer, SimSigner, SimulatedContract, TxId};
pub use storage::{GuessLedger, GuessRecord, KeyValueStore, MemoryStore, SqliteStore};
pub use sync::{GameController, GameSession, GameStatus, GameView, RefreshHandle, SyncPhase};
pub use types::{BountyInfo, GameRecord, PlayerStats};
