//! Capabilities consumed from the outside world: the contract's read-only
//! surface and a transaction signer.
//!
//! Both are opaque to the rest of the crate. Reads return contract values as
//! JSON (`(ok x)` unwrapped to `x`, `none` as `null`, tuples as objects with
//! kebab-case keys); writes return only a transaction id.

pub mod sim;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use sim::{SimSigner, SimulatedContract};

/// Contract function names.
pub mod functions {
    pub const HAS_ACTIVE_GAME: &str = "has-active-game";
    pub const GET_ACTIVE_GAME: &str = "get-active-game";
    pub const GET_GAME_HISTORY: &str = "get-game-history";
    pub const GET_WORD_AT_INDEX: &str = "get-word-at-index";
    pub const GET_BOUNTY: &str = "get-bounty";
    pub const GET_PLAYER_STATS: &str = "get-player-stats";
    pub const GET_TOTAL_WORDS: &str = "get-total-words";

    pub const START_GAME: &str = "start-game";
    pub const SUBMIT_GUESS: &str = "submit-guess";
    pub const FORFEIT_GAME: &str = "forfeit-game";
    pub const FUND_BOUNTY: &str = "fund-bounty";
    pub const CLAIM_BOUNTY: &str = "claim-bounty";
}

/// Contract error codes.
pub mod codes {
    pub const ERR_GAME_NOT_FOUND: u32 = 101;
    pub const ERR_GAME_IN_PROGRESS: u32 = 102;
    pub const ERR_INVALID_WORD_LENGTH: u32 = 103;
    pub const ERR_NO_WORDS: u32 = 104;
    pub const ERR_INVALID_WORD_INDEX: u32 = 105;
    pub const ERR_INVALID_AMOUNT: u32 = 107;
    pub const ERR_BOUNTY_NOT_FOUND: u32 = 108;
    pub const ERR_BOUNTY_CLAIMED: u32 = 109;
}

/// A single contract-call argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "kebab-case")]
pub enum ContractArg {
    Uint(u64),
    StringAscii(String),
    StringUtf8(String),
    Principal(String),
}

impl ContractArg {
    pub fn uint(value: u64) -> Self {
        Self::Uint(value)
    }

    pub fn ascii(value: impl Into<String>) -> Self {
        Self::StringAscii(value.into())
    }

    pub fn principal(address: impl Into<String>) -> Self {
        Self::Principal(address.into())
    }

    pub fn as_uint(&self) -> Option<u64> {
        match self {
            ContractArg::Uint(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ContractArg::StringAscii(s) | ContractArg::StringUtf8(s) | ContractArg::Principal(s) => {
                Some(s)
            }
            ContractArg::Uint(_) => None,
        }
    }
}

/// Opaque transaction identifier returned by a successful broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxId(pub String);

impl std::fmt::Display for TxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Read-side failure. Cloneable so one in-flight result can be handed to
/// every caller waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Contract error in {function}: (err u{code})")]
    Contract { function: String, code: u32 },
}

impl LedgerError {
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Upstream APIs report throttling inconsistently, so transport messages
    /// are checked for throttling markers as well as the kind.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            LedgerError::RateLimited(_) => true,
            LedgerError::Network(msg) => {
                let lower = msg.to_lowercase();
                lower.contains("rate limit")
                    || lower.contains("too many requests")
                    || msg
                        .split(|c: char| !c.is_ascii_alphanumeric())
                        .any(|token| token == "429")
            }
            _ => false,
        }
    }
}

/// Signer failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignerError {
    #[error("No wallet connected")]
    NoWallet,

    #[error("Broadcast rejected: {0}")]
    BroadcastRejected(String),
}

/// Read-only access to the contract.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn read_only(
        &self,
        function: &str,
        args: &[ContractArg],
        sender: &str,
    ) -> std::result::Result<serde_json::Value, LedgerError>;
}

/// Builds, signs and broadcasts a contract call on behalf of one address.
#[async_trait]
pub trait Signer: Send + Sync {
    fn address(&self) -> &str;

    async fn sign_and_broadcast(
        &self,
        function: &str,
        args: &[ContractArg],
    ) -> std::result::Result<TxId, SignerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_detection_by_text() {
        assert!(LedgerError::RateLimited("slow down".to_string()).is_rate_limited());
        assert!(LedgerError::network("HTTP 429").is_rate_limited());
        assert!(LedgerError::network("Too Many Requests").is_rate_limited());
        assert!(LedgerError::network("Rate limit exceeded").is_rate_limited());
        assert!(!LedgerError::network("connection reset").is_rate_limited());
        assert!(!LedgerError::decode("missing field").is_rate_limited());
    }

    #[test]
    fn test_429_inside_other_text_is_not_rate_limited() {
        let contract = LedgerError::Contract {
            function: "submit-guess".to_string(),
            code: 429,
        };
        assert!(!contract.is_rate_limited());
        assert!(!LedgerError::network("unknown principal ST1429XYZ").is_rate_limited());
        assert!(!LedgerError::decode("status 429").is_rate_limited());
        assert!(LedgerError::network("status: 429").is_rate_limited());
    }

    #[test]
    fn test_contract_arg_serialization_is_stable() {
        let args = vec![ContractArg::principal("ST1ABC"), ContractArg::uint(7)];
        let json = serde_json::to_string(&args).unwrap();
        assert_eq!(
            json,
            r#"[{"type":"principal","value":"ST1ABC"},{"type":"uint","value":7}]"#
        );
    }
}
