use serde::{Deserialize, Serialize};

/// Micro-units per whole token in bounty amounts.
pub const MICRO_UNITS: u64 = 1_000_000;

/// A game as the contract reports it, either from the active-game map or
/// from the per-player history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GameRecord {
    pub game_id: u64,
    pub word_index: u64,
    pub attempts: u32,
    pub won: bool,
    #[serde(default)]
    pub guesses: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BountyInfo {
    pub total_bounty: u64,
    pub remaining_bounty: u64,
    pub is_active: bool,
    pub created_by: String,
    pub created_at: u64,
    pub winner_count: u64,
}

impl BountyInfo {
    /// Remaining pool in whole tokens.
    pub fn remaining_amount(&self) -> f64 {
        self.remaining_bounty as f64 / MICRO_UNITS as f64
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PlayerStats {
    pub total_games: u64,
    pub games_won: u64,
    pub current_streak: u64,
    pub max_streak: u64,
    pub average_attempts: u64,
    pub total_attempts: u64,
}

impl PlayerStats {
    pub fn win_rate(&self) -> f64 {
        if self.total_games == 0 {
            return 0.0;
        }
        self.games_won as f64 / self.total_games as f64
    }

    /// Fold one finished game into the running totals.
    pub fn record_game(&mut self, won: bool, attempts: u32) {
        self.total_games += 1;
        self.total_attempts += attempts as u64;
        self.average_attempts = self.total_attempts / self.total_games;

        if won {
            self.games_won += 1;
            self.current_streak += 1;
            self.max_streak = self.max_streak.max(self.current_streak);
        } else {
            self.current_streak = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_record_decodes_kebab_case() {
        let json = serde_json::json!({
            "game-id": 3,
            "word-index": 2,
            "attempts": 1,
            "won": false,
            "guesses": ["CRANE"]
        });
        let record: GameRecord = serde_json::from_value(json).unwrap();
        assert_eq!(record.game_id, 3);
        assert_eq!(record.guesses, vec!["CRANE".to_string()]);
    }

    #[test]
    fn test_stats_streaks() {
        let mut stats = PlayerStats::default();
        stats.record_game(true, 1);
        stats.record_game(true, 3);
        stats.record_game(false, 6);

        assert_eq!(stats.total_games, 3);
        assert_eq!(stats.games_won, 2);
        assert_eq!(stats.current_streak, 0);
        assert_eq!(stats.max_streak, 2);
        assert_eq!(stats.total_attempts, 10);
        assert_eq!(stats.average_attempts, 3);
    }

    #[test]
    fn test_bounty_amount_in_whole_tokens() {
        let bounty = BountyInfo {
            total_bounty: 2_000_000,
            remaining_bounty: 1_500_000,
            is_active: true,
            created_by: "ST1FUNDER".to_string(),
            created_at: 0,
            winner_count: 0,
        };
        assert_eq!(bounty.remaining_amount(), 1.5);
    }
}
