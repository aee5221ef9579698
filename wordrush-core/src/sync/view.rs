use crate::evaluator::{evaluate, Evaluation, LetterResult, Word, WORD_LENGTH};
use crate::storage::GuessRecord;
use crate::types::GameRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Controller state machine phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncPhase {
    Idle,
    Loading,
    NoGame,
    StartingGame,
    Active,
    SubmittingGuess,
    ConfirmPending,
    Forfeiting,
    Won,
    Lost,
    Error,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SyncPhase::Idle => "idle",
            SyncPhase::Loading => "loading",
            SyncPhase::NoGame => "no game",
            SyncPhase::StartingGame => "starting game",
            SyncPhase::Active => "active",
            SyncPhase::SubmittingGuess => "submitting guess",
            SyncPhase::ConfirmPending => "waiting for confirmation",
            SyncPhase::Forfeiting => "forfeiting",
            SyncPhase::Won => "won",
            SyncPhase::Lost => "lost",
            SyncPhase::Error => "error",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameStatus {
    Active,
    Won,
    Lost,
}

impl GameStatus {
    pub fn from_record(record: &GameRecord, max_attempts: u32) -> Self {
        if record.won {
            GameStatus::Won
        } else if record.attempts >= max_attempts {
            GameStatus::Lost
        } else {
            GameStatus::Active
        }
    }

    pub fn is_complete(self) -> bool {
        self != GameStatus::Active
    }

    pub fn phase(self) -> SyncPhase {
        match self {
            GameStatus::Active => SyncPhase::Active,
            GameStatus::Won => SyncPhase::Won,
            GameStatus::Lost => SyncPhase::Lost,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TileState {
    Empty,
    /// Letter known, classification not yet.
    Filled,
    Correct,
    Present,
    Absent,
}

impl From<LetterResult> for TileState {
    fn from(result: LetterResult) -> Self {
        match result {
            LetterResult::Correct => TileState::Correct,
            LetterResult::Present => TileState::Present,
            LetterResult::Absent => TileState::Absent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    pub letter: Option<char>,
    pub state: TileState,
}

impl Tile {
    pub const EMPTY: Tile = Tile {
        letter: None,
        state: TileState::Empty,
    };
}

pub type Row = [Tile; WORD_LENGTH];

fn filled_row(word: &Word) -> Row {
    let mut row = [Tile::EMPTY; WORD_LENGTH];
    for (tile, letter) in row.iter_mut().zip(word.letters()) {
        *tile = Tile {
            letter: Some(letter),
            state: TileState::Filled,
        };
    }
    row
}

fn colored_row(word: &Word, evaluation: &Evaluation) -> Row {
    let mut row = filled_row(word);
    for (tile, result) in row.iter_mut().zip(evaluation) {
        tile.state = (*result).into();
    }
    row
}

fn unknown_row() -> Row {
    [Tile {
        letter: None,
        state: TileState::Filled,
    }; WORD_LENGTH]
}

pub fn row_is_empty(row: &Row) -> bool {
    row.iter().all(|t| t.state == TileState::Empty)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BountySummary {
    pub active: bool,
    pub remaining_amount: f64,
}

/// One game merged from the ledger record, local guesses and, once the game
/// is over, the revealed answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSession {
    pub game_id: u64,
    pub word_index: u64,
    pub attempts_used: u32,
    pub max_attempts: u32,
    pub grid: Vec<Row>,
    pub status: GameStatus,
    pub bounty: Option<BountySummary>,
    pub answer: Option<Word>,
}

impl GameSession {
    /// Index of the first row with no letters.
    pub fn next_row(&self) -> Option<usize> {
        self.grid.iter().position(row_is_empty)
    }

    /// Rows past the ledger's attempt count that come from local records.
    pub fn pending_rows(&self) -> usize {
        self.grid
            .iter()
            .skip(self.attempts_used as usize)
            .filter(|row| !row_is_empty(row))
            .count()
    }

    /// Fill the next row with `guess`, uncolored. Returns the row used.
    pub fn apply_optimistic(&mut self, guess: &Word) -> Option<usize> {
        let row = self.next_row()?;
        self.grid[row] = filled_row(guess);
        Some(row)
    }
}

/// Snapshot handed to the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameView {
    pub phase: SyncPhase,
    pub session: Option<GameSession>,
    pub error: Option<String>,
    pub last_synced: Option<DateTime<Utc>>,
}

impl Default for GameView {
    fn default() -> Self {
        Self {
            phase: SyncPhase::Idle,
            session: None,
            error: None,
            last_synced: None,
        }
    }
}

impl GameView {
    pub fn status(&self) -> Option<GameStatus> {
        self.session.as_ref().map(|s| s.status)
    }

    pub fn is_active(&self) -> bool {
        self.status() == Some(GameStatus::Active)
    }

    pub fn attempts_used(&self) -> u32 {
        self.session.as_ref().map_or(0, |s| s.attempts_used)
    }
}

/// Build the grid for `record`.
///
/// The ledger decides how many guesses exist; its guess list supplies their
/// letters, falling back to local records by position. Colors come from the
/// revealed answer when known, else from evaluations stored locally. While
/// the game is active, local records beyond the ledger's count are shown as
/// pending rows.
pub fn merge_rows(
    record: &GameRecord,
    local: &[GuessRecord],
    status: GameStatus,
    answer: Option<&Word>,
    max_attempts: u32,
) -> Vec<Row> {
    let max_rows = max_attempts as usize;
    let confirmed = (record.attempts as usize).min(max_rows);
    let mut grid = vec![[Tile::EMPTY; WORD_LENGTH]; max_rows];

    for (i, row) in grid.iter_mut().enumerate().take(confirmed) {
        let local_record = local.get(i);
        let word = record
            .guesses
            .get(i)
            .and_then(|g| Word::parse(g).ok())
            .or_else(|| local_record.map(|r| r.guess.clone()));

        let Some(word) = word else {
            *row = unknown_row();
            continue;
        };

        let stored = local_record
            .filter(|r| r.guess == word)
            .and_then(|r| r.evaluation);

        *row = match (answer, stored) {
            (Some(answer), _) => colored_row(&word, &evaluate(&word, answer)),
            (None, Some(evaluation)) => colored_row(&word, &evaluation),
            (None, None) => filled_row(&word),
        };
    }

    if status == GameStatus::Active {
        for (row, pending) in grid
            .iter_mut()
            .skip(confirmed)
            .zip(local.iter().skip(confirmed))
        {
            *row = filled_row(&pending.guess);
        }
    }

    grid
}
