//! Per-letter guess classification.

use crate::error::{GameError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const WORD_LENGTH: usize = 5;

/// A validated five-letter word, stored uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Word(String);

impl Word {
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.chars().count() != WORD_LENGTH {
            return Err(GameError::validation(format!(
                "Guess must be {} letters",
                WORD_LENGTH
            )));
        }
        if !trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(GameError::validation("Guess must contain only letters A-Z"));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn letters(&self) -> impl Iterator<Item = char> + '_ {
        self.0.chars()
    }

    fn bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl FromStr for Word {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Word {
    type Error = GameError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Word> for String {
    fn from(word: Word) -> Self {
        word.0
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LetterResult {
    Correct,
    Present,
    Absent,
}

impl LetterResult {
    /// Numeric code used by the contract: 2 correct, 1 present, 0 absent.
    pub fn code(self) -> u8 {
        match self {
            LetterResult::Correct => 2,
            LetterResult::Present => 1,
            LetterResult::Absent => 0,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            2 => Some(LetterResult::Correct),
            1 => Some(LetterResult::Present),
            0 => Some(LetterResult::Absent),
            _ => None,
        }
    }
}

pub type Evaluation = [LetterResult; WORD_LENGTH];

/// Classify every letter of `guess` against `answer`.
///
/// Exact matches are resolved first and consume their answer position, so a
/// repeated letter in the guess is never credited more times than it occurs
/// in the answer.
pub fn evaluate(guess: &Word, answer: &Word) -> Evaluation {
    let guess = guess.bytes();
    let answer = answer.bytes();
    let mut result = [LetterResult::Absent; WORD_LENGTH];
    let mut consumed = [false; WORD_LENGTH];

    for i in 0..WORD_LENGTH {
        if guess[i] == answer[i] {
            result[i] = LetterResult::Correct;
            consumed[i] = true;
        }
    }

    for i in 0..WORD_LENGTH {
        if result[i] == LetterResult::Correct {
            continue;
        }
        if let Some(j) = (0..WORD_LENGTH).find(|&j| !consumed[j] && guess[i] == answer[j]) {
            result[i] = LetterResult::Present;
            consumed[j] = true;
        }
    }

    result
}

pub fn is_solved(evaluation: &Evaluation) -> bool {
    evaluation.iter().all(|r| *r == LetterResult::Correct)
}
