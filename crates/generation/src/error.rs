//! Generation pipeline error types

use adforge_ledger::LedgerError;
use thiserror::Error;

/// Errors surfaced by the generation pipeline
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Prompt too short after sanitizing: {length} characters, minimum {minimum}")]
    PromptTooShort { length: usize, minimum: usize },

    #[error("Insufficient credits: {reason}")]
    InsufficientCredits { reason: String },

    #[error("Generation provider error: {0}")]
    Provider(String),

    #[error("Generation failed after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },

    #[error("Resize provider error: {0}")]
    Resize(String),

    #[error("Required sizes failed to resize: {}", failed.join(", "))]
    PartialResize { failed: Vec<String> },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

pub type GenerationResult<T> = Result<T, GenerationError>;
