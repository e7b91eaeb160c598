//! Operator confirmation gates.

#[cfg(any(test, feature = "test-util"))]
use mockall::automock;

use dialoguer::{Confirm, Input};

use crate::{Error, Result};

/// Asks the operator before anything is mutated
#[cfg_attr(any(test, feature = "test-util"), automock)]
pub trait Confirmer: Send + Sync {
    /// Yes/no question, defaulting to no
    fn confirm(&self, prompt: &str) -> Result<bool>;

    /// Require the operator to type `phrase` exactly
    fn confirm_phrase(&self, prompt: &str, phrase: &str) -> Result<bool>;
}

/// Terminal prompts via dialoguer
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalConfirmer;

impl Confirmer for TerminalConfirmer {
    fn confirm(&self, prompt: &str) -> Result<bool> {
        Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .map_err(|e| Error::precondition(format!("confirmation prompt failed: {}", e)))
    }

    fn confirm_phrase(&self, prompt: &str, phrase: &str) -> Result<bool> {
        let answer: String = Input::new()
            .with_prompt(format!("{} (type '{}' to continue)", prompt, phrase))
            .allow_empty(true)
            .interact_text()
            .map_err(|e| Error::precondition(format!("confirmation prompt failed: {}", e)))?;
        Ok(phrase_matches(&answer, phrase))
    }
}

/// Exact match after trimming surrounding whitespace
pub fn phrase_matches(answer: &str, phrase: &str) -> bool {
    answer.trim() == phrase
}
