//! Auto-save error types.
//!
//! Transient save failures are retried internally and never appear here;
//! only terminal outcomes are surfaced, with user-friendly messages for
//! toast and banner rendering.

use thiserror::Error;

/// Boxed error produced by an injected save function.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Terminal failure of a save attempt.
#[derive(Debug, Error)]
pub enum AutoSaveError {
    /// Every attempt the retry policy allowed has failed. The session
    /// stays dirty so the edits can be saved later.
    #[error("save failed after {attempts} attempts")]
    RetriesExhausted {
        /// Total save invocations performed (initial attempt plus retries).
        attempts: u32,
        #[source]
        source: BoxError,
    },

    /// The session was torn down before the attempt could finish.
    #[error("auto-save session is disposed")]
    Disposed,
}

impl AutoSaveError {
    /// Get a user-friendly message for this error.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::RetriesExhausted { attempts, .. } => {
                format!(
                    "Your changes could not be saved after {attempts} attempts. \
                    They are kept in the form; edit again or save manually to retry."
                )
            }
            Self::Disposed => "The editor was closed before the save could finish.".to_string(),
        }
    }
}
