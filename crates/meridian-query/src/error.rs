//! Error types for the translation path.
//!
//! Translation errors never escape `translate`; they are logged and
//! recovered into the `unknown` query so a backend outage degrades a
//! question instead of failing it.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TranslationError {
    #[error("Completion backend error: {0}")]
    Backend(String),

    #[error("Completion request timed out")]
    Timeout,

    #[error("Backend returned malformed JSON: {0}")]
    MalformedResponse(String),
}
