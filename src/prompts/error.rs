use thiserror::Error;

use crate::store::StoreError;

/// Errors surfaced by the prompt registry.
#[derive(Debug, Error)]
pub enum PromptError {
    /// Template name is not a valid slug.
    #[error("invalid template name '{name}': use lowercase letters, digits and dashes")]
    InvalidName { name: String },

    /// Version content exceeds the configured maximum.
    #[error("prompt content is {size} bytes, maximum is {max}")]
    TooLarge { size: usize, max: usize },

    /// Content is empty after trimming.
    #[error("prompt content must not be empty")]
    EmptyContent,

    /// Underlying store failure or not-found.
    #[error(transparent)]
    Store(#[from] StoreError),
}
