//! Message processor errors.

use thiserror::Error;

use crate::completion::CompletionError;
use crate::store::StoreError;

pub type ChatResult<T> = Result<T, ChatError>;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Chat session with ID {0} not found")]
    SessionNotFound(i64),

    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
