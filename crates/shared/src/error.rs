//! Error types for the livechat backend

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for ChatError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ChatError::NotFound("row not found".to_string()),
            other => ChatError::Storage(other.to_string()),
        }
    }
}
