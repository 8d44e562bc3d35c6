use thiserror::Error;

/// Domain-specific errors using thiserror
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("User not found: {id}")]
    UserNotFound { id: i64 },

    #[error("{message}")]
    Validation { message: String },

    #[error("{message}")]
    Database { message: String },
}

impl DomainError {
    pub fn user_not_found(id: i64) -> Self {
        Self::UserNotFound { id }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }
}
