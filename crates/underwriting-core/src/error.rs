use thiserror::Error;

/// Request-level failures; the HTTP layer maps each variant to a status code.
#[derive(Error, Debug)]
pub enum UnderwritingError {
    #[error("User not found")]
    UserNotFound { user_id: String },

    #[error("User already exists: {user_id}")]
    UserExists { user_id: String },

    #[error("No underwriting result found")]
    ResultNotFound { user_id: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{model} produced a non-finite prediction")]
    NonFinitePrediction { model: &'static str },

    #[error("Model inference failed")]
    Model {
        #[source]
        source: anyhow::Error,
    },
}

impl UnderwritingError {
    pub fn model(source: anyhow::Error) -> Self {
        Self::Model { source }
    }
}
