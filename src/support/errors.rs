use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Charge point {0} is not connected")]
    NotConnected(String),

    #[error("Connection to {0} is closing")]
    SendFailed(String),
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Command {action} to {charge_point_id} timed out")]
    Timeout {
        charge_point_id: String,
        action: &'static str,
    },

    #[error("Charge point answered with {code}: {description}")]
    CallError { code: String, description: String },

    #[error("Response channel closed before an answer arrived")]
    Cancelled,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
