//! Application-wide error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("Please install a wallet provider to use this application")]
    WalletUnavailable,

    #[error("Smart contract connection failed: {0}")]
    ContractUnreachable(String),

    #[error("Remote call failed: {0}")]
    RemoteCall(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Contract not connected")]
    NotConnected,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("ABI decode error: {0}")]
    Decode(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, DashboardError>;
