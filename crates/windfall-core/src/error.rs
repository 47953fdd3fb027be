//! Error types for Windfall

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Mailbox error: {0}")]
    Mailbox(String),

    #[error("Board error: {0}")]
    Board(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("State conflict: {0}")]
    StateConflict(String),
}

pub type Result<T> = std::result::Result<T, Error>;
