use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("invalid outcome '{token}': expected one of {alphabet}")]
    InvalidOutcome { token: String, alphabet: String },

    #[error("round width mismatch: expected {expected} outcomes, got {got}")]
    RoundWidth { expected: usize, got: usize },

    #[error("empty observation")]
    EmptyInput,

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
