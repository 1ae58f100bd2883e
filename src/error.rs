use thiserror::Error;

#[derive(Error, Debug)]
pub enum YamError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Log decode error: {0}")]
    Decode(String),

    #[error("Subgraph error: {0}")]
    Subgraph(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, YamError>;
