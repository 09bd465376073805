use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("required table {0:?} is missing or incomplete on the external database")]
    SchemaMissing(String),

    #[error("message not found")]
    NotFound,

    #[error("message carries no media")]
    NoMedia,

    #[error("invalid DSN: {0}")]
    InvalidDsn(String),

    #[error("timestamp parse error: {0}")]
    ChronoParse(#[from] chrono::ParseError),
}

pub type Result<T> = std::result::Result<T, StoreError>;
