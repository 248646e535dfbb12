/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The table mapping lacks a required logical table
    #[error("incomplete table name mapping, missing a table name for {0:?} table")]
    MissingTable(&'static str),

    /// A configured table name is not a plain SQL identifier
    #[error("invalid table name {0:?}")]
    InvalidTableName(String),

    /// Could not reach the database
    #[error("failed to connect to database: {0}")]
    Connect(#[source] sqlx::Error),

    /// A query failed
    #[error("database query failed: {0}")]
    Query(#[from] sqlx::Error),

    /// Could not set up the notification listener
    #[error("failed to listen for notifications: {0}")]
    Listener(#[source] sqlx::Error),
}
