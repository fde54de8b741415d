use thiserror::Error;

/// Errors surfaced by the SQL engine facade. `LoginFailed` is the one
/// sentinel the orchestrator matches on directly (ordinary Bind surfaces it
/// as an operational error; `CheckAndRotateCredentials` treats it as the
/// trigger to rotate the master password).
#[derive(Debug, Error)]
pub enum SqlError {
    #[error("login failed for {username} on {database}")]
    LoginFailed { username: String, database: String },

    #[error("database engine error: {0}")]
    Engine(#[from] sqlx::Error),

    #[error("unsupported engine family: {0}")]
    UnsupportedEngine(String),
}
