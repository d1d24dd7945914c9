use propublica_client::ProPublicaError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ImportError>;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Service error: {0}")]
    Service(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("An import run is already in progress")]
    RunInProgress,

    #[error("Import run aborted: {0}")]
    Aborted(String),
}

impl From<ProPublicaError> for ImportError {
    fn from(err: ProPublicaError) -> Self {
        match err {
            ProPublicaError::NotFound(ein) => ImportError::NotFound(ein),
            ProPublicaError::Parse(msg) => ImportError::Validation(msg),
            other => ImportError::Service(other.to_string()),
        }
    }
}

impl From<sqlx::Error> for ImportError {
    fn from(err: sqlx::Error) -> Self {
        ImportError::Persistence(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for ImportError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        ImportError::Persistence(err.to_string())
    }
}
