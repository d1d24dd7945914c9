use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProPublicaError>;

#[derive(Debug, Error)]
pub enum ProPublicaError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Organization not found: {0}")]
    NotFound(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for ProPublicaError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProPublicaError::Parse(err.to_string())
        } else {
            ProPublicaError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ProPublicaError {
    fn from(err: serde_json::Error) -> Self {
        ProPublicaError::Parse(err.to_string())
    }
}
