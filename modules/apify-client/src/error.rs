use thiserror::Error;

pub type Result<T> = std::result::Result<T, ApifyError>;

#[derive(Debug, Error)]
pub enum ApifyError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Actor run {run_id} ended with status: {status}")]
    RunFailed { run_id: String, status: String },
}

impl ApifyError {
    /// Credential and quota rejections. Retrying these cannot succeed.
    pub fn is_auth(&self) -> bool {
        matches!(self, ApifyError::Api { status: 401 | 403, .. })
    }
}

impl From<reqwest::Error> for ApifyError {
    fn from(err: reqwest::Error) -> Self {
        ApifyError::Network(err.to_string())
    }
}
