use eyre::Report;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to acquire access token")]
    Auth(#[source] Box<ClientError>),
    #[error("status code 400 - bad request")]
    BadRequest,
    #[error("status code 401 - unauthorized")]
    Unauthorized,
    #[error("status code 404 - not found")]
    NotFound,
    #[error("status code 429 - ratelimited")]
    Ratelimited,
    #[error("status code {0} - server error")]
    ServerError(u16),
    #[error("request timed out")]
    TimedOut,
    #[error("cancelled")]
    Cancelled,
    #[error(transparent)]
    Report(#[from] Report),
}

impl ClientError {
    /// 429, 5xx, and timeouts warrant another attempt; everything else
    /// is final for the request.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Ratelimited | Self::ServerError(_) | Self::TimedOut
        )
    }
}
