use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::error;

pub type Result<T, E = WebbyError> = std::result::Result<T, E>;

/// Request-level failures and the status codes they map to.
#[derive(thiserror::Error, Debug)]
pub enum WebbyError {
    /// Missing repository, file or revision.
    #[error("Not Found")]
    NotFound,

    /// A capability switched off in the configuration.
    #[error("Unsupported service: {0}")]
    Forbidden(String),

    #[error("Authorization Required")]
    Unauthorized { realm: String },

    /// Malformed credentials or a path segment that tries to leave the repository.
    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<axum::http::Error> for WebbyError {
    fn from(err: axum::http::Error) -> Self {
        WebbyError::Internal(anyhow::Error::new(err))
    }
}

impl From<header::InvalidHeaderValue> for WebbyError {
    fn from(err: header::InvalidHeaderValue) -> Self {
        WebbyError::Internal(anyhow::Error::new(err))
    }
}

impl WebbyError {
    pub fn status(&self) -> StatusCode {
        match self {
            WebbyError::NotFound => StatusCode::NOT_FOUND,
            WebbyError::Forbidden(_) => StatusCode::FORBIDDEN,
            WebbyError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            WebbyError::BadRequest(_) => StatusCode::BAD_REQUEST,
            WebbyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for WebbyError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            WebbyError::Unauthorized { realm } => {
                let challenge = HeaderValue::from_str(&format!("Basic realm=\"{realm}\""))
                    .unwrap_or_else(|_| HeaderValue::from_static("Basic realm=\"git-webby\""));
                (
                    status,
                    [(header::WWW_AUTHENTICATE, challenge)],
                    "Authorization Required",
                )
                    .into_response()
            }
            WebbyError::Internal(err) => {
                error!(error = %err, "internal server error");
                (status, "Internal Server Error").into_response()
            }
            other => (status, other.to_string()).into_response(),
        }
    }
}
