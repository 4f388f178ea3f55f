use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use quantumstrip_core::{DatabaseError, SessionError, ShowError};

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("Media server error: {0}")]
    Gateway(String),
    #[error("Unknown internal error: {0}")]
    Unknown(String),
}

impl ServerError {
    fn as_status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Gateway(_) => StatusCode::BAD_GATEWAY,
            Self::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (self.as_status_code(), self.to_string()).into_response()
    }
}

impl From<SessionError> for ServerError {
    fn from(value: SessionError) -> Self {
        match value {
            SessionError::ModelNotFound
            | SessionError::SessionNotFound
            | SessionError::NoActiveSession => Self::NotFound(value.to_string()),
            SessionError::ModelUnavailable | SessionError::ModelNotLive => {
                Self::BadRequest(value.to_string())
            }
            SessionError::NotAParty | SessionError::NotAModel => {
                Self::Forbidden(value.to_string())
            }
            SessionError::Gateway(e) => Self::Gateway(e.to_string()),
            SessionError::Database(e) => e.into(),
        }
    }
}

impl From<ShowError> for ServerError {
    fn from(value: ShowError) -> Self {
        match value {
            ShowError::ModelNotFound | ShowError::ShowNotFound => {
                Self::NotFound(value.to_string())
            }
            ShowError::ModelUnavailable
            | ShowError::InvalidState { .. }
            | ShowError::InsufficientFunds { .. } => Self::BadRequest(value.to_string()),
            ShowError::NotAViewer | ShowError::NotAModel | ShowError::NotAParty => {
                Self::Forbidden(value.to_string())
            }
            ShowError::Database(e) => e.into(),
        }
    }
}

impl From<DatabaseError> for ServerError {
    fn from(value: DatabaseError) -> Self {
        match value {
            DatabaseError::NotFound { .. } => Self::NotFound(value.to_string()),
            e => Self::Unknown(e.to_string()),
        }
    }
}

#[cfg(test)]
mod test {
    use axum::http::StatusCode;
    use quantumstrip_core::ShowError;

    use super::ServerError;

    #[test]
    fn test_insufficient_funds_is_a_bad_request() {
        let error: ServerError = ShowError::InsufficientFunds { required: 20 }.into();

        assert!(matches!(error, ServerError::BadRequest(_)));
        assert_eq!(error.as_status_code(), StatusCode::BAD_REQUEST);
    }
}
