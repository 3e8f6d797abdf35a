use crate::application::{DispatchError, OpenError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let status = match &self {
            DispatchError::UnknownSession(_)
            | DispatchError::UnsupportedFile(_)
            | DispatchError::ManifestMissing(_) => StatusCode::BAD_REQUEST,
            DispatchError::SegmentNotFound(_) | DispatchError::SwitchTimedOut(_) => {
                StatusCode::NOT_FOUND
            }
            DispatchError::RestartFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

impl IntoResponse for OpenError {
    fn into_response(self) -> Response {
        let status = match &self {
            OpenError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            OpenError::SourceNotFound(_) => StatusCode::NOT_FOUND,
            OpenError::Probe(_) | OpenError::Startup(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
