//! Error types for the server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::error::ModelError;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Model(ModelError::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            ServerError::Model(ModelError::DatasetInvalid(_)) | ServerError::Model(ModelError::TrainingFailed(_)) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ServerError::Model(ModelError::ModelUnavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Model(ModelError::StoreIo { .. }) | ServerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            ServerError::Internal(msg) => {
                tracing::error!(detail = %msg, "Internal server error");
                "An internal error occurred".to_string()
            }
            ServerError::Model(e) if !e.is_client_error() => {
                tracing::error!(detail = %e, status = status.as_u16(), "Model service error");
                e.to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": true,
            "message": message,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InputError;

    #[test]
    fn test_status_mapping() {
        let invalid: ServerError = ModelError::from(InputError::Empty).into();
        assert_eq!(invalid.status_code(), StatusCode::BAD_REQUEST);

        let unavailable: ServerError =
            ModelError::ModelUnavailable(Box::new(ModelError::TrainingFailed("x".into()))).into();
        assert_eq!(unavailable.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let dataset: ServerError = ModelError::DatasetInvalid("empty".into()).into();
        assert_eq!(dataset.status_code(), StatusCode::UNPROCESSABLE_ENTITY);

        let io: ServerError = ModelError::StoreIo {
            path: "m.txt".into(),
            reason: "denied".into(),
        }
        .into();
        assert_eq!(io.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_internal_detail_not_exposed() {
        let response = ServerError::Internal("join error: panicked".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
