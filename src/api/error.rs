use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    #[error("Storage write error: {0}")]
    StorageWrite(String),

    #[error("Storage read error: {0}")]
    StorageRead(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] sea_orm::DbErr),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::StorageWrite(_)
            | AppError::StorageRead(_)
            | AppError::Persistence(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client errors can be fixed by resubmitting; everything else is worth a retry later.
    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            AppError::Validation(msg)
            | AppError::PayloadTooLarge(msg)
            | AppError::NotFound(msg) => msg,
            AppError::StorageWrite(msg) => {
                tracing::error!("Storage write error: {}", msg);
                "Server error while storing the report.".to_string()
            }
            AppError::StorageRead(msg) => {
                tracing::error!("Storage read error: {}", msg);
                "Server error while reading the report.".to_string()
            }
            AppError::Persistence(e) => {
                tracing::error!("Database error: {:?}", e);
                "Server error while accessing report records.".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal Server Error".to_string()
            }
        };

        let body = Json(json!({
            "message": message
        }));

        (status, body).into_response()
    }
}
