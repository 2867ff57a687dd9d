use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    ExternalTool(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Insufficient disk space: {free_mb}MB free, {required_mb}MB required")]
    DiskSpace { free_mb: u64, required_mb: u64 },

    #[error("Invalid file path: {0}")]
    PathSecurity(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::PathSecurity(_) => StatusCode::FORBIDDEN,
            AppError::DiskSpace { .. } => StatusCode::INSUFFICIENT_STORAGE,
            AppError::ExternalTool(_) => StatusCode::BAD_GATEWAY,
            AppError::Io(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "code": status.as_u16(),
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
