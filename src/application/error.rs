use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use crate::application::aggregate::AggregateError;
use crate::application::wall::WallError;
use crate::infra::error::InfraError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Wall(#[from] WallError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Wall(WallError::Aggregation(AggregateError::NoSourcesConfigured)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Wall(WallError::Aggregation(_)) => StatusCode::BAD_GATEWAY,
            AppError::Wall(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Infra(_) | AppError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn presentation_message(&self) -> &'static str {
        match self {
            AppError::Wall(WallError::Aggregation(_)) => "Sponsor data is currently unavailable",
            AppError::Wall(_) => "Sponsor artifacts could not be generated",
            AppError::Validation(_) => "Request could not be processed",
            AppError::Infra(_) | AppError::Unexpected(_) => "Unexpected error occurred",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(target: "mecenate::app", error = %self, "request failed");
        }
        (status, self.presentation_message()).into_response()
    }
}
