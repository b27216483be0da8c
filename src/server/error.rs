use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::db;

pub type Result<T> = std::result::Result<T, AppError>;

/// API错误类型
pub struct AppError(pub anyhow::Error);

impl AppError {
    fn status(&self) -> StatusCode {
        match self.0.downcast_ref::<db::Error>() {
            Some(db::Error::ImageNotFound(_) | db::Error::ClusterNotFound(_)) => StatusCode::NOT_FOUND,
            Some(db::Error::NotInCluster { .. }) => StatusCode::BAD_REQUEST,
            Some(db::Error::PathConflict(_)) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            (status, format!("Something went wrong: {}", self.0)).into_response()
        } else {
            (status, self.0.to_string()).into_response()
        }
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
