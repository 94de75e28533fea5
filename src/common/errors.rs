use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde::Serialize;

/// JSON error body returned by the REST surface.
#[derive(Debug, Serialize)]
pub struct ApiError {
  #[serde(skip)]
  pub status: StatusCode,
  pub error: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub details: Option<String>,
}

impl ApiError {
  pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
    Self {
      status,
      error: error.into(),
      details: None,
    }
  }

  pub fn with_details(mut self, details: impl Into<String>) -> Self {
    self.details = Some(details.into());
    self
  }

  pub fn bad_request(error: impl Into<String>) -> Self {
    Self {
      status: StatusCode::BAD_REQUEST,
      error: error.into(),
      details: None,
    }
  }

  pub fn not_found(error: impl Into<String>) -> Self {
    Self {
      status: StatusCode::NOT_FOUND,
      error: error.into(),
      details: None,
    }
  }

  pub fn internal(error: impl Into<String>, details: impl Into<String>) -> Self {
    Self {
      status: StatusCode::INTERNAL_SERVER_ERROR,
      error: error.into(),
      details: Some(details.into()),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    (self.status, Json(&self)).into_response()
  }
}
