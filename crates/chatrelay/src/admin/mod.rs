//! Admin API for operators
//!
//! Runtime control flags and prices can be read and replaced while the relay
//! is running; balances can be inspected and topped up. Every route needs the
//! configured bearer token.

pub mod handlers;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::server::create_error_response;

/// Balance of one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaView {
    pub user_id: u64,
    pub balance: u64,
}

/// Body of a quota top-up
#[derive(Debug, Clone, Deserialize)]
pub struct CreditRequest {
    pub amount: u64,
}

/// Admin request failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdminError {
    /// No admin token configured
    #[error("Admin API is disabled")]
    Disabled,

    /// Missing or wrong bearer token
    #[error("Invalid admin token")]
    Unauthorized,

    /// Request body was understood but not acceptable
    #[error("{0}")]
    BadRequest(String),
}

impl AdminError {
    fn status(&self) -> StatusCode {
        match self {
            AdminError::Disabled => StatusCode::NOT_FOUND,
            AdminError::Unauthorized => StatusCode::UNAUTHORIZED,
            AdminError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            AdminError::Disabled => "admin_disabled",
            AdminError::Unauthorized => "unauthorized",
            AdminError::BadRequest(_) => "invalid_request",
        }
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        create_error_response(self.status(), self.error_type(), &self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_error_status() {
        assert_eq!(AdminError::Disabled.status(), StatusCode::NOT_FOUND);
        assert_eq!(AdminError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AdminError::BadRequest("x".to_string()).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_quota_view_serialization() {
        let json = serde_json::to_string(&QuotaView {
            user_id: 7,
            balance: 40,
        })
        .unwrap();
        assert_eq!(json, r#"{"user_id":7,"balance":40}"#);
    }
}
