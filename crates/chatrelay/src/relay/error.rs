//! Failure classification for one message cycle
//!
//! Every failure is scoped to the message that caused it:
//! - Quota exhausted: notify, nothing was debited
//! - Client disconnected: silent, no fallback
//! - Provider error: fall back once, then refund and notify
//! - Malformed request: notify, nothing was debited

use thiserror::Error;

use crate::provider::ProviderError;

use super::connection::Disconnected;
use super::envelope::Notice;
use super::request::RequestError;

/// Errors that end a message cycle early
#[derive(Error, Debug, Clone)]
pub enum CycleError {
    /// Balance below the tier price
    #[error("Quota exhausted: balance {balance}, required {required}")]
    QuotaExhausted { balance: u64, required: u64 },

    /// The client closed the connection mid-cycle
    #[error("Client disconnected")]
    ClientDisconnected,

    /// A provider call failed
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The client payload could not be parsed
    #[error("Malformed request: {0}")]
    MalformedRequest(String),
}

impl CycleError {
    /// Notice sent to the client, if any
    pub fn notice(&self) -> Option<Notice> {
        match self {
            CycleError::QuotaExhausted { .. } => Some(Notice::QuotaExhausted),
            CycleError::ClientDisconnected => None,
            CycleError::Provider(_) => Some(Notice::ProviderUnavailable),
            CycleError::MalformedRequest(_) => Some(Notice::GenericError),
        }
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            CycleError::QuotaExhausted { .. } => "quota",
            CycleError::ClientDisconnected => "disconnect",
            CycleError::Provider(_) => "provider",
            CycleError::MalformedRequest(_) => "request",
        }
    }
}

impl From<Disconnected> for CycleError {
    fn from(_: Disconnected) -> Self {
        CycleError::ClientDisconnected
    }
}

impl From<RequestError> for CycleError {
    fn from(error: RequestError) -> Self {
        CycleError::MalformedRequest(error.to_string())
    }
}
