//! Errors raised while resolving authorities and scraping collector responses.

use chrono::ParseError as ChronoParseError;
use serde_json::Error as JsonError;

use crate::model::CollectorId;

/// Result alias used throughout the collector crates.
pub type Result<T, E = CollectorError> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
/// Failures a lookup can end with. The core never retries; it classifies and propagates.
pub enum CollectorError {
    /// The national lookup service rejected the postcode outright.
    #[error("Invalid postcode: {0}")]
    InvalidPostcode(String),
    /// The postcode was accepted but no authority identifier could be extracted.
    #[error("Authority identifier not found for postcode {0}")]
    AuthorityIdentifierNotFound(String),
    /// The authority is known but no collector implementation is registered for it.
    #[error("Unsupported authority: {name} ({id})")]
    UnsupportedAuthority {
        /// Authority identifier as published by GOV.UK.
        id: String,
        /// Human readable authority name.
        name: String,
    },
    /// A relay client asked for a collector identifier that is not registered.
    #[error("Collector not found: {0}")]
    CollectorNotFound(CollectorId),
    /// The lookup completed without any addresses.
    #[error("Addresses not found")]
    AddressesNotFound,
    /// The lookup completed without bin days, or a bin day matched no bins.
    #[error("Bin days not found")]
    BinDaysNotFound,
    /// A response carried a request id the collector never issued.
    #[error("Protocol violation in {collector}: unexpected request id {request_id}")]
    ProtocolViolation {
        /// Collector whose state machine rejected the response.
        collector: CollectorId,
        /// Offending request id.
        request_id: u32,
    },
    /// The upstream site answered with a status the step cannot handle.
    #[error("Unexpected status {status} for request {request_id}")]
    UnexpectedStatus {
        /// Step that received the status.
        request_id: u32,
        /// HTTP status code.
        status: u16,
    },
    /// The upstream site answered but the content was not usable.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
    /// A value the step depends on was absent from the response.
    #[error("Missing field: {0}")]
    MissingField(&'static str),
    /// JSON content could not be decoded.
    #[error("JSON error: {0}")]
    Json(#[from] JsonError),
    /// A date could not be parsed.
    #[error("Date parse error: {0}")]
    Date(#[from] ChronoParseError),
    /// A date format was unsuitable for year inference.
    #[error("Invalid date format: {0}")]
    InvalidDateFormat(String),
    /// Encrypted content could not be decoded or decrypted.
    #[error("Decryption failed: {0}")]
    Decryption(String),
    /// A relay setting is malformed or out of range.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CollectorError {
    /// Build a [`CollectorError::ProtocolViolation`] for the given collector and id.
    #[must_use]
    pub fn protocol_violation(collector: &CollectorId, request_id: u32) -> Self {
        Self::ProtocolViolation {
            collector: collector.clone(),
            request_id,
        }
    }

    /// Build a [`CollectorError::UnexpectedResponse`].
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::UnexpectedResponse(message.into())
    }

    /// Whether the failure means "nothing found" and is safe to show to an end user.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::InvalidPostcode(_)
                | Self::AuthorityIdentifierNotFound(_)
                | Self::UnsupportedAuthority { .. }
                | Self::AddressesNotFound
                | Self::BinDaysNotFound
        )
    }

    /// Whether the failure points at a caller or implementation bug.
    #[must_use]
    pub fn is_defect(&self) -> bool {
        matches!(
            self,
            Self::ProtocolViolation { .. } | Self::CollectorNotFound(_) | Self::InvalidDateFormat(_)
        )
    }
}
