//! Error types for guarded-checkout.
//!
//! [`CheckoutError`] covers every failure a checkout attempt can hit, from missing
//! credentials to a wallet rejecting a signature. [`Failure`] is the condensed form the
//! orchestrator stores on an attempt and shows to the user.

use crate::wallet::WalletError;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Main error type for checkout operations.
#[derive(Error, Debug)]
pub enum CheckoutError {
    /// Missing or malformed endpoint/credential configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Error during HTTP request/response handling
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Error during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Error parsing URL
    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),

    /// A single call attempt exceeded its time budget
    #[error("Timeout exceeded after {0:?}")]
    TimeoutExceeded(Duration),

    /// The analysis gateway answered with an error status
    #[error("Gateway error {status}: {message}")]
    GatewayError {
        /// HTTP status returned by the gateway
        status: u16,
        /// Message reported by the gateway
        message: String,
    },

    /// A collaborator answered with a body we could not interpret
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Charge creation or lookup failed
    #[error("Charge failed: {0}")]
    ChargeError(String),

    /// Transfer preparation failed or returned inconsistent details
    #[error("Transfer preparation failed: {0}")]
    TransferPreparationError(String),

    /// Invalid address format
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Invalid amount
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// No wallet provider was injected
    #[error("Wallet provider not found")]
    ProviderNotFound,

    /// The wallet granted access but exposed no account
    #[error("Wallet returned no accounts")]
    NoAccounts,

    /// The wallet refused to move to the payment network
    #[error("Network switch failed: {0}")]
    ChainSwitchError(WalletError),

    /// Any other wallet-side failure
    #[error("Wallet error: {0}")]
    WalletError(#[from] WalletError),

    /// Webhook verification or parsing failed
    #[error("Webhook error: {0}")]
    WebhookError(String),
}

/// Result type alias for checkout operations.
pub type Result<T> = std::result::Result<T, CheckoutError>;

impl CheckoutError {
    /// True when the failure happened before any application answered: a timeout,
    /// a refused connection, or a request that never produced a status.
    pub fn is_connectivity(&self) -> bool {
        match self {
            CheckoutError::TimeoutExceeded(_) => true,
            CheckoutError::HttpError(e) => {
                e.status().is_none() && (e.is_timeout() || e.is_connect() || e.is_request())
            }
            _ => false,
        }
    }

    /// True when another attempt could succeed: connectivity problems and 5xx statuses.
    pub fn is_retryable(&self) -> bool {
        match self {
            CheckoutError::GatewayError { status, .. } => *status >= 500,
            CheckoutError::HttpError(e) => match e.status() {
                Some(status) => status.is_server_error(),
                None => self.is_connectivity(),
            },
            other => other.is_connectivity(),
        }
    }

    /// Machine-distinguishable category of this error.
    pub fn reason(&self) -> FailureReason {
        match self {
            CheckoutError::ConfigError(_) | CheckoutError::UrlParseError(_) => {
                FailureReason::Configuration
            }
            CheckoutError::HttpError(_) | CheckoutError::TimeoutExceeded(_) => {
                FailureReason::Network
            }
            CheckoutError::GatewayError { .. } => FailureReason::GatewayRejected,
            CheckoutError::JsonError(_) | CheckoutError::InvalidResponse(_) => {
                FailureReason::InvalidResponse
            }
            CheckoutError::ChargeError(_) => FailureReason::ChargeFailed,
            CheckoutError::TransferPreparationError(_)
            | CheckoutError::InvalidAddress(_)
            | CheckoutError::InvalidAmount(_) => FailureReason::TransferPreparationFailed,
            CheckoutError::ProviderNotFound => FailureReason::ProviderNotFound,
            CheckoutError::ChainSwitchError(_) => FailureReason::ChainSwitchFailed,
            CheckoutError::NoAccounts => FailureReason::WalletFailed,
            CheckoutError::WalletError(e) if e.is_user_rejection() => FailureReason::UserRejected,
            CheckoutError::WalletError(_) => FailureReason::WalletFailed,
            CheckoutError::WebhookError(_) => FailureReason::InvalidResponse,
        }
    }

    /// The message shown to the user. Wallet and gateway messages pass through verbatim.
    pub fn user_message(&self) -> String {
        match self {
            CheckoutError::WalletError(e) | CheckoutError::ChainSwitchError(e) => {
                e.message.clone()
            }
            CheckoutError::GatewayError { message, .. } if !message.is_empty() => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Why an attempt stopped short of success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Missing credentials or endpoint
    Configuration,
    /// Timeouts and connection failures
    Network,
    /// The gateway answered with an error status
    GatewayRejected,
    /// The analysis judged the contract unsafe
    UnsafeVerdict,
    /// A collaborator answered with something unreadable
    InvalidResponse,
    /// Charge creation failed
    ChargeFailed,
    /// Transfer preparation failed or was inconsistent
    TransferPreparationFailed,
    /// No wallet provider injected
    ProviderNotFound,
    /// The user rejected a wallet request
    UserRejected,
    /// Switching or adding the payment network failed
    ChainSwitchFailed,
    /// Any other wallet failure
    WalletFailed,
}

/// A caught failure: a reason for code, a message for people.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    /// Category of the failure
    pub reason: FailureReason,
    /// User-facing message
    pub message: String,
}

impl Failure {
    /// Creates a failure from its parts.
    pub fn new(reason: FailureReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

impl From<&CheckoutError> for Failure {
    fn from(err: &CheckoutError) -> Self {
        Failure::new(err.reason(), err.user_message())
    }
}

impl From<CheckoutError> for Failure {
    fn from(err: CheckoutError) -> Self {
        Failure::from(&err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CheckoutError::InvalidAmount("abc".to_string());
        assert_eq!(err.to_string(), "Invalid amount: abc");
    }

    #[test]
    fn test_error_conversion() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: CheckoutError = json_err.into();
        assert!(matches!(err, CheckoutError::JsonError(_)));
        assert_eq!(err.reason(), FailureReason::InvalidResponse);
    }

    #[test]
    fn test_gateway_status_classification() {
        let unavailable = CheckoutError::GatewayError {
            status: 503,
            message: "busy".to_string(),
        };
        assert!(unavailable.is_retryable());
        assert!(!unavailable.is_connectivity());

        for status in [401, 403, 422] {
            let err = CheckoutError::GatewayError {
                status,
                message: String::new(),
            };
            assert!(!err.is_retryable(), "status {status} must not be retried");
        }
    }

    #[test]
    fn test_timeout_is_connectivity() {
        let err = CheckoutError::TimeoutExceeded(Duration::from_secs(30));
        assert!(err.is_connectivity());
        assert!(err.is_retryable());
        assert_eq!(err.reason(), FailureReason::Network);
    }

    #[test]
    fn test_wallet_messages_pass_through() {
        let err = CheckoutError::WalletError(WalletError::new(Some(4001), "User denied"));
        let failure = Failure::from(&err);
        assert_eq!(failure.reason, FailureReason::UserRejected);
        assert_eq!(failure.message, "User denied");
    }

    #[test]
    fn test_config_errors_are_fatal() {
        let err = CheckoutError::ConfigError("missing key".to_string());
        assert!(!err.is_retryable());
        assert_eq!(err.reason(), FailureReason::Configuration);
    }
}
