//! Connector Error Types
//!
//! Unified error handling for all wallet connectors.

use std::fmt;

use crate::injected::{codes, ProviderError};
use crate::types::ChainId;

/// Errors that can occur when interacting with wallet connectors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectorError {
    /// The wallet's injected object is missing
    NotInstalled { wallet: String },

    /// Operation requires an active session
    NotConnected,

    /// Wallet is present but has not granted the permission
    Unauthorized(String),

    /// User declined the wallet prompt
    UserRejected(String),

    /// Wallet API rejected the request
    Provider { code: i64, message: String },

    /// Chain is not configured for the connector or unknown to the wallet
    ChainNotConfigured(ChainId),

    /// Connector cannot switch chains
    SwitchChainNotSupported { connector: String },

    /// Optional operation not implemented by the connector
    Unsupported(String),

    /// Client is already connected to this connector
    AlreadyConnected,

    /// No connector registered under the given id
    ConnectorNotFound(String),

    /// Wallet response could not be interpreted
    InvalidResponse(String),

    /// Persistence failed
    Storage(String),
}

impl fmt::Display for ConnectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectorError::NotInstalled { wallet } => write!(f, "{} is not installed", wallet),
            ConnectorError::NotConnected => write!(f, "Connector not connected"),
            ConnectorError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ConnectorError::UserRejected(msg) => write!(f, "User rejected request: {}", msg),
            ConnectorError::Provider { code, message } => {
                write!(f, "Provider error [{}]: {}", code, message)
            }
            ConnectorError::ChainNotConfigured(id) => write!(f, "Chain {} not configured", id),
            ConnectorError::SwitchChainNotSupported { connector } => {
                write!(f, "{} does not support programmatic chain switching", connector)
            }
            ConnectorError::Unsupported(op) => write!(f, "Operation not supported: {}", op),
            ConnectorError::AlreadyConnected => write!(f, "Connector already connected"),
            ConnectorError::ConnectorNotFound(id) => write!(f, "Connector not found: {}", id),
            ConnectorError::InvalidResponse(msg) => write!(f, "Invalid wallet response: {}", msg),
            ConnectorError::Storage(msg) => write!(f, "Storage error: {}", msg),
        }
    }
}

impl std::error::Error for ConnectorError {}

impl ConnectorError {
    pub fn not_installed(wallet: &str) -> Self {
        ConnectorError::NotInstalled {
            wallet: wallet.to_string(),
        }
    }

    /// Whether the user declined a prompt
    pub fn is_user_rejection(&self) -> bool {
        matches!(self, ConnectorError::UserRejected(_))
    }
}

impl From<ProviderError> for ConnectorError {
    fn from(err: ProviderError) -> Self {
        match err.code {
            codes::USER_REJECTED => ConnectorError::UserRejected(err.message),
            codes::UNAUTHORIZED => ConnectorError::Unauthorized(err.message),
            codes::DISCONNECTED => ConnectorError::NotConnected,
            code => ConnectorError::Provider {
                code,
                message: err.message,
            },
        }
    }
}

impl From<serde_json::Error> for ConnectorError {
    fn from(err: serde_json::Error) -> Self {
        ConnectorError::InvalidResponse(err.to_string())
    }
}

impl From<crate::storage::StorageError> for ConnectorError {
    fn from(err: crate::storage::StorageError) -> Self {
        ConnectorError::Storage(err.to_string())
    }
}
