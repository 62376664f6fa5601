//! Injected wallet providers
//!
//! Browser wallets expose themselves as objects attached to the page's
//! global scope (`window.ethereum`, `window.phantom.solana`,
//! `window.keplr`). [`InjectedRegistry`] plays the role of that global
//! scope: hosts register provider objects under their global name and
//! connectors look them up.
//!
//! Every provider speaks a JSON request/response surface and publishes
//! wallet events on a broadcast channel.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Well-known global names
pub mod globals {
    pub const ETHEREUM: &str = "ethereum";
    pub const COINBASE: &str = "coinbaseWalletExtension";
    pub const PHANTOM: &str = "phantom.solana";
    pub const SOLFLARE: &str = "solflare";
    pub const KEPLR: &str = "keplr";
    pub const FILECOIN: &str = "filecoin";
}

/// EIP-1193 style provider error codes
pub mod codes {
    pub const USER_REJECTED: i64 = 4001;
    pub const UNAUTHORIZED: i64 = 4100;
    pub const UNSUPPORTED_METHOD: i64 = 4200;
    pub const DISCONNECTED: i64 = 4900;
    pub const UNRECOGNIZED_CHAIN: i64 = 4902;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL: i64 = -32603;
}

/// Error returned by an injected provider
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Provider error [{code}]: {message}")]
pub struct ProviderError {
    pub code: i64,
    pub message: String,
}

impl ProviderError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn user_rejected() -> Self {
        Self::new(codes::USER_REJECTED, "User rejected the request")
    }

    pub fn unauthorized() -> Self {
        Self::new(
            codes::UNAUTHORIZED,
            "The requested account has not been authorized",
        )
    }

    pub fn unsupported_method(method: &str) -> Self {
        Self::new(
            codes::UNSUPPORTED_METHOD,
            format!("Method not supported: {}", method),
        )
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(codes::INVALID_PARAMS, message)
    }
}

/// Event emitted by a wallet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    AccountsChanged(Vec<String>),
    ChainChanged(String),
    Disconnect,
}

/// Object a wallet injects into the global scope
#[async_trait]
pub trait InjectedProvider: Send + Sync {
    /// Send a request to the wallet
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError>;

    /// Subscribe to the wallet's event stream
    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent>;
}

/// Global scope holding injected providers
#[derive(Default)]
pub struct InjectedRegistry {
    providers: RwLock<HashMap<String, Arc<dyn InjectedProvider>>>,
}

impl InjectedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a provider under a global name, replacing any previous one
    pub fn inject(&self, global: &str, provider: Arc<dyn InjectedProvider>) {
        debug!("Injecting provider at window.{}", global);
        self.providers.write().insert(global.to_string(), provider);
    }

    pub fn remove(&self, global: &str) -> Option<Arc<dyn InjectedProvider>> {
        self.providers.write().remove(global)
    }

    pub fn get(&self, global: &str) -> Option<Arc<dyn InjectedProvider>> {
        self.providers.read().get(global).cloned()
    }

    pub fn contains(&self, global: &str) -> bool {
        self.providers.read().contains_key(global)
    }

    /// Names of every injected global, sorted
    pub fn globals(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for InjectedRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InjectedRegistry")
            .field("globals", &self.globals())
            .finish()
    }
}

/// Read a string out of a provider response
pub(crate) fn expect_str(value: &Value, what: &str) -> Result<String, ProviderError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ProviderError::new(codes::INTERNAL, format!("Expected {} string", what)))
}

/// Read a string array out of a provider response
pub(crate) fn expect_str_array(value: &Value, what: &str) -> Result<Vec<String>, ProviderError> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .ok_or_else(|| ProviderError::new(codes::INTERNAL, format!("Expected {} array", what)))
}
