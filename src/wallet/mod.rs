//! Local wallet implementations for different blockchain networks
//!
//! Key-backed wallets that answer the same request surface as the
//! browser extensions they stand in for, so connectors can run outside a
//! browser (CLI hosts, tests). Inject them into an
//! [`InjectedRegistry`](crate::injected::InjectedRegistry) under the
//! extension's global name.

pub mod cosmos;
pub mod evm;
pub mod solana;

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;

use crate::injected::{codes, ProviderError, ProviderEvent};

/// Common wallet error type
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Signing failed: {0}")]
    SigningFailed(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Unknown chain: {0}")]
    UnknownChain(String),
}

impl From<WalletError> for ProviderError {
    fn from(err: WalletError) -> Self {
        let code = match err {
            WalletError::UnknownChain(_) => codes::UNRECOGNIZED_CHAIN,
            WalletError::InvalidAddress(_) => codes::INVALID_PARAMS,
            _ => codes::INTERNAL,
        };
        ProviderError::new(code, err.to_string())
    }
}

/// Authorization flag and event channel shared by the local wallets
#[derive(Debug)]
pub(crate) struct Session {
    authorized: AtomicBool,
    events: broadcast::Sender<ProviderEvent>,
}

impl Session {
    pub(crate) fn new() -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            authorized: AtomicBool::new(false),
            events,
        }
    }

    pub(crate) fn is_authorized(&self) -> bool {
        self.authorized.load(Ordering::SeqCst)
    }

    pub(crate) fn set_authorized(&self, authorized: bool) {
        self.authorized.store(authorized, Ordering::SeqCst);
    }

    pub(crate) fn require_authorized(&self) -> Result<(), ProviderError> {
        if self.is_authorized() {
            Ok(())
        } else {
            Err(ProviderError::unauthorized())
        }
    }

    pub(crate) fn emit(&self, event: ProviderEvent) {
        // No receivers just means nobody is connected
        let _ = self.events.send(event);
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }
}

/// Decode a hex payload (`0x` optional); plain text passes through as bytes
pub(crate) fn decode_payload(payload: &str) -> Vec<u8> {
    let stripped = payload.strip_prefix("0x").unwrap_or(payload);
    hex::decode(stripped).unwrap_or_else(|_| payload.as_bytes().to_vec())
}

// Re-export wallet types
pub use cosmos::CosmosWallet;
pub use evm::EvmWallet;
pub use solana::SolanaWallet;
