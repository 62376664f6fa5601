//! Wallet Connectors
//!
//! This module provides a unified interface for interacting with wallets
//! across blockchain ecosystems. All connectors implement the [`Connector`]
//! trait, providing a consistent API for:
//! - Session management (connect, disconnect, accounts)
//! - Chain management (current chain, switching)
//! - Message signing and decentralized identifiers
//! - Lifecycle notifications (`change`, `disconnect`, `error`)

pub mod binding;
pub mod error;
pub mod events;
pub mod filecoin;
pub mod injected;
pub mod keplr;
pub mod solana;

pub use binding::WalletBinding;
pub use error::ConnectorError;
pub use events::{ConnectorEvent, EventEmitter, EventKind, Listener, ListenerId, ProviderBridge};
pub use filecoin::FilecoinConnector;
pub use injected::{InjectedConnector, InjectedOptions};
pub use keplr::KeplrConnector;
pub use solana::SolanaConnector;

use async_trait::async_trait;
use std::sync::Arc;

use crate::chains::{self, Chain};
use crate::injected::InjectedProvider;
use crate::types::{ChainId, ChainRef, ConnectionData, Ecosystem};

/// Base trait for all wallet connectors
#[async_trait]
pub trait Connector: Send + Sync {
    /// Stable identifier (`"metaMask"`, `"phantom"`)
    fn id(&self) -> &str;

    /// Human readable wallet name, also stored as the last used connector
    fn name(&self) -> &str;

    fn ecosystem(&self) -> Ecosystem;

    /// Chain the connector currently targets
    fn chain(&self) -> String;

    /// Whether the wallet's injected object is present
    fn ready(&self) -> bool;

    /// Chains the connector was configured with
    fn chains(&self) -> &[Chain];

    /// Listener registry for `change`/`disconnect`/`error`
    fn events(&self) -> &EventEmitter;

    /// Auto-reconnect capability, if the connector has one
    fn as_reconnectable(&self) -> Option<&dyn Reconnectable> {
        None
    }

    // =========================================================================
    // Session
    // =========================================================================

    /// Request access to the wallet and start listening to its events
    async fn connect(&self, chain_id: Option<ChainId>) -> Result<ConnectionData, ConnectorError>;

    /// Drop the session and stop listening to wallet events
    async fn disconnect(&self) -> Result<(), ConnectorError>;

    /// Accounts the wallet exposes to this application
    async fn get_account(&self) -> Result<Vec<String>, ConnectorError>;

    /// The wallet's injected object
    async fn get_provider(&self) -> Result<Arc<dyn InjectedProvider>, ConnectorError>;

    // =========================================================================
    // Chain
    // =========================================================================

    async fn get_chain_id(&self) -> Result<ChainId, ConnectorError> {
        Err(ConnectorError::Unsupported("get_chain_id".to_string()))
    }

    async fn switch_chain(&self, _chain_id: ChainId) -> Result<Chain, ConnectorError> {
        Err(ConnectorError::SwitchChainNotSupported {
            connector: self.name().to_string(),
        })
    }

    // =========================================================================
    // Signing / identity
    // =========================================================================

    /// Sign a UTF-8 message with the active account
    async fn sign_message(&self, message: &str) -> Result<String, ConnectorError>;

    /// Decentralized identifier for an address; `None` where the
    /// ecosystem has no DID method
    async fn resolve_did(&self, _address: &str) -> Result<Option<String>, ConnectorError> {
        Ok(None)
    }
}

/// Capability used by auto-connect to decide eligibility
#[async_trait]
pub trait Reconnectable: Send + Sync {
    /// Whether the wallet already granted this application access
    async fn is_authorized(&self) -> Result<bool, ConnectorError>;
}

/// Shared handle to a connector
pub type SharedConnector = Arc<dyn Connector>;

/// Pointer identity for connector handles
pub fn same_connector(a: &SharedConnector, b: &SharedConnector) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// Build a chain reference, flagging chains the connector was not configured for
pub fn chain_ref(chains: &[Chain], id: ChainId) -> ChainRef {
    let unsupported = chains::find(chains, &id).is_none();
    ChainRef { id, unsupported }
}

/// `did:pkh` identifier (CAIP-10 account id)
pub fn did_pkh(ecosystem: Ecosystem, chain: &str, address: &str) -> String {
    format!("did:pkh:{}:{}:{}", ecosystem.namespace(), chain, address)
}
