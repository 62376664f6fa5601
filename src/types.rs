//! Common types shared by connectors and the client
//!
//! These types provide a uniform representation of connection state
//! across EVM, Solana, Cosmos and Filecoin wallets.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::injected::InjectedProvider;

/// Chain identifier
///
/// EVM chains are identified by a number, other ecosystems by a string
/// (`"cosmoshub-4"`, `"mainnet-beta"`, `"f"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChainId {
    Numeric(u64),
    Named(String),
}

impl ChainId {
    /// Parse a chain id as reported by a wallet.
    ///
    /// Hex quantities (`"0x89"`) and decimal strings become numeric ids,
    /// anything else is kept as a named id.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
            if let Ok(n) = u64::from_str_radix(hex, 16) {
                return ChainId::Numeric(n);
            }
        }
        match raw.parse::<u64>() {
            Ok(n) => ChainId::Numeric(n),
            Err(_) => ChainId::Named(raw.to_string()),
        }
    }

    /// Parse a chain id from a JSON value (number or string)
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n.as_u64().map(ChainId::Numeric),
            serde_json::Value::String(s) => Some(ChainId::parse(s)),
            _ => None,
        }
    }

    /// Hex quantity form used by EIP-1193 (`wallet_switchEthereumChain`)
    pub fn to_hex(&self) -> Option<String> {
        match self {
            ChainId::Numeric(n) => Some(format!("0x{:x}", n)),
            ChainId::Named(_) => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            ChainId::Numeric(n) => Some(*n),
            ChainId::Named(_) => None,
        }
    }
}

impl std::fmt::Display for ChainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainId::Numeric(n) => write!(f, "{}", n),
            ChainId::Named(s) => write!(f, "{}", s),
        }
    }
}

impl From<u64> for ChainId {
    fn from(n: u64) -> Self {
        ChainId::Numeric(n)
    }
}

impl From<&str> for ChainId {
    fn from(s: &str) -> Self {
        ChainId::parse(s)
    }
}

/// Reference to the chain a connection is on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainRef {
    pub id: ChainId,
    /// Whether the chain is missing from the connector's configured chains
    #[serde(default)]
    pub unsupported: bool,
}

impl ChainRef {
    pub fn new(id: ChainId) -> Self {
        Self {
            id,
            unsupported: false,
        }
    }
}

/// Snapshot of what a connector last reported
#[derive(Clone, Default)]
pub struct ConnectionData {
    pub account: Option<String>,
    pub chain: Option<ChainRef>,
    pub provider: Option<Arc<dyn InjectedProvider>>,
}

impl ConnectionData {
    pub fn new(account: impl Into<String>, chain: Option<ChainRef>) -> Self {
        Self {
            account: Some(account.into()),
            chain,
            provider: None,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn InjectedProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Shallow merge: every field present in the patch replaces ours
    pub fn merge(&self, patch: &ConnectionPatch) -> Self {
        Self {
            account: patch.account.clone().or_else(|| self.account.clone()),
            chain: patch.chain.clone().or_else(|| self.chain.clone()),
            provider: self.provider.clone(),
        }
    }

    pub fn chain_id(&self) -> Option<&ChainId> {
        self.chain.as_ref().map(|c| &c.id)
    }
}

impl PartialEq for ConnectionData {
    fn eq(&self, other: &Self) -> bool {
        let same_provider = match (&self.provider, &other.provider) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        };
        self.account == other.account && self.chain == other.chain && same_provider
    }
}

impl std::fmt::Debug for ConnectionData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionData")
            .field("account", &self.account)
            .field("chain", &self.chain)
            .field("provider", &self.provider.as_ref().map(|_| "[injected]"))
            .finish()
    }
}

/// Partial connection data carried by a `change` event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionPatch {
    pub account: Option<String>,
    pub chain: Option<ChainRef>,
}

impl ConnectionPatch {
    pub fn account(account: impl Into<String>) -> Self {
        Self {
            account: Some(account.into()),
            chain: None,
        }
    }

    pub fn chain(chain: ChainRef) -> Self {
        Self {
            account: None,
            chain: Some(chain),
        }
    }
}

/// Connection status of the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Disconnected,
    Connecting,
    Reconnecting,
    Connected,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Disconnected => write!(f, "disconnected"),
            Status::Connecting => write!(f, "connecting"),
            Status::Reconnecting => write!(f, "reconnecting"),
            Status::Connected => write!(f, "connected"),
        }
    }
}

/// Blockchain ecosystem a connector belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    Evm,
    Solana,
    Cosmos,
    Filecoin,
}

impl Ecosystem {
    /// CAIP-2 namespace
    pub fn namespace(&self) -> &'static str {
        match self {
            Ecosystem::Evm => "eip155",
            Ecosystem::Solana => "solana",
            Ecosystem::Cosmos => "cosmos",
            Ecosystem::Filecoin => "fil",
        }
    }
}

impl std::fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Ecosystem::Evm => write!(f, "evm"),
            Ecosystem::Solana => write!(f, "solana"),
            Ecosystem::Cosmos => write!(f, "cosmos"),
            Ecosystem::Filecoin => write!(f, "filecoin"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_id_parse() {
        assert_eq!(ChainId::parse("0x89"), ChainId::Numeric(137));
        assert_eq!(ChainId::parse("1"), ChainId::Numeric(1));
        assert_eq!(
            ChainId::parse("cosmoshub-4"),
            ChainId::Named("cosmoshub-4".to_string())
        );
        assert_eq!(ChainId::Numeric(137).to_hex().as_deref(), Some("0x89"));
    }

    #[test]
    fn test_chain_id_serde_untagged() {
        let id: ChainId = serde_json::from_str("5").unwrap();
        assert_eq!(id, ChainId::Numeric(5));
        let id: ChainId = serde_json::from_str("\"mainnet-beta\"").unwrap();
        assert_eq!(id, ChainId::Named("mainnet-beta".to_string()));
    }

    #[test]
    fn test_merge_keeps_unpatched_fields() {
        let data = ConnectionData::new("0x1", Some(ChainRef::new(ChainId::Numeric(1))));
        let merged = data.merge(&ConnectionPatch::account("0x2"));

        assert_eq!(merged.account.as_deref(), Some("0x2"));
        assert_eq!(merged.chain_id(), Some(&ChainId::Numeric(1)));
    }
}
