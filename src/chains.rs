//! Chain descriptors
//!
//! Presets for the chains the bundled connectors know about. Hosts can
//! pass their own descriptors to the client and to each connector.

use serde::{Deserialize, Serialize};

use crate::types::ChainId;

/// Native currency of a chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Chain descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chain {
    pub id: ChainId,
    pub name: String,
    pub network: String,
    #[serde(default)]
    pub rpc_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_currency: Option<NativeCurrency>,
    #[serde(default)]
    pub testnet: bool,
}

impl Chain {
    pub fn new(id: impl Into<ChainId>, name: &str, network: &str) -> Self {
        Self {
            id: id.into(),
            name: name.to_string(),
            network: network.to_string(),
            rpc_urls: Vec::new(),
            native_currency: None,
            testnet: false,
        }
    }

    pub fn with_rpc_url(mut self, url: &str) -> Self {
        self.rpc_urls.push(url.to_string());
        self
    }

    pub fn with_currency(mut self, name: &str, symbol: &str, decimals: u8) -> Self {
        self.native_currency = Some(NativeCurrency {
            name: name.to_string(),
            symbol: symbol.to_string(),
            decimals,
        });
        self
    }

    pub fn testnet(mut self) -> Self {
        self.testnet = true;
        self
    }
}

/// Find a chain by id
pub fn find<'a>(chains: &'a [Chain], id: &ChainId) -> Option<&'a Chain> {
    chains.iter().find(|c| &c.id == id)
}

pub fn mainnet() -> Chain {
    Chain::new(1u64, "Ethereum", "homestead")
        .with_rpc_url("https://cloudflare-eth.com")
        .with_currency("Ether", "ETH", 18)
}

pub fn goerli() -> Chain {
    Chain::new(5u64, "Goerli", "goerli")
        .with_rpc_url("https://rpc.ankr.com/eth_goerli")
        .with_currency("Goerli Ether", "ETH", 18)
        .testnet()
}

pub fn polygon() -> Chain {
    Chain::new(137u64, "Polygon", "matic")
        .with_rpc_url("https://polygon-rpc.com")
        .with_currency("MATIC", "MATIC", 18)
}

pub fn solana_mainnet() -> Chain {
    Chain::new("mainnet-beta", "Solana", "mainnet-beta")
        .with_rpc_url("https://api.mainnet-beta.solana.com")
        .with_currency("Solana", "SOL", 9)
}

pub fn solana_devnet() -> Chain {
    Chain::new("devnet", "Solana Devnet", "devnet")
        .with_rpc_url("https://api.devnet.solana.com")
        .with_currency("Solana", "SOL", 9)
        .testnet()
}

pub fn cosmoshub() -> Chain {
    Chain::new("cosmoshub-4", "Cosmos Hub", "cosmoshub")
        .with_rpc_url("https://rpc.cosmos.network")
        .with_currency("Atom", "ATOM", 6)
}

pub fn filecoin_mainnet() -> Chain {
    Chain::new("f", "Filecoin", "mainnet")
        .with_rpc_url("https://api.node.glif.io/rpc/v1")
        .with_currency("Filecoin", "FIL", 18)
}

/// Default EVM chain list
pub fn evm_defaults() -> Vec<Chain> {
    vec![mainnet(), polygon(), goerli()]
}

/// Every preset
pub fn all() -> Vec<Chain> {
    vec![
        mainnet(),
        polygon(),
        goerli(),
        solana_mainnet(),
        solana_devnet(),
        cosmoshub(),
        filecoin_mainnet(),
    ]
}
