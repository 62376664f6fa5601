//! multichain-connect - Wallet connection client for EVM, Solana, Cosmos
//! and Filecoin wallets
//!
//! Connectors adapt each wallet's injected API to one [`Connector`]
//! interface; the [`Client`] tracks which connector is active, restores
//! sessions on startup and persists what it needs to do so.

pub mod chains;
pub mod client;
pub mod connectors;
pub mod injected;
pub mod storage;
pub mod types;
pub mod wallet;

#[cfg(test)]
mod testing;

pub use client::{Client, ClientConfig, ClientState};
pub use connectors::{Connector, ConnectorError, ConnectorEvent, SharedConnector};
pub use injected::{InjectedProvider, InjectedRegistry};
pub use types::{ChainId, ChainRef, ConnectionData, Ecosystem, Status};
