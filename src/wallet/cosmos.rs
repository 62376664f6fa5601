//! Cosmos Wallet Implementation
//!
//! Key-backed stand-in for Keplr on Cosmos SDK chains. One secp256k1 key
//! yields one bech32 address per chain prefix. Answers `enable`,
//! `disable`, `getKey` and `signArbitrary`.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use k256::ecdsa::{signature::Signer, Signature, SigningKey};
use parking_lot::RwLock;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::broadcast;
use tracing::debug;

use super::{Session, WalletError};
use crate::injected::{InjectedProvider, ProviderError, ProviderEvent};

/// Cosmos wallet for signing messages
pub struct CosmosWallet {
    signing_key: SigningKey,
    /// Public key bytes (33 bytes compressed)
    public_key: Vec<u8>,
    /// Chain id -> bech32 prefix
    prefixes: BTreeMap<String, String>,
    /// Chains the user enabled for this application
    enabled: RwLock<BTreeSet<String>>,
    session: Session,
}

impl CosmosWallet {
    /// Create a new wallet from a private key (hex encoded)
    pub fn from_private_key(private_key: &str) -> Result<Self, WalletError> {
        let key = private_key.strip_prefix("0x").unwrap_or(private_key);

        let private_key_bytes = hex::decode(key)
            .map_err(|e| WalletError::InvalidPrivateKey(format!("Invalid hex: {}", e)))?;

        if private_key_bytes.len() != 32 {
            return Err(WalletError::InvalidPrivateKey(
                "Private key must be 32 bytes".to_string(),
            ));
        }

        let signing_key = SigningKey::from_slice(&private_key_bytes)
            .map_err(|e| WalletError::InvalidPrivateKey(format!("{}", e)))?;

        Ok(Self::from_signing_key(signing_key))
    }

    /// Generate a fresh random key
    pub fn random() -> Self {
        Self::from_signing_key(SigningKey::random(&mut rand::rngs::OsRng))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let public_key = signing_key
            .verifying_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec();

        let prefixes = [
            ("cosmoshub-4", "cosmos"),
            ("osmosis-1", "osmo"),
            ("dydx-mainnet-1", "dydx"),
        ]
        .into_iter()
        .map(|(chain, prefix)| (chain.to_string(), prefix.to_string()))
        .collect();

        Self {
            signing_key,
            public_key,
            prefixes,
            enabled: RwLock::new(BTreeSet::new()),
            session: Session::new(),
        }
    }

    /// Register a chain and its bech32 prefix
    pub fn with_chain(mut self, chain_id: &str, prefix: &str) -> Self {
        self.prefixes
            .insert(chain_id.to_string(), prefix.to_string());
        self
    }

    /// Pre-enable a chain, as if the user approved it before
    pub fn trusted_on(self, chain_id: &str) -> Self {
        self.enabled.write().insert(chain_id.to_string());
        self.session.set_authorized(true);
        self
    }

    /// Get the bech32 address for a prefix
    pub fn address(&self, prefix: &str) -> Result<String, WalletError> {
        // Hash the public key with SHA256
        let sha_hash = Sha256::digest(&self.public_key);

        // Take first 20 bytes as the account id
        let address_bytes = &sha_hash[..20];

        bech32::encode(prefix, bech32::ToBase32::to_base32(&address_bytes), bech32::Variant::Bech32)
            .map_err(|e| WalletError::InvalidAddress(format!("Bech32 encoding failed: {}", e)))
    }

    /// Get the public key bytes
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Hex encoded private key
    pub fn private_key_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    /// Sign a message (returns compact signature bytes)
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        let message_hash = Sha256::digest(message);
        let signature: Signature = self.signing_key.sign(&message_hash);
        signature.to_bytes().to_vec()
    }

    /// Simulate a wallet-side event (Keplr's keystore change)
    pub fn emit(&self, event: ProviderEvent) {
        self.session.emit(event);
    }

    fn prefix(&self, chain_id: &str) -> Result<&str, WalletError> {
        self.prefixes
            .get(chain_id)
            .map(String::as_str)
            .ok_or_else(|| WalletError::UnknownChain(chain_id.to_string()))
    }

    fn require_enabled(&self, chain_id: &str) -> Result<(), ProviderError> {
        if self.enabled.read().contains(chain_id) {
            Ok(())
        } else {
            Err(ProviderError::unauthorized())
        }
    }

    fn chain_param(params: &Value) -> Result<String, ProviderError> {
        params[0]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ProviderError::invalid_params("missing chain id"))
    }
}

#[async_trait]
impl InjectedProvider for CosmosWallet {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        debug!("Cosmos wallet request: {}", method);
        match method {
            "enable" => {
                let chain_id = Self::chain_param(&params)?;
                self.prefix(&chain_id)?;
                self.enabled.write().insert(chain_id);
                self.session.set_authorized(true);
                Ok(Value::Null)
            }
            "disable" => {
                let chain_id = Self::chain_param(&params)?;
                let now_empty = {
                    let mut enabled = self.enabled.write();
                    enabled.remove(&chain_id);
                    enabled.is_empty()
                };
                if now_empty {
                    self.session.set_authorized(false);
                }
                Ok(Value::Null)
            }
            "getKey" => {
                let chain_id = Self::chain_param(&params)?;
                self.require_enabled(&chain_id)?;
                let address = self.address(self.prefix(&chain_id)?)?;
                Ok(json!({
                    "name": "local",
                    "algo": "secp256k1",
                    "pubKey": hex::encode(&self.public_key),
                    "bech32Address": address,
                }))
            }
            "signArbitrary" => {
                let chain_id = Self::chain_param(&params)?;
                self.require_enabled(&chain_id)?;
                let signer = params[1]
                    .as_str()
                    .ok_or_else(|| ProviderError::invalid_params("missing signer"))?;
                if signer != self.address(self.prefix(&chain_id)?)? {
                    return Err(ProviderError::unauthorized());
                }
                let data = params[2]
                    .as_str()
                    .ok_or_else(|| ProviderError::invalid_params("missing data"))?;

                Ok(json!({
                    "signature": STANDARD.encode(self.sign(data.as_bytes())),
                    "pub_key": {
                        "type": "tendermint/PubKeySecp256k1",
                        "value": STANDARD.encode(&self.public_key),
                    },
                }))
            }
            other => Err(ProviderError::unsupported_method(other)),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.session.subscribe()
    }
}

impl std::fmt::Debug for CosmosWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CosmosWallet")
            .field("chains", &self.prefixes.keys().collect::<Vec<_>>())
            .finish()
    }
}
