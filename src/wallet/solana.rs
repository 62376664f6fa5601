//! Solana Wallet Implementation
//!
//! Key-backed stand-in for Phantom/Solflare using ed25519-dalek for
//! signing. Answers `connect`, `disconnect`, `publicKey` and
//! `signMessage`.

use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::debug;

use super::{decode_payload, Session, WalletError};
use crate::injected::{InjectedProvider, ProviderError, ProviderEvent};

/// Solana wallet for signing messages
pub struct SolanaWallet {
    signing_key: SigningKey,
    /// Public key (32 bytes)
    pubkey: [u8; 32],
    session: Session,
}

impl SolanaWallet {
    /// Create a wallet from a 32 byte secret or a 64 byte keypair (secret + public)
    pub fn from_private_key(private_key: &[u8]) -> Result<Self, WalletError> {
        let signing_key = match private_key.len() {
            32 => {
                let mut secret = [0u8; 32];
                secret.copy_from_slice(private_key);
                SigningKey::from_bytes(&secret)
            }
            64 => {
                let mut keypair = [0u8; 64];
                keypair.copy_from_slice(private_key);
                SigningKey::from_keypair_bytes(&keypair)
                    .map_err(|e| WalletError::InvalidPrivateKey(format!("{}", e)))?
            }
            n => {
                return Err(WalletError::InvalidPrivateKey(format!(
                    "Expected 32 or 64 bytes, got {}",
                    n
                )))
            }
        };

        Ok(Self::from_signing_key(signing_key))
    }

    /// Create a wallet from a base58 encoded private key
    pub fn from_base58(private_key: &str) -> Result<Self, WalletError> {
        let bytes = bs58::decode(private_key)
            .into_vec()
            .map_err(|e| WalletError::InvalidPrivateKey(format!("Invalid base58: {}", e)))?;

        Self::from_private_key(&bytes)
    }

    /// Generate a fresh random keypair
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::generate(&mut rand::rngs::OsRng))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let pubkey = signing_key.verifying_key().to_bytes();
        Self {
            signing_key,
            pubkey,
            session: Session::new(),
        }
    }

    /// Pre-approve this application, as if the user connected before
    pub fn trusted(self, trusted: bool) -> Self {
        self.session.set_authorized(trusted);
        self
    }

    /// Get the public key as a base58 string
    pub fn pubkey_string(&self) -> String {
        bs58::encode(&self.pubkey).into_string()
    }

    /// Get the public key bytes
    pub fn pubkey(&self) -> &[u8; 32] {
        &self.pubkey
    }

    /// 64 byte keypair, base58 encoded (the format Solana CLIs export)
    pub fn keypair_base58(&self) -> String {
        bs58::encode(self.signing_key.to_keypair_bytes()).into_string()
    }

    /// Sign a message using ed25519
    pub fn sign_bytes(&self, message: &[u8]) -> Vec<u8> {
        self.signing_key.sign(message).to_bytes().to_vec()
    }

    /// Simulate a wallet-side event
    pub fn emit(&self, event: ProviderEvent) {
        self.session.emit(event);
    }
}

#[async_trait]
impl InjectedProvider for SolanaWallet {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        debug!("Solana wallet request: {}", method);
        match method {
            "connect" => {
                let only_if_trusted = params["onlyIfTrusted"].as_bool().unwrap_or(false);
                if only_if_trusted && !self.session.is_authorized() {
                    return Err(ProviderError::user_rejected());
                }
                self.session.set_authorized(true);
                Ok(json!({ "publicKey": self.pubkey_string() }))
            }
            "disconnect" => {
                if self.session.is_authorized() {
                    self.session.set_authorized(false);
                    self.session.emit(ProviderEvent::Disconnect);
                }
                Ok(Value::Null)
            }
            "publicKey" => {
                if self.session.is_authorized() {
                    Ok(json!(self.pubkey_string()))
                } else {
                    Ok(Value::Null)
                }
            }
            "signMessage" => {
                self.session.require_authorized()?;
                let message = params["message"]
                    .as_str()
                    .ok_or_else(|| ProviderError::invalid_params("missing message"))?;
                let signature = self.sign_bytes(&decode_payload(message));
                Ok(json!({
                    "signature": bs58::encode(signature).into_string(),
                    "publicKey": self.pubkey_string(),
                }))
            }
            other => Err(ProviderError::unsupported_method(other)),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.session.subscribe()
    }
}

impl std::fmt::Debug for SolanaWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolanaWallet")
            .field("pubkey", &self.pubkey_string())
            .finish()
    }
}
