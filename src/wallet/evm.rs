//! EVM Wallet Implementation
//!
//! Key-backed EIP-1193 provider using ethers-rs. Answers the requests
//! MetaMask-style extensions answer (`eth_requestAccounts`,
//! `eth_accounts`, `eth_chainId`, `wallet_switchEthereumChain`,
//! `personal_sign`).

use async_trait::async_trait;
use ethers_core::types::{Address, Signature};
use ethers_signers::{LocalWallet, Signer};
use parking_lot::RwLock;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::debug;

use super::{decode_payload, Session, WalletError};
use crate::injected::{codes, InjectedProvider, ProviderError, ProviderEvent};
use crate::types::ChainId;

/// EVM wallet for signing messages
pub struct EvmWallet {
    /// The underlying wallet (private key)
    wallet: LocalWallet,
    /// Chain ID
    chain_id: RwLock<u64>,
    /// Chains the wallet can switch to
    known_chains: Vec<u64>,
    session: Session,
}

impl EvmWallet {
    /// Create a new wallet from a private key (hex string, with or without 0x prefix)
    pub fn from_private_key(private_key: &str, chain_id: u64) -> Result<Self, WalletError> {
        let key = private_key.strip_prefix("0x").unwrap_or(private_key);

        let wallet: LocalWallet = key
            .parse()
            .map_err(|e| WalletError::InvalidPrivateKey(format!("{}", e)))?;

        Ok(Self::from_wallet(wallet, chain_id))
    }

    /// Generate a fresh random key
    pub fn random(chain_id: u64) -> Self {
        Self::from_wallet(LocalWallet::new(&mut rand::thread_rng()), chain_id)
    }

    fn from_wallet(wallet: LocalWallet, chain_id: u64) -> Self {
        Self {
            wallet: wallet.with_chain_id(chain_id),
            chain_id: RwLock::new(chain_id),
            known_chains: vec![1, 5, 137],
            session: Session::new(),
        }
    }

    /// Pre-approve this application, as if the user connected before
    pub fn trusted(self, trusted: bool) -> Self {
        self.session.set_authorized(trusted);
        self
    }

    /// Replace the list of chains the wallet accepts in `wallet_switchEthereumChain`
    pub fn with_known_chains(mut self, chains: Vec<u64>) -> Self {
        self.known_chains = chains;
        self
    }

    /// Get the wallet address
    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    /// Get the checksummed address as a string
    pub fn address_string(&self) -> String {
        ethers_core::utils::to_checksum(&self.wallet.address(), None)
    }

    /// Hex encoded private key
    pub fn private_key_hex(&self) -> String {
        format!("0x{}", hex::encode(self.wallet.signer().to_bytes()))
    }

    /// Get the chain ID
    pub fn chain_id(&self) -> u64 {
        *self.chain_id.read()
    }

    /// Sign a message (personal_sign / eth_sign format)
    pub async fn sign_message(&self, message: &[u8]) -> Result<Signature, WalletError> {
        self.wallet
            .sign_message(message)
            .await
            .map_err(|e| WalletError::SigningFailed(format!("{}", e)))
    }

    /// Simulate a wallet-side event (user switched account, locked wallet)
    pub fn emit(&self, event: ProviderEvent) {
        self.session.emit(event);
    }

    fn switch_chain(&self, params: &Value) -> Result<Value, ProviderError> {
        let raw = &params[0]["chainId"];
        let chain_id = ChainId::from_json(raw)
            .and_then(|id| id.as_u64())
            .ok_or_else(|| ProviderError::invalid_params("chainId must be a hex quantity"))?;

        if !self.known_chains.contains(&chain_id) {
            return Err(ProviderError::new(
                codes::UNRECOGNIZED_CHAIN,
                format!("Unrecognized chain ID 0x{:x}", chain_id),
            ));
        }

        let changed = {
            let mut current = self.chain_id.write();
            let changed = *current != chain_id;
            *current = chain_id;
            changed
        };
        if changed {
            self.session
                .emit(ProviderEvent::ChainChanged(format!("0x{:x}", chain_id)));
        }
        Ok(Value::Null)
    }

    async fn personal_sign(&self, params: &Value) -> Result<Value, ProviderError> {
        self.session.require_authorized()?;

        let payload = params[0]
            .as_str()
            .ok_or_else(|| ProviderError::invalid_params("missing message"))?;
        let signer = params[1]
            .as_str()
            .ok_or_else(|| ProviderError::invalid_params("missing address"))?;
        let signer: Address = signer
            .parse()
            .map_err(|_| WalletError::InvalidAddress(signer.to_string()))?;
        if signer != self.address() {
            return Err(ProviderError::unauthorized());
        }

        let signature = self.sign_message(&decode_payload(payload)).await?;
        Ok(json!(format!("0x{}", hex::encode(signature.to_vec()))))
    }
}

#[async_trait]
impl InjectedProvider for EvmWallet {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        debug!("EVM wallet request: {}", method);
        match method {
            "eth_requestAccounts" => {
                self.session.set_authorized(true);
                Ok(json!([self.address_string()]))
            }
            "eth_accounts" => {
                if self.session.is_authorized() {
                    Ok(json!([self.address_string()]))
                } else {
                    Ok(json!([]))
                }
            }
            "eth_chainId" => Ok(json!(format!("0x{:x}", self.chain_id()))),
            "wallet_switchEthereumChain" => self.switch_chain(&params),
            "personal_sign" => self.personal_sign(&params).await,
            "wallet_revokePermissions" => {
                self.session.set_authorized(false);
                self.session.emit(ProviderEvent::AccountsChanged(Vec::new()));
                Ok(Value::Null)
            }
            other => Err(ProviderError::unsupported_method(other)),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.session.subscribe()
    }
}

impl std::fmt::Debug for EvmWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvmWallet")
            .field("address", &self.address_string())
            .field("chain_id", &self.chain_id())
            .finish()
    }
}
