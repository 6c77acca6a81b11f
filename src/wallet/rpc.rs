//! [`WalletProvider`] over an EIP-1193-style JSON-RPC endpoint.
//!
//! Works against anything that answers the wallet methods over HTTP: a signer bridge,
//! a local dev node with unlocked accounts, or a wallet's RPC relay. Provider error
//! codes are passed through untouched, so `4001` and `4902` keep their meaning.

use crate::errors::Result;
use crate::types::TransactionRequest;
use crate::wallet::{NetworkDefinition, WalletError, WalletProvider};
use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider, ProviderError, RpcError};
use serde_json::{json, Value};
use tracing::debug;

/// Wallet backed by a JSON-RPC endpoint.
#[derive(Debug, Clone)]
pub struct RpcWallet {
    provider: Provider<Http>,
}

impl RpcWallet {
    /// Connects to the wallet endpoint at `url`.
    ///
    /// # Examples
    ///
    /// ```
    /// use guarded_checkout::wallet::rpc::RpcWallet;
    ///
    /// let wallet = RpcWallet::new("http://localhost:8545").unwrap();
    /// # let _ = wallet;
    /// ```
    pub fn new(url: &str) -> Result<Self> {
        let provider = Provider::<Http>::try_from(url)?;
        Ok(Self { provider })
    }

    /// Chain the endpoint is currently on.
    pub async fn chain_id(&self) -> std::result::Result<u64, WalletError> {
        self.provider
            .get_chainid()
            .await
            .map(|id| id.as_u64())
            .map_err(wallet_error)
    }
}

#[async_trait]
impl WalletProvider for RpcWallet {
    async fn request_accounts(&self) -> std::result::Result<Vec<String>, WalletError> {
        self.provider
            .request::<_, Vec<String>>("eth_requestAccounts", ())
            .await
            .map_err(wallet_error)
    }

    async fn switch_chain(&self, chain_id: u64) -> std::result::Result<(), WalletError> {
        // Dev nodes do not implement the switch method.
        if self.chain_id().await.ok() == Some(chain_id) {
            debug!(chain_id, "already on requested chain");
            return Ok(());
        }
        let params = [json!({ "chainId": crate::utils::chain_id_hex(chain_id) })];
        debug!(?params, "wallet_switchEthereumChain");
        self.provider
            .request::<_, Value>("wallet_switchEthereumChain", params)
            .await
            .map(|_| ())
            .map_err(wallet_error)
    }

    async fn add_chain(&self, network: &NetworkDefinition) -> std::result::Result<(), WalletError> {
        let params = [network.add_chain_parameter()];
        self.provider
            .request::<_, Value>("wallet_addEthereumChain", params)
            .await
            .map(|_| ())
            .map_err(wallet_error)
    }

    async fn send_transaction(
        &self,
        tx: &TransactionRequest,
    ) -> std::result::Result<String, WalletError> {
        self.provider
            .request::<_, String>("eth_sendTransaction", [tx])
            .await
            .map_err(wallet_error)
    }
}

/// Keeps the JSON-RPC error code when there is one.
fn wallet_error(err: ProviderError) -> WalletError {
    match err.as_error_response() {
        Some(response) => WalletError::new(Some(response.code), response.message.clone()),
        None => WalletError::new(None, err.to_string()),
    }
}
