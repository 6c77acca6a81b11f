//! Wallet provider seam.
//!
//! The checkout never talks to a chain directly. It asks an injected
//! [`WalletProvider`] for accounts, a network switch and a transaction submission,
//! the same capability surface a browser wallet exposes. [`rpc::RpcWallet`] implements
//! it over JSON-RPC; tests substitute fakes.

pub mod rpc;

use crate::errors::{CheckoutError, Result};
use crate::types::TransactionRequest;
use crate::utils::{chain_id_hex, parse_address};
use async_trait::async_trait;
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, instrument, warn};

/// EIP-1193 code for a request the user rejected.
pub const USER_REJECTED: i64 = 4001;

/// Code wallets return when asked to switch to a chain they do not know.
pub const UNRECOGNIZED_CHAIN: i64 = 4902;

/// Error reported by a wallet provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletError {
    /// Provider error code, when the provider sent one
    pub code: Option<i64>,

    /// Provider message, kept verbatim
    pub message: String,
}

impl WalletError {
    /// Creates a wallet error.
    pub fn new(code: Option<i64>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Whether the user declined the request in their wallet.
    pub fn is_user_rejection(&self) -> bool {
        self.code == Some(USER_REJECTED)
    }

    /// Whether the wallet does not know the requested chain.
    pub fn is_unrecognized_chain(&self) -> bool {
        self.code == Some(UNRECOGNIZED_CHAIN)
    }
}

impl fmt::Display for WalletError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code {})", self.message, code),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for WalletError {}

/// Native currency of a network, as wallets expect it in `wallet_addEthereumChain`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NativeCurrency {
    /// Currency name
    pub name: String,
    /// Ticker
    pub symbol: String,
    /// Decimals
    pub decimals: u8,
}

/// Everything a wallet needs to add a network it does not know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkDefinition {
    /// Chain id
    pub chain_id: u64,
    /// Display name
    pub name: String,
    /// Native currency
    pub native_currency: NativeCurrency,
    /// JSON-RPC endpoints
    pub rpc_urls: Vec<String>,
    /// Block explorers
    pub block_explorer_urls: Vec<String>,
}

/// `wallet_addEthereumChain` parameter object.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AddChainParameter {
    /// Hex chain id
    pub chain_id: String,
    /// Display name
    pub chain_name: String,
    /// Native currency
    pub native_currency: NativeCurrency,
    /// JSON-RPC endpoints
    pub rpc_urls: Vec<String>,
    /// Block explorers
    pub block_explorer_urls: Vec<String>,
}

impl NetworkDefinition {
    /// Ethereum Sepolia, where the demo stablecoin lives.
    pub fn sepolia() -> Self {
        Self {
            chain_id: 11_155_111,
            name: "Sepolia".to_string(),
            native_currency: NativeCurrency {
                name: "Sepolia Ether".to_string(),
                symbol: "SepoliaETH".to_string(),
                decimals: 18,
            },
            rpc_urls: vec![
                "https://rpc.sepolia.org".to_string(),
                "https://ethereum-sepolia-rpc.publicnode.com".to_string(),
            ],
            block_explorer_urls: vec!["https://sepolia.etherscan.io".to_string()],
        }
    }

    /// Chain id as a hex quantity.
    pub fn chain_id_hex(&self) -> String {
        chain_id_hex(self.chain_id)
    }

    /// Parameter object for `wallet_addEthereumChain`.
    pub fn add_chain_parameter(&self) -> AddChainParameter {
        AddChainParameter {
            chain_id: self.chain_id_hex(),
            chain_name: self.name.clone(),
            native_currency: self.native_currency.clone(),
            rpc_urls: self.rpc_urls.clone(),
            block_explorer_urls: self.block_explorer_urls.clone(),
        }
    }
}

/// Capabilities of an injected wallet.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Asks for (or reads) the authorized accounts.
    async fn request_accounts(&self) -> std::result::Result<Vec<String>, WalletError>;

    /// Asks the wallet to move to `chain_id`.
    ///
    /// Fails with [`UNRECOGNIZED_CHAIN`] when the wallet has no definition for it.
    async fn switch_chain(&self, chain_id: u64) -> std::result::Result<(), WalletError>;

    /// Registers a network definition with the wallet.
    async fn add_chain(&self, network: &NetworkDefinition) -> std::result::Result<(), WalletError>;

    /// Signs and submits a transaction, returning its hash.
    async fn send_transaction(
        &self,
        tx: &TransactionRequest,
    ) -> std::result::Result<String, WalletError>;
}

/// Account and network confirmed for one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletSession {
    /// Connected account
    pub account: Address,
    /// Confirmed chain id
    pub chain_id: u64,
}

impl WalletSession {
    /// Connects to the wallet and puts it on `network`.
    ///
    /// Requests accounts, then switches chains. An unrecognized-chain error triggers
    /// one `add_chain` request; any other switch error is fatal.
    #[instrument(skip_all, fields(chain_id = network.chain_id))]
    pub async fn establish(
        provider: &dyn WalletProvider,
        network: &NetworkDefinition,
    ) -> Result<Self> {
        let accounts = provider.request_accounts().await?;
        let account = accounts.first().ok_or(CheckoutError::NoAccounts)?;
        let account = parse_address(account)?;

        match provider.switch_chain(network.chain_id).await {
            Ok(()) => {}
            Err(err) if err.is_unrecognized_chain() => {
                warn!(network = %network.name, "wallet does not know the network, adding it");
                provider
                    .add_chain(network)
                    .await
                    .map_err(CheckoutError::ChainSwitchError)?;
            }
            Err(err) => return Err(CheckoutError::ChainSwitchError(err)),
        }

        info!(account = ?account, "wallet connected");
        Ok(Self {
            account,
            chain_id: network.chain_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    const ACCOUNT: &str = "0x742d35cc6634c0532925a3b844bc9e7595f0beb0";

    struct ScriptedWallet {
        accounts: Vec<String>,
        switch_error: Option<WalletError>,
        add_error: Option<WalletError>,
        calls: Mutex<Vec<&'static str>>,
    }

    impl ScriptedWallet {
        fn new(switch_error: Option<WalletError>) -> Self {
            Self {
                accounts: vec![ACCOUNT.to_string()],
                switch_error,
                add_error: None,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl WalletProvider for ScriptedWallet {
        async fn request_accounts(&self) -> std::result::Result<Vec<String>, WalletError> {
            self.calls.lock().unwrap().push("accounts");
            Ok(self.accounts.clone())
        }

        async fn switch_chain(&self, _chain_id: u64) -> std::result::Result<(), WalletError> {
            self.calls.lock().unwrap().push("switch");
            self.switch_error.clone().map_or(Ok(()), Err)
        }

        async fn add_chain(
            &self,
            _network: &NetworkDefinition,
        ) -> std::result::Result<(), WalletError> {
            self.calls.lock().unwrap().push("add");
            self.add_error.clone().map_or(Ok(()), Err)
        }

        async fn send_transaction(
            &self,
            _tx: &TransactionRequest,
        ) -> std::result::Result<String, WalletError> {
            self.calls.lock().unwrap().push("send");
            Ok("0xhash".to_string())
        }
    }

    #[test]
    fn test_add_chain_parameter() {
        let param = NetworkDefinition::sepolia().add_chain_parameter();
        let json = serde_json::to_value(&param).unwrap();
        assert_eq!(json["chainId"], "0xaa36a7");
        assert_eq!(json["chainName"], "Sepolia");
        assert_eq!(json["nativeCurrency"]["decimals"], 18);
        assert!(json["blockExplorerUrls"][0]
            .as_str()
            .unwrap()
            .contains("etherscan"));
    }

    #[tokio::test]
    async fn test_session_on_known_chain() {
        let wallet = ScriptedWallet::new(None);
        let session = WalletSession::establish(&wallet, &NetworkDefinition::sepolia())
            .await
            .unwrap();
        assert_eq!(session.chain_id, 11_155_111);
        assert_eq!(wallet.calls(), vec!["accounts", "switch"]);
    }

    #[tokio::test]
    async fn test_unrecognized_chain_is_added() {
        let wallet = ScriptedWallet::new(Some(WalletError::new(
            Some(UNRECOGNIZED_CHAIN),
            "Unrecognized chain ID",
        )));
        WalletSession::establish(&wallet, &NetworkDefinition::sepolia())
            .await
            .unwrap();
        assert_eq!(wallet.calls(), vec!["accounts", "switch", "add"]);
    }

    #[tokio::test]
    async fn test_other_switch_errors_are_fatal() {
        let wallet = ScriptedWallet::new(Some(WalletError::new(Some(-32002), "Request pending")));
        let err = WalletSession::establish(&wallet, &NetworkDefinition::sepolia())
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::ChainSwitchError(_)));
        assert_eq!(wallet.calls(), vec!["accounts", "switch"]);
    }

    #[tokio::test]
    async fn test_empty_accounts() {
        let mut wallet = ScriptedWallet::new(None);
        wallet.accounts.clear();
        let err = WalletSession::establish(&wallet, &NetworkDefinition::sepolia())
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::NoAccounts));
    }
}
