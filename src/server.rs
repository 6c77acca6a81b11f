//! Server-side glue for a storefront.
//!
//! Framework-agnostic handlers for the endpoints a checkout talks to: contract
//! analysis, charge creation and lookup, and transfer preparation. Each handler
//! returns a [`Reply`] carrying an HTTP status and a JSON body; mounting them on a
//! router is left to the application.

use crate::analysis::{AnalysisGateway, ContractTarget};
use crate::errors::{CheckoutError, Result};
use crate::transfer::TransferTerms;
use crate::types::{
    AnalyzeEnvelope, ChargeDetails, ChargeMetadata, ChargeRequest, ChargeResponse,
    ChargeStatusResponse, ChargeSummary, ContractSubmission, RawVerdict, TransferRequest,
    TransferResponse,
};
use crate::utils::{base_url, endpoint_url, scale_price};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, instrument, warn};
use url::Url;

/// Commerce API endpoint.
pub const COMMERCE_API_URL: &str = "https://api.commerce.coinbase.com";

/// Commerce API version header value.
pub const COMMERCE_API_VERSION: &str = "2018-03-22";

/// Merchant wallet used when nothing else is configured.
pub const DEMO_MERCHANT_ADDRESS: &str = "0xb43c9f0f2bb65a37761e7867a6f1903799f45d65";

/// Name of the payment contract the checkout analyzes.
pub const TRANSFERS_CONTRACT_NAME: &str = "Coinbase Transfers Contract";

/// Source of the payment contract the checkout analyzes.
pub const TRANSFERS_CONTRACT_SOURCE: &str = include_str!("contracts/Transfers.sol");

/// Name of the contract embedded in demo charges.
pub const DEMO_CONTRACT_NAME: &str = "DemoSmartContract";

/// Source of the contract embedded in demo charges.
pub const DEMO_CONTRACT_SOURCE: &str = r#"pragma solidity ^0.8.0;
contract DemoSmartContract {
    address public owner;
    mapping(address => uint256) public balances;

    constructor() {
        owner = msg.sender;
    }

    function deposit() public payable {
        balances[msg.sender] += msg.value;
    }

    function withdraw(uint256 amount) public {
        require(balances[msg.sender] >= amount, "Insufficient balance");
        balances[msg.sender] -= amount;
        payable(msg.sender).transfer(amount);
    }
}"#;

/// Status plus JSON body, for whatever framework mounts the handler.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply<T> {
    /// HTTP status
    pub status: u16,
    /// Response body
    pub body: T,
}

impl<T> Reply<T> {
    fn ok(body: T) -> Self {
        Self { status: 200, body }
    }

    fn with_status(status: u16, body: T) -> Self {
        Self { status, body }
    }
}

/// Merchant settings shared by the handlers.
#[derive(Debug, Clone)]
pub struct MerchantConfig {
    /// What direct transfers pay with, and to whom
    pub terms: TransferTerms,

    /// Contract analyzed before payment
    pub analyzed_contract: ContractSubmission,

    /// Contract embedded in charge metadata for the webhook to analyze
    pub charge_contract: ContractSubmission,

    /// Commerce API key
    pub commerce_api_key: Option<String>,

    /// Shared secret for webhook signatures
    pub webhook_secret: Option<String>,
}

impl MerchantConfig {
    /// PYUSD on Sepolia, paying `recipient`. Analysis targets the Transfers contract and
    /// charges carry the demo contract.
    pub fn new(recipient: &str) -> Result<Self> {
        Ok(Self {
            terms: TransferTerms::pyusd_sepolia(Some(recipient))?,
            analyzed_contract: submission(TRANSFERS_CONTRACT_NAME, TRANSFERS_CONTRACT_SOURCE),
            charge_contract: submission(DEMO_CONTRACT_NAME, DEMO_CONTRACT_SOURCE),
            commerce_api_key: None,
            webhook_secret: None,
        })
    }

    /// Sets the Commerce API key.
    pub fn with_commerce_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.commerce_api_key = Some(api_key.into());
        self
    }

    /// Sets the webhook secret.
    pub fn with_webhook_secret(mut self, secret: impl Into<String>) -> Self {
        self.webhook_secret = Some(secret.into());
        self
    }

    /// Sets the contract `POST /api/analyze-contract` judges.
    pub fn with_analyzed_contract(
        mut self,
        name: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        self.analyzed_contract = submission(name, source);
        self
    }

    /// Sets the contract written into charge metadata.
    pub fn with_charge_contract(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.charge_contract = submission(name, source);
        self
    }

    /// Reads `MERCHANT_WALLET_ADDRESS`, `COMMERCE_API_KEY` and `COMMERCE_WEBHOOK_SECRET`.
    ///
    /// Unset or empty values are left unset; the wallet falls back to
    /// [`DEMO_MERCHANT_ADDRESS`].
    pub fn from_env() -> Result<Self> {
        let recipient = non_empty_env("MERCHANT_WALLET_ADDRESS")
            .unwrap_or_else(|| DEMO_MERCHANT_ADDRESS.to_string());
        let mut config = Self::new(&recipient)?;
        config.commerce_api_key = non_empty_env("COMMERCE_API_KEY");
        config.webhook_secret = non_empty_env("COMMERCE_WEBHOOK_SECRET");
        Ok(config)
    }

    /// Target handed to the analysis gateway.
    pub fn analysis_target(&self) -> ContractTarget {
        ContractTarget::Source(self.analyzed_contract.clone())
    }

    /// Commerce client, when a key is configured.
    pub fn commerce_client(&self) -> Option<CommerceClient> {
        self.commerce_api_key
            .as_deref()
            .and_then(|key| CommerceClient::new(key).ok())
    }
}

fn submission(name: impl Into<String>, source: impl Into<String>) -> ContractSubmission {
    ContractSubmission {
        contract_name: name.into(),
        contract_source_code: source.into(),
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Fixed USD price of a new charge.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LocalPrice {
    /// Decimal amount
    pub amount: String,
    /// Currency code
    pub currency: String,
}

/// Body of `POST /charges`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NewCharge {
    /// Charge name
    pub name: String,
    /// Charge description
    pub description: String,
    /// Always `fixed_price` here
    pub pricing_type: String,
    /// Price
    pub local_price: LocalPrice,
    /// Metadata read back by the webhook
    pub metadata: ChargeMetadata,
}

#[derive(Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct CommerceErrorBody {
    error: CommerceErrorDetail,
}

#[derive(Deserialize)]
struct CommerceErrorDetail {
    #[serde(default)]
    message: String,
}

/// Client for the Commerce charges API.
#[derive(Debug, Clone)]
pub struct CommerceClient {
    base_url: Url,
    api_key: String,
    http_client: Client,
}

impl CommerceClient {
    /// Creates a client for the production API.
    pub fn new(api_key: &str) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(CheckoutError::ConfigError(
                "Coinbase Commerce API key not configured".to_string(),
            ));
        }
        Ok(Self {
            base_url: base_url(COMMERCE_API_URL)?,
            api_key: api_key.to_string(),
            http_client: Client::new(),
        })
    }

    /// Points the client at another API root.
    pub fn with_base_url(mut self, root: &str) -> Result<Self> {
        self.base_url = base_url(root)?;
        Ok(self)
    }

    /// Sets a custom HTTP client.
    pub fn with_client(mut self, client: Client) -> Self {
        self.http_client = client;
        self
    }

    fn charges_url(&self, id: Option<&str>) -> Result<Url> {
        match id {
            Some(id) => endpoint_url(&self.base_url, &["charges", id]),
            None => endpoint_url(&self.base_url, &["charges"]),
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<ChargeDetails> {
        let response = request
            .header("X-CC-Api-Key", &self.api_key)
            .header("X-CC-Version", COMMERCE_API_VERSION)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<CommerceErrorBody>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(CheckoutError::ChargeError(format!(
                "commerce API returned {}: {}",
                status.as_u16(),
                message
            )));
        }

        let envelope: DataEnvelope<ChargeDetails> = serde_json::from_str(&body)?;
        Ok(envelope.data)
    }

    /// Creates a charge.
    #[instrument(skip_all, fields(name = %charge.name))]
    pub async fn create_charge(&self, charge: &NewCharge) -> Result<ChargeDetails> {
        let url = self.charges_url(None)?;
        self.send(self.http_client.post(url).json(charge)).await
    }

    /// Retrieves a charge.
    #[instrument(skip(self))]
    pub async fn retrieve_charge(&self, id: &str) -> Result<ChargeDetails> {
        let url = self.charges_url(Some(id))?;
        self.send(self.http_client.get(url)).await
    }
}

/// `POST /api/analyze-contract`: runs the gateway on the merchant's contract.
///
/// `gateway` is `None` when no API key is configured.
pub async fn handle_analyze(
    gateway: Option<&dyn AnalysisGateway>,
    target: &ContractTarget,
) -> Reply<AnalyzeEnvelope> {
    let Some(gateway) = gateway else {
        error!("analysis requested but no gateway key is configured");
        return Reply::with_status(
            500,
            failure_envelope(
                "API configuration missing",
                None,
                "Contract analysis not configured. Contact support.",
            ),
        );
    };

    match gateway.analyze(target).await {
        Ok(result) => {
            info!(safe = result.safe, risk = result.risk_percent, "analysis completed");
            match serde_json::to_value(RawVerdict::from(&result)) {
                Ok(analysis) => Reply::ok(AnalyzeEnvelope {
                    success: true,
                    analysis: Some(analysis),
                    error: None,
                    details: None,
                    user_message: None,
                }),
                Err(err) => Reply::with_status(
                    500,
                    failure_envelope(&err.to_string(), None, "Contract analysis failed. Please try again."),
                ),
            }
        }
        Err(CheckoutError::GatewayError { status, message }) => {
            warn!(status, "analysis gateway rejected the request");
            let status = if status >= 400 { status } else { 502 };
            Reply::with_status(
                status,
                failure_envelope(
                    &format!("API error: {status}"),
                    Some(message),
                    "Contract analysis failed. Please try again.",
                ),
            )
        }
        Err(err) => {
            error!(error = %err, "analysis failed");
            Reply::with_status(
                500,
                failure_envelope(
                    &err.to_string(),
                    None,
                    "Contract analysis failed. The API might be slow or unavailable. Please try again.",
                ),
            )
        }
    }
}

fn failure_envelope(error: &str, details: Option<String>, user_message: &str) -> AnalyzeEnvelope {
    AnalyzeEnvelope {
        success: false,
        analysis: None,
        error: Some(error.to_string()),
        details,
        user_message: Some(user_message.to_string()),
    }
}

/// Builds the Commerce charge for a checkout request.
///
/// # Examples
///
/// ```
/// use guarded_checkout::server::{new_charge, MerchantConfig, DEMO_MERCHANT_ADDRESS};
/// use guarded_checkout::types::ChargeRequest;
///
/// let merchant = MerchantConfig::new(DEMO_MERCHANT_ADDRESS).unwrap();
/// let request = ChargeRequest {
///     product_name: "Scanner".to_string(),
///     product_price: "0.01".to_string(),
///     contract_analysis: None,
/// };
/// let charge = new_charge(&request, &merchant);
/// assert_eq!(charge.description, "Purchase of Scanner");
/// assert_eq!(charge.metadata.contract_name.as_deref(), Some("DemoSmartContract"));
/// ```
pub fn new_charge(request: &ChargeRequest, merchant: &MerchantConfig) -> NewCharge {
    NewCharge {
        name: request.product_name.clone(),
        description: format!("Purchase of {}", request.product_name),
        pricing_type: "fixed_price".to_string(),
        local_price: LocalPrice {
            amount: request.product_price.clone(),
            currency: "USD".to_string(),
        },
        metadata: ChargeMetadata {
            product_name: request.product_name.clone(),
            product_price: request.product_price.clone(),
            contract_name: Some(merchant.charge_contract.contract_name.clone()),
            contract_source_code: Some(merchant.charge_contract.contract_source_code.clone()),
            contract_analysis: request.contract_analysis.as_ref().map(Value::to_string),
        },
    }
}

/// `POST /api/create-charge`.
pub async fn handle_create_charge(
    request: &ChargeRequest,
    merchant: &MerchantConfig,
    commerce: Option<&CommerceClient>,
) -> Reply<ChargeResponse> {
    let Some(commerce) = commerce else {
        return Reply::with_status(500, charge_error("Coinbase Commerce API key not configured"));
    };
    if let Err(err) = scale_price(&request.product_price, 2) {
        return Reply::with_status(400, charge_error(&err.to_string()));
    }

    match commerce.create_charge(&new_charge(request, merchant)).await {
        Ok(charge) => {
            info!(charge_id = %charge.id, code = %charge.code, "charge created");
            Reply::ok(ChargeResponse {
                success: true,
                charge: Some(ChargeSummary {
                    id: charge.id,
                    code: charge.code,
                    hosted_url: charge.hosted_url,
                    pricing: charge.pricing,
                }),
                error: None,
            })
        }
        Err(err) => {
            error!(error = %err, "error creating charge");
            Reply::with_status(500, charge_error("Failed to create charge"))
        }
    }
}

fn charge_error(message: &str) -> ChargeResponse {
    ChargeResponse {
        success: false,
        charge: None,
        error: Some(message.to_string()),
    }
}

/// `GET /api/charge-status/{id}`.
pub async fn handle_charge_status(
    charge_id: &str,
    commerce: Option<&CommerceClient>,
) -> Reply<ChargeStatusResponse> {
    let failed = |message: &str| ChargeStatusResponse {
        success: false,
        charge: None,
        error: Some(message.to_string()),
    };
    let Some(commerce) = commerce else {
        return Reply::with_status(500, failed("Coinbase Commerce API key not configured"));
    };

    match commerce.retrieve_charge(charge_id).await {
        Ok(charge) => Reply::ok(ChargeStatusResponse {
            success: true,
            charge: Some(charge),
            error: None,
        }),
        Err(err) => {
            error!(error = %err, charge_id, "error retrieving charge");
            Reply::with_status(500, failed("Failed to retrieve charge status"))
        }
    }
}

/// `POST /api/pyusd-transfer`: the transfer the shopper's wallet should submit.
pub fn handle_prepare_transfer(
    request: &TransferRequest,
    merchant: &MerchantConfig,
) -> Reply<TransferResponse> {
    match merchant
        .terms
        .prepare(&request.product_price, request.recipient_address.as_deref())
    {
        Ok(details) => Reply::ok(TransferResponse {
            success: true,
            transfer_details: Some(details.to_wire()),
            error: None,
        }),
        Err(err) => {
            let status = match err {
                CheckoutError::ConfigError(_) => 500,
                _ => 400,
            };
            warn!(error = %err, "transfer preparation refused");
            Reply::with_status(
                status,
                TransferResponse {
                    success: false,
                    transfer_details: None,
                    error: Some(err.user_message()),
                },
            )
        }
    }
}
