//! Wire types exchanged with the checkout collaborators.
//!
//! Field names follow the JSON each endpoint speaks: camelCase for the storefront API,
//! snake_case for the analysis gateway and the commerce processor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Contract submitted to the analysis gateway.
///
/// # Examples
///
/// ```
/// use guarded_checkout::types::ContractSubmission;
///
/// let body = ContractSubmission {
///     contract_name: "Transfers".to_string(),
///     contract_source_code: "pragma solidity ^0.8.17;".to_string(),
/// };
/// let json = serde_json::to_value(&body).unwrap();
/// assert_eq!(json["contract_name"], "Transfers");
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ContractSubmission {
    /// Contract name
    pub contract_name: String,

    /// Full Solidity source
    pub contract_source_code: String,
}

/// Verdict object as returned by the analysis gateway.
///
/// Two shapes are seen in practice: `contract_safe` + `risk_score` (0-100), or
/// `prediction` + `confidence` (0-1). Every field is optional here; normalization
/// happens in [`crate::analysis`].
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct RawVerdict {
    /// Boolean verdict
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_safe: Option<bool>,

    /// Risk on a 0-100 scale
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<f64>,

    /// Label verdict (string, number or bool depending on the model)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction: Option<Value>,

    /// Confidence in the vulnerable label, 0-1 (sometimes 0-100)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    /// Findings, most severe first
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vulnerabilities: Option<Vec<String>>,

    /// Findings under their alternate name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub findings: Option<Vec<String>>,

    /// Free-form recommendation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,

    /// Structured details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_details: Option<Value>,

    /// Set by gateways that answer with canned data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_demo_data: Option<bool>,
}

/// Envelope wrapping a verdict when the storefront proxies the gateway.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AnalyzeEnvelope {
    /// Whether analysis completed
    pub success: bool,

    /// The verdict, on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<Value>,

    /// Technical error, on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Gateway response body, on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,

    /// Message meant for the shopper
    #[serde(
        rename = "userMessage",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub user_message: Option<String>,
}

/// Body of a charge creation request.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ChargeRequest {
    /// Product being bought
    #[serde(rename = "productName")]
    pub product_name: String,

    /// Price in USD as a decimal string
    #[serde(rename = "productPrice")]
    pub product_price: String,

    /// Analysis that approved this payment
    #[serde(
        rename = "contractAnalysis",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub contract_analysis: Option<Value>,
}

/// The part of a charge the checkout needs to redirect.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChargeSummary {
    /// Charge identifier
    pub id: String,

    /// Short charge code
    #[serde(default)]
    pub code: String,

    /// Hosted checkout page
    pub hosted_url: String,

    /// Pricing in local and crypto currencies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing: Option<Value>,
}

/// Response from the charge creation endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ChargeResponse {
    /// Present and true on success
    #[serde(default)]
    pub success: bool,

    /// Created charge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charge: Option<ChargeSummary>,

    /// Error message on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Metadata embedded in every charge.
///
/// The charge writer and the webhook reader share this type, so the keys a charge
/// carries are the keys the webhook looks for.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ChargeMetadata {
    /// Product name
    #[serde(default)]
    pub product_name: String,

    /// Product price
    #[serde(default)]
    pub product_price: String,

    /// Contract the webhook should analyze
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_name: Option<String>,

    /// Source of that contract
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_source_code: Option<String>,

    /// Client-side analysis, serialized to a JSON string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_analysis: Option<String>,
}

/// One entry of a charge timeline.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TimelineEntry {
    /// When the status was entered
    pub time: DateTime<Utc>,

    /// Status name (NEW, PENDING, COMPLETED, EXPIRED, ...)
    pub status: String,

    /// Optional context, e.g. UNDERPAID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// Full charge record as reported by the payment processor.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ChargeDetails {
    /// Charge identifier
    pub id: String,

    /// Short charge code
    #[serde(default)]
    pub code: String,

    /// Charge name
    #[serde(default)]
    pub name: String,

    /// Charge description
    #[serde(default)]
    pub description: String,

    /// Pricing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing: Option<Value>,

    /// Payments detected so far
    #[serde(default)]
    pub payments: Vec<Value>,

    /// Status history, oldest first
    #[serde(default)]
    pub timeline: Vec<TimelineEntry>,

    /// Metadata written at creation
    #[serde(default)]
    pub metadata: ChargeMetadata,

    /// Hosted checkout page
    #[serde(default)]
    pub hosted_url: String,

    /// Creation time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    /// Expiry time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl ChargeDetails {
    /// Current status, taken from the latest timeline entry.
    pub fn status(&self) -> Option<&str> {
        self.timeline.last().map(|entry| entry.status.as_str())
    }
}

/// Response from the charge status endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ChargeStatusResponse {
    /// Present and true on success
    #[serde(default)]
    pub success: bool,

    /// The charge record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charge: Option<ChargeDetails>,

    /// Error message on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Body of a transfer preparation request.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TransferRequest {
    /// Price in USD as a decimal string
    #[serde(rename = "productPrice")]
    pub product_price: String,

    /// Overrides the merchant's configured recipient
    #[serde(
        rename = "recipientAddress",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub recipient_address: Option<String>,
}

/// On-chain call parameters for a stablecoin transfer, as sent over the wire.
///
/// The amount is a decimal string already scaled by `decimals`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TransferDetailsWire {
    /// Token contract
    #[serde(rename = "contractAddress")]
    pub contract_address: String,

    /// Payee
    #[serde(rename = "recipientAddress")]
    pub recipient_address: String,

    /// Scaled amount (uint256 as string)
    pub amount: String,

    /// Token decimals
    pub decimals: u8,

    /// Token symbol
    pub symbol: String,

    /// Chain the token lives on
    #[serde(rename = "chainId")]
    pub chain_id: u64,
}

/// Response from the transfer preparation endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct TransferResponse {
    /// Present and true on success
    #[serde(default)]
    pub success: bool,

    /// Call parameters
    #[serde(
        rename = "transferDetails",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub transfer_details: Option<TransferDetailsWire>,

    /// Error message on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Transaction handed to the wallet provider for signing and submission.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    /// Sender account
    pub from: String,

    /// Target contract
    pub to: String,

    /// 0x-prefixed call data
    pub data: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_raw_verdict_accepts_both_shapes() {
        let boolean: RawVerdict = serde_json::from_value(json!({
            "contract_safe": true,
            "risk_score": 8,
            "vulnerabilities": []
        }))
        .unwrap();
        assert_eq!(boolean.contract_safe, Some(true));
        assert_eq!(boolean.risk_score, Some(8.0));

        let labelled: RawVerdict = serde_json::from_value(json!({
            "prediction": "safe",
            "confidence": 0.12
        }))
        .unwrap();
        assert!(labelled.contract_safe.is_none());
        assert_eq!(labelled.confidence, Some(0.12));
    }

    #[test]
    fn test_charge_request_uses_camel_case() {
        let request = ChargeRequest {
            product_name: "Scanner".to_string(),
            product_price: "0.01".to_string(),
            contract_analysis: None,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("productName"));
        assert!(json.contains("productPrice"));
        assert!(!json.contains("contractAnalysis"));
    }

    #[test]
    fn test_charge_status_is_last_timeline_entry() {
        let details: ChargeDetails = serde_json::from_value(json!({
            "id": "c1",
            "timeline": [
                {"time": "2024-05-01T10:00:00Z", "status": "NEW"},
                {"time": "2024-05-01T10:05:00Z", "status": "PENDING"}
            ],
            "metadata": {"product_name": "Scanner", "product_price": "0.01"}
        }))
        .unwrap();
        assert_eq!(details.status(), Some("PENDING"));
        assert_eq!(details.metadata.product_name, "Scanner");
    }

    #[test]
    fn test_transfer_response_parsing() {
        let response: TransferResponse = serde_json::from_value(json!({
            "success": true,
            "transferDetails": {
                "contractAddress": "0xCaC524BcA292aaade2DF8A05cC58F0a65B1B3bB9",
                "recipientAddress": "0xb43c9f0f2bb65a37761e7867a6f1903799f45d65",
                "amount": "10000000",
                "decimals": 6,
                "symbol": "PYUSD",
                "chainId": 11155111
            }
        }))
        .unwrap();
        let details = response.transfer_details.unwrap();
        assert_eq!(details.amount, "10000000");
        assert_eq!(details.chain_id, 11_155_111);
    }
}
