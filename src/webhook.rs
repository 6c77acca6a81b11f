//! Commerce webhook receiver.
//!
//! Events arrive signed with HMAC-SHA256 over the raw body, hex-encoded in
//! [`SIGNATURE_HEADER`]. On `charge:created` the contract embedded in the charge
//! metadata is analyzed server-side, so a merchant gets a verdict for every charge
//! even when the checkout never ran its own analysis.

use crate::analysis::{AnalysisGateway, ContractTarget};
use crate::errors::{CheckoutError, Result};
use crate::server::Reply;
use crate::types::{ChargeMetadata, RawVerdict};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use tracing::{error, info, warn};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the body signature.
pub const SIGNATURE_HEADER: &str = "x-cc-webhook-signature";

/// Event type that triggers server-side analysis.
pub const CHARGE_CREATED: &str = "charge:created";

/// Hex HMAC-SHA256 of `body` under `secret`.
///
/// # Examples
///
/// ```
/// use guarded_checkout::webhook::{compute_signature, verify_signature};
///
/// let signature = compute_signature(b"{}", "secret").unwrap();
/// assert!(verify_signature(b"{}", &signature, "secret").is_ok());
/// ```
pub fn compute_signature(body: &[u8], secret: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| CheckoutError::WebhookError(format!("Invalid webhook secret: {}", e)))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Checks `signature` against `body` in constant time.
pub fn verify_signature(body: &[u8], signature: &str, secret: &str) -> Result<()> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| CheckoutError::WebhookError(format!("Invalid webhook secret: {}", e)))?;
    mac.update(body);

    let expected = hex::decode(signature.trim())
        .map_err(|_| CheckoutError::WebhookError("Signature is not valid hex".to_string()))?;
    mac.verify_slice(&expected)
        .map_err(|_| CheckoutError::WebhookError("Invalid webhook signature".to_string()))
}

/// Signed webhook body.
#[derive(Deserialize, Debug, Clone)]
pub struct WebhookPayload {
    /// The event
    pub event: WebhookEvent,
}

/// One webhook event.
#[derive(Deserialize, Debug, Clone)]
pub struct WebhookEvent {
    /// Event id
    #[serde(default)]
    pub id: Option<String>,

    /// Event type, e.g. `charge:created`
    #[serde(rename = "type")]
    pub event_type: String,

    /// The charge the event is about
    #[serde(default)]
    pub data: Value,
}

/// Webhook response body.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct WebhookReply {
    /// Whether the event was handled
    pub success: bool,

    /// Event type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,

    /// Charge the event is about
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charge_id: Option<String>,

    /// Server-side verdict for the charge's contract
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<Value>,

    /// Acknowledgement
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Failure description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WebhookReply {
    fn error(message: &str) -> Self {
        Self {
            error: Some(message.to_string()),
            ..Default::default()
        }
    }
}

/// `POST /api/webhook`.
///
/// `secret` is `None` when no webhook secret is configured; `gateway` is `None`
/// when analysis is not configured.
pub async fn handle_webhook(
    body: &[u8],
    signature: Option<&str>,
    secret: Option<&str>,
    gateway: Option<&dyn AnalysisGateway>,
) -> Reply<WebhookReply> {
    let Some(secret) = secret else {
        return Reply {
            status: 500,
            body: WebhookReply::error("Webhook secret not configured"),
        };
    };

    if let Err(err) = verify_signature(body, signature.unwrap_or_default(), secret) {
        warn!(error = %err, "webhook signature verification failed");
        return Reply {
            status: 400,
            body: WebhookReply::error("Invalid webhook signature"),
        };
    }

    let payload: WebhookPayload = match serde_json::from_slice(body) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "webhook body is not an event");
            return Reply {
                status: 400,
                body: WebhookReply::error("Malformed webhook event"),
            };
        }
    };
    let event = payload.event;
    info!(event_type = %event.event_type, event_id = ?event.id, "received webhook event");

    if event.event_type == CHARGE_CREATED {
        if let Some(reply) = analyze_charge(&event, gateway).await {
            return Reply { status: 200, body: reply };
        }
    }

    Reply {
        status: 200,
        body: WebhookReply {
            success: true,
            event_type: Some(event.event_type),
            message: Some("Webhook processed successfully".to_string()),
            ..Default::default()
        },
    }
}

/// Analyzes the contract embedded in a created charge.
///
/// `None` when the charge carries no contract.
async fn analyze_charge(
    event: &WebhookEvent,
    gateway: Option<&dyn AnalysisGateway>,
) -> Option<WebhookReply> {
    let charge_id = event.data.get("id").and_then(Value::as_str).map(str::to_string);
    let metadata: ChargeMetadata = event
        .data
        .get("metadata")
        .cloned()
        .and_then(|m| serde_json::from_value(m).ok())
        .unwrap_or_default();

    let (Some(name), Some(source)) = (metadata.contract_name, metadata.contract_source_code) else {
        return None;
    };
    info!(charge_id = ?charge_id, contract = %name, "analyzing contract for new charge");

    let outcome = match gateway {
        Some(gateway) => gateway.analyze(&ContractTarget::source(name, source)).await,
        None => Err(CheckoutError::ConfigError(
            "analysis gateway not configured".to_string(),
        )),
    };

    let reply = WebhookReply {
        event_type: Some(event.event_type.clone()),
        charge_id,
        ..Default::default()
    };
    Some(match outcome.and_then(|r| Ok(serde_json::to_value(RawVerdict::from(&r))?)) {
        Ok(analysis) => WebhookReply {
            success: true,
            analysis: Some(analysis),
            ..reply
        },
        Err(err) => {
            error!(error = %err, "contract analysis for charge failed");
            WebhookReply {
                error: Some("Failed to analyze smart contract".to_string()),
                ..reply
            }
        }
    })
}
