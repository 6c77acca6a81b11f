//! Smart-contract security analysis.
//!
//! The analysis gateway is an external HTTP service that judges a contract and
//! returns a verdict. Gateways disagree on the verdict's shape, so every reply is
//! normalized into one [`AnalysisResult`] here, at the boundary.
//!
//! ## Fallback
//!
//! With [`FallbackPolicy::SyntheticSafe`], a gateway that cannot be reached at all
//! (timeouts, refused connections) is replaced by [`AnalysisResult::fallback`], which
//! is flagged `synthetic`. A gateway that answers, whatever it answers, is never
//! replaced.

use crate::errors::{CheckoutError, Result};
use crate::presentation::{security_score, ScoreBand};
use crate::retry::{with_retry, RetryPolicy};
use crate::types::{AnalyzeEnvelope, ContractSubmission, RawVerdict};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, instrument, warn};
use url::Url;

/// Header carrying the gateway credential.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Prediction labels read as a safe verdict.
const SAFE_LABELS: &[&str] = &[
    "safe",
    "secure",
    "low",
    "low risk",
    "not vulnerable",
    "non-vulnerable",
    "0",
];

/// Which contract the gateway should judge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractTarget {
    /// The gateway already holds the contract; the request has no body.
    ServerHeld,
    /// Send this contract's source along.
    Source(ContractSubmission),
}

impl ContractTarget {
    /// Target with inline source.
    pub fn source(name: impl Into<String>, source: impl Into<String>) -> Self {
        ContractTarget::Source(ContractSubmission {
            contract_name: name.into(),
            contract_source_code: source.into(),
        })
    }

    /// Contract name, when known.
    pub fn name(&self) -> Option<&str> {
        match self {
            ContractTarget::ServerHeld => None,
            ContractTarget::Source(submission) => Some(&submission.contract_name),
        }
    }
}

/// Normalized verdict.
///
/// Once attached to a payment attempt it is never mutated; a new attempt gets a new
/// result.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    /// Whether the contract may be paid through
    pub safe: bool,

    /// Risk on a 0-100 scale
    pub risk_percent: f64,

    /// Findings, in gateway order
    pub findings: Vec<String>,

    /// Gateway recommendation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,

    /// Structured details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,

    /// True for substituted, non-authoritative data
    #[serde(default)]
    pub synthetic: bool,
}

impl AnalysisResult {
    /// Normalizes a gateway verdict.
    ///
    /// `contract_safe` wins when present. Otherwise the `prediction` label decides,
    /// and any label not known to mean safe is read as unsafe. A verdict with neither
    /// is rejected.
    ///
    /// # Examples
    ///
    /// ```
    /// use guarded_checkout::analysis::AnalysisResult;
    /// use guarded_checkout::types::RawVerdict;
    ///
    /// let raw = RawVerdict {
    ///     prediction: Some("safe".into()),
    ///     confidence: Some(0.8),
    ///     ..Default::default()
    /// };
    /// let result = AnalysisResult::from_raw(raw).unwrap();
    /// assert!(result.safe);
    /// assert_eq!(result.security_score(), 20);
    /// ```
    pub fn from_raw(raw: RawVerdict) -> Result<Self> {
        let safe = match (&raw.contract_safe, &raw.prediction) {
            (Some(safe), _) => *safe,
            (None, Some(label)) => label_is_safe(label),
            (None, None) => {
                return Err(CheckoutError::InvalidResponse(
                    "verdict has neither contract_safe nor prediction".to_string(),
                ))
            }
        };

        let risk_percent = match (raw.risk_score, raw.confidence) {
            (Some(risk), _) => risk,
            (None, Some(confidence)) => confidence_to_percent(confidence),
            (None, None) if safe => 0.0,
            (None, None) => 100.0,
        };
        if !risk_percent.is_finite() {
            return Err(CheckoutError::InvalidResponse(format!(
                "risk is not a number: {}",
                risk_percent
            )));
        }

        Ok(Self {
            safe,
            risk_percent: risk_percent.clamp(0.0, 100.0),
            findings: raw.vulnerabilities.or(raw.findings).unwrap_or_default(),
            recommendation: raw.recommendation,
            details: raw.analysis_details,
            synthetic: raw.is_demo_data.unwrap_or(false),
        })
    }

    /// The result substituted when the gateway cannot be reached.
    ///
    /// Safe, risk 20 (security score 80), flagged synthetic.
    pub fn fallback() -> Self {
        Self {
            safe: true,
            risk_percent: 20.0,
            findings: vec![
                "Informational: Contract follows security best practices".to_string(),
                "Low: Consider implementing additional gas optimizations for batch operations"
                    .to_string(),
            ],
            recommendation: None,
            details: Some(json!({
                "scanned_functions": 12,
                "security_checks_passed": 11,
                "gas_optimization_score": 80
            })),
            synthetic: true,
        }
    }

    /// Displayed score, `100 - risk`.
    pub fn security_score(&self) -> u8 {
        security_score(self.risk_percent)
    }

    /// Color band for the risk.
    pub fn band(&self) -> ScoreBand {
        ScoreBand::for_risk(self.risk_percent)
    }
}

impl From<&AnalysisResult> for RawVerdict {
    fn from(result: &AnalysisResult) -> Self {
        RawVerdict {
            contract_safe: Some(result.safe),
            risk_score: Some(result.risk_percent),
            vulnerabilities: Some(result.findings.clone()),
            recommendation: result.recommendation.clone(),
            analysis_details: result.details.clone(),
            is_demo_data: Some(result.synthetic),
            ..Default::default()
        }
    }
}

fn label_is_safe(label: &Value) -> bool {
    match label {
        // A boolean prediction answers "is it vulnerable?"
        Value::Bool(vulnerable) => !vulnerable,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => SAFE_LABELS.contains(&s.trim().to_ascii_lowercase().as_str()),
        _ => false,
    }
}

fn confidence_to_percent(confidence: f64) -> f64 {
    if confidence <= 1.0 {
        confidence * 100.0
    } else {
        confidence
    }
}

/// Parses a successful gateway body: either a bare verdict or the storefront envelope.
pub fn parse_gateway_reply(status: u16, body: &str) -> Result<AnalysisResult> {
    let value: Value = serde_json::from_str(body)?;

    if value.get("success").is_some() {
        let envelope: AnalyzeEnvelope = serde_json::from_value(value)?;
        if !envelope.success {
            return Err(CheckoutError::GatewayError {
                status,
                message: envelope
                    .user_message
                    .or(envelope.error)
                    .unwrap_or_else(|| "Contract analysis failed".to_string()),
            });
        }
        let analysis = envelope.analysis.ok_or_else(|| {
            CheckoutError::InvalidResponse("envelope reports success without analysis".to_string())
        })?;
        return AnalysisResult::from_raw(serde_json::from_value(analysis)?);
    }

    AnalysisResult::from_raw(serde_json::from_value(value)?)
}

/// Best-effort message out of an error body.
fn gateway_message(body: &str) -> String {
    let parsed = serde_json::from_str::<Value>(body).ok();
    parsed
        .as_ref()
        .and_then(|value| {
            ["userMessage", "error", "message", "detail"]
                .iter()
                .find_map(|key| value.get(*key).and_then(Value::as_str))
        })
        .map(str::to_string)
        .unwrap_or_else(|| body.trim().to_string())
}

/// Anything that can judge a contract.
#[async_trait]
pub trait AnalysisGateway: Send + Sync {
    /// Analyzes `target` and returns the normalized verdict.
    async fn analyze(&self, target: &ContractTarget) -> Result<AnalysisResult>;
}

/// What to do when the gateway cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackPolicy {
    /// Surface the failure
    #[default]
    Disabled,
    /// Substitute [`AnalysisResult::fallback`]
    SyntheticSafe,
}

/// Calls the gateway, applying `fallback` to connectivity failures only.
#[instrument(skip(gateway, target), fields(contract = target.name().unwrap_or("server-held")))]
pub async fn analyze_with_fallback(
    gateway: &dyn AnalysisGateway,
    target: &ContractTarget,
    fallback: FallbackPolicy,
) -> Result<AnalysisResult> {
    match gateway.analyze(target).await {
        Ok(result) => Ok(result),
        Err(err) if fallback == FallbackPolicy::SyntheticSafe && err.is_connectivity() => {
            warn!(error = %err, "analysis gateway unreachable, using fallback result");
            Ok(AnalysisResult::fallback())
        }
        Err(err) => Err(err),
    }
}

/// Configuration for [`HttpAnalysisGateway`].
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Gateway endpoint
    pub url: String,

    /// Credential sent in [`API_KEY_HEADER`]
    pub api_key: String,

    /// Retry behaviour
    pub retry: RetryPolicy,
}

impl AnalysisConfig {
    /// Creates a configuration with the default retry policy.
    ///
    /// # Examples
    ///
    /// ```
    /// use guarded_checkout::analysis::AnalysisConfig;
    /// use guarded_checkout::retry::RetryPolicy;
    ///
    /// let config = AnalysisConfig::new("https://analysis.example.com/predict", "key")
    ///     .with_retry(RetryPolicy::fast());
    /// assert_eq!(config.retry.max_attempts, 2);
    /// ```
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            retry: RetryPolicy::default(),
        }
    }

    /// Sets the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Reads `ANALYSIS_API_URL`, `ANALYSIS_API_KEY` and, optionally,
    /// `ANALYSIS_MAX_ATTEMPTS` and `ANALYSIS_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("ANALYSIS_API_URL")
            .map_err(|_| CheckoutError::ConfigError("ANALYSIS_API_URL is not set".to_string()))?;
        let api_key = std::env::var("ANALYSIS_API_KEY")
            .map_err(|_| CheckoutError::ConfigError("ANALYSIS_API_KEY is not set".to_string()))?;

        let mut retry = RetryPolicy::default();
        if let Some(attempts) = env_parse::<u32>("ANALYSIS_MAX_ATTEMPTS") {
            retry = retry.with_max_attempts(attempts);
        }
        if let Some(secs) = env_parse::<u64>("ANALYSIS_TIMEOUT_SECS") {
            retry = retry.with_timeout(Duration::from_secs(secs));
        }

        Ok(Self::new(url, api_key).with_retry(retry))
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Analysis gateway reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpAnalysisGateway {
    url: Url,
    api_key: String,
    retry: RetryPolicy,
    http_client: Client,
}

impl HttpAnalysisGateway {
    /// Validates the configuration and builds the gateway client.
    ///
    /// A missing key or malformed URL is a configuration error, reported here rather
    /// than on the first payment.
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(CheckoutError::ConfigError(
                "analysis API key is missing".to_string(),
            ));
        }
        Ok(Self {
            url: Url::parse(&config.url)?,
            api_key: config.api_key,
            retry: config.retry,
            http_client: Client::new(),
        })
    }

    /// Sets a custom HTTP client.
    pub fn with_client(mut self, client: Client) -> Self {
        self.http_client = client;
        self
    }

    async fn call_once(&self, target: &ContractTarget) -> Result<AnalysisResult> {
        let mut request = self
            .http_client
            .post(self.url.clone())
            .header(API_KEY_HEADER, &self.api_key);
        if let ContractTarget::Source(submission) = target {
            request = request.json(submission);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(CheckoutError::GatewayError {
                status: status.as_u16(),
                message: gateway_message(&body),
            });
        }

        parse_gateway_reply(status.as_u16(), &body)
    }
}

#[async_trait]
impl AnalysisGateway for HttpAnalysisGateway {
    #[instrument(skip_all)]
    async fn analyze(&self, target: &ContractTarget) -> Result<AnalysisResult> {
        let result = with_retry(&self.retry, |_| self.call_once(target)).await?;
        info!(
            url = %self.url,
            safe = result.safe,
            risk = result.risk_percent,
            findings = result.findings.len(),
            "analysis completed"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawVerdict {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_boolean_shape() {
        let result = AnalysisResult::from_raw(raw(json!({
            "contract_safe": false,
            "risk_score": 76,
            "vulnerabilities": ["Critical: reentrancy", "High: access control"]
        })))
        .unwrap();
        assert!(!result.safe);
        assert_eq!(result.security_score(), 24);
        assert_eq!(result.findings.len(), 2);
        assert_eq!(result.findings[0], "Critical: reentrancy");
        assert!(!result.synthetic);
    }

    #[test]
    fn test_prediction_shape() {
        let result = AnalysisResult::from_raw(raw(json!({
            "prediction": "Vulnerable",
            "confidence": 0.8,
            "findings": ["Unchecked call"]
        })))
        .unwrap();
        assert!(!result.safe);
        assert_eq!(result.security_score(), 20);
        assert_eq!(result.findings, vec!["Unchecked call".to_string()]);
    }

    #[test]
    fn test_score_derivation() {
        let high = AnalysisResult::from_raw(raw(json!({"contract_safe": true, "risk_score": 80})))
            .unwrap();
        assert_eq!(high.security_score(), 20);

        let low = AnalysisResult::from_raw(raw(json!({"contract_safe": true, "risk_score": 20})))
            .unwrap();
        assert_eq!(low.security_score(), 80);
    }

    #[test]
    fn test_labels() {
        assert!(label_is_safe(&json!("Safe")));
        assert!(label_is_safe(&json!(" low risk ")));
        assert!(label_is_safe(&json!(0)));
        assert!(label_is_safe(&json!(false)));
        assert!(!label_is_safe(&json!("vulnerable")));
        assert!(!label_is_safe(&json!("unknown-label")));
        assert!(!label_is_safe(&json!(1)));
        assert!(!label_is_safe(&json!(null)));
    }

    #[test]
    fn test_empty_verdict_is_rejected() {
        let err = AnalysisResult::from_raw(RawVerdict::default()).unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidResponse(_)));
    }

    #[test]
    fn test_demo_data_is_synthetic() {
        let result = AnalysisResult::from_raw(raw(json!({
            "contract_safe": true,
            "risk_score": 8,
            "is_demo_data": true
        })))
        .unwrap();
        assert!(result.synthetic);
    }

    #[test]
    fn test_fallback_result() {
        let fallback = AnalysisResult::fallback();
        assert!(fallback.safe);
        assert!(fallback.synthetic);
        assert_eq!(fallback.security_score(), 80);
    }

    #[test]
    fn test_raw_form_normalizes_back() {
        let result = AnalysisResult::from_raw(raw(json!({
            "prediction": "safe",
            "confidence": 0.25,
            "findings": ["Low: gas"]
        })))
        .unwrap();
        let again = AnalysisResult::from_raw(RawVerdict::from(&result)).unwrap();
        assert_eq!(again, result);
    }

    #[test]
    fn test_envelope_parsing() {
        let ok = parse_gateway_reply(
            200,
            &json!({"success": true, "analysis": {"contract_safe": true, "risk_score": 15}})
                .to_string(),
        )
        .unwrap();
        assert_eq!(ok.security_score(), 85);

        let failed = parse_gateway_reply(
            200,
            &json!({"success": false, "error": "API error: 500", "userMessage": "Try again"})
                .to_string(),
        )
        .unwrap_err();
        match failed {
            CheckoutError::GatewayError { message, .. } => assert_eq!(message, "Try again"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_key_is_config_error() {
        let err = HttpAnalysisGateway::new(AnalysisConfig::new("https://a.example/predict", ""))
            .unwrap_err();
        assert!(matches!(err, CheckoutError::ConfigError(_)));
    }

    #[test]
    fn test_bad_url_is_rejected() {
        let err = HttpAnalysisGateway::new(AnalysisConfig::new("not a url", "key")).unwrap_err();
        assert!(matches!(err, CheckoutError::UrlParseError(_)));
    }

    struct Failing(fn() -> CheckoutError);

    #[async_trait]
    impl AnalysisGateway for Failing {
        async fn analyze(&self, _target: &ContractTarget) -> Result<AnalysisResult> {
            Err((self.0)())
        }
    }

    #[tokio::test]
    async fn test_fallback_only_for_connectivity() {
        let unreachable = Failing(|| CheckoutError::TimeoutExceeded(Duration::from_secs(10)));
        let result = analyze_with_fallback(
            &unreachable,
            &ContractTarget::ServerHeld,
            FallbackPolicy::SyntheticSafe,
        )
        .await
        .unwrap();
        assert!(result.synthetic);

        let rejected = Failing(|| CheckoutError::GatewayError {
            status: 503,
            message: "down".to_string(),
        });
        assert!(analyze_with_fallback(
            &rejected,
            &ContractTarget::ServerHeld,
            FallbackPolicy::SyntheticSafe
        )
        .await
        .is_err());

        assert!(analyze_with_fallback(
            &unreachable,
            &ContractTarget::ServerHeld,
            FallbackPolicy::Disabled
        )
        .await
        .is_err());
    }
}
