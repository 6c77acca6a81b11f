//! What the checkout shows: scores, colors, the pay button and the status line.
//!
//! These are display rules only. Whether a payment may proceed is decided by the
//! verdict in [`crate::analysis`], never by the numbers here.

use crate::analysis::AnalysisResult;
use crate::orchestrator::{CheckoutState, Phase};
use serde::Serialize;

/// Displayed security score for a 0-100 risk: `100 - risk`, rounded.
///
/// # Examples
///
/// ```
/// use guarded_checkout::presentation::security_score;
///
/// assert_eq!(security_score(80.0), 20);
/// assert_eq!(security_score(20.0), 80);
/// ```
pub fn security_score(risk_percent: f64) -> u8 {
    (100.0 - risk_percent).round().clamp(0.0, 100.0) as u8
}

/// Color band of a risk figure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreBand {
    /// Risk below 30
    Good,
    /// Risk below 60
    Caution,
    /// Everything else
    Bad,
}

impl ScoreBand {
    /// Band for a 0-100 risk.
    pub fn for_risk(risk_percent: f64) -> Self {
        if risk_percent < 30.0 {
            ScoreBand::Good
        } else if risk_percent < 60.0 {
            ScoreBand::Caution
        } else {
            ScoreBand::Bad
        }
    }
}

/// State of the pay action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayButton {
    /// Button label
    pub label: &'static str,
    /// Whether it can be pressed
    pub enabled: bool,
}

impl PayButton {
    /// Button for `phase`.
    pub fn for_phase(phase: Phase) -> Self {
        match phase {
            Phase::Analyzing | Phase::Executing => PayButton {
                label: "Processing...",
                enabled: false,
            },
            Phase::Blocked => PayButton {
                label: "Payment Blocked - Unsafe Contract",
                enabled: false,
            },
            Phase::AwaitingApproval => PayButton {
                label: "Awaiting approval",
                enabled: false,
            },
            Phase::Idle | Phase::Cancelled | Phase::Succeeded | Phase::Failed => PayButton {
                label: "Pay w/ Crypto",
                enabled: true,
            },
        }
    }
}

/// Analysis as shown in the approval modal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisSummary {
    /// Verdict
    pub safe: bool,
    /// `100 - risk`
    pub security_score: u8,
    /// Color band
    pub band: ScoreBand,
    /// Findings, in gateway order
    pub findings: Vec<String>,
    /// Shown as a "fallback used" badge
    pub fallback_used: bool,
}

impl From<&AnalysisResult> for AnalysisSummary {
    fn from(result: &AnalysisResult) -> Self {
        Self {
            safe: result.safe,
            security_score: result.security_score(),
            band: result.band(),
            findings: result.findings.clone(),
            fallback_used: result.synthetic,
        }
    }
}

/// Everything the checkout panel renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutView {
    /// Current phase
    pub phase: Phase,
    /// Pay action
    pub pay_button: PayButton,
    /// Progress indicator visible
    pub in_progress: bool,
    /// Approval modal contents, when the modal is open
    pub approval: Option<AnalysisSummary>,
    /// Latest analysis, for the result panel
    pub analysis: Option<AnalysisSummary>,
    /// One-line status
    pub status_line: Option<String>,
    /// Charge id or transaction hash
    pub reference: Option<String>,
}

impl CheckoutView {
    /// Projects the state into a view.
    pub fn from_state(state: &CheckoutState) -> Self {
        let phase = state.phase();
        let attempt = state.attempt();
        let analysis = attempt
            .and_then(|a| a.analysis.as_ref())
            .map(AnalysisSummary::from);

        let status_line = attempt.map(|a| match phase {
            Phase::Analyzing => "Analyzing smart contract security...".to_string(),
            Phase::AwaitingApproval => "Review the security analysis to continue".to_string(),
            Phase::Executing => "Processing payment...".to_string(),
            Phase::Succeeded => "Payment initiated successfully".to_string(),
            Phase::Cancelled => "Payment cancelled".to_string(),
            Phase::Blocked | Phase::Failed => a
                .failure
                .as_ref()
                .map(|f| format!("Error: {}", f.message))
                .unwrap_or_else(|| "Payment failed".to_string()),
            Phase::Idle => String::new(),
        });

        let reference = attempt.and_then(|a| a.charge_id.clone().or_else(|| a.transaction_hash.clone()));

        Self {
            phase,
            pay_button: PayButton::for_phase(phase),
            in_progress: matches!(phase, Phase::Analyzing | Phase::Executing),
            approval: if phase == Phase::AwaitingApproval {
                analysis.clone()
            } else {
                None
            },
            analysis,
            status_line: status_line.filter(|s| !s.is_empty()),
            reference,
        }
    }
}
