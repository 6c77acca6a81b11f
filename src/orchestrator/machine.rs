//! Checkout state machine.
//!
//! [`transition`] is pure: it takes the current state and an event and returns the
//! next state plus the effects the driver must perform. All I/O lives in the driver.

use crate::analysis::AnalysisResult;
use crate::errors::{Failure, FailureReason};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where a payment attempt stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No attempt yet, or the last one was reset
    Idle,
    /// Waiting on the analysis gateway
    Analyzing,
    /// The contract was judged unsafe; no funds moved
    Blocked,
    /// Analysis passed; waiting on the shopper
    AwaitingApproval,
    /// The shopper declined
    Cancelled,
    /// Funds request in flight
    Executing,
    /// Charge created or transfer submitted
    Succeeded,
    /// Any failure along the way
    Failed,
}

impl Phase {
    /// A payment is underway and a new trigger must be refused.
    pub fn is_busy(self) -> bool {
        matches!(
            self,
            Phase::Analyzing | Phase::AwaitingApproval | Phase::Executing
        )
    }

    /// The attempt is over.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Phase::Blocked | Phase::Cancelled | Phase::Succeeded | Phase::Failed
        )
    }

    /// A trigger may start a new attempt. A blocked attempt stays blocked until reset.
    pub fn accepts_trigger(self) -> bool {
        self == Phase::Idle || (self.is_terminal() && self != Phase::Blocked)
    }
}

/// Product being paid for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Display name
    pub name: String,
    /// USD price as a decimal string
    pub price: String,
}

impl Product {
    /// Creates a product.
    pub fn new(name: impl Into<String>, price: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            price: price.into(),
        }
    }
}

/// One run of the checkout wizard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentAttempt {
    /// Attempt counter, starting at 1
    pub number: u64,
    /// What is being bought
    pub product: Product,
    /// Current phase
    pub phase: Phase,
    /// Verdict, set once
    pub analysis: Option<AnalysisResult>,
    /// Hosted checkout charge
    pub charge_id: Option<String>,
    /// Hosted checkout page
    pub hosted_url: Option<String>,
    /// Direct transfer hash
    pub transaction_hash: Option<String>,
    /// Why the attempt stopped
    pub failure: Option<Failure>,
}

/// Checkout state: the current attempt, if any.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CheckoutState {
    attempt: Option<PaymentAttempt>,
    attempts_started: u64,
}

impl CheckoutState {
    /// Current phase; [`Phase::Idle`] without an attempt.
    pub fn phase(&self) -> Phase {
        self.attempt.as_ref().map_or(Phase::Idle, |a| a.phase)
    }

    /// Current attempt.
    pub fn attempt(&self) -> Option<&PaymentAttempt> {
        self.attempt.as_ref()
    }

    /// Number of attempts started so far.
    pub fn attempts_started(&self) -> u64 {
        self.attempts_started
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Shopper pressed pay
    Trigger(Product),
    /// Gateway returned a verdict (or the fallback stood in)
    AnalysisSettled(AnalysisResult),
    /// Analysis could not be obtained
    AnalysisFailed(Failure),
    /// Shopper confirmed
    Approve,
    /// Shopper declined
    Decline,
    /// Hosted checkout charge exists
    ChargeCreated {
        /// Charge id
        id: String,
        /// Page to send the shopper to
        hosted_url: String,
    },
    /// Wallet accepted the transfer
    TransferSubmitted {
        /// Transaction hash
        hash: String,
    },
    /// Funds request failed
    ExecutionFailed(Failure),
    /// Back to idle
    Reset,
}

impl Event {
    /// Short event name for logs and rejections.
    pub fn name(&self) -> &'static str {
        match self {
            Event::Trigger(_) => "trigger",
            Event::AnalysisSettled(_) => "analysis_settled",
            Event::AnalysisFailed(_) => "analysis_failed",
            Event::Approve => "approve",
            Event::Decline => "decline",
            Event::ChargeCreated { .. } => "charge_created",
            Event::TransferSubmitted { .. } => "transfer_submitted",
            Event::ExecutionFailed(_) => "execution_failed",
            Event::Reset => "reset",
        }
    }
}

/// Severity of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    /// Progress
    Info,
    /// Something went through
    Success,
    /// Something stopped the attempt
    Error,
}

/// Message for the shopper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    /// Severity
    pub level: NoticeLevel,
    /// Failure category, for errors
    pub reason: Option<FailureReason>,
    /// Text
    pub message: String,
}

impl Notice {
    fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            reason: None,
            message: message.into(),
        }
    }

    fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            reason: None,
            message: message.into(),
        }
    }

    fn error(failure: &Failure) -> Self {
        Self {
            level: NoticeLevel::Error,
            reason: Some(failure.reason),
            message: failure.message.clone(),
        }
    }
}

/// Work the driver performs after a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Call the analysis gateway
    RequestAnalysis,
    /// Show the approval modal
    PromptApproval(AnalysisResult),
    /// Request funds for `product`
    Execute {
        /// What is being bought
        product: Product,
        /// Verdict that cleared it
        analysis: Option<AnalysisResult>,
    },
    /// Send the shopper to the hosted page
    OpenHostedCheckout(String),
    /// Show a message
    Notify(Notice),
}

/// An event the current phase does not accept.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{event} is not accepted while {phase:?}")]
pub struct Rejected {
    /// Phase at the time
    pub phase: Phase,
    /// Event name
    pub event: &'static str,
}

/// Message shown when an unsafe verdict blocks payment.
pub fn blocked_message(security_score: u8) -> String {
    format!(
        "Smart contract failed security analysis (security score {}/100). Payment blocked for your protection.",
        security_score
    )
}

/// Applies `event` to `state`.
///
/// # Examples
///
/// ```
/// use guarded_checkout::orchestrator::{transition, CheckoutState, Effect, Event, Phase, Product};
///
/// let (state, effects) =
///     transition(&CheckoutState::default(), Event::Trigger(Product::new("Scanner", "0.01"))).unwrap();
/// assert_eq!(state.phase(), Phase::Analyzing);
/// assert_eq!(effects[0], Effect::RequestAnalysis);
///
/// // A second trigger during analysis is refused.
/// assert!(transition(&state, Event::Trigger(Product::new("Scanner", "0.01"))).is_err());
/// ```
pub fn transition(
    state: &CheckoutState,
    event: Event,
) -> Result<(CheckoutState, Vec<Effect>), Rejected> {
    let phase = state.phase();
    let rejected = Rejected {
        phase,
        event: event.name(),
    };
    let mut next = state.clone();

    let effects = match event {
        Event::Trigger(product) if phase.accepts_trigger() => {
            next.attempts_started += 1;
            next.attempt = Some(PaymentAttempt {
                number: next.attempts_started,
                product,
                phase: Phase::Analyzing,
                analysis: None,
                charge_id: None,
                hosted_url: None,
                transaction_hash: None,
                failure: None,
            });
            vec![
                Effect::RequestAnalysis,
                Effect::Notify(Notice::info("Analyzing smart contract security...")),
            ]
        }

        Event::Reset if phase == Phase::Idle || phase.is_terminal() => {
            next.attempt = None;
            Vec::new()
        }

        event => {
            let attempt = next.attempt.as_mut().ok_or_else(|| rejected.clone())?;
            match (phase, event) {
                (Phase::Analyzing, Event::AnalysisSettled(result)) => {
                    let score = result.security_score();
                    let effects = if result.safe {
                        attempt.phase = Phase::AwaitingApproval;
                        vec![
                            Effect::Notify(Notice::success(format!(
                                "Contract analysis passed (security score {}/100)",
                                score
                            ))),
                            Effect::PromptApproval(result.clone()),
                        ]
                    } else {
                        let failure = Failure::new(FailureReason::UnsafeVerdict, blocked_message(score));
                        let notice = Notice::error(&failure);
                        attempt.phase = Phase::Blocked;
                        attempt.failure = Some(failure);
                        vec![Effect::Notify(notice)]
                    };
                    attempt.analysis = Some(result);
                    effects
                }

                (Phase::Analyzing, Event::AnalysisFailed(failure))
                | (Phase::Executing, Event::ExecutionFailed(failure)) => {
                    let notice = Notice::error(&failure);
                    attempt.phase = Phase::Failed;
                    attempt.failure = Some(failure);
                    vec![Effect::Notify(notice)]
                }

                (Phase::AwaitingApproval, Event::Approve) => {
                    attempt.phase = Phase::Executing;
                    vec![Effect::Execute {
                        product: attempt.product.clone(),
                        analysis: attempt.analysis.clone(),
                    }]
                }

                (Phase::AwaitingApproval, Event::Decline) => {
                    attempt.phase = Phase::Cancelled;
                    vec![Effect::Notify(Notice::info("Payment cancelled"))]
                }

                (Phase::Executing, Event::ChargeCreated { id, hosted_url }) => {
                    attempt.phase = Phase::Succeeded;
                    let notice = Notice::success(format!(
                        "Payment initiated successfully! Charge ID: {}",
                        id
                    ));
                    attempt.charge_id = Some(id);
                    attempt.hosted_url = Some(hosted_url.clone());
                    vec![Effect::OpenHostedCheckout(hosted_url), Effect::Notify(notice)]
                }

                (Phase::Executing, Event::TransferSubmitted { hash }) => {
                    attempt.phase = Phase::Succeeded;
                    let notice = Notice::success(format!("Transfer submitted: {}", hash));
                    attempt.transaction_hash = Some(hash);
                    vec![Effect::Notify(notice)]
                }

                _ => return Err(rejected),
            }
        }
    };

    Ok((next, effects))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product() -> Product {
        Product::new("Smart Contract Scanner", "0.01")
    }

    fn verdict(safe: bool, risk: f64) -> AnalysisResult {
        AnalysisResult {
            safe,
            risk_percent: risk,
            findings: vec!["Informational: ok".to_string()],
            recommendation: None,
            details: None,
            synthetic: false,
        }
    }

    fn step(state: &CheckoutState, event: Event) -> (CheckoutState, Vec<Effect>) {
        transition(state, event).unwrap()
    }

    fn awaiting_approval() -> CheckoutState {
        let (state, _) = step(&CheckoutState::default(), Event::Trigger(product()));
        step(&state, Event::AnalysisSettled(verdict(true, 8.0))).0
    }

    #[test]
    fn test_trigger_starts_attempt() {
        let (state, effects) = step(&CheckoutState::default(), Event::Trigger(product()));
        assert_eq!(state.phase(), Phase::Analyzing);
        assert_eq!(state.attempt().unwrap().number, 1);
        assert!(matches!(effects[0], Effect::RequestAnalysis));
    }

    #[test]
    fn test_trigger_rejected_while_busy() {
        let (analyzing, _) = step(&CheckoutState::default(), Event::Trigger(product()));
        let awaiting = awaiting_approval();
        let (executing, _) = step(&awaiting, Event::Approve);

        for state in [analyzing, awaiting, executing] {
            let err = transition(&state, Event::Trigger(product())).unwrap_err();
            assert_eq!(err.phase, state.phase());
            assert_eq!(err.event, "trigger");
        }
    }

    #[test]
    fn test_safe_verdict_prompts_approval() {
        let (state, _) = step(&CheckoutState::default(), Event::Trigger(product()));
        let (state, effects) = step(&state, Event::AnalysisSettled(verdict(true, 8.0)));
        assert_eq!(state.phase(), Phase::AwaitingApproval);
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::PromptApproval(r) if r.security_score() == 92)));
    }

    #[test]
    fn test_unsafe_verdict_blocks() {
        let (state, _) = step(&CheckoutState::default(), Event::Trigger(product()));
        let (state, effects) = step(&state, Event::AnalysisSettled(verdict(false, 80.0)));
        assert_eq!(state.phase(), Phase::Blocked);

        let failure = state.attempt().unwrap().failure.clone().unwrap();
        assert_eq!(failure.reason, FailureReason::UnsafeVerdict);
        assert!(failure.message.contains("security score 20/100"));
        assert!(!effects
            .iter()
            .any(|e| matches!(e, Effect::PromptApproval(_) | Effect::Execute { .. })));
    }

    #[test]
    fn test_analysis_failure_fails_attempt() {
        let (state, _) = step(&CheckoutState::default(), Event::Trigger(product()));
        let failure = Failure::new(FailureReason::Network, "Timeout exceeded after 30s");
        let (state, effects) = step(&state, Event::AnalysisFailed(failure.clone()));
        assert_eq!(state.phase(), Phase::Failed);
        assert_eq!(state.attempt().unwrap().failure, Some(failure));
        match &effects[0] {
            Effect::Notify(notice) => {
                assert_eq!(notice.level, NoticeLevel::Error);
                assert_eq!(notice.message, "Timeout exceeded after 30s");
            }
            other => panic!("unexpected effect: {other:?}"),
        }
    }

    #[test]
    fn test_approve_executes_with_analysis() {
        let (state, effects) = step(&awaiting_approval(), Event::Approve);
        assert_eq!(state.phase(), Phase::Executing);
        match &effects[..] {
            [Effect::Execute { product: p, analysis }] => {
                assert_eq!(p, &product());
                assert!(analysis.is_some());
            }
            other => panic!("unexpected effects: {other:?}"),
        }
    }

    #[test]
    fn test_decline_cancels_without_execution() {
        let (state, effects) = step(&awaiting_approval(), Event::Decline);
        assert_eq!(state.phase(), Phase::Cancelled);
        assert!(!effects.iter().any(|e| matches!(e, Effect::Execute { .. })));
    }

    #[test]
    fn test_charge_created_opens_hosted_page() {
        let (state, _) = step(&awaiting_approval(), Event::Approve);
        let (state, effects) = step(
            &state,
            Event::ChargeCreated {
                id: "charge-1".to_string(),
                hosted_url: "https://commerce.example/pay/1".to_string(),
            },
        );
        assert_eq!(state.phase(), Phase::Succeeded);
        assert_eq!(state.attempt().unwrap().charge_id.as_deref(), Some("charge-1"));
        assert_eq!(
            effects[0],
            Effect::OpenHostedCheckout("https://commerce.example/pay/1".to_string())
        );
    }

    #[test]
    fn test_transfer_submitted_records_hash() {
        let (state, _) = step(&awaiting_approval(), Event::Approve);
        let (state, _) = step(
            &state,
            Event::TransferSubmitted {
                hash: "0xabc".to_string(),
            },
        );
        assert_eq!(state.phase(), Phase::Succeeded);
        assert_eq!(
            state.attempt().unwrap().transaction_hash.as_deref(),
            Some("0xabc")
        );
    }

    #[test]
    fn test_retrigger_after_terminal_starts_fresh_attempt() {
        let (state, _) = step(&awaiting_approval(), Event::Decline);
        let (state, _) = step(&state, Event::Trigger(product()));
        let attempt = state.attempt().unwrap();
        assert_eq!(attempt.number, 2);
        assert!(attempt.analysis.is_none());
        assert!(attempt.failure.is_none());
    }

    #[test]
    fn test_trigger_refused_while_blocked_until_reset() {
        let (state, _) = step(&CheckoutState::default(), Event::Trigger(product()));
        let (blocked, _) = step(&state, Event::AnalysisSettled(verdict(false, 80.0)));

        let err = transition(&blocked, Event::Trigger(product())).unwrap_err();
        assert_eq!(err.phase, Phase::Blocked);
        assert_eq!(blocked.attempts_started(), 1);

        let (idle, _) = step(&blocked, Event::Reset);
        let (state, effects) = step(&idle, Event::Trigger(product()));
        assert_eq!(state.phase(), Phase::Analyzing);
        assert_eq!(state.attempt().unwrap().number, 2);
        assert_eq!(effects[0], Effect::RequestAnalysis);
    }

    #[test]
    fn test_phase_predicates() {
        assert!(Phase::Idle.accepts_trigger());
        assert!(Phase::Failed.accepts_trigger());
        assert!(!Phase::Blocked.accepts_trigger());
        assert!(!Phase::Executing.accepts_trigger());
        assert!(Phase::Blocked.is_terminal());
        assert!(!Phase::Idle.is_terminal());
        assert!(!Phase::AwaitingApproval.is_terminal());
    }

    #[test]
    fn test_reset() {
        let (state, _) = step(&awaiting_approval(), Event::Decline);
        let (state, effects) = step(&state, Event::Reset);
        assert_eq!(state.phase(), Phase::Idle);
        assert!(effects.is_empty());
        assert_eq!(state.attempts_started(), 1);

        assert!(transition(&awaiting_approval(), Event::Reset).is_err());
    }

    #[test]
    fn test_out_of_order_events_are_rejected() {
        let idle = CheckoutState::default();
        assert!(transition(&idle, Event::Approve).is_err());
        assert!(transition(&idle, Event::AnalysisSettled(verdict(true, 0.0))).is_err());

        let (analyzing, _) = step(&idle, Event::Trigger(product()));
        assert!(transition(&analyzing, Event::Approve).is_err());
        assert!(transition(
            &analyzing,
            Event::TransferSubmitted {
                hash: "0x1".to_string()
            }
        )
        .is_err());
    }
}
