//! Payment orchestration.
//!
//! The [`Orchestrator`] drives one checkout at a time: analyze the contract, ask the
//! shopper, then request funds over the configured [`PaymentRail`]. Decisions are made
//! by the pure [`transition`] function; the orchestrator only performs the effects it
//! returns and feeds the outcomes back in as events.
//!
//! The state lock is taken only to apply a transition. Collaborator calls run without
//! it, so a snapshot can always be read and a second trigger is refused immediately.

mod machine;

pub use machine::{
    blocked_message, transition, CheckoutState, Effect, Event, Notice, NoticeLevel,
    PaymentAttempt, Phase, Product, Rejected,
};

use crate::analysis::{
    analyze_with_fallback, AnalysisGateway, AnalysisResult, ContractTarget, FallbackPolicy,
};
use crate::client::{ChargeService, TransferPreparation};
use crate::errors::{CheckoutError, Failure, Result};
use crate::presentation::CheckoutView;
use crate::types::{ChargeRequest, TransferRequest};
use crate::wallet::{NetworkDefinition, WalletProvider, WalletSession};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

/// Direct token transfer from the shopper's wallet.
#[derive(Clone)]
pub struct DirectTransfer {
    /// Computes the transfer for a price
    pub preparation: Arc<dyn TransferPreparation>,
    /// Injected wallet, if one is present
    pub wallet: Option<Arc<dyn WalletProvider>>,
    /// Network the token lives on
    pub network: NetworkDefinition,
    /// Recipient override sent with the preparation request
    pub recipient: Option<String>,
}

impl DirectTransfer {
    /// Transfer on Sepolia with no wallet attached yet.
    pub fn new(preparation: Arc<dyn TransferPreparation>) -> Self {
        Self {
            preparation,
            wallet: None,
            network: NetworkDefinition::sepolia(),
            recipient: None,
        }
    }

    /// Attaches the wallet provider.
    pub fn with_wallet(mut self, wallet: Arc<dyn WalletProvider>) -> Self {
        self.wallet = Some(wallet);
        self
    }

    /// Sets the payment network.
    pub fn with_network(mut self, network: NetworkDefinition) -> Self {
        self.network = network;
        self
    }

    /// Overrides the merchant's recipient.
    pub fn with_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }
}

/// How funds are requested once the shopper approves.
#[derive(Clone)]
pub enum PaymentRail {
    /// Create a charge and send the shopper to the processor's page
    HostedCheckout(Arc<dyn ChargeService>),
    /// Have the shopper's wallet submit a token transfer
    DirectTransfer(DirectTransfer),
}

/// Where the orchestrator reports progress.
///
/// Every method has a no-op default.
pub trait CheckoutUi: Send + Sync {
    /// Called after every transition.
    fn render(&self, _view: &CheckoutView) {}

    /// Called for every notice.
    fn notify(&self, _notice: &Notice) {}

    /// Called when the approval modal should open.
    fn prompt_approval(&self, _analysis: &AnalysisResult) {}

    /// Called with the hosted checkout page to open.
    fn open_hosted_checkout(&self, _url: &str) {}
}

/// [`CheckoutUi`] that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingUi;

impl CheckoutUi for TracingUi {
    fn render(&self, view: &CheckoutView) {
        debug!(phase = ?view.phase, button = view.pay_button.label, "render");
    }

    fn notify(&self, notice: &Notice) {
        info!(level = ?notice.level, reason = ?notice.reason, "{}", notice.message);
    }

    fn open_hosted_checkout(&self, url: &str) {
        info!(%url, "open hosted checkout");
    }
}

/// Shopper's answer to the approval prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Go ahead
    Approve,
    /// Stop here
    Decline,
}

/// Produces the approval decision for [`Orchestrator::checkout`].
#[async_trait]
pub trait Approver: Send + Sync {
    /// Decides after seeing the analysis.
    async fn decide(&self, analysis: &AnalysisResult) -> Decision;
}

#[async_trait]
impl Approver for Decision {
    async fn decide(&self, _analysis: &AnalysisResult) -> Decision {
        *self
    }
}

/// Drives payment attempts through analysis, approval and execution.
pub struct Orchestrator {
    gateway: Arc<dyn AnalysisGateway>,
    target: ContractTarget,
    fallback: FallbackPolicy,
    rail: PaymentRail,
    ui: Arc<dyn CheckoutUi>,
    state: Mutex<CheckoutState>,
}

impl Orchestrator {
    /// Creates an orchestrator analyzing the gateway's own contract, without fallback.
    pub fn new(gateway: Arc<dyn AnalysisGateway>, rail: PaymentRail) -> Self {
        Self {
            gateway,
            target: ContractTarget::ServerHeld,
            fallback: FallbackPolicy::Disabled,
            rail,
            ui: Arc::new(TracingUi),
            state: Mutex::new(CheckoutState::default()),
        }
    }

    /// Sets the contract to analyze.
    pub fn with_target(mut self, target: ContractTarget) -> Self {
        self.target = target;
        self
    }

    /// Sets the fallback policy for an unreachable gateway.
    pub fn with_fallback(mut self, fallback: FallbackPolicy) -> Self {
        self.fallback = fallback;
        self
    }

    /// Sets the UI sink.
    pub fn with_ui(mut self, ui: Arc<dyn CheckoutUi>) -> Self {
        self.ui = ui;
        self
    }

    /// Snapshot of the state.
    pub async fn state(&self) -> CheckoutState {
        self.state.lock().await.clone()
    }

    /// Current phase.
    pub async fn phase(&self) -> Phase {
        self.state.lock().await.phase()
    }

    /// Snapshot of what the checkout shows.
    pub async fn view(&self) -> CheckoutView {
        CheckoutView::from_state(&*self.state.lock().await)
    }

    /// Starts a payment and runs it up to the approval prompt or a terminal phase.
    ///
    /// While another attempt is underway, or the last one was blocked and not yet
    /// reset, the trigger is ignored and the current phase is returned.
    pub async fn pay(&self, product: Product) -> Phase {
        match self.run(Event::Trigger(product)).await {
            Ok(phase) => phase,
            Err(rejected) => {
                debug!(%rejected, "trigger ignored");
                rejected.phase
            }
        }
    }

    /// Confirms the pending payment and requests funds.
    pub async fn approve(&self) -> std::result::Result<Phase, Rejected> {
        self.run(Event::Approve).await
    }

    /// Declines the pending payment.
    pub async fn decline(&self) -> std::result::Result<Phase, Rejected> {
        self.run(Event::Decline).await
    }

    /// Clears a finished attempt.
    pub async fn reset(&self) -> std::result::Result<Phase, Rejected> {
        self.run(Event::Reset).await
    }

    /// Runs the whole wizard, asking `approver` when the analysis passes.
    pub async fn checkout(&self, product: Product, approver: &dyn Approver) -> Phase {
        let phase = match self.run(Event::Trigger(product)).await {
            Ok(phase) => phase,
            Err(rejected) => {
                debug!(%rejected, "trigger ignored");
                return rejected.phase;
            }
        };
        if phase != Phase::AwaitingApproval {
            return phase;
        }

        let analysis = self.state().await.attempt().and_then(|a| a.analysis.clone());
        let Some(analysis) = analysis else {
            return phase;
        };

        let outcome = match approver.decide(&analysis).await {
            Decision::Approve => self.approve().await,
            Decision::Decline => self.decline().await,
        };
        outcome.unwrap_or_else(|rejected| {
            warn!(%rejected, "approval arrived too late");
            rejected.phase
        })
    }

    /// Applies one event under the lock and renders the result.
    async fn dispatch(&self, event: Event) -> std::result::Result<Vec<Effect>, Rejected> {
        let (view, effects) = {
            let mut state = self.state.lock().await;
            let (next, effects) = transition(&state, event)?;
            *state = next;
            (CheckoutView::from_state(&state), effects)
        };
        self.ui.render(&view);
        Ok(effects)
    }

    /// Dispatches `event` and performs effects until none are left.
    async fn run(&self, event: Event) -> std::result::Result<Phase, Rejected> {
        let mut queue: VecDeque<Effect> = self.dispatch(event).await?.into();

        while let Some(effect) = queue.pop_front() {
            let follow_up = match effect {
                Effect::Notify(notice) => {
                    self.ui.notify(&notice);
                    continue;
                }
                Effect::PromptApproval(analysis) => {
                    self.ui.prompt_approval(&analysis);
                    continue;
                }
                Effect::OpenHostedCheckout(url) => {
                    self.ui.open_hosted_checkout(&url);
                    continue;
                }
                Effect::RequestAnalysis => self.analyze().await,
                Effect::Execute { product, analysis } => {
                    self.execute(&product, analysis.as_ref()).await
                }
            };

            match self.dispatch(follow_up).await {
                Ok(effects) => queue.extend(effects),
                Err(rejected) => warn!(%rejected, "dropping stale outcome"),
            }
        }

        Ok(self.phase().await)
    }

    async fn analyze(&self) -> Event {
        match analyze_with_fallback(self.gateway.as_ref(), &self.target, self.fallback).await {
            Ok(result) => Event::AnalysisSettled(result),
            Err(err) => {
                error!(error = %err, "contract analysis failed");
                Event::AnalysisFailed(Failure::from(&err))
            }
        }
    }

    #[instrument(skip_all, fields(product = %product.name, price = %product.price))]
    async fn execute(&self, product: &Product, analysis: Option<&AnalysisResult>) -> Event {
        let outcome = match &self.rail {
            PaymentRail::HostedCheckout(charges) => {
                self.create_charge(charges.as_ref(), product, analysis).await
            }
            PaymentRail::DirectTransfer(rail) => self
                .transfer(rail, product)
                .await
                .map(|hash| Event::TransferSubmitted { hash }),
        };

        outcome.unwrap_or_else(|err| {
            error!(error = %err, "payment execution failed");
            Event::ExecutionFailed(Failure::from(&err))
        })
    }

    async fn create_charge(
        &self,
        charges: &dyn ChargeService,
        product: &Product,
        analysis: Option<&AnalysisResult>,
    ) -> Result<Event> {
        let request = ChargeRequest {
            product_name: product.name.clone(),
            product_price: product.price.clone(),
            contract_analysis: analysis.map(serde_json::to_value).transpose()?,
        };
        let charge = charges.create_charge(&request).await?;
        Ok(Event::ChargeCreated {
            id: charge.id,
            hosted_url: charge.hosted_url,
        })
    }

    async fn transfer(&self, rail: &DirectTransfer, product: &Product) -> Result<String> {
        let wallet = rail.wallet.as_deref().ok_or(CheckoutError::ProviderNotFound)?;

        let details = rail
            .preparation
            .prepare(&TransferRequest {
                product_price: product.price.clone(),
                recipient_address: rail.recipient.clone(),
            })
            .await?;
        details.verify_price(&product.price)?;
        if details.chain_id != rail.network.chain_id {
            return Err(CheckoutError::TransferPreparationError(format!(
                "transfer is for chain {} but checkout pays on {}",
                details.chain_id, rail.network.chain_id
            )));
        }

        let session = WalletSession::establish(wallet, &rail.network).await?;
        let tx = details.transaction(session.account);
        debug!(to = %tx.to, amount = %details.amount, symbol = %details.symbol, "submitting transfer");

        let hash = wallet.send_transaction(&tx).await?;
        info!(%hash, "transfer submitted");
        Ok(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FailureReason;
    use crate::transfer::{TransferDetails, TransferTerms};
    use crate::types::{ChargeDetails, ChargeSummary, TransactionRequest};
    use crate::wallet::WalletError;
    use std::sync::Mutex as StdMutex;

    const MERCHANT: &str = "0xb43c9f0f2bb65a37761e7867a6f1903799f45d65";
    const SHOPPER: &str = "0x742d35cc6634c0532925a3b844bc9e7595f0beb0";

    struct FixedGateway(AnalysisResult);

    #[async_trait]
    impl AnalysisGateway for FixedGateway {
        async fn analyze(&self, _target: &ContractTarget) -> Result<AnalysisResult> {
            Ok(self.0.clone())
        }
    }

    struct Charges;

    #[async_trait]
    impl ChargeService for Charges {
        async fn create_charge(&self, request: &ChargeRequest) -> Result<ChargeSummary> {
            assert!(request.contract_analysis.is_some());
            Ok(ChargeSummary {
                id: "charge-1".to_string(),
                code: "ABC".to_string(),
                hosted_url: "https://commerce.example/pay/ABC".to_string(),
                pricing: None,
            })
        }

        async fn charge_status(&self, _charge_id: &str) -> Result<ChargeDetails> {
            Err(CheckoutError::ChargeError("not used".to_string()))
        }
    }

    struct Terms;

    #[async_trait]
    impl TransferPreparation for Terms {
        async fn prepare(&self, request: &TransferRequest) -> Result<TransferDetails> {
            TransferTerms::pyusd_sepolia(Some(MERCHANT))?.prepare(&request.product_price, None)
        }
    }

    #[derive(Default)]
    struct Wallet {
        sent: StdMutex<Vec<TransactionRequest>>,
    }

    #[async_trait]
    impl WalletProvider for Wallet {
        async fn request_accounts(&self) -> std::result::Result<Vec<String>, WalletError> {
            Ok(vec![SHOPPER.to_string()])
        }

        async fn switch_chain(&self, _chain_id: u64) -> std::result::Result<(), WalletError> {
            Ok(())
        }

        async fn add_chain(
            &self,
            _network: &NetworkDefinition,
        ) -> std::result::Result<(), WalletError> {
            Ok(())
        }

        async fn send_transaction(
            &self,
            tx: &TransactionRequest,
        ) -> std::result::Result<String, WalletError> {
            self.sent.lock().unwrap().push(tx.clone());
            Ok("0xfeed".to_string())
        }
    }

    fn safe() -> AnalysisResult {
        AnalysisResult {
            safe: true,
            risk_percent: 8.0,
            findings: Vec::new(),
            recommendation: None,
            details: None,
            synthetic: false,
        }
    }

    fn product() -> Product {
        Product::new("Smart Contract Scanner", "10.00")
    }

    #[tokio::test]
    async fn test_hosted_checkout_flow() {
        let orchestrator = Orchestrator::new(
            Arc::new(FixedGateway(safe())),
            PaymentRail::HostedCheckout(Arc::new(Charges)),
        );

        assert_eq!(orchestrator.pay(product()).await, Phase::AwaitingApproval);
        assert!(orchestrator.view().await.approval.is_some());
        assert_eq!(orchestrator.approve().await.unwrap(), Phase::Succeeded);

        let state = orchestrator.state().await;
        let attempt = state.attempt().unwrap();
        assert_eq!(attempt.charge_id.as_deref(), Some("charge-1"));
        assert_eq!(
            attempt.hosted_url.as_deref(),
            Some("https://commerce.example/pay/ABC")
        );
    }

    #[tokio::test]
    async fn test_direct_transfer_flow() {
        let wallet = Arc::new(Wallet::default());
        let rail = DirectTransfer::new(Arc::new(Terms)).with_wallet(wallet.clone());
        let orchestrator = Orchestrator::new(
            Arc::new(FixedGateway(safe())),
            PaymentRail::DirectTransfer(rail),
        );

        let phase = orchestrator.checkout(product(), &Decision::Approve).await;
        assert_eq!(phase, Phase::Succeeded);

        let sent = wallet.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].data.ends_with("989680"));
        assert_eq!(sent[0].from.to_lowercase(), SHOPPER);
    }

    #[tokio::test]
    async fn test_missing_wallet_fails() {
        let rail = DirectTransfer::new(Arc::new(Terms));
        let orchestrator = Orchestrator::new(
            Arc::new(FixedGateway(safe())),
            PaymentRail::DirectTransfer(rail),
        );

        let phase = orchestrator.checkout(product(), &Decision::Approve).await;
        assert_eq!(phase, Phase::Failed);
        let state = orchestrator.state().await;
        let failure = state.attempt().unwrap().failure.clone().unwrap();
        assert_eq!(failure.reason, FailureReason::ProviderNotFound);
    }

    #[tokio::test]
    async fn test_reset_after_decline() {
        let orchestrator = Orchestrator::new(
            Arc::new(FixedGateway(safe())),
            PaymentRail::HostedCheckout(Arc::new(Charges)),
        );
        assert_eq!(
            orchestrator.checkout(product(), &Decision::Decline).await,
            Phase::Cancelled
        );
        assert_eq!(orchestrator.reset().await.unwrap(), Phase::Idle);
        assert!(orchestrator.approve().await.is_err());
    }
}
