//! Terminal checkout against a running storefront.
//!
//! Runs the full wizard: analysis, an approval prompt on stdin, then payment.
//!
//! Run with:
//! ```bash
//! cargo run --example checkout -- [--direct] [--fallback] [PRODUCT] [PRICE]
//! ```
//!
//! `--direct` pays with a PYUSD transfer through the wallet at `WALLET_RPC_URL`
//! instead of a hosted charge. `--fallback` accepts a synthetic result when the
//! analysis gateway is unreachable.
//!
//! Environment variables:
//! - STOREFRONT_URL: storefront backend (default: http://localhost:3000)
//! - ANALYSIS_API_URL, ANALYSIS_API_KEY: call the gateway directly instead of
//!   through the storefront
//! - WALLET_RPC_URL: JSON-RPC wallet endpoint for `--direct`

use async_trait::async_trait;
use guarded_checkout::analysis::{
    AnalysisConfig, AnalysisResult, ContractTarget, FallbackPolicy, HttpAnalysisGateway,
};
use guarded_checkout::client::{StorefrontClient, StorefrontConfig};
use guarded_checkout::orchestrator::{
    Approver, CheckoutUi, Decision, DirectTransfer, Notice, NoticeLevel, Orchestrator,
    PaymentRail, Product,
};
use guarded_checkout::presentation::CheckoutView;
use guarded_checkout::retry::RetryPolicy;
use guarded_checkout::wallet::rpc::RpcWallet;
use std::io::Write;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

struct TerminalUi;

impl CheckoutUi for TerminalUi {
    fn render(&self, view: &CheckoutView) {
        if let Some(status) = &view.status_line {
            println!("   [{}] {}", view.pay_button.label, status);
        }
    }

    fn notify(&self, notice: &Notice) {
        let marker = match notice.level {
            NoticeLevel::Info => "ℹ️",
            NoticeLevel::Success => "✅",
            NoticeLevel::Error => "❌",
        };
        println!("{} {}", marker, notice.message);
    }

    fn open_hosted_checkout(&self, url: &str) {
        println!("🔗 Complete your payment at: {}", url);
    }
}

struct TerminalApprover;

#[async_trait]
impl Approver for TerminalApprover {
    async fn decide(&self, analysis: &AnalysisResult) -> Decision {
        println!();
        println!("🔍 Security analysis");
        println!("   Score: {}/100 ({:?})", analysis.security_score(), analysis.band());
        if analysis.synthetic {
            println!("   ⚠️  Fallback data: the analysis service could not be reached");
        }
        for finding in &analysis.findings {
            println!("   - {}", finding);
        }
        print!("Proceed with payment? [y/N] ");
        let _ = std::io::stdout().flush();

        let answer = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).map(|_| line)
        })
        .await;

        match answer {
            Ok(Ok(line)) if line.trim().eq_ignore_ascii_case("y") => Decision::Approve,
            _ => Decision::Decline,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let mut direct = false;
    let mut fallback = false;
    let mut positional = Vec::new();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--direct" => direct = true,
            "--fallback" => fallback = true,
            _ => positional.push(arg),
        }
    }
    let mut positional = positional.into_iter();
    let product = Product::new(
        positional.next().unwrap_or_else(|| "Smart Contract Scanner".to_string()),
        positional.next().unwrap_or_else(|| "0.01".to_string()),
    );

    let storefront_url =
        std::env::var("STOREFRONT_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
    let storefront = Arc::new(StorefrontClient::new(StorefrontConfig::new(&storefront_url))?);

    let retry = if fallback {
        RetryPolicy::fast()
    } else {
        RetryPolicy::default()
    };
    let (analysis, target) = match AnalysisConfig::from_env() {
        Ok(config) => (
            config,
            ContractTarget::source(
                guarded_checkout::server::TRANSFERS_CONTRACT_NAME,
                guarded_checkout::server::TRANSFERS_CONTRACT_SOURCE,
            ),
        ),
        // The storefront proxy holds the real key and ignores this one.
        Err(_) => (
            AnalysisConfig::new(format!("{}/api/analyze-contract", storefront_url), "storefront"),
            ContractTarget::ServerHeld,
        ),
    };
    let gateway = HttpAnalysisGateway::new(analysis.with_retry(retry))?;

    let rail = if direct {
        let mut rail = DirectTransfer::new(storefront.clone());
        if let Ok(url) = std::env::var("WALLET_RPC_URL") {
            rail = rail.with_wallet(Arc::new(RpcWallet::new(&url)?));
        }
        PaymentRail::DirectTransfer(rail)
    } else {
        PaymentRail::HostedCheckout(storefront)
    };

    let orchestrator = Orchestrator::new(Arc::new(gateway), rail)
        .with_target(target)
        .with_fallback(if fallback {
            FallbackPolicy::SyntheticSafe
        } else {
            FallbackPolicy::Disabled
        })
        .with_ui(Arc::new(TerminalUi));

    println!("🛒 {} for ${}", product.name, product.price);
    let phase = orchestrator.checkout(product, &TerminalApprover).await;

    let view = orchestrator.view().await;
    println!();
    println!("Finished: {:?}", phase);
    if let Some(reference) = view.reference {
        println!("Reference: {}", reference);
    }

    Ok(())
}
