//! # guarded-checkout
//!
//! Crypto checkout that refuses to pay an unsafe contract.
//!
//! Before any funds move, the contract behind the payment is sent to a security
//! analysis gateway. An unsafe verdict blocks the payment outright; a safe one is shown
//! to the shopper, who must confirm before the payment is requested, either as a
//! hosted-checkout charge or as a direct stablecoin transfer from their wallet.
//!
//! ## Features
//!
//! - **Orchestration**: a pure checkout state machine plus an async driver
//! - **Analysis**: HTTP gateway client with per-attempt timeouts, retries and an
//!   opt-in fallback for unreachable gateways
//! - **Hosted checkout**: charge creation through a storefront backend
//! - **Direct transfers**: ERC-20 `transfer` call data, network switching and
//!   submission through an injected wallet provider
//! - **Server glue**: framework-agnostic handlers for the storefront endpoints and a
//!   signed webhook receiver
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use guarded_checkout::analysis::{AnalysisConfig, HttpAnalysisGateway};
//! use guarded_checkout::client::{StorefrontClient, StorefrontConfig};
//! use guarded_checkout::orchestrator::{Decision, Orchestrator, PaymentRail, Phase, Product};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let gateway = HttpAnalysisGateway::new(AnalysisConfig::from_env()?)?;
//! let storefront = StorefrontClient::new(StorefrontConfig::new("http://localhost:3000"))?;
//!
//! let orchestrator = Orchestrator::new(
//!     Arc::new(gateway),
//!     PaymentRail::HostedCheckout(Arc::new(storefront)),
//! );
//!
//! let phase = orchestrator
//!     .checkout(Product::new("Smart Contract Scanner", "0.01"), &Decision::Approve)
//!     .await;
//! assert_eq!(phase, Phase::Succeeded);
//! # Ok(())
//! # }
//! ```
//!
//! ## Checkout Flow
//!
//! 1. **Trigger**: the shopper presses pay; a second press while busy is ignored
//! 2. **Analyze**: the gateway judges the contract
//! 3. **Block or ask**: unsafe stops here; safe opens the approval prompt
//! 4. **Execute**: on approval, create the charge or submit the transfer
//! 5. **Settle**: the attempt ends succeeded, failed, blocked or cancelled

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod analysis;
pub mod client;
pub mod errors;
pub mod orchestrator;
pub mod presentation;
pub mod retry;
pub mod server;
pub mod transfer;
pub mod types;
pub mod utils;
pub mod wallet;
pub mod webhook;

// Re-export commonly used items
pub use analysis::{AnalysisGateway, AnalysisResult, ContractTarget, FallbackPolicy};
pub use errors::{CheckoutError, Failure, FailureReason, Result};
pub use orchestrator::{Orchestrator, PaymentRail, Phase, Product};
pub use retry::RetryPolicy;
