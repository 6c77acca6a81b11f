//! Example storefront backend using Axum.
//!
//! Mounts the checkout endpoints: contract analysis, charge creation and status,
//! transfer preparation and the Commerce webhook.
//!
//! Run with:
//! ```bash
//! cargo run --example storefront
//! ```
//!
//! Environment variables (a `.env` file is read if present):
//! - ANALYSIS_API_URL, ANALYSIS_API_KEY: analysis gateway
//! - COMMERCE_API_KEY: hosted checkout charges
//! - COMMERCE_WEBHOOK_SECRET: webhook signatures
//! - MERCHANT_WALLET_ADDRESS: recipient of direct transfers
//! - PORT: Server port (default: 3000)

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use guarded_checkout::analysis::{AnalysisConfig, AnalysisGateway, HttpAnalysisGateway};
use guarded_checkout::server::{
    handle_analyze, handle_charge_status, handle_create_charge, handle_prepare_transfer,
    CommerceClient, MerchantConfig, Reply,
};
use guarded_checkout::types::{ChargeRequest, TransferRequest};
use guarded_checkout::webhook::{handle_webhook, SIGNATURE_HEADER};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

struct AppState {
    merchant: MerchantConfig,
    gateway: Option<HttpAnalysisGateway>,
    commerce: Option<CommerceClient>,
}

impl AppState {
    fn gateway(&self) -> Option<&dyn AnalysisGateway> {
        self.gateway.as_ref().map(|g| g as &dyn AnalysisGateway)
    }
}

fn respond<T: Serialize>(reply: Reply<T>) -> Response {
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(reply.body)).into_response()
}

async fn analyze_handler(State(state): State<Arc<AppState>>) -> Response {
    respond(handle_analyze(state.gateway(), &state.merchant.analysis_target()).await)
}

async fn create_charge_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChargeRequest>,
) -> Response {
    respond(handle_create_charge(&request, &state.merchant, state.commerce.as_ref()).await)
}

async fn charge_status_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    respond(handle_charge_status(&id, state.commerce.as_ref()).await)
}

async fn transfer_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TransferRequest>,
) -> Response {
    respond(handle_prepare_transfer(&request, &state.merchant))
}

async fn webhook_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    respond(
        handle_webhook(
            &body,
            signature,
            state.merchant.webhook_secret.as_deref(),
            state.gateway(),
        )
        .await,
    )
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

async fn root_handler() -> impl IntoResponse {
    Json(json!({
        "message": "guarded-checkout storefront",
        "endpoints": {
            "POST /api/analyze-contract": "Security analysis of the merchant contract",
            "POST /api/create-charge": "Hosted checkout charge",
            "GET /api/charge-status/{id}": "Charge details",
            "POST /api/pyusd-transfer": "Direct PYUSD transfer parameters",
            "POST /api/webhook": "Commerce webhook receiver"
        }
    }))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,guarded_checkout=debug")),
        )
        .init();

    let port = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse::<u16>()?;

    let merchant = MerchantConfig::from_env()?;
    let gateway = match AnalysisConfig::from_env().and_then(HttpAnalysisGateway::new) {
        Ok(gateway) => Some(gateway),
        Err(err) => {
            warn!(error = %err, "contract analysis disabled");
            None
        }
    };
    let commerce = merchant.commerce_client();
    if commerce.is_none() {
        warn!("COMMERCE_API_KEY not set, hosted checkout disabled");
    }

    info!(
        recipient = ?merchant.terms.default_recipient,
        token = %merchant.terms.symbol,
        chain_id = merchant.terms.chain_id,
        "merchant configured"
    );

    let state = Arc::new(AppState {
        merchant,
        gateway,
        commerce,
    });

    let app = Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/api/analyze-contract", post(analyze_handler))
        .route("/api/create-charge", post(create_charge_handler))
        .route("/api/charge-status/:id", get(charge_status_handler))
        .route("/api/pyusd-transfer", post(transfer_handler))
        .route("/api/webhook", post(webhook_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("storefront listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
