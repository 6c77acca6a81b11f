//! Client side of the storefront API.
//!
//! A checkout running in front of a merchant backend reaches it through two seams:
//! [`ChargeService`] for hosted checkout and [`TransferPreparation`] for direct token
//! transfers. [`StorefrontClient`] implements both over HTTP against the endpoints
//! mounted by the storefront server.

use crate::errors::{CheckoutError, Result};
use crate::transfer::TransferDetails;
use crate::types::{
    ChargeDetails, ChargeRequest, ChargeResponse, ChargeStatusResponse, ChargeSummary,
    TransferRequest, TransferResponse,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use crate::utils::{base_url, endpoint_url};
use tracing::{debug, info, instrument};
use url::Url;

/// Creates hosted-checkout charges.
#[async_trait]
pub trait ChargeService: Send + Sync {
    /// Creates a charge and returns where the shopper pays it.
    async fn create_charge(&self, request: &ChargeRequest) -> Result<ChargeSummary>;

    /// Looks up a charge by id.
    async fn charge_status(&self, charge_id: &str) -> Result<ChargeDetails>;
}

/// Computes direct-transfer parameters for a price.
#[async_trait]
pub trait TransferPreparation: Send + Sync {
    /// Returns the transfer the shopper should sign.
    async fn prepare(&self, request: &TransferRequest) -> Result<TransferDetails>;
}

/// Configuration for [`StorefrontClient`].
#[derive(Clone, Debug)]
pub struct StorefrontConfig {
    /// Base URL of the storefront backend
    pub base_url: String,

    /// HTTP client to use for requests
    pub http_client: Client,
}

impl StorefrontConfig {
    /// Creates a configuration for the backend at `base_url`.
    ///
    /// # Examples
    ///
    /// ```
    /// use guarded_checkout::client::StorefrontConfig;
    ///
    /// let config = StorefrontConfig::new("http://localhost:3000");
    /// assert_eq!(config.base_url, "http://localhost:3000");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http_client: Client::new(),
        }
    }

    /// Sets a custom HTTP client.
    pub fn with_client(mut self, client: Client) -> Self {
        self.http_client = client;
        self
    }
}

/// HTTP client for the storefront backend.
#[derive(Clone, Debug)]
pub struct StorefrontClient {
    base_url: Url,
    http_client: Client,
}

impl StorefrontClient {
    /// Validates the base URL and builds the client.
    pub fn new(config: StorefrontConfig) -> Result<Self> {
        Ok(Self {
            base_url: base_url(&config.base_url)?,
            http_client: config.http_client,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        endpoint_url(&self.base_url, segments)
    }

    async fn read<T: DeserializeOwned>(response: reqwest::Response) -> Result<(u16, T)> {
        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(status, body = %body, "storefront response");
        Ok((status, serde_json::from_str(&body)?))
    }
}

#[async_trait]
impl ChargeService for StorefrontClient {
    #[instrument(skip_all, fields(product = %request.product_name))]
    async fn create_charge(&self, request: &ChargeRequest) -> Result<ChargeSummary> {
        let url = self.endpoint(&["api", "create-charge"])?;
        let response = self.http_client.post(url).json(request).send().await?;
        let (status, reply): (u16, ChargeResponse) = Self::read(response).await?;

        match reply.charge {
            Some(charge) if reply.success => {
                info!(charge_id = %charge.id, "charge created");
                Ok(charge)
            }
            _ => Err(CheckoutError::ChargeError(reply.error.unwrap_or_else(|| {
                format!("charge creation failed with status {status}")
            }))),
        }
    }

    #[instrument(skip(self))]
    async fn charge_status(&self, charge_id: &str) -> Result<ChargeDetails> {
        let url = self.endpoint(&["api", "charge-status", charge_id])?;
        let response = self.http_client.get(url).send().await?;
        let (status, reply): (u16, ChargeStatusResponse) = Self::read(response).await?;

        match reply.charge {
            Some(charge) if reply.success => Ok(charge),
            _ => Err(CheckoutError::ChargeError(reply.error.unwrap_or_else(|| {
                format!("charge lookup failed with status {status}")
            }))),
        }
    }
}

#[async_trait]
impl TransferPreparation for StorefrontClient {
    #[instrument(skip_all, fields(price = %request.product_price))]
    async fn prepare(&self, request: &TransferRequest) -> Result<TransferDetails> {
        let url = self.endpoint(&["api", "pyusd-transfer"])?;
        let response = self.http_client.post(url).json(request).send().await?;
        let (status, reply): (u16, TransferResponse) = Self::read(response).await?;

        match reply.transfer_details {
            Some(details) if reply.success => TransferDetails::try_from(details),
            _ => Err(CheckoutError::TransferPreparationError(
                reply
                    .error
                    .unwrap_or_else(|| format!("transfer preparation failed with status {status}")),
            )),
        }
    }
}
