//! Third-party delivery provider clients
//!
//! Provider APIs are an edge: 5xx and transport errors are retried with a
//! short exponential backoff, 4xx is terminal. A terminal failure never
//! fails the dispatch, the delivery falls back to manual coordination.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

use crate::models::DeliveryProvider;
use crate::{Error, Result};

/// Backoff schedule for transient provider failures
const RETRY_DELAYS_MS: [u64; 3] = [100, 200, 400];

/// Shipment creation request forwarded to a provider API
#[derive(Debug, Clone, Serialize)]
pub struct ProviderShipmentRequest {
    pub order_id: Uuid,
    pub order_code: String,
    pub destination_province: String,
    pub destination_postal_code: Option<String>,
    pub weight_kg: Decimal,
    pub cod_amount: Decimal,
}

/// Provider-side identifiers returned on success
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderShipmentResponse {
    pub provider_order_id: String,
    pub tracking_number: Option<String>,
}

#[async_trait]
pub trait ProviderClient: Send + Sync + 'static {
    /// One attempt against the provider API. Transient failures surface
    /// as `Error::Network`, terminal rejections as `Error::Provider`.
    async fn create_shipment(
        &self,
        provider: &DeliveryProvider,
        request: &ProviderShipmentRequest,
    ) -> Result<ProviderShipmentResponse>;
}

/// Retry wrapper: up to three delayed re-attempts on transient errors,
/// immediate return on terminal ones.
pub async fn create_shipment_with_retry(
    client: &dyn ProviderClient,
    provider: &DeliveryProvider,
    request: &ProviderShipmentRequest,
) -> Result<ProviderShipmentResponse> {
    let mut last_error = None;

    for (attempt, delay_ms) in std::iter::once(&0u64).chain(RETRY_DELAYS_MS.iter()).enumerate() {
        if *delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
        }

        match client.create_shipment(provider, request).await {
            Ok(response) => return Ok(response),
            Err(Error::Network(msg)) => {
                warn!(
                    provider = %provider.name,
                    attempt = attempt + 1,
                    "provider call failed transiently: {}",
                    msg
                );
                last_error = Some(Error::Network(msg));
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error.unwrap_or_else(|| Error::provider("provider call failed")))
}

/// Provider client over HTTP
pub struct HttpProviderClient {
    client: reqwest::Client,
}

impl HttpProviderClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for HttpProviderClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    async fn create_shipment(
        &self,
        provider: &DeliveryProvider,
        request: &ProviderShipmentRequest,
    ) -> Result<ProviderShipmentResponse> {
        let base_url = provider
            .api_url
            .as_ref()
            .ok_or_else(|| Error::provider(format!("provider {} has no API url", provider.name)))?;

        let response = self
            .client
            .post(format!("{}/shipments", base_url.trim_end_matches('/')))
            .json(request)
            .send()
            .await
            .map_err(|e| Error::network(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(Error::network(format!(
                "provider {} returned {}",
                provider.name, status
            )));
        }
        if !status.is_success() {
            return Err(Error::provider(format!(
                "provider {} rejected shipment: {}",
                provider.name, status
            )));
        }

        let body = response
            .json::<ProviderShipmentResponse>()
            .await
            .map_err(|e| Error::provider(format!("provider {} response invalid: {}", provider.name, e)))?;

        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn provider() -> DeliveryProvider {
        DeliveryProvider {
            id: Uuid::new_v4(),
            name: "Inter Express".to_string(),
            priority: 1,
            supported_provinces: vec!["BKK".to_string()],
            max_weight_kg: dec!(30),
            has_api: true,
            api_url: Some("http://provider.test".to_string()),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn request() -> ProviderShipmentRequest {
        ProviderShipmentRequest {
            order_id: Uuid::new_v4(),
            order_code: "ORD-20260301-A7Q2MX".to_string(),
            destination_province: "BKK".to_string(),
            destination_postal_code: Some("10110".to_string()),
            weight_kg: dec!(2.5),
            cod_amount: Decimal::ZERO,
        }
    }

    /// Fails transiently `failures` times, then succeeds
    struct FlakyClient {
        failures: AtomicUsize,
        terminal: bool,
    }

    #[async_trait]
    impl ProviderClient for FlakyClient {
        async fn create_shipment(
            &self,
            _provider: &DeliveryProvider,
            _request: &ProviderShipmentRequest,
        ) -> Result<ProviderShipmentResponse> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return if self.terminal {
                    Err(Error::provider("address rejected"))
                } else {
                    Err(Error::network("connection reset"))
                };
            }
            Ok(ProviderShipmentResponse {
                provider_order_id: "IE-1234".to_string(),
                tracking_number: Some("IE1234567890".to_string()),
            })
        }
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let client = FlakyClient { failures: AtomicUsize::new(3), terminal: false };
        let response = create_shipment_with_retry(&client, &provider(), &request())
            .await
            .unwrap();
        assert_eq!(response.provider_order_id, "IE-1234");
    }

    #[tokio::test]
    async fn test_retries_exhausted_surfaces_error() {
        let client = FlakyClient { failures: AtomicUsize::new(4), terminal: false };
        let err = create_shipment_with_retry(&client, &provider(), &request())
            .await
            .unwrap_err();
        assert_eq!(err.category(), "network");
    }

    #[tokio::test]
    async fn test_terminal_failure_not_retried() {
        let client = FlakyClient { failures: AtomicUsize::new(1), terminal: true };
        let err = create_shipment_with_retry(&client, &provider(), &request())
            .await
            .unwrap_err();
        assert_eq!(err.category(), "provider");
        // Only the first attempt ran
        assert_eq!(client.failures.load(Ordering::SeqCst), 0);
    }
}
