//! HTTP client for the catalog, payment and policy-administration backend.
//!
//! Every endpoint answers with a `{ success, data, error }` envelope.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use convo_common::config::ProvidersConfig;
use convo_core::providers::{
    CatalogProvider, ClaimReceipt, ClaimRequest, Enrollment, EnrollmentProvider,
    EnrollmentRequest, PaymentInitiation, PaymentProvider, PaymentRequest, PaymentStatus, Plan,
    PolicySummary,
};
use convo_core::{Product, SessionData};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// API Types
// ============================================================================

/// Response wrapper used by every providers endpoint.
#[derive(Debug, Clone, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct PlansRequest<'a> {
    product: Product,
    details: &'a SessionData,
}

#[derive(Debug, Deserialize)]
struct PaymentStatusData {
    status: PaymentStatus,
}

// ============================================================================
// HttpProviders
// ============================================================================

/// Providers backed by a single HTTP API.
pub struct HttpProviders {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpProviders {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn from_config(config: &ProvidersConfig) -> Self {
        Self::new(config.endpoint.clone()).with_timeout(Duration::from_secs(config.timeout_secs))
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    /// Send a request and unwrap the envelope.
    ///
    /// Returns `Ok(None)` on 404 so lookups can report "not found".
    async fn call<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<Option<T>> {
        let response = request.timeout(self.timeout).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            if let Ok(body) = serde_json::from_str::<ApiResponse<serde_json::Value>>(&error_text) {
                if let Some(error) = body.error {
                    return Err(anyhow!("{what} failed: {error}"));
                }
            }
            return Err(anyhow!("{what} returned {status}: {error_text}"));
        }

        let body: ApiResponse<T> = response.json().await?;
        if !body.success {
            let error = body.error.unwrap_or_else(|| "Unknown error".to_string());
            return Err(anyhow!("{what} failed: {error}"));
        }

        body.data
            .map(Some)
            .ok_or_else(|| anyhow!("{what} returned no data"))
    }

    async fn call_required<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T> {
        self.call(request, what)
            .await?
            .ok_or_else(|| anyhow!("{what} returned 404"))
    }
}

#[async_trait]
impl CatalogProvider for HttpProviders {
    async fn fetch_plans(&self, product: Product, details: &SessionData) -> Result<Vec<Plan>> {
        tracing::debug!(product = product.as_str(), "Fetching plans");
        let request = self
            .client
            .post(self.url("/catalog/plans"))
            .json(&PlansRequest { product, details });
        self.call_required(request, "Catalog").await
    }
}

#[async_trait]
impl PaymentProvider for HttpProviders {
    async fn initiate(&self, request: PaymentRequest) -> Result<PaymentInitiation> {
        let request = self.client.post(self.url("/payments")).json(&request);
        self.call_required(request, "Payment").await
    }

    async fn status(&self, reference: &str) -> Result<PaymentStatus> {
        let request = self.client.get(self.url(&format!("/payments/{reference}")));
        let data: PaymentStatusData = self.call_required(request, "Payment status").await?;
        Ok(data.status)
    }
}

#[async_trait]
impl EnrollmentProvider for HttpProviders {
    async fn enroll(&self, request: EnrollmentRequest) -> Result<Enrollment> {
        let request = self.client.post(self.url("/enrollments")).json(&request);
        self.call_required(request, "Enrollment").await
    }

    async fn submit_claim(&self, request: ClaimRequest) -> Result<ClaimReceipt> {
        let request = self.client.post(self.url("/claims")).json(&request);
        self.call_required(request, "Claim").await
    }

    async fn lookup_policy(&self, policy_number: &str) -> Result<Option<PolicySummary>> {
        let request = self.client.get(self.url(&format!("/policies/{policy_number}")));
        self.call(request, "Policy lookup").await
    }
}
