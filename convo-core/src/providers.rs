//! Collaborator interfaces for slow external work.
//!
//! Handlers never call these directly on the request path; they are invoked
//! from deferred jobs so the participant gets an immediate interim reply.

use crate::session::SessionData;
use crate::state::Product;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ============================================================================
// Data Types
// ============================================================================

/// A purchasable plan returned by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub name: String,
    pub insurer: String,
    /// Annual premium.
    pub premium: f64,
    #[serde(default)]
    pub summary: String,
}

/// Payment method chosen at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    MobileMoney,
    Card,
}

impl PaymentMethod {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MobileMoney => "mobile_money",
            Self::Card => "card",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "mobile_money" => Some(Self::MobileMoney),
            "card" => Some(Self::Card),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub participant_id: String,
    pub phone: String,
    pub amount: f64,
    pub method: PaymentMethod,
    /// Plan being paid for.
    pub plan_id: String,
}

/// Provider acknowledgement of a payment request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentInitiation {
    pub reference: String,
    #[serde(default)]
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentRequest {
    pub participant_id: String,
    pub product: Product,
    pub plan_id: String,
    pub payment_reference: String,
    /// Everything collected during the conversation.
    pub details: SessionData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrollment {
    pub policy_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub participant_id: String,
    pub policy_number: String,
    pub details: SessionData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimReceipt {
    pub claim_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicySummary {
    pub policy_number: String,
    pub product: String,
    pub status: String,
    /// Expiry date as displayed to the participant.
    pub expires_on: String,
    pub renewal_premium: f64,
}

// ============================================================================
// Collaborator Traits
// ============================================================================

/// Quote catalog.
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Plans matching the details collected for `product`.
    async fn fetch_plans(&self, product: Product, details: &SessionData) -> anyhow::Result<Vec<Plan>>;
}

/// Payment collection.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn initiate(&self, request: PaymentRequest) -> anyhow::Result<PaymentInitiation>;

    async fn status(&self, reference: &str) -> anyhow::Result<PaymentStatus>;
}

/// Policy administration: enrollment, claims and lookups.
#[async_trait]
pub trait EnrollmentProvider: Send + Sync {
    async fn enroll(&self, request: EnrollmentRequest) -> anyhow::Result<Enrollment>;

    async fn submit_claim(&self, request: ClaimRequest) -> anyhow::Result<ClaimReceipt>;

    /// `None` if no such policy exists.
    async fn lookup_policy(&self, policy_number: &str) -> anyhow::Result<Option<PolicySummary>>;
}

/// The collaborators a router needs.
#[derive(Clone)]
pub struct Providers {
    pub catalog: Arc<dyn CatalogProvider>,
    pub payments: Arc<dyn PaymentProvider>,
    pub enrollment: Arc<dyn EnrollmentProvider>,
}

impl Providers {
    /// Use one backend for every collaborator.
    pub fn from_backend<T>(backend: Arc<T>) -> Self
    where
        T: CatalogProvider + PaymentProvider + EnrollmentProvider + 'static,
    {
        Self {
            catalog: backend.clone(),
            payments: backend.clone(),
            enrollment: backend,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests_support {
    use super::*;
    use anyhow::bail;

    /// Backend that refuses every call.
    pub(crate) struct NoProviders;

    #[async_trait]
    impl CatalogProvider for NoProviders {
        async fn fetch_plans(&self, _: Product, _: &SessionData) -> anyhow::Result<Vec<Plan>> {
            bail!("catalog unavailable")
        }
    }

    #[async_trait]
    impl PaymentProvider for NoProviders {
        async fn initiate(&self, _: PaymentRequest) -> anyhow::Result<PaymentInitiation> {
            bail!("payments unavailable")
        }

        async fn status(&self, _: &str) -> anyhow::Result<PaymentStatus> {
            bail!("payments unavailable")
        }
    }

    #[async_trait]
    impl EnrollmentProvider for NoProviders {
        async fn enroll(&self, _: EnrollmentRequest) -> anyhow::Result<Enrollment> {
            bail!("enrollment unavailable")
        }

        async fn submit_claim(&self, _: ClaimRequest) -> anyhow::Result<ClaimReceipt> {
            bail!("claims unavailable")
        }

        async fn lookup_policy(&self, _: &str) -> anyhow::Result<Option<PolicySummary>> {
            Ok(None)
        }
    }
}
