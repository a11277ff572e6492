//! End-to-end conversation tests for the session engine.
//!
//! Covers the session store contract, inactivity timeout, deferred execution
//! and full conversations through the router with a fake provider backend.

use async_trait::async_trait;
use convo_common::config::{Config, DeferredConfig, SessionConfig};
use convo_core::providers::{
    ClaimReceipt, ClaimRequest, Enrollment, EnrollmentRequest, PaymentInitiation, PaymentRequest,
    PaymentStatus, Plan, PolicySummary,
};
use convo_core::router::{CANCELLED_NOTICE, CANNOT_GO_BACK, RECOVERED_NOTICE};
use convo_core::{
    CatalogProvider, DeferredJob, Engine, EnrollmentProvider, MemoryNotifier, PaymentProvider,
    Product, Providers, Session, SessionData, SessionStore, StateTag, Transition, FAILURE_NOTICE,
    TIMEOUT_NOTICE, WELCOME,
};
use futures_util::FutureExt;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const USER: &str = "254712345678";
const WAIT: Duration = Duration::from_secs(5);

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Provider backend with scripted responses.
struct FakeBackend {
    plans: Vec<Plan>,
    catalog_delay: Duration,
    catalog_fails: bool,
    payment_status: Mutex<PaymentStatus>,
    enrollments: Mutex<Vec<EnrollmentRequest>>,
    claims: Mutex<Vec<ClaimRequest>>,
}

impl FakeBackend {
    fn new() -> Self {
        Self {
            plans: vec![
                Plan {
                    id: "motor-gold".into(),
                    name: "Gold Cover".into(),
                    insurer: "Jubilee".into(),
                    premium: 45_000.0,
                    summary: "Comprehensive with windscreen cover".into(),
                },
                Plan {
                    id: "motor-basic".into(),
                    name: "Basic Cover".into(),
                    insurer: "Britam".into(),
                    premium: 18_500.0,
                    summary: String::new(),
                },
            ],
            catalog_delay: Duration::ZERO,
            catalog_fails: false,
            payment_status: Mutex::new(PaymentStatus::Paid),
            enrollments: Mutex::new(Vec::new()),
            claims: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl CatalogProvider for FakeBackend {
    async fn fetch_plans(&self, _product: Product, _details: &SessionData) -> anyhow::Result<Vec<Plan>> {
        tokio::time::sleep(self.catalog_delay).await;
        if self.catalog_fails {
            anyhow::bail!("catalog returned 503");
        }
        Ok(self.plans.clone())
    }
}

#[async_trait]
impl PaymentProvider for FakeBackend {
    async fn initiate(&self, request: PaymentRequest) -> anyhow::Result<PaymentInitiation> {
        Ok(PaymentInitiation {
            reference: format!("PAY-{}", request.plan_id),
            instructions: Some("Enter your PIN on your phone to approve.".into()),
        })
    }

    async fn status(&self, _reference: &str) -> anyhow::Result<PaymentStatus> {
        Ok(*self.payment_status.lock().unwrap())
    }
}

#[async_trait]
impl EnrollmentProvider for FakeBackend {
    async fn enroll(&self, request: EnrollmentRequest) -> anyhow::Result<Enrollment> {
        self.enrollments.lock().unwrap().push(request);
        Ok(Enrollment {
            policy_number: "MTR-100200".into(),
        })
    }

    async fn submit_claim(&self, request: ClaimRequest) -> anyhow::Result<ClaimReceipt> {
        self.claims.lock().unwrap().push(request);
        Ok(ClaimReceipt {
            claim_number: "CLM-777".into(),
        })
    }

    async fn lookup_policy(&self, policy_number: &str) -> anyhow::Result<Option<PolicySummary>> {
        Ok((policy_number == "POL-123456").then(|| PolicySummary {
            policy_number: "POL-123456".into(),
            product: "Motor".into(),
            status: "active".into(),
            expires_on: "2027-01-31".into(),
            renewal_premium: 24_000.0,
        }))
    }
}

struct Harness {
    engine: Engine,
    notifier: Arc<MemoryNotifier>,
    backend: Arc<FakeBackend>,
}

impl Harness {
    fn new(backend: FakeBackend) -> Self {
        let backend = Arc::new(backend);
        let notifier = Arc::new(MemoryNotifier::new());
        let deferred = DeferredConfig {
            delay_ms: 5,
            queue_capacity: 16,
        };
        let engine = Engine::with_store(
            SessionStore::in_memory(),
            &SessionConfig::default(),
            &deferred,
            notifier.clone(),
            Providers::from_backend(backend.clone()),
        );
        Self {
            engine,
            notifier,
            backend,
        }
    }

    async fn send(&self, text: &str) -> (String, StateTag) {
        let reply = self.engine.queues.dispatch(USER, text).await.unwrap();
        (reply.message, reply.state)
    }

    /// Send every input, asserting each one lands in the expected state.
    async fn walk(&self, steps: &[(&str, StateTag)]) {
        for (input, expected) in steps {
            let (message, state) = self.send(input).await;
            assert_eq!(state, *expected, "input {input:?} replied {message:?}");
        }
    }

    /// Wait for the `n`th deferred delivery and return it.
    async fn deferred_message(&self, n: usize) -> String {
        assert!(self.notifier.wait_for(n, WAIT).await, "no deferred delivery #{n}");
        self.notifier.sent_to(USER)[n - 1].clone()
    }

    async fn state(&self) -> StateTag {
        self.engine.store.get(USER).await.tag().unwrap()
    }
}

fn patch(pairs: &[(&str, serde_json::Value)]) -> SessionData {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Store
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_unseen_id_reads_fresh_without_persisting() {
    let store = SessionStore::in_memory();

    let session = store.get("unseen").await;
    assert_eq!(session.tag(), Some(StateTag::Home));
    assert!(session.data.is_empty());
    assert!(session.is_new);
    assert!(store.fallback_tier().is_empty());
}

#[tokio::test]
async fn test_save_merges_and_is_idempotent() {
    let store = SessionStore::in_memory();

    store
        .save(USER, Some(StateTag::MotorMake), patch(&[("vehicle_type", json!("Motorcycle"))]))
        .await;
    store
        .save(USER, Some(StateTag::MotorModel), patch(&[("make", json!("Honda"))]))
        .await;
    let once = store.get(USER).await;

    assert_eq!(once.tag(), Some(StateTag::MotorModel));
    assert_eq!(once.get_str("vehicle_type"), Some("Motorcycle"));
    assert_eq!(once.get_str("make"), Some("Honda"));
    assert!(!once.is_new);

    store
        .save(USER, Some(StateTag::MotorModel), patch(&[("make", json!("Honda"))]))
        .await;
    let twice = store.get(USER).await;
    assert_eq!(twice.state, once.state);
    assert_eq!(twice.data, once.data);
}

#[tokio::test]
async fn test_delete_makes_session_unseen() {
    let store = SessionStore::in_memory();
    store.save(USER, Some(StateTag::LifeAge), SessionData::new()).await;

    store.delete(USER).await;
    let session = store.get(USER).await;
    assert!(session.is_new);
    assert_eq!(session.tag(), Some(StateTag::Home));
}

// ─────────────────────────────────────────────────────────────────────────────
// Timeout
// ─────────────────────────────────────────────────────────────────────────────

async fn make_idle(store: &SessionStore, state: StateTag, idle_ms: i64) {
    let mut session = Session::fresh(USER);
    session.state = state.as_str().to_string();
    session.data = patch(&[("product", json!("travel"))]);
    session.last_activity = convo_core::now_ms() - idle_ms;
    session.is_new = false;
    store.write(&session).await;
}

#[tokio::test]
async fn test_timeout_check_fires_exactly_once() {
    let h = Harness::new(FakeBackend::new());
    make_idle(&h.engine.store, StateTag::TravelDestination, 700_000).await;

    let first = h.engine.timeout.check(USER).await;
    assert!(first.timed_out);
    assert_eq!(first.message.as_deref(), Some(TIMEOUT_NOTICE));

    let second = h.engine.timeout.check(USER).await;
    assert!(!second.timed_out);
    let session = h.engine.store.get(USER).await;
    assert!(session.is_new);
    assert!(session.data.is_empty());
}

#[tokio::test]
async fn test_active_session_is_not_timed_out() {
    let h = Harness::new(FakeBackend::new());
    make_idle(&h.engine.store, StateTag::TravelDestination, 1_000).await;

    assert!(!h.engine.timeout.check(USER).await.timed_out);
    assert_eq!(h.state().await, StateTag::TravelDestination);
}

// ─────────────────────────────────────────────────────────────────────────────
// Deferred Execution
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_run_deferred_replies_immediately_then_delivers_once() {
    let h = Harness::new(FakeBackend::new());
    let job = DeferredJob::new(
        "Hold on...",
        async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(Transition::to(StateTag::LifePlanSelect, "Here are your plans"))
        }
        .boxed(),
    )
    .with("product", "life");

    let reply = h.engine.deferred.run_deferred(USER, job).await;
    assert_eq!(reply.message, "Hold on...");
    assert_eq!(reply.state, StateTag::Processing);
    assert_eq!(h.state().await, StateTag::Processing);

    assert_eq!(h.deferred_message(1).await, "Here are your plans");
    let session = h.engine.store.get(USER).await;
    assert_eq!(session.tag(), Some(StateTag::LifePlanSelect));
    assert_eq!(session.get_str("product"), Some("life"));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.notifier.sent().len(), 1);
}

#[tokio::test]
async fn test_failed_catalog_fetch_resets_and_apologises() {
    let mut backend = FakeBackend::new();
    backend.catalog_fails = true;
    let h = Harness::new(backend);

    h.walk(&[
        ("1", StateTag::CategorySelect),
        ("6", StateTag::GadgetType),
        ("phone", StateTag::GadgetBrand),
        ("Samsung", StateTag::GadgetValue),
        ("85000", StateTag::GadgetPurchaseDate),
        ("01/02/2024", StateTag::Processing),
    ])
    .await;

    assert_eq!(h.deferred_message(1).await, FAILURE_NOTICE);
    assert!(h.engine.store.get(USER).await.is_new);
}

#[tokio::test]
async fn test_restart_discards_in_flight_job() {
    let mut backend = FakeBackend::new();
    backend.catalog_delay = Duration::from_millis(200);
    let h = Harness::new(backend);

    h.walk(&[
        ("1", StateTag::CategorySelect),
        ("4", StateTag::LifeAge),
        ("35", StateTag::LifeSmoker),
        ("no", StateTag::LifeSumAssured),
        ("2,000,000", StateTag::LifeTerm),
        ("20", StateTag::LifeBeneficiary),
        ("Mary Achieng", StateTag::Processing),
    ])
    .await;
    assert!(h.engine.deferred.is_pending(USER));

    let (message, state) = h.send("hi").await;
    assert_eq!(message, WELCOME);
    assert_eq!(state, StateTag::Home);
    assert!(!h.engine.deferred.is_pending(USER));

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(h.notifier.sent().is_empty());
    assert!(h.engine.store.get(USER).await.is_new);
}

#[tokio::test]
async fn test_message_while_processing_keeps_job() {
    let mut backend = FakeBackend::new();
    backend.catalog_delay = Duration::from_millis(100);
    let h = Harness::new(backend);

    h.walk(&[
        ("1", StateTag::CategorySelect),
        ("5", StateTag::PropertyType),
        ("2", StateTag::PropertyLocation),
        ("Karen, Nairobi", StateTag::PropertyBuildingValue),
        ("12,000,000", StateTag::PropertyContentsValue),
        ("800000", StateTag::PropertySecurity),
        ("yes", StateTag::Processing),
        ("are you there?", StateTag::Processing),
    ])
    .await;

    let listing = h.deferred_message(1).await;
    assert!(listing.contains("1. Gold Cover by Jubilee"));
    assert_eq!(h.state().await, StateTag::PropertyPlanSelect);
}

// ─────────────────────────────────────────────────────────────────────────────
// Router Scenarios
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_greeting_clears_session_and_welcomes() {
    let h = Harness::new(FakeBackend::new());
    h.engine
        .store
        .save(USER, Some(StateTag::MotorMake), patch(&[("vehicle_type", json!("Motorcycle"))]))
        .await;

    let (message, state) = h.send("Hi!").await;
    assert!(message.contains("Welcome"));
    assert_eq!(state, StateTag::Home);
    assert!(h.engine.store.get(USER).await.is_new);
}

#[tokio::test]
async fn test_home_menu_opens_categories() {
    let h = Harness::new(FakeBackend::new());
    h.engine.store.save(USER, Some(StateTag::Home), SessionData::new()).await;

    let (message, state) = h.send("1").await;
    assert_eq!(message, StateTag::CategorySelect.prompt());
    assert_eq!(state, StateTag::CategorySelect);
}

#[tokio::test]
async fn test_back_moves_to_predecessor() {
    let h = Harness::new(FakeBackend::new());
    h.engine
        .store
        .save(USER, Some(StateTag::MotorRegistration), patch(&[("vehicle_type", json!("Motorcycle"))]))
        .await;

    let (message, state) = h.send("BACK").await;
    assert_eq!(message, StateTag::MotorVehicleType.prompt());
    assert_eq!(state, StateTag::MotorVehicleType);

    let session = h.engine.store.get(USER).await;
    assert_eq!(session.tag(), Some(StateTag::MotorVehicleType));
    assert_eq!(session.get_str("vehicle_type"), Some("Motorcycle"));
}

#[tokio::test]
async fn test_back_without_predecessor_keeps_state() {
    let h = Harness::new(FakeBackend::new());
    h.engine.store.save(USER, Some(StateTag::Home), SessionData::new()).await;

    let (message, state) = h.send("previous").await;
    assert_eq!(message, CANNOT_GO_BACK);
    assert_eq!(state, StateTag::Home);
    assert_eq!(h.state().await, StateTag::Home);
}

#[tokio::test]
async fn test_idle_session_times_out_on_next_message() {
    let h = Harness::new(FakeBackend::new());
    make_idle(&h.engine.store, StateTag::TravelReturn, 601_000).await;

    let (message, state) = h.send("20/03/2999").await;
    assert_eq!(message, TIMEOUT_NOTICE);
    assert_eq!(state, StateTag::Home);
    assert!(h.engine.store.get(USER).await.data.is_empty());
}

#[tokio::test]
async fn test_idle_session_times_out_with_expiring_primary() {
    let mut config = Config::default();
    config.session.ttl_secs = 2;
    config.session.timeout_ms = 1_000;
    config.validate().unwrap();

    let engine = Engine::from_config(
        &config,
        Arc::new(MemoryNotifier::new()),
        Providers::from_backend(Arc::new(FakeBackend::new())),
    )
    .await;

    let reply = engine.queues.dispatch(USER, "1").await.unwrap();
    assert_eq!(reply.state, StateTag::CategorySelect);

    tokio::time::sleep(Duration::from_millis(1_300)).await;

    let reply = engine.queues.dispatch(USER, "2").await.unwrap();
    assert_eq!(reply.message, TIMEOUT_NOTICE);
    assert_eq!(reply.state, StateTag::Home);
    assert!(engine.store.get(USER).await.data.is_empty());

    engine.shutdown().await;
}

#[test]
fn test_default_ttl_outlives_timeout() {
    let session = SessionConfig::default();
    assert!(session.ttl_secs * 1000 > session.timeout_ms);
}

#[tokio::test]
async fn test_cancel_clears_session() {
    let h = Harness::new(FakeBackend::new());
    h.walk(&[("1", StateTag::CategorySelect), ("3", StateTag::TravelDestination)])
        .await;

    let (message, state) = h.send("cancel").await;
    assert_eq!(message, CANCELLED_NOTICE);
    assert_eq!(state, StateTag::Home);
    assert!(h.engine.store.get(USER).await.is_new);
}

#[tokio::test]
async fn test_unknown_state_recovers_to_home() {
    let h = Harness::new(FakeBackend::new());
    let mut session = Session::fresh(USER);
    session.state = "legacy-step".into();
    session.is_new = false;
    h.engine.store.write(&session).await;

    let (message, state) = h.send("1").await;
    assert!(message.starts_with(RECOVERED_NOTICE));
    assert!(message.ends_with(WELCOME));
    assert_eq!(state, StateTag::Home);
}

#[tokio::test]
async fn test_invalid_input_reprompts_same_state() {
    let h = Harness::new(FakeBackend::new());
    h.walk(&[
        ("1", StateTag::CategorySelect),
        ("1", StateTag::MotorVehicleType),
        ("1", StateTag::MotorRegistration),
        ("KDA 123A", StateTag::MotorMake),
        ("Toyota", StateTag::MotorModel),
        ("Corolla", StateTag::MotorYear),
    ])
    .await;

    let (message, state) = h.send("1900").await;
    assert_eq!(state, StateTag::MotorYear);
    assert!(message.contains("between 1980 and 2100"));
    assert!(message.ends_with(StateTag::MotorYear.prompt()));
}

// ─────────────────────────────────────────────────────────────────────────────
// Full Conversations
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_motor_quote_to_policy() {
    let h = Harness::new(FakeBackend::new());

    h.walk(&[
        ("hi", StateTag::Home),
        ("1", StateTag::CategorySelect),
        ("1", StateTag::MotorVehicleType),
        ("1", StateTag::MotorRegistration),
        ("kda 123a", StateTag::MotorMake),
        ("Toyota", StateTag::MotorModel),
        ("Corolla", StateTag::MotorYear),
        ("2018", StateTag::MotorValue),
        ("1,500,000", StateTag::MotorCoverType),
        ("Comprehensive", StateTag::Processing),
    ])
    .await;

    let listing = h.deferred_message(1).await;
    assert!(listing.contains("1. Gold Cover by Jubilee: KES 45,000/year"));
    assert_eq!(h.state().await, StateTag::MotorPlanSelect);

    let (summary, _) = h.send("1").await;
    assert!(summary.contains("Annual premium: KES 45,000"));

    h.walk(&[
        ("1", StateTag::CustomerFullName),
        ("Jane Wanjiku", StateTag::CustomerIdNumber),
        ("12345678", StateTag::CustomerDateOfBirth),
        ("15/06/1990", StateTag::CustomerEmail),
        ("Jane@Example.com", StateTag::CustomerAddress),
    ])
    .await;

    let (confirm, state) = h.send("12 Moi Avenue, Nairobi").await;
    assert_eq!(state, StateTag::CustomerConfirm);
    assert!(confirm.contains("Name: Jane Wanjiku"));
    assert!(confirm.contains("Email: jane@example.com"));

    h.walk(&[
        ("1", StateTag::PaymentMethod),
        ("1", StateTag::PaymentPhone),
        ("+254 712 345 678", StateTag::Processing),
    ])
    .await;

    let prompt = h.deferred_message(2).await;
    assert!(prompt.contains("KES 45,000 to +254712345678"));
    assert!(prompt.contains("Enter your PIN"));
    assert_eq!(h.state().await, StateTag::PaymentConfirm);

    h.walk(&[("1", StateTag::Processing)]).await;
    let paid = h.deferred_message(3).await;
    assert!(paid.contains("Your policy number is MTR-100200"));
    assert_eq!(h.state().await, StateTag::FeedbackRating);

    {
        let enrollments = h.backend.enrollments.lock().unwrap();
        assert_eq!(enrollments.len(), 1);
        assert_eq!(enrollments[0].product, Product::Motor);
        assert_eq!(enrollments[0].plan_id, "motor-gold");
        assert_eq!(enrollments[0].payment_reference, "PAY-motor-gold");
        assert_eq!(enrollments[0].details.get("registration"), Some(&json!("KDA 123A")));
    }

    h.walk(&[("5", StateTag::FeedbackComment)]).await;
    let (thanks, state) = h.send("Quick and easy").await;
    assert_eq!(state, StateTag::Completed);
    assert!(thanks.starts_with("Thanks for your feedback!"));
    assert!(h.engine.store.get(USER).await.is_new);
}

#[tokio::test]
async fn test_failed_payment_offers_retry() {
    let backend = FakeBackend::new();
    *backend.payment_status.lock().unwrap() = PaymentStatus::Failed;
    let h = Harness::new(backend);

    h.engine
        .store
        .save(
            USER,
            Some(StateTag::PaymentPhone),
            patch(&[
                ("product", json!("motor")),
                ("checkout", json!("purchase")),
                ("amount", json!(18_500.0)),
                ("selected_plan", json!({"id": "motor-basic"})),
            ]),
        )
        .await;

    h.walk(&[("0712345678", StateTag::Processing)]).await;
    h.deferred_message(1).await;
    h.walk(&[("1", StateTag::Processing)]).await;

    assert_eq!(h.deferred_message(2).await, StateTag::PaymentRetry.prompt());
    assert_eq!(h.state().await, StateTag::PaymentRetry);
    assert!(h.backend.enrollments.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_policy_lookup_then_claim() {
    let h = Harness::new(FakeBackend::new());

    h.walk(&[("3", StateTag::PolicyNumber), ("POL-999999", StateTag::Processing)])
        .await;
    let missing = h.deferred_message(1).await;
    assert!(missing.starts_with("We couldn't find policy POL-999999."));
    assert_eq!(h.state().await, StateTag::PolicyNumber);

    h.walk(&[("pol-123456", StateTag::Processing)]).await;
    let found = h.deferred_message(2).await;
    assert!(found.starts_with("Policy POL-123456"));
    assert_eq!(h.state().await, StateTag::PolicyActions);

    h.walk(&[
        ("2", StateTag::ClaimType),
        ("2", StateTag::ClaimIncidentDate),
        ("03/03/2025", StateTag::ClaimIncidentLocation),
        ("Westlands", StateTag::ClaimDescription),
        ("Car broken into and radio taken", StateTag::ClaimAmount),
        ("35,000", StateTag::ClaimDocuments),
    ])
    .await;

    let (review, state) = h.send("yes").await;
    assert_eq!(state, StateTag::ClaimConfirm);
    assert!(review.contains("Policy: POL-123456"));
    assert!(review.contains("Type: Theft"));
    assert!(review.contains("Amount: KES 35,000"));

    h.walk(&[("1", StateTag::Processing)]).await;
    let submitted = h.deferred_message(3).await;
    assert!(submitted.contains("Your claim number is CLM-777"));
    assert_eq!(h.state().await, StateTag::ClaimSubmitted);

    {
        let claims = h.backend.claims.lock().unwrap();
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].policy_number, "POL-123456");
        assert_eq!(claims[0].details.get("claim_type"), Some(&json!("Theft")));
    }

    let (_, state) = h.send("2").await;
    assert_eq!(state, StateTag::Completed);
    assert!(h.engine.store.get(USER).await.is_new);
}

#[tokio::test]
async fn test_renewal_skips_enrollment() {
    let h = Harness::new(FakeBackend::new());

    h.walk(&[("3", StateTag::PolicyNumber), ("POL-123456", StateTag::Processing)])
        .await;
    h.deferred_message(1).await;

    let (quote, state) = h.send("1").await;
    assert_eq!(state, StateTag::RenewalConfirm);
    assert!(quote.contains("costs KES 24,000"));

    h.walk(&[
        ("1", StateTag::PaymentMethod),
        ("1", StateTag::PaymentPhone),
        ("0712345678", StateTag::Processing),
    ])
    .await;
    assert!(h.deferred_message(2).await.contains("KES 24,000"));

    h.walk(&[("1", StateTag::Processing)]).await;
    assert!(h.deferred_message(3).await.contains("Policy POL-123456 has been renewed"));
    assert_eq!(h.state().await, StateTag::FeedbackRating);
    assert!(h.backend.enrollments.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_feedback_rating_then_skip_completes() {
    let h = Harness::new(FakeBackend::new());
    h.engine
        .store
        .save(USER, Some(StateTag::FeedbackRating), SessionData::new())
        .await;

    let (_, state) = h.send("9").await;
    assert_eq!(state, StateTag::FeedbackRating);

    let (_, state) = h.send("4").await;
    assert_eq!(state, StateTag::FeedbackComment);
    assert_eq!(h.engine.store.get(USER).await.get_u64("rating"), Some(4));

    let (_, state) = h.send("skip").await;
    assert_eq!(state, StateTag::Completed);
    assert!(h.engine.store.get(USER).await.is_new);
}

#[tokio::test]
async fn test_agent_handoff_ends_conversation() {
    let h = Harness::new(FakeBackend::new());

    let (message, state) = h.send("4").await;
    assert_eq!(state, StateTag::AgentHandoff);
    assert_eq!(message, StateTag::AgentHandoff.prompt());
    assert!(h.engine.store.get(USER).await.is_new);
}
