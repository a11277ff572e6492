//! State router: interrupts first, then the handler registered for the
//! session's current state.
//!
//! ```text
//! inbound text
//!     │
//!     ▼
//! TimeoutMonitor::check ──timed out──▶ timeout notice (home)
//!     │
//!     ▼
//! Interrupt::detect ──restart/cancel/back──▶ handled here
//!     │
//!     ▼
//! handler_for(state).handle(..)
//!     ├── Outcome::Reply     ──▶ SessionStore::save ──▶ reply
//!     ├── Outcome::Deferred  ──▶ DeferredTaskRunner  ──▶ interim reply
//!     └── Outcome::Reset     ──▶ SessionStore::delete ──▶ reply
//! ```

pub mod handlers;
pub mod input;
pub mod interrupt;
mod outcome;

pub use interrupt::{Interrupt, CANCELLED_NOTICE, CANNOT_GO_BACK};
pub use outcome::{DeferredJob, JobFuture, Outcome, Reply, Transition};

use crate::deferred::DeferredTaskRunner;
use crate::providers::Providers;
use crate::session::{Session, SessionLocks, SessionStore};
use crate::state::{StateTag, WELCOME};
use crate::timeout::TimeoutMonitor;
use async_trait::async_trait;
use convo_common::util::{mask_participant, sanitize_for_log, truncate_with_ellipsis};
use handlers::{
    CheckoutHandler, ClaimHandler, FeedbackHandler, InputStepHandler, MenuHandler,
    PlanSelectHandler, PolicyHandler, StaticHandler,
};
use std::sync::Arc;

/// Reply prefix when a stored state is not in the registry.
pub const RECOVERED_NOTICE: &str =
    "Sorry, we lost track of where we were. Let's start again from the main menu.";

// ============================================================================
// Handler Contract
// ============================================================================

/// Everything a handler may look at.
pub struct HandlerContext<'a> {
    pub participant_id: &'a str,
    pub session: &'a Session,
    /// Trimmed and case-folded.
    pub input: &'a str,
    /// Trimmed, original case.
    pub raw: &'a str,
    pub providers: &'a Providers,
}

/// Handles input for one family of states.
///
/// Handlers never fail: invalid input re-prompts the same state, and slow
/// external work is returned as a deferred job.
#[async_trait]
pub trait StateHandler: Send + Sync {
    async fn handle(&self, state: StateTag, ctx: &HandlerContext<'_>) -> Outcome;

    /// Family name for logs.
    fn name(&self) -> &'static str;
}

static MENU: MenuHandler = MenuHandler;
static INPUT: InputStepHandler = InputStepHandler;
static PLAN_SELECT: PlanSelectHandler = PlanSelectHandler;
static CHECKOUT: CheckoutHandler = CheckoutHandler;
static CLAIM: ClaimHandler = ClaimHandler;
static POLICY: PolicyHandler = PolicyHandler;
static FEEDBACK: FeedbackHandler = FeedbackHandler;
static STATIC: StaticHandler = StaticHandler;

/// The handler registered for every state. Exhaustive over the registry.
pub fn handler_for(state: StateTag) -> &'static dyn StateHandler {
    use StateTag::*;
    match state {
        Home | CategorySelect => &MENU,

        MotorVehicleType | MotorRegistration | MotorMake | MotorModel | MotorYear
        | MotorValue | MotorCoverType => &INPUT,
        HealthCoverFor | HealthPrincipalAge | HealthDependants | HealthDependantAges
        | HealthPreexisting | HealthInpatientLimit => &INPUT,
        TravelDestination | TravelDeparture | TravelReturn | TravelTravellers
        | TravelTravellerAges | TravelPurpose => &INPUT,
        LifeAge | LifeSmoker | LifeSumAssured | LifeTerm | LifeBeneficiary => &INPUT,
        PropertyType | PropertyLocation | PropertyBuildingValue | PropertyContentsValue
        | PropertySecurity => &INPUT,
        GadgetType | GadgetBrand | GadgetValue | GadgetPurchaseDate => &INPUT,
        CustomerFullName | CustomerIdNumber | CustomerDateOfBirth | CustomerEmail
        | CustomerAddress => &INPUT,
        ClaimType | ClaimIncidentDate | ClaimIncidentLocation | ClaimDescription
        | ClaimAmount | ClaimDocuments => &INPUT,

        MotorPlanSelect | HealthPlanSelect | TravelPlanSelect | LifePlanSelect
        | PropertyPlanSelect | GadgetPlanSelect => &PLAN_SELECT,

        QuoteSummary | CustomerConfirm | PaymentMethod | PaymentPhone | PaymentConfirm
        | PaymentRetry => &CHECKOUT,

        ClaimPolicyNumber | ClaimConfirm | ClaimSubmitted => &CLAIM,

        PolicyNumber | PolicyActions | RenewalConfirm => &POLICY,

        FeedbackRating | FeedbackComment => &FEEDBACK,

        Processing | AgentHandoff | Completed | Cancelled => &STATIC,
    }
}

// ============================================================================
// Router
// ============================================================================

/// Maps `(participant, text)` to a reply and persists the resulting state.
pub struct StateRouter {
    store: SessionStore,
    locks: Arc<SessionLocks>,
    timeout: Arc<TimeoutMonitor>,
    deferred: Arc<DeferredTaskRunner>,
    providers: Providers,
}

impl StateRouter {
    pub fn new(
        store: SessionStore,
        locks: Arc<SessionLocks>,
        timeout: Arc<TimeoutMonitor>,
        deferred: Arc<DeferredTaskRunner>,
        providers: Providers,
    ) -> Self {
        Self {
            store,
            locks,
            timeout,
            deferred,
            providers,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn deferred(&self) -> &Arc<DeferredTaskRunner> {
        &self.deferred
    }

    /// Handle one inbound message.
    ///
    /// Holds the participant's session lock for the whole read-handle-write
    /// cycle, so deferred completions cannot interleave with it.
    pub async fn dispatch(&self, participant_id: &str, raw: &str) -> Reply {
        let _guard = self.locks.lock(participant_id).await;
        let user = mask_participant(participant_id);

        let check = self.timeout.check(participant_id).await;
        if check.timed_out {
            self.deferred.cancel(participant_id);
            let message = check.message.unwrap_or_else(|| WELCOME.to_string());
            return Reply::new(message, StateTag::Home);
        }

        let raw = raw.trim();
        let input = interrupt::normalize(raw);

        if let Some(interrupt) = Interrupt::detect(&input) {
            tracing::debug!(user_id = %user, ?interrupt, "Global interrupt");
            return self.interrupt(participant_id, interrupt).await;
        }

        let session = self.store.get(participant_id).await;
        let Some(state) = session.tag() else {
            tracing::warn!(user_id = %user, state = %session.state, "Unknown session state, resetting");
            return self.reset(participant_id, RECOVERED_NOTICE).await;
        };

        let handler = handler_for(state);
        tracing::debug!(
            user_id = %user,
            %state,
            handler = handler.name(),
            input = %truncate_with_ellipsis(&sanitize_for_log(raw), 60),
            "Dispatching"
        );

        let ctx = HandlerContext {
            participant_id,
            session: &session,
            input: &input,
            raw,
            providers: &self.providers,
        };

        let reply = match handler.handle(state, &ctx).await {
            Outcome::Reply(transition) => self.commit(participant_id, transition).await,
            Outcome::Deferred(job) => self.deferred.run_deferred(participant_id, job).await,
            Outcome::Reset(message) => self.reset(participant_id, &message).await,
        };

        if reply.state != state {
            tracing::info!(user_id = %user, from = %state, to = %reply.state, "State transition");
        }
        reply
    }

    async fn interrupt(&self, participant_id: &str, interrupt: Interrupt) -> Reply {
        match interrupt {
            Interrupt::Restart => {
                self.deferred.cancel(participant_id);
                self.store.delete(participant_id).await;
                Reply::new(WELCOME, StateTag::Home)
            }
            Interrupt::Cancel => {
                self.deferred.cancel(participant_id);
                self.store.delete(participant_id).await;
                Reply::new(CANCELLED_NOTICE, StateTag::Home)
            }
            Interrupt::Back => {
                let session = self.store.get(participant_id).await;
                let Some(state) = session.tag() else {
                    return self.reset(participant_id, RECOVERED_NOTICE).await;
                };
                match state.predecessor() {
                    Some(previous) => {
                        self.store
                            .save(participant_id, Some(previous), Default::default())
                            .await;
                        Reply::new(previous.prompt(), previous)
                    }
                    None => Reply::new(CANNOT_GO_BACK, state),
                }
            }
        }
    }

    async fn commit(&self, participant_id: &str, transition: Transition) -> Reply {
        let Transition {
            message,
            state,
            data,
        } = transition;

        if state.is_terminal() {
            self.deferred.cancel(participant_id);
            self.store.delete(participant_id).await;
        } else {
            self.store.save(participant_id, Some(state), data).await;
        }
        Reply::new(message, state)
    }

    async fn reset(&self, participant_id: &str, notice: &str) -> Reply {
        self.deferred.cancel(participant_id);
        self.store.delete(participant_id).await;
        Reply::new(format!("{notice}\n\n{WELCOME}"), StateTag::Home)
    }
}
