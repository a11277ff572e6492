//! Existing-policy servicing: lookup, actions and renewal.

use super::claims::POLICY_NUMBER;
use super::format_money;
use crate::providers::{EnrollmentProvider, PolicySummary};
use crate::router::{DeferredJob, HandlerContext, Outcome, StateHandler, Transition};
use crate::state::StateTag;
use async_trait::async_trait;
use futures_util::FutureExt;
use std::sync::Arc;

pub struct PolicyHandler;

#[async_trait]
impl StateHandler for PolicyHandler {
    async fn handle(&self, state: StateTag, ctx: &HandlerContext<'_>) -> Outcome {
        match state {
            StateTag::PolicyNumber => match POLICY_NUMBER.parse(ctx.raw, &ctx.session.data) {
                Ok(number) => {
                    let number = number.as_str().unwrap_or_default().to_string();
                    DeferredJob::new(
                        "Looking up your policy...",
                        lookup(ctx.providers.enrollment.clone(), number).boxed(),
                    )
                    .into()
                }
                Err(problem) => Transition::retry(state, &problem).into(),
            },
            StateTag::PolicyActions => {
                let Some(policy) = stored_policy(ctx) else {
                    return Transition::prompt(StateTag::PolicyNumber).into();
                };
                match ctx.input {
                    "1" => Transition::to(
                        StateTag::RenewalConfirm,
                        format!(
                            "Renewing policy {} costs {}.\n\n{}",
                            policy.policy_number,
                            format_money(policy.renewal_premium),
                            StateTag::RenewalConfirm.prompt()
                        ),
                    )
                    .with("amount", policy.renewal_premium)
                    .with("checkout", "renewal")
                    .into(),
                    "2" => Transition::prompt(StateTag::ClaimType)
                        .with("claim_policy_number", policy.policy_number)
                        .into(),
                    "3" => Outcome::Reset("No problem.".into()),
                    _ => Transition::retry(state, "Please reply 1, 2 or 3.").into(),
                }
            }
            StateTag::RenewalConfirm => match ctx.input {
                "1" => Transition::prompt(StateTag::PaymentMethod).into(),
                "2" => Outcome::Reset("No problem.".into()),
                _ => Transition::retry(state, "Please reply 1 or 2.").into(),
            },
            _ => Transition::prompt(state).into(),
        }
    }

    fn name(&self) -> &'static str {
        "policy"
    }
}

fn stored_policy(ctx: &HandlerContext<'_>) -> Option<PolicySummary> {
    ctx.session
        .data
        .get("policy")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
}

fn describe(policy: &PolicySummary) -> String {
    format!(
        "Policy {}\nCover: {}\nStatus: {}\nExpires: {}\n\n{}",
        policy.policy_number,
        policy.product,
        policy.status,
        policy.expires_on,
        StateTag::PolicyActions.prompt()
    )
}

async fn lookup(
    enrollment: Arc<dyn EnrollmentProvider>,
    number: String,
) -> anyhow::Result<Transition> {
    match enrollment.lookup_policy(&number).await? {
        Some(policy) => {
            let message = describe(&policy);
            let number = policy.policy_number.clone();
            Ok(Transition::to(StateTag::PolicyActions, message)
                .with("policy", serde_json::to_value(&policy)?)
                .with("policy_number", number))
        }
        None => Ok(Transition::retry(
            StateTag::PolicyNumber,
            &format!("We couldn't find policy {number}."),
        )),
    }
}
