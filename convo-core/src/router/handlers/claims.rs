//! Claim intake entry, confirmation and submission.

use crate::providers::{ClaimRequest, EnrollmentProvider};
use crate::router::input::{InputKind, POLICY_NUMBER_PATTERN};
use crate::router::{DeferredJob, HandlerContext, Outcome, StateHandler, Transition};
use crate::session::SessionData;
use crate::state::StateTag;
use async_trait::async_trait;
use futures_util::FutureExt;
use std::sync::Arc;

pub(crate) static POLICY_NUMBER: InputKind = InputKind::Pattern {
    regex: &POLICY_NUMBER_PATTERN,
    hint: "That doesn't look like a policy number. It looks like POL-123456.",
};

pub struct ClaimHandler;

#[async_trait]
impl StateHandler for ClaimHandler {
    async fn handle(&self, state: StateTag, ctx: &HandlerContext<'_>) -> Outcome {
        match state {
            StateTag::ClaimPolicyNumber => match POLICY_NUMBER.parse(ctx.raw, &ctx.session.data) {
                Ok(number) => Transition::prompt(StateTag::ClaimType)
                    .with("claim_policy_number", number)
                    .into(),
                Err(problem) => Transition::retry(state, &problem).into(),
            },
            StateTag::ClaimConfirm => match ctx.input {
                "1" => submit(ctx),
                "2" => Transition::to(
                    StateTag::Cancelled,
                    "Your claim was not submitted. Say hi anytime to start again.",
                )
                .into(),
                _ => Transition::retry(state, "Please reply 1 or 2.").into(),
            },
            StateTag::ClaimSubmitted => match ctx.input {
                "1" => Transition::prompt(StateTag::FeedbackRating).into(),
                _ => Transition::prompt(StateTag::Completed).into(),
            },
            _ => Transition::prompt(state).into(),
        }
    }

    fn name(&self) -> &'static str {
        "claim"
    }
}

fn submit(ctx: &HandlerContext<'_>) -> Outcome {
    let Some(policy_number) = ctx.session.get_str("claim_policy_number") else {
        return Transition::prompt(StateTag::ClaimPolicyNumber).into();
    };

    let request = ClaimRequest {
        participant_id: ctx.participant_id.to_string(),
        policy_number: policy_number.to_string(),
        details: claim_details(&ctx.session.data),
    };

    DeferredJob::new(
        "Submitting your claim...",
        submit_claim(ctx.providers.enrollment.clone(), request).boxed(),
    )
    .into()
}

/// Only the claim fields travel to the claims backend.
fn claim_details(data: &SessionData) -> SessionData {
    const FIELDS: &[&str] = &[
        "claim_type",
        "incident_date",
        "incident_location",
        "description",
        "claim_amount",
        "has_documents",
    ];
    data.iter()
        .filter(|(key, _)| FIELDS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

async fn submit_claim(
    enrollment: Arc<dyn EnrollmentProvider>,
    request: ClaimRequest,
) -> anyhow::Result<Transition> {
    let receipt = enrollment.submit_claim(request).await?;
    Ok(Transition::to(
        StateTag::ClaimSubmitted,
        format!(
            "Your claim has been submitted. Your claim number is {}.\n\n{}",
            receipt.claim_number,
            StateTag::ClaimSubmitted.prompt()
        ),
    )
    .with("claim_number", receipt.claim_number))
}
