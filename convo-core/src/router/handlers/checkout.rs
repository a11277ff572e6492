//! Checkout: quote confirmation, customer details confirmation and payment.
//!
//! Payment initiation and verification go through deferred jobs. A verified
//! purchase is enrolled in the same job; a verified renewal needs no
//! enrollment.

use super::format_money;
use crate::providers::{
    EnrollmentProvider, EnrollmentRequest, PaymentMethod, PaymentProvider, PaymentRequest,
    PaymentStatus,
};
use crate::router::input::InputKind;
use crate::router::{DeferredJob, HandlerContext, Outcome, StateHandler, Transition};
use crate::session::SessionData;
use crate::state::{Product, StateTag};
use anyhow::Context;
use async_trait::async_trait;
use futures_util::FutureExt;
use serde_json::Value;
use std::sync::Arc;

/// What the payment is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Checkout {
    Purchase,
    Renewal,
}

impl Checkout {
    fn from_data(data: &SessionData) -> Self {
        match data.get("checkout").and_then(Value::as_str) {
            Some("renewal") => Self::Renewal,
            _ => Self::Purchase,
        }
    }
}

pub struct CheckoutHandler;

#[async_trait]
impl StateHandler for CheckoutHandler {
    async fn handle(&self, state: StateTag, ctx: &HandlerContext<'_>) -> Outcome {
        match state {
            StateTag::QuoteSummary => match ctx.input {
                "1" => Transition::prompt(StateTag::CustomerFullName).into(),
                "2" => Transition::prompt(StateTag::CategorySelect).into(),
                _ => Transition::retry(state, "Please reply 1 or 2.").into(),
            },
            StateTag::CustomerConfirm => match ctx.input {
                "1" => Transition::prompt(StateTag::PaymentMethod).into(),
                "2" => Transition::prompt(StateTag::CustomerFullName).into(),
                _ => Transition::retry(state, "Please reply 1 or 2.").into(),
            },
            StateTag::PaymentMethod => match ctx.input {
                "1" => Transition::prompt(StateTag::PaymentPhone)
                    .with("payment_method", PaymentMethod::MobileMoney.as_str())
                    .into(),
                "2" => initiate(ctx, PaymentMethod::Card, ctx.participant_id.to_string()),
                _ => Transition::retry(state, "Please reply 1 or 2.").into(),
            },
            StateTag::PaymentPhone => match InputKind::Phone.parse(ctx.raw, &ctx.session.data) {
                Ok(Value::String(phone)) => initiate(ctx, PaymentMethod::MobileMoney, phone),
                Ok(_) | Err(_) => Transition::retry(
                    state,
                    "Please enter a valid phone number, e.g. +254712345678.",
                )
                .into(),
            },
            StateTag::PaymentConfirm => match ctx.input {
                "1" => verify(ctx),
                "2" => Transition::to(
                    StateTag::Cancelled,
                    "Your payment has been cancelled. Say hi anytime to start again.",
                )
                .into(),
                _ => Transition::retry(state, "Please reply 1 or 2.").into(),
            },
            StateTag::PaymentRetry => match ctx.input {
                "1" => match ctx.session.get_str("payment_phone") {
                    Some(phone) => initiate(ctx, stored_method(&ctx.session.data), phone.to_string()),
                    None => Transition::prompt(StateTag::PaymentPhone).into(),
                },
                "2" => Transition::prompt(StateTag::PaymentPhone).into(),
                "3" => Transition::prompt(StateTag::Cancelled).into(),
                _ => Transition::retry(state, "Please reply 1, 2 or 3.").into(),
            },
            _ => Transition::prompt(state).into(),
        }
    }

    fn name(&self) -> &'static str {
        "checkout"
    }
}

fn stored_method(data: &SessionData) -> PaymentMethod {
    data.get("payment_method")
        .and_then(Value::as_str)
        .and_then(PaymentMethod::parse)
        .unwrap_or(PaymentMethod::MobileMoney)
}

/// What is being paid for: the selected plan, or the policy being renewed.
fn payment_target(data: &SessionData) -> Option<String> {
    match Checkout::from_data(data) {
        Checkout::Purchase => data
            .get("selected_plan")
            .and_then(|plan| plan.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string),
        Checkout::Renewal => data
            .get("policy_number")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

fn initiate(ctx: &HandlerContext<'_>, method: PaymentMethod, phone: String) -> Outcome {
    let data = &ctx.session.data;
    let (Some(amount), Some(plan_id)) = (data.get("amount").and_then(Value::as_f64), payment_target(data))
    else {
        return Outcome::Reset("We couldn't find the quote you were paying for.".into());
    };

    let request = PaymentRequest {
        participant_id: ctx.participant_id.to_string(),
        phone: phone.clone(),
        amount,
        method,
        plan_id,
    };

    DeferredJob::new(
        "Sending your payment request...",
        initiate_payment(ctx.providers.payments.clone(), request).boxed(),
    )
    .with("payment_phone", phone)
    .with("payment_method", method.as_str())
    .into()
}

async fn initiate_payment(
    payments: Arc<dyn PaymentProvider>,
    request: PaymentRequest,
) -> anyhow::Result<Transition> {
    let amount = format_money(request.amount);
    let destination = match request.method {
        PaymentMethod::MobileMoney => format!("We've sent a payment request of {amount} to {}.", request.phone),
        PaymentMethod::Card => format!("Your card payment of {amount} is ready."),
    };

    let initiation = payments.initiate(request).await?;
    let mut message = destination;
    if let Some(instructions) = initiation.instructions.filter(|i| !i.is_empty()) {
        message.push('\n');
        message.push_str(&instructions);
    }
    message.push_str("\n\n");
    message.push_str(StateTag::PaymentConfirm.prompt());

    Ok(Transition::to(StateTag::PaymentConfirm, message).with("payment_reference", initiation.reference))
}

fn verify(ctx: &HandlerContext<'_>) -> Outcome {
    let Some(reference) = ctx.session.get_str("payment_reference") else {
        return Transition::prompt(StateTag::PaymentRetry).into();
    };

    DeferredJob::new(
        "Checking your payment...",
        verify_payment(
            ctx.providers.payments.clone(),
            ctx.providers.enrollment.clone(),
            ctx.participant_id.to_string(),
            reference.to_string(),
            ctx.session.data.clone(),
        )
        .boxed(),
    )
    .into()
}

async fn verify_payment(
    payments: Arc<dyn PaymentProvider>,
    enrollment: Arc<dyn EnrollmentProvider>,
    participant_id: String,
    reference: String,
    data: SessionData,
) -> anyhow::Result<Transition> {
    match payments.status(&reference).await? {
        PaymentStatus::Pending => Ok(Transition::to(
            StateTag::PaymentConfirm,
            format!(
                "We haven't received your payment yet.\n\n{}",
                StateTag::PaymentConfirm.prompt()
            ),
        )),
        PaymentStatus::Failed => Ok(Transition::prompt(StateTag::PaymentRetry)),
        PaymentStatus::Paid => match Checkout::from_data(&data) {
            Checkout::Renewal => {
                let policy = data
                    .get("policy_number")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Ok(Transition::to(
                    StateTag::FeedbackRating,
                    format!(
                        "Payment received! Policy {policy} has been renewed.\n\n{}",
                        StateTag::FeedbackRating.prompt()
                    ),
                ))
            }
            Checkout::Purchase => {
                let product = data
                    .get("product")
                    .and_then(Value::as_str)
                    .and_then(Product::parse)
                    .context("session has no product")?;
                let plan_id = payment_target(&data).context("session has no selected plan")?;

                let enrolled = enrollment
                    .enroll(EnrollmentRequest {
                        participant_id,
                        product,
                        plan_id,
                        payment_reference: reference,
                        details: data,
                    })
                    .await?;

                Ok(Transition::to(
                    StateTag::FeedbackRating,
                    format!(
                        "Payment received! You're covered. Your policy number is {}.\n\n{}",
                        enrolled.policy_number,
                        StateTag::FeedbackRating.prompt()
                    ),
                )
                .with("policy_number", enrolled.policy_number))
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payment_target() {
        let mut data = SessionData::new();
        assert_eq!(payment_target(&data), None);

        data.insert("selected_plan".into(), json!({"id": "motor-gold"}));
        assert_eq!(payment_target(&data).as_deref(), Some("motor-gold"));

        data.insert("checkout".into(), json!("renewal"));
        data.insert("policy_number".into(), json!("POL-123456"));
        assert_eq!(payment_target(&data).as_deref(), Some("POL-123456"));
    }

    #[test]
    fn test_stored_method_defaults_to_mobile_money() {
        let mut data = SessionData::new();
        assert_eq!(stored_method(&data), PaymentMethod::MobileMoney);
        data.insert("payment_method".into(), json!("card"));
        assert_eq!(stored_method(&data), PaymentMethod::Card);
    }
}
