//! Handler families.
//!
//! Each family owns a group of related states; [`super::handler_for`] maps
//! every state to exactly one family.

mod checkout;
mod claims;
mod policy;
mod quote;
pub mod steps;

pub use checkout::CheckoutHandler;
pub use claims::ClaimHandler;
pub use policy::PolicyHandler;
pub use quote::PlanSelectHandler;
pub use steps::InputStepHandler;

use super::input::InputKind;
use super::{HandlerContext, Outcome, StateHandler, Transition};
use crate::session::SessionData;
use crate::state::{Product, StateTag};
use async_trait::async_trait;
use serde_json::Value;

const CURRENCY: &str = "KES";

/// Render an amount with thousands separators, e.g. `KES 1,250,000`.
pub fn format_money(amount: f64) -> String {
    let whole = amount.round() as i64;
    let digits = whole.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if whole < 0 { "-" } else { "" };
    format!("{CURRENCY} {sign}{grouped}")
}

fn field<'a>(data: &'a SessionData, key: &str) -> &'a str {
    data.get(key).and_then(Value::as_str).unwrap_or("-")
}

/// Transition into `state`, rendering summaries for confirmation states.
pub(crate) fn enter(state: StateTag, data: &SessionData) -> Transition {
    match state {
        StateTag::CustomerConfirm => Transition::to(
            state,
            format!(
                "Please confirm your details:\nName: {}\nID number: {}\nDate of birth: {}\nEmail: {}\nAddress: {}\n\n{}",
                field(data, "full_name"),
                field(data, "id_number"),
                field(data, "date_of_birth"),
                field(data, "email"),
                field(data, "address"),
                state.prompt()
            ),
        ),
        StateTag::ClaimConfirm => {
            let amount = data
                .get("claim_amount")
                .and_then(Value::as_f64)
                .map(format_money)
                .unwrap_or_else(|| "-".into());
            let documents = match data.get("has_documents").and_then(Value::as_bool) {
                Some(true) => "yes",
                Some(false) => "no",
                None => "-",
            };
            Transition::to(
                state,
                format!(
                    "Please review your claim:\nPolicy: {}\nType: {}\nDate: {}\nLocation: {}\nAmount: {}\nDocuments: {}\n\n{}",
                    field(data, "claim_policy_number"),
                    field(data, "claim_type"),
                    field(data, "incident_date"),
                    field(data, "incident_location"),
                    amount,
                    documents,
                    state.prompt()
                ),
            )
        }
        _ => Transition::prompt(state),
    }
}

// ============================================================================
// Menus
// ============================================================================

/// Home menu and product category menu.
pub struct MenuHandler;

#[async_trait]
impl StateHandler for MenuHandler {
    async fn handle(&self, state: StateTag, ctx: &HandlerContext<'_>) -> Outcome {
        match state {
            StateTag::Home => match ctx.input {
                "1" => Transition::prompt(StateTag::CategorySelect),
                "2" => Transition::prompt(StateTag::ClaimPolicyNumber),
                "3" => Transition::prompt(StateTag::PolicyNumber),
                "4" => Transition::prompt(StateTag::AgentHandoff),
                _ => Transition::retry(StateTag::Home, "Please reply with a number from 1 to 4."),
            }
            .into(),
            _ => match Product::from_menu_choice(ctx.input) {
                Some(product) => Transition::prompt(product.first_step())
                    .with("product", product.as_str())
                    .into(),
                None => Transition::retry(state, "Please reply with a number from 1 to 6.").into(),
            },
        }
    }

    fn name(&self) -> &'static str {
        "menu"
    }
}

// ============================================================================
// Static States
// ============================================================================

/// Processing and terminal states.
pub struct StaticHandler;

#[async_trait]
impl StateHandler for StaticHandler {
    async fn handle(&self, state: StateTag, _ctx: &HandlerContext<'_>) -> Outcome {
        if state == StateTag::Processing {
            Transition::prompt(state).into()
        } else {
            // A stored terminal state only survives if its session was never
            // destroyed; treat it as a finished conversation.
            Outcome::Reset("Welcome back!".into())
        }
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

// ============================================================================
// Feedback
// ============================================================================

pub struct FeedbackHandler;

#[async_trait]
impl StateHandler for FeedbackHandler {
    async fn handle(&self, state: StateTag, ctx: &HandlerContext<'_>) -> Outcome {
        if state == StateTag::FeedbackRating {
            return match (InputKind::Number { min: 1, max: 5 }).parse(ctx.raw, &ctx.session.data) {
                Ok(rating) => Transition::prompt(StateTag::FeedbackComment)
                    .with("rating", rating)
                    .into(),
                Err(_) => Transition::retry(state, "Please reply with a number from 1 to 5.").into(),
            };
        }

        let rating = ctx.session.data.get("rating").and_then(Value::as_u64);
        if ctx.input == "skip" {
            tracing::info!(rating, "Feedback received");
            return Transition::prompt(StateTag::Completed).into();
        }

        match (InputKind::Text { min: 1, max: 500 }).parse(ctx.raw, &ctx.session.data) {
            Ok(comment) => {
                tracing::info!(rating, comment_len = ctx.raw.chars().count(), "Feedback received");
                Transition::to(
                    StateTag::Completed,
                    format!("Thanks for your feedback!\n\n{}", StateTag::Completed.prompt()),
                )
                .with("comment", comment)
                .into()
            }
            Err(problem) => Transition::retry(state, &problem).into(),
        }
    }

    fn name(&self) -> &'static str {
        "feedback"
    }
}
