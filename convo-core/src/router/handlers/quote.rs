//! Catalog fetch and plan selection.

use super::format_money;
use crate::providers::{CatalogProvider, Plan, Providers};
use crate::router::{DeferredJob, HandlerContext, Outcome, StateHandler, Transition};
use crate::session::SessionData;
use crate::state::{Product, StateTag};
use async_trait::async_trait;
use futures_util::FutureExt;
use std::sync::Arc;

/// Deferred job that fetches plans and moves the session to plan selection.
pub(crate) fn catalog_job(product: Product, details: SessionData, providers: &Providers) -> DeferredJob {
    DeferredJob::new(
        format!(
            "Thanks! Finding the best {} plans for you...",
            product.display_name().to_lowercase()
        ),
        fetch_plans(providers.catalog.clone(), product, details).boxed(),
    )
}

async fn fetch_plans(
    catalog: Arc<dyn CatalogProvider>,
    product: Product,
    details: SessionData,
) -> anyhow::Result<Transition> {
    let plans = catalog.fetch_plans(product, &details).await?;
    if plans.is_empty() {
        return Ok(Transition::to(
            StateTag::CategorySelect,
            format!(
                "Sorry, we couldn't find {} plans matching those details.\n\n{}",
                product.display_name().to_lowercase(),
                StateTag::CategorySelect.prompt()
            ),
        ));
    }

    let listing = list_plans(product, &plans);
    Ok(Transition::to(product.plan_select(), listing).with("plans", serde_json::to_value(&plans)?))
}

fn list_plans(product: Product, plans: &[Plan]) -> String {
    let mut out = format!("Here are your {} plans:\n", product.display_name().to_lowercase());
    for (i, plan) in plans.iter().enumerate() {
        out.push_str(&format!(
            "{}. {} by {}: {}/year\n",
            i + 1,
            plan.name,
            plan.insurer,
            format_money(plan.premium)
        ));
    }
    out.push('\n');
    out.push_str(product.plan_select().prompt());
    out
}

fn quote_summary(product: Product, plan: &Plan) -> String {
    let mut out = format!(
        "Quote summary\nCover: {}\nPlan: {} by {}\nAnnual premium: {}\n",
        product.display_name(),
        plan.name,
        plan.insurer,
        format_money(plan.premium)
    );
    if !plan.summary.is_empty() {
        out.push_str(&plan.summary);
        out.push('\n');
    }
    out.push('\n');
    out.push_str(StateTag::QuoteSummary.prompt());
    out
}

/// Picks one of the plans stored by the catalog job.
pub struct PlanSelectHandler;

#[async_trait]
impl StateHandler for PlanSelectHandler {
    async fn handle(&self, state: StateTag, ctx: &HandlerContext<'_>) -> Outcome {
        let plans: Vec<Plan> = ctx
            .session
            .data
            .get("plans")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();

        let Some(product) = state.product().filter(|_| !plans.is_empty()) else {
            return Transition::to(
                StateTag::CategorySelect,
                format!(
                    "Your quote has expired. Let's start again.\n\n{}",
                    StateTag::CategorySelect.prompt()
                ),
            )
            .into();
        };

        let choice = ctx
            .input
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| plans.get(i));

        match choice {
            Some(plan) => {
                tracing::debug!(product = product.as_str(), plan_id = %plan.id, "Plan selected");
                let selected = match serde_json::to_value(plan) {
                    Ok(selected) => selected,
                    Err(e) => {
                        tracing::error!(error = %e, "Could not encode selected plan");
                        return Outcome::Reset("Sorry, something went wrong with your quote.".into());
                    }
                };
                Transition::to(StateTag::QuoteSummary, quote_summary(product, plan))
                    .with("selected_plan", selected)
                    .with("amount", plan.premium)
                    .with("checkout", "purchase")
                    .into()
            }
            None => Transition::to(
                state,
                format!(
                    "Please reply with a number from 1 to {}.\n\n{}",
                    plans.len(),
                    list_plans(product, &plans)
                ),
            )
            .into(),
        }
    }

    fn name(&self) -> &'static str {
        "plan-select"
    }
}
