//! Data-collection steps: one validated field per state.

use super::{enter, quote};
use crate::router::input::{DateRule, InputKind, ID_NUMBER_PATTERN, REGISTRATION_PATTERN};
use crate::router::{HandlerContext, Outcome, StateHandler, Transition, RECOVERED_NOTICE};
use crate::session::SessionData;
use crate::state::{Product, StateTag};
use async_trait::async_trait;
use serde_json::Value;

/// Where a step goes once its field is accepted.
#[derive(Clone, Copy)]
pub enum Next {
    To(StateTag),
    /// Last quote question: fetch plans for the product out-of-band.
    Fetch(Product),
    /// Decided from the accepted value and the data collected so far.
    Branch(fn(&Value, &SessionData) -> StateTag),
}

#[derive(Clone, Copy)]
pub struct Step {
    pub field: &'static str,
    pub kind: InputKind,
    pub next: Next,
}

const fn step_to(field: &'static str, kind: InputKind, next: StateTag) -> Step {
    Step {
        field,
        kind,
        next: Next::To(next),
    }
}

const fn text(min: usize, max: usize) -> InputKind {
    InputKind::Text { min, max }
}

const fn number(min: u64, max: u64) -> InputKind {
    InputKind::Number { min, max }
}

fn after_principal_age(_: &Value, data: &SessionData) -> StateTag {
    match data.get("cover_for").and_then(Value::as_str) {
        Some("Just me") => StateTag::HealthPreexisting,
        _ => StateTag::HealthDependants,
    }
}

fn after_dependants(count: &Value, _: &SessionData) -> StateTag {
    if count.as_u64() == Some(0) {
        StateTag::HealthPreexisting
    } else {
        StateTag::HealthDependantAges
    }
}

/// Step definition for a data-collection state.
pub fn step(state: StateTag) -> Option<Step> {
    use StateTag::*;
    let step = match state {
        MotorVehicleType => step_to(
            "vehicle_type",
            InputKind::Options(&["Private car", "Commercial vehicle", "Motorcycle"]),
            MotorRegistration,
        ),
        MotorRegistration => step_to(
            "registration",
            InputKind::Pattern {
                regex: &REGISTRATION_PATTERN,
                hint: "Please enter a valid registration number, e.g. KDA 123A.",
            },
            MotorMake,
        ),
        MotorMake => step_to("make", text(2, 40), MotorModel),
        MotorModel => step_to("model", text(1, 40), MotorYear),
        MotorYear => step_to("year", number(1980, 2100), MotorValue),
        MotorValue => step_to("vehicle_value", number(50_000, 100_000_000), MotorCoverType),
        MotorCoverType => Step {
            field: "cover_type",
            kind: InputKind::Options(&["Comprehensive", "Third party only"]),
            next: Next::Fetch(Product::Motor),
        },

        HealthCoverFor => step_to(
            "cover_for",
            InputKind::Options(&["Just me", "Me and my family"]),
            HealthPrincipalAge,
        ),
        HealthPrincipalAge => Step {
            field: "principal_age",
            kind: number(18, 99),
            next: Next::Branch(after_principal_age),
        },
        HealthDependants => Step {
            field: "dependants",
            kind: number(0, 10),
            next: Next::Branch(after_dependants),
        },
        HealthDependantAges => step_to(
            "dependant_ages",
            InputKind::AgeList {
                count_field: "dependants",
            },
            HealthPreexisting,
        ),
        HealthPreexisting => step_to("preexisting", InputKind::YesNo, HealthInpatientLimit),
        HealthInpatientLimit => Step {
            field: "inpatient_limit",
            kind: InputKind::Options(&["500,000", "1,000,000", "2,000,000"]),
            next: Next::Fetch(Product::Health),
        },

        TravelDestination => step_to("destination", text(2, 60), TravelDeparture),
        TravelDeparture => step_to("departure", InputKind::Date(DateRule::Future), TravelReturn),
        TravelReturn => step_to(
            "return",
            InputKind::Date(DateRule::After("departure")),
            TravelTravellers,
        ),
        TravelTravellers => step_to("travellers", number(1, 10), TravelTravellerAges),
        TravelTravellerAges => step_to(
            "traveller_ages",
            InputKind::AgeList {
                count_field: "travellers",
            },
            TravelPurpose,
        ),
        TravelPurpose => Step {
            field: "purpose",
            kind: InputKind::Options(&["Leisure", "Business", "Study"]),
            next: Next::Fetch(Product::Travel),
        },

        LifeAge => step_to("age", number(18, 75), LifeSmoker),
        LifeSmoker => step_to("smoker", InputKind::YesNo, LifeSumAssured),
        LifeSumAssured => step_to("sum_assured", number(100_000, 1_000_000_000), LifeTerm),
        LifeTerm => step_to("term_years", number(5, 40), LifeBeneficiary),
        LifeBeneficiary => Step {
            field: "beneficiary",
            kind: text(3, 80),
            next: Next::Fetch(Product::Life),
        },

        PropertyType => step_to(
            "property_type",
            InputKind::Options(&["Apartment", "House", "Commercial building"]),
            PropertyLocation,
        ),
        PropertyLocation => step_to("location", text(2, 80), PropertyBuildingValue),
        PropertyBuildingValue => step_to(
            "building_value",
            number(0, 10_000_000_000),
            PropertyContentsValue,
        ),
        PropertyContentsValue => step_to(
            "contents_value",
            number(0, 1_000_000_000),
            PropertySecurity,
        ),
        PropertySecurity => Step {
            field: "security",
            kind: InputKind::YesNo,
            next: Next::Fetch(Product::Property),
        },

        GadgetType => step_to(
            "gadget_type",
            InputKind::Options(&["Phone", "Laptop", "Tablet", "Camera"]),
            GadgetBrand,
        ),
        GadgetBrand => step_to("brand", text(2, 60), GadgetValue),
        GadgetValue => step_to("gadget_value", number(1_000, 1_000_000), GadgetPurchaseDate),
        GadgetPurchaseDate => Step {
            field: "purchase_date",
            kind: InputKind::Date(DateRule::Past),
            next: Next::Fetch(Product::Gadget),
        },

        CustomerFullName => step_to("full_name", text(3, 80), CustomerIdNumber),
        CustomerIdNumber => step_to(
            "id_number",
            InputKind::Pattern {
                regex: &ID_NUMBER_PATTERN,
                hint: "Please enter a valid ID or passport number (6-12 letters or digits).",
            },
            CustomerDateOfBirth,
        ),
        CustomerDateOfBirth => step_to(
            "date_of_birth",
            InputKind::Date(DateRule::AgeAtLeast(18)),
            CustomerEmail,
        ),
        CustomerEmail => step_to("email", InputKind::Email, CustomerAddress),
        CustomerAddress => step_to("address", text(5, 160), CustomerConfirm),

        ClaimType => step_to(
            "claim_type",
            InputKind::Options(&["Accident", "Theft", "Medical", "Damage", "Other"]),
            ClaimIncidentDate,
        ),
        ClaimIncidentDate => step_to(
            "incident_date",
            InputKind::Date(DateRule::Past),
            ClaimIncidentLocation,
        ),
        ClaimIncidentLocation => step_to("incident_location", text(2, 120), ClaimDescription),
        ClaimDescription => step_to("description", text(10, 1000), ClaimAmount),
        ClaimAmount => step_to("claim_amount", number(1, 100_000_000), ClaimDocuments),
        ClaimDocuments => step_to("has_documents", InputKind::YesNo, ClaimConfirm),

        _ => return None,
    };
    Some(step)
}

/// Validates one field per state and advances along the step table.
pub struct InputStepHandler;

#[async_trait]
impl StateHandler for InputStepHandler {
    async fn handle(&self, state: StateTag, ctx: &HandlerContext<'_>) -> Outcome {
        let Some(step) = step(state) else {
            tracing::error!(%state, "No input step registered");
            return Outcome::Reset(RECOVERED_NOTICE.into());
        };

        let value = match step.kind.parse(ctx.raw, &ctx.session.data) {
            Ok(value) => value,
            Err(problem) => return Transition::retry(state, &problem).into(),
        };

        let mut collected = ctx.session.data.clone();
        collected.insert(step.field.to_string(), value.clone());

        let next = match step.next {
            Next::To(next) => next,
            Next::Branch(decide) => decide(&value, &collected),
            Next::Fetch(product) => {
                let job = quote::catalog_job(product, collected, ctx.providers);
                return Outcome::Deferred(job.with(step.field, value));
            }
        };

        enter(next, &collected).with(step.field, value).into()
    }

    fn name(&self) -> &'static str {
        "input"
    }
}
