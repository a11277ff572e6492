//! Conversation state-tag registry.
//!
//! Every session sits on exactly one [`StateTag`]. The set is closed: the wire
//! representation is a stable kebab-case string, and anything that does not
//! parse back into a tag is treated by the router as a corrupted session.
//!
//! The registry also carries the static parts of the flow graph:
//! - [`StateTag::predecessor`]: where "back" goes
//! - [`StateTag::prompt`]: the canonical prompt shown on entering a state
//! - [`StateTag::is_terminal`]: states that end the session

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! state_tags {
    ($($variant:ident => $wire:literal,)+) => {
        /// Position of a participant in the conversation flow graph.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(into = "String", try_from = "String")]
        pub enum StateTag {
            $($variant,)+
        }

        impl StateTag {
            /// Every tag in the registry.
            pub const ALL: &'static [StateTag] = &[$(StateTag::$variant,)+];

            /// Stable wire string stored in session records.
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $wire,)+
                }
            }

            /// Parse a wire string. Unknown strings yield `None`.
            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $($wire => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl From<StateTag> for String {
            fn from(tag: StateTag) -> Self {
                tag.as_str().to_string()
            }
        }

        impl TryFrom<String> for StateTag {
            type Error = String;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::parse(&s).ok_or_else(|| format!("unknown state tag '{s}'"))
            }
        }
    };
}

state_tags! {
    // Core
    Home => "home",
    CategorySelect => "category-select",
    Processing => "processing",
    AgentHandoff => "agent-handoff",
    Completed => "completed",
    Cancelled => "cancelled",

    // Motor
    MotorVehicleType => "motor-vehicle-type",
    MotorRegistration => "motor-registration",
    MotorMake => "motor-make",
    MotorModel => "motor-model",
    MotorYear => "motor-year",
    MotorValue => "motor-value",
    MotorCoverType => "motor-cover-type",
    MotorPlanSelect => "motor-plan-select",

    // Health
    HealthCoverFor => "health-cover-for",
    HealthPrincipalAge => "health-principal-age",
    HealthDependants => "health-dependants",
    HealthDependantAges => "health-dependant-ages",
    HealthPreexisting => "health-preexisting",
    HealthInpatientLimit => "health-inpatient-limit",
    HealthPlanSelect => "health-plan-select",

    // Travel
    TravelDestination => "travel-destination",
    TravelDeparture => "travel-departure",
    TravelReturn => "travel-return",
    TravelTravellers => "travel-travellers",
    TravelTravellerAges => "travel-traveller-ages",
    TravelPurpose => "travel-purpose",
    TravelPlanSelect => "travel-plan-select",

    // Life
    LifeAge => "life-age",
    LifeSmoker => "life-smoker",
    LifeSumAssured => "life-sum-assured",
    LifeTerm => "life-term",
    LifeBeneficiary => "life-beneficiary",
    LifePlanSelect => "life-plan-select",

    // Property
    PropertyType => "property-type",
    PropertyLocation => "property-location",
    PropertyBuildingValue => "property-building-value",
    PropertyContentsValue => "property-contents-value",
    PropertySecurity => "property-security",
    PropertyPlanSelect => "property-plan-select",

    // Gadget
    GadgetType => "gadget-type",
    GadgetBrand => "gadget-brand",
    GadgetValue => "gadget-value",
    GadgetPurchaseDate => "gadget-purchase-date",
    GadgetPlanSelect => "gadget-plan-select",

    // Checkout
    QuoteSummary => "quote-summary",
    CustomerFullName => "customer-full-name",
    CustomerIdNumber => "customer-id-number",
    CustomerDateOfBirth => "customer-date-of-birth",
    CustomerEmail => "customer-email",
    CustomerAddress => "customer-address",
    CustomerConfirm => "customer-confirm",
    PaymentMethod => "payment-method",
    PaymentPhone => "payment-phone",
    PaymentConfirm => "payment-confirm",
    PaymentRetry => "payment-retry",

    // Claims
    ClaimPolicyNumber => "claim-policy-number",
    ClaimType => "claim-type",
    ClaimIncidentDate => "claim-incident-date",
    ClaimIncidentLocation => "claim-incident-location",
    ClaimDescription => "claim-description",
    ClaimAmount => "claim-amount",
    ClaimDocuments => "claim-documents",
    ClaimConfirm => "claim-confirm",
    ClaimSubmitted => "claim-submitted",

    // Policy servicing
    PolicyNumber => "policy-number",
    PolicyActions => "policy-actions",
    RenewalConfirm => "renewal-confirm",

    // Feedback
    FeedbackRating => "feedback-rating",
    FeedbackComment => "feedback-comment",
}

/// Welcome text shown at the home state.
pub const WELCOME: &str = "Hi! Welcome to Convo Insurance. How can we help you today?\n\
1. Get a quote\n\
2. Make a claim\n\
3. Manage my policy\n\
4. Talk to an agent";

impl StateTag {
    /// Statically declared predecessor used by the "back" interrupt.
    ///
    /// States without one (entry points, in-flight payment, terminal states)
    /// cannot be navigated back from.
    pub const fn predecessor(&self) -> Option<StateTag> {
        use StateTag::*;
        match self {
            Home | Processing | AgentHandoff | Completed | Cancelled => None,
            CategorySelect => Some(Home),

            MotorVehicleType => Some(CategorySelect),
            MotorRegistration => Some(MotorVehicleType),
            MotorMake => Some(MotorRegistration),
            MotorModel => Some(MotorMake),
            MotorYear => Some(MotorModel),
            MotorValue => Some(MotorYear),
            MotorCoverType => Some(MotorValue),
            MotorPlanSelect => Some(MotorCoverType),

            HealthCoverFor => Some(CategorySelect),
            HealthPrincipalAge => Some(HealthCoverFor),
            HealthDependants => Some(HealthPrincipalAge),
            HealthDependantAges => Some(HealthDependants),
            HealthPreexisting => Some(HealthDependantAges),
            HealthInpatientLimit => Some(HealthPreexisting),
            HealthPlanSelect => Some(HealthInpatientLimit),

            TravelDestination => Some(CategorySelect),
            TravelDeparture => Some(TravelDestination),
            TravelReturn => Some(TravelDeparture),
            TravelTravellers => Some(TravelReturn),
            TravelTravellerAges => Some(TravelTravellers),
            TravelPurpose => Some(TravelTravellerAges),
            TravelPlanSelect => Some(TravelPurpose),

            LifeAge => Some(CategorySelect),
            LifeSmoker => Some(LifeAge),
            LifeSumAssured => Some(LifeSmoker),
            LifeTerm => Some(LifeSumAssured),
            LifeBeneficiary => Some(LifeTerm),
            LifePlanSelect => Some(LifeBeneficiary),

            PropertyType => Some(CategorySelect),
            PropertyLocation => Some(PropertyType),
            PropertyBuildingValue => Some(PropertyLocation),
            PropertyContentsValue => Some(PropertyBuildingValue),
            PropertySecurity => Some(PropertyContentsValue),
            PropertyPlanSelect => Some(PropertySecurity),

            GadgetType => Some(CategorySelect),
            GadgetBrand => Some(GadgetType),
            GadgetValue => Some(GadgetBrand),
            GadgetPurchaseDate => Some(GadgetValue),
            GadgetPlanSelect => Some(GadgetPurchaseDate),

            // The plan-select state that led here depends on the product.
            QuoteSummary => None,
            CustomerFullName => Some(QuoteSummary),
            CustomerIdNumber => Some(CustomerFullName),
            CustomerDateOfBirth => Some(CustomerIdNumber),
            CustomerEmail => Some(CustomerDateOfBirth),
            CustomerAddress => Some(CustomerEmail),
            CustomerConfirm => Some(CustomerAddress),
            PaymentMethod => Some(CustomerConfirm),
            PaymentPhone => Some(PaymentMethod),
            PaymentConfirm | PaymentRetry => None,

            ClaimPolicyNumber => Some(Home),
            ClaimType => Some(ClaimPolicyNumber),
            ClaimIncidentDate => Some(ClaimType),
            ClaimIncidentLocation => Some(ClaimIncidentDate),
            ClaimDescription => Some(ClaimIncidentLocation),
            ClaimAmount => Some(ClaimDescription),
            ClaimDocuments => Some(ClaimAmount),
            ClaimConfirm => Some(ClaimDocuments),
            ClaimSubmitted => None,

            PolicyNumber => Some(Home),
            PolicyActions => Some(PolicyNumber),
            RenewalConfirm => Some(PolicyActions),

            FeedbackRating => None,
            FeedbackComment => Some(FeedbackRating),
        }
    }

    /// Canonical prompt shown when a participant enters this state.
    pub const fn prompt(&self) -> &'static str {
        use StateTag::*;
        match self {
            Home => WELCOME,
            CategorySelect => {
                "Which cover would you like a quote for?\n\
                 1. Motor\n2. Health\n3. Travel\n4. Life\n5. Home & property\n6. Gadget"
            }
            Processing => "We're still working on your request. Please wait a moment.",
            AgentHandoff => {
                "Thanks! One of our agents will contact you on this number shortly."
            }
            Completed => "Thank you for choosing Convo Insurance. Say hi anytime to start again.",
            Cancelled => "Your request has been cancelled. Say hi anytime to start again.",

            MotorVehicleType => {
                "What type of vehicle is it?\n1. Private car\n2. Commercial vehicle\n3. Motorcycle"
            }
            MotorRegistration => "Please enter the vehicle registration number.",
            MotorMake => "What is the make of the vehicle? (e.g. Toyota)",
            MotorModel => "What is the model? (e.g. Corolla)",
            MotorYear => "What year was the vehicle manufactured?",
            MotorValue => "What is the current value of the vehicle?",
            MotorCoverType => "Which cover do you need?\n1. Comprehensive\n2. Third party only",
            MotorPlanSelect | HealthPlanSelect | TravelPlanSelect | LifePlanSelect
            | PropertyPlanSelect | GadgetPlanSelect => {
                "Reply with the number of the plan you would like."
            }

            HealthCoverFor => "Who is the cover for?\n1. Just me\n2. Me and my family",
            HealthPrincipalAge => "How old are you?",
            HealthDependants => "How many dependants should be covered? (0-10)",
            HealthDependantAges => "Please list the ages of your dependants, separated by commas.",
            HealthPreexisting => "Does anyone to be covered have a pre-existing condition? (yes/no)",
            HealthInpatientLimit => {
                "Choose an inpatient limit:\n1. 500,000\n2. 1,000,000\n3. 2,000,000"
            }

            TravelDestination => "Which country are you travelling to?",
            TravelDeparture => "What is your departure date? (DD/MM/YYYY)",
            TravelReturn => "What is your return date? (DD/MM/YYYY)",
            TravelTravellers => "How many people are travelling? (1-10)",
            TravelTravellerAges => "Please list the ages of all travellers, separated by commas.",
            TravelPurpose => "What is the purpose of the trip?\n1. Leisure\n2. Business\n3. Study",

            LifeAge => "How old are you? (18-75)",
            LifeSmoker => "Do you smoke? (yes/no)",
            LifeSumAssured => "How much cover (sum assured) would you like?",
            LifeTerm => "For how many years? (5-40)",
            LifeBeneficiary => "Who is the main beneficiary? Please enter their full name.",

            PropertyType => "What type of property is it?\n1. Apartment\n2. House\n3. Commercial building",
            PropertyLocation => "Where is the property located? (town or area)",
            PropertyBuildingValue => "What is the value of the building? Enter 0 to cover contents only.",
            PropertyContentsValue => "What is the value of the contents?",
            PropertySecurity => "Does the property have a guard or alarm system? (yes/no)",

            GadgetType => "What gadget would you like to cover?\n1. Phone\n2. Laptop\n3. Tablet\n4. Camera",
            GadgetBrand => "What brand and model is it?",
            GadgetValue => "What did it cost?",
            GadgetPurchaseDate => "When did you buy it? (DD/MM/YYYY)",

            QuoteSummary => "Reply 1 to proceed with this plan or 2 to choose another cover.",
            CustomerFullName => "Great! Please enter your full name as it appears on your ID.",
            CustomerIdNumber => "Please enter your national ID or passport number.",
            CustomerDateOfBirth => "What is your date of birth? (DD/MM/YYYY)",
            CustomerEmail => "What is your email address?",
            CustomerAddress => "What is your postal or physical address?",
            CustomerConfirm => "Reply 1 to confirm your details or 2 to edit them.",
            PaymentMethod => "How would you like to pay?\n1. Mobile money\n2. Card",
            PaymentPhone => "Please enter the phone number to charge (e.g. +254712345678).",
            PaymentConfirm => "Reply 1 once you have completed the payment, or 2 to cancel.",
            PaymentRetry => {
                "We could not complete the payment.\n1. Try again\n2. Use a different number\n3. Cancel"
            }

            ClaimPolicyNumber => "Please enter the policy number you are claiming against.",
            ClaimType => "What happened?\n1. Accident\n2. Theft\n3. Medical\n4. Damage\n5. Other",
            ClaimIncidentDate => "When did it happen? (DD/MM/YYYY)",
            ClaimIncidentLocation => "Where did it happen?",
            ClaimDescription => "Please describe what happened in a few sentences.",
            ClaimAmount => "What amount are you claiming?",
            ClaimDocuments => "Do you have supporting documents (photos, receipts, reports)? (yes/no)",
            ClaimConfirm => "Reply 1 to submit your claim or 2 to cancel.",
            ClaimSubmitted => "Your claim is being reviewed. Reply 1 to rate our service or anything else to finish.",

            PolicyNumber => "Please enter your policy number.",
            PolicyActions => "What would you like to do?\n1. Renew this policy\n2. Make a claim\n3. Main menu",
            RenewalConfirm => "Reply 1 to renew and pay now, or 2 to go back to the main menu.",

            FeedbackRating => "How would you rate your experience from 1 (poor) to 5 (excellent)?",
            FeedbackComment => "Any comments for us? Reply 'skip' to finish.",
        }
    }

    /// Terminal states end the conversation: entering one destroys the session.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::AgentHandoff | Self::Completed | Self::Cancelled)
    }

    /// The product whose quote sub-flow this state belongs to, if any.
    pub fn product(&self) -> Option<Product> {
        Product::ALL
            .iter()
            .copied()
            .find(|p| p.states().contains(self))
    }
}

impl fmt::Display for StateTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Insurance product families offered from the category menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Product {
    Motor,
    Health,
    Travel,
    Life,
    Property,
    Gadget,
}

impl Product {
    /// Products in category-menu order.
    pub const ALL: [Product; 6] = [
        Product::Motor,
        Product::Health,
        Product::Travel,
        Product::Life,
        Product::Property,
        Product::Gadget,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Motor => "motor",
            Self::Health => "health",
            Self::Travel => "travel",
            Self::Life => "life",
            Self::Property => "property",
            Self::Gadget => "gadget",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.as_str() == s)
    }

    /// Menu choice ("1".."6") on the category menu.
    pub fn from_menu_choice(choice: &str) -> Option<Self> {
        let index: usize = choice.parse().ok()?;
        Self::ALL.get(index.checked_sub(1)?).copied()
    }

    /// First data-collection state of this product's sub-flow.
    pub const fn first_step(&self) -> StateTag {
        match self {
            Self::Motor => StateTag::MotorVehicleType,
            Self::Health => StateTag::HealthCoverFor,
            Self::Travel => StateTag::TravelDestination,
            Self::Life => StateTag::LifeAge,
            Self::Property => StateTag::PropertyType,
            Self::Gadget => StateTag::GadgetType,
        }
    }

    /// State in which the participant picks from fetched plans.
    pub const fn plan_select(&self) -> StateTag {
        match self {
            Self::Motor => StateTag::MotorPlanSelect,
            Self::Health => StateTag::HealthPlanSelect,
            Self::Travel => StateTag::TravelPlanSelect,
            Self::Life => StateTag::LifePlanSelect,
            Self::Property => StateTag::PropertyPlanSelect,
            Self::Gadget => StateTag::GadgetPlanSelect,
        }
    }

    /// All states in this product's quote sub-flow.
    pub const fn states(&self) -> &'static [StateTag] {
        use StateTag::*;
        match self {
            Self::Motor => &[
                MotorVehicleType,
                MotorRegistration,
                MotorMake,
                MotorModel,
                MotorYear,
                MotorValue,
                MotorCoverType,
                MotorPlanSelect,
            ],
            Self::Health => &[
                HealthCoverFor,
                HealthPrincipalAge,
                HealthDependants,
                HealthDependantAges,
                HealthPreexisting,
                HealthInpatientLimit,
                HealthPlanSelect,
            ],
            Self::Travel => &[
                TravelDestination,
                TravelDeparture,
                TravelReturn,
                TravelTravellers,
                TravelTravellerAges,
                TravelPurpose,
                TravelPlanSelect,
            ],
            Self::Life => &[
                LifeAge,
                LifeSmoker,
                LifeSumAssured,
                LifeTerm,
                LifeBeneficiary,
                LifePlanSelect,
            ],
            Self::Property => &[
                PropertyType,
                PropertyLocation,
                PropertyBuildingValue,
                PropertyContentsValue,
                PropertySecurity,
                PropertyPlanSelect,
            ],
            Self::Gadget => &[
                GadgetType,
                GadgetBrand,
                GadgetValue,
                GadgetPurchaseDate,
                GadgetPlanSelect,
            ],
        }
    }

    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Motor => "Motor",
            Self::Health => "Health",
            Self::Travel => "Travel",
            Self::Life => "Life",
            Self::Property => "Home & property",
            Self::Gadget => "Gadget",
        }
    }
}
