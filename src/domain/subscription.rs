use {
    super::error::BillingError,
    chrono::{DateTime, Duration, Utc},
    serde::{Deserialize, Serialize},
    std::fmt,
    uuid::Uuid,
};

/// Default billing period used when the processor event carries no explicit
/// period bounds (a first payment confirms a monthly cycle).
pub const DEFAULT_PERIOD_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Incomplete,
    Active,
    PastDue,
    Unpaid,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Incomplete => "incomplete",
            Self::Active => "active",
            Self::PastDue => "past_due",
            Self::Unpaid => "unpaid",
            Self::Cancelled => "cancelled",
        }
    }

    /// Cancelled is terminal — nothing moves a subscription out of it.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Event-driven transition table:
    /// INCOMPLETE → ACTIVE ⇄ PAST_DUE → CANCELLED, with ACTIVE/PAST_DUE
    /// also able to degrade to UNPAID, and UNPAID only to CANCELLED.
    pub fn can_transition_to(&self, next: &SubscriptionStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (Self::Incomplete, Self::Active)
                | (Self::Incomplete, Self::Cancelled)
                | (Self::Active, Self::PastDue)
                | (Self::Active, Self::Unpaid)
                | (Self::Active, Self::Cancelled)
                | (Self::PastDue, Self::Active)
                | (Self::PastDue, Self::Unpaid)
                | (Self::PastDue, Self::Cancelled)
                | (Self::Unpaid, Self::Cancelled)
        )
    }

    /// Total, explicit mapping from the processor's status vocabulary.
    /// Anything outside it is rejected so the caller retains the old status
    /// instead of guessing.
    pub fn from_processor(value: &str) -> Result<Self, BillingError> {
        match value {
            "active" => Ok(Self::Active),
            "past_due" => Ok(Self::PastDue),
            "canceled" => Ok(Self::Cancelled),
            "unpaid" => Ok(Self::Unpaid),
            "incomplete" => Ok(Self::Incomplete),
            other => Err(BillingError::UnmappedStatus(other.to_string())),
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for SubscriptionStatus {
    type Error = BillingError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "incomplete" => Ok(Self::Incomplete),
            "active" => Ok(Self::Active),
            "past_due" => Ok(Self::PastDue),
            "unpaid" => Ok(Self::Unpaid),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(BillingError::Validation(format!(
                "unknown subscription status: {other}"
            ))),
        }
    }
}

/// Full subscription record as persisted.
#[derive(Debug, Clone, Serialize)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub external_subscription_ref: Option<String>,
    pub status: SubscriptionStatus,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub trial_start: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub cancelled_at: Option<DateTime<Utc>>,
}

/// For INSERT — id generated in Rust via `Uuid::now_v7()`.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub external_subscription_ref: Option<String>,
    pub status: SubscriptionStatus,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub trial_start: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
}

impl NewSubscription {
    /// Provisional row created by the synchronous path; promoted to ACTIVE
    /// exclusively by the webhook path.
    pub fn incomplete(
        user_id: Uuid,
        plan_id: Uuid,
        external_subscription_ref: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id,
            plan_id,
            external_subscription_ref,
            status: SubscriptionStatus::Incomplete,
            current_period_start: now,
            current_period_end: now + Duration::days(DEFAULT_PERIOD_DAYS),
            trial_start: None,
            trial_end: None,
            cancel_at_period_end: false,
        }
    }

    /// Confirmed row created by the first-payment promotion path.
    pub fn active(
        user_id: Uuid,
        plan_id: Uuid,
        external_subscription_ref: Option<String>,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id,
            plan_id,
            external_subscription_ref,
            status: SubscriptionStatus::Active,
            current_period_start: period_start,
            current_period_end: period_end,
            trial_start: None,
            trial_end: None,
            cancel_at_period_end: false,
        }
    }
}

/// Field refresh derived from a `customer.subscription.*` event after the
/// processor status mapped cleanly.
#[derive(Debug, Clone)]
pub struct ProcessorSync {
    pub status: SubscriptionStatus,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub trial_start: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
    pub external_subscription_ref: Option<String>,
}
