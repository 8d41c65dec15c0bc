use {
    super::error::BillingError,
    super::event::LastPaymentError,
    super::id::{InvoiceRef, PaymentRef},
    super::money::Money,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::fmt,
    uuid::Uuid,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    /// Lifecycle rank — higher means further along. A failed payment may
    /// still succeed on retry, but a succeeded one never regresses.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Failed => 1,
            Self::Succeeded => 2,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for PaymentStatus {
    type Error = BillingError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "pending" => Ok(Self::Pending),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            other => Err(BillingError::Validation(format!(
                "unknown payment status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    OneTime,
    Subscription,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneTime => "one_time",
            Self::Subscription => "subscription",
        }
    }
}

impl TryFrom<&str> for PaymentType {
    type Error = BillingError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "one_time" => Ok(Self::OneTime),
            "subscription" => Ok(Self::Subscription),
            other => Err(BillingError::Validation(format!(
                "unknown payment type: {other}"
            ))),
        }
    }
}

/// Known failure shapes plus a generic fallback, so reconciliation logic
/// stays exhaustive-checkable instead of poking at a free-form bag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    CardDeclined { decline_code: Option<String> },
    ExpiredCard,
    InsufficientFunds,
    Other {
        code: Option<String>,
        message: Option<String>,
    },
}

impl FailureReason {
    pub fn from_processor(error: Option<&LastPaymentError>) -> Self {
        let Some(error) = error else {
            return Self::Other {
                code: None,
                message: None,
            };
        };
        match error.code.as_deref() {
            Some("card_declined") => match error.decline_code.as_deref() {
                Some("insufficient_funds") => Self::InsufficientFunds,
                _ => Self::CardDeclined {
                    decline_code: error.decline_code.clone(),
                },
            },
            Some("expired_card") => Self::ExpiredCard,
            _ => Self::Other {
                code: error.code.clone(),
                message: error.message.clone(),
            },
        }
    }
}

/// Full payment record as persisted. Never deleted.
#[derive(Debug, Clone, Serialize)]
pub struct Payment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub money: Money,
    pub status: PaymentStatus,
    pub payment_type: PaymentType,
    pub external_payment_ref: Option<String>,
    pub external_invoice_ref: Option<String>,
    pub subscription_id: Option<Uuid>,
    pub paid_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<FailureReason>,
}

/// For INSERT — id generated in Rust via `Uuid::now_v7()`. At least one of
/// the two external references must be present (schema CHECK mirrors this).
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub money: Money,
    pub status: PaymentStatus,
    pub payment_type: PaymentType,
    pub external_payment_ref: Option<PaymentRef>,
    pub external_invoice_ref: Option<InvoiceRef>,
    pub subscription_id: Option<Uuid>,
    pub paid_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<FailureReason>,
}

impl NewPayment {
    /// The reference this payment is anchored on for logging and duplicate
    /// suppression.
    pub fn anchor(&self) -> &str {
        self.external_payment_ref
            .as_ref()
            .map(PaymentRef::as_str)
            .or(self
                .external_invoice_ref
                .as_ref()
                .map(InvoiceRef::as_str))
            .unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processor_error(
        code: Option<&str>,
        decline_code: Option<&str>,
    ) -> LastPaymentError {
        LastPaymentError {
            code: code.map(String::from),
            decline_code: decline_code.map(String::from),
            message: None,
        }
    }

    #[test]
    fn failure_reason_maps_known_shapes() {
        assert_eq!(
            FailureReason::from_processor(Some(&processor_error(
                Some("card_declined"),
                Some("insufficient_funds")
            ))),
            FailureReason::InsufficientFunds
        );
        assert_eq!(
            FailureReason::from_processor(Some(&processor_error(
                Some("card_declined"),
                Some("do_not_honor")
            ))),
            FailureReason::CardDeclined {
                decline_code: Some("do_not_honor".into())
            }
        );
        assert_eq!(
            FailureReason::from_processor(Some(&processor_error(Some("expired_card"), None))),
            FailureReason::ExpiredCard
        );
    }

    #[test]
    fn unknown_codes_fall_back_to_other() {
        let reason =
            FailureReason::from_processor(Some(&processor_error(Some("processing_error"), None)));
        assert!(matches!(reason, FailureReason::Other { .. }));
        assert!(matches!(
            FailureReason::from_processor(None),
            FailureReason::Other { .. }
        ));
    }

    #[test]
    fn succeeded_outranks_failed() {
        assert!(PaymentStatus::Succeeded.rank() > PaymentStatus::Failed.rank());
        assert!(PaymentStatus::Failed.rank() > PaymentStatus::Pending.rank());
    }
}
