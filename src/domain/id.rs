use derive_more::Display;
use serde::{Deserialize, Serialize};

use super::error::BillingError;

macro_rules! prefixed_id {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Display, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Result<Self, BillingError> {
                let id = id.into();
                if !id.starts_with($prefix) {
                    return Err(BillingError::Validation(format!(
                        concat!(stringify!($name), " must start with ", $prefix, ", got: {}"),
                        id
                    )));
                }
                Ok(Self(id))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }
    };
}

prefixed_id!(
    /// Processor event identifier (`evt_xxx`).
    EventId,
    "evt_"
);

prefixed_id!(
    /// Payment identifier minted by the processor (`pi_xxx`).
    PaymentRef,
    "pi_"
);

prefixed_id!(
    /// Invoice identifier minted by the processor (`in_xxx`).
    InvoiceRef,
    "in_"
);

prefixed_id!(
    /// Processor-side subscription identifier (`sub_xxx`).
    SubscriptionRef,
    "sub_"
);

prefixed_id!(
    /// Processor-side customer identifier (`cus_xxx`).
    CustomerRef,
    "cus_"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_expected_prefixes() {
        assert!(EventId::new("evt_123").is_ok());
        assert!(PaymentRef::new("pi_123").is_ok());
        assert!(InvoiceRef::new("in_123").is_ok());
        assert!(SubscriptionRef::new("sub_123").is_ok());
        assert!(CustomerRef::new("cus_123").is_ok());
    }

    #[test]
    fn rejects_wrong_prefix() {
        assert!(EventId::new("pi_123").is_err());
        assert!(PaymentRef::new("in_123").is_err());
        assert!(SubscriptionRef::new("cus_123").is_err());
    }
}
