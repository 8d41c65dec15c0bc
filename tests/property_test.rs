use bill_sync::domain::payment::PaymentStatus;
use bill_sync::domain::subscription::SubscriptionStatus;
use proptest::prelude::*;

fn arb_status() -> impl Strategy<Value = SubscriptionStatus> {
    prop_oneof![
        Just(SubscriptionStatus::Incomplete),
        Just(SubscriptionStatus::Active),
        Just(SubscriptionStatus::PastDue),
        Just(SubscriptionStatus::Unpaid),
        Just(SubscriptionStatus::Cancelled),
    ]
}

const PROCESSOR_VOCABULARY: [&str; 5] = ["active", "past_due", "canceled", "unpaid", "incomplete"];

proptest! {
    /// CANCELLED absorbs everything — no target is ever reachable from it.
    #[test]
    fn cancelled_rejects_all_transitions(target in arb_status()) {
        prop_assert!(!SubscriptionStatus::Cancelled.can_transition_to(&target));
    }

    /// No self-transitions: a "transition" to the same status is a refresh,
    /// never a state machine step.
    #[test]
    fn no_self_transitions(status in arb_status()) {
        prop_assert!(!status.can_transition_to(&status));
    }

    /// Any walk through the transition table that reaches CANCELLED stays
    /// there for every remaining step.
    #[test]
    fn random_walk_never_leaves_cancelled(
        steps in prop::collection::vec(arb_status(), 1..30)
    ) {
        let mut current = SubscriptionStatus::Incomplete;
        for next in &steps {
            let was_terminal = current.is_terminal();
            if current.can_transition_to(next) {
                prop_assert!(!was_terminal, "stepped out of a terminal state");
                current = *next;
            }
        }
    }

    /// Every value in the processor's vocabulary maps to a defined local
    /// status; everything else is rejected, never guessed.
    #[test]
    fn status_mapping_is_total_and_closed(value in "[a-z_]{1,16}") {
        let mapped = SubscriptionStatus::from_processor(&value);
        if PROCESSOR_VOCABULARY.contains(&value.as_str()) {
            prop_assert!(mapped.is_ok());
        } else {
            prop_assert!(mapped.is_err());
        }
    }

    /// as_str → try_from roundtrip is identity for any status.
    #[test]
    fn subscription_status_roundtrip(status in arb_status()) {
        let roundtripped = SubscriptionStatus::try_from(status.as_str()).unwrap();
        prop_assert_eq!(roundtripped, status);
    }
}

fn arb_payment_status() -> impl Strategy<Value = PaymentStatus> {
    prop_oneof![
        Just(PaymentStatus::Pending),
        Just(PaymentStatus::Succeeded),
        Just(PaymentStatus::Failed),
    ]
}

proptest! {
    /// Succeeded is the top of the payment lifecycle — nothing outranks it.
    #[test]
    fn succeeded_is_the_payment_ceiling(status in arb_payment_status()) {
        prop_assert!(status.rank() <= PaymentStatus::Succeeded.rank());
    }

    /// as_str → try_from roundtrip is identity for any payment status.
    #[test]
    fn payment_status_roundtrip(status in arb_payment_status()) {
        let roundtripped = PaymentStatus::try_from(status.as_str()).unwrap();
        prop_assert_eq!(roundtripped, status);
    }
}
