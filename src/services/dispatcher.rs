use {
    crate::domain::{
        error::BillingError,
        event::{EventKind, WebhookEvent},
        id::EventId,
        notify::Notifier,
    },
    crate::services::reconciler::{self, ReconcileOutcome},
    sqlx::PgPool,
    std::sync::Arc,
};

#[derive(Debug)]
pub enum DispatchOutcome {
    /// A handler ran to completion.
    Applied(ReconcileOutcome),
    /// Kind outside the handled set — acknowledged so the processor does
    /// not retry it.
    Ignored,
    /// A handler failed for a local reason — logged for remediation and
    /// acknowledged, because redelivery would retry forever without
    /// resolution.
    Absorbed,
}

impl DispatchOutcome {
    pub fn as_status(&self) -> &'static str {
        match self {
            Self::Applied(ReconcileOutcome::Created(_)) => "created",
            Self::Applied(ReconcileOutcome::Updated(_)) => "updated",
            Self::Applied(ReconcileOutcome::Suppressed(_)) => "duplicate",
            Self::Applied(ReconcileOutcome::NoOp) => "skipped",
            Self::Applied(ReconcileOutcome::Skipped) => "anomaly",
            Self::Ignored => "ignored",
            Self::Absorbed => "acknowledged",
        }
    }
}

/// Routes a verified event to its handler. Every structurally valid event is
/// acknowledged as success — only the verifier (upstream of this function)
/// produces non-2xx responses.
pub async fn dispatch(
    pool: &PgPool,
    notifier: &Arc<dyn Notifier>,
    event: &WebhookEvent,
    raw_kind: &str,
) -> DispatchOutcome {
    if event.kind == EventKind::Unhandled {
        tracing::info!(
            kind = %raw_kind,
            event_id = %event.id,
            "unhandled event kind, acknowledged"
        );
        return DispatchOutcome::Ignored;
    }

    match route(pool, notifier, event).await {
        Ok(outcome) => {
            tracing::info!(kind = %raw_kind, event_id = %event.id, ?outcome, "event processed");
            DispatchOutcome::Applied(outcome)
        }
        Err(BillingError::EntityNotFoundForUpdate { entity, reference }) => {
            tracing::warn!(
                kind = %raw_kind,
                entity,
                reference = %reference,
                "referenced entity missing, acknowledged — redelivery would not help"
            );
            DispatchOutcome::Absorbed
        }
        Err(e) => {
            tracing::error!(
                kind = %raw_kind,
                event_id = %event.id,
                error = %e,
                "handler failed, acknowledged — flagged for manual remediation"
            );
            DispatchOutcome::Absorbed
        }
    }
}

async fn route(
    pool: &PgPool,
    notifier: &Arc<dyn Notifier>,
    event: &WebhookEvent,
) -> Result<ReconcileOutcome, BillingError> {
    let event_id = EventId::new(event.id.clone())?;

    match event.kind {
        EventKind::PaymentSucceeded => {
            let pi = event.payment_intent()?;
            reconciler::payment_succeeded(pool, notifier, &event_id, event.created, &pi).await
        }
        EventKind::PaymentFailed => {
            let pi = event.payment_intent()?;
            reconciler::payment_failed(pool, &event_id, &pi).await
        }
        EventKind::InvoiceSucceeded => {
            let invoice = event.invoice()?;
            reconciler::invoice_succeeded(pool, &event_id, event.created, &invoice).await
        }
        EventKind::InvoiceFailed => {
            let invoice = event.invoice()?;
            reconciler::invoice_failed(pool, &event_id, &invoice).await
        }
        EventKind::SubscriptionCreated | EventKind::SubscriptionUpdated => {
            let subscription = event.subscription()?;
            reconciler::subscription_synced(pool, &event_id, &subscription).await
        }
        EventKind::SubscriptionDeleted => {
            let subscription = event.subscription()?;
            reconciler::subscription_deleted(pool, &event_id, &subscription).await
        }
        // Filtered out before routing.
        EventKind::Unhandled => Ok(ReconcileOutcome::NoOp),
    }
}
