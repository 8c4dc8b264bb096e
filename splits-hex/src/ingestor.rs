//! Event Ingestor: authenticates processor events and dispatches them to the
//! payment state machine.
//!
//! Once an event is authentic the processor always gets an acknowledgement.
//! Unknown types are ignored. Failures while handling a known type are
//! recorded (payment forced to FAILED, event log entry FAILED) and not
//! reported back to the processor.

use splits_types::{
    AppError, EventEnvelope, EventRecord, EventStatus, PaymentProcessor, ProcessorEvent,
    ReceivedEvent, SplitRepository,
};

use crate::SplitService;
use crate::state_machine::TransitionOutcome;

/// How an authentic event was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Dispatched to the state machine.
    Dispatched(TransitionOutcome),
    /// Unrecognized type, acknowledged without action.
    Ignored,
    /// Already processed under the same event id.
    Duplicate,
    /// Handling failed; recorded internally.
    Failed(String),
}

impl<R: SplitRepository, P: PaymentProcessor> SplitService<R, P> {
    /// Verifies, logs and dispatches one raw event.
    ///
    /// Errors (→ 4xx/5xx) only when the event is not authentic, is not JSON,
    /// or cannot be logged. Everything after that is acknowledged.
    #[tracing::instrument(skip_all, fields(event_id = tracing::field::Empty))]
    pub async fn ingest_event(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<IngestOutcome, AppError> {
        let signature = signature
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::BadRequest("Missing processor signature".into()))?;
        if !self.verifier.verify(payload, signature) {
            tracing::warn!("processor event rejected: invalid signature");
            return Err(AppError::BadRequest("Invalid processor signature".into()));
        }

        let raw: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|e| AppError::BadRequest(format!("Malformed event body: {}", e)))?;
        let envelope: EventEnvelope = serde_json::from_value(raw.clone())
            .map_err(|e| AppError::BadRequest(format!("Malformed event envelope: {}", e)))?;

        tracing::Span::current().record("event_id", envelope.id.as_str());
        tracing::info!(event_type = %envelope.event_type, "processor event received");

        let received = ReceivedEvent::new(&envelope, raw);
        if let EventRecord::Duplicate(status) = self.repo.record_event(&received).await? {
            if status == EventStatus::Completed {
                tracing::info!(event_id = %envelope.id, "duplicate event acknowledged");
                return Ok(IngestOutcome::Duplicate);
            }
            tracing::info!(event_id = %envelope.id, previous = %status, "redelivered event reprocessed");
        }

        self.repo
            .update_event_status(&envelope.id, EventStatus::Processing, None)
            .await?;

        let outcome = self.dispatch(&envelope).await;

        let (status, last_error) = match &outcome {
            IngestOutcome::Failed(message) => (EventStatus::Failed, Some(message.clone())),
            _ => (EventStatus::Completed, None),
        };
        if let Err(e) = self
            .repo
            .update_event_status(&envelope.id, status, last_error)
            .await
        {
            tracing::error!(event_id = %envelope.id, error = %e, "failed to record event outcome");
        }

        Ok(outcome)
    }

    /// Closed match over the recognized event types.
    async fn dispatch(&self, envelope: &EventEnvelope) -> IngestOutcome {
        let event = match ProcessorEvent::from_envelope(envelope) {
            Ok(event) => event,
            Err(e) => {
                tracing::error!(event_id = %envelope.id, error = %e, "processor event cannot be routed");
                return IngestOutcome::Failed(e.to_string());
            }
        };

        let result = match &event {
            ProcessorEvent::CheckoutSessionCompleted {
                session_id,
                payment_id,
            } => self.mark_processing(*payment_id, session_id.clone()).await,
            ProcessorEvent::PaymentSucceeded {
                payment_intent_id,
                payment_id,
            } => {
                self.complete_payment(*payment_id, payment_intent_id.clone())
                    .await
            }
            ProcessorEvent::PaymentFailed {
                payment_intent_id,
                payment_id,
            } => {
                self.fail_payment(
                    *payment_id,
                    &format!("processor reported payment {} failed", payment_intent_id),
                )
                .await
            }
            ProcessorEvent::Unrecognized { event_type } => {
                tracing::info!(event_type = %event_type, "unhandled processor event type acknowledged");
                return IngestOutcome::Ignored;
            }
        };

        match result {
            Ok(transition) => IngestOutcome::Dispatched(transition),
            Err(e) => {
                tracing::error!(event_id = %envelope.id, error = %e, "processor event dispatch failed");
                if let Some(payment_id) = event.payment_id()
                    && !matches!(e, AppError::NotFound(_))
                    && let Err(fail_err) = self.force_fail(payment_id, &e.to_string()).await
                {
                    tracing::error!(payment_id = %payment_id, error = %fail_err, "could not mark payment failed");
                }
                IngestOutcome::Failed(e.to_string())
            }
        }
    }
}
