//! Payment State Machine.
//!
//! ```text
//! PENDING ──checkout completed──▶ PROCESSING ──payment confirmed──▶ COMPLETED
//!    │                               │                                 │
//!    └───────────payment failed──────┴──────▶ FAILED ◀──aborted pass───┘
//! ```
//!
//! Every transition is a compare-and-set on the stored status, so duplicate
//! or concurrent deliveries of one event apply it at most once. Entering
//! COMPLETED runs the transfer pass as a side effect.

use splits_types::{
    AppError, DomainError, Payment, PaymentId, PaymentProcessor, PaymentStatus, SplitRepository,
};

use crate::SplitService;

/// What a state-machine call did to the payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The payment moved to this status.
    Applied(PaymentStatus),
    /// Nothing changed (duplicate, stale or out-of-order event).
    Unchanged(PaymentStatus),
}

impl<R: SplitRepository, P: PaymentProcessor> SplitService<R, P> {
    async fn load_payment(&self, payment_id: PaymentId) -> Result<Payment, AppError> {
        self.repo
            .get_payment(payment_id)
            .await?
            .ok_or_else(|| DomainError::PaymentNotFound(payment_id).into())
    }

    /// Persists `payment` if the stored status still equals `expected`.
    async fn commit_transition(
        &self,
        payment: &Payment,
        expected: PaymentStatus,
    ) -> Result<bool, AppError> {
        let won = self.repo.transition_payment(payment, expected).await?;
        if won {
            tracing::info!(from = %expected, to = %payment.status, "payment transitioned");
        } else {
            tracing::info!(expected = %expected, "payment changed concurrently; transition skipped");
        }
        Ok(won)
    }

    /// PENDING → PROCESSING on "checkout session completed".
    #[tracing::instrument(skip(self), fields(payment_id = %payment_id))]
    pub async fn mark_processing(
        &self,
        payment_id: PaymentId,
        session_id: String,
    ) -> Result<TransitionOutcome, AppError> {
        let mut payment = self.load_payment(payment_id).await?;
        if payment.status != PaymentStatus::Pending {
            tracing::info!(status = %payment.status, "checkout completion ignored");
            return Ok(TransitionOutcome::Unchanged(payment.status));
        }

        payment.begin_processing(Some(session_id))?;
        if self
            .commit_transition(&payment, PaymentStatus::Pending)
            .await?
        {
            Ok(TransitionOutcome::Applied(PaymentStatus::Processing))
        } else {
            let current = self.load_payment(payment_id).await?;
            Ok(TransitionOutcome::Unchanged(current.status))
        }
    }

    /// PROCESSING → COMPLETED on "payment confirmed", then the transfer pass.
    ///
    /// - A PENDING payment (events delivered out of order) passes through
    ///   PROCESSING first.
    /// - A redelivery for a COMPLETED payment re-enters the executor, whose
    ///   guard makes it a no-op or resumes an interrupted pass.
    /// - If the pass fails, the payment is forced to FAILED and the outcome
    ///   reports it; the error is not propagated.
    #[tracing::instrument(skip(self), fields(payment_id = %payment_id))]
    pub async fn complete_payment(
        &self,
        payment_id: PaymentId,
        payment_intent_id: String,
    ) -> Result<TransitionOutcome, AppError> {
        let mut payment = self.load_payment(payment_id).await?;

        if payment.status == PaymentStatus::Pending {
            tracing::warn!("payment confirmed before checkout completion; advancing through PROCESSING");
            payment.begin_processing(None)?;
            if !self
                .commit_transition(&payment, PaymentStatus::Pending)
                .await?
            {
                payment = self.load_payment(payment_id).await?;
            }
        }

        let applied = match payment.status {
            PaymentStatus::Processing => {
                payment.complete(payment_intent_id)?;
                if self
                    .commit_transition(&payment, PaymentStatus::Processing)
                    .await?
                {
                    true
                } else {
                    payment = self.load_payment(payment_id).await?;
                    false
                }
            }
            _ => false,
        };

        match payment.status {
            PaymentStatus::Completed => {}
            status => {
                tracing::info!(status = %status, "payment confirmation ignored");
                return Ok(TransitionOutcome::Unchanged(status));
            }
        }
        if !applied {
            tracing::info!("payment already completed; re-checking transfer pass");
        }

        if let Err(e) = self.execute_transfers(payment_id).await {
            tracing::error!(error = %e, "transfer pass aborted; failing payment");
            self.force_fail(payment_id, &e.to_string()).await?;
            return Ok(TransitionOutcome::Applied(PaymentStatus::Failed));
        }

        Ok(if applied {
            TransitionOutcome::Applied(PaymentStatus::Completed)
        } else {
            TransitionOutcome::Unchanged(PaymentStatus::Completed)
        })
    }

    /// PENDING/PROCESSING → FAILED on "payment failed".
    ///
    /// A COMPLETED payment already moved money and is left alone; FAILED is
    /// sticky.
    #[tracing::instrument(skip(self), fields(payment_id = %payment_id))]
    pub async fn fail_payment(
        &self,
        payment_id: PaymentId,
        reason: &str,
    ) -> Result<TransitionOutcome, AppError> {
        let payment = self.load_payment(payment_id).await?;
        match payment.status {
            PaymentStatus::Pending | PaymentStatus::Processing => {
                self.force_fail(payment_id, reason).await
            }
            status => {
                tracing::info!(status = %status, "payment failure ignored");
                Ok(TransitionOutcome::Unchanged(status))
            }
        }
    }

    /// Moves a payment from whatever non-failed status it has to FAILED.
    pub(crate) async fn force_fail(
        &self,
        payment_id: PaymentId,
        reason: &str,
    ) -> Result<TransitionOutcome, AppError> {
        loop {
            let mut payment = self.load_payment(payment_id).await?;
            if payment.is_terminal() {
                return Ok(TransitionOutcome::Unchanged(payment.status));
            }

            let expected = payment.status;
            payment.fail()?;
            if self.commit_transition(&payment, expected).await? {
                tracing::warn!(%reason, "payment failed");
                return Ok(TransitionOutcome::Applied(PaymentStatus::Failed));
            }
        }
    }
}
