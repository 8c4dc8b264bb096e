//! Transfer Executor: turns a completed payment's split into Transfer rows
//! and external money movements.
//!
//! The first pass calculates the split once and records every leg PENDING in
//! a single write. From then on the Transfer rows are the plan: a resumed pass
//! works through the recorded rows and never consults the rules again, so
//! rule changes after the first pass do not alter what a payment owes.
//!
//! The `transfers_completed` flag on the payment is the single guard against
//! duplicate passes. It is checked before a pass starts and latched only after
//! every recorded leg has been attempted, so a crash mid-pass leaves it false
//! and the next pass resumes instead of starting over.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;

use splits_types::{
    AppError, DomainError, Payment, PaymentId, PaymentProcessor, PaymentStatus, PaymentWithRules,
    PayoutRequest, RecipientId, RepoError, RuleAssignment, SplitRepository, Transfer,
    TransferRuleId, TransferSummary, calculate_transfers, to_minor_units,
};

use crate::SplitService;

const NO_PAYOUT_ACCOUNT_NOTE: &str =
    "No payout account; amount attributed without external transfer";

impl<R: SplitRepository, P: PaymentProcessor> SplitService<R, P> {
    /// Runs (or resumes) the transfer pass for a payment.
    ///
    /// - No-op when `transfers_completed` is already set.
    /// - Without recorded transfers, the split is calculated and all legs are
    ///   recorded PENDING before any money moves.
    /// - Legs run in rule-priority order; a failing leg is recorded FAILED and
    ///   the pass moves on.
    /// - Legs that already reached a terminal status are skipped, and a leg
    ///   left PENDING by an interrupted pass is retried under its original id,
    ///   which is also the processor idempotency key.
    ///
    /// Errors only for an unknown payment or a data store failure; those abort
    /// the pass with the flag still unset.
    #[tracing::instrument(skip(self), fields(payment_id = %payment_id))]
    pub async fn execute_transfers(
        &self,
        payment_id: PaymentId,
    ) -> Result<TransferSummary, AppError> {
        let PaymentWithRules { payment, rules } = self
            .repo
            .get_payment_with_rules(payment_id)
            .await?
            .ok_or(DomainError::PaymentNotFound(payment_id))?;

        if payment.transfers_completed {
            tracing::info!("transfer pass already completed, nothing to do");
            return self.get_transfer_summary(payment_id).await;
        }

        let mut transfers = self.repo.list_transfers_for_payment(payment_id).await?;
        if transfers.is_empty() {
            transfers = self.record_split(&payment, &rules).await?;
        } else {
            tracing::info!(recorded = transfers.len(), "resuming transfer pass");
        }

        // Rules are never deleted, so inactive ones still give the order and
        // the destination of legs recorded before they were switched off.
        let priority: HashMap<TransferRuleId, i32> = rules
            .iter()
            .map(|a| (a.rule.id, a.rule.priority))
            .collect();
        let accounts: HashMap<RecipientId, Option<String>> = rules
            .iter()
            .map(|a| (a.rule.recipient_id, a.payout_account_id.clone()))
            .collect();
        transfers.sort_by_key(|t| priority.get(&t.transfer_rule_id).copied().unwrap_or(i32::MAX));

        for transfer in transfers {
            if transfer.status.is_terminal() {
                tracing::debug!(transfer_id = %transfer.id, status = %transfer.status, "leg already settled");
                continue;
            }
            let destination = match accounts.get(&transfer.recipient_id) {
                Some(account) => account.clone(),
                None => self
                    .repo
                    .get_recipient(transfer.recipient_id)
                    .await?
                    .and_then(|r| r.payout_account_id),
            };
            self.execute_leg(&payment, transfer, destination.as_deref())
                .await?;
        }

        self.repo.mark_transfers_completed(payment_id).await?;

        let summary = self.get_transfer_summary(payment_id).await?;
        tracing::info!(
            completed = summary.completed,
            failed = summary.failed,
            pending = summary.pending,
            total = %summary.total,
            "transfer pass finished"
        );
        Ok(summary)
    }

    /// Calculates the split and records every leg PENDING in one write.
    ///
    /// A concurrent pass that recorded first wins; its rows are returned.
    async fn record_split(
        &self,
        payment: &Payment,
        rules: &[RuleAssignment],
    ) -> Result<Vec<Transfer>, AppError> {
        let plan = calculate_transfers(payment, rules);
        for rule_id in &plan.skipped_rules {
            tracing::warn!(rule_id = %rule_id, "transfer rule has neither amount nor percentage; skipped");
        }
        if plan.is_over_allocated() {
            tracing::warn!(
                amount = %payment.amount,
                allocated = %plan.allocated,
                remainder = %plan.remainder,
                "transfer rules allocate more than the payment amount"
            );
        }

        let transfers: Vec<Transfer> = plan
            .transfers
            .iter()
            .map(|calc| Transfer::pending(payment.id, payment.currency, calc))
            .collect();

        match self.repo.create_transfers(&transfers).await {
            Ok(()) => {
                tracing::info!(legs = transfers.len(), "split recorded");
                Ok(transfers)
            }
            Err(RepoError::Conflict(_)) => {
                tracing::warn!("split recorded by a concurrent pass");
                Ok(self.repo.list_transfers_for_payment(payment.id).await?)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Attempts one leg and persists its terminal outcome.
    #[tracing::instrument(skip_all, fields(transfer_id = %transfer.id, rule_type = %transfer.rule_type))]
    async fn execute_leg(
        &self,
        payment: &Payment,
        mut transfer: Transfer,
        destination: Option<&str>,
    ) -> Result<(), AppError> {
        match destination {
            None => transfer.complete_without_movement(NO_PAYOUT_ACCOUNT_NOTE),
            Some(destination) => match self.payout_amount(transfer.amount) {
                Err(reason) => {
                    tracing::warn!(amount = %transfer.amount, %reason, "transfer outside limits");
                    transfer.fail(reason);
                }
                Ok(amount_minor) => {
                    let request = PayoutRequest {
                        amount_minor,
                        currency: payment.currency,
                        destination: destination.to_string(),
                        idempotency_key: transfer.id.to_string(),
                        metadata: BTreeMap::from([
                            ("transfer_id".to_string(), transfer.id.to_string()),
                            ("payment_id".to_string(), payment.id.to_string()),
                            ("type".to_string(), transfer.rule_type.to_string()),
                            ("recipient_id".to_string(), transfer.recipient_id.to_string()),
                        ]),
                    };

                    match self.processor.create_transfer(request).await {
                        Ok(external_id) => {
                            tracing::info!(external_id = %external_id, amount_minor, "transfer completed");
                            transfer.complete(external_id);
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "transfer failed");
                            transfer.fail(e.to_string());
                        }
                    }
                }
            },
        }

        match self.repo.update_transfer(&transfer).await {
            Ok(()) => Ok(()),
            Err(RepoError::Conflict(_)) => {
                tracing::warn!("leg settled by a concurrent pass");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Minor-unit amount for an external leg, or why it may not be sent.
    fn payout_amount(&self, amount: Decimal) -> Result<i64, String> {
        let limits = &self.config.limits;
        if amount < limits.min_amount {
            return Err(format!(
                "Transfer amount {} is below the minimum of {}",
                amount, limits.min_amount
            ));
        }
        if amount > limits.max_amount {
            return Err(format!(
                "Transfer amount {} exceeds the maximum of {}",
                amount, limits.max_amount
            ));
        }
        to_minor_units(amount).map_err(|e| e.to_string())
    }

    /// Operator trigger: resumes the pass of a COMPLETED payment.
    pub async fn run_transfer_pass(
        &self,
        payment_id: PaymentId,
    ) -> Result<TransferSummary, AppError> {
        let payment = self.get_payment(payment_id).await?;
        if payment.status != PaymentStatus::Completed {
            return Err(AppError::Conflict(format!(
                "Payment {} is {}; transfers run only for COMPLETED payments",
                payment.id, payment.status
            )));
        }
        self.execute_transfers(payment.id).await
    }
}
