//! The split calculator: a pure function from a payment and its rules to the
//! ordered list of amounts owed to each recipient.
//!
//! No I/O and no logging happen here. Configuration gaps and over-allocation
//! are reported in the returned [`SplitPlan`] so callers decide how to log.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::catalog::{RecipientId, TransferRule, TransferRuleId, TransferType};
use super::payment::Payment;

/// A rule together with the recipient data the calculator needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleAssignment {
    pub rule: TransferRule,
    pub recipient_name: String,
    pub payout_account_id: Option<String>,
}

/// A payment loaded with its product's rules, as the executor consumes it.
#[derive(Debug, Clone)]
pub struct PaymentWithRules {
    pub payment: Payment,
    pub rules: Vec<RuleAssignment>,
}

/// Amount owed to one recipient under one rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TransferCalculation {
    pub recipient_id: RecipientId,
    pub recipient_name: String,
    #[schema(value_type = String, example = "44.9985")]
    pub amount: Decimal,
    pub rule_type: TransferType,
    pub transfer_rule_id: TransferRuleId,
    pub payout_account_id: Option<String>,
}

/// Result of a split calculation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SplitPlan {
    /// Calculations in rule-priority order
    pub transfers: Vec<TransferCalculation>,
    /// Active rules with neither a usable amount nor a percentage
    pub skipped_rules: Vec<TransferRuleId>,
    #[schema(value_type = String, example = "269.997")]
    pub allocated: Decimal,
    /// `payment.amount - allocated`; implicitly retained by the platform
    #[schema(value_type = String, example = "29.993")]
    pub remainder: Decimal,
}

impl SplitPlan {
    /// True when the rules hand out more than the payment brought in.
    pub fn is_over_allocated(&self) -> bool {
        self.remainder < Decimal::ZERO
    }
}

/// Derives how much each recipient is owed for `payment`.
///
/// Only active rules are applied, in ascending priority (stable for ties).
/// For each rule:
/// - WHOLESALE with a fixed `amount`: that amount, independent of the payment
/// - otherwise, with a non-zero `percentage`: `payment.amount * percentage`
/// - neither: skipped and listed in [`SplitPlan::skipped_rules`]; a zero
///   percentage counts as unset
///
/// Amounts keep full decimal precision; rounding happens only when an amount
/// is converted to minor units for the processor.
pub fn calculate_transfers(payment: &Payment, rules: &[RuleAssignment]) -> SplitPlan {
    let mut ordered: Vec<&RuleAssignment> = rules.iter().filter(|a| a.rule.is_active).collect();
    ordered.sort_by_key(|a| a.rule.priority);

    let mut transfers = Vec::with_capacity(ordered.len());
    let mut skipped_rules = Vec::new();

    for assignment in ordered {
        let rule = &assignment.rule;
        let amount = match (rule.rule_type, rule.amount, rule.percentage) {
            (TransferType::Wholesale, Some(fixed), _) => fixed,
            (_, _, Some(pct)) if !pct.is_zero() => payment.amount * pct,
            _ => {
                skipped_rules.push(rule.id);
                continue;
            }
        };

        transfers.push(TransferCalculation {
            recipient_id: rule.recipient_id,
            recipient_name: assignment.recipient_name.clone(),
            amount,
            rule_type: rule.rule_type,
            transfer_rule_id: rule.id,
            payout_account_id: assignment.payout_account_id.clone(),
        });
    }

    let allocated: Decimal = transfers.iter().map(|t| t.amount).sum();

    SplitPlan {
        transfers,
        skipped_rules,
        allocated,
        remainder: payment.amount - allocated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Currency, ProductId};
    use rust_decimal_macros::dec;

    fn payment(amount: Decimal) -> Payment {
        Payment::new(ProductId::new(), "customer".into(), 1, amount, Currency::USD).unwrap()
    }

    fn assignment(
        product_id: ProductId,
        rule_type: TransferType,
        amount: Option<Decimal>,
        percentage: Option<Decimal>,
        priority: i32,
    ) -> RuleAssignment {
        let mut rule = TransferRule::new(
            product_id,
            RecipientId::new(),
            format!("{} rule", rule_type),
            None,
            rule_type,
            amount.or(Some(dec!(1))),
            percentage,
            priority,
        )
        .unwrap();
        // Rules loaded from storage are not re-validated; mirror that here.
        rule.amount = amount;
        RuleAssignment {
            rule,
            recipient_name: format!("recipient {}", priority),
            payout_account_id: Some(format!("acct_{}", priority)),
        }
    }

    fn scenario_a_rules(product_id: ProductId) -> Vec<RuleAssignment> {
        vec![
            assignment(
                product_id,
                TransferType::Wholesale,
                Some(dec!(180.00)),
                None,
                1,
            ),
            assignment(product_id, TransferType::Commission, None, Some(dec!(0.15)), 2),
            assignment(product_id, TransferType::Commission, None, Some(dec!(0.05)), 3),
            assignment(product_id, TransferType::Fee, None, Some(dec!(0.10)), 4),
        ]
    }

    #[test]
    fn test_marketplace_split() {
        let payment = payment(dec!(299.99));
        let plan = calculate_transfers(&payment, &scenario_a_rules(payment.product_id));

        let amounts: Vec<Decimal> = plan.transfers.iter().map(|t| t.amount).collect();
        assert_eq!(
            amounts,
            vec![dec!(180.00), dec!(44.9985), dec!(14.9995), dec!(29.999)]
        );
        assert_eq!(plan.allocated, dec!(269.997));
        assert_eq!(plan.remainder, dec!(29.993));
        assert!(!plan.is_over_allocated());
        assert!(plan.skipped_rules.is_empty());
    }

    #[test]
    fn test_wholesale_amount_ignores_payment_amount() {
        for total in [dec!(1.00), dec!(299.99), dec!(100000)] {
            let payment = payment(total);
            let rules = vec![assignment(
                payment.product_id,
                TransferType::Wholesale,
                Some(dec!(180.00)),
                Some(dec!(0.5)),
                1,
            )];
            let plan = calculate_transfers(&payment, &rules);
            assert_eq!(plan.transfers[0].amount, dec!(180.00));
        }
    }

    #[test]
    fn test_percentage_is_exact() {
        let payment = payment(dec!(123.45));
        let rules = vec![assignment(
            payment.product_id,
            TransferType::Referral,
            None,
            Some(dec!(0.0333)),
            1,
        )];
        let plan = calculate_transfers(&payment, &rules);
        assert_eq!(plan.transfers[0].amount, dec!(4.110885));
    }

    #[test]
    fn test_fixed_amount_on_non_wholesale_rule_is_a_gap() {
        let payment = payment(dec!(50));
        let rules = vec![
            assignment(payment.product_id, TransferType::Bonus, Some(dec!(5)), None, 1),
            assignment(payment.product_id, TransferType::Fee, None, Some(dec!(0.1)), 2),
        ];
        let plan = calculate_transfers(&payment, &rules);

        assert_eq!(plan.transfers.len(), 1);
        assert_eq!(plan.transfers[0].rule_type, TransferType::Fee);
        assert_eq!(plan.skipped_rules, vec![rules[0].rule.id]);
    }

    #[test]
    fn test_rule_without_amount_or_percentage_is_skipped() {
        let payment = payment(dec!(50));
        let rules = vec![assignment(
            payment.product_id,
            TransferType::Custom,
            None,
            None,
            1,
        )];
        let plan = calculate_transfers(&payment, &rules);

        assert!(plan.transfers.is_empty());
        assert_eq!(plan.skipped_rules.len(), 1);
        assert_eq!(plan.remainder, dec!(50));
    }

    #[test]
    fn test_zero_percentage_is_a_gap() {
        let payment = payment(dec!(299.99));
        let rules = vec![
            assignment(payment.product_id, TransferType::Referral, None, Some(dec!(0)), 1),
            assignment(payment.product_id, TransferType::Fee, None, Some(dec!(0.10)), 2),
        ];
        let plan = calculate_transfers(&payment, &rules);

        assert_eq!(plan.transfers.len(), 1);
        assert_eq!(plan.transfers[0].rule_type, TransferType::Fee);
        assert_eq!(plan.skipped_rules, vec![rules[0].rule.id]);
        assert_eq!(plan.allocated, dec!(29.999));
    }

    #[test]
    fn test_inactive_rules_are_ignored_and_order_follows_priority() {
        let payment = payment(dec!(100));
        let mut rules = vec![
            assignment(payment.product_id, TransferType::Fee, None, Some(dec!(0.1)), 5),
            assignment(payment.product_id, TransferType::Commission, None, Some(dec!(0.2)), 1),
            assignment(payment.product_id, TransferType::Bonus, None, Some(dec!(0.3)), 3),
        ];
        rules[2].rule.is_active = false;

        let plan = calculate_transfers(&payment, &rules);
        let types: Vec<TransferType> = plan.transfers.iter().map(|t| t.rule_type).collect();
        assert_eq!(types, vec![TransferType::Commission, TransferType::Fee]);
    }

    #[test]
    fn test_over_allocation_is_reported_not_rejected() {
        let payment = payment(dec!(100));
        let rules = vec![
            assignment(
                payment.product_id,
                TransferType::Wholesale,
                Some(dec!(90)),
                None,
                1,
            ),
            assignment(payment.product_id, TransferType::Fee, None, Some(dec!(0.2)), 2),
        ];
        let plan = calculate_transfers(&payment, &rules);

        assert_eq!(plan.transfers.len(), 2);
        assert_eq!(plan.remainder, dec!(-10));
        assert!(plan.is_over_allocated());
    }

    #[test]
    fn test_calculation_is_pure() {
        let payment = payment(dec!(299.99));
        let rules = scenario_a_rules(payment.product_id);

        let first = calculate_transfers(&payment, &rules);
        let second = calculate_transfers(&payment, &rules);
        assert_eq!(first, second);
    }
}
