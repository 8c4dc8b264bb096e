//! SQLite repository integration tests.

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use splits_types::{
        Currency, EventEnvelope, EventRecord, EventStatus, Payment, PaymentId, PaymentStatus,
        Product, ReceivedEvent, Recipient, RecipientRole, RepoError, SplitRepository, Transfer,
        TransferCalculation, TransferRule, TransferRuleId, TransferStatus, TransferType,
    };

    use crate::rate_limit::window_bounds;
    use crate::{Repo, SqliteRepo};

    const MAX_ACTIVE: i64 = 10;

    async fn setup_repo() -> SqliteRepo {
        SqliteRepo::new("sqlite::memory:").await.unwrap()
    }

    async fn recipient(repo: &SqliteRepo, email: &str, account: Option<&str>) -> Recipient {
        repo.create_recipient(
            Recipient::new(
                email.split('@').next().unwrap().to_string(),
                email.to_string(),
                RecipientRole::BrandPartner,
                account.map(str::to_string),
            )
            .unwrap(),
        )
        .await
        .unwrap()
    }

    async fn product(repo: &SqliteRepo) -> Product {
        let creator = recipient(repo, "company@example.com", None).await;
        repo.create_product(
            Product::new(
                "Wellness Kit".into(),
                "Sample".into(),
                dec!(299.99),
                creator.id,
            )
            .unwrap(),
        )
        .await
        .unwrap()
    }

    async fn pending_payment(repo: &SqliteRepo, product: &Product) -> Payment {
        repo.create_payment(
            Payment::new(
                product.id,
                "customer-1".into(),
                1,
                product.retail_price,
                Currency::USD,
            )
            .unwrap(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_recipient_roundtrip() {
        let repo = setup_repo().await;
        let created = recipient(&repo, "brand@example.com", Some("acct_brand")).await;

        let fetched = repo.get_recipient(created.id).await.unwrap().unwrap();

        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.role, RecipientRole::BrandPartner);
        assert_eq!(fetched.payout_account_id.as_deref(), Some("acct_brand"));
    }

    #[tokio::test]
    async fn test_duplicate_recipient_email_conflicts() {
        let repo = setup_repo().await;
        recipient(&repo, "dup@example.com", None).await;

        let again = Recipient::new(
            "Dup".into(),
            "dup@example.com".into(),
            RecipientRole::Affiliate,
            None,
        )
        .unwrap();

        let result = repo.create_recipient(again).await;
        assert!(matches!(result, Err(RepoError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_product_keeps_decimal_price() {
        let repo = setup_repo().await;
        let created = product(&repo).await;

        let fetched = repo.get_product(created.id).await.unwrap().unwrap();

        assert_eq!(fetched.retail_price, dec!(299.99));
        assert!(fetched.is_active);
        assert_eq!(repo.list_products().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rules_listed_by_priority_with_recipient() {
        let repo = setup_repo().await;
        let product = product(&repo).await;
        let brand = recipient(&repo, "brand@example.com", Some("acct_brand")).await;

        for (name, priority) in [("fee", 4), ("wholesale", 1), ("commission", 2)] {
            let rule = TransferRule::new(
                product.id,
                brand.id,
                name.into(),
                None,
                TransferType::Commission,
                None,
                Some(dec!(0.05)),
                priority,
            )
            .unwrap();
            repo.create_rule(rule, MAX_ACTIVE).await.unwrap();
        }

        let rules = repo.list_rules_for_product(product.id).await.unwrap();
        let names: Vec<_> = rules.iter().map(|a| a.rule.name.as_str()).collect();

        assert_eq!(names, ["wholesale", "commission", "fee"]);
        assert_eq!(rules[0].recipient_name, "brand");
        assert_eq!(rules[0].payout_account_id.as_deref(), Some("acct_brand"));
        assert_eq!(rules[0].rule.percentage, Some(dec!(0.05)));
        assert!(rules.iter().all(|a| a.rule.is_active));
    }

    #[tokio::test]
    async fn test_deactivating_rule_only_flips_flag() {
        let repo = setup_repo().await;
        let product = product(&repo).await;
        let brand = recipient(&repo, "brand@example.com", None).await;
        let rule = TransferRule::new(
            product.id,
            brand.id,
            "Wholesale".into(),
            None,
            TransferType::Wholesale,
            Some(dec!(180)),
            None,
            1,
        )
        .unwrap();
        let rule = repo.create_rule(rule, MAX_ACTIVE).await.unwrap();

        let updated = repo
            .set_rule_active(rule.id, false, MAX_ACTIVE)
            .await
            .unwrap()
            .unwrap();

        assert!(!updated.is_active);
        assert_eq!(updated.amount, Some(dec!(180)));
        let rules = repo.list_rules_for_product(product.id).await.unwrap();
        assert_eq!(rules.len(), 1);
        assert!(!rules[0].rule.is_active);
    }

    #[tokio::test]
    async fn test_active_rule_cap_is_enforced_by_the_write() {
        let repo = setup_repo().await;
        let product = product(&repo).await;
        let brand = recipient(&repo, "brand@example.com", None).await;
        let commission = |priority| {
            TransferRule::new(
                product.id,
                brand.id,
                format!("commission {}", priority),
                None,
                TransferType::Commission,
                None,
                Some(dec!(0.01)),
                priority,
            )
            .unwrap()
        };

        let first = repo.create_rule(commission(1), 2).await.unwrap();
        repo.create_rule(commission(2), 2).await.unwrap();
        assert!(matches!(
            repo.create_rule(commission(3), 2).await,
            Err(RepoError::LimitReached(_))
        ));

        // Deactivation is never capped; reactivation is once the slot is gone
        repo.set_rule_active(first.id, false, 2).await.unwrap().unwrap();
        repo.create_rule(commission(3), 2).await.unwrap();
        assert!(matches!(
            repo.set_rule_active(first.id, true, 2).await,
            Err(RepoError::LimitReached(_))
        ));

        let active = repo
            .list_rules_for_product(product.id)
            .await
            .unwrap()
            .iter()
            .filter(|a| a.rule.is_active)
            .count();
        assert_eq!(active, 2);
        assert!(
            repo.set_rule_active(TransferRuleId::new(), true, 2)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_transition_is_compare_and_set() {
        let repo = setup_repo().await;
        let product = product(&repo).await;
        let payment = pending_payment(&repo, &product).await;

        let mut processing = payment.clone();
        processing.begin_processing(Some("cs_1".into())).unwrap();

        assert!(
            repo.transition_payment(&processing, PaymentStatus::Pending)
                .await
                .unwrap()
        );
        // A second writer still expecting PENDING loses.
        assert!(
            !repo
                .transition_payment(&processing, PaymentStatus::Pending)
                .await
                .unwrap()
        );

        let stored = repo.get_payment(payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Processing);
        assert_eq!(stored.checkout_session_id.as_deref(), Some("cs_1"));
        assert_eq!(stored.amount, dec!(299.99));
    }

    #[tokio::test]
    async fn test_payment_with_rules_and_flag() {
        let repo = setup_repo().await;
        let product = product(&repo).await;
        let brand = recipient(&repo, "brand@example.com", Some("acct_brand")).await;
        repo.create_rule(
            TransferRule::new(
                product.id,
                brand.id,
                "Wholesale".into(),
                None,
                TransferType::Wholesale,
                Some(dec!(180)),
                None,
                1,
            )
            .unwrap(),
            MAX_ACTIVE,
        )
        .await
        .unwrap();
        let payment = pending_payment(&repo, &product).await;

        let loaded = repo.get_payment_with_rules(payment.id).await.unwrap().unwrap();
        assert_eq!(loaded.rules.len(), 1);
        assert!(!loaded.payment.transfers_completed);

        repo.mark_transfers_completed(payment.id).await.unwrap();
        let stored = repo.get_payment(payment.id).await.unwrap().unwrap();
        assert!(stored.transfers_completed);

        assert!(
            repo.get_payment_with_rules(PaymentId::new())
                .await
                .unwrap()
                .is_none()
        );
        assert!(matches!(
            repo.mark_transfers_completed(PaymentId::new()).await,
            Err(RepoError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_transfer_lifecycle_and_single_leg_per_rule() {
        let repo = setup_repo().await;
        let product = product(&repo).await;
        let brand = recipient(&repo, "brand@example.com", Some("acct_brand")).await;
        let rule = repo
            .create_rule(
                TransferRule::new(
                    product.id,
                    brand.id,
                    "Commission".into(),
                    None,
                    TransferType::Commission,
                    None,
                    Some(dec!(0.15)),
                    2,
                )
                .unwrap(),
                MAX_ACTIVE,
            )
            .await
            .unwrap();
        let payment = pending_payment(&repo, &product).await;

        let calc = TransferCalculation {
            recipient_id: brand.id,
            recipient_name: brand.name.clone(),
            amount: dec!(44.9985),
            rule_type: TransferType::Commission,
            transfer_rule_id: rule.id,
            payout_account_id: brand.payout_account_id.clone(),
        };
        let mut transfer = Transfer::pending(payment.id, Currency::USD, &calc);
        repo.create_transfers(std::slice::from_ref(&transfer))
            .await
            .unwrap();

        // A second leg for the same rule is refused.
        let duplicate = Transfer::pending(payment.id, Currency::USD, &calc);
        assert!(matches!(
            repo.create_transfers(&[duplicate]).await,
            Err(RepoError::Conflict(_))
        ));

        // A batch with one conflicting row writes nothing.
        let other = pending_payment(&repo, &product).await;
        let batch = [
            Transfer::pending(other.id, Currency::USD, &calc),
            Transfer::pending(other.id, Currency::USD, &calc),
        ];
        assert!(matches!(
            repo.create_transfers(&batch).await,
            Err(RepoError::Conflict(_))
        ));
        assert!(
            repo.list_transfers_for_payment(other.id)
                .await
                .unwrap()
                .is_empty()
        );

        transfer.complete("tr_1".into());
        repo.update_transfer(&transfer).await.unwrap();

        // Terminal rows are immutable.
        transfer.fail("late failure");
        assert!(matches!(
            repo.update_transfer(&transfer).await,
            Err(RepoError::Conflict(_))
        ));

        let stored = repo.list_transfers_for_payment(payment.id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, TransferStatus::Completed);
        assert_eq!(stored[0].amount, dec!(44.9985));
        assert_eq!(stored[0].external_transfer_id.as_deref(), Some("tr_1"));
        assert!(stored[0].error_message.is_none());
    }

    #[tokio::test]
    async fn test_event_log_deduplicates_by_event_id() {
        let repo = setup_repo().await;
        let payload = serde_json::json!({
            "id": "evt_1",
            "type": "payment_intent.succeeded",
            "created": 1,
            "data": { "object": { "id": "pi_1" } }
        });
        let envelope: EventEnvelope = serde_json::from_value(payload.clone()).unwrap();
        let event = ReceivedEvent::new(&envelope, payload);

        assert_eq!(repo.record_event(&event).await.unwrap(), EventRecord::Inserted);

        repo.update_event_status("evt_1", EventStatus::Processing, None)
            .await
            .unwrap();
        repo.update_event_status("evt_1", EventStatus::Completed, None)
            .await
            .unwrap();

        assert_eq!(
            repo.record_event(&event).await.unwrap(),
            EventRecord::Duplicate(EventStatus::Completed)
        );
    }

    #[tokio::test]
    async fn test_shared_rate_limit_counts_per_window() {
        let repo = setup_repo().await;
        let (window, _) = window_bounds(1_000, 900);

        assert_eq!(repo.hit_rate_limit("1.2.3.4:/api", window).await.unwrap(), 1);
        assert_eq!(repo.hit_rate_limit("1.2.3.4:/api", window).await.unwrap(), 2);
        assert_eq!(repo.hit_rate_limit("5.6.7.8:/api", window).await.unwrap(), 1);
        // A new window resets the counter.
        assert_eq!(
            repo.hit_rate_limit("1.2.3.4:/api", window + 900)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_repo_wrapper_builds_from_url() {
        let repo = Repo::new("sqlite::memory:").await.unwrap();
        repo.ping().await.unwrap();
        assert!(repo.list_recipients().await.unwrap().is_empty());
    }
}
