//! PostgreSQL repository adapter.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Uuid;
use sqlx::{PgPool, Postgres, Transaction};

use splits_types::{
    EventRecord, EventStatus, Payment, PaymentId, PaymentStatus, PaymentWithRules, Product,
    ProductId, ReceivedEvent, Recipient, RecipientId, RepoError, RuleAssignment, SplitRepository,
    Transfer, TransferRule, TransferRuleId, TransferStatus,
};

use crate::{db_err, rule_limit_reached};
use crate::types::{DbPayment, DbProduct, DbRecipient, DbRuleAssignment, DbTransfer, DbTransferRule};

const RECIPIENT_COLUMNS: &str = "id, name, email, role, payout_account_id, created_at";
const PRODUCT_COLUMNS: &str =
    "id, name, description, retail_price, creator_id, is_active, created_at";
const RULE_COLUMNS: &str = "id, product_id, recipient_id, name, description, rule_type, amount, \
     percentage, priority, is_active, created_at";
const PAYMENT_COLUMNS: &str = "id, product_id, customer_id, quantity, amount, currency, status, \
     transfers_completed, checkout_session_id, payment_intent_id, created_at, updated_at, completed_at";
const TRANSFER_COLUMNS: &str = "id, payment_id, transfer_rule_id, recipient_id, rule_type, amount, \
     currency, status, external_transfer_id, error_message, note, calculated_at, completed_at, failed_at";

const RULE_ASSIGNMENTS_QUERY: &str = r#"
    SELECT r.id, r.product_id, r.recipient_id, r.name, r.description, r.rule_type,
           r.amount, r.percentage, r.priority, r.is_active, r.created_at,
           rc.name AS recipient_name, rc.payout_account_id
    FROM transfer_rules r
    JOIN recipients rc ON rc.id = r.recipient_id
    WHERE r.product_id = $1
    ORDER BY r.priority ASC, r.created_at ASC"#;

/// Locks the product row, then refuses if the product already has
/// `max_active` active rules. Concurrent rule writers for one product queue
/// on the lock and each sees the others' committed rules.
async fn ensure_rule_capacity(
    tx: &mut Transaction<'_, Postgres>,
    product_id: ProductId,
    max_active: i64,
) -> Result<(), RepoError> {
    sqlx::query("SELECT id FROM products WHERE id = $1 FOR UPDATE")
        .bind(product_id.into_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_err)?;

    let active: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM transfer_rules WHERE product_id = $1 AND is_active",
    )
    .bind(product_id.into_uuid())
    .fetch_one(&mut **tx)
    .await
    .map_err(db_err)?;

    if active >= max_active {
        return Err(rule_limit_reached(product_id, max_active));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// PostgreSQL Repository
// ─────────────────────────────────────────────────────────────────────────────

/// PostgreSQL repository implementation.
#[derive(Clone)]
pub struct PostgresRepo {
    pool: PgPool,
}

/// Executes SQL statements from a migration file, splitting by semicolons.
async fn execute_migration(pool: &PgPool, sql: &str, name: &str) -> Result<(), anyhow::Error> {
    for statement in sql.split(';') {
        let stmt = statement.trim();
        if !stmt.is_empty() {
            sqlx::query(stmt)
                .execute(pool)
                .await
                .map_err(|e| anyhow::anyhow!("Migration {} failed: {}", name, e))?;
        }
    }
    Ok(())
}

/// Runs all database migrations.
async fn run_migrations(pool: &PgPool) -> Result<(), anyhow::Error> {
    execute_migration(
        pool,
        include_str!("../migrations/0001_create_catalog_pg.sql"),
        "0001",
    )
    .await?;

    execute_migration(
        pool,
        include_str!("../migrations/0002_create_payments_pg.sql"),
        "0002",
    )
    .await?;

    execute_migration(
        pool,
        include_str!("../migrations/0003_create_processor_events_pg.sql"),
        "0003",
    )
    .await?;

    Ok(())
}

impl PostgresRepo {
    /// Creates a new PostgreSQL repository with automatic migration.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Counts one hit in the fixed window starting at `window_start` and
    /// returns the window's running total.
    pub async fn hit_rate_limit(&self, key: &str, window_start: i64) -> Result<i64, RepoError> {
        let hits: i32 = sqlx::query_scalar(
            r#"INSERT INTO rate_limit_windows (key, window_start, hits) VALUES ($1, $2, 1)
               ON CONFLICT (key) DO UPDATE SET
                   hits = CASE WHEN rate_limit_windows.window_start = EXCLUDED.window_start
                               THEN rate_limit_windows.hits + 1 ELSE 1 END,
                   window_start = EXCLUDED.window_start
               RETURNING hits"#,
        )
        .bind(key)
        .bind(window_start)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(i64::from(hits))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Repository implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl SplitRepository for PostgresRepo {
    async fn create_recipient(&self, recipient: Recipient) -> Result<Recipient, RepoError> {
        sqlx::query(
            r#"INSERT INTO recipients (id, name, email, role, payout_account_id, created_at)
               VALUES ($1, $2, $3, $4, $5, $6)"#,
        )
        .bind(recipient.id.into_uuid())
        .bind(&recipient.name)
        .bind(&recipient.email)
        .bind(recipient.role.as_ref())
        .bind(&recipient.payout_account_id)
        .bind(recipient.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(recipient)
    }

    async fn get_recipient(&self, id: RecipientId) -> Result<Option<Recipient>, RepoError> {
        let row: Option<DbRecipient> = sqlx::query_as(&format!(
            "SELECT {} FROM recipients WHERE id = $1",
            RECIPIENT_COLUMNS
        ))
        .bind(id.into_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(DbRecipient::into_domain).transpose()
    }

    async fn list_recipients(&self) -> Result<Vec<Recipient>, RepoError> {
        let rows: Vec<DbRecipient> = sqlx::query_as(&format!(
            "SELECT {} FROM recipients ORDER BY created_at",
            RECIPIENT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(DbRecipient::into_domain).collect()
    }

    async fn create_product(&self, product: Product) -> Result<Product, RepoError> {
        sqlx::query(
            r#"INSERT INTO products (id, name, description, retail_price, creator_id, is_active, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
        )
        .bind(product.id.into_uuid())
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.retail_price)
        .bind(product.creator_id.into_uuid())
        .bind(product.is_active)
        .bind(product.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(product)
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepoError> {
        let row: Option<DbProduct> = sqlx::query_as(&format!(
            "SELECT {} FROM products WHERE id = $1",
            PRODUCT_COLUMNS
        ))
        .bind(id.into_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(DbProduct::into_domain).transpose()
    }

    async fn list_products(&self) -> Result<Vec<Product>, RepoError> {
        let rows: Vec<DbProduct> = sqlx::query_as(&format!(
            "SELECT {} FROM products ORDER BY created_at",
            PRODUCT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(DbProduct::into_domain).collect()
    }

    async fn create_rule(
        &self,
        rule: TransferRule,
        max_active: i64,
    ) -> Result<TransferRule, RepoError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        ensure_rule_capacity(&mut tx, rule.product_id, max_active).await?;

        sqlx::query(
            r#"INSERT INTO transfer_rules
                   (id, product_id, recipient_id, name, description, rule_type, amount, percentage,
                    priority, is_active, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"#,
        )
        .bind(rule.id.into_uuid())
        .bind(rule.product_id.into_uuid())
        .bind(rule.recipient_id.into_uuid())
        .bind(&rule.name)
        .bind(&rule.description)
        .bind(rule.rule_type.as_ref())
        .bind(rule.amount)
        .bind(rule.percentage)
        .bind(rule.priority)
        .bind(rule.is_active)
        .bind(rule.created_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(rule)
    }

    async fn get_rule(&self, id: TransferRuleId) -> Result<Option<TransferRule>, RepoError> {
        let row: Option<DbTransferRule> = sqlx::query_as(&format!(
            "SELECT {} FROM transfer_rules WHERE id = $1",
            RULE_COLUMNS
        ))
        .bind(id.into_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(DbTransferRule::into_domain).transpose()
    }

    async fn set_rule_active(
        &self,
        id: TransferRuleId,
        is_active: bool,
        max_active: i64,
    ) -> Result<Option<TransferRule>, RepoError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let current: Option<(Uuid, bool)> =
            sqlx::query_as("SELECT product_id, is_active FROM transfer_rules WHERE id = $1")
                .bind(id.into_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?;
        let Some((product_id, was_active)) = current else {
            return Ok(None);
        };
        if is_active && !was_active {
            ensure_rule_capacity(&mut tx, ProductId::from_uuid(product_id), max_active).await?;
        }

        let row: Option<DbTransferRule> = sqlx::query_as(&format!(
            "UPDATE transfer_rules SET is_active = $1 WHERE id = $2 RETURNING {}",
            RULE_COLUMNS
        ))
        .bind(is_active)
        .bind(id.into_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        row.map(DbTransferRule::into_domain).transpose()
    }

    async fn list_rules_for_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<RuleAssignment>, RepoError> {
        let rows: Vec<DbRuleAssignment> = sqlx::query_as(RULE_ASSIGNMENTS_QUERY)
            .bind(product_id.into_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.into_iter().map(DbRuleAssignment::into_domain).collect()
    }

    async fn create_payment(&self, payment: Payment) -> Result<Payment, RepoError> {
        sqlx::query(&format!(
            "INSERT INTO payments ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
            PAYMENT_COLUMNS
        ))
        .bind(payment.id.into_uuid())
        .bind(payment.product_id.into_uuid())
        .bind(&payment.customer_id)
        .bind(payment.quantity)
        .bind(payment.amount)
        .bind(payment.currency.to_string())
        .bind(payment.status.as_ref())
        .bind(payment.transfers_completed)
        .bind(&payment.checkout_session_id)
        .bind(&payment.payment_intent_id)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .bind(payment.completed_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(payment)
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>, RepoError> {
        let row: Option<DbPayment> = sqlx::query_as(&format!(
            "SELECT {} FROM payments WHERE id = $1",
            PAYMENT_COLUMNS
        ))
        .bind(id.into_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(DbPayment::into_domain).transpose()
    }

    async fn list_payments(&self, limit: i64) -> Result<Vec<Payment>, RepoError> {
        let rows: Vec<DbPayment> = sqlx::query_as(&format!(
            "SELECT {} FROM payments ORDER BY created_at DESC LIMIT $1",
            PAYMENT_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(DbPayment::into_domain).collect()
    }

    async fn get_payment_with_rules(
        &self,
        id: PaymentId,
    ) -> Result<Option<PaymentWithRules>, RepoError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        let row: Option<DbPayment> = sqlx::query_as(&format!(
            "SELECT {} FROM payments WHERE id = $1",
            PAYMENT_COLUMNS
        ))
        .bind(id.into_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let payment = row.into_domain()?;

        let rows: Vec<DbRuleAssignment> = sqlx::query_as(RULE_ASSIGNMENTS_QUERY)
            .bind(payment.product_id.into_uuid())
            .fetch_all(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;

        let rules = rows
            .into_iter()
            .map(DbRuleAssignment::into_domain)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(PaymentWithRules { payment, rules }))
    }

    async fn transition_payment(
        &self,
        payment: &Payment,
        expected: PaymentStatus,
    ) -> Result<bool, RepoError> {
        let result = sqlx::query(
            r#"UPDATE payments
               SET status = $1, checkout_session_id = $2, payment_intent_id = $3,
                   updated_at = $4, completed_at = $5
               WHERE id = $6 AND status = $7"#,
        )
        .bind(payment.status.as_ref())
        .bind(&payment.checkout_session_id)
        .bind(&payment.payment_intent_id)
        .bind(payment.updated_at)
        .bind(payment.completed_at)
        .bind(payment.id.into_uuid())
        .bind(expected.as_ref())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_transfers_completed(&self, id: PaymentId) -> Result<(), RepoError> {
        let result = sqlx::query(
            r#"UPDATE payments SET transfers_completed = TRUE, updated_at = $1 WHERE id = $2"#,
        )
        .bind(Utc::now())
        .bind(id.into_uuid())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn create_transfers(&self, transfers: &[Transfer]) -> Result<(), RepoError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        for transfer in transfers {
            sqlx::query(&format!(
                "INSERT INTO transfers ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
                TRANSFER_COLUMNS
            ))
            .bind(transfer.id.into_uuid())
            .bind(transfer.payment_id.into_uuid())
            .bind(transfer.transfer_rule_id.into_uuid())
            .bind(transfer.recipient_id.into_uuid())
            .bind(transfer.rule_type.as_ref())
            .bind(transfer.amount)
            .bind(transfer.currency.to_string())
            .bind(transfer.status.as_ref())
            .bind(&transfer.external_transfer_id)
            .bind(&transfer.error_message)
            .bind(&transfer.note)
            .bind(transfer.calculated_at)
            .bind(transfer.completed_at)
            .bind(transfer.failed_at)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn update_transfer(&self, transfer: &Transfer) -> Result<(), RepoError> {
        let result = sqlx::query(
            r#"UPDATE transfers
               SET status = $1, external_transfer_id = $2, error_message = $3, note = $4,
                   completed_at = $5, failed_at = $6
               WHERE id = $7 AND status = $8"#,
        )
        .bind(transfer.status.as_ref())
        .bind(&transfer.external_transfer_id)
        .bind(&transfer.error_message)
        .bind(&transfer.note)
        .bind(transfer.completed_at)
        .bind(transfer.failed_at)
        .bind(transfer.id.into_uuid())
        .bind(TransferStatus::Pending.as_ref())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::Conflict(format!(
                "Transfer {} is not pending",
                transfer.id
            )));
        }
        Ok(())
    }

    async fn list_transfers_for_payment(
        &self,
        payment_id: PaymentId,
    ) -> Result<Vec<Transfer>, RepoError> {
        let rows: Vec<DbTransfer> = sqlx::query_as(&format!(
            "SELECT {} FROM transfers WHERE payment_id = $1 ORDER BY calculated_at ASC",
            TRANSFER_COLUMNS
        ))
        .bind(payment_id.into_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(DbTransfer::into_domain).collect()
    }

    async fn record_event(&self, event: &ReceivedEvent) -> Result<EventRecord, RepoError> {
        let result = sqlx::query(
            r#"INSERT INTO processor_events (id, event_type, payload, status, received_at, attempts)
               VALUES ($1, $2, $3, $4, $5, 0)
               ON CONFLICT (id) DO NOTHING"#,
        )
        .bind(&event.id)
        .bind(&event.event_type)
        .bind(&event.payload)
        .bind(event.status.as_ref())
        .bind(event.received_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 1 {
            return Ok(EventRecord::Inserted);
        }

        let status: String =
            sqlx::query_scalar(r#"SELECT status FROM processor_events WHERE id = $1"#)
                .bind(&event.id)
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;

        let status = status
            .parse::<EventStatus>()
            .map_err(|e| RepoError::Database(e.to_string()))?;
        Ok(EventRecord::Duplicate(status))
    }

    async fn update_event_status(
        &self,
        id: &str,
        status: EventStatus,
        last_error: Option<String>,
    ) -> Result<(), RepoError> {
        let attempt = i32::from(status == EventStatus::Processing);
        let processed_at =
            matches!(status, EventStatus::Completed | EventStatus::Failed).then(Utc::now);

        sqlx::query(
            r#"UPDATE processor_events
               SET status = $1, last_error = $2, attempts = attempts + $3,
                   processed_at = COALESCE($4, processed_at)
               WHERE id = $5"#,
        )
        .bind(status.as_ref())
        .bind(last_error)
        .bind(attempt)
        .bind(processed_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn ping(&self) -> Result<(), RepoError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}
