//! SQLite repository adapter.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;

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
    WHERE r.product_id = ?
    ORDER BY r.priority ASC, r.created_at ASC"#;

/// Fixed-width RFC 3339 so stored timestamps sort lexicographically.
fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn ts_opt(dt: Option<DateTime<Utc>>) -> Option<String> {
    dt.map(ts)
}

/// Executes SQL statements from a migration file, splitting by semicolons.
async fn execute_migration(pool: &SqlitePool, sql: &str, name: &str) -> anyhow::Result<()> {
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
async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    execute_migration(
        pool,
        include_str!("../migrations/0001_create_catalog.sql"),
        "0001",
    )
    .await?;
    execute_migration(
        pool,
        include_str!("../migrations/0002_create_payments.sql"),
        "0002",
    )
    .await?;
    execute_migration(
        pool,
        include_str!("../migrations/0003_create_processor_events.sql"),
        "0003",
    )
    .await?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// SQLite Repository
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite repository implementation.
#[derive(Clone)]
pub struct SqliteRepo {
    pool: SqlitePool,
}

impl SqliteRepo {
    /// Creates a new SQLite repository with automatic migration.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let in_memory = database_url.contains(":memory:");

        // Ensure on-disk SQLite target directory exists (no-op for in-memory).
        if let Some(path) = database_url.strip_prefix("sqlite://")
            && !in_memory
        {
            let path = path.split('?').next().unwrap_or(path);
            if let Some(parent) = std::path::Path::new(path).parent()
                && !parent.as_os_str().is_empty()
            {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // Every connection to `:memory:` is its own database, so keep exactly one alive.
        let pool = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        }
        .connect_with(options)
        .await?;

        run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Counts one hit in the fixed window starting at `window_start` and
    /// returns the window's running total.
    pub async fn hit_rate_limit(&self, key: &str, window_start: i64) -> Result<i64, RepoError> {
        sqlx::query_scalar(
            r#"INSERT INTO rate_limit_windows (key, window_start, hits) VALUES (?, ?, 1)
               ON CONFLICT(key) DO UPDATE SET
                   hits = CASE WHEN rate_limit_windows.window_start = excluded.window_start
                               THEN rate_limit_windows.hits + 1 ELSE 1 END,
                   window_start = excluded.window_start
               RETURNING hits"#,
        )
        .bind(key)
        .bind(window_start)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Repository implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl SplitRepository for SqliteRepo {
    async fn create_recipient(&self, recipient: Recipient) -> Result<Recipient, RepoError> {
        sqlx::query(
            r#"INSERT INTO recipients (id, name, email, role, payout_account_id, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(recipient.id.to_string())
        .bind(&recipient.name)
        .bind(&recipient.email)
        .bind(recipient.role.as_ref())
        .bind(&recipient.payout_account_id)
        .bind(ts(recipient.created_at))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(recipient)
    }

    async fn get_recipient(&self, id: RecipientId) -> Result<Option<Recipient>, RepoError> {
        let row: Option<DbRecipient> = sqlx::query_as(&format!(
            "SELECT {} FROM recipients WHERE id = ?",
            RECIPIENT_COLUMNS
        ))
        .bind(id.to_string())
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
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(product.id.to_string())
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.retail_price.to_string())
        .bind(product.creator_id.to_string())
        .bind(product.is_active)
        .bind(ts(product.created_at))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(product)
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepoError> {
        let row: Option<DbProduct> = sqlx::query_as(&format!(
            "SELECT {} FROM products WHERE id = ?",
            PRODUCT_COLUMNS
        ))
        .bind(id.to_string())
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
        // Single statement: SQLite serializes writers, so the count cannot go stale.
        let result = sqlx::query(
            r#"INSERT INTO transfer_rules
                   (id, product_id, recipient_id, name, description, rule_type, amount, percentage,
                    priority, is_active, created_at)
               SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
               WHERE (SELECT COUNT(*) FROM transfer_rules
                      WHERE product_id = ? AND is_active = 1) < ?"#,
        )
        .bind(rule.id.to_string())
        .bind(rule.product_id.to_string())
        .bind(rule.recipient_id.to_string())
        .bind(&rule.name)
        .bind(&rule.description)
        .bind(rule.rule_type.as_ref())
        .bind(rule.amount.map(|a| a.to_string()))
        .bind(rule.percentage.map(|p| p.to_string()))
        .bind(rule.priority)
        .bind(rule.is_active)
        .bind(ts(rule.created_at))
        .bind(rule.product_id.to_string())
        .bind(max_active)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(rule_limit_reached(rule.product_id, max_active));
        }
        Ok(rule)
    }

    async fn get_rule(&self, id: TransferRuleId) -> Result<Option<TransferRule>, RepoError> {
        let row: Option<DbTransferRule> = sqlx::query_as(&format!(
            "SELECT {} FROM transfer_rules WHERE id = ?",
            RULE_COLUMNS
        ))
        .bind(id.to_string())
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
        let row: Option<DbTransferRule> = sqlx::query_as(&format!(
            r#"UPDATE transfer_rules SET is_active = ?
               WHERE id = ?
                 AND (NOT ? OR is_active = 1
                      OR (SELECT COUNT(*) FROM transfer_rules r
                          WHERE r.product_id = transfer_rules.product_id AND r.is_active = 1) < ?)
               RETURNING {}"#,
            RULE_COLUMNS
        ))
        .bind(is_active)
        .bind(id.to_string())
        .bind(is_active)
        .bind(max_active)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        match row {
            Some(row) => row.into_domain().map(Some),
            // Nothing updated: either no such rule or the cap refused it
            None => match self.get_rule(id).await? {
                Some(rule) => Err(rule_limit_reached(rule.product_id, max_active)),
                None => Ok(None),
            },
        }
    }

    async fn list_rules_for_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<RuleAssignment>, RepoError> {
        let rows: Vec<DbRuleAssignment> = sqlx::query_as(RULE_ASSIGNMENTS_QUERY)
        .bind(product_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(DbRuleAssignment::into_domain).collect()
    }

    async fn create_payment(&self, payment: Payment) -> Result<Payment, RepoError> {
        sqlx::query(&format!(
            "INSERT INTO payments ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            PAYMENT_COLUMNS
        ))
        .bind(payment.id.to_string())
        .bind(payment.product_id.to_string())
        .bind(&payment.customer_id)
        .bind(payment.quantity)
        .bind(payment.amount.to_string())
        .bind(payment.currency.to_string())
        .bind(payment.status.as_ref())
        .bind(payment.transfers_completed)
        .bind(&payment.checkout_session_id)
        .bind(&payment.payment_intent_id)
        .bind(ts(payment.created_at))
        .bind(ts(payment.updated_at))
        .bind(ts_opt(payment.completed_at))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(payment)
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>, RepoError> {
        let row: Option<DbPayment> = sqlx::query_as(&format!(
            "SELECT {} FROM payments WHERE id = ?",
            PAYMENT_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(DbPayment::into_domain).transpose()
    }

    async fn list_payments(&self, limit: i64) -> Result<Vec<Payment>, RepoError> {
        let rows: Vec<DbPayment> = sqlx::query_as(&format!(
            "SELECT {} FROM payments ORDER BY created_at DESC LIMIT ?",
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

        let row: Option<DbPayment> = sqlx::query_as(&format!(
            "SELECT {} FROM payments WHERE id = ?",
            PAYMENT_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let payment = row.into_domain()?;

        let rows: Vec<DbRuleAssignment> = sqlx::query_as(RULE_ASSIGNMENTS_QUERY)
        .bind(payment.product_id.to_string())
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
               SET status = ?, checkout_session_id = ?, payment_intent_id = ?,
                   updated_at = ?, completed_at = ?
               WHERE id = ? AND status = ?"#,
        )
        .bind(payment.status.as_ref())
        .bind(&payment.checkout_session_id)
        .bind(&payment.payment_intent_id)
        .bind(ts(payment.updated_at))
        .bind(ts_opt(payment.completed_at))
        .bind(payment.id.to_string())
        .bind(expected.as_ref())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_transfers_completed(&self, id: PaymentId) -> Result<(), RepoError> {
        let result = sqlx::query(
            r#"UPDATE payments SET transfers_completed = 1, updated_at = ? WHERE id = ?"#,
        )
        .bind(ts(Utc::now()))
        .bind(id.to_string())
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
                "INSERT INTO transfers ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                TRANSFER_COLUMNS
            ))
            .bind(transfer.id.to_string())
            .bind(transfer.payment_id.to_string())
            .bind(transfer.transfer_rule_id.to_string())
            .bind(transfer.recipient_id.to_string())
            .bind(transfer.rule_type.as_ref())
            .bind(transfer.amount.to_string())
            .bind(transfer.currency.to_string())
            .bind(transfer.status.as_ref())
            .bind(&transfer.external_transfer_id)
            .bind(&transfer.error_message)
            .bind(&transfer.note)
            .bind(ts(transfer.calculated_at))
            .bind(ts_opt(transfer.completed_at))
            .bind(ts_opt(transfer.failed_at))
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
               SET status = ?, external_transfer_id = ?, error_message = ?, note = ?,
                   completed_at = ?, failed_at = ?
               WHERE id = ? AND status = ?"#,
        )
        .bind(transfer.status.as_ref())
        .bind(&transfer.external_transfer_id)
        .bind(&transfer.error_message)
        .bind(&transfer.note)
        .bind(ts_opt(transfer.completed_at))
        .bind(ts_opt(transfer.failed_at))
        .bind(transfer.id.to_string())
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
            "SELECT {} FROM transfers WHERE payment_id = ? ORDER BY calculated_at ASC",
            TRANSFER_COLUMNS
        ))
        .bind(payment_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(DbTransfer::into_domain).collect()
    }

    async fn record_event(&self, event: &ReceivedEvent) -> Result<EventRecord, RepoError> {
        let result = sqlx::query(
            r#"INSERT INTO processor_events (id, event_type, payload, status, received_at, attempts)
               VALUES (?, ?, ?, ?, ?, 0)
               ON CONFLICT(id) DO NOTHING"#,
        )
        .bind(&event.id)
        .bind(&event.event_type)
        .bind(event.payload.to_string())
        .bind(event.status.as_ref())
        .bind(ts(event.received_at))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 1 {
            return Ok(EventRecord::Inserted);
        }

        let status: String =
            sqlx::query_scalar(r#"SELECT status FROM processor_events WHERE id = ?"#)
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
        let processed_at = matches!(status, EventStatus::Completed | EventStatus::Failed)
            .then(|| ts(Utc::now()));

        sqlx::query(
            r#"UPDATE processor_events
               SET status = ?, last_error = ?, attempts = attempts + ?,
                   processed_at = COALESCE(?, processed_at)
               WHERE id = ?"#,
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
