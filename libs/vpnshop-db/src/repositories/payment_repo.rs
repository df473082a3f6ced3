use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;

use crate::models::payment::ProcessedPayment;
use crate::repositories::PaymentLedger;

#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: PgPool,
}

impl PaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn recent_for_user(&self, user_id: i64, limit: i64) -> Result<Vec<ProcessedPayment>> {
        sqlx::query_as::<_, ProcessedPayment>(
            "SELECT * FROM processed_payments WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch payments for user")
    }
}

#[async_trait]
impl PaymentLedger for PaymentRepository {
    async fn claim(&self, payment_id: &str, user_id: i64, provider: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO processed_payments (payment_id, user_id, provider)
            VALUES ($1, $2, $3)
            ON CONFLICT (payment_id) DO NOTHING
            "#,
        )
        .bind(payment_id)
        .bind(user_id)
        .bind(provider)
        .execute(&self.pool)
        .await
        .context("Failed to record payment")?;
        Ok(result.rows_affected() == 1)
    }

    async fn release(&self, payment_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM processed_payments WHERE payment_id = $1")
            .bind(payment_id)
            .execute(&self.pool)
            .await
            .context("Failed to release payment claim")?;
        Ok(())
    }
}
