use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProcessedPayment {
    pub payment_id: String,
    pub user_id: i64,
    pub provider: String,
    pub created_at: DateTime<Utc>,
}
