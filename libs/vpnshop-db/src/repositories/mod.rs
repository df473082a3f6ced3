pub mod payment_repo;
pub mod user_repo;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::models::user::{
    Cooldown, CooldownClaim, EntitlementChange, NewUser, Registration, UserEntitlement,
};

/// Ledger operations the entitlement services depend on.
#[async_trait]
pub trait EntitlementLedger: Send + Sync {
    async fn find(&self, user_id: i64) -> Result<Option<UserEntitlement>>;

    async fn find_by_public_code(&self, code: &str) -> Result<Option<UserEntitlement>>;

    /// Inserts the row on first contact. An existing row is returned untouched
    /// apart from `display_name`; `referred_by` is never rewritten.
    async fn register(&self, new_user: NewUser<'_>) -> Result<Registration>;

    /// Atomic `referral_count + 1`, returning the post-increment value.
    async fn increment_referral_count(&self, user_id: i64) -> Result<Option<i32>>;

    /// Writes the outcome of a reconciliation. `None` means the row is gone.
    async fn apply_entitlement(
        &self,
        user_id: i64,
        change: &EntitlementChange,
    ) -> Result<Option<UserEntitlement>>;

    /// Rows holding a credential whose expiry passed without a notice.
    async fn expired_unnotified(
        &self,
        as_of: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<UserEntitlement>>;

    /// Sets `expiry_notified` unless the row was renewed after `as_of`.
    async fn mark_expiry_notified(&self, user_id: i64, as_of: DateTime<Utc>) -> Result<bool>;

    async fn claim_cooldown(
        &self,
        user_id: i64,
        cooldown: Cooldown,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<CooldownClaim>;

    async fn restore_cooldown(
        &self,
        user_id: i64,
        cooldown: Cooldown,
        previous: Option<DateTime<Utc>>,
    ) -> Result<()>;
}

/// Idempotency keys for payment confirmations.
#[async_trait]
pub trait PaymentLedger: Send + Sync {
    /// `true` if this call recorded the payment, `false` if it was already seen.
    async fn claim(&self, payment_id: &str, user_id: i64, provider: &str) -> Result<bool>;

    async fn release(&self, payment_id: &str) -> Result<()>;
}
