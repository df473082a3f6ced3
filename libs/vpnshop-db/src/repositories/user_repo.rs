use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use tracing::{info, warn};

use crate::models::user::{
    Cooldown, CooldownClaim, EntitlementChange, NewUser, Registration, UserEntitlement,
};
use crate::repositories::EntitlementLedger;
use crate::utils::generate_public_code;

const PUBLIC_CODE_ATTEMPTS: usize = 5;

#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_by_user_id(&self, user_id: i64) -> Result<Option<UserEntitlement>> {
        sqlx::query_as::<_, UserEntitlement>("SELECT * FROM users WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user by ID")
    }

    pub async fn get_by_public_code(&self, code: &str) -> Result<Option<UserEntitlement>> {
        sqlx::query_as::<_, UserEntitlement>("SELECT * FROM users WHERE public_code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user by public code")
    }

    pub async fn count_referrals(&self, referrer_id: i64) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE referred_by = $1")
            .bind(referrer_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count referrals")
    }

    async fn insert_new(&self, new_user: &NewUser<'_>) -> Result<Option<UserEntitlement>> {
        // A collision on public_code surfaces as a unique violation and is retried
        // with a fresh code; a collision on user_id means the row already exists.
        for attempt in 1..=PUBLIC_CODE_ATTEMPTS {
            let code = generate_public_code();
            let inserted = sqlx::query_as::<_, UserEntitlement>(
                r#"
                INSERT INTO users (user_id, display_name, public_code, referred_by)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (user_id) DO NOTHING
                RETURNING *
                "#,
            )
            .bind(new_user.user_id)
            .bind(new_user.display_name)
            .bind(&code)
            .bind(new_user.referred_by)
            .fetch_optional(&self.pool)
            .await;

            match inserted {
                Ok(row) => return Ok(row),
                Err(e)
                    if e
                        .as_database_error()
                        .is_some_and(|db_err| db_err.is_unique_violation()) =>
                {
                    warn!(
                        "Public code collision for user {} (attempt {}/{})",
                        new_user.user_id, attempt, PUBLIC_CODE_ATTEMPTS
                    );
                }
                Err(e) => return Err(e).context("Failed to insert user"),
            }
        }

        Err(anyhow::anyhow!(
            "Could not allocate a unique public code for user {}",
            new_user.user_id
        ))
    }
}

#[async_trait]
impl EntitlementLedger for UserRepository {
    async fn find(&self, user_id: i64) -> Result<Option<UserEntitlement>> {
        self.get_by_user_id(user_id).await
    }

    async fn find_by_public_code(&self, code: &str) -> Result<Option<UserEntitlement>> {
        self.get_by_public_code(code).await
    }

    async fn register(&self, new_user: NewUser<'_>) -> Result<Registration> {
        let user_id = new_user.user_id;
        let new_user = NewUser {
            referred_by: new_user.referred_by.filter(|r| *r != user_id),
            ..new_user
        };

        if let Some(created) = self.insert_new(&new_user).await? {
            info!(
                "Registered user {} (code {}, referred by {:?})",
                created.user_id, created.public_code, created.referred_by
            );
            return Ok(Registration::Created(created));
        }

        let existing = sqlx::query_as::<_, UserEntitlement>(
            r#"
            UPDATE users SET display_name = COALESCE($2, display_name)
            WHERE user_id = $1
            RETURNING *
            "#,
        )
        .bind(new_user.user_id)
        .bind(new_user.display_name)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to refresh existing user")?
        .ok_or_else(|| anyhow::anyhow!("User {} vanished during registration", new_user.user_id))?;

        Ok(Registration::Existing(existing))
    }

    async fn increment_referral_count(&self, user_id: i64) -> Result<Option<i32>> {
        sqlx::query_scalar::<_, i32>(
            "UPDATE users SET referral_count = referral_count + 1 WHERE user_id = $1 RETURNING referral_count",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to increment referral count")
    }

    async fn apply_entitlement(
        &self,
        user_id: i64,
        change: &EntitlementChange,
    ) -> Result<Option<UserEntitlement>> {
        sqlx::query_as::<_, UserEntitlement>(
            r#"
            UPDATE users SET
                expiry_at = $2,
                credential_id = COALESCE(credential_id, $3),
                expiry_notified = CASE WHEN $4 THEN FALSE ELSE expiry_notified END
            WHERE user_id = $1
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(change.expiry_at)
        .bind(change.credential_id)
        .bind(change.clear_notified)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to apply entitlement change")
    }

    async fn expired_unnotified(
        &self,
        as_of: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<UserEntitlement>> {
        sqlx::query_as::<_, UserEntitlement>(
            r#"
            SELECT * FROM users
            WHERE expiry_at <= $1
              AND expiry_notified = FALSE
              AND credential_id IS NOT NULL
            ORDER BY expiry_at ASC
            LIMIT $2
            "#,
        )
        .bind(as_of)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to scan expired entitlements")
    }

    async fn mark_expiry_notified(&self, user_id: i64, as_of: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE users SET expiry_notified = TRUE WHERE user_id = $1 AND expiry_at <= $2",
        )
        .bind(user_id)
        .bind(as_of)
        .execute(&self.pool)
        .await
        .context("Failed to mark expiry notice")?;
        Ok(result.rows_affected() == 1)
    }

    async fn claim_cooldown(
        &self,
        user_id: i64,
        cooldown: Cooldown,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<CooldownClaim> {
        let column = cooldown.column();
        let mut tx = self.pool.begin().await?;

        let last = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(&format!(
            "SELECT {column} FROM users WHERE user_id = $1 FOR UPDATE"
        ))
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to read cooldown")?;

        let Some(previous) = last else {
            return Ok(CooldownClaim::UnknownUser);
        };

        if let Some(last_used) = previous {
            let available_at = last_used + window;
            if available_at > now {
                return Ok(CooldownClaim::CoolingDown { available_at });
            }
        }

        sqlx::query(&format!("UPDATE users SET {column} = $2 WHERE user_id = $1"))
            .bind(user_id)
            .bind(now)
            .execute(&mut *tx)
            .await
            .context("Failed to record cooldown")?;

        tx.commit().await?;
        Ok(CooldownClaim::Claimed { previous })
    }

    async fn restore_cooldown(
        &self,
        user_id: i64,
        cooldown: Cooldown,
        previous: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query(&format!(
            "UPDATE users SET {} = $2 WHERE user_id = $1",
            cooldown.column()
        ))
        .bind(user_id)
        .bind(previous)
        .execute(&self.pool)
        .await
        .context("Failed to restore cooldown")?;
        Ok(())
    }
}
