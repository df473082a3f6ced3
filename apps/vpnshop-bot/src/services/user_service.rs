use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Utc};
use vpnshop_db::models::user::{Cooldown, CooldownClaim, UserEntitlement};
use vpnshop_db::repositories::EntitlementLedger;
use vpnshop_db::utils::is_public_code;

use crate::error::EventError;

pub const SUPPORT_COOLDOWN_MINUTES: i64 = 60;

/// Lookups and rate-limited actions keyed on a ledger row.
#[derive(Clone)]
pub struct UserService {
    ledger: Arc<dyn EntitlementLedger>,
}

/// A taken cooldown slot that can be handed back if the action fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownTicket {
    pub user_id: i64,
    pub cooldown: Cooldown,
    previous: Option<chrono::DateTime<Utc>>,
}

impl UserService {
    pub fn new(ledger: Arc<dyn EntitlementLedger>) -> Self {
        Self { ledger }
    }

    pub async fn find(&self, user_id: i64) -> Result<Option<UserEntitlement>> {
        self.ledger.find(user_id).await
    }

    /// Resolves a numeric user id or a public code (case-insensitive).
    /// Older codes may be all digits, so an id miss falls back to the code.
    pub async fn resolve(&self, token: &str) -> Result<Option<UserEntitlement>> {
        let token = token.trim();
        if token.is_empty() {
            return Ok(None);
        }
        if let Ok(user_id) = token.parse::<i64>() {
            if let Some(user) = self.ledger.find(user_id).await? {
                return Ok(Some(user));
            }
        }
        let code = token.to_uppercase();
        if is_public_code(&code) {
            return self.ledger.find_by_public_code(&code).await;
        }
        Ok(None)
    }

    pub async fn claim(
        &self,
        user_id: i64,
        cooldown: Cooldown,
        window: Duration,
    ) -> Result<CooldownTicket, EventError> {
        let now = Utc::now();
        match self.ledger.claim_cooldown(user_id, cooldown, now, window).await? {
            CooldownClaim::Claimed { previous } => Ok(CooldownTicket {
                user_id,
                cooldown,
                previous,
            }),
            CooldownClaim::CoolingDown { available_at } => Err(EventError::RateLimited {
                retry_after: available_at - now,
            }),
            CooldownClaim::UnknownUser => Err(EventError::UnknownUser(user_id)),
        }
    }

    pub async fn release(&self, ticket: CooldownTicket) -> Result<()> {
        self.ledger
            .restore_cooldown(ticket.user_id, ticket.cooldown, ticket.previous)
            .await
    }

    /// Takes the hourly support slot.
    pub async fn claim_support_slot(&self, user_id: i64) -> Result<CooldownTicket, EventError> {
        self.claim(
            user_id,
            Cooldown::SupportContact,
            Duration::minutes(SUPPORT_COOLDOWN_MINUTES),
        )
        .await
    }

    /// Read-only check used before asking the user to type a ticket.
    pub async fn support_wait(&self, user_id: i64) -> Result<Option<Duration>> {
        let now = Utc::now();
        Ok(self.ledger.find(user_id).await?.and_then(|user| {
            let last = Cooldown::SupportContact.last_used(&user)?;
            let available_at = last + Duration::minutes(SUPPORT_COOLDOWN_MINUTES);
            (available_at > now).then(|| available_at - now)
        }))
    }
}
