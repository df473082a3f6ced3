use anyhow::Result;
use tracing::info;
use vpnshop_db::models::user::UserEntitlement;

use crate::error::GrantError;
use crate::services::entitlement_service::{EntitlementService, GrantDelta, GrantReceipt};
use crate::services::user_service::UserService;

/// Operator-only tools: manual expiry adjustment and user lookup.
#[derive(Clone)]
pub struct AdminService {
    admin_id: i64,
    users: UserService,
    entitlements: EntitlementService,
}

impl AdminService {
    pub fn new(admin_id: i64, users: UserService, entitlements: EntitlementService) -> Self {
        Self {
            admin_id,
            users,
            entitlements,
        }
    }

    pub fn admin_id(&self) -> i64 {
        self.admin_id
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        user_id == self.admin_id
    }

    /// Applies a signed day delta; `0` expires the user immediately.
    /// Returns `Ok(None)` when the token matches no user.
    pub async fn adjust(&self, token: &str, days: i64) -> Result<Option<GrantReceipt>, GrantError> {
        let Some(user) = self.users.resolve(token).await? else {
            return Ok(None);
        };
        let receipt = self
            .entitlements
            .grant(user.user_id, GrantDelta::admin_days(days))
            .await?;
        info!(
            user_id = user.user_id,
            days,
            new_expiry = %receipt.new_expiry,
            "Admin adjusted entitlement"
        );
        Ok(Some(receipt))
    }

    pub async fn lookup(&self, token: &str) -> Result<Option<UserEntitlement>> {
        self.users.resolve(token).await
    }
}
