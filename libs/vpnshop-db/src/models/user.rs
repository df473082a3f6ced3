use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One ledger row per end user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct UserEntitlement {
    pub user_id: i64,
    pub display_name: Option<String>,
    pub credential_id: Option<Uuid>,
    pub expiry_at: Option<DateTime<Utc>>,
    pub public_code: String,
    pub referred_by: Option<i64>,
    pub referral_count: i32,
    pub last_support_contact_at: Option<DateTime<Utc>>,
    pub last_bonus_claim_at: Option<DateTime<Utc>>,
    pub expiry_notified: bool,
    pub created_at: DateTime<Utc>,
}

/// Notification lifecycle derived from `expiry_at` and `expiry_notified`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitlementState {
    /// No expiry was ever recorded.
    NeverEntitled,
    Active,
    ExpiredUnnotified,
    ExpiredNotified,
}

impl UserEntitlement {
    pub fn state_at(&self, now: DateTime<Utc>) -> EntitlementState {
        match self.expiry_at {
            None => EntitlementState::NeverEntitled,
            Some(expiry) if expiry > now => EntitlementState::Active,
            Some(_) if self.expiry_notified => EntitlementState::ExpiredNotified,
            Some(_) => EntitlementState::ExpiredUnnotified,
        }
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.state_at(now) == EntitlementState::Active
    }

    pub fn credential_label(&self) -> String {
        credential_label(self.user_id)
    }
}

/// Label under which the remote panel stores a user's credential.
pub fn credential_label(user_id: i64) -> String {
    format!("user_{}", user_id)
}

/// Registration request for a first-contact user.
#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub user_id: i64,
    pub display_name: Option<&'a str>,
    pub referred_by: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Registration {
    Created(UserEntitlement),
    Existing(UserEntitlement),
}

impl Registration {
    pub fn user(&self) -> &UserEntitlement {
        match self {
            Registration::Created(user) | Registration::Existing(user) => user,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Registration::Created(_))
    }
}

/// State written back after a successful reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitlementChange {
    pub expiry_at: DateTime<Utc>,
    /// Only set when the credential was minted by this change.
    pub credential_id: Option<Uuid>,
    pub clear_notified: bool,
}

/// Rate-limited user actions tracked on the ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cooldown {
    DailyBonus,
    SupportContact,
}

impl Cooldown {
    pub fn column(self) -> &'static str {
        match self {
            Cooldown::DailyBonus => "last_bonus_claim_at",
            Cooldown::SupportContact => "last_support_contact_at",
        }
    }

    pub fn last_used(self, user: &UserEntitlement) -> Option<DateTime<Utc>> {
        match self {
            Cooldown::DailyBonus => user.last_bonus_claim_at,
            Cooldown::SupportContact => user.last_support_contact_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownClaim {
    /// The slot was taken; `previous` allows the claim to be rolled back.
    Claimed { previous: Option<DateTime<Utc>> },
    CoolingDown { available_at: DateTime<Utc> },
    UnknownUser,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user(expiry_at: Option<DateTime<Utc>>, notified: bool) -> UserEntitlement {
        UserEntitlement {
            user_id: 42,
            display_name: None,
            credential_id: None,
            expiry_at,
            public_code: "ABCDEFGH1".to_string(),
            referred_by: None,
            referral_count: 0,
            last_support_contact_at: None,
            last_bonus_claim_at: None,
            expiry_notified: notified,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn state_follows_expiry_and_flag() {
        let now = Utc::now();
        assert_eq!(user(None, false).state_at(now), EntitlementState::NeverEntitled);
        assert_eq!(
            user(Some(now + Duration::days(1)), false).state_at(now),
            EntitlementState::Active
        );
        assert_eq!(
            user(Some(now - Duration::days(1)), false).state_at(now),
            EntitlementState::ExpiredUnnotified
        );
        assert_eq!(
            user(Some(now - Duration::days(1)), true).state_at(now),
            EntitlementState::ExpiredNotified
        );
    }

    #[test]
    fn expiry_equal_to_now_is_expired() {
        let now = Utc::now();
        assert!(!user(Some(now), false).is_active_at(now));
    }

    #[test]
    fn label_is_derived_from_user_id() {
        assert_eq!(credential_label(777), "user_777");
        assert_eq!(user(None, false).credential_label(), "user_42");
    }
}
