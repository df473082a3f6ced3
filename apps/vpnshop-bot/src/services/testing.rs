//! In-memory collaborators shared by the service tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;
use vpnshop_db::models::user::{
    Cooldown, CooldownClaim, EntitlementChange, NewUser, Registration, UserEntitlement,
};
use vpnshop_db::repositories::{EntitlementLedger, PaymentLedger};
use vpnshop_db::utils::generate_public_code;

use crate::config::LinkConfig;
use crate::error::{CredentialError, PanelError};
use crate::services::credential_store::{CredentialStore, RemoteOutcome};
use crate::services::link_service::VlessLinkBuilder;
use crate::services::notification_service::{Notice, Notifier};

pub fn user(user_id: i64) -> UserEntitlement {
    UserEntitlement {
        user_id,
        display_name: None,
        credential_id: None,
        expiry_at: None,
        public_code: generate_public_code(),
        referred_by: None,
        referral_count: 0,
        last_support_contact_at: None,
        last_bonus_claim_at: None,
        expiry_notified: false,
        created_at: Utc::now(),
    }
}

pub fn links() -> VlessLinkBuilder {
    VlessLinkBuilder::new(LinkConfig {
        server_ip: "198.51.100.1".to_string(),
        server_port: 443,
        public_key: "pk".to_string(),
        sni: "sni.example".to_string(),
        short_id: "sid".to_string(),
    })
}

#[derive(Default)]
pub struct MemoryLedger {
    rows: Mutex<HashMap<i64, UserEntitlement>>,
    pub fail_commits: AtomicBool,
    pub fail_scans: AtomicBool,
    /// Users whose expiry mark fails.
    pub fail_marks: Mutex<HashSet<i64>>,
}

impl MemoryLedger {
    pub fn seed(&self, row: UserEntitlement) {
        self.rows.lock().unwrap().insert(row.user_id, row);
    }

    pub fn get(&self, user_id: i64) -> UserEntitlement {
        self.rows.lock().unwrap()[&user_id].clone()
    }
}

#[async_trait]
impl EntitlementLedger for MemoryLedger {
    async fn find(&self, user_id: i64) -> Result<Option<UserEntitlement>> {
        Ok(self.rows.lock().unwrap().get(&user_id).cloned())
    }

    async fn find_by_public_code(&self, code: &str) -> Result<Option<UserEntitlement>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.values().find(|u| u.public_code == code).cloned())
    }

    async fn register(&self, new_user: NewUser<'_>) -> Result<Registration> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(existing) = rows.get_mut(&new_user.user_id) {
            if let Some(name) = new_user.display_name {
                existing.display_name = Some(name.to_string());
            }
            return Ok(Registration::Existing(existing.clone()));
        }
        let mut row = user(new_user.user_id);
        row.display_name = new_user.display_name.map(str::to_string);
        row.referred_by = new_user.referred_by.filter(|r| *r != new_user.user_id);
        rows.insert(row.user_id, row.clone());
        Ok(Registration::Created(row))
    }

    async fn increment_referral_count(&self, user_id: i64) -> Result<Option<i32>> {
        let mut rows = self.rows.lock().unwrap();
        Ok(rows.get_mut(&user_id).map(|u| {
            u.referral_count += 1;
            u.referral_count
        }))
    }

    async fn apply_entitlement(
        &self,
        user_id: i64,
        change: &EntitlementChange,
    ) -> Result<Option<UserEntitlement>> {
        if self.fail_commits.load(Ordering::SeqCst) {
            anyhow::bail!("connection reset");
        }
        let mut rows = self.rows.lock().unwrap();
        Ok(rows.get_mut(&user_id).map(|u| {
            u.expiry_at = Some(change.expiry_at);
            u.credential_id = u.credential_id.or(change.credential_id);
            if change.clear_notified {
                u.expiry_notified = false;
            }
            u.clone()
        }))
    }

    async fn expired_unnotified(
        &self,
        as_of: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<UserEntitlement>> {
        if self.fail_scans.load(Ordering::SeqCst) {
            anyhow::bail!("pool timed out");
        }
        let rows = self.rows.lock().unwrap();
        let mut due: Vec<UserEntitlement> = rows
            .values()
            .filter(|u| {
                u.credential_id.is_some()
                    && !u.expiry_notified
                    && u.expiry_at.is_some_and(|e| e <= as_of)
            })
            .cloned()
            .collect();
        due.sort_by_key(|u| u.expiry_at);
        due.truncate(limit as usize);
        Ok(due)
    }

    async fn mark_expiry_notified(&self, user_id: i64, as_of: DateTime<Utc>) -> Result<bool> {
        if self.fail_marks.lock().unwrap().contains(&user_id) {
            anyhow::bail!("deadlock detected");
        }
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(&user_id) {
            Some(u) if u.expiry_at.is_some_and(|e| e <= as_of) => {
                u.expiry_notified = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn claim_cooldown(
        &self,
        user_id: i64,
        cooldown: Cooldown,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<CooldownClaim> {
        let mut rows = self.rows.lock().unwrap();
        let Some(u) = rows.get_mut(&user_id) else {
            return Ok(CooldownClaim::UnknownUser);
        };
        let previous = cooldown.last_used(u);
        if let Some(last) = previous {
            if last + window > now {
                return Ok(CooldownClaim::CoolingDown {
                    available_at: last + window,
                });
            }
        }
        match cooldown {
            Cooldown::DailyBonus => u.last_bonus_claim_at = Some(now),
            Cooldown::SupportContact => u.last_support_contact_at = Some(now),
        }
        Ok(CooldownClaim::Claimed { previous })
    }

    async fn restore_cooldown(
        &self,
        user_id: i64,
        cooldown: Cooldown,
        previous: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(u) = rows.get_mut(&user_id) {
            match cooldown {
                Cooldown::DailyBonus => u.last_bonus_claim_at = previous,
                Cooldown::SupportContact => u.last_support_contact_at = previous,
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryPayments {
    seen: Mutex<HashSet<String>>,
}

impl MemoryPayments {
    pub fn contains(&self, payment_id: &str) -> bool {
        self.seen.lock().unwrap().contains(payment_id)
    }
}

#[async_trait]
impl PaymentLedger for MemoryPayments {
    async fn claim(&self, payment_id: &str, _user_id: i64, _provider: &str) -> Result<bool> {
        Ok(self.seen.lock().unwrap().insert(payment_id.to_string()))
    }

    async fn release(&self, payment_id: &str) -> Result<()> {
        self.seen.lock().unwrap().remove(payment_id);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreCall {
    Create(Uuid, i64),
    Update(Uuid, i64),
}

/// Records calls and keeps the last pushed expiry per credential.
#[derive(Default)]
pub struct RecordingStore {
    pub calls: Mutex<Vec<StoreCall>>,
    pub remote_expiry: Mutex<HashMap<Uuid, i64>>,
    pub unavailable: AtomicBool,
    pub update_outcome: Mutex<Option<RemoteOutcome>>,
}

impl RecordingStore {
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    fn unavailable_error() -> CredentialError {
        CredentialError::Unavailable {
            attempts: 5,
            source: PanelError::Http { status: 502 },
        }
    }
}

#[async_trait]
impl CredentialStore for RecordingStore {
    async fn create(
        &self,
        credential_id: Uuid,
        _label: &str,
        expiry_ms: i64,
    ) -> Result<RemoteOutcome, CredentialError> {
        tokio::task::yield_now().await;
        self.calls
            .lock()
            .unwrap()
            .push(StoreCall::Create(credential_id, expiry_ms));
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Self::unavailable_error());
        }
        self.remote_expiry
            .lock()
            .unwrap()
            .insert(credential_id, expiry_ms);
        Ok(RemoteOutcome::Created)
    }

    async fn update(
        &self,
        credential_id: Uuid,
        _label: &str,
        expiry_ms: i64,
    ) -> Result<RemoteOutcome, CredentialError> {
        tokio::task::yield_now().await;
        self.calls
            .lock()
            .unwrap()
            .push(StoreCall::Update(credential_id, expiry_ms));
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Self::unavailable_error());
        }
        self.remote_expiry
            .lock()
            .unwrap()
            .insert(credential_id, expiry_ms);
        Ok(self
            .update_outcome
            .lock()
            .unwrap()
            .unwrap_or(RemoteOutcome::Updated))
    }
}

/// Collects notices; optionally fails delivery to selected users.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(i64, Notice)>>,
    pub blocked: Mutex<HashSet<i64>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(i64, Notice)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn block(&self, user_id: i64) {
        self.blocked.lock().unwrap().insert(user_id);
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, user_id: i64, notice: Notice) -> Result<()> {
        if self.blocked.lock().unwrap().contains(&user_id) {
            anyhow::bail!("Forbidden: bot was blocked by the user");
        }
        self.sent.lock().unwrap().push((user_id, notice));
        Ok(())
    }
}
