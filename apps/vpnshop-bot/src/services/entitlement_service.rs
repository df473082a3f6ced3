use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError, Weak};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info};
use uuid::Uuid;
use vpnshop_db::models::user::{EntitlementChange, EntitlementState, UserEntitlement};
use vpnshop_db::repositories::EntitlementLedger;

use crate::error::GrantError;
use crate::services::credential_store::{CredentialStore, RemoteOutcome};
use crate::services::link_service::VlessLinkBuilder;

/// Requested change to a user's expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantDelta {
    /// Added to the later of now and the current expiry. May be negative.
    Extend(Duration),
    ResetToNow,
}

impl GrantDelta {
    /// Out-of-range counts saturate; `target` then rejects them.
    pub fn days(days: i64) -> Self {
        GrantDelta::Extend(Duration::try_days(days).unwrap_or_else(|| saturated(days)))
    }

    pub fn hours(hours: i64) -> Self {
        GrantDelta::Extend(Duration::try_hours(hours).unwrap_or_else(|| saturated(hours)))
    }

    /// Admin adjustments treat `0` as "expire now".
    pub fn admin_days(days: i64) -> Self {
        if days == 0 {
            GrantDelta::ResetToNow
        } else {
            GrantDelta::days(days)
        }
    }

    /// New expiry for this delta, or `None` when it falls outside
    /// `UNIX_EPOCH..=MAX_EXPIRY_MS`.
    pub fn target(&self, current: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let target = match self {
            GrantDelta::Extend(delta) => {
                let base = current.map_or(now, |expiry| expiry.max(now));
                base.checked_add_signed(*delta)?
            }
            GrantDelta::ResetToNow => now,
        };
        (0..=MAX_EXPIRY_MS)
            .contains(&target.timestamp_millis())
            .then_some(target)
    }
}

/// 9999-12-31T23:59:59Z. The panel reads negative expiries as "start on first use".
pub const MAX_EXPIRY_MS: i64 = 253_402_300_799_000;

fn saturated(count: i64) -> Duration {
    if count < 0 { Duration::MIN } else { Duration::MAX }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GrantReceipt {
    pub user_id: i64,
    pub previous_expiry: Option<DateTime<Utc>>,
    pub new_expiry: DateTime<Utc>,
    pub credential_id: Option<Uuid>,
    /// `None` when no remote call was needed.
    pub remote: Option<RemoteOutcome>,
    pub credential_link: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntitlementStatus {
    pub state: EntitlementState,
    pub active: bool,
    pub expiry_at: Option<DateTime<Utc>>,
    pub credential_link: Option<String>,
}

impl EntitlementStatus {
    pub fn days_left(&self, now: DateTime<Utc>) -> i64 {
        match self.expiry_at {
            Some(expiry) if self.active => (expiry - now).num_days(),
            _ => 0,
        }
    }
}

/// Per-user async locks. Entries are weak and pruned once the map grows.
#[derive(Default)]
pub struct UserLocks {
    locks: StdMutex<HashMap<i64, Weak<Mutex<()>>>>,
}

impl UserLocks {
    const PRUNE_AT: usize = 256;

    pub async fn acquire(&self, user_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            if locks.len() >= Self::PRUNE_AT {
                locks.retain(|_, weak| weak.strong_count() > 0);
            }
            match locks.get(&user_id).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    let lock = Arc::new(Mutex::new(()));
                    locks.insert(user_id, Arc::downgrade(&lock));
                    lock
                }
            }
        };
        lock.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Reconciles ledger rows with the remote credential store.
#[derive(Clone)]
pub struct EntitlementService {
    ledger: Arc<dyn EntitlementLedger>,
    store: Arc<dyn CredentialStore>,
    links: VlessLinkBuilder,
    locks: Arc<UserLocks>,
}

impl EntitlementService {
    pub fn new(
        ledger: Arc<dyn EntitlementLedger>,
        store: Arc<dyn CredentialStore>,
        links: VlessLinkBuilder,
    ) -> Self {
        Self {
            ledger,
            store,
            links,
            locks: Arc::new(UserLocks::default()),
        }
    }

    fn link_for(&self, user: &UserEntitlement, now: DateTime<Utc>) -> Option<String> {
        match user.credential_id {
            Some(id) if user.is_active_at(now) => {
                Some(self.links.build(id, &user.credential_label()))
            }
            _ => None,
        }
    }

    /// Moves a user's expiry and brings the remote credential in line with it.
    /// The ledger is only written after the remote side accepted the change.
    pub async fn grant(&self, user_id: i64, delta: GrantDelta) -> Result<GrantReceipt, GrantError> {
        let _guard = self.locks.acquire(user_id).await;

        let user = self
            .ledger
            .find(user_id)
            .await?
            .ok_or(GrantError::UnknownUser(user_id))?;

        let now = Utc::now();
        let new_expiry = delta
            .target(user.expiry_at, now)
            .ok_or(GrantError::OutOfRange { user_id })?;
        let label = user.credential_label();
        let expiry_ms = new_expiry.timestamp_millis();

        let (remote, minted) = match user.credential_id {
            Some(id) => (Some(self.store.update(id, &label, expiry_ms).await?), None),
            None if new_expiry > now => {
                let id = Uuid::new_v4();
                (Some(self.store.create(id, &label, expiry_ms).await?), Some(id))
            }
            None => (None, None),
        };

        let change = EntitlementChange {
            expiry_at: new_expiry,
            credential_id: minted,
            clear_notified: new_expiry > now,
        };

        let committed = match self.ledger.apply_entitlement(user_id, &change).await {
            Ok(Some(row)) => row,
            Ok(None) => {
                error!(user_id, "Ledger row vanished after remote change {:?}", remote);
                return Err(GrantError::LedgerInconsistent { user_id });
            }
            Err(e) => {
                if remote.is_some() {
                    error!(
                        user_id,
                        %new_expiry,
                        "Remote credential changed but ledger commit failed: {:#}",
                        e
                    );
                }
                return Err(e.into());
            }
        };

        info!(
            user_id,
            previous = ?user.expiry_at,
            %new_expiry,
            outcome = ?remote,
            "Entitlement granted"
        );

        Ok(GrantReceipt {
            user_id,
            previous_expiry: user.expiry_at,
            new_expiry,
            credential_id: committed.credential_id,
            remote,
            credential_link: self.link_for(&committed, now),
        })
    }

    pub async fn current_status(&self, user_id: i64) -> anyhow::Result<Option<EntitlementStatus>> {
        let now = Utc::now();
        Ok(self.ledger.find(user_id).await?.map(|user| EntitlementStatus {
            state: user.state_at(now),
            active: user.is_active_at(now),
            expiry_at: user.expiry_at,
            credential_link: self.link_for(&user, now),
        }))
    }
}
