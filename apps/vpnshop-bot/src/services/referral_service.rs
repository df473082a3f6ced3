use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info, warn};
use vpnshop_db::models::user::{NewUser, Registration, UserEntitlement};
use vpnshop_db::repositories::EntitlementLedger;

use crate::services::entitlement_service::{EntitlementService, GrantDelta};
use crate::services::notification_service::{Notice, Notifier};
use crate::services::user_service::UserService;

pub const REFERRALS_PER_REWARD: i32 = 5;
pub const REFERRAL_REWARD_DAYS: i64 = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct ReferralProgress {
    pub referrer_id: i64,
    pub referral_count: i32,
    pub rewarded: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationResult {
    pub user: UserEntitlement,
    pub created: bool,
    /// Referrer credited by this registration, if any.
    pub attributed: Option<i64>,
    pub referral: Option<ReferralProgress>,
}

/// First-contact registration and referral milestones.
#[derive(Clone)]
pub struct ReferralService {
    ledger: Arc<dyn EntitlementLedger>,
    users: UserService,
    entitlements: EntitlementService,
    notifier: Arc<dyn Notifier>,
}

impl ReferralService {
    pub fn new(
        ledger: Arc<dyn EntitlementLedger>,
        entitlements: EntitlementService,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            users: UserService::new(ledger.clone()),
            ledger,
            entitlements,
            notifier,
        }
    }

    /// Resolves an inbound referral token to a referrer other than `user_id`.
    async fn resolve_referrer(&self, user_id: i64, token: Option<&str>) -> Result<Option<i64>> {
        let Some(token) = token.filter(|t| !t.trim().is_empty()) else {
            return Ok(None);
        };
        let referrer = self.users.resolve(token).await?;
        Ok(referrer.map(|r| r.user_id).filter(|id| *id != user_id))
    }

    pub async fn register(
        &self,
        user_id: i64,
        display_name: Option<&str>,
        referral_token: Option<&str>,
    ) -> Result<RegistrationResult> {
        // Existing users never get re-attributed, so skip the lookup for them.
        let referred_by = match self.ledger.find(user_id).await? {
            Some(_) => None,
            None => self.resolve_referrer(user_id, referral_token).await?,
        };

        let registration = self
            .ledger
            .register(NewUser {
                user_id,
                display_name,
                referred_by,
            })
            .await?;

        let created = registration.is_new();
        let user = match registration {
            Registration::Created(user) | Registration::Existing(user) => user,
        };

        let attributed = if created { user.referred_by } else { None };
        let referral = match attributed {
            Some(referrer_id) => self.record_referral(referrer_id).await,
            None => None,
        };

        Ok(RegistrationResult {
            user,
            created,
            attributed,
            referral,
        })
    }

    /// Bumps the referrer's counter and pays out on every fifth referral.
    async fn record_referral(&self, referrer_id: i64) -> Option<ReferralProgress> {
        let referral_count = match self.ledger.increment_referral_count(referrer_id).await {
            Ok(Some(count)) => count,
            Ok(None) => {
                error!(referrer_id, "Referrer row missing while crediting referral");
                return None;
            }
            Err(e) => {
                error!(referrer_id, "Failed to credit referral: {:#}", e);
                return None;
            }
        };

        info!(referrer_id, referral_count, "Referral credited");
        if let Err(e) = self
            .notifier
            .notify(referrer_id, Notice::NewReferral { referral_count })
            .await
        {
            warn!(referrer_id, "Referral notice not delivered: {:#}", e);
        }

        let mut rewarded = false;
        if referral_count % REFERRALS_PER_REWARD == 0 {
            match self
                .entitlements
                .grant(referrer_id, GrantDelta::days(REFERRAL_REWARD_DAYS))
                .await
            {
                Ok(receipt) => {
                    rewarded = true;
                    let notice = Notice::ReferralReward {
                        days: REFERRAL_REWARD_DAYS,
                        new_expiry: receipt.new_expiry,
                    };
                    if let Err(e) = self.notifier.notify(referrer_id, notice).await {
                        warn!(referrer_id, "Reward notice not delivered: {:#}", e);
                    }
                }
                // Not retried; the milestone is already counted.
                Err(e) => error!(
                    referrer_id,
                    referral_count, "Referral reward grant failed: {}", e
                ),
            }
        }

        Some(ReferralProgress {
            referrer_id,
            referral_count,
            rewarded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{
        MemoryLedger, RecordingNotifier, RecordingStore, links, user,
    };
    use chrono::{Duration, Utc};
    use std::sync::atomic::Ordering;

    struct Fixture {
        ledger: Arc<MemoryLedger>,
        store: Arc<RecordingStore>,
        notifier: Arc<RecordingNotifier>,
        service: ReferralService,
    }

    fn fixture() -> Fixture {
        let ledger = Arc::new(MemoryLedger::default());
        let store = Arc::new(RecordingStore::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let entitlements = EntitlementService::new(ledger.clone(), store.clone(), links());
        let service = ReferralService::new(ledger.clone(), entitlements, notifier.clone());
        Fixture {
            ledger,
            store,
            notifier,
            service,
        }
    }

    #[tokio::test]
    async fn registration_attributes_by_id_and_code() {
        let f = fixture();
        let mut referrer = user(100);
        referrer.public_code = "REFCODE99".to_string();
        f.ledger.seed(referrer);

        let by_id = f.service.register(1, Some("A"), Some("100")).await.unwrap();
        let by_code = f.service.register(2, None, Some("refcode99")).await.unwrap();

        assert!(by_id.created);
        assert_eq!(by_id.attributed, Some(100));
        assert_eq!(by_code.attributed, Some(100));
        assert_eq!(f.ledger.get(100).referral_count, 2);
        assert_eq!(
            f.notifier.sent(),
            vec![
                (100, Notice::NewReferral { referral_count: 1 }),
                (100, Notice::NewReferral { referral_count: 2 }),
            ]
        );
    }

    #[tokio::test]
    async fn self_and_unknown_referrers_are_ignored() {
        let f = fixture();

        let own = f.service.register(5, None, Some("5")).await.unwrap();
        let unknown = f.service.register(6, None, Some("999")).await.unwrap();

        assert_eq!(own.attributed, None);
        assert_eq!(own.user.referred_by, None);
        assert_eq!(unknown.attributed, None);
        assert!(f.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn returning_user_is_not_reattributed() {
        let f = fixture();
        f.ledger.seed(user(100));
        f.ledger.seed(user(101));
        f.service.register(1, None, Some("100")).await.unwrap();

        let again = f.service.register(1, Some("New Name"), Some("101")).await.unwrap();

        assert!(!again.created);
        assert_eq!(again.attributed, None);
        assert_eq!(again.user.referred_by, Some(100));
        assert_eq!(again.user.display_name.as_deref(), Some("New Name"));
        assert_eq!(f.ledger.get(100).referral_count, 1);
        assert_eq!(f.ledger.get(101).referral_count, 0);
    }

    #[tokio::test]
    async fn every_fifth_referral_grants_three_days() {
        let f = fixture();
        f.ledger.seed(user(100));

        let mut results = Vec::new();
        for id in 1..=10 {
            results.push(f.service.register(id, None, Some("100")).await.unwrap());
        }

        let rewarded: Vec<i32> = results
            .iter()
            .filter_map(|r| r.referral.as_ref())
            .filter(|p| p.rewarded)
            .map(|p| p.referral_count)
            .collect();
        assert_eq!(rewarded, vec![5, 10]);

        let expiry = f.ledger.get(100).expiry_at.unwrap();
        let expected = Utc::now() + Duration::days(6);
        assert!((expiry - expected).num_seconds().abs() < 10);
        assert_eq!(f.store.calls().len(), 2);
    }

    #[tokio::test]
    async fn concurrent_registrations_cross_each_threshold_once() {
        let f = fixture();
        f.ledger.seed(user(100));

        let tasks: Vec<_> = (1..=15)
            .map(|id| {
                let service = f.service.clone();
                tokio::spawn(async move { service.register(id, None, Some("100")).await })
            })
            .collect();
        let mut rewards = 0;
        for task in tasks {
            let result = task.await.unwrap().unwrap();
            if result.referral.is_some_and(|p| p.rewarded) {
                rewards += 1;
            }
        }

        assert_eq!(f.ledger.get(100).referral_count, 15);
        assert_eq!(rewards, 3);
        let expiry = f.ledger.get(100).expiry_at.unwrap();
        assert!(expiry >= Utc::now() + Duration::days(9) - Duration::seconds(10));
    }

    #[tokio::test]
    async fn failed_reward_is_counted_but_not_granted() {
        let f = fixture();
        let mut referrer = user(100);
        referrer.referral_count = 4;
        f.ledger.seed(referrer);
        f.store.unavailable.store(true, Ordering::SeqCst);

        let result = f.service.register(1, None, Some("100")).await.unwrap();

        let progress = result.referral.unwrap();
        assert_eq!(progress.referral_count, 5);
        assert!(!progress.rewarded);
        assert_eq!(f.ledger.get(100).expiry_at, None);
    }
}
