use anyhow::{Context, Result};
use chrono::Duration;
use rand::Rng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use tracing::{error, info};
use vpnshop_db::models::user::Cooldown;

use crate::error::EventError;
use crate::services::entitlement_service::{EntitlementService, GrantDelta, GrantReceipt};
use crate::services::user_service::UserService;

pub const BONUS_COOLDOWN_HOURS: i64 = 24;

/// (hours, weight) pairs of the daily bonus draw.
pub const BONUS_TABLE: [(i64, u32); 5] = [(6, 35), (12, 30), (24, 20), (48, 10), (72, 5)];

#[derive(Debug, Clone, PartialEq)]
pub struct BonusAward {
    pub hours: i64,
    pub receipt: GrantReceipt,
}

#[derive(Clone)]
pub struct BonusService {
    users: UserService,
    entitlements: EntitlementService,
    weights: WeightedIndex<u32>,
}

impl BonusService {
    pub fn new(users: UserService, entitlements: EntitlementService) -> Result<Self> {
        let weights = WeightedIndex::new(BONUS_TABLE.iter().map(|(_, weight)| *weight))
            .context("Invalid daily bonus weight table")?;
        Ok(Self {
            users,
            entitlements,
            weights,
        })
    }

    pub fn draw_with<R: Rng + ?Sized>(&self, rng: &mut R) -> i64 {
        BONUS_TABLE[self.weights.sample(rng)].0
    }

    /// Claims the daily bonus. The cooldown slot is handed back if the grant fails.
    pub async fn claim_daily(&self, user_id: i64) -> Result<BonusAward, EventError> {
        let ticket = self
            .users
            .claim(user_id, Cooldown::DailyBonus, Duration::hours(BONUS_COOLDOWN_HOURS))
            .await?;

        let hours = self.draw_with(&mut rand::rng());

        match self.entitlements.grant(user_id, GrantDelta::hours(hours)).await {
            Ok(receipt) => {
                info!(user_id, hours, "Daily bonus granted");
                Ok(BonusAward { hours, receipt })
            }
            Err(e) => {
                if let Err(restore) = self.users.release(ticket).await {
                    error!(user_id, "Failed to release bonus cooldown: {:#}", restore);
                }
                Err(e.into())
            }
        }
    }
}
