use std::sync::Arc;

use tracing::{error, info, warn};
use vpnshop_db::repositories::PaymentLedger;

use crate::error::EventError;
use crate::services::entitlement_service::{EntitlementService, GrantDelta, GrantReceipt};

pub const PURCHASE_DAYS: i64 = 30;
pub const STARS_PROVIDER: &str = "telegram_stars";
pub const SUBSCRIPTION_PAYLOAD: &str = "vpn_month_sub";

#[derive(Debug, Clone, PartialEq)]
pub enum PurchaseOutcome {
    Applied(GrantReceipt),
    /// The confirmation was already processed; nothing was granted.
    Duplicate,
}

/// Turns payment confirmations into exactly one 30-day grant each.
#[derive(Clone)]
pub struct BillingService {
    payments: Arc<dyn PaymentLedger>,
    entitlements: EntitlementService,
}

impl BillingService {
    pub fn new(payments: Arc<dyn PaymentLedger>, entitlements: EntitlementService) -> Self {
        Self {
            payments,
            entitlements,
        }
    }

    pub async fn confirm_purchase(
        &self,
        payment_id: &str,
        user_id: i64,
        provider: &str,
    ) -> Result<PurchaseOutcome, EventError> {
        // The claim references the user row, so an unknown user is reported before it.
        if self.entitlements.current_status(user_id).await?.is_none() {
            warn!(user_id, payment_id, "Payment from unregistered user");
            return Err(EventError::UnknownUser(user_id));
        }

        if !self.payments.claim(payment_id, user_id, provider).await? {
            warn!(user_id, payment_id, "Duplicate payment confirmation ignored");
            return Ok(PurchaseOutcome::Duplicate);
        }

        match self
            .entitlements
            .grant(user_id, GrantDelta::days(PURCHASE_DAYS))
            .await
        {
            Ok(receipt) => {
                info!(user_id, payment_id, provider, "Purchase applied");
                Ok(PurchaseOutcome::Applied(receipt))
            }
            Err(e) => {
                error!(user_id, payment_id, "Paid grant failed: {}", e);
                if let Err(release) = self.payments.release(payment_id).await {
                    error!(payment_id, "Failed to release payment claim: {:#}", release);
                }
                Err(e.into())
            }
        }
    }
}
