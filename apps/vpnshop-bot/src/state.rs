use std::sync::Arc;

use vpnshop_db::repositories::payment_repo::PaymentRepository;

use crate::services::admin_service::AdminService;
use crate::services::billing_service::BillingService;
use crate::services::bonus_service::BonusService;
use crate::services::entitlement_service::EntitlementService;
use crate::services::referral_service::ReferralService;
use crate::services::user_service::UserService;

#[derive(Clone)]
pub struct AppState {
    pub users: UserService,
    pub entitlements: EntitlementService,
    pub referrals: ReferralService,
    pub bonus: BonusService,
    pub billing: BillingService,
    pub admin: AdminService,
    pub payment_history: PaymentRepository,
    pub stars_price: u32,
    /// Filled in once the bot identity is known.
    pub bot_username: Arc<str>,
}
