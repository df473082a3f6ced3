pub mod admin_service;
pub mod billing_service;
pub mod bonus_service;
pub mod credential_store;
pub mod entitlement_service;
pub mod expiry_sweeper;
pub mod link_service;
pub mod notification_service;
pub mod referral_service;
pub mod user_service;

#[cfg(test)]
pub(crate) mod testing;
