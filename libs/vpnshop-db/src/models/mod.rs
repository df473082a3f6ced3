pub mod payment;
pub mod user;
