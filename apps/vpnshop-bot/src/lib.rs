pub mod bot;
pub mod config;
pub mod error;
pub mod services;
pub mod state;
pub mod xui;

pub use state::AppState;
