//! 3x-ui panel access: the `PanelApi` capability and its HTTP implementation.

pub mod client;
pub mod models;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::PanelError;

pub use client::XuiClient;

pub const CLIENT_FLOW: &str = "xtls-rprx-vision";
pub const BYTES_PER_GB: u64 = 1024 * 1024 * 1024;

/// Desired state of one panel client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSpec {
    pub id: Uuid,
    pub label: String,
    pub expiry_ms: i64,
    pub data_cap_bytes: u64,
    pub connection_limit: u32,
    pub enable: bool,
}

/// A client as currently stored on the panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteClient {
    pub id: String,
    pub label: String,
    pub expiry_ms: i64,
}

#[async_trait]
pub trait PanelApi: Send + Sync {
    /// (Re)establishes the panel session. Safe to call before every request.
    async fn login(&self) -> Result<(), PanelError>;

    async fn add_client(&self, spec: &ClientSpec) -> Result<(), PanelError>;

    async fn update_client(&self, spec: &ClientSpec) -> Result<(), PanelError>;

    async fn find_by_label(&self, label: &str) -> Result<Option<RemoteClient>, PanelError>;

    async fn delete_client(&self, client_id: &str) -> Result<(), PanelError>;
}
