use urlencoding::encode;
use uuid::Uuid;

use crate::config::LinkConfig;
use crate::xui::CLIENT_FLOW;

/// Builds VLESS Reality share links for issued credentials.
#[derive(Debug, Clone)]
pub struct VlessLinkBuilder {
    config: LinkConfig,
}

impl VlessLinkBuilder {
    pub fn new(config: LinkConfig) -> Self {
        Self { config }
    }

    pub fn build(&self, credential_id: Uuid, label: &str) -> String {
        format!(
            "vless://{}@{}:{}?security=reality&encryption=none&pbk={}&fp=chrome&type=tcp&flow={}&sni={}&sid={}#{}",
            credential_id,
            self.config.server_ip,
            self.config.server_port,
            encode(&self.config.public_key),
            CLIENT_FLOW,
            encode(&self.config.sni),
            encode(&self.config.short_id),
            encode(label)
        )
    }
}
