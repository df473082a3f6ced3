use serde::{Deserialize, Serialize};

use super::{CLIENT_FLOW, ClientSpec};

/// Envelope every 3x-ui API endpoint answers with.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default)]
    pub msg: String,
    pub obj: Option<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XuiClientEntry {
    pub id: String,
    #[serde(default)]
    pub flow: String,
    pub email: String,
    #[serde(default)]
    pub limit_ip: u32,
    #[serde(rename = "totalGB", default)]
    pub total_gb: u64,
    #[serde(default)]
    pub expiry_time: i64,
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub tg_id: String,
    #[serde(default)]
    pub sub_id: String,
}

impl From<&ClientSpec> for XuiClientEntry {
    fn from(spec: &ClientSpec) -> Self {
        Self {
            id: spec.id.to_string(),
            flow: CLIENT_FLOW.to_string(),
            email: spec.label.clone(),
            limit_ip: spec.connection_limit,
            total_gb: spec.data_cap_bytes,
            expiry_time: spec.expiry_ms,
            enable: spec.enable,
            tg_id: String::new(),
            sub_id: String::new(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct InboundSettings {
    #[serde(default)]
    pub clients: Vec<XuiClientEntry>,
}

/// Body of `addClient` / `updateClient`. `settings` is JSON encoded as a string.
#[derive(Debug, Serialize)]
pub struct ClientPayload {
    pub id: i64,
    pub settings: String,
}

impl ClientPayload {
    pub fn single(inbound_id: i64, entry: XuiClientEntry) -> serde_json::Result<Self> {
        let settings = serde_json::to_string(&InboundSettings {
            clients: vec![entry],
        })?;
        Ok(Self {
            id: inbound_id,
            settings,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct Inbound {
    pub id: i64,
    #[serde(default)]
    pub settings: String,
}

impl Inbound {
    pub fn clients(&self) -> serde_json::Result<Vec<XuiClientEntry>> {
        if self.settings.trim().is_empty() {
            return Ok(Vec::new());
        }
        let parsed: InboundSettings = serde_json::from_str(&self.settings)?;
        Ok(parsed.clients)
    }
}
