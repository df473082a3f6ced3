use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::models::{ApiResponse, ClientPayload, Inbound, XuiClientEntry};
use super::{ClientSpec, PanelApi, RemoteClient};
use crate::config::PanelConfig;
use crate::error::PanelError;

/// HTTP client for the 3x-ui panel API. The session cookie lives in the
/// client's cookie store and is shared by every clone.
#[derive(Clone)]
pub struct XuiClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
    inbound_id: i64,
}

impl XuiClient {
    pub fn new(config: &PanelConfig) -> Result<Self, PanelError> {
        let client = Client::builder()
            .cookie_store(true)
            .timeout(config.timeout)
            .danger_accept_invalid_certs(!config.tls_verify)
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            inbound_id: config.inbound_id,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn read_envelope<T: DeserializeOwned>(
        response: Response,
    ) -> Result<ApiResponse<T>, PanelError> {
        let status = response.status();
        if !status.is_success() {
            return Err(PanelError::Http {
                status: status.as_u16(),
            });
        }
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| PanelError::Malformed(e.to_string()))
    }

    /// Turns `success = false` into a typed error based on the panel's message.
    fn classify(msg: String) -> PanelError {
        let lower = msg.to_lowercase();
        if lower.contains("not found") || lower.contains("no client") {
            PanelError::NotFound(msg)
        } else if lower.contains("duplicate") || lower.contains("already exist") {
            PanelError::Duplicate(msg)
        } else {
            PanelError::Rejected(msg)
        }
    }

    async fn post_client(&self, path: &str, spec: &ClientSpec) -> Result<(), PanelError> {
        let payload = ClientPayload::single(self.inbound_id, XuiClientEntry::from(spec))
            .map_err(|e| PanelError::Malformed(e.to_string()))?;

        let response = self.client.post(self.url(path)).json(&payload).send().await?;
        let envelope: ApiResponse<serde_json::Value> = Self::read_envelope(response).await?;
        if envelope.success {
            Ok(())
        } else {
            Err(Self::classify(envelope.msg))
        }
    }

    async fn inbound(&self) -> Result<Inbound, PanelError> {
        let path = format!("/panel/api/inbounds/get/{}", self.inbound_id);
        let response = self.client.get(self.url(&path)).send().await?;
        let envelope: ApiResponse<Inbound> = Self::read_envelope(response).await?;
        match (envelope.success, envelope.obj) {
            (true, Some(inbound)) => Ok(inbound),
            (true, None) => Err(PanelError::Malformed("inbound response without obj".into())),
            (false, _) => Err(Self::classify(envelope.msg)),
        }
    }
}

#[async_trait]
impl PanelApi for XuiClient {
    async fn login(&self) -> Result<(), PanelError> {
        let params = [
            ("username", self.username.as_str()),
            ("password", self.password.as_str()),
        ];
        let response = self.client.post(self.url("/login")).form(&params).send().await?;
        let envelope: ApiResponse<serde_json::Value> = Self::read_envelope(response).await?;
        if envelope.success {
            debug!("Panel session refreshed");
            Ok(())
        } else {
            Err(PanelError::Auth(envelope.msg))
        }
    }

    async fn add_client(&self, spec: &ClientSpec) -> Result<(), PanelError> {
        self.post_client("/panel/api/inbounds/addClient", spec).await
    }

    async fn update_client(&self, spec: &ClientSpec) -> Result<(), PanelError> {
        let path = format!("/panel/api/inbounds/updateClient/{}", spec.id);
        self.post_client(&path, spec).await
    }

    async fn find_by_label(&self, label: &str) -> Result<Option<RemoteClient>, PanelError> {
        let inbound = self.inbound().await?;
        let clients = inbound
            .clients()
            .map_err(|e| PanelError::Malformed(format!("inbound {} settings: {}", inbound.id, e)))?;

        Ok(clients
            .into_iter()
            .find(|c| c.email == label)
            .map(|c| RemoteClient {
                id: c.id,
                label: c.email,
                expiry_ms: c.expiry_time,
            }))
    }

    async fn delete_client(&self, client_id: &str) -> Result<(), PanelError> {
        let path = format!(
            "/panel/api/inbounds/{}/delClient/{}",
            self.inbound_id, client_id
        );
        let response = self.client.post(self.url(&path)).send().await?;
        let envelope: ApiResponse<serde_json::Value> = Self::read_envelope(response).await?;
        if envelope.success {
            Ok(())
        } else {
            Err(Self::classify(envelope.msg))
        }
    }
}
