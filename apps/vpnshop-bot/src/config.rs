use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

/// Runtime configuration, read from the environment (and `.env` via dotenvy).
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub bot_token: String,
    pub database_url: String,
    pub database_max_connections: u32,
    pub admin_id: i64,
    pub panel: PanelConfig,
    pub link: LinkConfig,
    pub sweep_interval: Duration,
    pub stars_price: u32,
}

#[derive(Debug, Clone)]
pub struct PanelConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    pub inbound_id: i64,
    pub tls_verify: bool,
    pub timeout: Duration,
    pub data_cap_gb: u64,
}

/// Parameters of the VLESS Reality inbound baked into user links.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub server_ip: String,
    pub server_port: u16,
    pub public_key: String,
    pub sni: String,
    pub short_id: String,
}

fn required(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("{} is not set", key))
}

fn parsed_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} has an invalid value: {}", key, raw)),
        Err(_) => Ok(default),
    }
}

fn flag_or(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

impl BotConfig {
    pub fn from_env() -> Result<Self> {
        let admin_id = required("ADMIN_ID")?
            .trim()
            .parse()
            .context("ADMIN_ID must be a numeric Telegram id")?;
        let inbound_id = required("INBOUND_ID")?
            .trim()
            .parse()
            .context("INBOUND_ID must be numeric")?;
        let server_port = required("SERVER_PORT")?
            .trim()
            .parse()
            .context("SERVER_PORT must be a port number")?;

        Ok(Self {
            bot_token: required("BOT_TOKEN")?,
            database_url: required("DATABASE_URL")?,
            database_max_connections: parsed_or("DATABASE_MAX_CONNECTIONS", 10)?,
            admin_id,
            panel: PanelConfig {
                url: required("PANEL_URL")?.trim_end_matches('/').to_string(),
                username: required("PANEL_USERNAME")?,
                password: required("PANEL_PASSWORD")?,
                inbound_id,
                tls_verify: flag_or("PANEL_TLS_VERIFY", false),
                timeout: Duration::from_secs(parsed_or("PANEL_TIMEOUT_SECS", 15)?),
                data_cap_gb: parsed_or("CLIENT_LIMIT_GB", 75)?,
            },
            link: LinkConfig {
                server_ip: required("SERVER_IP")?,
                server_port,
                public_key: required("REALITY_PK")?,
                sni: required("SNI")?,
                short_id: required("SID")?,
            },
            sweep_interval: Duration::from_secs(parsed_or("SWEEP_INTERVAL_SECS", 300)?),
            stars_price: parsed_or("STARS_PRICE", 100)?,
        })
    }
}
