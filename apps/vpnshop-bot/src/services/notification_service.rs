use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use teloxide::prelude::*;
use teloxide::types::ParseMode;

use crate::bot::keyboards::renew_keyboard;
use crate::bot::utils::truncate_html;

/// Unsolicited messages the services push to users.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    NewReferral { referral_count: i32 },
    ReferralReward { days: i64, new_expiry: DateTime<Utc> },
    SubscriptionExpired,
}

impl Notice {
    pub fn render(&self) -> String {
        match self {
            Notice::NewReferral { referral_count } => format!(
                "🎉 <b>New referral!</b>\n\nSomeone joined using your link. You now have <b>{}</b> referral(s).",
                referral_count
            ),
            Notice::ReferralReward { days, new_expiry } => format!(
                "🎁 <b>Referral bonus!</b>\n\n+{} days added. Your access is valid until <b>{}</b>.",
                days,
                new_expiry.format("%Y-%m-%d %H:%M UTC")
            ),
            Notice::SubscriptionExpired => {
                "⌛ <b>Your VPN subscription has expired.</b>\n\nRenew now to restore access.".to_string()
            }
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user_id: i64, notice: Notice) -> Result<()>;
}

/// Delivers notices as Telegram messages.
#[derive(Clone)]
pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, user_id: i64, notice: Notice) -> Result<()> {
        let request = self
            .bot
            .send_message(ChatId(user_id), truncate_html(&notice.render()))
            .parse_mode(ParseMode::Html);

        let request = match notice {
            Notice::SubscriptionExpired => request.reply_markup(renew_keyboard()),
            _ => request,
        };

        request
            .await
            .with_context(|| format!("Failed to deliver notice to {}", user_id))?;
        Ok(())
    }
}
