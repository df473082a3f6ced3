//! HTML texts shown by the handlers.

use chrono::{DateTime, Utc};
use vpnshop_db::models::payment::ProcessedPayment;
use vpnshop_db::models::user::{EntitlementState, UserEntitlement};

use super::utils::escape_html;
use crate::services::credential_store::RemoteOutcome;
use crate::services::entitlement_service::{EntitlementStatus, GrantReceipt};

pub const SUPPORT_PROMPT: &str = "📝 Support: describe your problem in one reply to this message.";
pub const TICKET_HEADER: &str = "📩 Ticket #";

pub fn format_time(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M UTC").to_string()
}

pub fn referral_link(bot_username: &str, public_code: &str) -> String {
    format!("https://t.me/{}?start={}", bot_username, public_code)
}

pub fn welcome(name: &str) -> String {
    format!(
        "👋 <b>Hello, {}!</b>\n\nFast VPN access, paid with Telegram Stars.\nUse the menu below.",
        escape_html(name)
    )
}

pub fn profile(
    user: &UserEntitlement,
    status: &EntitlementStatus,
    bot_username: &str,
    now: DateTime<Utc>,
) -> String {
    let access = match (status.active, status.expiry_at) {
        (true, Some(expiry)) => format!(
            "✅ Active until <b>{}</b> ({} days left)",
            format_time(expiry),
            status.days_left(now)
        ),
        (false, Some(expiry)) => format!("❌ Expired on {}", format_time(expiry)),
        (_, None) => "❌ No subscription yet".to_string(),
    };
    format!(
        "👤 <b>Profile</b>\n\nID: <code>{}</code>\nCode: <code>{}</code>\n{}\n\n👥 Referrals: <b>{}</b>\n🔗 Invite link:\n{}",
        user.user_id,
        user.public_code,
        access,
        user.referral_count,
        referral_link(bot_username, &user.public_code)
    )
}

pub fn key(link: &str, expiry: Option<DateTime<Utc>>) -> String {
    let until = expiry.map(format_time).unwrap_or_default();
    format!(
        "🔑 <b>Your VPN key</b> (valid until {})\n\n<code>{}</code>\n\nImport it into v2rayNG, Hiddify, Streisand or any VLESS client.",
        until,
        escape_html(link)
    )
}

pub fn purchase_applied(receipt: &GrantReceipt) -> String {
    let mut text = format!(
        "✅ <b>Payment received!</b>\n\nAccess is valid until <b>{}</b>.",
        format_time(receipt.new_expiry)
    );
    if let Some(link) = &receipt.credential_link {
        text.push_str(&format!("\n\n🔑 Your key:\n<code>{}</code>", escape_html(link)));
    }
    text
}

pub fn bonus_awarded(hours: i64, receipt: &GrantReceipt) -> String {
    format!(
        "🎁 <b>Daily bonus: +{} hours!</b>\n\nAccess is valid until <b>{}</b>.",
        hours,
        format_time(receipt.new_expiry)
    )
}

pub fn support_ticket(user_id: i64, username: Option<&str>, body: &str) -> String {
    let from = username
        .map(|u| format!("@{}", escape_html(u)))
        .unwrap_or_else(|| "no username".to_string());
    format!(
        "{}{}\nFrom: {} (ID: <code>{}</code>)\n\n{}\n\n<i>Reply to this message or use /reply {} &lt;text&gt;</i>",
        TICKET_HEADER,
        user_id,
        from,
        user_id,
        escape_html(body),
        user_id
    )
}

/// Extracts the user id from a ticket forwarded to the admin.
pub fn ticket_user_id(ticket_text: &str) -> Option<i64> {
    let rest = ticket_text.strip_prefix(TICKET_HEADER)?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

pub fn support_answer(body: &str) -> String {
    format!("👨‍💻 <b>Support reply:</b>\n\n{}", escape_html(body))
}

pub fn grant_summary(receipt: &GrantReceipt) -> String {
    let remote = match receipt.remote {
        Some(RemoteOutcome::Created) => "credential created",
        Some(RemoteOutcome::Updated) => "credential updated",
        Some(RemoteOutcome::Repaired) => "credential repaired",
        Some(RemoteOutcome::Recreated) => "credential recreated",
        None => "no remote change",
    };
    let previous = receipt
        .previous_expiry
        .map(format_time)
        .unwrap_or_else(|| "never".to_string());
    format!(
        "✅ User <code>{}</code>: {} → <b>{}</b> ({})",
        receipt.user_id,
        previous,
        format_time(receipt.new_expiry),
        remote
    )
}

pub fn user_card(user: &UserEntitlement, payments: &[ProcessedPayment], now: DateTime<Utc>) -> String {
    let state = match user.state_at(now) {
        EntitlementState::NeverEntitled => "never subscribed",
        EntitlementState::Active => "active",
        EntitlementState::ExpiredUnnotified => "expired (notice pending)",
        EntitlementState::ExpiredNotified => "expired (notified)",
    };
    let mut text = format!(
        "👤 <b>{}</b>\nID: <code>{}</code>\nCode: <code>{}</code>\nState: {}\nExpiry: {}\nCredential: {}\nReferrals: {}\nReferred by: {}\nJoined: {}",
        escape_html(user.display_name.as_deref().unwrap_or("-")),
        user.user_id,
        user.public_code,
        state,
        user.expiry_at.map(format_time).unwrap_or_else(|| "-".to_string()),
        user.credential_id
            .map(|id| format!("<code>{}</code>", id))
            .unwrap_or_else(|| "-".to_string()),
        user.referral_count,
        user.referred_by
            .map(|id| format!("<code>{}</code>", id))
            .unwrap_or_else(|| "-".to_string()),
        format_time(user.created_at)
    );
    if !payments.is_empty() {
        text.push_str("\n\n💳 <b>Recent payments</b>");
        for payment in payments {
            text.push_str(&format!(
                "\n{} · {} · <code>{}</code>",
                format_time(payment.created_at),
                escape_html(&payment.provider),
                escape_html(&payment.payment_id)
            ));
        }
    }
    text
}

pub const ADMIN_HELP: &str = "🛠 <b>Admin commands</b>\n\n\
/grant &lt;user_id|code&gt; &lt;days&gt; · add or remove days (0 expires now)\n\
/user &lt;user_id|code&gt; · show a user\n\
/reply &lt;user_id&gt; &lt;text&gt; · answer a support ticket";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticket_id_round_trips_through_header() {
        let ticket = support_ticket(4242, Some("alice"), "it <broke>");
        assert_eq!(ticket_user_id(&ticket), Some(4242));
        assert!(ticket.contains("it &lt;broke&gt;"));
        assert_eq!(ticket_user_id("hello"), None);
    }

    #[test]
    fn referral_link_uses_public_code() {
        assert_eq!(
            referral_link("shop_bot", "AB12CD34E"),
            "https://t.me/shop_bot?start=AB12CD34E"
        );
    }
}
