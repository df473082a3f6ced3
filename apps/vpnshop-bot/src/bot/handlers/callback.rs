use chrono::Utc;
use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, ForceReply, ParseMode};
use tracing::{error, info, warn};

use crate::AppState;
use crate::bot::keyboards::{
    CB_ADMIN_HELP, CB_BONUS, CB_BUY, CB_PROFILE, CB_SHOW_KEY, CB_START, CB_SUPPORT, back_keyboard,
    main_menu, profile_keyboard,
};
use crate::bot::messages::{self, SUPPORT_PROMPT};
use crate::bot::utils::{format_wait, truncate_html};
use crate::error::EventError;

use super::payment::send_subscription_invoice;

pub async fn callback_handler(
    bot: Bot,
    q: CallbackQuery,
    state: AppState,
) -> Result<(), teloxide::RequestError> {
    let callback_id = q.id.clone();
    let user_id = q.from.id.0 as i64;
    let Some(data) = q.data.as_deref() else {
        return Ok(());
    };
    let Some(chat_id) = q.message.as_ref().map(|m| m.chat().id) else {
        bot.answer_callback_query(callback_id).await?;
        return Ok(());
    };
    info!(user_id, data, "Callback received");

    match data {
        CB_START => {
            bot.answer_callback_query(callback_id).await?;
            if let Some(msg) = &q.message {
                let _ = bot.delete_message(msg.chat().id, msg.id()).await;
            }
            bot.send_message(chat_id, "👋 Main menu")
                .reply_markup(main_menu(state.stars_price, state.admin.is_admin(user_id)))
                .await?;
        }

        CB_BUY => {
            bot.answer_callback_query(callback_id).await?;
            if let Err(e) = send_subscription_invoice(&bot, chat_id, &state).await {
                error!(user_id, "Failed to send Stars invoice: {}", e);
                bot.send_message(chat_id, "❌ Could not create an invoice, try again later.")
                    .await?;
            }
        }

        CB_PROFILE => {
            let user = state.users.find(user_id).await;
            let status = state.entitlements.current_status(user_id).await;
            match (user, status) {
                (Ok(Some(user)), Ok(Some(status))) => {
                    bot.answer_callback_query(callback_id).await?;
                    let text = messages::profile(&user, &status, &state.bot_username, Utc::now());
                    bot.send_message(chat_id, truncate_html(&text))
                        .parse_mode(ParseMode::Html)
                        .reply_markup(profile_keyboard(status.active))
                        .await?;
                }
                (Ok(None), _) | (_, Ok(None)) => {
                    bot.answer_callback_query(callback_id)
                        .text("Please send /start first.")
                        .show_alert(true)
                        .await?;
                }
                (Err(e), _) | (_, Err(e)) => {
                    error!(user_id, "Profile lookup failed: {:#}", e);
                    bot.answer_callback_query(callback_id)
                        .text("❌ Data error, try again later.")
                        .show_alert(true)
                        .await?;
                }
            }
        }

        CB_SHOW_KEY => match state.entitlements.current_status(user_id).await {
            Ok(Some(status)) => match status.credential_link.as_deref() {
                Some(link) => {
                    bot.answer_callback_query(callback_id).await?;
                    bot.send_message(chat_id, truncate_html(&messages::key(link, status.expiry_at)))
                        .parse_mode(ParseMode::Html)
                        .reply_markup(back_keyboard())
                        .await?;
                }
                None => {
                    let text = if status.expiry_at.is_some() {
                        "❌ Your subscription has expired."
                    } else {
                        "❌ You have no active key."
                    };
                    bot.answer_callback_query(callback_id)
                        .text(text)
                        .show_alert(true)
                        .await?;
                }
            },
            Ok(None) => {
                bot.answer_callback_query(callback_id)
                    .text("Please send /start first.")
                    .show_alert(true)
                    .await?;
            }
            Err(e) => {
                error!(user_id, "Key lookup failed: {:#}", e);
                bot.answer_callback_query(callback_id)
                    .text("❌ Data error, try again later.")
                    .show_alert(true)
                    .await?;
            }
        },

        CB_BONUS => match state.bonus.claim_daily(user_id).await {
            Ok(award) => {
                bot.answer_callback_query(callback_id).await?;
                bot.send_message(chat_id, messages::bonus_awarded(award.hours, &award.receipt))
                    .parse_mode(ParseMode::Html)
                    .reply_markup(back_keyboard())
                    .await?;
            }
            Err(EventError::RateLimited { retry_after }) => {
                bot.answer_callback_query(callback_id)
                    .text(format!(
                        "⏳ Next bonus available in {}.",
                        format_wait(retry_after)
                    ))
                    .show_alert(true)
                    .await?;
            }
            Err(EventError::UnknownUser(_)) => {
                bot.answer_callback_query(callback_id)
                    .text("Please send /start first.")
                    .show_alert(true)
                    .await?;
            }
            Err(e) => {
                warn!(user_id, "Daily bonus failed: {}", e);
                bot.answer_callback_query(callback_id)
                    .text("❌ The VPN server is not responding, try again later.")
                    .show_alert(true)
                    .await?;
            }
        },

        CB_SUPPORT => match state.users.support_wait(user_id).await {
            Ok(Some(wait)) => {
                bot.answer_callback_query(callback_id)
                    .text(format!(
                        "⏳ You can contact support once per hour. Try again in {}.",
                        format_wait(wait)
                    ))
                    .show_alert(true)
                    .await?;
            }
            Ok(None) => {
                bot.answer_callback_query(callback_id).await?;
                bot.send_message(chat_id, SUPPORT_PROMPT)
                    .reply_markup(ForceReply::new().selective())
                    .await?;
            }
            Err(e) => {
                error!(user_id, "Support cooldown check failed: {:#}", e);
                bot.answer_callback_query(callback_id)
                    .text("❌ Data error, try again later.")
                    .show_alert(true)
                    .await?;
            }
        },

        CB_ADMIN_HELP if state.admin.is_admin(user_id) => {
            bot.answer_callback_query(callback_id).await?;
            bot.send_message(chat_id, messages::ADMIN_HELP)
                .parse_mode(ParseMode::Html)
                .await?;
        }

        other => {
            warn!(user_id, "Unknown callback data: {}", other);
            bot.answer_callback_query(callback_id).await?;
        }
    }

    Ok(())
}
