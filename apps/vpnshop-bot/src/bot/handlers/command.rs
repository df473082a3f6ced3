use chrono::Utc;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tracing::{error, info, warn};

use crate::AppState;
use crate::bot::keyboards::{back_keyboard, main_menu};
use crate::bot::messages::{self, SUPPORT_PROMPT};
use crate::bot::utils::{escape_html, format_wait, truncate_html};
use crate::error::{EventError, GrantError};

use super::payment::successful_payment_handler;

async fn reply_html(bot: &Bot, msg: &Message, text: String) -> Result<(), teloxide::RequestError> {
    bot.send_message(msg.chat.id, truncate_html(&text))
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

pub async fn message_handler(
    bot: Bot,
    msg: Message,
    state: AppState,
) -> Result<(), teloxide::RequestError> {
    if let Some(payment) = msg.successful_payment() {
        return successful_payment_handler(bot, &msg, payment, &state).await;
    }

    let Some(from) = msg.from.as_ref() else {
        return Ok(());
    };
    let user_id = from.id.0 as i64;
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let (command, args) = match text.split_once(char::is_whitespace) {
        Some((command, args)) => (command, args.trim()),
        None => (text, ""),
    };
    // Strip the "@botname" suffix of group-style commands.
    let command = command.split('@').next().unwrap_or(command);

    match command {
        "/start" => start(&bot, &msg, &state, args).await,
        "/menu" => show_menu(&bot, &msg, &state, user_id).await,
        "/grant" | "/user" | "/reply" | "/admin" if !state.admin.is_admin(user_id) => Ok(()),
        "/grant" => grant(&bot, &msg, &state, args).await,
        "/user" => lookup(&bot, &msg, &state, args).await,
        "/reply" => {
            let (target, body) = args.split_once(char::is_whitespace).unwrap_or((args, ""));
            match target.parse::<i64>() {
                Ok(target) if !body.trim().is_empty() => {
                    answer_ticket(&bot, &msg, target, body.trim()).await
                }
                _ => reply_html(&bot, &msg, "Usage: /reply &lt;user_id&gt; &lt;text&gt;".into()).await,
            }
        }
        "/admin" => reply_html(&bot, &msg, messages::ADMIN_HELP.to_string()).await,
        _ => handle_reply(&bot, &msg, &state, user_id, text).await,
    }
}

async fn start(
    bot: &Bot,
    msg: &Message,
    state: &AppState,
    token: &str,
) -> Result<(), teloxide::RequestError> {
    let Some(from) = msg.from.as_ref() else {
        return Ok(());
    };
    let user_id = from.id.0 as i64;
    let name = from.full_name();
    let token = (!token.is_empty()).then_some(token);

    match state.referrals.register(user_id, Some(&name), token).await {
        Ok(result) => {
            if result.created {
                info!(user_id, referred_by = ?result.attributed, "New user registered");
            }
        }
        Err(e) => {
            error!(user_id, "Registration failed: {:#}", e);
            bot.send_message(msg.chat.id, "❌ Something went wrong, please try /start again later.")
                .await?;
            return Ok(());
        }
    }

    bot.send_message(msg.chat.id, messages::welcome(&name))
        .parse_mode(ParseMode::Html)
        .reply_markup(main_menu(state.stars_price, state.admin.is_admin(user_id)))
        .await?;
    Ok(())
}

async fn show_menu(
    bot: &Bot,
    msg: &Message,
    state: &AppState,
    user_id: i64,
) -> Result<(), teloxide::RequestError> {
    bot.send_message(msg.chat.id, "👋 Main menu")
        .reply_markup(main_menu(state.stars_price, state.admin.is_admin(user_id)))
        .await?;
    Ok(())
}

async fn grant(
    bot: &Bot,
    msg: &Message,
    state: &AppState,
    args: &str,
) -> Result<(), teloxide::RequestError> {
    let mut parts = args.split_whitespace();
    let (Some(target), Some(days)) = (parts.next(), parts.next().and_then(|d| d.parse::<i64>().ok()))
    else {
        return reply_html(bot, msg, "Usage: /grant &lt;user_id|code&gt; &lt;days&gt;".into()).await;
    };

    let text = match state.admin.adjust(target, days).await {
        Ok(Some(receipt)) => messages::grant_summary(&receipt),
        Ok(None) => "❌ User not found.".to_string(),
        Err(GrantError::OutOfRange { .. }) => {
            warn!(target, days, "Admin grant out of range");
            format!("❌ {} days is out of range.", days)
        }
        Err(e) => {
            error!(target, days, "Admin grant failed: {}", e);
            format!("❌ Grant failed: {}", escape_html(&e.to_string()))
        }
    };
    reply_html(bot, msg, text).await
}

async fn lookup(
    bot: &Bot,
    msg: &Message,
    state: &AppState,
    args: &str,
) -> Result<(), teloxide::RequestError> {
    if args.is_empty() {
        return reply_html(bot, msg, "Usage: /user &lt;user_id|code&gt;".into()).await;
    }
    let text = match state.admin.lookup(args).await {
        Ok(Some(user)) => {
            let payments = state
                .payment_history
                .recent_for_user(user.user_id, 3)
                .await
                .unwrap_or_else(|e| {
                    warn!(user_id = user.user_id, "Payment history unavailable: {:#}", e);
                    Vec::new()
                });
            messages::user_card(&user, &payments, Utc::now())
        }
        Ok(None) => "❌ User not found.".to_string(),
        Err(e) => {
            error!("User lookup failed: {:#}", e);
            "❌ Lookup failed.".to_string()
        }
    };
    reply_html(bot, msg, text).await
}

async fn answer_ticket(
    bot: &Bot,
    msg: &Message,
    target: i64,
    body: &str,
) -> Result<(), teloxide::RequestError> {
    let delivered = bot
        .send_message(ChatId(target), truncate_html(&messages::support_answer(body)))
        .parse_mode(ParseMode::Html)
        .await;
    let text = match delivered {
        Ok(_) => "✅ Sent.",
        Err(e) => {
            warn!(target, "Support answer not delivered: {}", e);
            "❌ Could not deliver the answer."
        }
    };
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

/// Free text only matters as an answer to one of our ForceReply prompts.
async fn handle_reply(
    bot: &Bot,
    msg: &Message,
    state: &AppState,
    user_id: i64,
    text: &str,
) -> Result<(), teloxide::RequestError> {
    let Some(prompt) = msg.reply_to_message().and_then(|m| m.text()) else {
        return show_menu(bot, msg, state, user_id).await;
    };

    if state.admin.is_admin(user_id) {
        if let Some(target) = messages::ticket_user_id(prompt) {
            return answer_ticket(bot, msg, target, text).await;
        }
    }

    if prompt == SUPPORT_PROMPT {
        return submit_ticket(bot, msg, state, user_id, text).await;
    }

    show_menu(bot, msg, state, user_id).await
}

async fn submit_ticket(
    bot: &Bot,
    msg: &Message,
    state: &AppState,
    user_id: i64,
    body: &str,
) -> Result<(), teloxide::RequestError> {
    let ticket = match state.users.claim_support_slot(user_id).await {
        Ok(ticket) => ticket,
        Err(EventError::RateLimited { retry_after }) => {
            bot.send_message(
                msg.chat.id,
                format!(
                    "⏳ You can contact support once per hour. Try again in {}.",
                    format_wait(retry_after)
                ),
            )
            .await?;
            return Ok(());
        }
        Err(EventError::UnknownUser(_)) => {
            bot.send_message(msg.chat.id, "Please send /start first.").await?;
            return Ok(());
        }
        Err(e) => {
            error!(user_id, "Support slot claim failed: {}", e);
            bot.send_message(msg.chat.id, "❌ Could not send your message, try again later.")
                .await?;
            return Ok(());
        }
    };

    let username = msg.from.as_ref().and_then(|u| u.username.as_deref());
    let forwarded = bot
        .send_message(
            ChatId(state.admin.admin_id()),
            truncate_html(&messages::support_ticket(user_id, username, body)),
        )
        .parse_mode(ParseMode::Html)
        .await;

    match forwarded {
        Ok(_) => {
            info!(user_id, "Support ticket forwarded");
            bot.send_message(
                msg.chat.id,
                "✅ <b>Sent!</b> An administrator will answer you here soon.",
            )
            .parse_mode(ParseMode::Html)
            .reply_markup(back_keyboard())
            .await?;
        }
        Err(e) => {
            error!(user_id, "Failed to forward support ticket: {}", e);
            if let Err(e) = state.users.release(ticket).await {
                error!(user_id, "Failed to release support cooldown: {:#}", e);
            }
            bot.send_message(msg.chat.id, "❌ Could not send your message, try again later.")
                .await?;
        }
    }
    Ok(())
}
