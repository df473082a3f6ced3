use teloxide::prelude::*;
use teloxide::types::{LabeledPrice, ParseMode, PreCheckoutQuery, SuccessfulPayment};
use tracing::{error, info, warn};

use crate::AppState;
use crate::bot::keyboards::back_keyboard;
use crate::bot::messages;
use crate::bot::utils::truncate_html;
use crate::error::{EventError, GrantError};
use crate::services::billing_service::{
    PURCHASE_DAYS, PurchaseOutcome, STARS_PROVIDER, SUBSCRIPTION_PAYLOAD,
};

const STARS_CURRENCY: &str = "XTR";

pub async fn send_subscription_invoice(
    bot: &Bot,
    chat_id: ChatId,
    state: &AppState,
) -> Result<(), teloxide::RequestError> {
    let prices = vec![LabeledPrice {
        label: format!("VPN · {} days", PURCHASE_DAYS),
        amount: state.stars_price,
    }];
    bot.send_invoice(
        chat_id,
        "VPN subscription",
        format!("{} days of VPN access, one device.", PURCHASE_DAYS),
        SUBSCRIPTION_PAYLOAD,
        STARS_CURRENCY,
        prices,
    )
    .await?;
    Ok(())
}

pub async fn pre_checkout_handler(
    bot: Bot,
    q: PreCheckoutQuery,
) -> Result<(), teloxide::RequestError> {
    if q.invoice_payload == SUBSCRIPTION_PAYLOAD && q.currency == STARS_CURRENCY {
        bot.answer_pre_checkout_query(q.id, true).await?;
    } else {
        warn!(
            "Rejecting pre-checkout from {}: payload {:?}, currency {}",
            q.from.id, q.invoice_payload, q.currency
        );
        bot.answer_pre_checkout_query(q.id, false)
            .error_message("Unknown invoice, please start a new purchase.")
            .await?;
    }
    Ok(())
}

pub async fn successful_payment_handler(
    bot: Bot,
    msg: &Message,
    payment: &SuccessfulPayment,
    state: &AppState,
) -> Result<(), teloxide::RequestError> {
    let Some(user_id) = msg.from.as_ref().map(|u| u.id.0 as i64) else {
        return Ok(());
    };
    let charge_id = payment.telegram_payment_charge_id.0.clone();
    info!(
        user_id,
        %charge_id,
        "Stars payment received: {} {}", payment.total_amount, payment.currency
    );

    if payment.invoice_payload != SUBSCRIPTION_PAYLOAD {
        error!(user_id, "Payment with unknown payload {:?}", payment.invoice_payload);
        bot.send_message(
            msg.chat.id,
            "⚠️ Payment received for an unknown item. Please contact support.",
        )
        .await?;
        return Ok(());
    }

    let text = match state
        .billing
        .confirm_purchase(&charge_id, user_id, STARS_PROVIDER)
        .await
    {
        Ok(PurchaseOutcome::Applied(receipt)) => messages::purchase_applied(&receipt),
        Ok(PurchaseOutcome::Duplicate) => "ℹ️ This payment was already processed.".to_string(),
        Err(EventError::UnknownUser(_)) | Err(EventError::Grant(GrantError::UnknownUser(_))) => {
            "❌ Your account was not found. Send /start and contact support with this payment."
                .to_string()
        }
        Err(e) => {
            error!(user_id, %charge_id, "Paid activation failed: {}", e);
            format!(
                "⚠️ Payment received, but activation failed. Please contact support and quote <code>{}</code>.",
                charge_id
            )
        }
    };

    bot.send_message(msg.chat.id, truncate_html(&text))
        .parse_mode(ParseMode::Html)
        .reply_markup(back_keyboard())
        .await?;
    Ok(())
}
