use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

pub const CB_START: &str = "start";
pub const CB_BUY: &str = "buy_stars";
pub const CB_PROFILE: &str = "profile";
pub const CB_SHOW_KEY: &str = "show_key";
pub const CB_BONUS: &str = "daily_bonus";
pub const CB_SUPPORT: &str = "support";
pub const CB_ADMIN_HELP: &str = "admin_help";

pub fn main_menu(stars_price: u32, is_admin: bool) -> InlineKeyboardMarkup {
    let mut rows = vec![
        vec![InlineKeyboardButton::callback(
            format!("⚡️ Buy VPN (30 days · {} ⭐️)", stars_price),
            CB_BUY,
        )],
        vec![
            InlineKeyboardButton::callback("👤 Profile", CB_PROFILE),
            InlineKeyboardButton::callback("🎁 Daily Bonus", CB_BONUS),
        ],
        vec![InlineKeyboardButton::callback("🆘 Support", CB_SUPPORT)],
    ];
    if is_admin {
        rows.push(vec![InlineKeyboardButton::callback("🛠 Admin", CB_ADMIN_HELP)]);
    }
    InlineKeyboardMarkup::new(rows)
}

pub fn profile_keyboard(active: bool) -> InlineKeyboardMarkup {
    let mut rows = Vec::new();
    if active {
        rows.push(vec![InlineKeyboardButton::callback("🔑 Show Key", CB_SHOW_KEY)]);
    }
    rows.push(vec![InlineKeyboardButton::callback("⚡️ Extend", CB_BUY)]);
    rows.push(vec![InlineKeyboardButton::callback("🔙 Back", CB_START)]);
    InlineKeyboardMarkup::new(rows)
}

pub fn renew_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "⚡️ Renew",
        CB_BUY,
    )]])
}

pub fn back_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "🔙 Back", CB_START,
    )]])
}
