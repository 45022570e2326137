//! Клавиатуры ботов: inline и постоянные reply-кнопки.

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup};
use url::Url;

use crate::db::PlanRecord;

pub const BTN_USER_PREMIUM: &str = "💎 Премиум";
pub const BTN_USER_STATUS: &str = "📊 Мой статус";
pub const BTN_USER_HELP: &str = "❓ Помощь";

pub fn user_menu() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        vec![
            KeyboardButton::new(BTN_USER_PREMIUM),
            KeyboardButton::new(BTN_USER_STATUS),
        ],
        vec![KeyboardButton::new(BTN_USER_HELP)],
    ])
    .resize_keyboard()
    .persistent()
}

fn url_button(label: &str, url: &str) -> InlineKeyboardButton {
    match Url::parse(url) {
        Ok(parsed) => InlineKeyboardButton::url(label.to_string(), parsed),
        // Кривой URL из настроек не должен ронять обработчик.
        Err(_) => InlineKeyboardButton::callback(label.to_string(), "close"),
    }
}

pub fn verify_keyboard(short_url: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::default()
        .append_row(vec![url_button("🔓 Пройти проверку", short_url)])
        .append_row(vec![InlineKeyboardButton::callback(
            "💎 Купить премиум",
            "getpremium",
        )])
}

pub fn try_again_keyboard(get_link: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::default()
        .append_row(vec![url_button("🔁 Попробовать снова", get_link)])
}

pub fn redelivery_keyboard(click_link: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::default()
        .append_row(vec![url_button("📥 Получить файл ещё раз", click_link)])
}

pub fn join_channel_keyboard(channel: &str) -> InlineKeyboardMarkup {
    let username = channel.trim_start_matches('@');
    InlineKeyboardMarkup::default().append_row(vec![url_button(
        "📢 Подписаться на канал",
        &format!("https://t.me/{}", username),
    )])
}

pub fn plans_keyboard(plans: &[PlanRecord]) -> InlineKeyboardMarkup {
    let mut kb = InlineKeyboardMarkup::default();
    for plan in plans {
        kb = kb.append_row(vec![InlineKeyboardButton::callback(
            format!("{} — {} дн. за ₹{:.2}", plan.name, plan.days, plan.price),
            format!("buyplan:{}", plan.plan_id),
        )]);
    }
    kb.append_row(vec![InlineKeyboardButton::callback("✖️ Закрыть", "close")])
}

pub fn order_keyboard(order_id: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::default()
        .append_row(vec![InlineKeyboardButton::callback(
            "✅ Я оплатил",
            format!("verifyorder:{}", order_id),
        )])
        .append_row(vec![InlineKeyboardButton::callback("✖️ Закрыть", "close")])
}
