//! Keyboard builders shared by the handlers.

use crate::data::models::Price;
use crate::telegram::{
    InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, ReplyKeyboardMarkup, ReplyMarkup,
};

pub const MENU_COMPARE: &str = "🔍 Сравнение карточек";
pub const MENU_BALANCE: &str = "💰 Баланс";

/// Persistent reply keyboard shown under the input field.
pub fn main_menu() -> ReplyMarkup {
    ReplyMarkup::Reply(ReplyKeyboardMarkup {
        keyboard: vec![
            vec![KeyboardButton {
                text: MENU_COMPARE.to_string(),
            }],
            vec![KeyboardButton {
                text: MENU_BALANCE.to_string(),
            }],
        ],
        resize_keyboard: true,
    })
}

fn purchase_rows(first_label: String, packet: &Price) -> Vec<Vec<InlineKeyboardButton>> {
    vec![
        vec![InlineKeyboardButton::callback(first_label, "buy_single")],
        vec![InlineKeyboardButton::callback(
            format!(
                "📦 Пакет ({} отчетов) - {} ₽",
                packet.reports_amount, packet.price
            ),
            "buy_packet",
        )],
        vec![InlineKeyboardButton::callback("❌ Отменить", "cancel_refill")],
    ]
}

/// Purchase options under the balance view.
pub fn balance_options(single: &Price, packet: &Price) -> ReplyMarkup {
    ReplyMarkup::Inline(InlineKeyboardMarkup {
        inline_keyboard: purchase_rows(format!("📄 1 отчет - {} ₽", single.price), packet),
    })
}

/// Purchase options under the refill prompt (same rows, longer first label).
pub fn refill_options(single: &Price, packet: &Price) -> ReplyMarkup {
    ReplyMarkup::Inline(InlineKeyboardMarkup {
        inline_keyboard: purchase_rows(format!("📄 Один отчет - {} ₽", single.price), packet),
    })
}

pub fn payment_link(url: &str) -> ReplyMarkup {
    ReplyMarkup::Inline(InlineKeyboardMarkup {
        inline_keyboard: vec![
            vec![InlineKeyboardButton::link("💳 Оплатить", url)],
            vec![InlineKeyboardButton::callback("❌ Отменить", "cancel_refill")],
        ],
    })
}

pub fn admin_groups() -> ReplyMarkup {
    ReplyMarkup::Inline(InlineKeyboardMarkup {
        inline_keyboard: vec![
            vec![InlineKeyboardButton::callback(
                "👤 Без отчетов",
                "admin_group:no_activity",
            )],
            vec![InlineKeyboardButton::callback(
                "📄 Использовали пробный",
                "admin_group:used_trial",
            )],
            vec![InlineKeyboardButton::callback(
                "💳 Купили 1 отчет",
                "admin_group:bought_single",
            )],
            vec![InlineKeyboardButton::callback(
                "❌ Выйти из админки",
                "admin_exit",
            )],
        ],
    })
}

pub fn admin_entering() -> ReplyMarkup {
    ReplyMarkup::Inline(InlineKeyboardMarkup {
        inline_keyboard: vec![
            vec![InlineKeyboardButton::callback(
                "⬅️ Назад к выбору группы",
                "admin_back_to_groups",
            )],
            vec![InlineKeyboardButton::callback(
                "❌ Выйти из админки",
                "admin_exit",
            )],
        ],
    })
}

pub fn admin_confirm() -> ReplyMarkup {
    ReplyMarkup::Inline(InlineKeyboardMarkup {
        inline_keyboard: vec![
            vec![InlineKeyboardButton::callback(
                "✅ Подтвердить отправку",
                "admin_confirm",
            )],
            vec![InlineKeyboardButton::callback("❌ Отменить", "admin_cancel")],
        ],
    })
}
