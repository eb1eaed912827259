//! Admin broadcast panel: pick a user segment, draft a message, confirm, send.
//!
//! Dialog state lives in [`Bot::dialogs`] keyed by the admin's Telegram id, so
//! a restart drops any half-finished draft. Broadcast text is sent verbatim
//! (admins may use HTML formatting).

use std::time::Duration;

use anyhow::Result;
use governor::{Quota, RateLimiter};
use sqlx::PgPool;
use tracing::{info, warn};

use crate::bot::{Bot, keyboards};
use crate::data::models::User;
use crate::data::users;
use crate::telegram::{CallbackQuery, Message};

// Pacing between broadcast sends; Telegram throttles bots past ~30 msg/sec.
const SEND_PAUSE: Duration = Duration::from_millis(50);

/// Target audience for a broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    NoActivity,
    UsedTrial,
    BoughtSingle,
}

impl Segment {
    pub fn parse(key: &str) -> Option<Self> {
        match key {
            "no_activity" => Some(Self::NoActivity),
            "used_trial" => Some(Self::UsedTrial),
            "bought_single" => Some(Self::BoughtSingle),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::NoActivity => "Нажали /start, но не сделали ни одного отчета",
            Self::UsedTrial => "Использовали пробный отчет, но не покупали",
            Self::BoughtSingle => "Купили ровно один отчет",
        }
    }

    pub async fn user_ids(self, pool: &PgPool) -> Result<Vec<i64>> {
        match self {
            Self::NoActivity => users::segment_no_activity(pool).await,
            Self::UsedTrial => users::segment_used_trial(pool).await,
            Self::BoughtSingle => users::segment_bought_single(pool).await,
        }
    }
}

/// Where the admin currently is in the broadcast flow.
#[derive(Debug, Clone)]
pub enum AdminDialog {
    ChoosingGroup,
    EnteringMessage { segment: Segment },
    Confirming { segment: Segment, text: String },
}

fn current_dialog(bot: &Bot, user_id: i64) -> Option<AdminDialog> {
    bot.dialogs.get(&user_id).map(|entry| entry.value().clone())
}

/// `/admin` entry point.
pub async fn panel(bot: &Bot, message: &Message, user: &User) -> Result<()> {
    let chat_id = message.chat.id;
    if !bot.state.config.is_admin(user.id) {
        warn!(user_id = user.id, "admin panel denied");
        bot.state
            .telegram
            .send_message(chat_id, "🚫 Админ-панель недоступна.", None)
            .await?;
        return Ok(());
    }
    info!(user_id = user.id, "admin panel opened");
    bot.dialogs.insert(user.id, AdminDialog::ChoosingGroup);
    bot.state
        .telegram
        .send_message(
            chat_id,
            "🔧 <b>Админ-панель</b>\n\n\
             Вы можете отправить сообщение определённой группе пользователей.\n\
             Выберите группу:",
            Some(keyboards::admin_groups()),
        )
        .await?;
    Ok(())
}

/// `admin_group:<key>` callback.
pub async fn group_selected(
    bot: &Bot,
    callback: &CallbackQuery,
    chat_id: i64,
    key: &str,
) -> Result<()> {
    let telegram = &bot.state.telegram;
    if !matches!(
        current_dialog(bot, callback.from.id),
        Some(AdminDialog::ChoosingGroup)
    ) {
        telegram.answer_callback_query(&callback.id, None, false).await?;
        return Ok(());
    }
    let Some(segment) = Segment::parse(key) else {
        telegram
            .answer_callback_query(&callback.id, Some("Неизвестная группа"), true)
            .await?;
        return Ok(());
    };
    telegram.answer_callback_query(&callback.id, None, false).await?;

    let count = segment.user_ids(&bot.state.db_pool).await?.len();
    bot.dialogs
        .insert(callback.from.id, AdminDialog::EnteringMessage { segment });
    let text = format!(
        "📝 <b>Группа:</b> {}\n\
         👥 <b>Пользователей в группе:</b> {count}\n\n\
         Введите сообщение, которое хотите отправить всем пользователям этой группы:",
        segment.label()
    );
    telegram
        .send_message(chat_id, &text, Some(keyboards::admin_entering()))
        .await?;
    Ok(())
}

/// Draft text arrived while the dialog sits in `EnteringMessage`.
pub async fn message_entered(
    bot: &Bot,
    message: &Message,
    user: &User,
    segment: Segment,
) -> Result<()> {
    let text = message.text.as_deref().unwrap_or("").trim().to_string();
    info!(
        user_id = user.id,
        group = segment.label(),
        chars = text.len(),
        "broadcast draft received"
    );
    bot.dialogs.insert(
        user.id,
        AdminDialog::Confirming {
            segment,
            text: text.clone(),
        },
    );
    let preview = format!(
        "📨 <b>Предпросмотр сообщения:</b>\n\n\
         {text}\n\n\
         Подтверждаете отправку этого сообщения?"
    );
    bot.state
        .telegram
        .send_message(message.chat.id, &preview, Some(keyboards::admin_confirm()))
        .await?;
    Ok(())
}

/// `admin_confirm` callback: run the broadcast.
pub async fn confirm(bot: &Bot, callback: &CallbackQuery, chat_id: i64) -> Result<()> {
    let telegram = &bot.state.telegram;
    let Some(AdminDialog::Confirming { segment, text }) = current_dialog(bot, callback.from.id)
    else {
        telegram.answer_callback_query(&callback.id, None, false).await?;
        return Ok(());
    };
    telegram.answer_callback_query(&callback.id, None, false).await?;

    let sending = format!(
        "⏳ Отправка сообщения группе <b>{}</b>...\n\
         Пожалуйста, подождите.",
        segment.label()
    );
    telegram.send_message(chat_id, &sending, None).await?;

    let ids = segment.user_ids(&bot.state.db_pool).await?;
    if ids.is_empty() {
        bot.dialogs.remove(&callback.from.id);
        telegram
            .send_message(
                chat_id,
                "ℹ️ В выбранной группе нет пользователей. Рассылка не выполнена.",
                None,
            )
            .await?;
        return Ok(());
    }

    info!(group = segment.label(), recipients = ids.len(), "broadcast started");
    let limiter = RateLimiter::direct(Quota::with_period(SEND_PAUSE).expect("non-zero period"));
    let (mut sent, mut failed) = (0u32, 0u32);
    for id in ids {
        limiter.until_ready().await;
        match telegram.send_message(id, &text, None).await {
            Ok(_) => sent += 1,
            Err(e) => {
                failed += 1;
                warn!(user_id = id, error = %e, "broadcast send failed");
            }
        }
    }
    bot.dialogs.remove(&callback.from.id);

    let summary = format!(
        "✅ <b>Рассылка завершена</b>\n\n\
         Группа: {}\n\
         Отправлено: <b>{sent}</b>\n\
         Ошибок: <b>{failed}</b>",
        segment.label()
    );
    telegram.send_message(chat_id, &summary, None).await?;
    info!(group = segment.label(), sent, failed, "broadcast finished");
    Ok(())
}

/// `admin_cancel` callback: back to drafting for the same segment.
pub async fn cancel(bot: &Bot, callback: &CallbackQuery, chat_id: i64) -> Result<()> {
    let telegram = &bot.state.telegram;
    let Some(AdminDialog::Confirming { segment, .. }) = current_dialog(bot, callback.from.id)
    else {
        telegram.answer_callback_query(&callback.id, None, false).await?;
        return Ok(());
    };
    telegram.answer_callback_query(&callback.id, None, false).await?;
    bot.dialogs
        .insert(callback.from.id, AdminDialog::EnteringMessage { segment });
    let text = format!(
        "📝 <b>Группа:</b> {}\n\n\
         Введите новое сообщение для рассылки:",
        segment.label()
    );
    telegram
        .send_message(chat_id, &text, Some(keyboards::admin_entering()))
        .await?;
    Ok(())
}

/// `admin_back_to_groups` callback.
pub async fn back_to_groups(bot: &Bot, callback: &CallbackQuery, chat_id: i64) -> Result<()> {
    let telegram = &bot.state.telegram;
    telegram.answer_callback_query(&callback.id, None, false).await?;
    bot.dialogs.insert(callback.from.id, AdminDialog::ChoosingGroup);
    telegram
        .send_message(
            chat_id,
            "🔧 <b>Админ-панель</b>\n\n\
             Выберите группу пользователей:",
            Some(keyboards::admin_groups()),
        )
        .await?;
    Ok(())
}

/// `admin_exit` callback: clear state and remove the panel message.
pub async fn exit(bot: &Bot, callback: &CallbackQuery) -> Result<()> {
    let telegram = &bot.state.telegram;
    telegram
        .answer_callback_query(&callback.id, Some("Вышли из админки"), true)
        .await?;
    bot.dialogs.remove(&callback.from.id);
    if let Some(message) = &callback.message {
        telegram
            .delete_message(message.chat.id, message.message_id)
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_segment_keys() {
        assert_eq!(Segment::parse("no_activity"), Some(Segment::NoActivity));
        assert_eq!(Segment::parse("used_trial"), Some(Segment::UsedTrial));
        assert_eq!(Segment::parse("bought_single"), Some(Segment::BoughtSingle));
    }

    #[test]
    fn rejects_unknown_segment_keys() {
        assert_eq!(Segment::parse(""), None);
        assert_eq!(Segment::parse("everyone"), None);
        assert_eq!(Segment::parse("no_activity "), None);
    }
}
