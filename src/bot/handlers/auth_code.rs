//! Relay of Wildberries login codes typed by the admin in Telegram.

use anyhow::Result;
use tracing::info;

use crate::bot::Bot;
use crate::data::models::User;
use crate::telegram::Message;

/// A 4-6 digit message from the admin. Handed to whichever login attempt is
/// waiting on it, if any.
pub async fn handle(bot: &Bot, message: &Message, user: &User) -> Result<()> {
    let code = message.text.as_deref().unwrap_or("").trim();
    info!(user_id = user.id, "auth code received");
    let reply = if bot.state.auth_gateway.submit(code.to_string()) {
        "✅ <b>Код принят!</b>\n\n\
         Выполняется авторизация..."
    } else {
        "❌ <b>Нет активного запроса на код</b>\n\n\
         Возможно, запрос уже обработан или истёк."
    };
    bot.state
        .telegram
        .send_message(message.chat.id, reply, None)
        .await?;
    Ok(())
}
