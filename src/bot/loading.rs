//! Loading sticker shown while a long operation runs.
//!
//! The sticker is sent before kicking off report generation or payment
//! settlement and removed once the real answer is ready. Both helpers are
//! best-effort: a missing sticker never fails the operation it decorates.

use tracing::warn;

use crate::telegram::TelegramClient;

const LOADING_STICKER_ID: &str =
    "CAACAgIAAxkBAAEVqDFpf0pGFIP-sRsnvOx-jWd1idNYOwACtCMAAphLKUjeub7NKlvk2TgE";

/// Send the loading sticker, returning its message id for later cleanup.
pub async fn send_loading_sticker(telegram: &TelegramClient, chat_id: i64) -> Option<i64> {
    match telegram.send_sticker(chat_id, LOADING_STICKER_ID).await {
        Ok(message) => Some(message.message_id),
        Err(e) => {
            warn!(chat_id, error = ?e, "failed to send loading sticker");
            None
        }
    }
}

/// Remove a previously sent loading sticker, if any.
pub async fn delete_loading_sticker(
    telegram: &TelegramClient,
    chat_id: i64,
    message_id: Option<i64>,
) {
    let Some(message_id) = message_id else {
        return;
    };
    if let Err(e) = telegram.delete_message(chat_id, message_id).await {
        warn!(chat_id, message_id, error = ?e, "failed to delete loading sticker");
    }
}
