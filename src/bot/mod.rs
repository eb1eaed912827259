//! Update routing for the Telegram bot.
//!
//! One [`Bot`] instance serves the whole update stream: commands and menu
//! buttons go through [`Bot::dispatch`], which loads (or creates) the sender's
//! user row and hands off to the matching handler. Inline keyboard presses
//! arrive as callback queries and are routed by their `data` payload.

use anyhow::Result;
use dashmap::DashMap;
use regex::Regex;
use tracing::{debug, error, warn};

use crate::bot::handlers::admin::AdminDialog;
use crate::data::models::{ProductOption, User};
use crate::data::users;
use crate::state::AppState;
use crate::telegram::{CallbackQuery, Message, Update};

pub mod handlers;
pub mod keyboards;
pub mod loading;

pub struct Bot {
    pub(crate) state: AppState,
    /// Per-admin broadcast dialog position, keyed by Telegram user id.
    pub(crate) dialogs: DashMap<i64, AdminDialog>,
    auth_code_re: Regex,
}

impl Bot {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            dialogs: DashMap::new(),
            auth_code_re: Regex::new(r"^\d{4,6}$").expect("static regex"),
        }
    }

    pub async fn dispatch(&self, update: Update) {
        if let Some(message) = update.message {
            self.handle_message(message).await;
        } else if let Some(callback) = update.callback_query {
            self.handle_callback(callback).await;
        }
    }

    async fn handle_message(&self, message: Message) {
        let Some(from) = message.from.clone() else {
            return;
        };
        if from.is_bot {
            return;
        }
        let user = match users::get_or_create(
            &self.state.db_pool,
            from.id,
            from.username.as_deref(),
        )
        .await
        {
            Ok(user) => user,
            Err(e) => {
                warn!(user_id = from.id, error = %e, "failed to load message sender");
                return;
            }
        };
        let text = message.text.as_deref().unwrap_or("").trim().to_string();
        if let Err(e) = self.route_message(&message, &user, &text).await {
            error!(user_id = user.id, error = %e, "message handler failed");
        }
    }

    async fn route_message(&self, message: &Message, user: &User, text: &str) -> Result<()> {
        // Login codes outrank everything else the admin could be typing.
        if self.auth_code_re.is_match(text) && user.id == self.state.config.admin_telegram_id {
            return handlers::auth_code::handle(self, message, user).await;
        }
        if text == "/start" || text.starts_with("/start ") {
            return handlers::start::command(self, message, user).await;
        }
        if text == "/compare" || text.starts_with("/compare ") {
            return handlers::reports::compare(self, message, user).await;
        }
        if text == "/admin" {
            return handlers::admin::panel(self, message, user).await;
        }
        if text == keyboards::MENU_COMPARE {
            return handlers::reports::usage(self, message, user).await;
        }
        if text == keyboards::MENU_BALANCE {
            return handlers::balance::show(self, message.chat.id, user).await;
        }
        if self.state.config.is_admin(user.id) && !text.is_empty() {
            let dialog = self.dialogs.get(&user.id).map(|entry| entry.value().clone());
            if let Some(AdminDialog::EnteringMessage { segment }) = dialog {
                return handlers::admin::message_entered(self, message, user, segment).await;
            }
        }
        self.fallback(message.chat.id).await
    }

    async fn fallback(&self, chat_id: i64) -> Result<()> {
        self.state
            .telegram
            .send_message(
                chat_id,
                "❓ Не понимаю эту команду.\n\n\
                 Используйте кнопки меню ниже 👇",
                Some(keyboards::main_menu()),
            )
            .await?;
        Ok(())
    }

    async fn handle_callback(&self, callback: CallbackQuery) {
        if callback.from.is_bot {
            return;
        }
        let user = match users::get_or_create(
            &self.state.db_pool,
            callback.from.id,
            callback.from.username.as_deref(),
        )
        .await
        {
            Ok(user) => user,
            Err(e) => {
                warn!(user_id = callback.from.id, error = %e, "failed to load callback sender");
                return;
            }
        };
        let Some(chat_id) = callback.message.as_ref().map(|m| m.chat.id) else {
            debug!(data = ?callback.data, "callback without originating message dropped");
            return;
        };
        if let Err(e) = self.route_callback(&callback, &user, chat_id).await {
            error!(user_id = user.id, data = ?callback.data, error = %e, "callback handler failed");
        }
    }

    async fn route_callback(
        &self,
        callback: &CallbackQuery,
        user: &User,
        chat_id: i64,
    ) -> Result<()> {
        let data = callback.data.as_deref().unwrap_or("");
        if data.starts_with("admin_") && !self.require_admin(callback, user).await? {
            return Ok(());
        }
        if let Some(key) = data.strip_prefix("admin_group:") {
            return handlers::admin::group_selected(self, callback, chat_id, key).await;
        }
        let telegram = &self.state.telegram;
        match data {
            "balance" => {
                telegram.answer_callback_query(&callback.id, None, false).await?;
                handlers::balance::show(self, chat_id, user).await
            }
            "refill_balance" => {
                telegram.answer_callback_query(&callback.id, None, false).await?;
                handlers::balance::refill(self, chat_id, user).await
            }
            "buy_single" => {
                telegram.answer_callback_query(&callback.id, None, false).await?;
                handlers::balance::buy(self, chat_id, user, ProductOption::Single).await
            }
            "buy_packet" => {
                telegram.answer_callback_query(&callback.id, None, false).await?;
                handlers::balance::buy(self, chat_id, user, ProductOption::Packet).await
            }
            "cancel_refill" => {
                telegram.answer_callback_query(&callback.id, None, false).await?;
                handlers::balance::cancel(self, callback).await
            }
            "admin_back_to_groups" => handlers::admin::back_to_groups(self, callback, chat_id).await,
            "admin_confirm" => handlers::admin::confirm(self, callback, chat_id).await,
            "admin_cancel" => handlers::admin::cancel(self, callback, chat_id).await,
            "admin_exit" => handlers::admin::exit(self, callback).await,
            other => {
                debug!(data = other, user_id = user.id, "unhandled callback");
                telegram.answer_callback_query(&callback.id, None, false).await
            }
        }
    }

    /// Broadcast callbacks are reachable only from admin-sent keyboards, but
    /// callback data is forgeable; check the sender every time.
    async fn require_admin(&self, callback: &CallbackQuery, user: &User) -> Result<bool> {
        if self.state.config.is_admin(user.id) {
            return Ok(true);
        }
        warn!(user_id = user.id, data = ?callback.data, "admin callback from non-admin");
        self.state
            .telegram
            .answer_callback_query(&callback.id, None, false)
            .await?;
        Ok(false)
    }
}
