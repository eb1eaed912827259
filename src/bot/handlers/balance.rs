//! Balance view, refill menu and purchase flow.

use anyhow::Result;
use sqlx::PgPool;
use tracing::{error, info};

use crate::bot::loading::{delete_loading_sticker, send_loading_sticker};
use crate::bot::{Bot, keyboards};
use crate::data::models::{Price, ProductOption, User};
use crate::data::prices;
use crate::telegram::CallbackQuery;

const PRICES_UNAVAILABLE: &str = "❌ Ошибка загрузки цен. Попробуйте позже.";

/// Current balance with the single-report purchase shortcut.
pub async fn show(bot: &Bot, chat_id: i64, user: &User) -> Result<()> {
    info!(user_id = user.id, "balance requested");
    let telegram = &bot.state.telegram;
    let sticker = send_loading_sticker(telegram, chat_id).await;
    let loaded = load_prices(&bot.state.db_pool).await;
    delete_loading_sticker(telegram, chat_id, sticker).await;

    let Ok((single, packet)) = loaded else {
        telegram.send_message(chat_id, PRICES_UNAVAILABLE, None).await?;
        return Ok(());
    };
    let text = format!(
        "💰 <b>Ваш баланс</b>\n\n\
         Доступно отчетов: <b>{}</b>\n\n\
         Выберите действие ниже 👇",
        user.reports_balance
    );
    telegram
        .send_message(chat_id, &text, Some(keyboards::balance_options(&single, &packet)))
        .await?;
    Ok(())
}

/// Standalone refill menu, reachable from the balance view.
pub async fn refill(bot: &Bot, chat_id: i64, user: &User) -> Result<()> {
    info!(user_id = user.id, "refill menu requested");
    let telegram = &bot.state.telegram;
    let sticker = send_loading_sticker(telegram, chat_id).await;
    let loaded = load_prices(&bot.state.db_pool).await;
    delete_loading_sticker(telegram, chat_id, sticker).await;

    let Ok((single, packet)) = loaded else {
        telegram.send_message(chat_id, PRICES_UNAVAILABLE, None).await?;
        return Ok(());
    };
    let text = format!(
        "💳 <b>Пополнение баланса</b>\n\n\
         Выберите вариант покупки:\n\n\
         📄 <b>Один отчет</b> - {} ₽\n\
         📦 <b>Пакет ({} отчетов)</b> - {} ₽\n\n\
         <i>Нажмите на кнопку для оплаты</i>",
        single.price, packet.reports_amount, packet.price
    );
    telegram
        .send_message(chat_id, &text, Some(keyboards::refill_options(&single, &packet)))
        .await?;
    Ok(())
}

async fn load_prices(pool: &PgPool) -> Result<(Price, Price)> {
    let single = prices::get_by_option(pool, ProductOption::Single)
        .await?
        .ok_or_else(|| anyhow::anyhow!("no price configured for single option"))?;
    let packet = prices::get_by_option(pool, ProductOption::Packet)
        .await?
        .ok_or_else(|| anyhow::anyhow!("no price configured for packet option"))?;
    Ok((single, packet))
}

/// Issue a payment link for the chosen product.
pub async fn buy(bot: &Bot, chat_id: i64, user: &User, option: ProductOption) -> Result<()> {
    info!(user_id = user.id, option = option.as_str(), "purchase requested");
    let telegram = &bot.state.telegram;
    let sticker = send_loading_sticker(telegram, chat_id).await;
    let built = build_payment(bot, user.id, option).await;
    delete_loading_sticker(telegram, chat_id, sticker).await;

    match built {
        Ok((text, url)) => {
            telegram
                .send_message(chat_id, &text, Some(keyboards::payment_link(&url)))
                .await?;
        }
        Err(reply) => {
            telegram.send_message(chat_id, reply, None).await?;
        }
    }
    Ok(())
}

/// Price lookup plus link creation. Errors are the full user-facing reply.
async fn build_payment(
    bot: &Bot,
    user_id: i64,
    option: ProductOption,
) -> Result<(String, String), &'static str> {
    let price = match prices::get_by_option(&bot.state.db_pool, option).await {
        Ok(Some(price)) => price,
        Ok(None) => {
            error!(option = option.as_str(), "no price configured for option");
            return Err("❌ Ошибка загрузки цены. Попробуйте позже.");
        }
        Err(e) => {
            error!(option = option.as_str(), error = %e, "price lookup failed");
            return Err("❌ Ошибка загрузки цены. Попробуйте позже.");
        }
    };
    let url = match bot.state.payments.generate_payment_link(user_id, option).await {
        Ok(url) => url,
        Err(e) => {
            error!(user_id, option = option.as_str(), error = %e, "payment link creation failed");
            return Err("❌ Ошибка создания платежа. Попробуйте позже.");
        }
    };
    let product = match option {
        ProductOption::Single => "1 отчет".to_string(),
        ProductOption::Packet => format!("Пакет ({} отчетов)", price.reports_amount),
    };
    let text = format!(
        "💳 <b>Оплата</b>\n\n\
         Товар: <b>{product}</b>\n\
         Сумма: <b>{} ₽</b>\n\n\
         Нажмите на кнопку ниже для перехода к оплате.\n\
         После успешной оплаты баланс будет автоматически пополнен.",
        price.price
    );
    Ok((text, url))
}

/// Drop any half-open admin dialog and remove the refill menu message.
pub async fn cancel(bot: &Bot, callback: &CallbackQuery) -> Result<()> {
    bot.dialogs.remove(&callback.from.id);
    if let Some(message) = &callback.message {
        bot.state
            .telegram
            .delete_message(message.chat.id, message.message_id)
            .await?;
    }
    Ok(())
}
