use anyhow::Result;
use tracing::info;

use crate::bot::{Bot, keyboards};
use crate::data::models::User;
use crate::telegram::Message;

pub async fn command(bot: &Bot, message: &Message, user: &User) -> Result<()> {
    info!(user_id = user.id, "user started the bot");

    let first_name = message
        .from
        .as_ref()
        .map(|u| u.first_name.as_str())
        .unwrap_or("");
    let text = format!(
        "👋 Привет, {}!\n\n\
         Я бот для генерации отчетов Wildberries.\n\n\
         📊 <b>Доступные функции:</b>\n\
         • Фильтрованные отчеты - полный анализ по периодам и сегментам\n\
         • Сравнение карточек - сравнение товаров по артикулам\n\n\
         💰 <b>Ваш баланс:</b> {} отчетов\n\n\
         Выберите действие на клавиатуре ниже 👇",
        html_escape::encode_text(first_name),
        user.reports_balance
    );
    bot.state
        .telegram
        .send_message(message.chat.id, &text, Some(keyboards::main_menu()))
        .await?;
    Ok(())
}
