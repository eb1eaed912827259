//! `/compare` entry: article parsing, report row creation and enqueueing.

use anyhow::{Result, anyhow};
use tracing::info;

use crate::bot::loading::send_loading_sticker;
use crate::bot::{Bot, keyboards};
use crate::data::models::User;
use crate::data::reports;
use crate::queue::ReportTask;
use crate::telegram::Message;

const MIN_ARTICLES: usize = 2;
const MAX_ARTICLES: usize = 5;

const NO_ARTICLES: &str = "❌ <b>Не указаны артикулы</b>\n\n\
     Используйте: <code>/compare артикул1,артикул2,...</code>\n\n\
     💡 Пример: <code>/compare 123456789,987654321</code>";
const BAD_FORMAT: &str = "❌ <b>Неверный формат артикулов</b>\n\n\
     Артикулы должны быть числами, разделенными запятыми.\n\n\
     💡 Пример: <code>/compare 123456789,987654321</code>";
const TOO_FEW: &str = "❌ <b>Слишком мало артикулов</b>\n\n\
     Для сравнения нужно минимум 2 артикула.\n\n\
     💡 Пример: <code>/compare 123456789,987654321</code>";
const TOO_MANY: &str = "❌ <b>Слишком много артикулов</b>\n\n\
     Максимум 5 артикулов для сравнения.\n\n\
     💡 Пример: <code>/compare 111,222,333,444,555</code>";

/// Help shown for the menu button.
pub async fn usage(bot: &Bot, message: &Message, user: &User) -> Result<()> {
    info!(user_id = user.id, "compare usage requested");
    bot.state
        .telegram
        .send_message(
            message.chat.id,
            "🔍 <b>Сравнение карточек</b>\n\n\
             Для сравнения карточек используйте команду:\n\
             <code>/compare артикул1,артикул2,...</code>\n\n\
             📋 <b>Правила:</b>\n\
             • Минимум 2 артикула\n\
             • Максимум 5 артикулов\n\
             • Артикулы через запятую\n\n\
             💡 <b>Примеры:</b>\n\
             <code>/compare 123456789,987654321</code>\n\
             <code>/compare 111111111,222222222,333333333</code>",
            None,
        )
        .await?;
    Ok(())
}

pub async fn compare(bot: &Bot, message: &Message, user: &User) -> Result<()> {
    info!(user_id = user.id, "compare requested");
    let chat_id = message.chat.id;
    let telegram = &bot.state.telegram;

    if user.reports_balance <= 0 {
        let text = format!(
            "❌ <b>Недостаточно средств</b>\n\n\
             💰 Ваш баланс: {} отчетов\n\n\
             Пополните баланс для генерации отчетов.",
            user.reports_balance
        );
        telegram.send_message(chat_id, &text, None).await?;
        return Ok(());
    }

    let text = message.text.as_deref().unwrap_or("");
    let args = text.strip_prefix("/compare").unwrap_or("").trim();
    let articles = match parse_articles(args) {
        Ok(articles) => articles,
        Err(reply) => {
            telegram.send_message(chat_id, reply, None).await?;
            return Ok(());
        }
    };

    let report = reports::create(&bot.state.db_pool, user.id, &articles).await?;

    let articles_text = articles
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    let position = bot.state.queue.pending() + 1;
    let confirmation = format!(
        "✅ <b>Задача добавлена в очередь</b>\n\n\
         📦 Артикулы: <code>{articles_text}</code>\n\
         📊 Позиция в очереди: {position}\n\n\
         ⏳ Ожидайте, отчет будет готов через несколько минут...\n\
         💰 После генерации будет списано: 1 отчет"
    );
    telegram.send_message(chat_id, &confirmation, None).await?;

    let loading_message_id = send_loading_sticker(telegram, chat_id).await;
    let task = ReportTask::new(report.id, user.id, chat_id, articles, loading_message_id);
    let task_id = task.id;
    let count = task.articles.len();
    bot.state
        .queue
        .enqueue(task)
        .map_err(|_| anyhow!("report queue closed"))?;
    info!(%task_id, report_id = report.id, articles = count, "compare task enqueued");
    Ok(())
}

/// Split on commas, ignoring blanks, and enforce the article count bounds.
/// Errors are the full user-facing reply.
fn parse_articles(args: &str) -> Result<Vec<i64>, &'static str> {
    if args.is_empty() {
        return Err(NO_ARTICLES);
    }
    let mut articles = Vec::new();
    for part in args.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        match part.parse::<i64>() {
            Ok(article) => articles.push(article),
            Err(_) => return Err(BAD_FORMAT),
        }
    }
    if articles.len() < MIN_ARTICLES {
        return Err(TOO_FEW);
    }
    if articles.len() > MAX_ARTICLES {
        return Err(TOO_MANY);
    }
    Ok(articles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_separated_articles_with_spaces() {
        assert_eq!(
            parse_articles("123456789, 987654321 ,111"),
            Ok(vec![123456789, 987654321, 111])
        );
    }

    #[test]
    fn rejects_empty_and_non_numeric_input() {
        assert_eq!(parse_articles(""), Err(NO_ARTICLES));
        assert_eq!(parse_articles("abc,123"), Err(BAD_FORMAT));
        assert_eq!(parse_articles("123;456"), Err(BAD_FORMAT));
    }

    #[test]
    fn enforces_article_count_bounds() {
        assert_eq!(parse_articles("123456789"), Err(TOO_FEW));
        assert_eq!(parse_articles(",,,"), Err(TOO_FEW));
        assert_eq!(parse_articles("1,2,3,4,5,6"), Err(TOO_MANY));
        assert!(parse_articles("1,2,3,4,5").is_ok());
    }
}
