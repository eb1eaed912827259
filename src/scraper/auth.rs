//! Semi-automatic login to the seller platform.
//!
//! The platform sends a confirmation code to the account owner's phone. The
//! admin forwards that code to the bot, and the bot hands it to the waiting
//! login flow through [`AuthCodeGateway`].

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time;
use tracing::{debug, info, warn};

use crate::scraper::COMPARISON_URL;
use crate::scraper::errors::{ScrapeError, ScrapeResult};
use crate::scraper::webdriver::Browser;
use crate::telegram::TelegramClient;

/// How long the login flow waits for the admin to forward the code.
const CODE_TIMEOUT: Duration = Duration::from_secs(300);

const PHONE_INPUT: &str = "[data-testid=\"phone-input\"]";
const SUBMIT_PHONE: &str = "[data-testid=\"submit-phone-button\"]";
const CODE_FORM: &str = ".FormCodeInput ul";

/// Hand-off point between the bot and a login flow waiting for an SMS code.
///
/// At most one login can wait at a time; registering a new wait drops any
/// previous one.
#[derive(Clone, Default)]
pub struct AuthCodeGateway {
    pending: Arc<Mutex<Option<oneshot::Sender<String>>>>,
}

impl AuthCodeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in the next forwarded code.
    pub fn begin(&self) -> oneshot::Receiver<String> {
        let (tx, rx) = oneshot::channel();
        *self.pending.lock().unwrap() = Some(tx);
        rx
    }

    /// Deliver a code from the admin. Returns `false` when no login flow is
    /// currently waiting for one.
    pub fn submit(&self, code: String) -> bool {
        match self.pending.lock().unwrap().take() {
            Some(tx) => tx.send(code).is_ok(),
            None => false,
        }
    }

    /// Drop the pending request, if any.
    pub fn clear(&self) {
        *self.pending.lock().unwrap() = None;
    }
}

/// Everything a login flow needs besides the browser itself.
pub struct AuthContext<'a> {
    pub telegram: &'a TelegramClient,
    pub admin_id: i64,
    pub phone: &'a str,
    pub gateway: &'a AuthCodeGateway,
}

/// Whether the current page demands a login.
pub async fn needs_authorization(browser: &Browser) -> ScrapeResult<bool> {
    // The login page shows the phone form almost immediately.
    match browser
        .wait_visible(PHONE_INPUT, Duration::from_secs(3))
        .await
    {
        Ok(_) => {
            info!("phone input visible, authorization needed");
            return Ok(true);
        }
        Err(ScrapeError::WaitTimeout { .. }) => {}
        Err(e) => return Err(e),
    }

    let url = browser.current_url().await?;
    if url.contains("seller-auth") || url.contains("auth") {
        info!(url, "auth redirect detected, authorization needed");
        return Ok(true);
    }
    if url.contains("cards-comparison") {
        debug!(url, "already on target page");
        return Ok(false);
    }
    debug!(url, "unclear page state, assuming authorized");
    Ok(false)
}

/// Run the interactive login: enter the phone, relay the SMS code through
/// Telegram, type it in, and verify the redirect landed on the analytics page.
pub async fn authorize(browser: &Browser, ctx: &AuthContext<'_>) -> ScrapeResult<()> {
    info!("starting authorization");

    let phone_input = browser
        .wait_visible(PHONE_INPUT, Duration::from_secs(15))
        .await?;
    browser.clear(&phone_input).await?;
    browser.send_keys(&phone_input, ctx.phone).await?;
    info!("phone number entered");

    let submit = browser
        .wait_visible(SUBMIT_PHONE, Duration::from_secs(10))
        .await?;
    browser.click(&submit).await?;
    time::sleep(Duration::from_secs(2)).await;

    let code = request_code(ctx).await?;
    let digits: Vec<char> = code.chars().collect();
    if digits.is_empty() {
        return Err(ScrapeError::AuthFailed("empty code received".into()));
    }

    info!(digits = digits.len(), "entering login code");
    browser
        .wait_visible(CODE_FORM, Duration::from_secs(10))
        .await?;
    for (i, digit) in digits.iter().enumerate() {
        let selector = format!("{CODE_FORM} li:nth-child({}) input", i + 1);
        let input = browser
            .wait_visible(&selector, Duration::from_secs(5))
            .await?;
        browser.send_keys(&input, &digit.to_string()).await?;
        if i + 1 < digits.len() {
            time::sleep(Duration::from_millis(200)).await;
        }
    }

    // The last digit triggers the redirect.
    match browser
        .wait_url_contains("cards-comparison", Duration::from_secs(15))
        .await
    {
        Ok(url) => info!(url, "redirect successful"),
        Err(ScrapeError::WaitTimeout { .. }) => {
            let url = browser.current_url().await?;
            if url.contains("seller-auth") || url.contains("auth") {
                return Err(ScrapeError::AuthFailed(format!(
                    "still on auth page after code entry: {url}"
                )));
            }
            warn!(url, "no redirect after code entry, navigating directly");
            browser.goto(COMPARISON_URL).await?;
            let url = browser.current_url().await?;
            if !url.contains("cards-comparison") {
                return Err(ScrapeError::AuthFailed(format!(
                    "cannot reach comparison page, landed on {url}"
                )));
            }
        }
        Err(e) => return Err(e),
    }

    info!("authorization verified");
    Ok(())
}

/// Navigate to the analytics page and log in if the platform asks for it.
/// Returns `true` when a fresh login happened (so new state should be saved).
pub async fn ensure_authorized(browser: &Browser, ctx: &AuthContext<'_>) -> ScrapeResult<bool> {
    info!("navigating to comparison page");
    browser.goto(COMPARISON_URL).await?;
    // give any auth redirect time to settle
    time::sleep(Duration::from_secs(2)).await;
    let url = browser.current_url().await?;
    debug!(url, "page settled");

    let logged_in_now = if needs_authorization(browser).await? {
        warn!("authorization required");
        authorize(browser, ctx).await?;
        true
    } else {
        info!("saved session accepted");
        false
    };

    let url = browser.current_url().await?;
    if !url.contains("cards-comparison") {
        browser.goto(COMPARISON_URL).await?;
    }
    Ok(logged_in_now)
}

async fn request_code(ctx: &AuthContext<'_>) -> ScrapeResult<String> {
    let rx = ctx.gateway.begin();

    let text = format!(
        "🔐 <b>Требуется код авторизации</b>\n\n\
         📱 Номер: <code>{}</code>\n\
         ⏰ Время: {}\n\n\
         Отправьте код сообщением (только цифры):",
        ctx.phone,
        chrono::Local::now().format("%H:%M:%S"),
    );
    if let Err(e) = ctx.telegram.send_message(ctx.admin_id, &text, None).await {
        ctx.gateway.clear();
        return Err(ScrapeError::AuthFailed(format!(
            "cannot request code from admin: {e}"
        )));
    }
    info!(admin_id = ctx.admin_id, "auth code requested from admin");

    match time::timeout(CODE_TIMEOUT, rx).await {
        Ok(Ok(code)) => {
            info!("auth code received");
            Ok(code.trim().to_string())
        }
        Ok(Err(_)) => Err(ScrapeError::AuthFailed(
            "auth code request was superseded".into(),
        )),
        Err(_) => {
            ctx.gateway.clear();
            Err(ScrapeError::AuthFailed(format!(
                "no auth code received within {}s",
                CODE_TIMEOUT.as_secs()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn gateway_delivers_code_to_waiting_flow() {
        let gateway = AuthCodeGateway::new();
        let rx = gateway.begin();
        assert!(gateway.submit("1234".to_string()));
        assert_eq!(rx.await.unwrap(), "1234");
    }

    #[tokio::test]
    async fn submit_without_waiting_flow_is_rejected() {
        let gateway = AuthCodeGateway::new();
        assert!(!gateway.submit("1234".to_string()));
    }

    #[tokio::test]
    async fn new_wait_supersedes_previous_one() {
        let gateway = AuthCodeGateway::new();
        let first = gateway.begin();
        let second = gateway.begin();
        assert!(gateway.submit("5678".to_string()));
        assert!(first.await.is_err(), "first waiter was dropped");
        assert_eq!(second.await.unwrap(), "5678");
    }

    #[tokio::test]
    async fn clear_drops_pending_request() {
        let gateway = AuthCodeGateway::new();
        let rx = gateway.begin();
        gateway.clear();
        assert!(!gateway.submit("0000".to_string()));
        assert!(rx.await.is_err());
    }
}
