//! Browser automation against the Wildberries seller platform.
//!
//! A single remote Firefox session is shared by every flow:
//! - `auth` logs in with a phone number and a Telegram-relayed SMS code
//! - `reports` drives the card-comparison page and its Excel exports
//! - `worker` turns queued tasks into downloadable report archives
//! - `saver` persists cookies and localStorage so restarts skip the login

pub mod auth;
pub mod errors;
pub mod reports;
pub mod saver;
pub mod session;
pub mod webdriver;
pub mod worker;

pub use auth::AuthCodeGateway;
pub use errors::{ScrapeError, ScrapeResult};

use std::path::{Path, PathBuf};

use anyhow::Result;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::scraper::session::{SavedCookie, SessionState, SessionStore};
use crate::scraper::webdriver::Browser;

/// Landing page used to plant cookies before any real navigation.
const SELLER_BASE: &str = "https://seller.wildberries.ru/";

/// The analytics page every flow starts from.
pub(crate) const COMPARISON_URL: &str =
    "https://seller.wildberries.ru/platform-analytics/cards-comparison";

/// The seller UI flows match on Russian button labels.
const ACCEPT_LANGUAGES: &str = "ru-RU, ru";

const LOCAL_STORAGE_DUMP: &str = "const out = {}; \
    for (let i = 0; i < localStorage.length; i++) { \
        const k = localStorage.key(i); out[k] = localStorage.getItem(k); \
    } \
    return out;";

const LOCAL_STORAGE_RESTORE: &str = "const entries = arguments[0]; \
    for (const k of Object.keys(entries)) { localStorage.setItem(k, entries[k]); }";

/// Client owning the browser session for the seller platform.
///
/// The browser is started lazily on first use so the bot can come up (and
/// relay auth codes) before any WebDriver traffic happens.
pub struct WbClient {
    phone: String,
    headless: bool,
    webdriver_url: Url,
    downloads_path: PathBuf,
    store: SessionStore,
    browser: Mutex<Option<Browser>>,
}

impl WbClient {
    pub fn new(
        phone: String,
        headless: bool,
        webdriver_url: Url,
        state_file: PathBuf,
        downloads_path: PathBuf,
    ) -> Self {
        Self {
            phone,
            headless,
            webdriver_url,
            downloads_path,
            store: SessionStore::new(state_file),
            browser: Mutex::new(None),
        }
    }

    /// Where the browser drops finished downloads before they are merged.
    fn staging_dir(&self) -> ScrapeResult<PathBuf> {
        // Firefox wants an absolute download directory
        std::path::absolute(self.downloads_path.join("staging")).map_err(|e| {
            ScrapeError::Driver(format!("cannot resolve downloads staging dir: {e}"))
        })
    }

    async fn connect(&self) -> ScrapeResult<Browser> {
        info!("starting browser session");
        let staging = self.staging_dir()?;
        tokio::fs::create_dir_all(&staging)
            .await
            .map_err(anyhow::Error::from)?;

        let caps = webdriver::firefox_capabilities(self.headless, ACCEPT_LANGUAGES, &staging);
        let browser = Browser::new_session(&self.webdriver_url, caps).await?;

        // Cookies can only be planted while a document from the target
        // domain is loaded.
        browser.goto(SELLER_BASE).await?;

        if let Some(state) = self.store.load().await {
            for cookie in &state.cookies {
                if let Err(e) = browser.add_cookie(&cookie.to_webdriver()).await {
                    warn!(cookie = cookie.name.as_str(), error = ?e, "failed to restore cookie");
                }
            }
            if !state.local_storage.is_empty() {
                let entries =
                    serde_json::to_value(&state.local_storage).map_err(anyhow::Error::from)?;
                if let Err(e) = browser.execute(LOCAL_STORAGE_RESTORE, vec![entries]).await {
                    warn!(error = ?e, "failed to restore localStorage");
                }
            }
            info!(cookies = state.cookies.len(), "session state restored into browser");
        } else {
            warn!("no valid saved state, fresh authorization will be required");
        }

        verify_locale(&browser).await;
        info!("browser ready");
        Ok(browser)
    }

    async fn lock_connected(
        &self,
    ) -> ScrapeResult<tokio::sync::MutexGuard<'_, Option<Browser>>> {
        let mut guard = self.browser.lock().await;
        if guard.is_none() {
            *guard = Some(self.connect().await?);
        }
        Ok(guard)
    }

    /// Start the browser if it is not already running.
    pub async fn ensure_connected(&self) -> ScrapeResult<()> {
        self.lock_connected().await.map(|_| ())
    }

    pub async fn is_connected(&self) -> bool {
        self.browser.lock().await.is_some()
    }

    /// Make sure the session is logged in, running the interactive login
    /// flow if needed. Saves state after a fresh login.
    pub async fn ensure_authorized(&self, ctx: &auth::AuthContext<'_>) -> ScrapeResult<()> {
        let guard = self.lock_connected().await?;
        let Some(browser) = guard.as_ref() else {
            return Err(ScrapeError::Driver("browser not connected".into()));
        };
        let logged_in_now = auth::ensure_authorized(browser, ctx).await?;
        if logged_in_now {
            let state = collect_state(browser).await?;
            self.store.save(&state).await.map_err(ScrapeError::Other)?;
        }
        Ok(())
    }

    /// Build a comparison for the given articles. With `fake` the flow only
    /// opens an existing comparison from the table, for rehearsing the export
    /// steps without touching comparison creation.
    pub async fn compare_cards(&self, articles: &[i64], fake: bool) -> ScrapeResult<()> {
        let guard = self.lock_connected().await?;
        let Some(browser) = guard.as_ref() else {
            return Err(ScrapeError::Driver("browser not connected".into()));
        };
        if fake {
            reports::fake_compare_cards(browser, articles).await
        } else {
            reports::compare_cards(browser, articles).await
        }
    }

    /// Export one Excel file per period and segment combination, returning
    /// how many exports were queued.
    pub async fn process_filters(&self, batch_id: u64) -> ScrapeResult<usize> {
        let guard = self.lock_connected().await?;
        let Some(browser) = guard.as_ref() else {
            return Err(ScrapeError::Driver("browser not connected".into()));
        };
        reports::process_filters(browser, batch_id).await
    }

    /// Download the finished exports and merge them into one archive.
    pub async fn download_documents(
        &self,
        batch_id: u64,
        expected_count: usize,
    ) -> ScrapeResult<PathBuf> {
        let guard = self.lock_connected().await?;
        let Some(browser) = guard.as_ref() else {
            return Err(ScrapeError::Driver("browser not connected".into()));
        };
        let staging = self.staging_dir()?;
        reports::download_documents(browser, &staging, &self.downloads_path, batch_id, expected_count)
            .await
    }

    /// Persist the current cookies and localStorage.
    ///
    /// Returns `Ok(false)` when the save was skipped: browser busy with a
    /// flow, not connected, or parked off the seller domain (saving there
    /// would clobber good state with an empty one).
    pub async fn save_current_state(&self) -> Result<bool> {
        let Ok(guard) = self.browser.try_lock() else {
            debug!("browser busy, skipping state save");
            return Ok(false);
        };
        let Some(browser) = guard.as_ref() else {
            debug!("browser not connected, skipping state save");
            return Ok(false);
        };
        let url = browser.current_url().await?;
        if !url.contains("wildberries") {
            debug!(url, "not on seller platform, skipping state save");
            return Ok(false);
        }
        let state = collect_state(browser).await?;
        self.store.save(&state).await?;
        Ok(true)
    }

    /// Close the browser session if one is open.
    pub async fn disconnect(&self) {
        let mut guard = self.browser.lock().await;
        if let Some(browser) = guard.take() {
            if let Err(e) = browser.close().await {
                warn!(error = ?e, "failed to close browser session");
            } else {
                info!("browser closed");
            }
        }
    }
}

/// Snapshot cookies and localStorage from the live browser.
pub(crate) async fn collect_state(browser: &Browser) -> ScrapeResult<SessionState> {
    let cookies = browser.cookies().await?;
    let local = browser.execute(LOCAL_STORAGE_DUMP, vec![]).await?;
    let local_storage = serde_json::from_value(local).unwrap_or_default();
    Ok(SessionState {
        cookies: cookies.iter().map(SavedCookie::from_webdriver).collect(),
        local_storage,
    })
}

async fn verify_locale(browser: &Browser) {
    let script =
        "return [navigator.language, Intl.DateTimeFormat().resolvedOptions().timeZone];";
    match browser.execute(script, vec![]).await {
        Ok(value) => {
            let language = value
                .get(0)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            let timezone = value
                .get(1)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            info!(language, timezone, "browser locale");
            if !language.starts_with("ru") {
                warn!(language, "expected Russian browser locale");
            }
        }
        Err(e) => warn!(error = ?e, "failed to verify browser locale"),
    }
}

/// Helper for paths like `downloads/file.zip` -> `downloads/file.zip.part`.
pub(crate) fn part_file(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".part");
    PathBuf::from(os)
}
