//! Minimal W3C WebDriver client for driving a remote Firefox.
//!
//! Talks directly to a geckodriver endpoint over HTTP. Only the commands the
//! seller-platform flows need are implemented: navigation, CSS lookups,
//! element interaction, script execution, and cookie transfer.

use std::path::Path;
use std::time::{Duration, Instant};

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::time;
use tracing::debug;
use url::Url;

use crate::scraper::errors::{ScrapeError, ScrapeResult};

/// W3C element identifier key in wire responses.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Enter key code from the WebDriver keyboard actions table.
pub const KEY_ENTER: &str = "\u{E007}";

/// How often wait loops re-query the page.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// A handle to an element on the current page.
///
/// Handles go stale when the page re-renders what they point at; wait loops
/// re-query instead of holding handles across navigation.
#[derive(Debug, Clone)]
pub struct Element(String);

/// A cookie in WebDriver wire format. `expiry` is epoch seconds; absent means
/// the cookie lives until the session ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default)]
    pub secure: bool,
    #[serde(rename = "httpOnly", default)]
    pub http_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry: Option<i64>,
    #[serde(rename = "sameSite", skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
}

/// Build the `POST /session` capabilities payload for Firefox.
///
/// Downloads are routed straight to `download_dir` without a save dialog so
/// the scraper can pick finished files up from disk.
pub fn firefox_capabilities(headless: bool, accept_languages: &str, download_dir: &Path) -> Value {
    let mut args: Vec<&str> = Vec::new();
    if headless {
        args.push("-headless");
    }
    json!({
        "capabilities": {
            "alwaysMatch": {
                "browserName": "firefox",
                "moz:firefoxOptions": {
                    "args": args,
                    "prefs": {
                        "intl.accept_languages": accept_languages,
                        "browser.download.folderList": 2,
                        "browser.download.dir": download_dir.to_string_lossy(),
                        "browser.download.manager.showWhenStarting": false,
                        "browser.helperApps.neverAsk.saveToDisk":
                            "application/zip,application/octet-stream,application/x-zip-compressed",
                        "pdfjs.disabled": true
                    }
                }
            }
        }
    })
}

fn elements_from_value(value: &Value) -> ScrapeResult<Vec<Element>> {
    let items = value
        .as_array()
        .ok_or_else(|| ScrapeError::Driver(format!("expected element array, got: {value}")))?;
    items
        .iter()
        .map(|item| {
            item.get(ELEMENT_KEY)
                .and_then(|v| v.as_str())
                .map(|id| Element(id.to_string()))
                .ok_or_else(|| ScrapeError::Driver(format!("malformed element reference: {item}")))
        })
        .collect()
}

/// An open WebDriver session.
pub struct Browser {
    http: reqwest::Client,
    base: Url,
    session_id: String,
}

impl Browser {
    /// Open a new session against a geckodriver endpoint.
    pub async fn new_session(webdriver_url: &Url, capabilities: Value) -> ScrapeResult<Browser> {
        let http = reqwest::Client::new();
        let url = webdriver_url
            .join("session")
            .map_err(|e| ScrapeError::Driver(format!("bad webdriver url: {e}")))?;
        let resp = http
            .post(url)
            .json(&capabilities)
            .send()
            .await
            .map_err(|e| ScrapeError::Driver(format!("transport: {e}")))?;

        let status = resp.status();
        let body: Value = resp
            .json()
            .await
            .map_err(|e| ScrapeError::Driver(format!("malformed session response ({status}): {e}")))?;
        if !status.is_success() {
            return Err(wire_error(&body));
        }

        let session_id = body
            .pointer("/value/sessionId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ScrapeError::Driver("no sessionId in session response".into()))?
            .to_string();
        debug!(session_id, "webdriver session created");

        Ok(Browser {
            http,
            base: webdriver_url.clone(),
            session_id,
        })
    }

    async fn cmd(&self, method: Method, path: &str, body: Option<Value>) -> ScrapeResult<Value> {
        let path = format!("session/{}/{}", self.session_id, path);
        let url = self
            .base
            .join(&path)
            .map_err(|e| ScrapeError::Driver(format!("bad command path {path}: {e}")))?;

        let mut req = self.http.request(method, url);
        // geckodriver rejects POSTs without a JSON body
        req = match body {
            Some(body) => req.json(&body),
            None => req.json(&json!({})),
        };

        let resp = req
            .send()
            .await
            .map_err(|e| ScrapeError::Driver(format!("transport: {e}")))?;
        let status = resp.status();
        let body: Value = resp
            .json()
            .await
            .map_err(|e| ScrapeError::Driver(format!("malformed response ({status}): {e}")))?;
        if !status.is_success() {
            return Err(wire_error(&body));
        }
        Ok(body.get("value").cloned().unwrap_or(Value::Null))
    }

    pub async fn goto(&self, url: &str) -> ScrapeResult<()> {
        self.cmd(Method::POST, "url", Some(json!({ "url": url })))
            .await?;
        Ok(())
    }

    pub async fn current_url(&self) -> ScrapeResult<String> {
        let value = self.cmd(Method::GET, "url", None).await?;
        value
            .as_str()
            .map(String::from)
            .ok_or_else(|| ScrapeError::Driver(format!("unexpected current url payload: {value}")))
    }

    /// Run a script in the page. `script` is a function body; `args` are
    /// available as `arguments[n]`.
    pub async fn execute(&self, script: &str, args: Vec<Value>) -> ScrapeResult<Value> {
        self.cmd(
            Method::POST,
            "execute/sync",
            Some(json!({ "script": script, "args": args })),
        )
        .await
    }

    /// All elements matching a CSS selector; empty when nothing matches.
    pub async fn find_all(&self, css: &str) -> ScrapeResult<Vec<Element>> {
        let value = self
            .cmd(
                Method::POST,
                "elements",
                Some(json!({ "using": "css selector", "value": css })),
            )
            .await?;
        elements_from_value(&value)
    }

    /// First element matching a CSS selector, if any.
    pub async fn find(&self, css: &str) -> ScrapeResult<Option<Element>> {
        Ok(self.find_all(css).await?.into_iter().next())
    }

    /// All elements matching a CSS selector inside `scope`.
    pub async fn find_all_in(&self, scope: &Element, css: &str) -> ScrapeResult<Vec<Element>> {
        let value = self
            .cmd(
                Method::POST,
                &format!("element/{}/elements", scope.0),
                Some(json!({ "using": "css selector", "value": css })),
            )
            .await?;
        elements_from_value(&value)
    }

    pub async fn find_in(&self, scope: &Element, css: &str) -> ScrapeResult<Option<Element>> {
        Ok(self.find_all_in(scope, css).await?.into_iter().next())
    }

    pub async fn click(&self, el: &Element) -> ScrapeResult<()> {
        self.cmd(Method::POST, &format!("element/{}/click", el.0), None)
            .await?;
        Ok(())
    }

    pub async fn clear(&self, el: &Element) -> ScrapeResult<()> {
        self.cmd(Method::POST, &format!("element/{}/clear", el.0), None)
            .await?;
        Ok(())
    }

    pub async fn send_keys(&self, el: &Element, text: &str) -> ScrapeResult<()> {
        self.cmd(
            Method::POST,
            &format!("element/{}/value", el.0),
            Some(json!({ "text": text })),
        )
        .await?;
        Ok(())
    }

    pub async fn text(&self, el: &Element) -> ScrapeResult<String> {
        let value = self
            .cmd(Method::GET, &format!("element/{}/text", el.0), None)
            .await?;
        value
            .as_str()
            .map(String::from)
            .ok_or_else(|| ScrapeError::Driver(format!("unexpected element text payload: {value}")))
    }

    /// Whether the element is rendered visible (geckodriver extension endpoint).
    pub async fn is_displayed(&self, el: &Element) -> ScrapeResult<bool> {
        let value = self
            .cmd(Method::GET, &format!("element/{}/displayed", el.0), None)
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    pub async fn scroll_into_view(&self, el: &Element) -> ScrapeResult<()> {
        self.execute(
            "arguments[0].scrollIntoView({ block: 'center' });",
            vec![json!({ ELEMENT_KEY: el.0 })],
        )
        .await?;
        Ok(())
    }

    /// Click via JavaScript, bypassing hit-target checks. Used as a fallback
    /// when an overlay intercepts the native click.
    pub async fn click_js(&self, el: &Element) -> ScrapeResult<()> {
        self.execute("arguments[0].click();", vec![json!({ ELEMENT_KEY: el.0 })])
            .await?;
        Ok(())
    }

    /// Poll until a selector matches a visible element.
    pub async fn wait_visible(&self, css: &str, timeout: Duration) -> ScrapeResult<Element> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(el) = self.find(css).await? {
                // A stale handle between find and the check just means the
                // page re-rendered; the next iteration re-queries.
                if self.is_displayed(&el).await.unwrap_or(false) {
                    return Ok(el);
                }
            }
            if Instant::now() >= deadline {
                return Err(ScrapeError::WaitTimeout {
                    what: format!("element {css}"),
                    waited: timeout,
                });
            }
            time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Poll until the current URL contains `needle`, returning the final URL.
    pub async fn wait_url_contains(&self, needle: &str, timeout: Duration) -> ScrapeResult<String> {
        let deadline = Instant::now() + timeout;
        loop {
            let url = self.current_url().await?;
            if url.contains(needle) {
                return Ok(url);
            }
            if Instant::now() >= deadline {
                return Err(ScrapeError::WaitTimeout {
                    what: format!("url containing {needle:?} (last: {url})"),
                    waited: timeout,
                });
            }
            time::sleep(POLL_INTERVAL).await;
        }
    }

    pub async fn cookies(&self) -> ScrapeResult<Vec<Cookie>> {
        let value = self.cmd(Method::GET, "cookie", None).await?;
        serde_json::from_value(value)
            .map_err(|e| ScrapeError::Driver(format!("malformed cookie payload: {e}")))
    }

    pub async fn add_cookie(&self, cookie: &Cookie) -> ScrapeResult<()> {
        self.cmd(Method::POST, "cookie", Some(json!({ "cookie": cookie })))
            .await?;
        Ok(())
    }

    /// Tear the session down. The browser process exits with it.
    pub async fn close(&self) -> ScrapeResult<()> {
        let url = self
            .base
            .join(&format!("session/{}", self.session_id))
            .map_err(|e| ScrapeError::Driver(format!("bad webdriver url: {e}")))?;
        self.http
            .delete(url)
            .send()
            .await
            .map_err(|e| ScrapeError::Driver(format!("transport: {e}")))?;
        debug!(session_id = self.session_id, "webdriver session closed");
        Ok(())
    }
}

fn wire_error(body: &Value) -> ScrapeError {
    let error = body
        .pointer("/value/error")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown error");
    let message = body
        .pointer("/value/message")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    ScrapeError::Driver(format!("{error}: {message}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_references_parse_from_wire_format() {
        let value = json!([
            { ELEMENT_KEY: "abc-1" },
            { ELEMENT_KEY: "abc-2" },
        ]);
        let elements = elements_from_value(&value).unwrap();
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0].0, "abc-1");

        let empty = elements_from_value(&json!([])).unwrap();
        assert!(empty.is_empty());

        assert!(elements_from_value(&json!({"not": "an array"})).is_err());
    }

    #[test]
    fn capabilities_route_downloads_and_set_headless() {
        let caps = firefox_capabilities(true, "ru-RU, ru", Path::new("/data/staging"));
        let opts = caps
            .pointer("/capabilities/alwaysMatch/moz:firefoxOptions")
            .unwrap();
        assert_eq!(opts["args"][0], "-headless");
        assert_eq!(opts["prefs"]["browser.download.dir"], "/data/staging");
        assert_eq!(opts["prefs"]["browser.download.folderList"], 2);
        assert_eq!(opts["prefs"]["intl.accept_languages"], "ru-RU, ru");

        let headful = firefox_capabilities(false, "ru-RU, ru", Path::new("/data/staging"));
        let args = headful
            .pointer("/capabilities/alwaysMatch/moz:firefoxOptions/args")
            .unwrap();
        assert!(args.as_array().unwrap().is_empty());
    }

    #[test]
    fn wire_errors_surface_error_and_message() {
        let body = json!({
            "value": {
                "error": "no such element",
                "message": "Unable to locate element: .missing",
            }
        });
        let err = wire_error(&body);
        assert!(matches!(err, ScrapeError::Driver(ref msg)
            if msg.contains("no such element") && msg.contains(".missing")));
    }

    #[test]
    fn cookies_round_trip_optional_fields() {
        let raw = json!([{
            "name": "wbx-refresh",
            "value": "token",
            "domain": ".wildberries.ru",
            "path": "/",
            "secure": true,
            "httpOnly": true,
            "expiry": 1_900_000_000,
        }, {
            "name": "session-only",
            "value": "x",
        }]);
        let cookies: Vec<Cookie> = serde_json::from_value(raw).unwrap();
        assert_eq!(cookies[0].expiry, Some(1_900_000_000));
        assert!(cookies[0].http_only);
        assert_eq!(cookies[1].expiry, None);

        let serialized = serde_json::to_value(&cookies[1]).unwrap();
        assert!(serialized.get("expiry").is_none());
        assert!(serialized.get("sameSite").is_none());
    }
}
