//! Persisted browser session state.
//!
//! Cookies and localStorage for the seller platform are saved to a JSON file
//! so restarts can skip the SMS-code login. A saved state is only restored
//! after validation: the critical auth cookies must be present, not about to
//! expire, and the refresh JWT must not be stale.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::json::parse_json;
use crate::scraper::webdriver;

/// Cookies the seller platform cannot restore a session without.
const CRITICAL_COOKIES: [&str; 2] = ["wbx-refresh", "wbx-validation-key"];

/// Cookies expiring within this margin count as already expired.
const EXPIRY_MARGIN_SECS: i64 = 3600;

/// A refresh token issued longer ago than this is treated as stale even if
/// its cookie has not expired.
const MAX_TOKEN_AGE_SECS: i64 = 90 * 24 * 3600;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    /// Epoch seconds; `-1` for session cookies.
    pub expires: f64,
    #[serde(rename = "httpOnly", default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
    #[serde(rename = "sameSite", skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
}

impl SavedCookie {
    pub fn from_webdriver(cookie: &webdriver::Cookie) -> Self {
        SavedCookie {
            name: cookie.name.clone(),
            value: cookie.value.clone(),
            domain: cookie.domain.clone().unwrap_or_default(),
            path: cookie.path.clone().unwrap_or_else(|| "/".to_string()),
            expires: cookie.expiry.map_or(-1.0, |e| e as f64),
            http_only: cookie.http_only,
            secure: cookie.secure,
            same_site: cookie.same_site.clone(),
        }
    }

    pub fn to_webdriver(&self) -> webdriver::Cookie {
        webdriver::Cookie {
            name: self.name.clone(),
            value: self.value.clone(),
            path: Some(self.path.clone()),
            domain: if self.domain.is_empty() {
                None
            } else {
                Some(self.domain.clone())
            },
            secure: self.secure,
            http_only: self.http_only,
            expiry: (self.expires > 0.0).then_some(self.expires as i64),
            same_site: self.same_site.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionState {
    pub cookies: Vec<SavedCookie>,
    #[serde(default)]
    pub local_storage: BTreeMap<String, String>,
}

/// File-backed store for [`SessionState`].
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Load the saved state, returning `None` when the file is missing,
    /// unreadable, or fails validation.
    pub async fn load(&self) -> Option<SessionState> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no saved session state");
                return None;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = ?e, "failed to read session state");
                return None;
            }
        };

        let state: SessionState = match parse_json(&raw) {
            Ok(state) => state,
            Err(e) => {
                warn!(path = %self.path.display(), error = ?e, "failed to parse session state");
                return None;
            }
        };

        if !is_state_valid(&state, Utc::now().timestamp()) {
            warn!("saved session state is invalid or expired, ignoring");
            return None;
        }

        info!(cookies = state.cookies.len(), "session state loaded");
        Some(state)
    }

    pub async fn save(&self, state: &SessionState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let raw = serde_json::to_string_pretty(state)?;
        tokio::fs::write(&self.path, raw)
            .await
            .with_context(|| format!("writing {}", self.path.display()))?;
        info!(cookies = state.cookies.len(), path = %self.path.display(), "session state saved");
        Ok(())
    }
}

/// Whether a saved state is worth restoring at time `now` (epoch seconds).
fn is_state_valid(state: &SessionState, now: i64) -> bool {
    if state.cookies.is_empty() {
        warn!("session state has no cookies");
        return false;
    }

    for name in CRITICAL_COOKIES {
        let Some(cookie) = state.cookies.iter().find(|c| c.name == name) else {
            warn!(cookie = name, "missing critical cookie");
            return false;
        };
        let expires = cookie.expires as i64;
        if expires > 0 && now > expires - EXPIRY_MARGIN_SECS {
            warn!(cookie = name, expires, now, "critical cookie expired or expiring soon");
            return false;
        }
    }

    // The refresh cookie carries a JWT; a token issued too long ago will be
    // rejected server-side even when the cookie itself has not expired.
    if let Some(refresh) = state.cookies.iter().find(|c| c.name == "wbx-refresh") {
        let Some(payload) = jwt_payload(&refresh.value) else {
            warn!("refresh token is not a well-formed JWT");
            return false;
        };
        let iat = payload.get("iat").and_then(|v| v.as_i64()).unwrap_or(0);
        if iat > 0 && now - iat > MAX_TOKEN_AGE_SECS {
            warn!(
                issued_days_ago = (now - iat) / 86_400,
                "refresh token is too old"
            );
            return false;
        }
    }

    true
}

/// Decode the payload segment of a JWT. Returns `None` for anything that is
/// not a three-part token with a JSON object payload.
fn jwt_payload(token: &str) -> Option<serde_json::Value> {
    let mut parts = token.split('.');
    let (_header, payload, _sig) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let bytes = base64url_decode(payload)?;
    serde_json::from_slice(&bytes).ok()
}

/// Decode base64, accepting both the url-safe and standard alphabets and
/// tolerating missing padding.
fn base64url_decode(input: &str) -> Option<Vec<u8>> {
    fn value(b: u8) -> Option<u32> {
        match b {
            b'A'..=b'Z' => Some(u32::from(b - b'A')),
            b'a'..=b'z' => Some(u32::from(b - b'a') + 26),
            b'0'..=b'9' => Some(u32::from(b - b'0') + 52),
            b'+' | b'-' => Some(62),
            b'/' | b'_' => Some(63),
            _ => None,
        }
    }

    let trimmed = input.trim_end_matches('=');
    if trimmed.len() % 4 == 1 {
        return None;
    }

    let mut out = Vec::with_capacity(trimmed.len() * 3 / 4);
    let mut buf: u32 = 0;
    let mut bits = 0;
    for &b in trimmed.as_bytes() {
        buf = (buf << 6) | value(b)?;
        bits += 6;
        if bits >= 8 {
            bits -= 8;
            out.push((buf >> bits) as u8);
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b64url(data: &[u8]) -> String {
        const ALPHABET: &[u8; 64] =
            b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";
        let mut out = String::new();
        for chunk in data.chunks(3) {
            let mut buf = [0u8; 3];
            buf[..chunk.len()].copy_from_slice(chunk);
            let n = (u32::from(buf[0]) << 16) | (u32::from(buf[1]) << 8) | u32::from(buf[2]);
            let chars = [
                ALPHABET[(n >> 18) as usize & 63],
                ALPHABET[(n >> 12) as usize & 63],
                ALPHABET[(n >> 6) as usize & 63],
                ALPHABET[n as usize & 63],
            ];
            let take = match chunk.len() {
                1 => 2,
                2 => 3,
                _ => 4,
            };
            out.extend(chars[..take].iter().map(|&c| c as char));
        }
        out
    }

    fn jwt_with_iat(iat: i64) -> String {
        let header = b64url(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = b64url(format!(r#"{{"iat":{iat}}}"#).as_bytes());
        format!("{header}.{payload}.signature")
    }

    fn cookie(name: &str, value: &str, expires: f64) -> SavedCookie {
        SavedCookie {
            name: name.to_string(),
            value: value.to_string(),
            domain: ".wildberries.ru".to_string(),
            path: "/".to_string(),
            expires,
            http_only: true,
            secure: true,
            same_site: None,
        }
    }

    #[test]
    fn base64_decodes_both_alphabets_without_padding() {
        assert_eq!(base64url_decode("aGVsbG8").unwrap(), b"hello");
        assert_eq!(base64url_decode("aGVsbG8=").unwrap(), b"hello");
        // 0xfb 0xff encodes to -_ in url-safe and +/ in standard
        assert_eq!(base64url_decode("-_8").unwrap(), vec![0xfb, 0xff]);
        assert_eq!(base64url_decode("+/8").unwrap(), vec![0xfb, 0xff]);
        assert!(base64url_decode("!!!").is_none());
    }

    #[test]
    fn jwt_payload_extracts_claims() {
        let token = jwt_with_iat(1_700_000_000);
        let payload = jwt_payload(&token).unwrap();
        assert_eq!(payload["iat"], 1_700_000_000);

        assert!(jwt_payload("not-a-jwt").is_none());
        assert!(jwt_payload("a.b.c.d").is_none());
    }

    #[test]
    fn state_without_critical_cookies_is_invalid() {
        let now = 1_700_000_000;
        let state = SessionState::default();
        assert!(!is_state_valid(&state, now));

        let state = SessionState {
            cookies: vec![cookie("wbx-refresh", &jwt_with_iat(now), now as f64 + 1e6)],
            local_storage: BTreeMap::new(),
        };
        assert!(!is_state_valid(&state, now), "validation key missing");
    }

    #[test]
    fn expiring_critical_cookie_invalidates_state() {
        let now = 1_700_000_000i64;
        let fresh = jwt_with_iat(now - 3600);
        let mk = |refresh_expires: f64| SessionState {
            cookies: vec![
                cookie("wbx-refresh", &fresh, refresh_expires),
                cookie("wbx-validation-key", "v", now as f64 + 1e6),
            ],
            local_storage: BTreeMap::new(),
        };

        assert!(is_state_valid(&mk(now as f64 + 1e6), now));
        // expires within the one hour margin
        assert!(!is_state_valid(&mk(now as f64 + 600.0), now));
        // session cookies carry no expiry and pass the check
        assert!(is_state_valid(&mk(-1.0), now));
    }

    #[test]
    fn stale_refresh_token_invalidates_state() {
        let now = 1_700_000_000i64;
        let old = jwt_with_iat(now - 91 * 24 * 3600);
        let state = SessionState {
            cookies: vec![
                cookie("wbx-refresh", &old, now as f64 + 1e6),
                cookie("wbx-validation-key", "v", now as f64 + 1e6),
            ],
            local_storage: BTreeMap::new(),
        };
        assert!(!is_state_valid(&state, now));

        let garbage = SessionState {
            cookies: vec![
                cookie("wbx-refresh", "gibberish", now as f64 + 1e6),
                cookie("wbx-validation-key", "v", now as f64 + 1e6),
            ],
            local_storage: BTreeMap::new(),
        };
        assert!(!is_state_valid(&garbage, now));
    }

    #[test]
    fn webdriver_cookie_conversion_round_trips() {
        let saved = cookie("wbx-refresh", "tok", 1_900_000_000.0);
        let wire = saved.to_webdriver();
        assert_eq!(wire.expiry, Some(1_900_000_000));
        assert_eq!(wire.domain.as_deref(), Some(".wildberries.ru"));

        let back = SavedCookie::from_webdriver(&wire);
        assert_eq!(back.name, "wbx-refresh");
        assert_eq!(back.expires, 1_900_000_000.0);

        let session_only = SavedCookie::from_webdriver(&webdriver::Cookie {
            name: "s".into(),
            value: "v".into(),
            path: None,
            domain: None,
            secure: false,
            http_only: false,
            expiry: None,
            same_site: None,
        });
        assert_eq!(session_only.expires, -1.0);
        assert_eq!(session_only.path, "/");
        assert!(session_only.to_webdriver().expiry.is_none());
    }
}
