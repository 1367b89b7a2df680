//! Persisted cookie jar for the HTTP client
//!
//! Plays the browser's part in the session: the backend sets the refresh
//! credential as an HTTP-only cookie, the jar stores it and attaches it to
//! every credentialed request. Session code never reads individual cookies
//! back out, and there is no way to delete one from here; only a backend
//! `Set-Cookie` (for example from the logout endpoint) removes it.
//!
//! Cookies are host-only (the `Domain` attribute is ignored) and keyed by
//! host, so they are shared across ports the way browsers share them.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use cookie::Cookie;
use parking_lot::Mutex;
use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::storage::write_atomic;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredCookie {
    value: String,
    path: String,
    #[serde(default)]
    expires: Option<DateTime<Utc>>,
    #[serde(default)]
    secure: bool,
    #[serde(default)]
    http_only: bool,
}

impl StoredCookie {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|at| at <= now)
    }

    fn matches(&self, url: &Url) -> bool {
        if self.secure && url.scheme() != "https" {
            return false;
        }
        let path = url.path();
        if self.path == "/" || path == self.path {
            return true;
        }
        path.starts_with(&self.path)
            && (self.path.ends_with('/') || path[self.path.len()..].starts_with('/'))
    }
}

type HostCookies = BTreeMap<String, StoredCookie>;

/// Cookie store that survives restarts when opened from a file.
pub struct PersistentJar {
    path: Option<PathBuf>,
    hosts: Mutex<BTreeMap<String, HostCookies>>,
}

impl PersistentJar {
    /// Jar that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            hosts: Mutex::new(BTreeMap::new()),
        }
    }

    /// Load the jar from `path`, starting empty if the file is missing.
    pub fn open(path: PathBuf) -> Result<Self> {
        let hosts = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| Error::Storage(format!("reading {}: {e}", path.display())))?;
            serde_json::from_str(&contents)
                .map_err(|e| Error::Storage(format!("parsing {}: {e}", path.display())))?
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path: Some(path),
            hosts: Mutex::new(hosts),
        })
    }

    /// Number of unexpired cookies held.
    pub fn len(&self) -> usize {
        let now = Utc::now();
        self.hosts
            .lock()
            .values()
            .flat_map(|cookies| cookies.values())
            .filter(|c| !c.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn apply(&self, host: &str, raw: &str, default_path: &str, now: DateTime<Utc>) -> bool {
        let Some(parsed) = parse_set_cookie(raw, default_path, now) else {
            debug!(host, "ignoring unparsable set-cookie header");
            return false;
        };

        let mut hosts = self.hosts.lock();
        let cookies = hosts.entry(host.to_owned()).or_default();
        match parsed {
            SetCookie::Store { name, cookie } => {
                debug!(host, cookie = %name, http_only = cookie.http_only, "storing cookie");
                cookies.insert(name, cookie);
            }
            SetCookie::Delete { name } => {
                debug!(host, cookie = %name, "backend expired cookie");
                cookies.remove(&name);
            }
        }
        true
    }

    fn persist(&self) {
        let Some(path) = &self.path else {
            return;
        };
        let hosts = self.hosts.lock();
        if let Err(e) = write_atomic(path, &*hosts) {
            warn!(path = %path.display(), error = %e, "failed to persist cookie jar");
        }
    }
}

impl reqwest::cookie::CookieStore for PersistentJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let Some(host) = url.host_str() else {
            return;
        };
        let now = Utc::now();
        let default_path = default_cookie_path(url);
        let mut changed = false;
        for header in cookie_headers {
            if let Ok(raw) = header.to_str() {
                changed |= self.apply(host, raw, &default_path, now);
            }
        }
        if changed {
            self.persist();
        }
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        let host = url.host_str()?;
        let now = Utc::now();
        let hosts = self.hosts.lock();
        let pairs: Vec<String> = hosts
            .get(host)?
            .iter()
            .filter(|(_, c)| !c.is_expired(now) && c.matches(url))
            .map(|(name, c)| format!("{name}={}", c.value))
            .collect();
        if pairs.is_empty() {
            return None;
        }
        HeaderValue::from_str(&pairs.join("; ")).ok()
    }
}

enum SetCookie {
    Store { name: String, cookie: StoredCookie },
    Delete { name: String },
}

/// Directory of the request path, used when `Path` is absent.
fn default_cookie_path(url: &Url) -> String {
    let path = url.path();
    match path.rfind('/') {
        Some(0) | None => "/".into(),
        Some(idx) => path[..idx].to_owned(),
    }
}

fn parse_set_cookie(raw: &str, default_path: &str, now: DateTime<Utc>) -> Option<SetCookie> {
    let parsed = Cookie::parse(raw).ok()?;
    let name = parsed.name().trim();
    if name.is_empty() {
        return None;
    }

    let path = parsed
        .path()
        .filter(|p| p.starts_with('/'))
        .unwrap_or(default_path);
    let expires = match parsed.max_age() {
        // Max-Age wins over Expires
        Some(max_age) => Some(expiry_after(now, max_age.whole_seconds())),
        None => parsed.expires_datetime().map(|at| {
            DateTime::from_timestamp(at.unix_timestamp(), 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
        }),
    };
    let cookie = StoredCookie {
        value: parsed.value_trimmed().to_owned(),
        path: path.to_owned(),
        expires,
        secure: parsed.secure().unwrap_or(false),
        http_only: parsed.http_only().unwrap_or(false),
    };

    if cookie.is_expired(now) {
        return Some(SetCookie::Delete {
            name: name.to_owned(),
        });
    }
    Some(SetCookie::Store {
        name: name.to_owned(),
        cookie,
    })
}

/// `now + secs`, saturating at the far future for lifetimes chrono can't
/// represent.
fn expiry_after(now: DateTime<Utc>, secs: i64) -> DateTime<Utc> {
    if secs <= 0 {
        return now;
    }
    Duration::try_seconds(secs)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::cookie::CookieStore;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn set(jar: &PersistentJar, raw: &'static str, at: &str) {
        let header = HeaderValue::from_static(raw);
        jar.set_cookies(&mut std::iter::once(&header), &url(at));
    }

    #[test]
    fn http_only_cookie_is_sent_back_to_same_host() {
        let jar = PersistentJar::in_memory();
        set(
            &jar,
            "refresh_token=rt1; Path=/; HttpOnly; SameSite=None",
            "http://api.local:8080/github/callback",
        );

        let header = jar.cookies(&url("http://api.local:8080/api/refresh-token")).unwrap();
        assert_eq!(header.to_str().unwrap(), "refresh_token=rt1");
        assert!(jar.cookies(&url("http://other.local/api/refresh-token")).is_none());
    }

    #[test]
    fn max_age_zero_removes_cookie() {
        let jar = PersistentJar::in_memory();
        set(&jar, "refresh_token=rt1; Path=/", "http://api.local/");
        assert_eq!(jar.len(), 1);

        set(&jar, "refresh_token=; Path=/; Max-Age=0", "http://api.local/logout");
        assert!(jar.is_empty());
        assert!(jar.cookies(&url("http://api.local/")).is_none());
    }

    #[test]
    fn past_expires_removes_cookie() {
        let jar = PersistentJar::in_memory();
        set(&jar, "session=s1; Path=/", "http://api.local/");
        set(
            &jar,
            "session=; Path=/; Expires=Thu, 01 Jan 1970 00:00:00 GMT",
            "http://api.local/",
        );
        assert!(jar.is_empty());
    }

    #[test]
    fn legacy_expires_format_removes_cookie() {
        let jar = PersistentJar::in_memory();
        set(&jar, "refresh_token=rt1; Path=/", "http://api.local/");
        set(
            &jar,
            "refresh_token=; Path=/; Expires=Thursday, 01-Jan-70 00:00:00 GMT",
            "http://api.local/logout",
        );
        assert!(jar.is_empty());
    }

    #[test]
    fn huge_max_age_keeps_cookie() {
        let jar = PersistentJar::in_memory();
        set(
            &jar,
            "refresh_token=rt1; Path=/; Max-Age=100000000000000",
            "http://api.local/",
        );
        assert_eq!(jar.len(), 1);
        let header = jar.cookies(&url("http://api.local/")).unwrap();
        assert_eq!(header.to_str().unwrap(), "refresh_token=rt1");
    }

    #[test]
    fn expiry_saturates_instead_of_overflowing() {
        let now = Utc::now();
        assert_eq!(expiry_after(now, i64::MAX), DateTime::<Utc>::MAX_UTC);
        assert_eq!(expiry_after(now, -5), now);
        assert_eq!(expiry_after(now, 60), now + Duration::seconds(60));
    }

    #[test]
    fn secure_cookie_not_sent_over_http() {
        let jar = PersistentJar::in_memory();
        set(&jar, "refresh_token=rt1; Path=/; Secure", "https://api.local/");
        assert!(jar.cookies(&url("http://api.local/")).is_none());
        assert!(jar.cookies(&url("https://api.local/")).is_some());
    }

    #[test]
    fn path_scoping() {
        let jar = PersistentJar::in_memory();
        set(&jar, "scoped=1; Path=/api", "http://api.local/");
        assert!(jar.cookies(&url("http://api.local/api/refresh-token")).is_some());
        assert!(jar.cookies(&url("http://api.local/apiary")).is_none());
        assert!(jar.cookies(&url("http://api.local/github/profile")).is_none());
    }

    #[test]
    fn default_path_is_request_directory() {
        assert_eq!(default_cookie_path(&url("http://a/github/callback")), "/github");
        assert_eq!(default_cookie_path(&url("http://a/logout")), "/");
    }

    #[test]
    fn jar_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.json");

        let jar = PersistentJar::open(path.clone()).unwrap();
        set(&jar, "refresh_token=rt1; Path=/; HttpOnly", "http://api.local/");

        let reopened = PersistentJar::open(path).unwrap();
        assert_eq!(reopened.len(), 1);
        let header = reopened.cookies(&url("http://api.local/")).unwrap();
        assert_eq!(header.to_str().unwrap(), "refresh_token=rt1");
    }

    #[test]
    fn garbage_header_is_ignored() {
        let jar = PersistentJar::in_memory();
        set(&jar, "no-equals-sign", "http://api.local/");
        assert!(jar.is_empty());
    }
}
