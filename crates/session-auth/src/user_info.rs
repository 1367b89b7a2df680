//! Display-only user info cookie
//!
//! Cached profile data for headers and menus. Written whenever a profile
//! fetch returns a `user` object, read by anything that wants to show who is
//! signed in. Never consulted for an authorization decision.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{USER_INFO_KEY, USER_INFO_TTL_DAYS};
use crate::error::{Error, Result};
use crate::storage::Storage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    Lax,
    None,
}

/// Cookie attributes chosen per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CookiePolicy {
    pub secure: bool,
    pub same_site: SameSite,
}

impl CookiePolicy {
    /// `secure` follows the app's protocol; cross-domain deployments need
    /// `SameSite=None`.
    pub fn for_deployment(app_is_https: bool, cross_domain: bool) -> Self {
        Self {
            secure: app_is_https,
            same_site: if cross_domain {
                SameSite::None
            } else {
                SameSite::Lax
            },
        }
    }
}

impl Default for CookiePolicy {
    fn default() -> Self {
        Self::for_deployment(false, false)
    }
}

/// GitHub user object as returned by the profile endpoint. Kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserInfo(pub serde_json::Value);

impl UserInfo {
    fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key)?.as_str().filter(|s| !s.is_empty())
    }

    /// Display name, falling back to the login handle.
    pub fn name(&self) -> Option<&str> {
        self.str_field("name").or_else(|| self.str_field("login"))
    }

    pub fn login(&self) -> Option<&str> {
        self.str_field("login")
    }

    pub fn avatar_url(&self) -> Option<&str> {
        self.str_field("avatar_url")
    }

    pub fn profile_url(&self) -> Option<&str> {
        self.str_field("html_url")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfoCookie {
    pub user: UserInfo,
    pub expires_at: DateTime<Utc>,
    pub path: String,
    pub same_site: SameSite,
    pub secure: bool,
}

#[derive(Clone)]
pub struct UserInfoStore {
    storage: Arc<dyn Storage>,
}

impl UserInfoStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Cache `user` for `USER_INFO_TTL_DAYS`.
    pub fn set(&self, user: &UserInfo, policy: CookiePolicy) -> Result<()> {
        self.set_at(user, policy, Utc::now())
    }

    pub fn set_at(&self, user: &UserInfo, policy: CookiePolicy, now: DateTime<Utc>) -> Result<()> {
        let cookie = UserInfoCookie {
            user: user.clone(),
            expires_at: now + Duration::days(USER_INFO_TTL_DAYS),
            path: "/".into(),
            same_site: policy.same_site,
            secure: policy.secure,
        };
        let json = serde_json::to_string(&cookie)
            .map_err(|e| Error::Storage(format!("serializing user info: {e}")))?;
        self.storage.set(USER_INFO_KEY, &json)?;
        debug!(expires_at = %cookie.expires_at, "user info cookie set");
        Ok(())
    }

    /// The cached user, unless missing, unreadable or expired.
    pub fn get(&self) -> Option<UserInfo> {
        self.get_at(Utc::now())
    }

    pub fn get_at(&self, now: DateTime<Utc>) -> Option<UserInfo> {
        let raw = self.storage.get(USER_INFO_KEY)?;
        let cookie: UserInfoCookie = match serde_json::from_str(&raw) {
            Ok(c) => c,
            Err(e) => {
                debug!(error = %e, "ignoring unreadable user info cookie");
                return None;
            }
        };
        (cookie.expires_at > now).then_some(cookie.user)
    }

    pub fn clear(&self) -> Result<()> {
        self.storage.remove(USER_INFO_KEY)
    }
}
