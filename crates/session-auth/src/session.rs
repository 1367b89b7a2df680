//! Session utilities over the backend endpoints
//!
//! `SessionClient` is the single owner of client session state: one instance
//! holds the HTTP client (and through it the cookie jar), the token store and
//! the user-info store, and is shared by reference with everything that
//! needs the session. The boolean methods are the guard-facing surface and
//! never fail; the `try_*` methods keep the error for diagnostics.

use std::sync::Arc;
use std::time::Duration;

use common::Secret;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::api::{self, Endpoints};
use crate::error::{Error, Result};
use crate::jar::PersistentJar;
use crate::storage::Storage;
use crate::token_store::TokenStore;
use crate::user_info::{CookiePolicy, UserInfo, UserInfoStore};

pub struct SessionClient {
    http: reqwest::Client,
    endpoints: Endpoints,
    tokens: TokenStore,
    user_info: UserInfoStore,
    cookie_policy: CookiePolicy,
    /// Serializes refreshes so two callers never spend the same refresh
    /// credential; some backends rotate it on use.
    refresh_flight: Mutex<()>,
}

/// Build the HTTP client the session layer expects: cookies from `jar` on
/// every request, no redirect following, bounded request time.
pub fn http_client(jar: Arc<PersistentJar>, timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .cookie_provider(jar)
        .redirect(reqwest::redirect::Policy::none())
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Client(e.to_string()))
}

fn same_token(a: &Option<Secret<String>>, b: &Option<Secret<String>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.expose() == b.expose(),
        (None, None) => true,
        _ => false,
    }
}

impl SessionClient {
    pub fn new(
        http: reqwest::Client,
        endpoints: Endpoints,
        storage: Arc<dyn Storage>,
        cookie_policy: CookiePolicy,
    ) -> Self {
        Self {
            http,
            endpoints,
            tokens: TokenStore::new(storage.clone()),
            user_info: UserInfoStore::new(storage),
            cookie_policy,
            refresh_flight: Mutex::new(()),
        }
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn user_info(&self) -> &UserInfoStore {
        &self.user_info
    }

    pub fn get_access_token(&self) -> Option<Secret<String>> {
        self.tokens.get_access_token()
    }

    pub fn set_access_token(&self, token: &str) -> Result<()> {
        self.tokens.set_access_token(token)
    }

    pub fn clear_access_token(&self) -> Result<()> {
        self.tokens.clear_access_token()
    }

    /// Check the held token with the backend. `NoToken` without a request
    /// when none is held.
    pub async fn try_validate(&self) -> Result<()> {
        let token = self.tokens.get_access_token().ok_or(Error::NoToken)?;
        api::check_access_token(&self.http, &self.endpoints, token.expose()).await
    }

    pub async fn validate_access_token(&self) -> bool {
        match self.try_validate().await {
            Ok(()) => true,
            Err(e) => {
                debug!(kind = e.label(), error = %e, "access token not valid");
                false
            }
        }
    }

    /// Refresh the access token from the refresh cookie.
    ///
    /// Callers queue behind any refresh already in flight. If the token
    /// changed while waiting, that refresh's result is reused and no request
    /// is made.
    pub async fn try_refresh(&self) -> Result<()> {
        let before = self.tokens.get_access_token();
        let _flight = self.refresh_flight.lock().await;

        let current = self.tokens.get_access_token();
        if current.is_some() && !same_token(&before, &current) {
            debug!("token already replaced by a concurrent refresh");
            return Ok(());
        }

        let token = api::refresh_access_token(&self.http, &self.endpoints).await?;
        self.tokens.set_access_token(&token)?;
        info!("access token refreshed");
        Ok(())
    }

    pub async fn refresh_tokens(&self) -> bool {
        match self.try_refresh().await {
            Ok(()) => true,
            Err(e) => {
                debug!(kind = e.label(), error = %e, "token refresh failed");
                false
            }
        }
    }

    /// Credentialed profile fetch: stores the recovered access token and, if
    /// the body carries a user, refreshes the user-info cookie.
    pub async fn try_fetch_profile(&self) -> Result<Option<UserInfo>> {
        let profile = api::fetch_profile(&self.http, &self.endpoints).await?;
        self.tokens.set_access_token(&profile.access_token)?;

        if let Some(user) = &profile.user {
            // Display-only; losing it does not affect the session
            if let Err(e) = self.user_info.set(user, self.cookie_policy) {
                warn!(error = %e, "failed to store user info cookie");
            }
        }
        info!(has_user = profile.user.is_some(), "session recovered from profile");
        Ok(profile.user)
    }

    pub async fn fetch_profile_direct(&self) -> bool {
        match self.try_fetch_profile().await {
            Ok(_) => true,
            Err(e) => {
                debug!(kind = e.label(), error = %e, "profile probe failed");
                false
            }
        }
    }

    /// Hand an OAuth callback code to the backend.
    pub async fn try_exchange_code(&self, code: &str) -> Result<()> {
        api::exchange_callback_code(&self.http, &self.endpoints, code).await
    }

    /// End the session. The local token and user-info cookie are cleared
    /// whatever the backend says; the backend call result is returned for
    /// reporting only.
    pub async fn logout(&self) -> Result<()> {
        let remote = api::logout(&self.http, &self.endpoints).await;
        if let Err(e) = &remote {
            warn!(kind = e.label(), error = %e, "backend logout failed, clearing local session anyway");
        }

        self.tokens.clear_access_token()?;
        self.user_info.clear()?;
        info!("signed out");
        remote
    }

    /// Whether the backend answers at all.
    pub async fn backend_reachable(&self) -> bool {
        match api::backend_status(&self.http, &self.endpoints).await {
            Ok(status) => {
                debug!(status, "backend reachable");
                true
            }
            Err(e) => {
                warn!(error = %e, "backend unreachable");
                false
            }
        }
    }

    pub fn login_url(&self) -> Result<Url> {
        self.endpoints.login_url()
    }
}
