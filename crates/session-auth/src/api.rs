//! Backend session endpoints
//!
//! One function per endpoint the session layer talks to. Each takes the
//! shared `reqwest::Client` (whose cookie store supplies the ambient
//! credentials) and reports the typed `Error` taxonomy: network failure,
//! unauthorized, other status, malformed body.
//!
//! The client is expected to be built with redirects disabled: a 3xx from the
//! callback endpoint is the backend finishing the OAuth flow, not something to
//! chase onto the app origin.

use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::constants::{
    GITHUB_CALLBACK_PATH, GITHUB_LOGIN_PATH, GITHUB_PROFILE_PATH, LOGOUT_PATH,
    REFRESH_TOKEN_PATH, STATUS_PATH, USER_AUTH_TOKEN_PATH,
};
use crate::error::{Error, Result};
use crate::user_info::UserInfo;

/// Resolves backend paths against the API base URL.
#[derive(Debug, Clone)]
pub struct Endpoints {
    base: Url,
}

impl Endpoints {
    /// `base` may carry a path prefix; it is treated as a directory.
    pub fn new(base: &str) -> Result<Self> {
        let mut base = Url::parse(base)?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(Error::Url(format!("unsupported scheme: {}", base.scheme())));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.set_query(None);
        base.set_fragment(None);
        Ok(Self { base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn url(&self, path: &str) -> Result<Url> {
        Ok(self.base.join(path.trim_start_matches('/'))?)
    }

    /// Where the browser goes to start GitHub sign-in.
    pub fn login_url(&self) -> Result<Url> {
        self.url(GITHUB_LOGIN_PATH)
    }
}

/// Body of a successful refresh. Every field is optional on the wire so a
/// 200 without a token is reported as malformed rather than a parse error.
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    #[serde(default)]
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    user: Option<UserInfo>,
}

/// A session recovered from the profile endpoint.
#[derive(Debug)]
pub struct Profile {
    pub access_token: String,
    pub user: Option<UserInfo>,
}

fn network(context: &str, e: reqwest::Error) -> Error {
    Error::Network(format!("{context}: {e}"))
}

fn non_blank(token: Option<String>) -> Option<String> {
    token.filter(|t| !t.trim().is_empty())
}

/// Ask the backend whether `token` is valid. Any 2xx means yes.
pub async fn check_access_token(
    client: &reqwest::Client,
    endpoints: &Endpoints,
    token: &str,
) -> Result<()> {
    let response = client
        .get(endpoints.url(USER_AUTH_TOKEN_PATH)?)
        .bearer_auth(token)
        .send()
        .await
        .map_err(|e| network("token check", e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::from_status(status.as_u16()));
    }
    Ok(())
}

/// Trade the refresh cookie for a new access token.
///
/// A success status whose body is not JSON, or lacks a non-empty
/// `access_token`, is `Malformed`.
pub async fn refresh_access_token(client: &reqwest::Client, endpoints: &Endpoints) -> Result<String> {
    let response = client
        .post(endpoints.url(REFRESH_TOKEN_PATH)?)
        .send()
        .await
        .map_err(|e| network("token refresh", e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::from_status(status.as_u16()));
    }

    let body = response
        .json::<RefreshResponse>()
        .await
        .map_err(|e| Error::Malformed(format!("refresh body: {e}")))?;

    non_blank(body.access_token)
        .ok_or_else(|| Error::Malformed("refresh body has no access_token".into()))
}

/// Credentialed profile fetch.
///
/// A body carrying only a `refresh_token` means the backend still knows the
/// refresh cookie but did not mint an access token; that is not a session.
pub async fn fetch_profile(client: &reqwest::Client, endpoints: &Endpoints) -> Result<Profile> {
    let response = client
        .get(endpoints.url(GITHUB_PROFILE_PATH)?)
        .send()
        .await
        .map_err(|e| network("profile fetch", e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::from_status(status.as_u16()));
    }

    let body = response
        .json::<ProfileResponse>()
        .await
        .map_err(|e| Error::Malformed(format!("profile body: {e}")))?;

    let has_refresh_only = body.refresh_token.is_some() && body.user.is_none();
    match non_blank(body.access_token) {
        Some(access_token) => Ok(Profile {
            access_token,
            user: body.user,
        }),
        None if has_refresh_only => Err(Error::Malformed(
            "profile body carries only a refresh token".into(),
        )),
        None => Err(Error::Malformed("profile body has no access_token".into())),
    }
}

/// Hand a one-time OAuth callback code to the backend. 2xx and 3xx both mean
/// the backend accepted it and set its session cookies.
pub async fn exchange_callback_code(
    client: &reqwest::Client,
    endpoints: &Endpoints,
    code: &str,
) -> Result<()> {
    let mut url = endpoints.url(GITHUB_CALLBACK_PATH)?;
    url.query_pairs_mut().append_pair("code", code);

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| network("callback exchange", e))?;

    let status = response.status();
    if status.is_success() || status.is_redirection() {
        debug!(status = status.as_u16(), "callback code accepted");
        return Ok(());
    }
    Err(Error::from_status(status.as_u16()))
}

/// Ask the backend to end the session and expire the refresh cookie.
pub async fn logout(client: &reqwest::Client, endpoints: &Endpoints) -> Result<()> {
    let response = client
        .post(endpoints.url(LOGOUT_PATH)?)
        .send()
        .await
        .map_err(|e| network("logout", e))?;

    let status = response.status();
    if !status.is_success() && !status.is_redirection() {
        return Err(Error::from_status(status.as_u16()));
    }
    Ok(())
}

/// Reachability check. Any response at all counts: the point is whether the
/// backend can be reached before sending the user off to sign in.
pub async fn backend_status(client: &reqwest::Client, endpoints: &Endpoints) -> Result<u16> {
    let response = client
        .get(endpoints.url(STATUS_PATH)?)
        .send()
        .await
        .map_err(|e| network("status check", e))?;
    Ok(response.status().as_u16())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_join_relative_paths() {
        let endpoints = Endpoints::new("http://localhost:8080").unwrap();
        assert_eq!(
            endpoints.url(REFRESH_TOKEN_PATH).unwrap().as_str(),
            "http://localhost:8080/api/refresh-token"
        );
        assert_eq!(
            endpoints.url("/github/profile").unwrap().as_str(),
            "http://localhost:8080/github/profile"
        );
    }

    #[test]
    fn endpoints_keep_base_path_prefix() {
        let endpoints = Endpoints::new("https://example.com/backend").unwrap();
        assert_eq!(
            endpoints.url(USER_AUTH_TOKEN_PATH).unwrap().as_str(),
            "https://example.com/backend/api/user-auth-token"
        );
    }

    #[test]
    fn login_url_points_at_github_login() {
        let endpoints = Endpoints::new("https://api.nannyai.com").unwrap();
        assert_eq!(
            endpoints.login_url().unwrap().as_str(),
            "https://api.nannyai.com/github/login"
        );
    }

    #[test]
    fn endpoints_reject_non_http_schemes() {
        assert!(matches!(Endpoints::new("ftp://example.com"), Err(Error::Url(_))));
        assert!(matches!(Endpoints::new("not a url"), Err(Error::Url(_))));
    }

    #[test]
    fn refresh_body_without_token_deserializes() {
        let body: RefreshResponse = serde_json::from_str(r#"{"message":"ok"}"#).unwrap();
        assert!(non_blank(body.access_token).is_none());
    }

    #[test]
    fn profile_body_deserializes_user() {
        let json = r#"{"access_token":"tok1","user":{"login":"octocat"}}"#;
        let body: ProfileResponse = serde_json::from_str(json).unwrap();
        assert_eq!(body.access_token.as_deref(), Some("tok1"));
        assert_eq!(body.user.unwrap().login(), Some("octocat"));
    }
}
