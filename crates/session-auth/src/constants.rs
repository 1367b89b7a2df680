//! Backend paths and storage keys
//!
//! Paths are relative so they join onto an API base URL that may carry its
//! own path prefix.

/// Token check: GET with bearer header, 2xx means valid
pub const USER_AUTH_TOKEN_PATH: &str = "api/user-auth-token";

/// Refresh: POST with the refresh cookie, body `{ access_token }`
pub const REFRESH_TOKEN_PATH: &str = "api/refresh-token";

/// Profile probe: GET with cookies, body `{ access_token, user }`
pub const GITHUB_PROFILE_PATH: &str = "github/profile";

/// OAuth callback exchange: GET `?code=...` with cookies
pub const GITHUB_CALLBACK_PATH: &str = "github/callback";

/// Browser entry point of the GitHub OAuth flow
pub const GITHUB_LOGIN_PATH: &str = "github/login";

/// Logout: POST with cookies, best effort
pub const LOGOUT_PATH: &str = "logout";

/// Reachability check used before starting a login
pub const STATUS_PATH: &str = "status";

/// Durable storage key holding the access token
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// Durable storage key holding the user-info cookie
pub const USER_INFO_KEY: &str = "userinfo";

/// Lifetime of the user-info cookie
pub const USER_INFO_TTL_DAYS: i64 = 7;
