//! Client-side session library for the NannyAI dashboard API
//!
//! Owns the three independently held pieces of session state and the calls
//! that move them:
//!
//! - the bearer access token, kept in durable storage by `TokenStore`
//! - the refresh credential, an HTTP-only cookie that only ever lives in the
//!   `PersistentJar` attached to the HTTP client and is never read here
//! - the display-only user-info cookie, kept by `UserInfoStore`
//!
//! Session flow:
//! 1. `SessionClient::validate_access_token()` asks the backend about the held token
//! 2. `SessionClient::refresh_tokens()` trades the refresh cookie for a new token
//! 3. `SessionClient::fetch_profile_direct()` recovers a token from the session
//!    cookie when the app and API live on different origins
//! 4. `SessionClient::logout()` asks the backend to drop the refresh cookie and
//!    clears local state
//!
//! The boolean methods never fail: every error is logged and flattened to
//! `false`. The `try_*` variants keep the typed `Error` for callers that need
//! to know why.

pub mod api;
pub mod constants;
pub mod error;
pub mod jar;
pub mod session;
pub mod storage;
pub mod token_store;
pub mod user_info;

pub use api::{Endpoints, Profile};
pub use error::{Error, Result};
pub use jar::PersistentJar;
pub use session::{SessionClient, http_client};
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use token_store::TokenStore;
pub use user_info::{CookiePolicy, SameSite, UserInfo, UserInfoCookie, UserInfoStore};
