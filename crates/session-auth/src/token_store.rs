//! Access token persistence
//!
//! The durable storage entry under `ACCESS_TOKEN_KEY` is the only copy of the
//! access token on the client. Reads are synchronous and never touch the
//! network; expiry is never tracked here, it is discovered by asking the
//! backend.

use std::sync::Arc;

use common::Secret;
use tracing::debug;

use crate::constants::ACCESS_TOKEN_KEY;
use crate::error::Result;
use crate::storage::Storage;

#[derive(Clone)]
pub struct TokenStore {
    storage: Arc<dyn Storage>,
}

impl TokenStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// The current access token, if one is held. A blank entry counts as absent.
    pub fn get_access_token(&self) -> Option<Secret<String>> {
        let token = Secret::new(self.storage.get(ACCESS_TOKEN_KEY)?);
        (!token.is_blank()).then_some(token)
    }

    /// Replace the current access token.
    pub fn set_access_token(&self, token: &str) -> Result<()> {
        self.storage.set(ACCESS_TOKEN_KEY, token)?;
        debug!("access token replaced");
        Ok(())
    }

    /// Forget the access token.
    ///
    /// The refresh credential is an HTTP-only cookie owned by the backend;
    /// clearing it takes a call to the logout endpoint.
    pub fn clear_access_token(&self) -> Result<()> {
        self.storage.remove(ACCESS_TOKEN_KEY)?;
        debug!("access token cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn store() -> TokenStore {
        TokenStore::new(Arc::new(MemoryStorage::new()))
    }

    #[test]
    fn absent_until_set() {
        let tokens = store();
        assert!(tokens.get_access_token().is_none());
        tokens.set_access_token("tok0").unwrap();
        assert_eq!(tokens.get_access_token().unwrap().expose(), "tok0");
    }

    #[test]
    fn repeated_reads_agree() {
        let tokens = store();
        tokens.set_access_token("tok0").unwrap();
        let first = tokens.get_access_token().map(|t| t.expose().clone());
        let second = tokens.get_access_token().map(|t| t.expose().clone());
        assert_eq!(first, second);
    }

    #[test]
    fn set_overwrites_and_is_idempotent() {
        let tokens = store();
        tokens.set_access_token("tok0").unwrap();
        tokens.set_access_token("tok1").unwrap();
        tokens.set_access_token("tok1").unwrap();
        assert_eq!(tokens.get_access_token().unwrap().expose(), "tok1");
    }

    #[test]
    fn clear_removes_token() {
        let tokens = store();
        tokens.set_access_token("tok0").unwrap();
        tokens.clear_access_token().unwrap();
        assert!(tokens.get_access_token().is_none());
        tokens.clear_access_token().unwrap();
    }

    #[test]
    fn blank_token_reads_as_absent() {
        let tokens = store();
        tokens.set_access_token("  ").unwrap();
        assert!(tokens.get_access_token().is_none());
    }

    #[test]
    fn clones_share_storage() {
        let tokens = store();
        let other = tokens.clone();
        tokens.set_access_token("tok9").unwrap();
        assert_eq!(other.get_access_token().unwrap().expose(), "tok9");
    }
}
