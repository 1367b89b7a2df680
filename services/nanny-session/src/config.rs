//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! Only an explicitly named config file has to exist; without one the
//! built-in defaults (plus env overrides) are used.

use serde::Deserialize;
use session_auth::CookiePolicy;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

const DEFAULT_CONFIG_FILE: &str = "nanny-session.toml";

/// Root configuration
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub app: AppConfig,
    pub session: SessionConfig,
}

/// Backend API settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

/// Dashboard app settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Origin the dashboard is served from
    pub origin: String,
    /// Public page unauthenticated users land on
    pub entry_path: String,
}

/// Local session state settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub state_dir: PathBuf,
    pub step_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".into(),
            timeout_secs: 30,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:8080".into(),
            entry_path: "/".into(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(".nanny-session"),
            step_timeout_secs: 15,
        }
    }
}

fn parse_http_url(field: &str, value: &str) -> common::Result<Url> {
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(url),
        _ => Err(common::Error::InvalidUrl {
            field: field.to_owned(),
            value: value.to_owned(),
        }),
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load from the resolved path. A missing file is only an error when the
    /// path was named explicitly (CLI arg or CONFIG_PATH).
    pub fn load_resolved(cli_path: Option<&str>) -> common::Result<(PathBuf, Self)> {
        let path = Self::resolve_path(cli_path);
        let explicit = cli_path.is_some() || std::env::var_os("CONFIG_PATH").is_some();
        if !explicit && !path.exists() {
            let mut config = Config::default();
            config.apply_env();
            config.validate()?;
            return Ok((path, config));
        }
        let config = Self::load(&path)?;
        Ok((path, config))
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from(DEFAULT_CONFIG_FILE)
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("NANNY_API_URL") {
            self.api.base_url = url;
        }
        if let Ok(origin) = std::env::var("NANNY_APP_ORIGIN") {
            self.app.origin = origin;
        }
        if let Ok(dir) = std::env::var("NANNY_STATE_DIR") {
            self.session.state_dir = PathBuf::from(dir);
        }
    }

    /// Apply command-line overrides, which win over everything else.
    pub fn apply_cli(
        &mut self,
        api_url: Option<String>,
        app_origin: Option<String>,
    ) -> common::Result<()> {
        if let Some(url) = api_url {
            self.api.base_url = url;
        }
        if let Some(origin) = app_origin {
            self.app.origin = origin;
        }
        self.validate()
    }

    pub fn validate(&self) -> common::Result<()> {
        parse_http_url("api.base_url", &self.api.base_url)?;
        parse_http_url("app.origin", &self.app.origin)?;

        if self.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }
        if self.session.step_timeout_secs == 0 {
            return Err(common::Error::Config(
                "step_timeout_secs must be greater than 0".into(),
            ));
        }
        if !self.app.entry_path.starts_with('/') {
            return Err(common::Error::Config(format!(
                "entry_path must start with /, got: {}",
                self.app.entry_path
            )));
        }
        Ok(())
    }

    pub fn api_url(&self) -> common::Result<Url> {
        parse_http_url("api.base_url", &self.api.base_url)
    }

    pub fn app_origin(&self) -> common::Result<Url> {
        parse_http_url("app.origin", &self.app.origin)
    }

    /// The app and the API are served from different origins.
    pub fn cross_domain(&self) -> common::Result<bool> {
        Ok(self.app_origin()?.origin() != self.api_url()?.origin())
    }

    /// Attributes for the user-info cookie in this deployment.
    pub fn cookie_policy(&self) -> common::Result<CookiePolicy> {
        let app_is_https = self.app_origin()?.scheme() == "https";
        Ok(CookiePolicy::for_deployment(app_is_https, self.cross_domain()?))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.session.step_timeout_secs)
    }

    pub fn session_file(&self) -> PathBuf {
        self.session.state_dir.join("session.json")
    }

    pub fn cookie_file(&self) -> PathBuf {
        self.session.state_dir.join("cookies.json")
    }
}
