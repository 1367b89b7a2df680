//! NannyAI session client
//!
//! Command-line front end to the dashboard session layer:
//! 1. Loads config (CLI > env > file > defaults)
//! 2. Opens the persisted token storage and cookie jar
//! 3. Runs the route guard against a dashboard location, or one of the
//!    session utilities / dashboard API calls directly

mod api;
mod config;
mod effects;
mod error;
mod provider_impl;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use route_guard::{AuthState, GuardConfig, Location, Rendered, RouteGuard};
use session_auth::{FileStorage, PersistentJar, SessionClient, http_client};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::{AgentInfo, DashboardClient, DiagnosticRequest};
use crate::config::Config;
use crate::effects::ConsoleEffects;
use crate::error::ApiError;
use crate::provider_impl::HttpSessionProvider;

/// NannyAI session client: check, refresh and use a dashboard session.
#[derive(Parser)]
#[command(name = "nanny-session")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: $CONFIG_PATH or ./nanny-session.toml)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Backend API base URL (overrides NANNY_API_URL and the config file)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Dashboard origin (overrides NANNY_APP_ORIGIN and the config file)
    #[arg(long, global = true)]
    app_origin: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the route guard for a dashboard location
    Check {
        /// App path or URL, e.g. "/dashboard?code=abc"
        #[arg(default_value = "/dashboard")]
        location: String,
    },

    /// Inspect or change the stored access token
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },

    /// Check the stored access token with the backend
    Validate,

    /// Trade the refresh cookie for a new access token
    Refresh,

    /// Recover a session from the profile endpoint
    Probe,

    /// End the session
    Logout,

    /// Show where to sign in
    Login,

    /// Show the signed-in user
    Whoami,

    /// List agents
    Agents,

    /// Register an agent, or update the one with the same hostname
    RegisterAgent {
        #[arg(long)]
        hostname: String,
        #[arg(long)]
        os_version: String,
        #[arg(long)]
        kernel_version: String,
        #[arg(long)]
        ip_address: String,
    },

    /// Start a diagnostic for an agent
    Diagnose {
        #[arg(long)]
        agent: String,
        #[arg(long)]
        issue: String,
    },

    /// Work with an existing diagnostic
    Diagnostic {
        #[command(subcommand)]
        command: DiagnosticCommands,
    },

    /// Dashboard statistics and recent activity
    Stats,
}

#[derive(Subcommand)]
enum TokenCommands {
    /// Print the stored token
    Show,
    /// Store a token
    Set { token: String },
    /// Remove the stored token
    Clear,
}

#[derive(Subcommand)]
enum DiagnosticCommands {
    /// Show a diagnostic and its conversation
    Show { id: String },
    /// Send command output back to a diagnostic
    Continue {
        id: String,
        #[arg(long)]
        agent: String,
        #[arg(long)]
        output: String,
    },
    /// Delete a diagnostic
    Delete { id: String },
}

/// Everything a command may need, built once from config.
struct App {
    config: Config,
    session: Arc<SessionClient>,
}

impl App {
    fn open(config: Config) -> Result<Self> {
        let jar_path = config.cookie_file();
        let jar = PersistentJar::open(jar_path.clone())
            .with_context(|| format!("failed to open cookie jar {}", jar_path.display()))?;
        let storage_path = config.session_file();
        let storage = FileStorage::open(storage_path.clone())
            .with_context(|| format!("failed to open session storage {}", storage_path.display()))?;

        let http = http_client(Arc::new(jar), config.request_timeout())
            .context("failed to build HTTP client")?;
        let endpoints = session_auth::Endpoints::new(&config.api.base_url)
            .context("invalid api.base_url")?;
        let session = SessionClient::new(
            http,
            endpoints,
            Arc::new(storage),
            config.cookie_policy()?,
        );

        Ok(Self {
            config,
            session: Arc::new(session),
        })
    }

    fn dashboard(&self) -> DashboardClient {
        DashboardClient::new(self.session.clone())
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Initialize tracing with JSON output on stderr and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();

    let (config_path, mut config) = Config::load_resolved(cli.config.as_deref())
        .context("failed to load configuration")?;
    config
        .apply_cli(cli.api_url, cli.app_origin)
        .context("invalid command-line override")?;

    let cross_domain = config.cross_domain()?;
    info!(
        path = %config_path.display(),
        api_url = %config.api.base_url,
        app_origin = %config.app.origin,
        cross_domain,
        "configuration loaded"
    );

    let app = App::open(config)?;
    run(&app, cli.command).await
}

fn exit_for(ok: bool) -> ExitCode {
    if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

async fn run(app: &App, command: Commands) -> Result<ExitCode> {
    let session = &app.session;
    match command {
        Commands::Check { location } => check(app, &location).await,

        Commands::Token { command } => {
            match command {
                TokenCommands::Show => match session.get_access_token() {
                    Some(token) => println!("{}", token.expose()),
                    None => {
                        println!("no access token stored");
                        return Ok(ExitCode::FAILURE);
                    }
                },
                TokenCommands::Set { token } => {
                    session.set_access_token(&token)?;
                    println!("access token stored");
                }
                TokenCommands::Clear => {
                    session.clear_access_token()?;
                    println!("access token cleared");
                }
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Validate => {
            let ok = session.validate_access_token().await;
            println!("{ok}");
            Ok(exit_for(ok))
        }

        Commands::Refresh => {
            let ok = session.refresh_tokens().await;
            println!("{ok}");
            Ok(exit_for(ok))
        }

        Commands::Probe => {
            let ok = session.fetch_profile_direct().await;
            println!("{ok}");
            Ok(exit_for(ok))
        }

        Commands::Logout => {
            if let Err(e) = session.logout().await {
                warn!(error = %e, "backend did not confirm logout");
            }
            println!("signed out");
            Ok(ExitCode::SUCCESS)
        }

        Commands::Login => {
            if !session.backend_reachable().await {
                println!("{}", ApiError::Network("status check failed".into()));
                return Ok(ExitCode::FAILURE);
            }
            println!("Sign in with GitHub: {}", session.login_url()?);
            Ok(ExitCode::SUCCESS)
        }

        Commands::Whoami => match session.user_info().get() {
            Some(user) => {
                println!("{}", user.name().unwrap_or("(unnamed)"));
                if let Some(login) = user.login() {
                    println!("  login:   {login}");
                }
                if let Some(avatar) = user.avatar_url() {
                    println!("  avatar:  {avatar}");
                }
                if let Some(profile) = user.profile_url() {
                    println!("  profile: {profile}");
                }
                Ok(ExitCode::SUCCESS)
            }
            None => {
                println!("not signed in");
                Ok(ExitCode::FAILURE)
            }
        },

        Commands::Agents => report(list_agents(app).await),

        Commands::RegisterAgent {
            hostname,
            os_version,
            kernel_version,
            ip_address,
        } => {
            let agent = AgentInfo {
                hostname,
                os_version,
                kernel_version,
                ip_address,
                ..AgentInfo::default()
            };
            report(app.dashboard().upsert_agent(&agent).await.map(|saved| {
                println!(
                    "agent {} registered ({})",
                    saved.id.as_deref().unwrap_or("-"),
                    saved.hostname
                );
            }))
        }

        Commands::Diagnose { agent, issue } => {
            let request = DiagnosticRequest {
                agent_id: agent,
                issue,
            };
            report(app.dashboard().create_diagnostic(&request).await.map(|d| {
                println!("diagnostic {} [{}]", d.id, d.status);
                println!("{}", d.response);
                for command in &d.commands {
                    println!("  $ {command}");
                }
            }))
        }

        Commands::Diagnostic { command } => {
            let dashboard = app.dashboard();
            let result = match command {
                DiagnosticCommands::Show { id } => dashboard.diagnostic(&id).await.map(|d| {
                    println!("diagnostic {} [{}] agent {}", d.id, d.status, d.agent_id);
                    println!("issue: {}", d.issue);
                    if !d.summary.is_empty() {
                        println!("summary: {}", d.summary);
                    }
                    for message in &d.messages {
                        match &message.timestamp {
                            Some(at) => println!("[{at}] {}: {}", message.role, message.content),
                            None => println!("{}: {}", message.role, message.content),
                        }
                    }
                    for file in &d.log_files {
                        println!("  log: {file}");
                    }
                }),
                DiagnosticCommands::Continue { id, agent, output } => dashboard
                    .continue_diagnostic(&id, &agent, &output)
                    .await
                    .map(|d| {
                        println!("{}", d.response);
                        for command in &d.commands {
                            println!("  $ {command}");
                        }
                    }),
                DiagnosticCommands::Delete { id } => dashboard
                    .delete_diagnostic(&id)
                    .await
                    .map(|()| println!("diagnostic {id} deleted")),
            };
            report(result)
        }

        Commands::Stats => {
            let dashboard = app.dashboard();
            let stats = dashboard.stats().await.map(|stats| {
                for stat in stats {
                    match stat.change {
                        Some(change) => println!("{}: {} ({change})", stat.title, stat.value),
                        None => println!("{}: {}", stat.title, stat.value),
                    }
                }
            });
            if stats.is_err() {
                return report(stats);
            }
            report(dashboard.activities().await.map(|activities| {
                for activity in activities {
                    println!("- {} ({})", activity.title, activity.time);
                }
            }))
        }
    }
}

async fn list_agents(app: &App) -> std::result::Result<(), ApiError> {
    let agents = app.dashboard().agents().await?;
    if agents.is_empty() {
        println!("no agents registered");
    }
    for agent in agents {
        println!(
            "{}  {}  {}  {}",
            agent.id.as_deref().unwrap_or("-"),
            agent.hostname,
            agent.ip_address,
            agent.status.as_deref().unwrap_or("unknown")
        );
    }
    Ok(())
}

/// Print an API failure the way the user should see it.
fn report(result: std::result::Result<(), ApiError>) -> Result<ExitCode> {
    match result {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            warn!(status = e.status(), detail = %e.detail(), "dashboard api error");
            eprintln!("{e}");
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Mount the guard on `target`, run it, and render the outcome.
async fn check(app: &App, target: &str) -> Result<ExitCode> {
    let origin = app.config.app_origin()?;
    let location = Location::resolve(&origin, target)
        .with_context(|| format!("invalid location: {target}"))?;

    let effects = Arc::new(ConsoleEffects::new());
    let provider = Arc::new(HttpSessionProvider::new(
        app.session.clone(),
        app.config.cross_domain()?,
    ));
    let guard = RouteGuard::new(
        provider,
        effects.clone(),
        GuardConfig {
            entry_path: app.config.app.entry_path.clone(),
            step_timeout: app.config.step_timeout(),
        },
    );

    let mount = guard.mount(location);
    let state = mount.evaluate().await;

    match mount.render(|| mount.location().without_callback_code()) {
        Rendered::View(at) => println!("authenticated: {at}"),
        Rendered::Redirecting { to } => println!("unauthenticated: redirected to {to}"),
        Rendered::Nothing => println!("unauthenticated"),
        Rendered::Loading => println!("session check did not finish"),
    }
    if let Some(visible) = effects.location() {
        info!(location = %visible, "final location");
    }

    Ok(exit_for(state == AuthState::Authenticated))
}
