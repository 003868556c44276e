//! clinic-session - inspect and manage the clinic session from a terminal.
//!
//! Plays the role of the browser for the session library: cookies persist
//! between runs in the cache directory, session storage lasts for a single
//! run, and the embedding context can be simulated with `--frame`.

mod host;

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clinic_session_core::api::Method;
use clinic_session_core::context::EmbeddingContext;
use clinic_session_core::session::{is_token_shape_valid, MigrationOutcome};
use clinic_session_core::Config;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use host::Host;

#[derive(Parser)]
#[command(name = "clinic-session", version, about = "Manage the clinic session credential")]
struct Cli {
    /// Simulated embedding context: top-level, same-origin or cross-origin
    #[arg(long, global = true, value_parser = parse_frame)]
    frame: Option<EmbeddingContext>,

    /// Also write logs to a file in this directory
    #[arg(long, global = true, env = "CLINIC_SESSION_LOG_DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store a clinic id and bearer token
    Login {
        #[arg(long)]
        clinic: String,
        /// Bearer token; prompted for when omitted
        #[arg(long)]
        token: Option<String>,
    },
    /// Replace the bearer token, keeping the selected clinic
    Token {
        #[arg(long)]
        token: Option<String>,
    },
    /// Show the current session
    Status,
    /// Clear the session from every store
    Logout,
    /// Move a session from legacy local storage into the session stores
    Migrate,
    /// Show where the session lives and why
    Diagnostics {
        #[arg(long)]
        json: bool,
    },
    /// Send an authenticated request to the clinic API
    Request {
        method: String,
        path: String,
        /// JSON request body
        #[arg(long)]
        body: Option<String>,
    },
}

fn parse_frame(s: &str) -> Result<EmbeddingContext, String> {
    EmbeddingContext::parse(s)
        .ok_or_else(|| format!("unknown frame '{}' (expected top-level, same-origin or cross-origin)", s))
}

/// Initialize the tracing subscriber for logging
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let registry = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::never(dir, "clinic-session.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            registry.init();
            None
        }
    }
}

fn read_token(token: Option<String>) -> Result<String> {
    let token = match token {
        Some(token) => token,
        None => rpassword::prompt_password("Bearer token: ").context("Failed to read token")?,
    };
    let token = token.trim().to_string();
    if token.is_empty() {
        anyhow::bail!("Token must not be empty");
    }
    if !is_token_shape_valid(Some(&token)) {
        eprintln!("Warning: token does not look like a JWT (expected header.payload.signature)");
    }
    Ok(token)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_dir.as_deref());

    let config = Config::load().context("Failed to load configuration")?;
    let host = Host::open(config, cli.frame)?;
    info!(context = %host.session.detector().context(), "clinic-session starting");

    run(&host, cli.command).await
}

async fn run(host: &Host, command: Command) -> Result<()> {
    let session = &host.session;

    match command {
        Command::Login { clinic, token } => {
            let token = read_token(token)?;
            let report = session.set_clinic_data_verified(&clinic, &token);
            println!("Logged in to clinic {}", clinic);
            if !report.cookie {
                println!(
                    "Cookies were not retained in a {} context; the session lasts for this run only.",
                    session.detector().context()
                );
            }
        }
        Command::Token { token } => {
            let token = read_token(token)?;
            session.set_auth_token(&token);
            println!("Token updated");
        }
        Command::Status => {
            let clinic = session.get_clinic_id();
            println!("Clinic:       {}", clinic.as_deref().unwrap_or("(none)"));
            println!("Token:        {}", if session.has_auth_token() { "present" } else { "absent" });
            println!("Token shape:  {}", if session.is_token_valid() { "valid" } else { "invalid" });
            match session.resolved_location() {
                Some(location) => println!("Served from:  {}", location),
                None => println!("Served from:  (nowhere)"),
            }
            if session.has_auth_token() && clinic.is_none() {
                println!("Logged in, but no clinic is selected.");
            }
        }
        Command::Logout => {
            session.clear_clinic_data();
            println!("Logged out");
        }
        Command::Migrate => match session.migrate_from_local_storage() {
            MigrationOutcome::Migrated => println!("Migrated session from legacy storage"),
            MigrationOutcome::AlreadyPresent => println!("A session already exists; legacy storage left untouched"),
            MigrationOutcome::NothingToMigrate => println!("Nothing to migrate"),
            MigrationOutcome::NoLegacyStorage => println!("No legacy storage available"),
        },
        Command::Diagnostics { json } => {
            let diagnostics = session.storage_diagnostics();
            if json {
                println!("{}", serde_json::to_string_pretty(&diagnostics)?);
            } else {
                println!("Context:         {} ({:?})", diagnostics.context, diagnostics.origin_check);
                println!("In iframe:       {}", diagnostics.is_in_iframe);
                println!("Cross-origin:    {}", diagnostics.is_cross_origin);
                println!("HTTPS:           {}", diagnostics.is_https);
                println!(
                    "Cookie settings: secure={} samesite={}",
                    diagnostics.cookie_settings.secure,
                    diagnostics.cookie_settings.same_site.as_str()
                );
                println!(
                    "Cookies:         clinic_id={} token={}",
                    diagnostics.cookies.clinic_id, diagnostics.cookies.token
                );
                println!(
                    "Session storage: clinic_id={} token={}",
                    diagnostics.fallback.clinic_id, diagnostics.fallback.token
                );
                if let Some(legacy) = diagnostics.legacy {
                    println!("Legacy storage:  clinic_id={} token={}", legacy.clinic_id, legacy.token);
                }
                if diagnostics.is_split() {
                    println!("Warning: clinic id and token are split across stores");
                }
            }
        }
        Command::Request { method, path, body } => {
            let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                .with_context(|| format!("Invalid HTTP method '{}'", method))?;
            let body = body
                .map(|b| serde_json::from_str::<serde_json::Value>(&b))
                .transpose()
                .context("Request body is not valid JSON")?;

            let client = host.api_client()?;
            let value = client.request_json(method, &path, body.as_ref()).await?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }

    Ok(())
}
