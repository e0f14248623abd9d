//! ==============================================================================
//! main.rs - airplug command line entry point
//! ==============================================================================
//!
//! purpose:
//!     the dashboard's view layer. each subcommand performs one user action
//!     against the backend and renders the result in the terminal.
//!
//! responsibilities:
//!     - load configuration (airplug.toml, flags, env)
//!     - set up logging (stderr, RUST_LOG or config level)
//!     - restore the session credential from the session file
//!     - build the request pipeline once, with the "session expired" notice
//!       as its unauthorized callback
//!     - run the command; report failures as one line and exit non-zero
//!
//! relationships:
//!     - uses: cli.rs (argument parsing), view.rs (tables)
//!     - uses: airplug::{AuthClient, ApiClient, RequestPipeline, TokenStore}
//!
//! flow:
//!
//!     ┌──────────┐   ┌───────────┐   ┌──────────────────┐   ┌───────────┐
//!     │ command  │──►│ ApiClient │──►│ RequestPipeline  │──►│  backend  │
//!     └──────────┘   └───────────┘   │ bearer │ 401 →   │   └───────────┘
//!          ▲                         │ clear + notify   │
//!          └──── table / error ──────┴──────────────────┘
//!
//! ==============================================================================

mod cli;
mod view;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use airplug::{ApiClient, AuthClient, DashboardConfig, RequestPipeline, TokenStore, UnauthorizedCallback};
use cli::{Cli, Command};

const SESSION_EXPIRED: &str = "session expired, please run `airplug login` again";

#[tokio::main]
async fn main() -> ExitCode {
    install_panic_hook();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // the unauthorized callback already told the user what to do
            if !is_unauthorized(&e) {
                eprintln!("error: {:#}", e);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    // step 1: configuration
    let loaded = DashboardConfig::load_or_default(cli.config.as_deref())?;
    let mut config = loaded.config;
    cli.apply_to(&mut config);

    // step 2: logging
    init_tracing(&config.logging.level);
    match &loaded.source {
        Some(path) => tracing::debug!("loaded config from {}", path.display()),
        None => tracing::debug!("no config file found, using defaults"),
    }
    for warning in &loaded.warnings {
        tracing::warn!("{}", warning);
    }

    // step 3: session
    let tokens = TokenStore::persistent(&config.session.token_file);

    // step 4: the action
    match cli.command {
        Command::Config => {
            config.print_summary();
        }
        Command::Login { email, password } => {
            if config.auth.client_id.is_empty() {
                bail!("no Cognito app client configured; set auth.client_id or COGNITO_CLIENT_ID");
            }
            let auth = AuthClient::from_config(&config.auth)?;
            auth.sign_in(&tokens, &email, &password).await?;
            if let Some(path) = tokens.session_file() {
                tracing::debug!(path = %path.display(), "session saved");
            }
            println!("Signed in as {}.", email);
        }
        Command::Logout => {
            let had_session = tokens.has_token();
            AuthClient::sign_out(&tokens);
            println!("{}", if had_session { "Signed out." } else { "Not signed in." });
        }
        Command::Plugs => {
            let api = connect(&config, tokens)?;
            let plugs = api.list_plugs().await.context("failed to load plugs")?;
            print!("{}", view::plugs(&plugs));
        }
        Command::Sensors { user } => {
            let api = connect(&config, tokens)?;
            let user = user.unwrap_or_else(|| config.user.id.clone());
            let sensors = api.list_sensors(&user).await.context("failed to load sensors")?;
            print!("{}", view::sensors(&sensors));
        }
        Command::Mappings { user } => {
            let api = connect(&config, tokens)?;
            let user = user.unwrap_or_else(|| config.user.id.clone());
            let mappings = api.list_mappings(&user).await.context("failed to load mappings")?;
            print!("{}", view::mappings(&mappings));
        }
        Command::Map { sensor, plug, disabled, user } => {
            let api = connect(&config, tokens)?;
            let user = user.unwrap_or_else(|| config.user.id.clone());
            api.upsert_mapping(&user, &sensor, &plug, !disabled)
                .await
                .context("failed to save mapping")?;
            println!("Mapped {} -> {} (automation {}).", sensor, plug, if disabled { "off" } else { "on" });
        }
        Command::Unmap { sensor } => {
            let api = connect(&config, tokens)?;
            api.delete_mapping(&sensor).await.context("failed to delete mapping")?;
            println!("Removed mapping for {}.", sensor);
        }
        Command::Toggle { sensor, user } => {
            let api = connect(&config, tokens)?;
            let user = user.unwrap_or_else(|| config.user.id.clone());
            let mappings = api.list_mappings(&user).await.context("failed to load mappings")?;
            let Some(mapping) = mappings.iter().find(|m| m.sensor_mac == sensor) else {
                bail!("no mapping for sensor {}", sensor);
            };
            api.toggle_mapping(&user, mapping).await.context("failed to toggle mapping")?;
            println!(
                "Automation for {} is now {}.",
                sensor,
                if mapping.enabled { "off" } else { "on" }
            );
        }
        Command::Download { sensor, start, end, out } => {
            let api = connect(&config, tokens)?;
            let export = api
                .download_csv(&sensor, &start, &end)
                .await
                .context("failed to download csv")?;
            let path = out.unwrap_or_else(|| PathBuf::from(&export.filename));
            tokio::fs::write(&path, &export.content)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Saved {} bytes to {}.", export.content.len(), path.display());
        }
    }
    Ok(())
}

/// build the pipeline once; everything backend-bound goes through it
fn connect(config: &DashboardConfig, tokens: TokenStore) -> Result<ApiClient> {
    if !tokens.has_token() {
        tracing::warn!("not signed in, sending request without a credential");
    }
    let notice: UnauthorizedCallback = Arc::new(|| eprintln!("{}", SESSION_EXPIRED));
    let pipeline = RequestPipeline::builder(config.api.base_url.clone(), tokens)
        .on_unauthorized(notice)
        .build()
        .with_context(|| format!("invalid backend url {:?}", config.api.base_url))?;
    Ok(ApiClient::new(Arc::new(pipeline)))
}

fn is_unauthorized(e: &anyhow::Error) -> bool {
    e.chain()
        .any(|cause| cause.downcast_ref::<airplug::Error>().is_some_and(airplug::Error::is_unauthorized))
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// last-resort boundary: a panic still ends with a readable way out
fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        eprintln!("airplug hit an unexpected problem and stopped: {}", info);
        eprintln!("re-run the command to retry; if it keeps failing, `airplug logout` and sign in again");
        if std::env::var_os("RUST_BACKTRACE").is_some() {
            default_hook(info);
        }
    }));
}
