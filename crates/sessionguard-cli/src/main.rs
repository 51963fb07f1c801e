//! sessionguard - log in, run authenticated requests, log out.
//!
//! Usage:
//!   sessionguard fetch <path>...   GET each path concurrently through one session
//!   sessionguard whoami            log in and print the session identity
//!   sessionguard config            print the effective configuration

mod config;

use std::io::{self, BufRead, Write};

use anyhow::{bail, Context, Result};
use futures::future::join_all;
use sessionguard_core::{Credentials, RequestOutcome, SessionClient};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use config::{CliConfig, ENV_PASSWORD};

/// Maximum number of response body bytes echoed per request
const MAX_BODY_PREVIEW: usize = 2000;

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let args: Vec<String> = std::env::args().collect();
    let mut config = CliConfig::load()?;

    match args.get(1).map(String::as_str) {
        Some("fetch") if args.len() > 2 => fetch(&mut config, &args[2..]).await,
        Some("whoami") => whoami(&mut config).await,
        Some("config") => {
            println!("{}", serde_json::to_string_pretty(&config.effective())?);
            Ok(())
        }
        _ => {
            eprintln!("Usage: sessionguard <fetch <path>... | whoami | config>");
            std::process::exit(2);
        }
    }
}

/// Log in with configured or prompted credentials.
async fn login(config: &mut CliConfig) -> Result<SessionClient> {
    let client = SessionClient::new(config.effective_session()).context("Invalid session configuration")?;
    let credentials = read_credentials(config)?;

    let snapshot = client
        .login(&credentials)
        .await
        .with_context(|| format!("Failed to log in as {}", credentials.username))?;
    info!(generation = snapshot.generation(), "Session established");

    if !config.username_from_env()
        && config.last_username.as_deref() != Some(credentials.username.as_str())
    {
        config.last_username = Some(credentials.username);
        if let Err(e) = config.save() {
            warn!(error = %e, "Failed to save config");
        }
    }
    Ok(client)
}

fn read_credentials(config: &CliConfig) -> Result<Credentials> {
    let username = match config.username() {
        Some(username) => username.to_string(),
        None => {
            print!("Username: ");
            io::stdout().flush()?;
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line)?;
            line.trim().to_string()
        }
    };
    if username.is_empty() {
        bail!("A username is required");
    }

    let password = match std::env::var(ENV_PASSWORD) {
        Ok(password) => password,
        Err(_) => rpassword::prompt_password(format!("Password for {}: ", username))
            .context("Failed to read password")?,
    };
    Ok(Credentials::new(username, password))
}

async fn fetch(config: &mut CliConfig, paths: &[String]) -> Result<()> {
    let client = login(config).await?;

    let requests = paths.iter().map(|path| {
        let client = client.clone();
        async move { (path, client.execute(client.get(path)).await) }
    });
    let outcomes = join_all(requests).await;

    let mut failures = 0;
    for (path, outcome) in outcomes {
        match outcome {
            RequestOutcome::Success { response } => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                println!("{} {}", status, path);
                println!("{}", preview(&body));
            }
            RequestOutcome::Unauthenticated => {
                failures += 1;
                println!("--- {}: not logged in", path);
            }
            RequestOutcome::SessionExpired => {
                failures += 1;
                println!("--- {}: session expired, log in again", path);
            }
            RequestOutcome::TransportError { cause } => {
                failures += 1;
                println!("--- {}: {}", path, cause);
            }
        }
    }

    if let Err(e) = client.logout().await? {
        warn!(error = %e, "Logout did not reach the server");
    }

    if failures > 0 {
        bail!("{} of {} requests failed", failures, paths.len());
    }
    Ok(())
}

async fn whoami(config: &mut CliConfig) -> Result<()> {
    let client = login(config).await?;
    let session = client.session();
    if let Some(data) = session.data() {
        let identity = data.identity();
        println!("id:       {}", identity.id);
        println!("username: {}", identity.username);
        println!("email:    {}", identity.email);
        println!("since:    {}", data.authenticated_at.to_rfc3339());
    }
    if let Err(e) = client.logout().await? {
        warn!(error = %e, "Logout did not reach the server");
    }
    Ok(())
}

/// Truncate a body for terminal output
fn preview(body: &str) -> String {
    if body.len() <= MAX_BODY_PREVIEW {
        return body.to_string();
    }
    let mut end = MAX_BODY_PREVIEW;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... ({} bytes total)", &body[..end], body.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_truncates_long_bodies() {
        assert_eq!(preview("short"), "short");
        let long = "x".repeat(MAX_BODY_PREVIEW + 10);
        let shown = preview(&long);
        assert!(shown.starts_with(&"x".repeat(MAX_BODY_PREVIEW)));
        assert!(shown.ends_with(&format!("({} bytes total)", MAX_BODY_PREVIEW + 10)));
    }
}
