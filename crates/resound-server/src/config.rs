//! Server configuration
//!
//! The binary is configured through CLI flags with `ACOUSTID_PRIV_`
//! environment fallbacks. When no database URL is given it is composed from
//! the individual `ACOUSTID_PRIV_DB_*` variables, including the `_FILE`
//! variants used for mounted secrets.

use std::env;
use std::time::Duration;

use anyhow::Context;

/// Resolved server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address to listen on
    pub bind: String,
    /// Drain period between the shutdown signal and closing the listener
    pub shutdown_delay: Duration,
}

/// Accept Go-style `:port` bind addresses by defaulting the host.
pub fn normalize_bind(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    }
}

fn env_or_file(var: &str, file_var: &str) -> anyhow::Result<Option<String>> {
    if let Ok(value) = env::var(var) {
        if !value.is_empty() {
            return Ok(Some(value));
        }
    }
    if let Ok(path) = env::var(file_var) {
        if !path.is_empty() {
            let value = std::fs::read_to_string(&path)
                .with_context(|| format!("unable to read {file_var} ({path})"))?;
            return Ok(Some(value.trim().to_string()));
        }
    }
    Ok(None)
}

/// Compose the PostgreSQL URL from `ACOUSTID_PRIV_DB_*` variables.
pub fn database_url_from_env() -> anyhow::Result<String> {
    if let Ok(url) = env::var("ACOUSTID_PRIV_DB_URL") {
        if !url.is_empty() {
            return Ok(url);
        }
    }

    let host = env::var("ACOUSTID_PRIV_DB_HOST").unwrap_or_else(|_| "localhost".to_string());
    let port = env::var("ACOUSTID_PRIV_DB_PORT").ok().filter(|p| !p.is_empty());
    let user = env_or_file("ACOUSTID_PRIV_DB_USER", "ACOUSTID_PRIV_DB_USER_FILE")?
        .unwrap_or_else(|| "acoustid".to_string());
    let password =
        env_or_file("ACOUSTID_PRIV_DB_PASSWORD", "ACOUSTID_PRIV_DB_PASSWORD_FILE")?;
    let name =
        env::var("ACOUSTID_PRIV_DB_NAME").unwrap_or_else(|_| "acoustid_priv".to_string());
    let ssl_mode = env::var("ACOUSTID_PRIV_DB_SSL").unwrap_or_else(|_| "disable".to_string());

    let credentials = match password {
        Some(password) => format!("{user}:{password}"),
        None => user,
    };
    let host_port = match port {
        Some(port) => format!("{host}:{port}"),
        None => host,
    };
    Ok(format!(
        "postgresql://{credentials}@{host_port}/{name}?sslmode={ssl_mode}"
    ))
}
