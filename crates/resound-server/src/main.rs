//! resound-server binary

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use resound::service::Service;
use resound::store::PostgresStore;

use resound_server::auth::{AcoustidBizAuth, Authenticator, NoAuth, PasswordAuth};
use resound_server::{database_url_from_env, normalize_bind, AppState, ServerConfig};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AuthMethod {
    Disabled,
    Password,
    AcoustidBiz,
}

#[derive(Parser)]
#[command(name = "resound-server")]
#[command(version = resound::VERSION)]
#[command(about = "Private audio fingerprint matching server", long_about = None)]
struct Cli {
    /// Address on which the server should listen
    #[arg(long, env = "ACOUSTID_PRIV_BIND", default_value = ":3382")]
    bind: String,

    /// PostgreSQL URL (composed from ACOUSTID_PRIV_DB_* when omitted)
    #[arg(long, env = "ACOUSTID_PRIV_DB_URL")]
    db: Option<String>,

    /// Authentication method
    #[arg(long, env = "ACOUSTID_PRIV_AUTH", value_enum, default_value = "disabled")]
    auth: AuthMethod,

    /// Username for password authentication
    #[arg(long, env = "ACOUSTID_PRIV_AUTH_USER", default_value = "")]
    user: String,

    /// Password for password authentication
    #[arg(long, env = "ACOUSTID_PRIV_AUTH_PASSWORD", default_value = "")]
    password: String,

    /// Seconds to keep draining connections after a shutdown signal
    #[arg(long, env = "ACOUSTID_PRIV_SHUTDOWN_DELAY", default_value_t = 0)]
    shutdown_delay: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let database_url = match cli.db {
        Some(url) => url,
        None => database_url_from_env()?,
    };

    let store = PostgresStore::connect(&database_url).await?;
    let service = Service::new(Arc::new(store));

    let auth: Arc<dyn Authenticator> = match cli.auth {
        AuthMethod::Disabled => Arc::new(NoAuth),
        AuthMethod::Password => Arc::new(PasswordAuth {
            username: cli.user,
            password: cli.password,
        }),
        AuthMethod::AcoustidBiz => Arc::new(AcoustidBizAuth::new()),
    };

    let state = AppState::new(service, auth);
    let config = ServerConfig {
        bind: normalize_bind(&cli.bind),
        shutdown_delay: Duration::from_secs(cli.shutdown_delay),
    };

    resound_server::run(config, state).await
}
