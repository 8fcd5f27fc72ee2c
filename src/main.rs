//! Abhihar CLI - authentication and order management API server
//!
//! Reads configuration from flags, the environment and an optional `.env`
//! file, then serves the HTTP API.

use abhihar_api::{ApiServer, ApiServerConfig};
use abhihar_auth::{AdminBootstrap, DEFAULT_TTL_SECS};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::{IpAddr, SocketAddr};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Abhihar - signup, login and orders over HTTP
#[derive(Parser, Debug)]
#[command(name = "abhihar")]
#[command(about = "Abhihar - authentication and order management API")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API server
    #[command(long_about = r#"
Run the HTTP API server.

Without a JWT secret the server still starts, but every route except
/api/health answers 500. The admin bootstrap is enabled only when both
the admin email and the admin password are set.

EXAMPLES:
  # Local development with SQLite
  JWT_SECRET=dev-secret abhihar serve --port 5174

  # PostgreSQL with a bootstrap administrator
  abhihar serve --database-url postgres://app:pw@localhost/abhihar \
    --admin-email admin@example.com --admin-password change-me
"#)]
    Serve {
        /// Address to bind
        #[arg(long, env = "HOST", default_value = "0.0.0.0")]
        host: IpAddr,

        /// Port to listen on
        #[arg(long, env = "PORT", default_value = "5174")]
        port: u16,

        /// Database URL (sqlite://, postgres:// or mysql://)
        #[arg(long, env = "DATABASE_URL", default_value = "sqlite://abhihar.db?mode=rwc")]
        database_url: String,

        /// Secret used to sign session tokens
        #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
        jwt_secret: Option<String>,

        /// Email of the break-glass administrator
        #[arg(long, env = "ADMIN_EMAIL")]
        admin_email: Option<String>,

        /// Password of the break-glass administrator
        #[arg(long, env = "ADMIN_PASSWORD", hide_env_values = true)]
        admin_password: Option<String>,

        /// Session token lifetime in seconds
        #[arg(long, env = "TOKEN_TTL_SECS", default_value_t = DEFAULT_TTL_SECS)]
        token_ttl_secs: i64,

        /// Allow cross-origin requests from localhost (development)
        #[arg(long, env = "ENABLE_CORS")]
        enable_cors: bool,
    },

    /// Print the OpenAPI document as JSON
    Openapi,
}

/// Setup logging with the specified log level
fn setup_logging(verbose: bool) {
    let log_level = if verbose { "debug" } else { "info" };

    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

/// Validate the configured token lifetime
fn token_ttl(secs: i64) -> Result<chrono::Duration> {
    if secs <= 0 {
        anyhow::bail!("Token TTL must be positive, got {}", secs);
    }

    chrono::Duration::try_seconds(secs)
        .with_context(|| format!("Token TTL of {} seconds is out of range", secs))
}

#[allow(clippy::too_many_arguments)]
async fn serve(
    host: IpAddr,
    port: u16,
    database_url: String,
    jwt_secret: Option<String>,
    admin_email: Option<String>,
    admin_password: Option<String>,
    token_ttl_secs: i64,
    enable_cors: bool,
) -> Result<()> {
    let token_ttl = token_ttl(token_ttl_secs)?;

    let db = abhihar_db::connect(&database_url)
        .await
        .context("Failed to connect to database")?;
    abhihar_db::ensure_schema(&db)
        .await
        .context("Failed to create database schema")?;

    let admin = match (admin_email.as_deref(), admin_password.as_deref()) {
        (Some(email), Some(password)) => AdminBootstrap::new(email, password),
        _ => None,
    };
    match &admin {
        Some(admin) => info!("Admin bootstrap enabled for {}", admin.email()),
        None if admin_email.is_some() || admin_password.is_some() => {
            warn!("Admin bootstrap disabled: both ADMIN_EMAIL and ADMIN_PASSWORD are required")
        }
        None => {}
    }

    let config = ApiServerConfig {
        bind_addr: SocketAddr::new(host, port),
        enable_cors,
        jwt_secret,
        token_ttl,
        admin,
    };

    ApiServer::new(config, db).start().await
}

#[tokio::main]
async fn main() -> Result<()> {
    // Existing environment variables take precedence over .env
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Setup logging
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Serve {
            host,
            port,
            database_url,
            jwt_secret,
            admin_email,
            admin_password,
            token_ttl_secs,
            enable_cors,
        } => {
            serve(
                host,
                port,
                database_url,
                jwt_secret,
                admin_email,
                admin_password,
                token_ttl_secs,
                enable_cors,
            )
            .await
        }
        Commands::Openapi => {
            let json = abhihar_api::openapi_json().context("Failed to render OpenAPI document")?;
            println!("{}", json);
            Ok(())
        }
    }
}
