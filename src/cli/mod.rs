//! Command-line interface.
//!
//! - `serve` (default) - Run the API server
//! - `create-admin` - Create an administrator account
//! - `config check` - Validate the configuration file

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use crate::auth::TokenAuthority;
use crate::config::Config;
use crate::db::{CredentialStore, Role, SqliteCredentialStore};

/// CLI arguments structure
#[derive(Parser, Debug)]
#[command(name = "storefront")]
#[command(author, version, about = "Storefront admin session service", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "STOREFRONT_CONFIG", default_value = "storefront.toml")]
    pub config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Subcommand to run (if none, starts the server)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the API server
    Serve,

    /// Create an administrator account
    CreateAdmin {
        /// Account email
        #[arg(long)]
        email: String,
        /// Account password (at least 6 characters)
        #[arg(long, env = "STOREFRONT_ADMIN_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
    },

    /// Configuration management commands
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate configuration file
    Check,
}

impl Cli {
    /// Whether this invocation runs the server
    pub fn is_serve(&self) -> bool {
        matches!(self.command, None | Some(Commands::Serve))
    }
}

/// Run a non-server CLI command
pub async fn run_command(cli: &Cli) -> Result<()> {
    match &cli.command {
        Some(Commands::CreateAdmin {
            email,
            password,
            first_name,
            last_name,
        }) => {
            cmd_create_admin(
                cli,
                email,
                password,
                first_name.clone(),
                last_name.clone(),
            )
            .await
        }
        Some(Commands::Config(ConfigCommands::Check)) => cmd_config_check(cli),
        Some(Commands::Serve) | None => {
            // Starting the server is handled in main.rs
            Ok(())
        }
    }
}

async fn cmd_create_admin(
    cli: &Cli,
    email: &str,
    password: &str,
    first_name: Option<String>,
    last_name: Option<String>,
) -> Result<()> {
    let config = Config::load(&cli.config)?;
    let pool = crate::db::init(&config.server.data_dir).await?;
    let store: Arc<dyn CredentialStore> = Arc::new(SqliteCredentialStore::new(pool.clone()));
    let authority = TokenAuthority::from_config(&config, store.clone());

    let result = async {
        if store.find_by_email(email).await?.is_some() {
            bail!("An account for {} already exists", email);
        }

        let user = authority
            .create_user(email, password, Role::Admin, first_name, last_name)
            .await
            .context("Failed to create admin account")?;

        println!("[OK] Admin account created");
        println!("  Email: {}", user.email);
        println!("  Role:  {}", user.role);
        Ok(())
    }
    .await;

    pool.close().await;
    result
}

fn cmd_config_check(cli: &Cli) -> Result<()> {
    let config_path = &cli.config;

    println!("Checking configuration file: {}", config_path.display());
    println!();

    if !config_path.exists() {
        println!(
            "[!!] Configuration file not found: {}",
            config_path.display()
        );
        println!();
        println!("A default configuration will be used when starting the server.");
        return Ok(());
    }

    let config = Config::load(config_path)?;
    let problems = config.validate();

    println!("=== Configuration Summary ===");
    println!();
    println!("Server:");
    println!("  Host:         {}", config.server.host);
    println!("  Port:         {}", config.server.port);
    println!("  Data Dir:     {}", config.server.data_dir.display());
    println!();
    println!("Auth:");
    println!("  Cookie:       {}", config.auth.cookie_name);
    println!("  Token TTL:    {}h", config.auth.token_ttl_hours);
    println!(
        "  Secret:       {}",
        if config.auth.token_secret.is_some() {
            "Configured"
        } else {
            "Ephemeral (sessions end on restart)"
        }
    );
    println!(
        "  Lockout:      {}",
        if config.lockout.max_failed_attempts > 0 {
            format!(
                "{} failures -> {} min",
                config.lockout.max_failed_attempts, config.lockout.lock_minutes
            )
        } else {
            "Disabled".to_string()
        }
    );
    println!(
        "  Rate Limit:   {}",
        if config.rate_limit.enabled {
            format!(
                "{} logins / {}s",
                config.rate_limit.login_requests_per_window, config.rate_limit.window_seconds
            )
        } else {
            "Disabled".to_string()
        }
    );
    println!();

    if problems.is_empty() {
        println!("[OK] Configuration file is valid!");
        Ok(())
    } else {
        for problem in &problems {
            println!("[!!] {}", problem);
        }
        bail!("Configuration has {} problem(s)", problems.len())
    }
}
