use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use postpilot::config::Config;

mod commands;

#[derive(Parser)]
#[command(
    name = "postpilot",
    version,
    about = "Autopilot posting scheduler with externally-triggered ticks",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a TOML config file (environment variables otherwise)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API server
    Serve,

    /// Trigger one tick sweep from the command line
    Tick,

    /// Print the scheduler status snapshot
    Status,

    /// Manage posting accounts
    Account {
        #[command(subcommand)]
        command: AccountCommands,
    },

    /// Add a caption to the content pool
    Caption {
        #[command(subcommand)]
        command: CaptionCommands,
    },

    /// Add an image asset to the content pool
    Image {
        #[command(subcommand)]
        command: ImageCommands,
    },

    /// Log an account in and store its session
    Login {
        /// Account username
        username: String,
    },

    /// Show recent post attempts for an account
    History {
        /// Account username
        username: String,

        /// Number of attempts to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum AccountCommands {
    /// Register a new account
    Add {
        /// Account username
        username: String,

        /// Opaque session handle passed through to the publisher
        #[arg(long)]
        session_ref: Option<String>,
    },

    /// List all accounts
    List,

    /// Turn autopilot on for an account
    Enable {
        /// Account username
        username: String,

        /// Minutes between posts
        #[arg(long)]
        cadence: Option<i64>,

        /// Maximum random delay added after each cadence, seconds
        #[arg(long)]
        jitter: Option<i64>,
    },

    /// Turn autopilot off for an account
    Disable {
        /// Account username
        username: String,
    },
}

#[derive(Subcommand)]
enum CaptionCommands {
    /// Add one caption
    Add {
        /// Caption text
        text: String,

        /// Optional category tag
        #[arg(long)]
        category: Option<String>,
    },
}

#[derive(Subcommand)]
enum ImageCommands {
    /// Add one image by URL
    Add {
        /// Image URL
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    config.validate()?;

    // CLI flags win over the config file
    let log_format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    let verbose = cli.verbose || config.logging.level == "debug";
    setup_tracing(&log_format, verbose)?;

    match cli.command {
        Commands::Serve => {
            tracing::info!("Starting serve command");
            commands::serve(config).await?;
        }

        Commands::Tick => {
            tracing::info!("Starting tick command");
            commands::tick(config).await?;
        }

        Commands::Status => {
            commands::status(config)?;
        }

        Commands::Account { command } => match command {
            AccountCommands::Add {
                username,
                session_ref,
            } => {
                commands::account_add(config, username, session_ref)?;
            }
            AccountCommands::List => {
                commands::account_list(config)?;
            }
            AccountCommands::Enable {
                username,
                cadence,
                jitter,
            } => {
                commands::account_enable(config, username, cadence, jitter)?;
            }
            AccountCommands::Disable { username } => {
                commands::account_disable(config, username)?;
            }
        },

        Commands::Caption { command } => match command {
            CaptionCommands::Add { text, category } => {
                commands::caption_add(config, text, category)?;
            }
        },

        Commands::Image { command } => match command {
            ImageCommands::Add { url } => {
                commands::image_add(config, url)?;
            }
        },

        Commands::Login { username } => {
            tracing::info!(username = %username, "Starting login command");
            commands::login(config, username).await?;
        }

        Commands::History { username, limit } => {
            commands::history(config, username, limit)?;
        }
    }

    Ok(())
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("postpilot=debug,info")
    } else {
        tracing_subscriber::EnvFilter::new("postpilot=info,warn")
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
