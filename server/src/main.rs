//! Chatline Server - chat, presence and social graph backend
//!
//! This binary handles:
//! - Serving the REST API and the WebSocket gateway
//! - Creating and listing accounts from the command line

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chatline_server::{build_router, config::Config, models::RegisterRequest, storage::Storage, AppState};

/// Chatline Server CLI
#[derive(Parser)]
#[command(name = "chatline-server")]
#[command(about = "Chat, presence and social graph server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account
    CreateUser {
        #[arg(long)]
        email: String,

        #[arg(long)]
        fullname: String,

        #[arg(long)]
        password: String,
    },

    /// List all registered accounts
    ListUsers,

    /// Run the server
    Run,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "chatline_server=info,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = Arc::new(Config::load(&cli.config).await?);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::CreateUser { email, fullname, password } => {
            create_user(config, email, fullname, password).await?;
        }
        Commands::ListUsers => {
            list_users(&config).await?;
        }
        Commands::Run => {
            run_server(config).await?;
        }
    }

    Ok(())
}

async fn create_user(config: Arc<Config>, email: String, fullname: String, password: String) -> anyhow::Result<()> {
    let storage = Arc::new(Storage::new(&config.storage.database_path).await?);
    let state = AppState::new(config, storage);

    let response = state
        .users
        .register(RegisterRequest { fullname, email, password })
        .await?;

    println!("=== User Created ===");
    println!("User ID: {}", response.user.id);
    println!("Email:   {}", response.user.email);
    println!("====================");

    Ok(())
}

async fn list_users(config: &Config) -> anyhow::Result<()> {
    let storage = Storage::new(&config.storage.database_path).await?;
    let users = storage.list_users().await?;

    println!("=== Registered Users ===");
    for user in users {
        println!(
            "User ID: {} | {} <{}> | Status: {} | Created: {}",
            user.id,
            user.fullname,
            user.email,
            user.status.as_str(),
            user.created_at
        );
    }

    Ok(())
}

async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("Starting Chatline Server v{}", env!("CARGO_PKG_VERSION"));

    let storage = Arc::new(Storage::new(&config.storage.database_path).await?);
    tokio::fs::create_dir_all(&config.storage.files_path).await?;

    let state = AppState::new(config.clone(), storage);
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Listening on {}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
