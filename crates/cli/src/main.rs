//! Cartsync CLI - Inspect and edit a cart through the sync engine.
//!
//! # Usage
//!
//! ```bash
//! # Serve the in-memory backend with a demo catalog
//! cartsync mock-server --addr 127.0.0.1:5000
//!
//! # Show the cart of user "demo"
//! CARTSYNC_API_BASE_URL=http://127.0.0.1:5000 cartsync --user demo show
//!
//! # Click "+" three times on product 2; sent as a single +3
//! cartsync --user demo edit 2 1 --times 3
//!
//! # Add a product the cart has never seen
//! cartsync edit 42 1 --price 19.99 --title "Camp Mug" --category outdoor
//!
//! # Empty the cart
//! cartsync clear
//! ```
//!
//! # Commands
//!
//! - `show` - Fetch and print the cart
//! - `edit` - Record quantity edits through the coalescer, then flush
//! - `clear` - Empty the cart
//! - `mock-server` - Run the in-memory commerce backend

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::net::SocketAddr;

use cartsync_client::{CartSyncConfig, telemetry};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;

mod commands;

#[derive(Parser)]
#[command(name = "cartsync")]
#[command(author, version, about = "Cartsync CLI tools")]
struct Cli {
    /// User whose cart to operate on
    #[arg(short, long, global = true, default_value = "demo")]
    user: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and print the cart
    Show,
    /// Record quantity edits and flush them
    Edit {
        /// Product to edit
        product_id: i64,

        /// Signed quantity change per edit
        #[arg(allow_hyphen_values = true)]
        delta: i64,

        /// Number of times to repeat the edit within one debounce window
        #[arg(short, long, default_value_t = 1)]
        times: u32,

        /// Title for a product not yet in the cart
        #[arg(long)]
        title: Option<String>,

        /// Unit price for a product not yet in the cart
        #[arg(long)]
        price: Option<Decimal>,

        /// Category for a product not yet in the cart
        #[arg(long)]
        category: Option<String>,
    },
    /// Empty the cart
    Clear,
    /// Run the in-memory commerce backend
    MockServer {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:5000")]
        addr: SocketAddr,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Configuration is only required for commands that talk to the API
    let config = CartSyncConfig::from_env();

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = config.as_ref().ok().and_then(telemetry::init_sentry);

    telemetry::init_tracing(
        "cartsync=info,cartsync_client=info,cartsync_mock_backend=info,tower_http=info",
    );

    let result: Result<(), Box<dyn std::error::Error>> = run(cli, config).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(
    cli: Cli,
    config: Result<CartSyncConfig, cartsync_client::config::ConfigError>,
) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Show => commands::cart::show(&config?, &cli.user).await?,
        Commands::Edit {
            product_id,
            delta,
            times,
            title,
            price,
            category,
        } => {
            let edit = commands::cart::Edit {
                product_id,
                delta,
                times,
                title,
                price,
                category,
            };
            commands::cart::edit(&config?, &cli.user, edit).await?;
        }
        Commands::Clear => commands::cart::clear(&config?, &cli.user).await?,
        Commands::MockServer { addr } => commands::mock_server::run(addr).await?,
    }
    Ok(())
}
