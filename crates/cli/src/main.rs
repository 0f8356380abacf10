//! Shopfront CLI - a terminal storefront.
//!
//! # Usage
//!
//! ```bash
//! # List products, optionally filtered
//! shop products --category tea --search green
//!
//! # List categories
//! shop categories
//!
//! # Show one product
//! shop product green-tea
//!
//! # Interactive session (sign in, cart, checkout)
//! shop shell
//! ```
//!
//! # Environment Variables
//!
//! - `STOREFRONT_API_URL` - Base URL of the storefront API (required)
//! - `RUST_LOG` - Log filter (default: `shopfront_client=info,shopfront_cli=info`)
//! - `SENTRY_DSN` - Enables error tracking when set

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use shopfront_client::{ClientConfig, ProductQuery, Storefront};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "shop")]
#[command(author, version, about = "Terminal storefront")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List products
    Products {
        /// Only products in this category slug
        #[arg(short, long)]
        category: Option<String>,

        /// Only products matching this text
        #[arg(short, long)]
        search: Option<String>,
    },
    /// List categories
    Categories,
    /// Show a single product
    Product {
        /// Product slug
        slug: String,
    },
    /// Start an interactive shopping session
    Shell,
}

/// Initialize Sentry error tracking when a DSN is configured.
fn init_sentry(config: &ClientConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing_subscriber::fmt::init();
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(2);
        }
    };

    // Sentry goes first so the tracing layer has a client to report to
    let _sentry_guard = init_sentry(&config);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "shopfront_client=info,shopfront_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli, config).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    let storefront = Storefront::new(config)?;

    match cli.command {
        Commands::Products { category, search } => {
            let query = ProductQuery { category, search };
            commands::catalog::products(&storefront, &query).await;
        }
        Commands::Categories => commands::catalog::categories(&storefront).await,
        Commands::Product { slug } => commands::catalog::product(&storefront, &slug).await,
        Commands::Shell => commands::shell::run(storefront).await?,
    }
    Ok(())
}
