//! A Página CLI - the bookstore from a terminal.
//!
//! # Usage
//!
//! ```bash
//! # Browse and search
//! apagina books --search "machado" --limit 10
//! apagina book 42
//!
//! # Guest cart, merged into the account cart on login
//! apagina cart add 42
//! apagina login leitora --password segredo
//! apagina cart show
//!
//! # Favorites (requires login)
//! apagina favorite 42
//! apagina favorites
//! ```
//!
//! Configuration comes from the environment; see
//! `apagina_storefront::config` for the variables.

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use apagina_core::{BookId, GenreId};
use apagina_storefront::catalog::BookQuery;
use apagina_storefront::config::ClientConfig;
use apagina_storefront::state::Storefront;

mod commands;

#[derive(Parser)]
#[command(name = "apagina")]
#[command(author, version, about = "A Página bookstore CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with a username or email
    Login {
        /// Username or email
        identifier: String,

        #[arg(short, long, env = "APAGINA_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// End the current session
    Logout,
    /// Show who is logged in
    Whoami,
    /// Create an account (log in afterwards)
    Register {
        #[arg(short, long)]
        username: String,

        #[arg(short, long)]
        email: String,

        /// At least 6 characters
        #[arg(short, long, env = "APAGINA_PASSWORD", hide_env_values = true)]
        password: String,

        /// Favorite book ID (give exactly two)
        #[arg(short, long = "book")]
        books: Vec<i32>,

        /// Favorite genre ID (at least one)
        #[arg(short, long = "genre")]
        genres: Vec<i32>,
    },
    /// List books
    Books {
        #[arg(short, long)]
        search: Option<String>,

        #[arg(short, long)]
        page: Option<u32>,

        #[arg(short, long, default_value_t = 40)]
        limit: u32,
    },
    /// Show a book with its reviews
    Book { id: i32 },
    /// Search as you type: each term is entered in turn, with a pause of
    /// `--typing-ms` between them
    Search {
        terms: Vec<String>,

        #[arg(long, default_value_t = 100)]
        typing_ms: u64,
    },
    /// List genres
    Genres {
        /// Only genres whose name contains this
        #[arg(short, long)]
        filter: Option<String>,
    },
    /// List your favorite books
    Favorites,
    /// Add or remove a book from your favorites
    Favorite { id: i32 },
    /// Manage the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
}

#[derive(Subcommand)]
enum CartAction {
    /// Show the cart
    Show,
    /// Add one copy of a book
    Add { id: i32 },
    /// One more copy of a book in the cart
    Inc { id: i32 },
    /// One fewer copy (removes the line at one)
    Dec { id: i32 },
    /// Remove a book from the cart
    Remove { id: i32 },
    /// Empty the cart
    Clear,
    /// Finish the purchase
    Checkout,
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ClientConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        tracing::Level::TRACE => sentry_tracing::EventFilter::Ignore,
    }
}

fn init_tracing() {
    // Defaults to info level for our crates if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "apagina_storefront=info,apagina_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load configuration from environment (needed for Sentry init)
    let config = ClientConfig::from_env();

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = config.as_ref().ok().and_then(init_sentry);
    init_tracing();

    let result: Result<(), Box<dyn std::error::Error>> = match config {
        Ok(config) => run(cli, config).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    let storefront = Storefront::new(config)?;
    storefront.init().await;

    match cli.command {
        Commands::Login {
            identifier,
            password,
        } => commands::account::login(&storefront, &identifier, &password).await?,
        Commands::Logout => commands::account::logout(&storefront).await,
        Commands::Whoami => commands::account::whoami(&storefront),
        Commands::Register {
            username,
            email,
            password,
            books,
            genres,
        } => {
            let books = books.into_iter().map(BookId::new).collect::<Vec<_>>();
            let genres = genres.into_iter().map(GenreId::new).collect::<Vec<_>>();
            commands::account::register(&storefront, username, email, &password, &books, &genres)
                .await?;
        }
        Commands::Books {
            search,
            page,
            limit,
        } => {
            let query = BookQuery {
                search,
                limit: Some(limit),
                page,
            };
            commands::catalog::books(&storefront, &query).await?;
        }
        Commands::Book { id } => commands::catalog::book(&storefront, BookId::new(id)).await?,
        Commands::Search { terms, typing_ms } => {
            commands::catalog::search(&storefront, &terms, typing_ms).await?;
        }
        Commands::Genres { filter } => {
            commands::catalog::genres(&storefront, filter.as_deref()).await?;
        }
        Commands::Favorites => commands::catalog::favorites(&storefront).await?,
        Commands::Favorite { id } => {
            commands::catalog::favorite(&storefront, BookId::new(id)).await?;
        }
        Commands::Cart { action } => match action {
            CartAction::Show => commands::cart::show(&storefront),
            CartAction::Add { id } => commands::cart::add(&storefront, BookId::new(id)).await?,
            CartAction::Inc { id } => {
                commands::cart::increase(&storefront, BookId::new(id)).await?;
            }
            CartAction::Dec { id } => {
                commands::cart::decrease(&storefront, BookId::new(id)).await?;
            }
            CartAction::Remove { id } => {
                commands::cart::remove(&storefront, BookId::new(id)).await?;
            }
            CartAction::Clear => commands::cart::clear(&storefront).await?,
            CartAction::Checkout => commands::cart::checkout(&storefront).await?,
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_register_repeats() {
        let cli = Cli::try_parse_from([
            "apagina", "register", "-u", "leitora", "-e", "l@apagina.com.br", "-p", "segredo",
            "--book", "1", "--book", "2", "--genre", "5",
        ])
        .unwrap_or_else(|e| panic!("{e}"));

        let Commands::Register { books, genres, .. } = cli.command else {
            panic!("expected register");
        };
        assert_eq!(books, vec![1, 2]);
        assert_eq!(genres, vec![5]);
    }
}
