//! Corner Market CLI - Command-line front end over the storefront client.
//!
//! # Usage
//!
//! ```bash
//! # Sign in (prompts for the password when --password is omitted)
//! cm-cli login -e buyer@example.com
//!
//! # Browse and fill the cart
//! cm-cli products list --search mug
//! cm-cli cart add 42 --quantity 2
//!
//! # Check out
//! cm-cli checkout fill --full-name "Anna K" --phone "+100200" --address "Main st 1"
//! cm-cli checkout submit
//! ```
//!
//! # Environment Variables
//!
//! - `CORNERMARKET_API_URL` - Backend base URL (default `http://127.0.0.1:8000`)
//! - `CORNERMARKET_STATE_DIR` - Where tokens, theme and drafts are kept
//! - `SENTRY_DSN` - Enables error tracking when set

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use clap::{Parser, Subcommand};
use cornermarket_core::{
    CategoryId, DeliveryMethod, Email, LineItemId, OrderId, ProductId, UserRole,
};
use cornermarket_storefront::storage::FileStorage;
use cornermarket_storefront::theme::Theme;
use cornermarket_storefront::{AppState, ClientConfig, ClientError};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "cm-cli")]
#[command(author, version, about = "Corner Market command-line client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with email and password
    Login {
        #[arg(short, long)]
        email: Email,

        /// Read from stdin when omitted
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Create an account and sign in
    Register {
        #[arg(short, long)]
        email: Email,

        /// Read from stdin when omitted
        #[arg(short, long)]
        password: Option<String>,

        /// Account role (`customer`, `seller`)
        #[arg(short, long, default_value = "customer")]
        role: UserRole,
    },
    /// Sign out and forget the saved tokens
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Browse the catalog
    Products {
        #[command(subcommand)]
        action: ProductsAction,
    },
    /// Manage the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Manage favorites
    Favorites {
        #[command(subcommand)]
        action: FavoritesAction,
    },
    /// Fill in and place an order
    Checkout {
        #[command(subcommand)]
        action: CheckoutAction,
    },
    /// Order history
    Orders {
        #[command(subcommand)]
        action: OrdersAction,
    },
    /// Seller dashboard
    Seller {
        #[command(subcommand)]
        action: SellerAction,
    },
    /// Color theme preference
    Theme {
        #[command(subcommand)]
        action: ThemeAction,
    },
}

#[derive(Subcommand)]
enum ProductsAction {
    /// List products
    List {
        #[arg(short, long)]
        search: Option<String>,

        #[arg(short, long)]
        category: Option<CategoryId>,

        /// Sort field, e.g. `price` or `-created_at`
        #[arg(short, long)]
        ordering: Option<String>,

        #[arg(long)]
        page: Option<u32>,
    },
    /// Show one product with its reviews
    Show { id: ProductId },
}

#[derive(Subcommand)]
enum CartAction {
    /// Show the cart
    Show,
    /// Add a product
    Add {
        product_id: ProductId,

        #[arg(short, long, default_value_t = 1)]
        quantity: u32,
    },
    /// Set a line's quantity; zero or less removes it
    Update {
        line_id: LineItemId,

        #[arg(allow_negative_numbers = true)]
        quantity: i64,
    },
    /// Remove a line
    Remove { line_id: LineItemId },
}

#[derive(Subcommand)]
enum FavoritesAction {
    /// List favorites
    List,
    /// Add or remove a product
    Toggle { product_id: ProductId },
}

#[derive(Subcommand)]
enum CheckoutAction {
    /// Show the form, saved draft and cart
    Show,
    /// Edit the saved form
    Fill {
        #[arg(long)]
        full_name: Option<String>,

        #[arg(long)]
        phone: Option<String>,

        #[arg(long)]
        email: Option<String>,

        #[arg(long)]
        address: Option<String>,

        /// `pickup`, `courier` or `post`
        #[arg(long)]
        delivery: Option<DeliveryMethod>,

        #[arg(long)]
        comment: Option<String>,

        #[arg(long, allow_negative_numbers = true)]
        step: Option<i64>,
    },
    /// Restore the saved draft into the cart and form
    Restore,
    /// Delete the saved draft
    Discard,
    /// Place the order
    Submit,
}

#[derive(Subcommand)]
enum OrdersAction {
    /// List your orders
    List,
    /// Show one order
    Show { id: OrderId },
}

#[derive(Subcommand)]
enum SellerAction {
    /// List your products
    Products,
    /// List orders containing your products
    Orders,
    /// Show sales analytics
    Analytics,
}

#[derive(Subcommand)]
enum ThemeAction {
    /// Show the saved theme
    Show,
    /// Switch to the next theme
    Toggle,
    /// Save a theme (`light`, `dark`, `gray`)
    Set { theme: Theme },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
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
        Err(e) => exit_with(&format!("Invalid configuration: {e}"), 2),
    };

    // Must be done before the tracing subscriber
    let _sentry_guard = init_sentry(&config);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cornermarket_storefront=info,cm_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    if let Err(e) = run(cli, config).await {
        tracing::error!("Command failed: {e}");
        exit_with(&e.user_message(), 1);
    }
}

#[allow(clippy::print_stderr)]
fn exit_with(message: &str, code: i32) -> ! {
    eprintln!("{message}");
    std::process::exit(code)
}

async fn run(cli: Cli, config: ClientConfig) -> Result<(), ClientError> {
    let storage = Arc::new(FileStorage::open(config.state_dir.clone())?);
    let state = AppState::new(config, storage)?;
    state.init().await;

    let result = dispatch(&state, cli.command).await;
    state.dispose();
    result
}

async fn dispatch(state: &AppState, command: Commands) -> Result<(), ClientError> {
    match command {
        Commands::Login { email, password } => {
            commands::account::login(state, &email, password).await
        }
        Commands::Register {
            email,
            password,
            role,
        } => commands::account::register(state, &email, password, role).await,
        Commands::Logout => {
            commands::account::logout(state).await;
            Ok(())
        }
        Commands::Whoami => commands::account::whoami(state).await,
        Commands::Products { action } => match action {
            ProductsAction::List {
                search,
                category,
                ordering,
                page,
            } => {
                let query = cornermarket_storefront::api::ProductQuery {
                    search,
                    category,
                    ordering,
                    page,
                };
                commands::catalog::list(state, &query).await
            }
            ProductsAction::Show { id } => commands::catalog::show(state, id).await,
        },
        Commands::Cart { action } => match action {
            CartAction::Show => {
                commands::cart::show(state);
                Ok(())
            }
            CartAction::Add {
                product_id,
                quantity,
            } => commands::cart::add(state, product_id, quantity).await,
            CartAction::Update { line_id, quantity } => {
                commands::cart::update(state, line_id, quantity).await
            }
            CartAction::Remove { line_id } => commands::cart::remove(state, line_id).await,
        },
        Commands::Favorites { action } => match action {
            FavoritesAction::List => commands::favorites::list(state),
            FavoritesAction::Toggle { product_id } => {
                commands::favorites::toggle(state, product_id).await
            }
        },
        Commands::Checkout { action } => match action {
            CheckoutAction::Show => {
                commands::checkout::show(state);
                Ok(())
            }
            CheckoutAction::Fill {
                full_name,
                phone,
                email,
                address,
                delivery,
                comment,
                step,
            } => {
                let edit = commands::checkout::FormEdit {
                    full_name,
                    phone,
                    email,
                    address,
                    delivery,
                    comment,
                    step,
                };
                commands::checkout::fill(state, edit);
                Ok(())
            }
            CheckoutAction::Restore => {
                commands::checkout::restore(state).await;
                Ok(())
            }
            CheckoutAction::Discard => {
                commands::checkout::discard(state);
                Ok(())
            }
            CheckoutAction::Submit => commands::checkout::submit(state).await,
        },
        Commands::Orders { action } => match action {
            OrdersAction::List => commands::account::orders(state).await,
            OrdersAction::Show { id } => commands::account::order(state, id).await,
        },
        Commands::Seller { action } => match action {
            SellerAction::Products => commands::seller::products(state).await,
            SellerAction::Orders => commands::seller::orders(state).await,
            SellerAction::Analytics => commands::seller::analytics(state).await,
        },
        Commands::Theme { action } => {
            match action {
                ThemeAction::Show => commands::theme::show(state),
                ThemeAction::Toggle => commands::theme::toggle(state),
                ThemeAction::Set { theme } => commands::theme::set(state, theme),
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_negative_quantity_parses() {
        let cli = Cli::try_parse_from(["cm-cli", "cart", "update", "7", "-1"]);
        assert!(matches!(
            cli.map(|c| c.command),
            Ok(Commands::Cart {
                action: CartAction::Update { quantity: -1, .. }
            })
        ));
    }
}
