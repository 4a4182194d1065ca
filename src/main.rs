//! # truckstop CLI
//!
//! The `truckstop` binary imports the San Francisco food truck dataset and
//! searches it, either directly from the terminal or through the HTTP API.
//!
//! ## Usage
//!
//! ```bash
//! truckstop --config ./config/truckstop.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `truckstop init` | Create the SQLite database and run schema migrations |
//! | `truckstop import` | Fetch and upsert the open-data export |
//! | `truckstop stats` | Status, facility type, and coordinate coverage summary |
//! | `truckstop search <name>` | Paginated name search |
//! | `truckstop search-address <address>` | Paginated address search |
//! | `truckstop nearby --lat <lat> --long <lon>` | Nearest trucks by distance |
//! | `truckstop get <id>` | Print one record |
//! | `truckstop serve` | Start the HTTP API server |
//!
//! ## Examples
//!
//! ```bash
//! # Import from a local export instead of the portal
//! truckstop import --file ./data/rqzj-sfat.json
//!
//! # Tacos within 2 km of Union Square
//! truckstop nearby --lat 37.788 --long -122.4075 --radius 2
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::filter::LevelFilter;

use truckstop::search::PageArgs;
use truckstop::{config, import, logging, migrate, search, server, stats};
use truckstop_core::nearby::NearbyQuery;
use truckstop_core::store::SearchField;
use truckstop_core::Kilometers;

/// truckstop: search San Francisco food trucks by name, address, or
/// distance.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/truckstop.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "truckstop",
    about = "truckstop: search San Francisco food trucks by name, address, or distance",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/truckstop.toml")]
    config: PathBuf,

    /// Log at debug level (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Import the Mobile Food Facility Permit dataset.
    ///
    /// Records without usable coordinates are skipped. Existing records are
    /// updated in place, keyed on the dataset's object id.
    Import {
        /// Transform and count only; write nothing.
        #[arg(long)]
        dry_run: bool,

        /// Read a JSON export from disk instead of fetching it.
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Summarize the imported dataset.
    Stats,

    /// Search by applicant name (case-insensitive substring).
    Search {
        name: String,

        #[command(flatten)]
        page: PageOpts,
    },

    /// Search by address or location description.
    SearchAddress {
        address: String,

        #[command(flatten)]
        page: PageOpts,
    },

    /// Find the nearest trucks to a point.
    Nearby {
        /// Latitude of the origin.
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        /// Longitude of the origin.
        #[arg(long, allow_hyphen_values = true)]
        long: f64,

        /// Search radius in km (default from `[nearby]`).
        #[arg(long)]
        radius: Option<f64>,

        /// Permit status to match (default APPROVED).
        #[arg(long)]
        status: Option<String>,

        /// Maximum number of results.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Print one record by id.
    Get { id: String },

    /// Start the HTTP API server on `[server].bind`.
    Serve,
}

#[derive(clap::Args)]
struct PageOpts {
    /// Permit status to match.
    #[arg(long)]
    status: Option<String>,

    /// Page size.
    #[arg(long)]
    limit: Option<i64>,

    /// Records to skip.
    #[arg(long)]
    offset: Option<i64>,
}

impl From<PageOpts> for PageArgs {
    fn from(o: PageOpts) -> Self {
        PageArgs {
            status: o.status,
            limit: o.limit,
            offset: o.offset,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init_logging(if cli.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    })?;

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Import { dry_run, file } => {
            import::run_import(&cfg, dry_run, file.as_deref()).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Search { name, page } => {
            search::run_text_search(&cfg, SearchField::Name, &name, page.into()).await?;
        }
        Commands::SearchAddress { address, page } => {
            search::run_text_search(&cfg, SearchField::Address, &address, page.into()).await?;
        }
        Commands::Nearby {
            lat,
            long,
            radius,
            status,
            limit,
        } => {
            let mut query = NearbyQuery::new(lat, long);
            query.radius = radius.map(Kilometers);
            query.status = status;
            query.limit = limit;
            search::run_nearby(&cfg, query).await?;
        }
        Commands::Get { id } => {
            search::run_get(&cfg, &id).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
