//! civic - command-line client for the civic issue tracker
//!
//! Talks to a running civic-api; `migrate --local` works on a store file
//! directly.

use anyhow::Result;
use civic_core::ListParams;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod client;
mod commands;

use client::{ApiClient, DEFAULT_API_URL};

#[derive(Parser)]
#[command(name = "civic")]
#[command(about = "Civic issue tracker client")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// API base URL
    #[arg(long, global = true, env = "CIVIC_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Bearer token sent with every request
    #[arg(long, global = true, env = "CIVIC_API_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List issues
    List {
        /// Filter by status (Pending, "In Progress", Resolved)
        #[arg(short, long)]
        status: Option<String>,

        /// Filter by priority (low, medium, high, critical)
        #[arg(short, long)]
        priority: Option<String>,

        /// Filter by category
        #[arg(short, long)]
        category: Option<String>,

        /// Free-text filter
        #[arg(long)]
        search: Option<String>,

        /// Page number (1-based)
        #[arg(long)]
        page: Option<usize>,

        /// Issues per page
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show issue details and timeline
    Show {
        /// Issue ID
        id: String,
    },

    /// Report a new issue
    Create {
        /// Issue title
        title: String,

        /// Description
        #[arg(short, long)]
        description: String,

        /// Street address
        #[arg(short, long)]
        address: String,

        /// Ward
        #[arg(short, long)]
        ward: Option<String>,

        /// Category
        #[arg(short, long)]
        category: Option<String>,

        /// Priority (low, medium, high, critical)
        #[arg(short, long)]
        priority: Option<String>,

        /// Latitude
        #[arg(long, requires = "lng", allow_negative_numbers = true)]
        lat: Option<f64>,

        /// Longitude
        #[arg(long, requires = "lat", allow_negative_numbers = true)]
        lng: Option<f64>,

        /// Photo URL (repeatable)
        #[arg(long = "photo")]
        photos: Vec<String>,
    },

    /// Change an issue's status
    Status {
        /// Issue ID
        id: String,

        /// New status (Pending, "In Progress", Resolved)
        status: String,

        /// Timeline note
        #[arg(short, long)]
        note: Option<String>,
    },

    /// Search titles, descriptions and addresses
    Search {
        /// Search text
        query: String,

        /// Maximum results
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show issue statistics
    Stats,

    /// Rewrite legacy status values and backfill timelines
    Migrate {
        /// Migrate this store file directly instead of calling the API
        #[arg(long, value_name = "PATH")]
        local: Option<PathBuf>,
    },

    /// Check that the API is up
    Health,

    /// Configuration helpers
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the default configuration with comments
    Default,
    /// Print the config file location
    Path,
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let client = match cli.token.filter(|t| !t.trim().is_empty()) {
        Some(token) => ApiClient::new(cli.api_url).with_token(token),
        None => ApiClient::new(cli.api_url),
    };

    match cli.command {
        Commands::List {
            status,
            priority,
            category,
            search,
            page,
            limit,
        } => {
            let params = ListParams {
                status,
                priority,
                category,
                search,
                page,
                limit,
            };
            commands::list(&client, params, cli.json).await
        }
        Commands::Show { id } => commands::show(&client, &id, cli.json).await,
        Commands::Create {
            title,
            description,
            address,
            ward,
            category,
            priority,
            lat,
            lng,
            photos,
        } => {
            let args = commands::CreateArgs {
                title,
                description,
                address,
                ward,
                category,
                priority,
                coordinates: lat.zip(lng),
                photos,
            };
            commands::create(&client, args, cli.json).await
        }
        Commands::Status { id, status, note } => {
            commands::status(&client, &id, &status, note, cli.json).await
        }
        Commands::Search { query, limit } => {
            commands::search(&client, &query, limit, cli.json).await
        }
        Commands::Stats => commands::stats(&client, cli.json).await,
        Commands::Migrate { local } => match local {
            Some(path) => commands::migrate_local(&path, cli.json).await,
            None => commands::migrate(&client, cli.json).await,
        },
        Commands::Health => commands::health(&client, cli.json).await,
        Commands::Config { command } => match command {
            ConfigCommands::Default => commands::config_default(),
            ConfigCommands::Path => commands::config_path(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_status_command() {
        let cli = Cli::try_parse_from([
            "civic",
            "status",
            "0123456789abcdefghjkmnpq",
            "In Progress",
            "--note",
            "Crew dispatched",
        ])
        .unwrap();
        match cli.command {
            Commands::Status { status, note, .. } => {
                assert_eq!(status, "In Progress");
                assert_eq!(note.as_deref(), Some("Crew dispatched"));
            }
            _ => panic!("expected status command"),
        }
    }

    #[test]
    fn test_coordinates_require_both() {
        let result = Cli::try_parse_from([
            "civic", "create", "Pothole", "-d", "Deep", "-a", "1 Elm St", "--lat", "12.9",
        ]);
        assert!(result.is_err());
    }
}
