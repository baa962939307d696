mod commands;
mod config;
mod logging;
mod server;

use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use crate::commands::{
    ImportFlags, ProductChanges, cmd_backup_clear, cmd_backup_export, cmd_backup_import,
    cmd_backup_validate, cmd_category_add, cmd_category_defaults, cmd_category_delete,
    cmd_category_list, cmd_category_update, cmd_location_add, cmd_location_defaults,
    cmd_location_delete, cmd_location_list, cmd_location_update, cmd_product_add,
    cmd_product_delete, cmd_product_expired, cmd_product_expiring, cmd_product_list,
    cmd_product_show, cmd_product_stats, cmd_product_update, json_error, parse_optional_date,
};
use crate::config::Config;
use frostbox_core::models::{NewCategory, NewLocation, NewProduct, ProductFilter};
use frostbox_core::service::FreezerService;

#[derive(Parser)]
#[command(
    name = "frostbox",
    version,
    about = "Keep track of what is in your freezer",
    long_about = "Keep track of what is in your freezer.\n\n\
                  Products live in categories and freezer locations; expiry dates are \
                  derived from each category's storage days. Backups can be exported, \
                  validated and restored with conflict handling."
)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage product categories
    Category {
        #[command(subcommand)]
        command: CategoryCommands,
    },
    /// Manage freezer locations
    Location {
        #[command(subcommand)]
        command: LocationCommands,
    },
    /// Manage frozen products
    Product {
        #[command(subcommand)]
        command: ProductCommands,
    },
    /// Export, import, validate or clear data
    Backup {
        #[command(subcommand)]
        command: BackupCommands,
    },
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Disable API key authentication (for development/testing)
        #[arg(long)]
        no_auth: bool,
    },
}

#[derive(Args)]
struct CategoryFields {
    /// Hex color like #3B82F6
    #[arg(long)]
    color: Option<String>,
    /// Days a product in this category keeps
    #[arg(long)]
    days: Option<i64>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    icon: Option<String>,
}

impl CategoryFields {
    fn into_new(self, name: String) -> NewCategory {
        NewCategory {
            name,
            color: self.color,
            default_storage_days: self.days,
            description: self.description,
            icon: self.icon,
        }
    }
}

#[derive(Subcommand)]
enum CategoryCommands {
    /// List categories with their product counts
    List,
    /// Add a category
    Add {
        name: String,
        #[command(flatten)]
        fields: CategoryFields,
    },
    /// Change a category; unset options keep their values
    Update {
        id: i64,
        /// New name
        #[arg(long)]
        name: Option<String>,
        #[command(flatten)]
        fields: CategoryFields,
    },
    /// Delete an unused category
    Delete { id: i64 },
    /// Add any missing built-in categories
    Defaults,
}

#[derive(Args)]
struct LocationFields {
    #[arg(long)]
    description: Option<String>,
    /// Freezer section, e.g. upper, drawer1, door
    #[arg(long)]
    section: Option<String>,
    /// Position in listings
    #[arg(long)]
    sort_order: Option<i64>,
}

impl LocationFields {
    fn into_new(self, name: String) -> NewLocation {
        NewLocation {
            name,
            description: self.description,
            freezer_section: self.section,
            sort_order: self.sort_order,
        }
    }
}

#[derive(Subcommand)]
enum LocationCommands {
    /// List locations with their product counts
    List {
        /// Only locations in this freezer section
        #[arg(long)]
        section: Option<String>,
    },
    /// Add a location
    Add {
        name: String,
        #[command(flatten)]
        fields: LocationFields,
    },
    /// Change a location; unset options keep their values
    Update {
        id: i64,
        /// New name
        #[arg(long)]
        name: Option<String>,
        #[command(flatten)]
        fields: LocationFields,
    },
    /// Delete an empty location
    Delete { id: i64 },
    /// Add the built-in locations (only when none exist)
    Defaults,
}

#[derive(Subcommand)]
enum ProductCommands {
    /// List products, newest first
    List {
        /// Filter by category ID
        #[arg(long)]
        category: Option<i64>,
        /// Filter by location ID
        #[arg(long)]
        location: Option<i64>,
        /// Case-insensitive name search
        #[arg(short, long)]
        search: Option<String>,
        /// Maximum number of products
        #[arg(long)]
        limit: Option<i64>,
        /// Number of products to skip
        #[arg(long)]
        offset: Option<i64>,
    },
    /// Show one product
    Show { id: i64 },
    /// Put a product into the freezer
    Add {
        name: String,
        /// Amount, must be greater than 0
        #[arg(short, long, default_value = "1")]
        quantity: f64,
        /// Unit (default: pieces)
        #[arg(short, long)]
        unit: Option<String>,
        /// Category ID
        #[arg(long)]
        category: Option<i64>,
        /// Location ID
        #[arg(long)]
        location: Option<i64>,
        /// Date frozen (YYYY-MM-DD or today/yesterday, default: today)
        #[arg(long)]
        frozen: Option<String>,
        /// Expiration date (default: frozen date + category storage days)
        #[arg(long)]
        expires: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        barcode: Option<String>,
    },
    /// Change a product; unset options keep their values
    Update {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(short, long)]
        quantity: Option<f64>,
        #[arg(short, long)]
        unit: Option<String>,
        #[arg(long, conflicts_with = "no_category")]
        category: Option<i64>,
        /// Remove the category
        #[arg(long)]
        no_category: bool,
        #[arg(long, conflicts_with = "no_location")]
        location: Option<i64>,
        /// Remove the location
        #[arg(long)]
        no_location: bool,
        #[arg(long)]
        frozen: Option<String>,
        #[arg(long)]
        expires: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        barcode: Option<String>,
    },
    /// Take a product out of the freezer
    Delete { id: i64 },
    /// Products expiring within N days (expired ones included)
    Expiring {
        #[arg(short, long, default_value = "7")]
        days: i64,
    },
    /// Products past their expiration date
    Expired,
    /// Totals, expired and expiring-soon counts
    Stats,
}

#[derive(Subcommand)]
enum BackupCommands {
    /// Write a backup file
    Export {
        /// json or archive (default: from --output, else json)
        #[arg(short, long)]
        format: Option<String>,
        /// Output path (default: frostbox-backup-<timestamp>.<ext>)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Restore a backup file into the database
    Import {
        file: PathBuf,
        /// json or archive (default: from the file name)
        #[arg(short, long)]
        format: Option<String>,
        /// Delete existing data first
        #[arg(long)]
        clear: bool,
        /// What to do with name collisions: skip, overwrite, rename, merge
        #[arg(long)]
        policy: Option<String>,
        /// Keep record IDs from the backup when inserting
        #[arg(long)]
        preserve_ids: bool,
    },
    /// Check a backup file without importing it
    Validate {
        file: PathBuf,
        #[arg(short, long)]
        format: Option<String>,
    },
    /// Delete all products, categories and locations
    Clear {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    let _logger = match logging::init() {
        Ok(handle) => Some(handle),
        Err(e) => {
            eprintln!("Warning: logging disabled: {e:#}");
            None
        }
    };

    if let Err(e) = run(cli).await {
        if json {
            println!("{}", json_error(&format!("{e:#}")));
        } else {
            eprintln!("Error: {e:#}");
        }
        process::exit(1);
    }
}

#[allow(clippy::too_many_lines)]
async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let svc = FreezerService::new(&config.db_path)?;
    let json = cli.json;

    match cli.command {
        Commands::Category { command } => match command {
            CategoryCommands::List => cmd_category_list(&svc, json),
            CategoryCommands::Add { name, fields } => {
                cmd_category_add(&svc, &fields.into_new(name), json)
            }
            CategoryCommands::Update { id, name, fields } => {
                cmd_category_update(&svc, id, fields.into_new(name.unwrap_or_default()), json)
            }
            CategoryCommands::Delete { id } => cmd_category_delete(&svc, id, json),
            CategoryCommands::Defaults => cmd_category_defaults(&svc, json),
        },
        Commands::Location { command } => match command {
            LocationCommands::List { section } => {
                cmd_location_list(&svc, section.as_deref(), json)
            }
            LocationCommands::Add { name, fields } => {
                cmd_location_add(&svc, &fields.into_new(name), json)
            }
            LocationCommands::Update { id, name, fields } => {
                cmd_location_update(&svc, id, fields.into_new(name.unwrap_or_default()), json)
            }
            LocationCommands::Delete { id } => cmd_location_delete(&svc, id, json),
            LocationCommands::Defaults => cmd_location_defaults(&svc, json),
        },
        Commands::Product { command } => match command {
            ProductCommands::List {
                category,
                location,
                search,
                limit,
                offset,
            } => {
                let filter = ProductFilter {
                    category_id: category,
                    location_id: location,
                    name: search,
                    limit,
                    offset,
                };
                cmd_product_list(&svc, &filter, json)
            }
            ProductCommands::Show { id } => cmd_product_show(&svc, id, json),
            ProductCommands::Add {
                name,
                quantity,
                unit,
                category,
                location,
                frozen,
                expires,
                notes,
                barcode,
            } => {
                let product = NewProduct {
                    name,
                    category_id: category,
                    location_id: location,
                    quantity,
                    unit,
                    frozen_date: parse_optional_date(frozen.as_deref())?,
                    expiration_date: parse_optional_date(expires.as_deref())?,
                    notes,
                    image_url: None,
                    barcode,
                };
                cmd_product_add(&svc, &product, json)
            }
            ProductCommands::Update {
                id,
                name,
                quantity,
                unit,
                category,
                no_category,
                location,
                no_location,
                frozen,
                expires,
                notes,
                barcode,
            } => {
                let changes = ProductChanges {
                    name,
                    category_id: category,
                    clear_category: no_category,
                    location_id: location,
                    clear_location: no_location,
                    quantity,
                    unit,
                    frozen_date: parse_optional_date(frozen.as_deref())?,
                    expiration_date: parse_optional_date(expires.as_deref())?,
                    notes,
                    barcode,
                };
                cmd_product_update(&svc, id, changes, json)
            }
            ProductCommands::Delete { id } => cmd_product_delete(&svc, id, json),
            ProductCommands::Expiring { days } => cmd_product_expiring(&svc, days, json),
            ProductCommands::Expired => cmd_product_expired(&svc, json),
            ProductCommands::Stats => cmd_product_stats(&svc, json),
        },
        Commands::Backup { command } => match command {
            BackupCommands::Export { format, output } => {
                cmd_backup_export(&svc, format.as_deref(), output, json)
            }
            BackupCommands::Import {
                file,
                format,
                clear,
                policy,
                preserve_ids,
            } => {
                let flags = ImportFlags {
                    clear,
                    policy: policy.as_deref(),
                    preserve_ids,
                };
                cmd_backup_import(&svc, &file, format.as_deref(), flags, json)
            }
            BackupCommands::Validate { file, format } => {
                cmd_backup_validate(&svc, &file, format.as_deref(), json)
            }
            BackupCommands::Clear { yes } => cmd_backup_clear(&svc, yes, json),
        },
        Commands::Serve {
            port,
            bind,
            no_auth,
        } => {
            let api_key = if no_auth {
                None
            } else {
                Some(config.load_or_create_api_key()?.0)
            };
            server::start_server(svc, port, &bind, api_key).await
        }
    }
}
