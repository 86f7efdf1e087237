use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use directories::ProjectDirs;
use tokio::fs;
use tracing::info;

use etagsync::errors::NonUtf8PathError;
use etagsync::{Profile, Synchronizer, Url, DEFAULT_FILE_PREFIX};

const DEFAULT_ENDPOINT: &str = "https://swapi.dev/api/";

/// Default data path.
fn default_data_path() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("", "", "etagsync") {
        proj_dirs.data_dir().to_path_buf()
    } else {
        PathBuf::from(".etagsync")
    }
}

/// Calculate default data directory path based on OS.
fn default_data_directory() -> PathBuf {
    default_data_path().join("downloaded_data")
}

/// Calculate default database path based on OS.
fn default_database_path() -> PathBuf {
    default_data_path().join("etagsync.sqlite")
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProfileKind {
    /// Single resource, flattened as is.
    Flat,

    /// SWAPI people joined with planets.
    Swapi,
}

/// CLI interface of etagsync.
///
/// Every option can also be set through its environment variable.
#[derive(Parser, Clone, Debug)]
#[command(version, about = "Keep CSV snapshots of an API resource, tracked by ETag")]
pub struct Cli {
    /// Base URL of the upstream API.
    #[arg(
        long,
        env = "ETAGSYNC_ENDPOINT_URL",
        value_name = "URL",
        default_value = DEFAULT_ENDPOINT,
        global = true
    )]
    endpoint_url: Url,

    /// Path to metadata database file.
    #[arg(
        short = 'd',
        long,
        env = "ETAGSYNC_DATABASE",
        value_name = "PATH",
        default_value = default_database_path().into_os_string(),
        global = true
    )]
    database: PathBuf,

    /// Directory where CSV data files are stored.
    #[arg(
        short = 'o',
        long,
        env = "ETAGSYNC_DATA_DIR",
        value_name = "PATH",
        default_value = default_data_directory().into_os_string(),
        global = true
    )]
    data_dir: PathBuf,

    /// Synchronization profile.
    #[arg(
        long,
        value_enum,
        env = "ETAGSYNC_PROFILE",
        default_value_t = ProfileKind::Swapi,
        global = true
    )]
    profile: ProfileKind,

    /// Resource to synchronize with `flat` profile, people resource with `swapi` profile.
    #[arg(long, env = "ETAGSYNC_RESOURCE", default_value = "people", global = true)]
    resource: String,

    /// Planets resource used by `swapi` profile.
    #[arg(
        long,
        env = "ETAGSYNC_PLANETS_RESOURCE",
        default_value = "planets",
        global = true
    )]
    planets_resource: String,

    /// Prefix of data file names.
    #[arg(
        long,
        env = "ETAGSYNC_FILE_PREFIX",
        default_value = DEFAULT_FILE_PREFIX,
        global = true
    )]
    file_prefix: String,

    /// Timeout of a single HTTP request.
    #[arg(
        long,
        env = "ETAGSYNC_TIMEOUT",
        value_name = "SECONDS",
        default_value_t = 30,
        global = true
    )]
    timeout: u64,

    /// Command to execute. Defaults to `sync`.
    #[command(subcommand)]
    command: Option<Command>,
}

impl Cli {
    fn profile(&self) -> Profile {
        match self.profile {
            ProfileKind::Flat => Profile::Flat {
                resource: self.resource.clone(),
            },
            ProfileKind::Swapi => Profile::Swapi {
                people: self.resource.clone(),
                planets: self.planets_resource.clone(),
            },
        }
    }

    pub async fn execute(&self) -> anyhow::Result<()> {
        let database = self
            .database
            .as_os_str()
            .to_str()
            .ok_or(NonUtf8PathError)
            .context("failed to create database file")?;

        // Ensure database file has its parent directory
        if let Some(parent_dir) = self.database.parent() {
            fs::create_dir_all(parent_dir)
                .await
                .context("failed to create database file")?;
        }

        let mut sync = Synchronizer::builder(database, &self.data_dir, self.endpoint_url.clone())
            .profile(self.profile())
            .file_prefix(&self.file_prefix)
            .timeout(Duration::from_secs(self.timeout))
            .build()
            .await
            .context("failed to initialize synchronizer")?;

        self.command
            .clone()
            .unwrap_or(Command::Sync)
            .execute(&mut sync, &self.resource)
            .await
    }
}

/// Etagsync commands.
#[derive(Clone, Debug, clap::Subcommand)]
pub enum Command {
    /// Synchronize configured resources once.
    Sync,

    /// List metadata records.
    List {
        /// List records of every resource.
        #[arg(long)]
        all: bool,

        /// Print one JSON object per record.
        #[arg(long)]
        json: bool,
    },

    /// Print rows of a record's data file as CSV.
    Show {
        /// Record id.
        id: i32,

        /// Rows already seen; prints the first `offset + 10` rows.
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// Count rows per distinct combination of columns.
    Count {
        /// Record id.
        id: i32,

        /// Columns to group by, comma separated.
        #[arg(long, value_delimiter = ',', required = true)]
        columns: Vec<String>,
    },
}

impl Command {
    pub async fn execute(&self, sync: &mut Synchronizer, resource: &str) -> anyhow::Result<()> {
        match self {
            Self::Sync => {
                let report = sync.run().await.context("synchronization failed")?;
                println!("{}", report);
            }
            Self::List { all, json } => {
                let records = if *all {
                    sync.list_all().await?
                } else {
                    sync.list(resource).await?
                };
                for record in records {
                    if *json {
                        println!("{}", serde_json::to_string(&record)?);
                    } else {
                        println!("{}", record);
                    }
                }
            }
            Self::Show { id, offset } => {
                let record = sync.get(*id).await?;
                let table = record
                    .read_table()
                    .await
                    .with_context(|| format!("failed to read {}", record.path().display()))?;
                let page = table.page(*offset);
                print!("{}", String::from_utf8_lossy(&page.to_csv()?));
                if page.len() < table.len() {
                    info!("{} of {} rows, next offset {}", page.len(), table.len(), page.len());
                }
            }
            Self::Count { id, columns } => {
                let record = sync.get(*id).await?;
                let table = record
                    .read_table()
                    .await
                    .with_context(|| format!("failed to read {}", record.path().display()))?;
                let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
                let counts = table.value_counts(&columns)?;
                print!("{}", String::from_utf8_lossy(&counts.to_csv()?));
            }
        }
        Ok(())
    }
}
