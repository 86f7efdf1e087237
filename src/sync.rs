use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client as ReqwestClient;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::database::models::{MetadataEntry, NewMetadataEntry};
use crate::database::{self, api, Connection};
use crate::errors::{Error, NonUtf8PathError, StorageError, TransformError};
use crate::fetch::{Fetcher, Record};
use crate::record::MetadataRecord;
use crate::table::Table;
use crate::transform;

type Result<T> = std::result::Result<T, Error>;

/// Default timeout of a single HTTP request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default prefix of data file names.
pub const DEFAULT_FILE_PREFIX: &str = "starwars_data_";

/// Which resources a run synchronizes and how their records are transformed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Profile {
    /// One resource, records are flattened as they are.
    Flat { resource: String },

    /// SWAPI people with homeworld names taken from the planets resource.
    ///
    /// Planets are only synchronized when people changed.
    Swapi { people: String, planets: String },
}

impl Default for Profile {
    fn default() -> Self {
        Self::Swapi {
            people: "people".to_string(),
            planets: "planets".to_string(),
        }
    }
}

/// Synchronization state of a single resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncState {
    /// No metadata recorded yet.
    Initial,

    /// At least one record exists, the most recent one is attached.
    Tracking(MetadataRecord),
}

/// Result of synchronizing a single resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    /// New data file was written.
    Downloaded { record: MetadataRecord, rows: usize },

    /// ETag did not change, a pseudo-file record was appended.
    Unchanged { record: MetadataRecord },
}

impl SyncOutcome {
    /// Record appended by the run.
    pub fn record(&self) -> &MetadataRecord {
        match self {
            Self::Downloaded { record, .. } | Self::Unchanged { record } => record,
        }
    }

    pub fn is_downloaded(&self) -> bool {
        matches!(self, Self::Downloaded { .. })
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Downloaded { record, rows } => write!(
                f,
                "{}: downloaded {} ({} rows, etag {})",
                record.resource, record.file_name, rows, record.etag
            ),
            Self::Unchanged { record } => write!(
                f,
                "{}: nothing has been updated (etag {}), linked {}",
                record.resource, record.etag, record.file_name
            ),
        }
    }
}

/// Outcomes of one run, in the order resources were stored.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub outcomes: Vec<SyncOutcome>,
}

impl SyncReport {
    /// Whether any resource got a new data file.
    pub fn downloaded(&self) -> bool {
        self.outcomes.iter().any(SyncOutcome::is_downloaded)
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<String> = self.outcomes.iter().map(ToString::to_string).collect();
        write!(f, "{}", lines.join("\n"))
    }
}

/// What to do with a resource after looking at its ETag.
enum Decision {
    Reuse { previous: MetadataEntry, etag: String },
    Download { etag: String },
}

/// Resource ready to be committed.
enum Staged {
    /// Append pseudo-file record pointing at the file of `previous`.
    Link { previous: MetadataEntry, etag: String },

    /// Write `table` into a new data file and append its record.
    Write {
        resource: String,
        etag: String,
        table: Table,
    },
}

/// Used to create precisely configured [`Synchronizer`].
#[must_use]
#[derive(Clone, Debug)]
pub struct SynchronizerBuilder {
    database_url: String,
    data_dir: PathBuf,
    endpoint: Url,
    reqwest_client: Option<ReqwestClient>,
    timeout: Duration,
    profile: Profile,
    file_prefix: String,
}

impl SynchronizerBuilder {
    /// Create new synchronizer builder.
    pub fn new<P>(database_url: &str, data_dir: P, endpoint: Url) -> Self
    where
        P: AsRef<Path>,
    {
        Self {
            database_url: database_url.to_string(),
            data_dir: data_dir.as_ref().to_path_buf(),
            endpoint,
            reqwest_client: None,
            timeout: DEFAULT_TIMEOUT,
            profile: Profile::default(),
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
        }
    }

    /// Set [`reqwest::Client`] to use for fetching.
    ///
    /// If not set, a client with [`Self::timeout`] applied will be built on initialization.
    pub fn reqwest_client(&mut self, reqwest_client: ReqwestClient) -> &mut Self {
        self.reqwest_client = Some(reqwest_client);
        self
    }

    /// Set timeout of a single HTTP request. Ignored if custom client is set.
    pub fn timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = timeout;
        self
    }

    /// Set synchronization profile. Defaults to [`Profile::Swapi`].
    pub fn profile(&mut self, profile: Profile) -> &mut Self {
        self.profile = profile;
        self
    }

    /// Set prefix of data file names.
    pub fn file_prefix(&mut self, prefix: &str) -> &mut Self {
        self.file_prefix = prefix.to_string();
        self
    }

    /// Build synchronizer.
    ///
    /// # Errors
    ///
    /// Returns error if initialization fails.
    pub async fn build(&self) -> Result<Synchronizer> {
        let reqwest_client = match &self.reqwest_client {
            Some(client) => client.clone(),
            None => ReqwestClient::builder()
                .timeout(self.timeout)
                .build()
                .map_err(Error::ReqwestClientBuildError)?,
        };
        let mut sync = Synchronizer::init_with_client(
            &self.database_url,
            &self.data_dir,
            Fetcher::new(reqwest_client, self.endpoint.clone()),
        )
        .await?;
        sync.profile = self.profile.clone();
        sync.file_prefix = self.file_prefix.clone();
        Ok(sync)
    }
}

/// Keeps CSV snapshots of upstream resources and their metadata log.
///
/// Each resource sync appends exactly one metadata record. A data file is
/// written only when the upstream ETag changed, and it is durable on disk
/// before its record is inserted.
pub struct Synchronizer {
    /// Directory for data files.
    pub(crate) data_dir: PathBuf,

    /// Metadata database connection.
    pub(crate) db: Connection,

    database_url: String,
    fetcher: Fetcher,
    profile: Profile,
    file_prefix: String,
}

impl Synchronizer {
    /// Create [`SynchronizerBuilder`] for precise [`Synchronizer`] configuration.
    pub fn builder<P>(database_url: &str, data_dir: P, endpoint: Url) -> SynchronizerBuilder
    where
        P: AsRef<Path>,
    {
        SynchronizerBuilder::new(database_url, data_dir, endpoint)
    }

    /// Initialize synchronizer with default settings.
    ///
    /// Initializes data directory and database if they don't exist.
    pub async fn init<P>(database_url: &str, data_dir: P, endpoint: Url) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        Self::builder(database_url, data_dir, endpoint).build().await
    }

    async fn init_with_client(database_url: &str, data_dir: &Path, fetcher: Fetcher) -> Result<Self> {
        trace!("running migrations on {}", database_url);
        database::run_migrations(database_url).await?;

        trace!("establishing metadata database connection: {}", database_url);
        let db = database::establish_connection(database_url).await?;

        // Database must store absolute paths for data files
        let data_dir = std::path::absolute(data_dir)?;
        if !data_dir.exists() {
            fs::create_dir_all(&data_dir).await?;
        }

        Ok(Self {
            data_dir,
            db,
            database_url: database_url.to_string(),
            fetcher,
            profile: Profile::default(),
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
        })
    }

    /// Run the configured profile once.
    pub async fn run(&mut self) -> Result<SyncReport> {
        let outcomes = match self.profile.clone() {
            Profile::Flat { resource } => {
                self.sync_resource(&resource, |records| Ok(transform::flatten(records)))
                    .await?
            }
            Profile::Swapi { people, planets } => self.sync_people(&people, &planets).await?,
        };
        for outcome in &outcomes {
            info!("{}", outcome);
        }
        Ok(SyncReport { outcomes })
    }

    /// Current state of `resource`.
    pub async fn state(&mut self, resource: &str) -> Result<SyncState> {
        Ok(match api::latest(&mut self.db, resource).await? {
            Some(entry) => SyncState::Tracking(entry.into()),
            None => SyncState::Initial,
        })
    }

    /// Synchronize `resource`, turning its records into a table with `transform`
    /// when new data has to be downloaded.
    ///
    /// The returned list holds the outcome of the one record appended.
    pub async fn sync_resource<F>(
        &mut self,
        resource: &str,
        transform: F,
    ) -> Result<Vec<SyncOutcome>>
    where
        F: FnOnce(&[Record]) -> std::result::Result<Table, TransformError>,
    {
        let staged = match self.decide(resource).await? {
            Decision::Reuse { previous, etag } => Staged::Link { previous, etag },
            Decision::Download { etag } => {
                let records = self.fetcher.fetch_payload(resource).await?;
                Staged::Write {
                    resource: resource.to_string(),
                    etag,
                    table: transform(&records)?,
                }
            }
        };
        self.commit(vec![staged]).await
    }

    /// SWAPI people flow: planets are synchronized only when people changed.
    ///
    /// Both tables are built before anything is written, so a failure leaves
    /// neither a new file nor a new record behind.
    async fn sync_people(&mut self, people: &str, planets: &str) -> Result<Vec<SyncOutcome>> {
        let people_etag = match self.decide(people).await? {
            Decision::Reuse { previous, etag } => {
                return self.commit(vec![Staged::Link { previous, etag }]).await;
            }
            Decision::Download { etag } => etag,
        };
        let records = self.fetcher.fetch_payload(people).await?;

        let (planets_staged, planets_table) = match self.decide(planets).await? {
            Decision::Reuse { previous, etag } => {
                let table = Table::read_csv(&previous.file_path).await?;
                (Staged::Link { previous, etag }, table)
            }
            Decision::Download { etag } => {
                let planet_records = self.fetcher.fetch_payload(planets).await?;
                let table = transform::planets(&planet_records)?;
                let staged = Staged::Write {
                    resource: planets.to_string(),
                    etag,
                    table: table.clone(),
                };
                (staged, table)
            }
        };
        let people_table = transform::people_with_homeworlds(&records, &planets_table)?;

        let people_staged = Staged::Write {
            resource: people.to_string(),
            etag: people_etag,
            table: people_table,
        };
        self.commit(vec![planets_staged, people_staged]).await
    }

    /// Look at the most recent record of `resource` and the current upstream ETag.
    async fn decide(&mut self, resource: &str) -> Result<Decision> {
        let Some(previous) = api::latest(&mut self.db, resource).await? else {
            debug!("'{}' has no metadata yet", resource);
            let etag = self.fetcher.fetch_etag(resource, None).await?;
            return Ok(Decision::Download { etag });
        };

        let etag = self
            .fetcher
            .fetch_etag(resource, Some(&previous.etag))
            .await?;
        if etag.is_empty() || etag != previous.etag {
            debug!(
                "'{}' changed: etag {:?} -> {:?}",
                resource, previous.etag, etag
            );
            return Ok(Decision::Download { etag });
        }
        if !fs::try_exists(&previous.file_path).await? {
            warn!(
                "'{}' is unchanged but {} is missing, downloading again",
                resource, previous.file_path
            );
            return Ok(Decision::Download { etag });
        }
        debug!("'{}' unchanged: etag {:?}", resource, etag);
        Ok(Decision::Reuse { previous, etag })
    }

    /// Write new data files of `staged`, then append all records in one transaction.
    ///
    /// If writing or inserting fails, files written so far are removed again.
    async fn commit(&mut self, staged: Vec<Staged>) -> Result<Vec<SyncOutcome>> {
        let mut written: Vec<PathBuf> = Vec::new();
        let mut new_entries = Vec::with_capacity(staged.len());
        let mut rows = Vec::with_capacity(staged.len());

        let prepared = async {
            for item in &staged {
                match item {
                    Staged::Link { previous, etag } => {
                        new_entries.push(NewMetadataEntry::pseudo(previous, etag));
                        rows.push(None);
                    }
                    Staged::Write {
                        resource,
                        etag,
                        table,
                    } => {
                        let file_name = self.file_name(resource, etag, Utc::now());
                        let path = self.data_dir.join(&file_name);
                        let path_str = path.to_str().ok_or(NonUtf8PathError)?.to_string();
                        write_durably(&path, &table.to_csv()?).await?;
                        debug!("written {} rows to {}", table.len(), path_str);
                        written.push(path);
                        new_entries.push(NewMetadataEntry::new(resource, etag, &file_name, &path_str));
                        rows.push(Some(table.len()));
                    }
                }
            }
            Ok::<(), Error>(())
        }
        .await;

        let inserted = match prepared {
            Ok(()) => api::insert_all(&mut self.db, &new_entries)
                .await
                .map_err(Error::from),
            Err(err) => Err(err),
        };
        match inserted {
            Ok(entries) => Ok(entries
                .into_iter()
                .zip(rows)
                .map(|(entry, rows)| match rows {
                    Some(rows) => SyncOutcome::Downloaded {
                        record: entry.into(),
                        rows,
                    },
                    None => SyncOutcome::Unchanged {
                        record: entry.into(),
                    },
                })
                .collect()),
            Err(err) => {
                for path in &written {
                    if let Err(remove_error) = fs::remove_file(path).await {
                        warn!("failed to remove {}: {}", path.display(), remove_error);
                    }
                }
                Err(err)
            }
        }
    }

    /// `{prefix}{resource}_{YYYYmmdd-HHMMSS}_{hash}.csv`
    fn file_name(&self, resource: &str, etag: &str, now: DateTime<Utc>) -> String {
        let resource: String = resource
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let digest = sha256::digest(format!(
            "{}{}",
            etag,
            now.to_rfc3339_opts(SecondsFormat::Nanos, true)
        ));
        format!(
            "{}{}_{}_{}.csv",
            self.file_prefix,
            resource,
            now.format("%Y%m%d-%H%M%S"),
            &digest[..8]
        )
    }

    /// All records of `resource` in insertion order.
    pub async fn list(&mut self, resource: &str) -> Result<Vec<MetadataRecord>> {
        let entries = api::filter_by_resource(&mut self.db, resource).await?;
        Ok(entries.into_iter().map(Into::into).collect())
    }

    /// All records in insertion order.
    pub async fn list_all(&mut self) -> Result<Vec<MetadataRecord>> {
        let entries = api::get_all(&mut self.db).await?;
        Ok(entries.into_iter().map(Into::into).collect())
    }

    /// Record with primary key `id`.
    pub async fn get(&mut self, id: i32) -> Result<MetadataRecord> {
        match api::get_entry(&mut self.db, id).await {
            Ok(entry) => Ok(entry.into()),
            Err(err) if err.is_not_found() => Err(Error::NotFound(id)),
            Err(err) => Err(err.into()),
        }
    }
}

impl fmt::Debug for Synchronizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Synchronizer")
            .field("data_dir", &self.data_dir)
            .field("database_url", &self.database_url)
            .field("endpoint", &self.fetcher.endpoint().as_str())
            .field("profile", &self.profile)
            .finish()
    }
}

/// Write `content` to a hidden temp file next to `path`, sync it and move it into place.
///
/// Never overwrites an existing file.
async fn write_durably(path: &Path, content: &[u8]) -> std::result::Result<(), StorageError> {
    let path_str = path.to_str().ok_or(NonUtf8PathError)?;
    if fs::try_exists(path).await? {
        return Err(StorageError::FileExists(path_str.to_string()));
    }
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or(NonUtf8PathError)?;
    let tmp_path = path.with_file_name(format!(".{file_name}.tmp"));

    let result = async {
        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(content).await?;
        file.flush().await?;
        file.sync_all().await?;
        fs::rename(&tmp_path, path).await
    }
    .await;

    if let Err(err) = result {
        if let Err(remove_error) = fs::remove_file(&tmp_path).await {
            trace!("temp file {} not removed: {}", tmp_path.display(), remove_error);
        }
        return Err(err.into());
    }

    // Persist the rename itself
    #[cfg(unix)]
    if let Some(parent) = path.parent() {
        let synced = async { fs::File::open(parent).await?.sync_all().await }.await;
        if let Err(err) = synced {
            if let Err(remove_error) = fs::remove_file(path).await {
                warn!("failed to remove {}: {}", path_str, remove_error);
            }
            return Err(err.into());
        }
    }
    Ok(())
}
