//! Seed pipeline: fetch source records, build entities, store images, write
//! the bulk-load fixture.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use blokloc_adapters::{
    parse_address, AddressError, ApiRecord, HttpRecordSource, ParsedAddress, RecordSource, SnapshotRecordSource,
    DEFAULT_SOURCE_URL,
};
use blokloc_core::{
    Keyed, Location, LocationRating, Observation, ObservationRating, ObservationType,
    RatingDirection, SeedDataset, SeedRecord, Timestamp, User, UserStatus, ADMIN_USER_ID,
    DUMMY_USER_ID,
};
use blokloc_storage::{HttpClientConfig, HttpFetcher, ImageStore, StoredImage};
use chrono::{DateTime, Local, SubsecRound, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio::fs;
use tracing::{debug, info};

pub const LOCATION_RATING_ODDS: f64 = 0.5;
pub const OBSERVATION_RATING_ODDS: f64 = 0.25;
pub const OUTPUT_FILE_NAME: &str = "initial_blokloc_data.json";

#[derive(Debug, Clone)]
pub struct SeedConfig {
    pub source_url: String,
    pub data_dir: PathBuf,
    /// Read the API response from this file instead of the network.
    pub snapshot: Option<PathBuf>,
    pub download_images: bool,
    pub seed: Option<u64>,
    /// Pins `date_created`/`date_modified`; defaults to the local time at run start.
    pub timestamp: Option<Timestamp>,
    pub user_agent: String,
    pub http_timeout_secs: u64,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            source_url: DEFAULT_SOURCE_URL.to_string(),
            data_dir: PathBuf::from("./data"),
            snapshot: None,
            download_images: true,
            seed: None,
            timestamp: None,
            user_agent: "blokloc-seed/0.1".to_string(),
            http_timeout_secs: 30,
        }
    }
}

impl SeedConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from `BLOKLOC_*` variables resolved through `lookup`.
    /// Values that are present but malformed are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let seed = lookup("BLOKLOC_SEED")
            .map(|v| {
                v.trim()
                    .parse::<u64>()
                    .with_context(|| format!("parsing BLOKLOC_SEED={v:?}"))
            })
            .transpose()?;
        let timestamp = lookup("BLOKLOC_TIMESTAMP")
            .map(|v| parse_timestamp(&v).context("parsing BLOKLOC_TIMESTAMP"))
            .transpose()?;
        let http_timeout_secs = lookup("BLOKLOC_HTTP_TIMEOUT_SECS")
            .map(|v| {
                v.trim()
                    .parse::<u64>()
                    .with_context(|| format!("parsing BLOKLOC_HTTP_TIMEOUT_SECS={v:?}"))
            })
            .transpose()?
            .unwrap_or(defaults.http_timeout_secs);

        Ok(Self {
            source_url: lookup("BLOKLOC_SOURCE_URL").unwrap_or(defaults.source_url),
            data_dir: lookup("BLOKLOC_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            snapshot: lookup("BLOKLOC_SNAPSHOT").map(PathBuf::from),
            download_images: !lookup("BLOKLOC_SKIP_IMAGES")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
                .unwrap_or(false),
            seed,
            timestamp,
            user_agent: lookup("BLOKLOC_USER_AGENT").unwrap_or(defaults.user_agent),
            http_timeout_secs,
        })
    }

    /// `0` disables the client timeout.
    pub fn http_timeout(&self) -> Option<Duration> {
        (self.http_timeout_secs > 0).then(|| Duration::from_secs(self.http_timeout_secs))
    }

    pub fn output_path(&self) -> PathBuf {
        self.data_dir.join(OUTPUT_FILE_NAME)
    }
}

pub fn parse_timestamp(value: &str) -> Result<Timestamp> {
    DateTime::parse_from_rfc3339(value.trim())
        .with_context(|| format!("parsing RFC 3339 timestamp {value:?}"))
}

/// Whole-second timestamp shared by every entity of a run.
pub fn run_timestamp(pinned: Option<Timestamp>) -> Timestamp {
    pinned
        .unwrap_or_else(|| Local::now().fixed_offset())
        .trunc_subsecs(0)
}

pub fn rng_from_seed(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Last key handed out per entity type. Keys start at 1 and are never reused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyCounters {
    pub user: u32,
    pub location: u32,
    pub observation: u32,
    pub location_rating: u32,
    pub observation_rating: u32,
}

fn bump(counter: &mut u32) -> u32 {
    *counter += 1;
    *counter
}

impl KeyCounters {
    pub fn next_user(&mut self) -> u32 {
        bump(&mut self.user)
    }

    pub fn next_location(&mut self) -> u32 {
        bump(&mut self.location)
    }

    pub fn next_observation(&mut self) -> u32 {
        bump(&mut self.observation)
    }

    pub fn next_location_rating(&mut self) -> u32 {
        bump(&mut self.location_rating)
    }

    pub fn next_observation_rating(&mut self) -> u32 {
        bump(&mut self.observation_rating)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatingDraw {
    pub user_id: u32,
    pub direction: RatingDirection,
}

/// Coin flips deciding whether (and how) a generated entity gets rated.
#[derive(Debug)]
pub struct RatingGenerator<R> {
    rng: R,
}

impl<R: Rng> RatingGenerator<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    /// A rating with probability `odds`, by a uniformly chosen seed user in a
    /// uniformly chosen direction.
    pub fn draw(&mut self, odds: f64) -> Option<RatingDraw> {
        if self.rng.gen::<f64>() >= odds {
            return None;
        }
        let user_id = self.rng.gen_range(ADMIN_USER_ID..=DUMMY_USER_ID);
        let direction = if self.rng.gen_bool(0.5) {
            RatingDirection::Upvote
        } else {
            RatingDirection::Downvote
        };
        Some(RatingDraw { user_id, direction })
    }
}

struct SeedUser {
    status: UserStatus,
    username: &'static str,
    password: &'static str,
}

const SEED_USERS: [SeedUser; 2] = [
    SeedUser {
        status: UserStatus::Admin,
        username: "test_admin",
        password: "admin123",
    },
    SeedUser {
        status: UserStatus::Dummy,
        username: "test_dummy",
        password: "dummy123",
    },
];

pub fn text_observation_content(title: &str) -> String {
    format!("Hi! Dummy here, this is a test TEXT-observation for home location {title}")
}

pub fn link_observation_content(link: &str) -> String {
    format!("Homepage:{link}")
}

/// Turns source records into seed entities, one record at a time.
#[derive(Debug)]
pub struct RecordBuilder<R> {
    timestamp: Timestamp,
    keys: KeyCounters,
    ratings: RatingGenerator<R>,
    dataset: SeedDataset,
}

impl<R: Rng> RecordBuilder<R> {
    /// Starts a dataset that already holds the admin and dummy users.
    pub fn new(timestamp: Timestamp, ratings: RatingGenerator<R>) -> Self {
        let mut builder = Self {
            timestamp,
            keys: KeyCounters::default(),
            ratings,
            dataset: SeedDataset::default(),
        };
        for user in &SEED_USERS {
            let pk = builder.keys.next_user();
            builder.dataset.users.push(Keyed::new(
                pk,
                User {
                    userstatus: user.status,
                    username: user.username.to_string(),
                    password: user.password.to_string(),
                    date_created: timestamp,
                    date_modified: timestamp,
                },
            ));
        }
        builder
    }

    pub fn keys(&self) -> KeyCounters {
        self.keys
    }

    pub fn dataset(&self) -> &SeedDataset {
        &self.dataset
    }

    /// Parses the record's address, then [`push_parsed`](Self::push_parsed).
    /// A record that fails to parse leaves the builder untouched.
    pub fn push_record(&mut self, record: &ApiRecord, image_path: &str) -> Result<u32, AddressError> {
        let address = parse_address(&record.fields.adres)?;
        Ok(self.push_parsed(record, address, image_path))
    }

    /// Adds the location, its image/link/text observations and the optional
    /// ratings for one record. Returns the location key.
    pub fn push_parsed(&mut self, record: &ApiRecord, address: ParsedAddress, image_path: &str) -> u32 {
        let fields = &record.fields;
        let location_vote = self.ratings.draw(LOCATION_RATING_ODDS);
        let observation_vote = self.ratings.draw(OBSERVATION_RATING_ODDS);
        let ts = self.timestamp;

        let location_pk = self.keys.next_location();
        self.dataset.locations.push(Keyed::new(
            location_pk,
            Location {
                fk_user: ADMIN_USER_ID,
                record_id: record.recordid.clone(),
                name: fields.label_1.clone(),
                title: fields.titel.clone(),
                date_created: ts,
                date_modified: ts,
                link: fields.lees_meer.clone(),
                street: address.street,
                number: address.number,
                city: address.city,
                postal_code: address.postal_code,
                latitude: fields.latitude(),
                longitude: fields.longitude(),
                capacity: fields.totale_capaciteit,
                reserved: fields.gereserveerde_plaatsen,
                loc_rating: RatingDirection::aggregate(location_vote.map(|v| v.direction)),
            },
        ));

        let observations = [
            (ADMIN_USER_ID, ObservationType::Image, 0, image_path.to_string()),
            (
                ADMIN_USER_ID,
                ObservationType::Link,
                0,
                link_observation_content(&fields.lees_meer),
            ),
            (
                DUMMY_USER_ID,
                ObservationType::Text,
                RatingDirection::aggregate(observation_vote.map(|v| v.direction)),
                text_observation_content(&fields.titel),
            ),
        ];
        let mut text_observation_pk = 0;
        for (fk_user, obs_type, obs_rating, obs_content) in observations {
            let pk = self.keys.next_observation();
            if obs_type == ObservationType::Text {
                text_observation_pk = pk;
            }
            self.dataset.observations.push(Keyed::new(
                pk,
                Observation {
                    fk_user,
                    fk_location: location_pk,
                    date_created: ts,
                    date_modified: ts,
                    obs_rating,
                    obs_type,
                    obs_content,
                },
            ));
        }

        if let Some(vote) = location_vote {
            let pk = self.keys.next_location_rating();
            self.dataset.location_ratings.push(Keyed::new(
                pk,
                LocationRating {
                    fk_user: vote.user_id,
                    fk_location: location_pk,
                    date_created: ts,
                    date_modified: ts,
                    rating: vote.direction,
                },
            ));
        }

        if let Some(vote) = observation_vote {
            let pk = self.keys.next_observation_rating();
            self.dataset.observation_ratings.push(Keyed::new(
                pk,
                ObservationRating {
                    fk_user: vote.user_id,
                    fk_observation: text_observation_pk,
                    date_created: ts,
                    date_modified: ts,
                    rating: vote.direction,
                },
            ));
        }

        debug!(
            location = location_pk,
            title = %fields.titel,
            location_rated = location_vote.is_some(),
            observation_rated = observation_vote.is_some(),
            "built location"
        );
        location_pk
    }

    pub fn finish(self) -> SeedDataset {
        self.dataset
    }
}

/// Result of handling one record's home image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOutcome {
    Stored(StoredImage),
    /// Path computed but nothing fetched or written.
    Skipped(PathBuf),
}

impl ImageOutcome {
    pub fn path(&self) -> &Path {
        match self {
            ImageOutcome::Stored(stored) => &stored.path,
            ImageOutcome::Skipped(path) => path,
        }
    }
}

#[async_trait]
pub trait ImageDownloader: Send + Sync {
    async fn fetch_home_image(&self, title: &str, url: &str) -> Result<ImageOutcome>;
}

pub struct HttpImageDownloader {
    http: HttpFetcher,
    store: ImageStore,
}

impl HttpImageDownloader {
    pub fn new(http: HttpFetcher, store: ImageStore) -> Self {
        Self { http, store }
    }
}

#[async_trait]
impl ImageDownloader for HttpImageDownloader {
    async fn fetch_home_image(&self, title: &str, url: &str) -> Result<ImageOutcome> {
        let response = self
            .http
            .fetch_bytes(url)
            .await
            .with_context(|| format!("downloading image for {title:?}"))?;
        let stored = self.store.store_home_image(title, &response.body).await?;
        debug!(path = %stored.path.display(), sha256 = %stored.content_hash, "stored image");
        Ok(ImageOutcome::Stored(stored))
    }
}

pub struct PathOnlyImageDownloader {
    store: ImageStore,
}

impl PathOnlyImageDownloader {
    pub fn new(store: ImageStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ImageDownloader for PathOnlyImageDownloader {
    async fn fetch_home_image(&self, title: &str, _url: &str) -> Result<ImageOutcome> {
        Ok(ImageOutcome::Skipped(self.store.home_image_path(title)))
    }
}

/// Pretty JSON with a 4-space indent, records in load order.
pub fn render_records(records: &[SeedRecord]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    records
        .serialize(&mut serializer)
        .context("serializing seed records")?;
    Ok(out)
}

pub async fn write_dataset(path: &Path, dataset: SeedDataset) -> Result<usize> {
    let records = dataset.into_records();
    let bytes = render_records(&records)?;
    fs::write(path, bytes)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(records.len())
}

pub fn read_records(path: &Path) -> Result<Vec<SeedRecord>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

#[derive(Debug, Clone)]
pub struct SeedRunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub source: String,
    pub nhits: usize,
    pub users: usize,
    pub locations: usize,
    pub observations: usize,
    pub location_ratings: usize,
    pub observation_ratings: usize,
    pub images_stored: usize,
    pub output_path: String,
}

pub struct SeedPipeline {
    config: SeedConfig,
    store: ImageStore,
    source: Box<dyn RecordSource>,
    images: Box<dyn ImageDownloader>,
}

impl SeedPipeline {
    pub fn new(config: SeedConfig) -> Result<Self> {
        let store = ImageStore::new(config.data_dir.clone());
        let http = HttpFetcher::new(HttpClientConfig {
            timeout: config.http_timeout(),
            user_agent: Some(config.user_agent.clone()),
        })?;

        let source: Box<dyn RecordSource> = match &config.snapshot {
            Some(path) => Box::new(SnapshotRecordSource::new(path.clone())),
            None => Box::new(HttpRecordSource::new(http.clone(), config.source_url.clone())),
        };
        let images: Box<dyn ImageDownloader> = if config.download_images {
            Box::new(HttpImageDownloader::new(http, store.clone()))
        } else {
            Box::new(PathOnlyImageDownloader::new(store.clone()))
        };

        Ok(Self {
            config,
            store,
            source,
            images,
        })
    }

    pub fn with_source(mut self, source: Box<dyn RecordSource>) -> Self {
        self.source = source;
        self
    }

    pub fn with_image_downloader(mut self, images: Box<dyn ImageDownloader>) -> Self {
        self.images = images;
        self
    }

    pub async fn run_once(&self) -> Result<SeedRunSummary> {
        let started_at = Utc::now();
        self.store.ensure_layout().await?;

        let source = self.source.describe();
        info!(%source, "fetching source records");
        let response = self
            .source
            .fetch()
            .await
            .with_context(|| format!("fetching records from {source}"))?;
        info!(nhits = response.nhits, "source records loaded");

        let timestamp = run_timestamp(self.config.timestamp);
        let ratings = RatingGenerator::new(rng_from_seed(self.config.seed));
        let mut builder = RecordBuilder::new(timestamp, ratings);
        let mut images_stored = 0usize;

        for record in response.hits() {
            let fields = &record.fields;
            // Parse first so a bad record aborts before its image is written.
            let address = parse_address(&fields.adres)
                .with_context(|| format!("building record {}", record.recordid))?;
            let image = self
                .images
                .fetch_home_image(&fields.titel, &fields.teaser_img_url)
                .await?;
            if matches!(image, ImageOutcome::Stored(_)) {
                images_stored += 1;
            }
            let image_path = image.path().display().to_string();
            builder.push_parsed(record, address, &image_path);
        }

        let dataset = builder.finish();
        let summary_counts = (
            dataset.users.len(),
            dataset.locations.len(),
            dataset.observations.len(),
            dataset.location_ratings.len(),
            dataset.observation_ratings.len(),
        );
        let output_path = self.config.output_path();
        write_dataset(&output_path, dataset).await?;

        let (users, locations, observations, location_ratings, observation_ratings) = summary_counts;
        let summary = SeedRunSummary {
            started_at,
            finished_at: Utc::now(),
            source,
            nhits: response.nhits,
            users,
            locations,
            observations,
            location_ratings,
            observation_ratings,
            images_stored,
            output_path: output_path.display().to_string(),
        };
        info!(
            locations = summary.locations,
            observations = summary.observations,
            location_ratings = summary.location_ratings,
            observation_ratings = summary.observation_ratings,
            images = summary.images_stored,
            output = %summary.output_path,
            "seed data written"
        );
        Ok(summary)
    }
}

pub async fn run_seed_once(config: SeedConfig) -> Result<SeedRunSummary> {
    SeedPipeline::new(config)?.run_once().await
}
