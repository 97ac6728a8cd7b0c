//! Open-data source contract for the Gent "bloklocaties" dataset, plus the
//! address heuristics used to split its free-text `adres` field.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use async_trait::async_trait;
use blokloc_storage::{FetchError, HttpFetcher};
use regex::Regex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_SOURCE_URL: &str =
    "https://data.stad.gent/api/records/1.0/search/?dataset=bloklocaties-gent&q=&rows=100";

/// Search response of the open-data records API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub nhits: usize,
    pub records: Vec<ApiRecord>,
}

impl ApiResponse {
    /// The first `nhits` records. A response that reports more hits than it
    /// carries is truncated to what is present.
    pub fn hits(&self) -> &[ApiRecord] {
        if self.nhits != self.records.len() {
            warn!(
                nhits = self.nhits,
                records = self.records.len(),
                "nhits does not match the number of returned records"
            );
        }
        &self.records[..self.nhits.min(self.records.len())]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiRecord {
    pub recordid: String,
    pub fields: RecordFields,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordFields {
    pub adres: String,
    pub titel: String,
    pub label_1: String,
    pub lees_meer: String,
    pub teaser_img_url: String,
    /// `[latitude, longitude]`
    pub geo_punt: [f64; 2],
    pub totale_capaciteit: u32,
    pub gereserveerde_plaatsen: u32,
}

impl RecordFields {
    pub fn latitude(&self) -> f64 {
        self.geo_punt[0]
    }

    pub fn longitude(&self) -> f64 {
        self.geo_punt[1]
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("reading {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("parsing {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Human readable origin, used in logs and the run summary.
    fn describe(&self) -> String;

    async fn fetch(&self) -> Result<ApiResponse, SourceError>;
}

/// Live API source: one GET, decoded as [`ApiResponse`].
#[derive(Debug, Clone)]
pub struct HttpRecordSource {
    http: HttpFetcher,
    url: String,
}

impl HttpRecordSource {
    pub fn new(http: HttpFetcher, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait]
impl RecordSource for HttpRecordSource {
    fn describe(&self) -> String {
        self.url.clone()
    }

    async fn fetch(&self) -> Result<ApiResponse, SourceError> {
        Ok(self.http.fetch_json(&self.url).await?)
    }
}

/// Saved API response on disk.
#[derive(Debug, Clone)]
pub struct SnapshotRecordSource {
    path: PathBuf,
}

impl SnapshotRecordSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RecordSource for SnapshotRecordSource {
    fn describe(&self) -> String {
        format!("snapshot {}", self.path.display())
    }

    async fn fetch(&self) -> Result<ApiResponse, SourceError> {
        load_snapshot(&self.path)
    }
}

pub fn load_snapshot(path: impl AsRef<Path>) -> Result<ApiResponse, SourceError> {
    read_json_file(path)
}

fn read_json_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, SourceError> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).map_err(|source| SourceError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&data).map_err(|source| SourceError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

const DEFAULT_POSTAL_CITY: &str = "9000 Gent";

/// Fallback when the postal/city part is not a plain `<code> <city>` pair:
/// the first entry with a needle contained in the text wins.
const KNOWN_LOCALITIES: &[(&[&str], &str, &str)] = &[
    (&["Gent", "9000"], "9000", "Gent"),
    (&["Merelbeke"], "9820", "Merelbeke"),
];

static HOUSE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\s*\w*").expect("static regex compiles"));
static DIGIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d").expect("static regex compiles"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedAddress {
    pub street: String,
    pub number: String,
    pub postal_code: String,
    pub city: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("no house number in address {address:?}")]
    MissingHouseNumber { address: String },
    #[error("unknown postal code/city {locality:?} in address {address:?}")]
    UnknownLocality { address: String, locality: String },
}

/// Split `"<street> <number>[, <postal code> <city>]"` into its parts.
pub fn parse_address(address: &str) -> Result<ParsedAddress, AddressError> {
    let (street_nr, postal_city) = match address.split_once(',') {
        Some((street_nr, postal_city)) => (street_nr.trim(), postal_city.trim()),
        None => (address.trim(), DEFAULT_POSTAL_CITY),
    };

    let number = HOUSE_NUMBER
        .find(street_nr)
        .ok_or_else(|| AddressError::MissingHouseNumber {
            address: address.to_string(),
        })?
        .as_str()
        .to_string();
    let street = match DIGIT.find(street_nr) {
        Some(m) => street_nr[..m.start()].trim(),
        None => street_nr,
    };

    let tokens: Vec<&str> = postal_city.split_whitespace().collect();
    let (postal_code, city) = match tokens.as_slice() {
        [code, city] => (code.to_string(), city.to_string()),
        _ => KNOWN_LOCALITIES
            .iter()
            .find(|(needles, _, _)| needles.iter().any(|n| postal_city.contains(n)))
            .map(|(_, code, city)| (code.to_string(), city.to_string()))
            .ok_or_else(|| AddressError::UnknownLocality {
                address: address.to_string(),
                locality: postal_city.to_string(),
            })?,
    };

    Ok(ParsedAddress {
        street: street.to_string(),
        number,
        postal_code,
        city,
    })
}
