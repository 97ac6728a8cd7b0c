//! HTTP fetch utilities + on-disk image storage for the seed run.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::Context;
use regex::Regex;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s]").expect("static regex compiles"));

/// Directory/file stem used for a location's images: spaces become
/// underscores, then anything that is not a word character or whitespace
/// is dropped.
pub fn sanitize_title(title: &str) -> String {
    NON_WORD.replace_all(&title.replace(' ', "_"), "").into_owned()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub path: PathBuf,
    pub content_hash: String,
    pub byte_size: usize,
}

/// Image layout under the data directory:
/// `<root>/images/<title>/<title>_home.jpg`.
#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join("images")
    }

    pub fn sha256_hex(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    pub fn home_image_path(&self, title: &str) -> PathBuf {
        let stem = sanitize_title(title);
        self.images_dir()
            .join(&stem)
            .join(format!("{stem}_home.jpg"))
    }

    /// Creates the data and image directories if they are missing.
    pub async fn ensure_layout(&self) -> anyhow::Result<()> {
        let images = self.images_dir();
        fs::create_dir_all(&images)
            .await
            .with_context(|| format!("creating image directory {}", images.display()))
    }

    /// Write the home image for `title`, replacing any previous copy via a
    /// temp file in the same directory.
    pub async fn store_home_image(&self, title: &str, bytes: &[u8]) -> anyhow::Result<StoredImage> {
        let path = self.home_image_path(title);
        let parent = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.images_dir());
        fs::create_dir_all(&parent)
            .await
            .with_context(|| format!("creating image directory {}", parent.display()))?;

        let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| format!("opening temp image file {}", temp_path.display()))?;
        let written = async {
            file.write_all(bytes).await?;
            file.flush().await
        }
        .await;
        drop(file);
        if let Err(err) = written {
            let _ = fs::remove_file(&temp_path).await;
            return Err(err).with_context(|| format!("writing temp image file {}", temp_path.display()));
        }

        if let Err(err) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(err).with_context(|| {
                format!(
                    "renaming temp image {} -> {}",
                    temp_path.display(),
                    path.display()
                )
            });
        }

        Ok(StoredImage {
            path,
            content_hash: Self::sha256_hex(bytes),
            byte_size: bytes.len(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Whole-request timeout; `None` waits indefinitely.
    pub timeout: Option<Duration>,
    pub user_agent: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(30)),
            user_agent: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub final_url: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("decoding JSON from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Single-shot HTTP client. A failed request is returned to the caller as-is.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder().gzip(true).brotli(true);

        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self { client })
    }

    pub async fn fetch_bytes(&self, url: &str) -> Result<FetchedResponse, FetchError> {
        let span = info_span!("http_fetch", url);
        async {
            let resp = self.client.get(url).send().await?;
            let status = resp.status();
            let final_url = resp.url().to_string();

            if !status.is_success() {
                return Err(FetchError::HttpStatus {
                    status: status.as_u16(),
                    url: final_url,
                });
            }

            let body = resp.bytes().await?.to_vec();
            debug!(status = status.as_u16(), bytes = body.len(), "fetched");
            Ok::<_, FetchError>(FetchedResponse { final_url, body })
        }
        .instrument(span)
        .await
    }

    pub async fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let response = self.fetch_bytes(url).await?;
        serde_json::from_slice(&response.body).map_err(|source| FetchError::Decode {
            url: response.final_url,
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn image_hashing_is_stable() {
        let hash = ImageStore::sha256_hex(b"hello world");
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn titles_are_sanitized_for_paths() {
        assert_eq!(sanitize_title("De Krook"), "De_Krook");
        assert_eq!(
            sanitize_title("UGent - Faculteit Ingenieurswetenschappen"),
            "UGent__Faculteit_Ingenieurswetenschappen"
        );
        assert_eq!(sanitize_title("Sint-Pieters (campus)"), "SintPieters_campus");
        assert_eq!(sanitize_title("Café Überleben"), "Café_Überleben");
    }

    #[test]
    fn home_image_path_nests_title_directory() {
        let store = ImageStore::new("./data");
        assert_eq!(
            store.home_image_path("De Krook").display().to_string(),
            "./data/images/De_Krook/De_Krook_home.jpg"
        );
    }

    #[tokio::test]
    async fn storing_an_image_replaces_previous_copy() {
        let dir = tempdir().expect("tempdir");
        let store = ImageStore::new(dir.path());
        store.ensure_layout().await.expect("layout");
        assert!(dir.path().join("images").is_dir());

        let first = store
            .store_home_image("De Krook", b"first")
            .await
            .expect("first store");
        let second = store
            .store_home_image("De Krook", b"second image")
            .await
            .expect("second store");

        assert_eq!(first.path, second.path);
        assert_ne!(first.content_hash, second.content_hash);
        assert_eq!(second.byte_size, 12);
        assert_eq!(std::fs::read(&second.path).expect("read"), b"second image");

        let leftovers = std::fs::read_dir(second.path.parent().unwrap())
            .unwrap()
            .count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn client_builds_with_and_without_timeout() {
        assert!(HttpFetcher::new(HttpClientConfig::default()).is_ok());
        let unbounded = HttpClientConfig {
            timeout: None,
            user_agent: Some("blokloc-test".into()),
        };
        assert!(HttpFetcher::new(unbounded).is_ok());
    }
}
