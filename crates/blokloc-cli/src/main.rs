use std::path::PathBuf;

use anyhow::Result;
use blokloc_core::Timestamp;
use blokloc_sync::{parse_timestamp, SeedConfig, SeedRunSummary};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "blokloc")]
#[command(about = "Build the bloklocaties seed dataset from the Gent open-data API")]
struct Cli {
    /// Source API url (defaults to the bloklocaties-gent search endpoint).
    url: Option<String>,

    /// Directory receiving the seed file and downloaded images.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Read a saved API response instead of calling the API.
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Do not download images; observations still reference their paths.
    #[arg(long)]
    skip_images: bool,

    /// Seed for the rating generator.
    #[arg(long)]
    seed: Option<u64>,

    /// RFC 3339 timestamp used for every date_created/date_modified field.
    #[arg(long, value_parser = parse_timestamp)]
    timestamp: Option<Timestamp>,

    #[arg(long)]
    user_agent: Option<String>,

    /// Per-request HTTP timeout in seconds; 0 disables the timeout.
    #[arg(long)]
    http_timeout_secs: Option<u64>,
}

impl Cli {
    fn into_config(self, mut config: SeedConfig) -> SeedConfig {
        if let Some(url) = self.url {
            config.source_url = url;
        }
        if let Some(dir) = self.data_dir {
            config.data_dir = dir;
        }
        if self.snapshot.is_some() {
            config.snapshot = self.snapshot;
        }
        if self.skip_images {
            config.download_images = false;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if self.timestamp.is_some() {
            config.timestamp = self.timestamp;
        }
        if let Some(user_agent) = self.user_agent {
            config.user_agent = user_agent;
        }
        if let Some(secs) = self.http_timeout_secs {
            config.http_timeout_secs = secs;
        }
        config
    }
}

fn print_summary(summary: &SeedRunSummary) {
    println!("source: {} ({} records)", summary.source, summary.nhits);
    println!("data saved to {}", summary.output_path);
    println!("  users:               {}", summary.users);
    println!("  locations:           {}", summary.locations);
    println!("  observations:        {}", summary.observations);
    println!("  location ratings:    {}", summary.location_ratings);
    println!("  observation ratings: {}", summary.observation_ratings);
    println!("  images stored:       {}", summary.images_stored);
    println!("load into Django with: python manage.py loaddata {}", summary.output_path);
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "blokloc=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Cli::parse().into_config(SeedConfig::from_env()?);
    tracing::debug!(?config, "resolved configuration");

    let summary = blokloc_sync::run_seed_once(config).await?;
    print_summary(&summary);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_url_and_flags_override_defaults() {
        let cli = Cli::parse_from([
            "blokloc",
            "https://example.test/api",
            "--skip-images",
            "--seed",
            "7",
            "--timestamp",
            "2026-10-17T14:03:09+02:00",
        ]);
        let config = cli.into_config(SeedConfig::default());
        assert_eq!(config.source_url, "https://example.test/api");
        assert!(!config.download_images);
        assert_eq!(config.seed, Some(7));
        assert_eq!(
            config.timestamp.map(|t| t.to_rfc3339()),
            Some("2026-10-17T14:03:09+02:00".to_string())
        );
        assert_eq!(config.data_dir, PathBuf::from("./data"));
    }

    #[test]
    fn zero_timeout_flag_disables_the_timeout() {
        let cli = Cli::parse_from(["blokloc", "--http-timeout-secs", "0"]);
        let config = cli.into_config(SeedConfig::default());
        assert_eq!(config.http_timeout(), None);
    }

    #[test]
    fn invalid_timestamp_is_rejected() {
        assert!(Cli::try_parse_from(["blokloc", "--timestamp", "yesterday"]).is_err());
    }
}
