//! Upstream dataset download.
//!
//! A fetch is a single blocking GET. The response is decoded as ISO-8859-1,
//! parsed as a `;`-delimited table, re-encoded with the same conventions and
//! atomically written over the tier-1 file. Any failure leaves the files on
//! disk exactly as they were.

use crate::codec::{copy_atomic, read_table, write_atomic, write_table};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::types::{DatasetTier, FetchOutcome};
use reqwest::blocking::Client;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// A parsed upstream table, encoded and ready to be written.
#[derive(Debug, Clone)]
pub struct DownloadedTable {
    bytes: Vec<u8>,
    rows: usize,
}

impl DownloadedTable {
    pub fn rows(&self) -> usize {
        self.rows
    }
}

/// Downloads the published dataset into the tier-1 file.
pub struct RemoteFetcher {
    client: Client,
    url: String,
    target: PathBuf,
    backup: Option<PathBuf>,
}

impl RemoteFetcher {
    /// Create a fetcher writing to `target`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the HTTP client cannot be created.
    pub fn new(url: impl Into<String>, target: impl Into<PathBuf>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("hemo-processing/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PipelineError::InvalidConfig(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
            target: target.into(),
            backup: None,
        })
    }

    /// Fetcher for the configured upstream, processed tier and backup tier.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let fetcher = Self::new(
            config.upstream_url.clone(),
            config.tier_path(DatasetTier::Processed),
            Duration::from_secs(config.fetch_timeout_secs),
        )?;
        Ok(if config.backup_on_fetch {
            fetcher.with_backup(config.tier_path(DatasetTier::Backup))
        } else {
            fetcher
        })
    }

    /// Copy the current tier-1 file here before replacing it.
    pub fn with_backup(mut self, path: impl Into<PathBuf>) -> Self {
        self.backup = Some(path.into());
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Download the upstream table and replace the tier-1 file with it.
    ///
    /// One attempt per call; retries are the caller's decision. Equivalent to
    /// [`download_table`](Self::download_table) followed by
    /// [`commit`](Self::commit).
    ///
    /// # Errors
    ///
    /// - `NetworkFailure` on timeout or connection errors
    /// - `UpstreamHttpError` on a non-success status
    /// - `ParseFailure` when the body is not a delimited table
    pub fn fetch(&self) -> Result<FetchOutcome> {
        match self.download_table()? {
            Some(download) => self.commit(download),
            None => Ok(FetchOutcome::Empty),
        }
    }

    /// Download, parse and re-encode the upstream table without touching
    /// any file. `None` when the table has no rows.
    ///
    /// # Errors
    ///
    /// Same as [`fetch`](Self::fetch).
    pub fn download_table(&self) -> Result<Option<DownloadedTable>> {
        let start = Instant::now();
        let body = self.download()?;
        let table = read_table(&body, &format!("response from {}", self.url))?;

        if table.height() == 0 {
            warn!("Upstream returned a table with no rows; keeping current data");
            return Ok(None);
        }

        let encoded = write_table(&table)?;
        info!(
            "Downloaded {} rows in {:.2}s",
            table.height(),
            start.elapsed().as_secs_f64()
        );
        Ok(Some(DownloadedTable {
            bytes: encoded,
            rows: table.height(),
        }))
    }

    /// Copy the current tier-1 file to the backup tier, then atomically
    /// replace it with `download`.
    pub fn commit(&self, download: DownloadedTable) -> Result<FetchOutcome> {
        if let Some(backup) = &self.backup
            && copy_atomic(&self.target, backup)?
        {
            info!("Previous dataset kept at {}", backup.display());
        }
        write_atomic(&self.target, &download.bytes)?;

        info!("Replaced {} with {} rows", self.target.display(), download.rows);
        Ok(FetchOutcome::Replaced {
            path: self.target.clone(),
            rows: download.rows,
        })
    }

    /// Raw response body of a successful GET.
    fn download(&self) -> Result<Vec<u8>> {
        info!("Downloading dataset from {}", self.url);
        let network = |source| PipelineError::NetworkFailure {
            url: self.url.clone(),
            source,
        };

        let response = self.client.get(&self.url).send().map_err(network)?;
        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::UpstreamHttpError {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }
        let body = response.bytes().map_err(network)?;
        Ok(body.to_vec())
    }
}
