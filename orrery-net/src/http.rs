use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use orrery_common::config::Config;
use orrery_common::error::{OrreryError, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Client, StatusCode};
use tokio::fs::File as TokioFile;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error};

use crate::validation::{validate_url, verify_checksum};

const DOWNLOAD_TIMEOUT_SECS: u64 = 300;
const CONNECT_TIMEOUT_SECS: u64 = 30;
const USER_AGENT_STRING: &str = "orrery package manager (Rust)";

/// One archive to acquire.
#[derive(Debug, Clone, Copy)]
pub struct FetchRequest<'a> {
    pub name: &'a str,
    pub url: &'a str,
    pub sha256: &'a str,
    pub mirrors: &'a [String],
}

/// Acquires source archives and disk images. Returns a local path to the verified file.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, request: FetchRequest<'_>) -> Result<PathBuf>;
}

/// A single download attempt from one URL into `final_path`, verified against `sha256`.
#[async_trait]
pub trait UrlDownloader: Send + Sync {
    async fn download(&self, url: &str, final_path: &Path, sha256: &str) -> Result<PathBuf>;
}

pub struct ReqwestDownloader {
    client: Client,
}

impl ReqwestDownloader {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: build_http_client()?,
        })
    }
}

#[async_trait]
impl UrlDownloader for ReqwestDownloader {
    async fn download(&self, url: &str, final_path: &Path, sha256: &str) -> Result<PathBuf> {
        download_and_verify(&self.client, url, final_path, sha256).await
    }
}

/// Downloads over HTTPS into the orrery cache, reusing cached files whose checksum still matches.
/// The primary URL is tried first, then each mirror in order.
pub struct HttpFetcher {
    downloader: Box<dyn UrlDownloader>,
    cache_dir: PathBuf,
}

impl HttpFetcher {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self::with_downloader(config, ReqwestDownloader::new()?))
    }

    pub fn with_downloader(config: &Config, downloader: impl UrlDownloader + 'static) -> Self {
        Self {
            downloader: Box::new(downloader),
            cache_dir: config.cache_dir(),
        }
    }

    pub fn cache_path_for(&self, name: &str, url: &str) -> PathBuf {
        let filename = url
            .split('/')
            .next_back()
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .unwrap_or_else(|| "download".to_string());
        self.cache_dir.join(format!("{name}--{filename}"))
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(&self, request: FetchRequest<'_>) -> Result<PathBuf> {
        let cache_path = self.cache_path_for(request.name, request.url);
        debug!(
            "Preparing to fetch '{}' from URL: {}",
            request.name, request.url
        );
        debug!("Target cache path: {}", cache_path.display());

        if cache_path.is_file() {
            match verify_checksum(&cache_path, request.sha256) {
                Ok(()) => {
                    debug!("Using valid cached file: {}", cache_path.display());
                    return Ok(cache_path);
                }
                Err(e) => {
                    debug!(
                        "Cached file checksum mismatch ({}): {}. Redownloading.",
                        cache_path.display(),
                        e
                    );
                    if let Err(remove_err) = fs::remove_file(&cache_path) {
                        debug!(
                            "Failed to remove corrupted cached file {}: {}",
                            cache_path.display(),
                            remove_err
                        );
                    }
                }
            }
        }

        fs::create_dir_all(&self.cache_dir)?;

        let urls_to_try =
            std::iter::once(request.url).chain(request.mirrors.iter().map(String::as_str));
        let mut last_error: Option<OrreryError> = None;

        for current_url in urls_to_try {
            if let Err(e) = validate_url(current_url) {
                error!("Skipping {}: {}", current_url, e);
                last_error = Some(e);
                continue;
            }
            debug!("Attempting download from: {}", current_url);
            match self
                .downloader
                .download(current_url, &cache_path, request.sha256)
                .await
            {
                Ok(path) => {
                    debug!("Successfully downloaded and verified: {}", path.display());
                    return Ok(path);
                }
                // A wrong digest is not a transport problem; mirrors serve the same bytes.
                Err(e @ OrreryError::ChecksumMismatch { .. }) => return Err(e),
                Err(e) => {
                    error!("Download attempt failed from {}: {}", current_url, e);
                    last_error = Some(e);
                }
            }
        }

        Err(match last_error {
            Some(e @ OrreryError::DownloadFailed(..)) => e,
            None => OrreryError::DownloadFailed(
                request.name.to_string(),
                request.url.to_string(),
                "All download attempts failed.".to_string(),
            ),
            Some(e) => OrreryError::DownloadFailed(
                request.name.to_string(),
                request.url.to_string(),
                e.to_string(),
            ),
        })
    }
}

fn build_http_client() -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_STRING));
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    Client::builder()
        .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .default_headers(headers)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(OrreryError::from)
}

async fn download_and_verify(
    client: &Client,
    url: &str,
    final_path: &Path,
    sha256_expected: &str,
) -> Result<PathBuf> {
    let file_label = final_path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let temp_path = final_path.with_file_name(format!(".{file_label}.download"));
    debug!("Downloading to temporary path: {}", temp_path.display());
    if temp_path.exists() {
        if let Err(e) = fs::remove_file(&temp_path) {
            tracing::warn!(
                "Could not remove existing temporary file {}: {}",
                temp_path.display(),
                e
            );
        }
    }

    let response = client.get(url).send().await.map_err(|e| {
        debug!("HTTP request failed for {url}: {e}");
        OrreryError::DownloadFailed(file_label.clone(), url.to_string(), e.to_string())
    })?;
    let status = response.status();
    debug!("Received HTTP status: {} for {}", status, url);

    if !status.is_success() {
        let reason = match status {
            StatusCode::NOT_FOUND => "Resource not found (404)".to_string(),
            StatusCode::FORBIDDEN => "Access forbidden (403)".to_string(),
            other => format!("HTTP error {other}"),
        };
        error!("{} for URL {}", reason, url);
        return Err(OrreryError::DownloadFailed(
            file_label,
            url.to_string(),
            reason,
        ));
    }

    let mut temp_file = TokioFile::create(&temp_path).await?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            OrreryError::DownloadFailed(file_label.clone(), url.to_string(), e.to_string())
        })?;
        temp_file.write_all(&chunk).await?;
    }
    temp_file.flush().await?;
    drop(temp_file);
    debug!("Finished writing download stream to temp file.");

    if let Err(e) = verify_checksum(&temp_path, sha256_expected) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    fs::rename(&temp_path, final_path)?;
    debug!(
        "Moved verified file to final location: {}",
        final_path.display()
    );
    Ok(final_path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use super::*;

    // sha256("orrery source archive\n")
    const ARCHIVE_SHA: &str = "846820053a6e7b9b8c466119bc56b439e01f343c016fc427bbecef368b7fd78e";

    /// Answers each URL from a fixed table and records the attempts in order.
    #[derive(Default)]
    struct ScriptedDownloader {
        responses: HashMap<String, Result<String>>,
        attempts: Mutex<Vec<String>>,
    }

    impl ScriptedDownloader {
        fn serve(mut self, url: &str, body: &str) -> Self {
            self.responses.insert(url.to_string(), Ok(body.to_string()));
            self
        }

        fn fail(mut self, url: &str, error: OrreryError) -> Self {
            self.responses.insert(url.to_string(), Err(error));
            self
        }
    }

    #[async_trait]
    impl UrlDownloader for Arc<ScriptedDownloader> {
        async fn download(&self, url: &str, final_path: &Path, _sha256: &str) -> Result<PathBuf> {
            self.attempts.lock().unwrap().push(url.to_string());
            match self.responses.get(url) {
                Some(Ok(body)) => {
                    fs::write(final_path, body)?;
                    Ok(final_path.to_path_buf())
                }
                Some(Err(e)) => Err(e.clone()),
                None => Err(OrreryError::DownloadFailed(
                    "test".to_string(),
                    url.to_string(),
                    "Resource not found (404)".to_string(),
                )),
            }
        }
    }

    fn fetcher_with(
        config: &Config,
        downloader: ScriptedDownloader,
    ) -> (HttpFetcher, Arc<ScriptedDownloader>) {
        let downloader = Arc::new(downloader);
        (
            HttpFetcher::with_downloader(config, downloader.clone()),
            downloader,
        )
    }

    fn attempts(downloader: &ScriptedDownloader) -> Vec<String> {
        downloader.attempts.lock().unwrap().clone()
    }

    const PRIMARY: &str = "https://github.com/indilib/indi/archive/v2.0.6.tar.gz";
    const MIRROR: &str = "https://mirror.example.org/indi/v2.0.6.tar.gz";

    #[tokio::test]
    async fn reuses_cached_file_with_matching_checksum() {
        let root = tempfile::tempdir().unwrap();
        let config = Config::with_root(root.path());
        let (fetcher, downloader) = fetcher_with(&config, ScriptedDownloader::default());
        let cached = fetcher.cache_path_for("indi-lib", PRIMARY);
        fs::create_dir_all(cached.parent().unwrap()).unwrap();
        fs::write(&cached, "orrery source archive\n").unwrap();

        let path = fetcher
            .fetch(FetchRequest {
                name: "indi-lib",
                url: PRIMARY,
                sha256: ARCHIVE_SHA,
                mirrors: &[],
            })
            .await
            .unwrap();
        assert_eq!(path, cached);
        assert!(attempts(&downloader).is_empty());
    }

    #[tokio::test]
    async fn stale_cache_entry_is_discarded_and_redownloaded() {
        let root = tempfile::tempdir().unwrap();
        let config = Config::with_root(root.path());
        let (fetcher, downloader) = fetcher_with(
            &config,
            ScriptedDownloader::default().serve(PRIMARY, "orrery source archive\n"),
        );
        let cached = fetcher.cache_path_for("indi-lib", PRIMARY);
        fs::create_dir_all(cached.parent().unwrap()).unwrap();
        fs::write(&cached, "tampered").unwrap();

        fetcher
            .fetch(FetchRequest {
                name: "indi-lib",
                url: PRIMARY,
                sha256: ARCHIVE_SHA,
                mirrors: &[],
            })
            .await
            .unwrap();
        assert_eq!(attempts(&downloader), vec![PRIMARY]);
        assert_eq!(fs::read_to_string(&cached).unwrap(), "orrery source archive\n");
    }

    #[tokio::test]
    async fn failing_primary_falls_through_to_mirror() {
        let root = tempfile::tempdir().unwrap();
        let config = Config::with_root(root.path());
        let (fetcher, downloader) = fetcher_with(
            &config,
            ScriptedDownloader::default().serve(MIRROR, "orrery source archive\n"),
        );
        let mirrors = vec![MIRROR.to_string()];

        let path = fetcher
            .fetch(FetchRequest {
                name: "indi-lib",
                url: PRIMARY,
                sha256: ARCHIVE_SHA,
                mirrors: &mirrors,
            })
            .await
            .unwrap();
        assert_eq!(attempts(&downloader), vec![PRIMARY, MIRROR]);
        assert_eq!(path, fetcher.cache_path_for("indi-lib", PRIMARY));
    }

    #[tokio::test]
    async fn invalid_url_is_skipped_for_next_mirror() {
        let root = tempfile::tempdir().unwrap();
        let config = Config::with_root(root.path());
        let insecure = "http://invalid.example/indi-2.0.6.tar.gz";
        let (fetcher, downloader) = fetcher_with(
            &config,
            ScriptedDownloader::default().serve(MIRROR, "orrery source archive\n"),
        );
        let mirrors = vec![MIRROR.to_string()];

        fetcher
            .fetch(FetchRequest {
                name: "indi-lib",
                url: insecure,
                sha256: ARCHIVE_SHA,
                mirrors: &mirrors,
            })
            .await
            .unwrap();
        assert_eq!(attempts(&downloader), vec![MIRROR]);
    }

    #[tokio::test]
    async fn only_invalid_urls_report_download_failure() {
        let root = tempfile::tempdir().unwrap();
        let config = Config::with_root(root.path());
        let (fetcher, downloader) = fetcher_with(&config, ScriptedDownloader::default());

        let err = fetcher
            .fetch(FetchRequest {
                name: "kstars",
                url: "http://invalid.example/kstars-3.7.9.tar.xz",
                sha256: ARCHIVE_SHA,
                mirrors: &[],
            })
            .await
            .unwrap_err();
        match err {
            OrreryError::DownloadFailed(name, _, reason) => {
                assert_eq!(name, "kstars");
                assert!(reason.contains("Must be https"), "{reason}");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(attempts(&downloader).is_empty());
    }

    #[tokio::test]
    async fn checksum_mismatch_does_not_try_mirrors() {
        let root = tempfile::tempdir().unwrap();
        let config = Config::with_root(root.path());
        let mismatch = OrreryError::ChecksumMismatch {
            path: "indi-lib--v2.0.6.tar.gz".to_string(),
            expected: ARCHIVE_SHA.to_string(),
            actual: "0".repeat(64),
        };
        let (fetcher, downloader) = fetcher_with(
            &config,
            ScriptedDownloader::default()
                .fail(PRIMARY, mismatch)
                .serve(MIRROR, "orrery source archive\n"),
        );
        let mirrors = vec![MIRROR.to_string()];

        let err = fetcher
            .fetch(FetchRequest {
                name: "indi-lib",
                url: PRIMARY,
                sha256: ARCHIVE_SHA,
                mirrors: &mirrors,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, OrreryError::ChecksumMismatch { .. }));
        assert_eq!(attempts(&downloader), vec![PRIMARY]);
    }

    #[test]
    fn cache_names_are_prefixed_with_formula() {
        let config = Config::with_root("/r");
        let fetcher = HttpFetcher::new(&config).unwrap();
        assert_eq!(
            fetcher.cache_path_for(
                "indi-lib",
                "https://github.com/indilib/indi/archive/refs/tags/v2.0.6.tar.gz"
            ),
            PathBuf::from("/r/orrery_cache/indi-lib--v2.0.6.tar.gz")
        );
    }
}
