//! Remote source download with conditional re-fetch
//!
//! The HTTP client sits behind the [`Downloader`] trait. [`RemoteFetcher`]
//! turns a response into a staged, hashed file: the body is streamed into a
//! temp file next to the staged path, hashed on the way, and renamed over
//! the staged path only once it is complete.

use crate::cache::hash::{ContentHash, HashingWriter};
use crate::error::{CacheError, CacheResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info};

pub const IF_MODIFIED_SINCE: &str = "If-Modified-Since";
pub const LAST_MODIFIED: &str = "Last-Modified";

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Status line, relevant headers and body of an HTTP GET
pub struct FetchResponse {
    pub status: u16,
    pub last_modified: Option<String>,
    pub body: Box<dyn Read + Send>,
}

impl std::fmt::Debug for FetchResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchResponse")
            .field("status", &self.status)
            .field("last_modified", &self.last_modified)
            .finish_non_exhaustive()
    }
}

/// HTTP GET capability
///
/// Non-2xx statuses are returned as responses, not errors; only transport
/// failures are errors.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn get(&self, url: &str, headers: &[(String, String)]) -> CacheResult<FetchResponse>;
}

/// Downloader backed by a ureq agent
pub struct HttpDownloader {
    agent: ureq::Agent,
}

impl HttpDownloader {
    pub fn new(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
        }
    }
}

impl Default for HttpDownloader {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn get(&self, url: &str, headers: &[(String, String)]) -> CacheResult<FetchResponse> {
        let agent = self.agent.clone();
        let url = url.to_string();
        let headers = headers.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut request = agent.get(&url);
            for (name, value) in &headers {
                request = request.header(name.as_str(), value.as_str());
            }

            let response = request
                .call()
                .map_err(|e| CacheError::download(&url, e))?;

            let status = response.status().as_u16();
            let last_modified = response
                .headers()
                .get(LAST_MODIFIED)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body: Box<dyn Read + Send> = Box::new(response.into_body().into_reader());

            Ok(FetchResponse {
                status,
                last_modified,
                body,
            })
        })
        .await
        .map_err(|e| CacheError::Internal(format!("download task failed: {}", e)))?
    }
}

/// A completed download, staged at `path`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFile {
    pub path: PathBuf,
    pub hash: ContentHash,
    pub size: u64,
    pub last_modified: Option<String>,
}

impl FetchedFile {
    /// Last-Modified as a timestamp, when the server sent a parseable one
    pub fn modified(&self) -> Option<DateTime<Utc>> {
        self.last_modified.as_deref().and_then(parse_http_date)
    }
}

/// Outcome of a (possibly conditional) fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// 304: the staged file is still current and was not touched
    NotModified,
    /// 2xx: the staged file was replaced
    Fetched(FetchedFile),
}

/// Parse an HTTP date (`Wed, 21 Oct 2015 07:28:00 GMT`)
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Downloads remote origins into their staged location
#[derive(Clone)]
pub struct RemoteFetcher {
    downloader: Arc<dyn Downloader>,
}

impl RemoteFetcher {
    pub fn new(downloader: Arc<dyn Downloader>) -> Self {
        Self { downloader }
    }

    /// Fetch `url` into `dest`
    ///
    /// With `if_modified_since` set the request is conditional and a 304
    /// leaves `dest` untouched. Statuses >= 400 are errors and also leave
    /// `dest` untouched.
    pub async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        if_modified_since: Option<&str>,
    ) -> CacheResult<FetchOutcome> {
        let mut headers = vec![];
        if let Some(since) = if_modified_since {
            headers.push((IF_MODIFIED_SINCE.to_string(), since.to_string()));
        }

        match if_modified_since {
            Some(since) => debug!("Conditional GET {} (since {})", url, since),
            None => info!("Downloading {}", url),
        }
        let response = self.downloader.get(url, &headers).await?;

        match response.status {
            304 if if_modified_since.is_some() => {
                debug!("{} not modified", url);
                Ok(FetchOutcome::NotModified)
            }
            200..=299 => {
                let url = url.to_string();
                let dest = dest.to_path_buf();
                let fetched = tokio::task::spawn_blocking(move || {
                    write_staged(&url, &dest, response.body, response.last_modified)
                })
                .await
                .map_err(|e| CacheError::Internal(format!("staging task failed: {}", e)))??;

                info!(
                    "Fetched {} ({} bytes, {})",
                    fetched.path.display(),
                    fetched.size,
                    fetched.hash
                );
                Ok(FetchOutcome::Fetched(fetched))
            }
            status if status >= 400 => Err(CacheError::HttpStatus {
                url: url.to_string(),
                status,
            }),
            status => Err(CacheError::UnexpectedStatus {
                url: url.to_string(),
                status,
            }),
        }
    }
}

fn write_staged(
    url: &str,
    dest: &Path,
    mut body: Box<dyn Read + Send>,
    last_modified: Option<String>,
) -> CacheResult<FetchedFile> {
    let dir = dest
        .parent()
        .ok_or_else(|| CacheError::Internal(format!("{} has no parent", dest.display())))?;
    std::fs::create_dir_all(dir)
        .map_err(|e| CacheError::io(format!("creating directory {}", dir.display()), e))?;

    let tmp = tempfile::Builder::new()
        .prefix(".download")
        .tempfile_in(dir)
        .map_err(|e| CacheError::io(format!("creating temp file in {}", dir.display()), e))?;

    let mut writer = HashingWriter::new(tmp);
    io::copy(&mut body, &mut writer).map_err(|e| CacheError::download(url, e))?;
    let (tmp, hash, size) = writer.finish();

    tmp.as_file()
        .sync_all()
        .map_err(|e| CacheError::io(format!("syncing download of {}", url), e))?;
    if let Some(modified) = last_modified.as_deref().and_then(parse_http_date) {
        tmp.as_file()
            .set_modified(SystemTime::from(modified))
            .map_err(|e| CacheError::io(format!("setting mtime of download {}", url), e))?;
    }

    tmp.persist(dest)
        .map_err(|e| CacheError::io(format!("moving download into {}", dest.display()), e.error))?;

    Ok(FetchedFile {
        path: dest.to_path_buf(),
        hash,
        size,
        last_modified,
    })
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted downloader for tests

    use super::*;
    use std::collections::VecDeque;
    use std::io::Cursor;
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    pub struct Scripted {
        pub status: u16,
        pub last_modified: Option<String>,
        pub body: Vec<u8>,
    }

    impl Scripted {
        pub fn ok(body: &str, last_modified: Option<&str>) -> Self {
            Self {
                status: 200,
                last_modified: last_modified.map(str::to_string),
                body: body.as_bytes().to_vec(),
            }
        }

        pub fn status(status: u16) -> Self {
            Self {
                status,
                last_modified: None,
                body: vec![],
            }
        }
    }

    /// Replays queued responses and records request headers
    #[derive(Default)]
    pub struct ScriptedDownloader {
        responses: Mutex<VecDeque<Scripted>>,
        pub requests: Mutex<Vec<(String, Vec<(String, String)>)>>,
    }

    impl ScriptedDownloader {
        pub fn push(&self, response: Scripted) {
            self.responses.lock().unwrap().push_back(response);
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        /// If-Modified-Since of the most recent request
        pub fn last_condition(&self) -> Option<String> {
            let requests = self.requests.lock().unwrap();
            requests.last().and_then(|(_, headers)| {
                headers
                    .iter()
                    .find(|(name, _)| name == IF_MODIFIED_SINCE)
                    .map(|(_, value)| value.clone())
            })
        }
    }

    #[async_trait]
    impl Downloader for ScriptedDownloader {
        async fn get(&self, url: &str, headers: &[(String, String)]) -> CacheResult<FetchResponse> {
            self.requests
                .lock()
                .unwrap()
                .push((url.to_string(), headers.to_vec()));
            let scripted = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| CacheError::download(url, "no scripted response left"))?;
            Ok(FetchResponse {
                status: scripted.status,
                last_modified: scripted.last_modified,
                body: Box::new(Cursor::new(scripted.body)),
            })
        }
    }
}
