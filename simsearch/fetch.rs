use crate::error::FetchError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Default upper bound on a single fetch
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Source of image bytes for corpus URLs
pub trait ImageFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

impl<F: ImageFetcher + ?Sized> ImageFetcher for Arc<F> {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        (**self).fetch(url)
    }
}

/// Percent-encode spaces and non-ASCII characters of absolute URLs.
/// Plain filesystem paths are returned trimmed but otherwise untouched.
pub fn normalize_url(raw: &str) -> Result<String, FetchError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(FetchError::InvalidUrl {
            url: raw.to_string(),
            reason: "empty URL".into(),
        });
    }
    match Url::parse(trimmed) {
        // single-letter schemes are drive letters
        Ok(url) if url.scheme().len() == 1 => Ok(trimmed.to_string()),
        Ok(url) => Ok(url.to_string()),
        Err(url::ParseError::RelativeUrlWithoutBase) => Ok(trimmed.to_string()),
        Err(e) => Err(FetchError::InvalidUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Reads local files given as paths or `file://` URLs
#[derive(Debug, Clone, Default)]
pub struct FileFetcher {
    root: Option<PathBuf>,
}

impl FileFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative paths against `root`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: Some(root.into()) }
    }

    fn resolve(&self, url: &str) -> Result<PathBuf, FetchError> {
        let path = if url.starts_with("file:") {
            Url::parse(url)
                .ok()
                .and_then(|u| u.to_file_path().ok())
                .ok_or_else(|| FetchError::InvalidUrl {
                    url: url.to_string(),
                    reason: "not a local file URL".into(),
                })?
        } else {
            PathBuf::from(url)
        };
        Ok(match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path,
        })
    }
}

impl ImageFetcher for FileFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let path = self.resolve(url)?;
        std::fs::read(&path).map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => FetchError::NotFound(path.display().to_string()),
            _ => FetchError::Io {
                url: url.to_string(),
                source,
            },
        })
    }
}

/// Blocking HTTP(S) downloads
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

#[cfg(feature = "http")]
impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("simsearch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Transport {
                url: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

#[cfg(feature = "http")]
impl ImageFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let transport = |e: reqwest::Error| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                    timeout: Duration::ZERO,
                }
            } else {
                FetchError::Transport {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            }
        };

        let response = self.client.get(url).send().map_err(transport)?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(FetchError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.bytes().map_err(transport)?.to_vec())
    }
}

/// In-process image store keyed by normalised URL
#[derive(Debug, Clone, Default)]
pub struct MemoryFetcher {
    images: HashMap<String, Vec<u8>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, url: &str, bytes: Vec<u8>) {
        let key = normalize_url(url).unwrap_or_else(|_| url.to_string());
        self.images.insert(key, bytes);
    }

    pub fn with(mut self, url: &str, bytes: Vec<u8>) -> Self {
        self.insert(url, bytes);
        self
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

impl ImageFetcher for MemoryFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.images
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(url.to_string()))
    }
}

/// Dispatches by URL scheme: `http`/`https` downloads, paths and `file:` read from disk
#[derive(Debug, Clone)]
pub struct UrlFetcher {
    files: FileFetcher,
    #[cfg(feature = "http")]
    http: HttpFetcher,
}

impl UrlFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        #[cfg(not(feature = "http"))]
        let _ = timeout;
        Ok(Self {
            files: FileFetcher::new(),
            #[cfg(feature = "http")]
            http: HttpFetcher::new(timeout)?,
        })
    }

    pub fn with_file_root(mut self, root: impl AsRef<Path>) -> Self {
        self.files = FileFetcher::with_root(root.as_ref());
        self
    }
}

impl ImageFetcher for UrlFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let scheme = Url::parse(url).ok().map(|u| u.scheme().to_string());
        match scheme.as_deref() {
            #[cfg(feature = "http")]
            Some("http") | Some("https") => self.http.fetch(url),
            #[cfg(not(feature = "http"))]
            Some("http") | Some("https") => Err(FetchError::InvalidUrl {
                url: url.to_string(),
                reason: "built without HTTP support".into(),
            }),
            Some("file") | None => self.files.fetch(url),
            Some(s) if s.len() == 1 => self.files.fetch(url),
            Some(other) => Err(FetchError::InvalidUrl {
                url: url.to_string(),
                reason: format!("unsupported scheme {other}"),
            }),
        }
    }
}

/// Bounds every fetch of the wrapped fetcher by a deadline.
/// A fetch that misses the deadline keeps running on its own thread; its result is dropped.
#[derive(Clone)]
pub struct DeadlineFetcher {
    inner: Arc<dyn ImageFetcher>,
    timeout: Duration,
}

impl DeadlineFetcher {
    pub fn new(inner: Arc<dyn ImageFetcher>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl std::fmt::Debug for DeadlineFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeadlineFetcher").field("timeout", &self.timeout).finish()
    }
}

impl ImageFetcher for DeadlineFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let (tx, rx) = mpsc::channel();
        let inner = Arc::clone(&self.inner);
        let owned = url.to_string();
        std::thread::Builder::new()
            .name("simsearch-fetch".into())
            .spawn(move || {
                let _ = tx.send(inner.fetch(&owned));
            })
            .map_err(|source| FetchError::Io {
                url: url.to_string(),
                source,
            })?;

        match rx.recv_timeout(self.timeout) {
            Ok(Err(FetchError::Timeout { url, .. })) => Err(FetchError::Timeout {
                url,
                timeout: self.timeout,
            }),
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                tracing::warn!(url, timeout = ?self.timeout, "fetch deadline exceeded");
                Err(FetchError::Timeout {
                    url: url.to_string(),
                    timeout: self.timeout,
                })
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(FetchError::Transport {
                url: url.to_string(),
                message: "fetch worker exited without a result".into(),
            }),
        }
    }
}
