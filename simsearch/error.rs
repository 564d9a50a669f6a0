use simsearch_features::FeatureError;
use simsearch_match::MatchError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failure to obtain the bytes behind an image URL
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no image at {0}")]
    NotFound(String),
    #[error("failed to read {url}: {source}")]
    Io {
        url: String,
        #[source]
        source: std::io::Error,
    },
    #[error("HTTP status {status} fetching {url}")]
    Http { url: String, status: u16 },
    #[error("transport error fetching {url}: {message}")]
    Transport { url: String, message: String },
    #[error("fetching {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },
    #[error("invalid image URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed manifest {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("duplicate corpus id {0}")]
    DuplicateId(u64),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed configuration: {0}")]
    Parse(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors that abort a search
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("corpus entry {id} ({url}) could not be fetched")]
    Fetch {
        id: u64,
        url: String,
        #[source]
        source: FetchError,
    },
    #[error("corpus entry {id} ({url}) is not a decodable image")]
    Decode {
        id: u64,
        url: String,
        #[source]
        source: FeatureError,
    },
    #[error("feature extraction failed for {subject}")]
    Extraction {
        subject: String,
        #[source]
        source: FeatureError,
    },
    #[error("matching failed for corpus entry {id}")]
    Matching {
        id: u64,
        #[source]
        source: MatchError,
    },
    #[error("query is not a decodable image")]
    QueryDecode(#[source] FeatureError),
    #[error(transparent)]
    Corpus(#[from] CorpusError),
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SearchError {
    /// Corpus id of the failing entry, when the failure belongs to one
    pub fn entry_id(&self) -> Option<u64> {
        match self {
            SearchError::Fetch { id, .. } | SearchError::Decode { id, .. } | SearchError::Matching { id, .. } => {
                Some(*id)
            }
            _ => None,
        }
    }
}

pub type SearchResult<T> = Result<T, SearchError>;
