//! Visual similarity search over a reference image corpus.
//!
//! A query image is bounded in size, described with scale- and
//! rotation-invariant local features and compared against every corpus
//! entry on a bounded worker pool. The entry with the most confident
//! descriptor matches wins.

pub mod annotate;
pub mod config;
pub mod coordinator;
pub mod corpus;
pub mod error;
pub mod fetch;

pub use config::{EngineConfig, FailurePolicy, SearchConfig};
pub use coordinator::{BestMatch, CorpusSearch, CorpusSearchBuilder, SearchOutcome, SearchReport};
pub use corpus::{CorpusProvider, DirectoryCorpus, Manifest, ManifestCorpus, MergeReport};
pub use error::{ConfigError, CorpusError, FetchError, SearchError, SearchResult};
pub use fetch::{normalize_url, DeadlineFetcher, FileFetcher, ImageFetcher, MemoryFetcher, UrlFetcher};

#[cfg(feature = "http")]
pub use fetch::HttpFetcher;

pub use simsearch_core::{self, CorpusEntry, DescriptorSet, Keypoint, RasterImage, ScoredCandidate};
pub use simsearch_features::{self, ExtractorConfig, ImagePreprocessing, SiftExtractor};
pub use simsearch_match::{self, IndexParams, RatioScorer};
