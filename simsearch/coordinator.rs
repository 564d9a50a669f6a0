use crate::config::{EngineConfig, FailurePolicy, SearchConfig};
use crate::error::{ConfigError, SearchError, SearchResult};
use crate::fetch::{normalize_url, DeadlineFetcher, ImageFetcher, UrlFetcher};
use rayon::prelude::*;
use simsearch_core::{
    build_thread_pool, CorpusEntry, DescriptorSet, Keypoint, MatchPair, RasterImage, ScoredCandidate, NO_SIMILARITY,
};
use simsearch_features::{ExtractorConfig, ImagePreprocessing, SiftExtractor};
use simsearch_match::{confident_matches, DescriptorMatcher, IndexParams, KdForestMatcher, RatioScorer};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, info_span, warn};

/// Winning corpus entry with the evidence for it
#[derive(Debug, Clone)]
pub struct BestMatch {
    pub candidate: ScoredCandidate,
    /// Confident matches; `query_index` refers to the query's descriptor set
    pub matches: Vec<MatchPair>,
    /// Query keypoints of the confident matches, in match order
    pub query_keypoints: Vec<Keypoint>,
}

impl BestMatch {
    pub fn entry(&self) -> &CorpusEntry {
        &self.candidate.entry
    }

    pub fn score(&self) -> usize {
        self.candidate.score
    }
}

#[derive(Debug, Clone)]
pub enum SearchOutcome {
    Found(BestMatch),
    NoMatchFound,
}

impl SearchOutcome {
    pub fn best(&self) -> Option<&BestMatch> {
        match self {
            SearchOutcome::Found(best) => Some(best),
            SearchOutcome::NoMatchFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, SearchOutcome::Found(_))
    }
}

/// Scores of a whole corpus and the selected outcome
#[derive(Debug, Clone)]
pub struct SearchReport {
    /// Query as searched, after bounding to `max_dimension`
    pub query: RasterImage,
    /// Every evaluated entry in corpus order
    pub candidates: Vec<ScoredCandidate>,
    pub outcome: SearchOutcome,
}

/// Per-entry result before selection
#[derive(Debug)]
struct Evaluated {
    candidate: ScoredCandidate,
    matches: Vec<MatchPair>,
}

/// Builder for creating a `CorpusSearch`
#[derive(Default)]
pub struct CorpusSearchBuilder {
    config: SearchConfig,
    extractor: ExtractorConfig,
    index: IndexParams,
    ratio: Option<f32>,
    fetcher: Option<Arc<dyn ImageFetcher>>,
    matcher: Option<Arc<dyn DescriptorMatcher>>,
}

impl CorpusSearchBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_engine_config(cfg: &EngineConfig) -> Self {
        Self {
            config: cfg.search.clone(),
            extractor: cfg.extractor.clone(),
            index: cfg.index.clone(),
            ratio: Some(cfg.ratio),
            ..Self::default()
        }
    }

    pub fn config(mut self, config: SearchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn max_dimension(mut self, max_dimension: u32) -> Self {
        self.config.max_dimension = max_dimension;
        self
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.config.threads = Some(threads);
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.failure_policy = policy;
        self
    }

    pub fn extractor(mut self, extractor: ExtractorConfig) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn index_params(mut self, index: IndexParams) -> Self {
        self.index = index;
        self
    }

    pub fn ratio(mut self, ratio: f32) -> Self {
        self.ratio = Some(ratio);
        self
    }

    /// Source of corpus images; wrapped in the configured fetch deadline
    pub fn fetcher(mut self, fetcher: Arc<dyn ImageFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Replaces the default k-d forest matcher
    pub fn matcher(mut self, matcher: Arc<dyn DescriptorMatcher>) -> Self {
        self.matcher = Some(matcher);
        self
    }

    pub fn build(self) -> SearchResult<CorpusSearch> {
        self.config.validate()?;
        let invalid = |e: &dyn std::fmt::Display| SearchError::Config(ConfigError::Invalid(e.to_string()));

        let ratio = self.ratio.unwrap_or(simsearch_match::RATIO_THRESHOLD);
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(invalid(&format!("ratio {ratio} must be in (0, 1]")));
        }
        let extractor = SiftExtractor::new(self.extractor).map_err(|e| invalid(&e))?;
        let matcher = match self.matcher {
            Some(m) => m,
            None => Arc::new(KdForestMatcher::new(self.index).map_err(|e| invalid(&e))?),
        };
        let timeout = self.config.fetch_timeout();
        let inner: Arc<dyn ImageFetcher> = match self.fetcher {
            Some(f) => f,
            None => Arc::new(UrlFetcher::new(timeout).map_err(|e| invalid(&e))?),
        };
        let pool = build_thread_pool(self.config.thread_count())?;

        Ok(CorpusSearch {
            fetcher: Arc::new(DeadlineFetcher::new(inner, timeout)),
            config: self.config,
            extractor,
            matcher,
            scorer: RatioScorer::new(ratio),
            pool,
        })
    }
}

/// Fans a query out over a corpus on a bounded worker pool and picks the best entry
pub struct CorpusSearch {
    config: SearchConfig,
    extractor: SiftExtractor,
    matcher: Arc<dyn DescriptorMatcher>,
    scorer: RatioScorer,
    fetcher: Arc<dyn ImageFetcher>,
    pool: rayon::ThreadPool,
}

impl CorpusSearch {
    pub fn builder() -> CorpusSearchBuilder {
        CorpusSearchBuilder::new()
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn extractor(&self) -> &SiftExtractor {
        &self.extractor
    }

    /// Bound the query to `max_dimension` and extract its features once
    pub fn prepare_query(&self, query: &RasterImage) -> SearchResult<(RasterImage, DescriptorSet)> {
        let resized = ImagePreprocessing::resize(query, self.config.max_dimension).map_err(|source| {
            SearchError::Extraction {
                subject: "query".into(),
                source,
            }
        })?;
        let features = self.extractor.extract(&resized).map_err(|source| SearchError::Extraction {
            subject: "query".into(),
            source,
        })?;
        Ok((resized, features))
    }

    /// Score of every entry, in corpus order
    pub fn score_all(&self, query: &RasterImage, corpus: &[CorpusEntry]) -> SearchResult<Vec<ScoredCandidate>> {
        let (_, features) = self.prepare_query(query)?;
        Ok(self
            .evaluate_all(&features, corpus)?
            .into_iter()
            .map(|e| e.candidate)
            .collect())
    }

    /// Most similar entry, or `NoMatchFound` when nothing scores above zero
    pub fn find_best(&self, query: &RasterImage, corpus: &[CorpusEntry]) -> SearchResult<SearchOutcome> {
        Ok(self.search(query, corpus)?.outcome)
    }

    /// Every entry's score together with the selected outcome
    pub fn search(&self, query: &RasterImage, corpus: &[CorpusEntry]) -> SearchResult<SearchReport> {
        let span = info_span!("find_best", entries = corpus.len());
        let _guard = span.enter();

        let (prepared, features) = self.prepare_query(query)?;
        let evaluated = self.evaluate_all(&features, corpus)?;
        let candidates: Vec<ScoredCandidate> = evaluated.iter().map(|e| e.candidate.clone()).collect();

        let winner = Self::select_best(&candidates)
            .map(|best| best.position)
            .and_then(|position| evaluated.into_iter().find(|e| e.candidate.position == position));
        let Some(winner) = winner else {
            info!("no corpus entry shares confident matches with the query");
            return Ok(SearchReport {
                query: prepared,
                candidates,
                outcome: SearchOutcome::NoMatchFound,
            });
        };

        let query_keypoints = winner
            .matches
            .iter()
            .map(|m| features.keypoints()[m.query_index])
            .collect();
        info!(
            id = winner.candidate.entry.id,
            score = winner.candidate.score,
            "best match"
        );
        Ok(SearchReport {
            query: prepared,
            candidates,
            outcome: SearchOutcome::Found(BestMatch {
                candidate: winner.candidate,
                matches: winner.matches,
                query_keypoints,
            }),
        })
    }

    /// Decode the query bytes, then [`find_best`](Self::find_best)
    pub fn find_best_bytes(&self, query: &[u8], corpus: &[CorpusEntry]) -> SearchResult<SearchOutcome> {
        let raster = ImagePreprocessing::decode(query).map_err(SearchError::QueryDecode)?;
        self.find_best(&raster, corpus)
    }

    /// Strictly greatest score above `NO_SIMILARITY`; ties keep the earliest candidate
    pub fn select_best(candidates: &[ScoredCandidate]) -> Option<&ScoredCandidate> {
        let mut best: Option<&ScoredCandidate> = None;
        for c in candidates {
            if c.score > best.map_or(NO_SIMILARITY, |b| b.score) {
                best = Some(c);
            }
        }
        best
    }

    /// Evaluate every entry on the pool; returns only after all tasks finished
    fn evaluate_all(&self, query: &DescriptorSet, corpus: &[CorpusEntry]) -> SearchResult<Vec<Evaluated>> {
        let policy = self.config.failure_policy;
        // Earliest failed position; only entries after it may be skipped
        let first_failure = AtomicUsize::new(usize::MAX);
        let results: Vec<Option<SearchResult<Evaluated>>> = self.pool.install(|| {
            corpus
                .par_iter()
                .enumerate()
                .map(|(position, entry)| {
                    if policy == FailurePolicy::FailFast && position > first_failure.load(Ordering::Relaxed) {
                        return None;
                    }
                    let result = self.evaluate_entry(position, entry, query);
                    if result.is_err() && policy == FailurePolicy::FailFast {
                        first_failure.fetch_min(position, Ordering::Relaxed);
                    }
                    Some(result)
                })
                .collect()
        });

        let mut evaluated = Vec::with_capacity(results.len());
        for result in results.into_iter().flatten() {
            match result {
                Ok(e) => evaluated.push(e),
                Err(err) if policy == FailurePolicy::FailFast => return Err(err),
                Err(err) => warn!(error = %err, "skipping corpus entry"),
            }
        }
        Ok(evaluated)
    }

    /// Fetch, decode, extract, match and score one entry
    fn evaluate_entry(&self, position: usize, entry: &CorpusEntry, query: &DescriptorSet) -> SearchResult<Evaluated> {
        let fetch_err = |source| SearchError::Fetch {
            id: entry.id,
            url: entry.image_url.clone(),
            source,
        };
        let url = normalize_url(&entry.image_url).map_err(fetch_err)?;
        let bytes = self.fetcher.fetch(&url).map_err(fetch_err)?;

        let decoded = ImagePreprocessing::decode(&bytes).map_err(|source| SearchError::Decode {
            id: entry.id,
            url: entry.image_url.clone(),
            source,
        })?;
        let extraction_err = |source| SearchError::Extraction {
            subject: format!("corpus entry {}", entry.id),
            source,
        };
        let raster = if self.config.resize_corpus {
            ImagePreprocessing::resize(&decoded, self.config.max_dimension).map_err(extraction_err)?
        } else {
            decoded
        };
        let features = self.extractor.extract(&raster).map_err(extraction_err)?;

        let matches = confident_matches(query, &features, self.matcher.as_ref(), &self.scorer)
            .map_err(|source| SearchError::Matching { id: entry.id, source })?;
        debug!(
            id = entry.id,
            keypoints = features.len(),
            score = matches.len(),
            "scored corpus entry"
        );

        Ok(Evaluated {
            candidate: ScoredCandidate {
                position,
                entry: entry.clone(),
                score: matches.len(),
            },
            matches,
        })
    }
}

impl std::fmt::Debug for CorpusSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorpusSearch")
            .field("config", &self.config)
            .field("matcher", &self.matcher.name())
            .field("scorer", &self.scorer)
            .field("threads", &self.pool.current_num_threads())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(position: usize, score: usize) -> ScoredCandidate {
        ScoredCandidate {
            position,
            entry: CorpusEntry::new(position as u64 + 1, format!("e{position}"), format!("mem://{position}")),
            score,
        }
    }

    #[test]
    fn test_select_best_strictly_greatest() {
        let c = vec![candidate(0, 3), candidate(1, 9), candidate(2, 4)];
        assert_eq!(CorpusSearch::select_best(&c).map(|b| b.position), Some(1));
    }

    #[test]
    fn test_select_best_tie_keeps_first() {
        let c = vec![candidate(0, 2), candidate(1, 7), candidate(2, 7)];
        assert_eq!(CorpusSearch::select_best(&c).map(|b| b.position), Some(1));
    }

    #[test]
    fn test_select_best_requires_positive_score() {
        assert!(CorpusSearch::select_best(&[]).is_none());
        assert!(CorpusSearch::select_best(&[candidate(0, 0), candidate(1, 0)]).is_none());
    }

    #[test]
    fn test_builder_validates() {
        assert!(CorpusSearch::builder().threads(2).build().is_ok());
        assert!(matches!(
            CorpusSearch::builder().max_dimension(0).build(),
            Err(SearchError::Config(_))
        ));
        assert!(matches!(CorpusSearch::builder().ratio(1.5).build(), Err(SearchError::Config(_))));
        let bad = ExtractorConfig { border: 0, ..Default::default() };
        assert!(matches!(
            CorpusSearch::builder().extractor(bad).build(),
            Err(SearchError::Config(_))
        ));
    }
}
