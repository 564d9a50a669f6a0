//! Descriptor matching for similarity scoring: a randomized k-d forest for
//! approximate two-nearest-neighbour search, an exact reference matcher and
//! the ratio-test scorer.

pub mod error;
pub mod kdtree;
pub mod matcher;
pub mod scorer;

pub use error::{MatchError, MatchResult};
pub use kdtree::{DescriptorIndex, IndexParams};
pub use matcher::{BruteForceMatcher, DescriptorMatcher, KdForestMatcher};
pub use scorer::{RatioScorer, RATIO_THRESHOLD};

use simsearch_core::{DescriptorSet, MatchPair};

/// Match `query` against `candidate` and keep the confident pairs
pub fn confident_matches(
    query: &DescriptorSet,
    candidate: &DescriptorSet,
    matcher: &dyn DescriptorMatcher,
    scorer: &RatioScorer,
) -> MatchResult<Vec<MatchPair>> {
    if query.is_empty() || candidate.is_empty() {
        return Ok(Vec::new());
    }
    let pairs = matcher.knn_match(query.descriptors(), candidate.descriptors())?;
    tracing::trace!(
        matcher = matcher.name(),
        pairs = pairs.len(),
        "matched descriptor sets"
    );
    Ok(scorer.confident(&pairs))
}
