use crate::error::MatchResult;
use crate::kdtree::{squared_distance, DescriptorIndex, IndexParams};
use rayon::prelude::*;
use simsearch_core::{Descriptor, MatchPair};

/// Two-nearest-neighbour matching of query descriptors against a candidate set
pub trait DescriptorMatcher: Send + Sync {
    /// One pair per query descriptor that has at least two candidates, in query order
    fn knn_match(&self, query: &[Descriptor], candidates: &[Descriptor]) -> MatchResult<Vec<MatchPair>>;

    fn name(&self) -> &'static str;
}

/// Approximate matching through a randomized k-d forest built over the candidates
#[derive(Debug, Clone, Default)]
pub struct KdForestMatcher {
    params: IndexParams,
}

impl KdForestMatcher {
    pub fn new(params: IndexParams) -> MatchResult<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &IndexParams {
        &self.params
    }

    /// Match against an index built earlier
    pub fn match_index(query: &[Descriptor], index: &DescriptorIndex) -> Vec<MatchPair> {
        query
            .par_iter()
            .enumerate()
            .filter_map(|(query_index, q)| {
                let [(candidate_index, distance), (_, second_distance)] = index.knn2(q)?;
                Some(MatchPair {
                    query_index,
                    candidate_index,
                    distance,
                    second_distance,
                })
            })
            .collect()
    }
}

impl DescriptorMatcher for KdForestMatcher {
    fn knn_match(&self, query: &[Descriptor], candidates: &[Descriptor]) -> MatchResult<Vec<MatchPair>> {
        if query.is_empty() || candidates.len() < 2 {
            return Ok(Vec::new());
        }
        let index = DescriptorIndex::build(candidates, &self.params)?;
        Ok(Self::match_index(query, &index))
    }

    fn name(&self) -> &'static str {
        "kd-forest"
    }
}

/// Exhaustive matching
#[derive(Debug, Clone, Copy, Default)]
pub struct BruteForceMatcher;

impl DescriptorMatcher for BruteForceMatcher {
    fn knn_match(&self, query: &[Descriptor], candidates: &[Descriptor]) -> MatchResult<Vec<MatchPair>> {
        if candidates.len() < 2 {
            return Ok(Vec::new());
        }
        let pairs = query
            .par_iter()
            .enumerate()
            .map(|(query_index, q)| {
                let (mut best, mut second) = ((0, f32::INFINITY), (0, f32::INFINITY));
                for (i, c) in candidates.iter().enumerate() {
                    let d = squared_distance(q, c);
                    if d < best.1 {
                        second = best;
                        best = (i, d);
                    } else if d < second.1 {
                        second = (i, d);
                    }
                }
                MatchPair {
                    query_index,
                    candidate_index: best.0,
                    distance: best.1.sqrt(),
                    second_distance: second.1.sqrt(),
                }
            })
            .collect();
        Ok(pairs)
    }

    fn name(&self) -> &'static str {
        "brute-force"
    }
}
