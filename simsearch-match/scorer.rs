use simsearch_core::MatchPair;

/// Lowe ratio below which a nearest neighbour counts as confident
pub const RATIO_THRESHOLD: f32 = 0.7;

/// Counts match pairs that pass the ratio test
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatioScorer {
    ratio: f32,
}

impl Default for RatioScorer {
    fn default() -> Self {
        Self { ratio: RATIO_THRESHOLD }
    }
}

impl RatioScorer {
    pub fn new(ratio: f32) -> Self {
        Self { ratio }
    }

    pub fn ratio(&self) -> f32 {
        self.ratio
    }

    #[inline]
    pub fn is_confident(&self, pair: &MatchPair) -> bool {
        pair.distance < self.ratio * pair.second_distance
    }

    /// Number of confident pairs
    pub fn score(&self, pairs: &[MatchPair]) -> usize {
        pairs.iter().filter(|p| self.is_confident(p)).count()
    }

    /// The confident pairs, in input order
    pub fn confident(&self, pairs: &[MatchPair]) -> Vec<MatchPair> {
        pairs.iter().filter(|p| self.is_confident(p)).copied().collect()
    }
}
