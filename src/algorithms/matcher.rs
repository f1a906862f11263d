use ndarray::{ArrayView1, ArrayView2};
use rayon::prelude::*;
use tracing::debug;

use crate::config::MatcherConfig;
use crate::pipeline::Correspondence;

/// Brute-force two-nearest-neighbour matcher with Lowe's ratio test.
#[derive(Debug, Clone)]
pub struct RatioTestMatcher {
    ratio_threshold: f32,
}

impl Default for RatioTestMatcher {
    fn default() -> Self {
        Self::new(MatcherConfig::default())
    }
}

impl RatioTestMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self {
            ratio_threshold: config.ratio_threshold,
        }
    }

    pub fn ratio_threshold(&self) -> f32 {
        self.ratio_threshold
    }

    /// For every reference descriptor, find its two nearest target
    /// descriptors and keep the pair when `d1 < ratio * d2`.
    ///
    /// Output follows reference order. Ties in distance resolve to the lower
    /// target index. Fewer than two descriptors on either side yields no
    /// matches, as no second neighbour exists.
    pub fn match_descriptors(
        &self,
        reference: ArrayView2<'_, f32>,
        target: ArrayView2<'_, f32>,
    ) -> Vec<Correspondence> {
        if reference.nrows() < 2 || target.nrows() < 2 {
            debug!(
                reference = reference.nrows(),
                target = target.nrows(),
                "Not enough descriptors for a ratio test"
            );
            return Vec::new();
        }

        let ratio_sq = self.ratio_threshold * self.ratio_threshold;
        let matches: Vec<Correspondence> = (0..reference.nrows())
            .into_par_iter()
            .filter_map(|reference_index| {
                let (target_index, best, second) = two_nearest(reference.row(reference_index), target);
                // Squared distances: d1 < r * d2  <=>  d1^2 < r^2 * d2^2.
                (best < ratio_sq * second).then(|| Correspondence {
                    reference_index,
                    target_index,
                    distance: best.sqrt(),
                })
            })
            .collect();

        debug!(
            reference = reference.nrows(),
            target = target.nrows(),
            good_matches = matches.len(),
            "Ratio test completed"
        );
        matches
    }
}

/// Index of the nearest row plus the squared distances to the nearest and
/// second nearest rows.
fn two_nearest(query: ArrayView1<'_, f32>, train: ArrayView2<'_, f32>) -> (usize, f32, f32) {
    let mut best_index = 0;
    let mut best = f32::INFINITY;
    let mut second = f32::INFINITY;

    for (index, row) in train.rows().into_iter().enumerate() {
        let distance = squared_distance(query, row);
        if distance < best {
            second = best;
            best = distance;
            best_index = index;
        } else if distance < second {
            second = distance;
        }
    }

    (best_index, best, second)
}

fn squared_distance(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_two_nearest_ties_prefer_lower_index() {
        let train = array![[1.0f32, 0.0], [1.0, 0.0], [5.0, 5.0]];
        let query = array![1.0f32, 0.0];
        let (index, best, second) = two_nearest(query.view(), train.view());
        assert_eq!(index, 0);
        assert_eq!(best, 0.0);
        assert_eq!(second, 0.0);
    }

    #[test]
    fn test_ambiguous_match_rejected() {
        let reference = array![[0.0f32, 0.0], [10.0, 10.0]];
        let target = array![[1.0f32, 0.0], [0.0, 1.0], [10.0, 10.5]];
        let matches = RatioTestMatcher::default().match_descriptors(reference.view(), target.view());

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].reference_index, 1);
        assert_eq!(matches[0].target_index, 2);
        assert!((matches[0].distance - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_single_descriptor_yields_nothing() {
        let reference = array![[0.0f32, 0.0], [1.0, 1.0]];
        let target = array![[0.0f32, 0.0]];
        let matcher = RatioTestMatcher::default();
        assert!(matcher.match_descriptors(reference.view(), target.view()).is_empty());
        assert!(matcher.match_descriptors(target.view(), reference.view()).is_empty());
    }
}
