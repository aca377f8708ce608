//! Builder for configuring and constructing a [`QuadTree`].

use crate::error::{CityTilesError, Result};
use crate::qtree::{QuadTree, ScoreFn};
use crate::types::{DepthPolicy, IndexConfig, InsertPolicy, Place};

/// Builder for a [`QuadTree`].
///
/// The score function is mandatory: the index cannot rank residents
/// without one, so [`build`](Self::build) fails rather than guessing.
///
/// ```rust
/// use citytiles::{Place, QuadTree};
///
/// let tree = QuadTree::builder()
///     .capacity(25)
///     .min_depth(3)
///     .score_fn(|p: &Place| p.population as f64)
///     .build()?;
/// # assert!(tree.is_empty());
/// # Ok::<(), citytiles::CityTilesError>(())
/// ```
pub struct QuadTreeBuilder {
    config: IndexConfig,
    score_fn: Option<ScoreFn>,
}

impl QuadTreeBuilder {
    pub fn new() -> Self {
        Self {
            config: IndexConfig::default(),
            score_fn: None,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: IndexConfig) -> Self {
        self.config = config;
        self
    }

    /// Maximum resident points per node.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    /// Fixed minimum depth for every insert.
    pub fn min_depth(mut self, min_depth: u8) -> Self {
        self.config.depth_policy = DepthPolicy::Fixed { min_depth };
        self
    }

    pub fn insert_policy(mut self, policy: InsertPolicy) -> Self {
        self.config.insert_policy = policy;
        self
    }

    pub fn depth_policy(mut self, policy: DepthPolicy) -> Self {
        self.config.depth_policy = policy;
        self
    }

    /// Scoring strategy used to rank residents; higher scores win.
    pub fn score_fn<F>(mut self, score_fn: F) -> Self
    where
        F: Fn(&Place) -> f64 + Send + Sync + 'static,
    {
        self.score_fn = Some(Box::new(score_fn));
        self
    }

    /// Build the index. Fails when no score function was provided or the
    /// configuration is invalid.
    pub fn build(self) -> Result<QuadTree> {
        let score_fn = self.score_fn.ok_or(CityTilesError::MissingScoreFunction)?;
        self.config.validate().map_err(CityTilesError::Config)?;
        Ok(QuadTree::with_score_fn(self.config, score_fn))
    }
}

impl Default for QuadTreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_score_fn() {
        let err = QuadTreeBuilder::new().build().unwrap_err();
        assert!(matches!(err, CityTilesError::MissingScoreFunction));
    }

    #[test]
    fn test_invalid_config() {
        let err = QuadTreeBuilder::new()
            .capacity(0)
            .score_fn(|p: &Place| p.score)
            .build()
            .unwrap_err();
        assert!(matches!(err, CityTilesError::Config(_)));
    }

    #[test]
    fn test_build_defaults() {
        let tree = QuadTreeBuilder::new()
            .score_fn(|p: &Place| p.score)
            .build()
            .unwrap();
        assert_eq!(tree.config().capacity, 10);
        assert_eq!(tree.node_count(), 1);
    }
}
