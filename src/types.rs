//! Core data types and index configuration.
//!
//! A [`Place`] is a labeled point feature (a settlement): position, name,
//! elevation, population and the two values derived once at ingestion —
//! the importance score and the 1–10 display size rank. Places are plain
//! data; ranking inside the index is driven by the score function injected
//! at construction time.

use geo::Point;
use serde::{Deserialize, Serialize};

/// Highest display size rank.
pub const MAX_SIZE_RANK: u8 = 10;

/// A labeled point feature. Immutable once inserted into the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub id: u64,
    /// Display name (ASCII name column of the source data).
    pub name: String,
    /// Position in degrees: `x` is longitude, `y` is latitude.
    pub position: Point,
    /// Elevation in meters.
    pub elevation: i32,
    pub population: u64,
    /// Feature class code, e.g. `PPLC` for a capital.
    pub class_code: String,
    /// Importance score derived at ingestion; higher is more important.
    pub score: f64,
    /// Display size rank in 1–10, derived at ingestion.
    pub size_rank: u8,
}

impl Place {
    pub fn longitude(&self) -> f64 {
        self.position.x()
    }

    pub fn latitude(&self) -> f64 {
        self.position.y()
    }

    /// Whether the coordinates are inside the valid WGS84 degree ranges.
    pub fn coordinates_valid(&self) -> bool {
        let (lon, lat) = (self.longitude(), self.latitude());
        lon.is_finite()
            && lat.is_finite()
            && (-180.0..=180.0).contains(&lon)
            && (-90.0..=90.0).contains(&lat)
    }
}

/// Insertion strategy for the quadtree.
///
/// Both strategies respect the per-node capacity and the per-insert minimum
/// depth; they differ in how a new point competes with residents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "policy")]
pub enum InsertPolicy {
    /// Score-sorted insertion with eviction of the lowest-scoring resident
    /// to a child tile whenever capacity is exceeded.
    CapacityRanked,
    /// Greedy spatial decluttering: a candidate landing within
    /// `base_threshold / 2^depth` degrees of a more important resident is
    /// deferred to a deeper tile; a less important resident is displaced
    /// instead. At `max_depth` points are always admitted.
    DistanceDeclutter { base_threshold: f64, max_depth: u8 },
}

impl Default for InsertPolicy {
    fn default() -> Self {
        Self::CapacityRanked
    }
}

/// Minimum-depth policy applied per inserted point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "depth")]
pub enum DepthPolicy {
    /// The same floor for every point.
    Fixed { min_depth: u8 },
    /// Shallower floors for larger size ranks: rank 10 gets `shallowest`,
    /// rank `min_rank` gets `steepest` (linear in between), anything below
    /// `min_rank` is discarded before insertion.
    TieredBySize {
        shallowest: u8,
        steepest: u8,
        min_rank: u8,
    },
}

impl Default for DepthPolicy {
    fn default() -> Self {
        Self::Fixed { min_depth: 0 }
    }
}

impl DepthPolicy {
    /// Minimum depth for a point of the given size rank, or `None` when the
    /// point should be discarded entirely.
    pub fn floor_for(&self, size_rank: u8) -> Option<u8> {
        match *self {
            Self::Fixed { min_depth } => Some(min_depth),
            Self::TieredBySize {
                shallowest,
                steepest,
                min_rank,
            } => {
                if size_rank < min_rank {
                    return None;
                }
                let rank = size_rank.min(MAX_SIZE_RANK);
                let span = u32::from(MAX_SIZE_RANK - min_rank);
                if span == 0 {
                    return Some(shallowest);
                }
                let above = u32::from(rank - min_rank);
                let range = u32::from(steepest - shallowest);
                // Rounded toward the steeper floor.
                let floor = u32::from(steepest) - (above * range + span - 1) / span;
                Some(floor as u8)
            }
        }
    }
}

/// Quadtree configuration.
///
/// Serializable so a deployment can load it from JSON:
///
/// ```rust
/// use citytiles::IndexConfig;
///
/// let config: IndexConfig = serde_json::from_str(
///     r#"{"capacity": 25, "depth_policy": {"depth": "fixed", "min_depth": 3}}"#,
/// ).unwrap();
/// assert_eq!(config.capacity, 25);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Maximum resident points per node.
    #[serde(default = "IndexConfig::default_capacity")]
    pub capacity: usize,
    #[serde(default)]
    pub insert_policy: InsertPolicy,
    #[serde(default)]
    pub depth_policy: DepthPolicy,
}

impl IndexConfig {
    const fn default_capacity() -> usize {
        10
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_min_depth(mut self, min_depth: u8) -> Self {
        self.depth_policy = DepthPolicy::Fixed { min_depth };
        self
    }

    pub fn with_insert_policy(mut self, policy: InsertPolicy) -> Self {
        self.insert_policy = policy;
        self
    }

    pub fn with_depth_policy(mut self, policy: DepthPolicy) -> Self {
        self.depth_policy = policy;
        self
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.capacity == 0 {
            return Err("capacity must be greater than zero".to_string());
        }

        if let InsertPolicy::DistanceDeclutter {
            base_threshold,
            max_depth,
        } = self.insert_policy
        {
            if !base_threshold.is_finite() || base_threshold <= 0.0 {
                return Err("declutter base threshold must be positive".to_string());
            }
            if max_depth > 30 {
                return Err("declutter max depth must be at most 30".to_string());
            }
        }

        if let DepthPolicy::TieredBySize {
            shallowest,
            steepest,
            min_rank,
        } = self.depth_policy
        {
            if shallowest > steepest {
                return Err("tiered depth: shallowest floor exceeds steepest".to_string());
            }
            if min_rank == 0 || min_rank > MAX_SIZE_RANK {
                return Err("tiered depth: min rank must be in 1-10".to_string());
            }
        }

        Ok(())
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            capacity: Self::default_capacity(),
            insert_policy: InsertPolicy::default(),
            depth_policy: DepthPolicy::default(),
        }
    }
}
