//! Level-of-detail quadtree index and 3D-Tiles style codecs for labeled
//! point features.
//!
//! Settlements are inserted one at a time into a capacity-bounded,
//! importance-ranked quadtree; any tile of the tree can then be rendered
//! as a `vctr` point-tile payload, and any subtree window as a `subt`
//! availability payload for an implicit-tiling streaming client.
//!
//! ```rust
//! use citytiles::codec::{encode_tile, AttributeColumns, Cartographic, Rectangle};
//! use citytiles::{Place, QuadTree, TileAddr};
//!
//! let mut tree = QuadTree::builder()
//!     .score_fn(|p: &Place| p.population as f64)
//!     .build()?;
//! tree.insert(Place {
//!     id: 1,
//!     name: "Reykjavik".into(),
//!     position: geo::Point::new(-21.9, 64.1),
//!     elevation: 15,
//!     population: 128_000,
//!     class_code: "PPLC".into(),
//!     score: 128_000.0,
//!     size_rank: 10,
//! })?;
//!
//! let addr = TileAddr::ROOT;
//! let mut points = Vec::new();
//! tree.collect_points_for_tile(addr, &mut points);
//!
//! let rectangle = Rectangle::from_rect(&addr.bounds());
//! let positions: Vec<_> = points
//!     .iter()
//!     .map(|p| Cartographic::from_degrees(p.longitude(), p.latitude(), p.elevation as f64))
//!     .collect();
//! let mut columns = AttributeColumns::new();
//! columns.push("title", points.iter().map(|p| p.name.clone()));
//! let payload = encode_tile(&rectangle, &positions, &columns)?;
//! assert_eq!(payload[0..4], *b"vctr");
//! # Ok::<(), citytiles::CityTilesError>(())
//! ```

pub mod bitvec;
pub mod builder;
pub mod codec;
pub mod error;
pub mod ingest;
pub mod qtree;
pub mod tiling;
pub mod types;

pub use builder::QuadTreeBuilder;
pub use error::{CityTilesError, Result};
pub use qtree::{Node, NodeId, QuadTree, TileView};
pub use tiling::TileAddr;
pub use types::{DepthPolicy, IndexConfig, InsertPolicy, Place};

pub use geo::{Point, Rect};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {
    pub use crate::codec::{encode_subtree, encode_tile, AttributeColumns, Cartographic, Rectangle};
    pub use crate::{
        CityTilesError, DepthPolicy, IndexConfig, InsertPolicy, Place, QuadTree, Result, TileAddr,
    };
    pub use geo::{Point, Rect};
}
