//! Application state: the dataset registry built once at startup.

use anyhow::Context;
use citytiles::ingest::load_settlements;
use citytiles::{Place, QuadTree};
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// One loaded settlement index, addressable by name in request paths.
pub struct Dataset {
    pub name: String,
    pub tree: QuadTree,
}

impl Dataset {
    /// Build the index for one data file. The dataset name is the file
    /// stem, which is what request paths refer to.
    pub fn load(path: &Path, min_depth: u8) -> anyhow::Result<Self> {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("default")
            .to_string();

        let mut tree = QuadTree::builder()
            .min_depth(min_depth)
            .score_fn(|p: &Place| p.population as f64)
            .build()?;

        info!("reading data from {}", path.display());
        let loaded = load_settlements(path, &mut tree)
            .with_context(|| format!("loading {}", path.display()))?;
        info!(
            "dataset {name}: {loaded} places, tree depth {}, {} nodes",
            tree.max_depth(),
            tree.node_count()
        );

        Ok(Self { name, tree })
    }
}

/// Shared request-handler state. Datasets are loaded once before the
/// server starts; handlers only read.
pub struct AppState {
    datasets: FxHashMap<String, Dataset>,
    default_dataset: String,
    pub static_root: PathBuf,
}

impl AppState {
    pub fn new(datasets: Vec<Dataset>, static_root: PathBuf) -> Self {
        let default_dataset = datasets
            .first()
            .map(|d| d.name.clone())
            .unwrap_or_default();
        let datasets = datasets.into_iter().map(|d| (d.name.clone(), d)).collect();
        Self {
            datasets,
            default_dataset,
            static_root,
        }
    }

    /// Resolve a dataset by name; `None` falls back to the default.
    pub fn dataset(&self, name: Option<&str>) -> Option<&Dataset> {
        self.datasets.get(name.unwrap_or(&self.default_dataset))
    }
}
