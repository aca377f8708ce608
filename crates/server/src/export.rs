//! One-shot export of a whole index as a static tileset.
//!
//! Writes the same directory layout the server routes resolve, so the
//! output directory can be served as plain files: `content/` holds one
//! `.vctr` per non-empty tile, `subtrees/` one `.subtree` per populated
//! subtree root (stepping [`SUBTREE_DEPTH`] levels at a time).

use anyhow::Context;
use citytiles::codec::{encode_subtree, encode_tile, AttributeColumns, Cartographic, Rectangle};
use citytiles::tiling::rect_contains;
use citytiles::{Place, QuadTree, TileAddr};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::routes::SUBTREE_DEPTH;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExportStats {
    pub content_files: usize,
    pub subtree_files: usize,
}

/// Walk the whole index once, writing every non-empty content tile and
/// every reachable subtree file. Any I/O failure aborts the run.
pub fn export_tiles(tree: &QuadTree, out_dir: &Path) -> anyhow::Result<ExportStats> {
    let content_dir = out_dir.join("content");
    let subtree_dir = out_dir.join("subtrees");
    fs::create_dir_all(&content_dir).context("creating content directory")?;
    fs::create_dir_all(&subtree_dir).context("creating subtrees directory")?;

    let mut stats = ExportStats::default();

    // Additive refinement: a tile's payload carries its own residents plus
    // every ancestor resident that falls inside its bounds.
    let mut stack: Vec<(TileAddr, Vec<Place>)> = vec![(tree.root().addr(), Vec::new())];
    while let Some((addr, inherited)) = stack.pop() {
        let Some(id) = tree.find_node(addr) else {
            continue;
        };
        let node = tree.node(id);

        let mut collected = inherited;
        collected.extend(node.points().iter().cloned());

        let bounds = node.bounds();
        let tile_points: Vec<&Place> = collected
            .iter()
            .filter(|p| rect_contains(bounds, &p.position))
            .collect();

        if !tile_points.is_empty() {
            let path = content_dir.join(format!("{}__{}_{}.vctr", addr.z, addr.x, addr.y));
            write_tile(addr, &tile_points, &path)?;
            stats.content_files += 1;
        }

        for child in addr.children_morton() {
            if tree.find_node(child).is_some() {
                stack.push((child, collected.clone()));
            }
        }
    }

    // Subtree files: the root window, then recursively every populated
    // boundary node one window deeper.
    let mut roots = vec![tree.root().addr()];
    while let Some(addr) = roots.pop() {
        let path = subtree_dir.join(format!("{}.{}.{}.subtree", addr.z, addr.x, addr.y));
        let payload = encode_subtree(tree, addr, SUBTREE_DEPTH)?;
        fs::write(&path, payload).with_context(|| format!("writing {}", path.display()))?;
        stats.subtree_files += 1;

        let boundary = addr.z + SUBTREE_DEPTH;
        tree.traverse_z_order(addr, SUBTREE_DEPTH + 1, |view| {
            if view.addr.z == boundary && view.is_available() {
                roots.push(view.addr);
            }
        });
    }

    info!(
        "content files written: {}, subtree files written: {}",
        stats.content_files, stats.subtree_files
    );
    Ok(stats)
}

fn write_tile(addr: TileAddr, points: &[&Place], path: &Path) -> anyhow::Result<()> {
    let rectangle = Rectangle::from_rect(&addr.bounds());
    let positions: Vec<Cartographic> = points
        .iter()
        .map(|p| Cartographic::from_degrees(p.longitude(), p.latitude(), f64::from(p.elevation)))
        .collect();

    let mut columns = AttributeColumns::new();
    columns.push("title", points.iter().map(|p| p.name.clone()));
    columns.push("size", points.iter().map(|p| u64::from(p.size_rank)));

    let payload = encode_tile(&rectangle, &positions, &columns)?;
    fs::write(path, payload).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
