use citytiles::codec::{encode_subtree, encode_tile, AttributeColumns, Rectangle};
use citytiles::{CityTilesError, DepthPolicy, IndexConfig, Place, Point, QuadTree, TileAddr};

fn place(id: u64, lon: f64, lat: f64, population: u64) -> Place {
    Place {
        id,
        name: format!("place-{id}"),
        position: Point::new(lon, lat),
        elevation: 0,
        population,
        class_code: "PPL".to_string(),
        score: population as f64,
        size_rank: 5,
    }
}

fn score_tree(config: IndexConfig) -> QuadTree {
    QuadTree::builder()
        .config(config)
        .score_fn(|p: &Place| p.score)
        .build()
        .unwrap()
}

#[test]
fn test_out_of_range_coordinates_rejected() {
    let mut tree = score_tree(IndexConfig::default());

    for (lon, lat) in [(181.0, 0.0), (-181.0, 0.0), (0.0, 91.0), (0.0, -90.01)] {
        let err = tree.insert(place(1, lon, lat, 10)).unwrap_err();
        assert!(matches!(err, CityTilesError::InvalidPoint { .. }));
    }
    assert!(tree.is_empty());
    assert_eq!(tree.node_count(), 1);
}

#[test]
fn test_boundary_coordinates_accepted() {
    let mut tree = score_tree(IndexConfig::default().with_min_depth(4));

    tree.insert(place(1, 180.0, 90.0, 10)).unwrap();
    tree.insert(place(2, -180.0, -90.0, 10)).unwrap();
    assert_eq!(tree.len(), 2);

    // The north-east corner folds into the last tile at every level.
    let mut out = Vec::new();
    let top_corner = TileAddr::new(15, 15, 4);
    tree.collect_points_for_tile(top_corner, &mut out);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].id, 1);
}

#[test]
fn test_empty_tree_collect_and_encode() {
    let tree = score_tree(IndexConfig::default());

    let mut out = Vec::new();
    assert!(tree.collect_points_for_tile(TileAddr::ROOT, &mut out).is_some());
    assert!(out.is_empty());
    assert!(tree.collect_points_for_tile(TileAddr::new(3, 3, 2), &mut out).is_none());

    // Both codecs handle the single-node tree.
    let rectangle = Rectangle::from_rect(&TileAddr::ROOT.bounds());
    let tile = encode_tile(&rectangle, &[], &AttributeColumns::new()).unwrap();
    assert_eq!(u32::from_le_bytes(tile[40..44].try_into().unwrap()), 0);

    let subtree = encode_subtree(&tree, TileAddr::ROOT, 3).unwrap();
    assert_eq!(subtree[0..4], *b"subt");
}

#[test]
fn test_deep_min_depth_chain() {
    let mut tree = score_tree(IndexConfig::default().with_min_depth(8));
    tree.insert(place(1, 0.5, 0.5, 10)).unwrap();

    // One node per level down to the floor, each empty above it.
    assert_eq!(tree.node_count(), 9);
    tree.traverse_bfs(|node| {
        if node.addr().z < 8 {
            assert!(node.points().is_empty());
        } else {
            assert_eq!(node.points().len(), 1);
        }
        true
    });
    assert_eq!(tree.max_depth(), 8);
}

#[test]
fn test_per_insert_depth_override() {
    let mut tree = score_tree(IndexConfig::default());
    tree.insert_with_min_depth(place(1, 0.5, 0.5, 10), 2).unwrap();
    tree.insert_with_min_depth(place(2, 0.5, 0.6, 20), 0).unwrap();

    assert_eq!(tree.root().points().len(), 1);
    assert_eq!(tree.root().points()[0].id, 2);

    let mut deep = None;
    tree.traverse_bfs(|node| {
        if node.points().iter().any(|p| p.id == 1) {
            deep = Some(node.addr().z);
        }
        true
    });
    assert_eq!(deep, Some(2));
}

#[test]
fn test_identical_scores_preserve_order_through_cascade() {
    let mut tree = score_tree(IndexConfig::default().with_capacity(2));
    tree.insert(place(1, 1.0, 1.0, 50)).unwrap();
    tree.insert(place(2, 2.0, 2.0, 50)).unwrap();
    tree.insert(place(3, 3.0, 3.0, 50)).unwrap();

    // The last-inserted equal scorer is the one displaced.
    let ids: Vec<u64> = tree.root().points().iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![1, 2]);
}

#[test]
fn test_bfs_early_termination() {
    let mut tree = score_tree(IndexConfig::default().with_capacity(1));
    for i in 0..10 {
        tree.insert(place(i, f64::from(i as u32) * 30.0 - 150.0, 0.0, i)).unwrap();
    }

    let mut visits = 0;
    tree.traverse_bfs(|_| {
        visits += 1;
        false
    });
    assert_eq!(visits, 1);
}

#[test]
fn test_tiered_policy_end_to_end() {
    let config = IndexConfig::default().with_depth_policy(DepthPolicy::TieredBySize {
        shallowest: 0,
        steepest: 6,
        min_rank: 3,
    });
    let mut tree = score_tree(config);

    let mut capital = place(1, 10.0, 10.0, 1_000_000);
    capital.size_rank = 10;
    let mut town = place(2, -10.0, -10.0, 8_000);
    town.size_rank = 3;
    let mut hamlet = place(3, 20.0, 20.0, 300);
    hamlet.size_rank = 1;

    tree.insert(capital).unwrap();
    tree.insert(town).unwrap();
    tree.insert(hamlet).unwrap();

    // The hamlet is discarded, the capital surfaces at the root, the town
    // is pinned below its depth floor.
    assert_eq!(tree.len(), 2);
    assert_eq!(tree.root().points().len(), 1);
    assert_eq!(tree.root().points()[0].id, 1);

    let mut town_z = None;
    tree.traverse_bfs(|node| {
        if node.points().iter().any(|p| p.id == 2) {
            town_z = Some(node.addr().z);
        }
        true
    });
    assert_eq!(town_z, Some(6));
}

#[test]
fn test_subtree_on_missing_interior() {
    let mut tree = score_tree(IndexConfig::default().with_min_depth(2));
    tree.insert(place(1, 10.0, 10.0, 10)).unwrap();

    // A window rooted below the grown path sees only placeholders.
    let missing = TileAddr::new(0, 0, 2);
    assert!(tree.find_node(missing).is_none());

    let payload = encode_subtree(&tree, missing, 2).unwrap();
    let json_len = u64::from_le_bytes(payload[8..16].try_into().unwrap()) as usize;
    let json: serde_json::Value = serde_json::from_str(
        std::str::from_utf8(&payload[24..24 + json_len])
            .unwrap()
            .trim(),
    )
    .unwrap();
    assert_eq!(json["tileAvailability"]["availableCount"], 0);
    assert_eq!(json["contentAvailability"][0]["availableCount"], 0);
    assert_eq!(json["childSubtreeAvailability"]["availableCount"], 0);
}

#[test]
fn test_many_points_single_location_bounded() {
    // Identical coordinates can never separate; the cascade must still
    // terminate and keep every point reachable.
    let mut tree = score_tree(IndexConfig::default().with_capacity(2));
    for i in 0..20 {
        tree.insert(place(i, 7.7, 7.7, i)).unwrap();
    }

    let mut reachable = 0;
    tree.traverse_bfs(|node| {
        reachable += node.points().len();
        true
    });
    assert_eq!(reachable, 20);
    assert_eq!(tree.len(), 20);
}
