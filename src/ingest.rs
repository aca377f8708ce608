//! Ingestion of GeoNames-style tab-delimited settlement files.
//!
//! Rows are raw tab-separated records with fixed column positions; a
//! malformed row is skipped, only an unopenable source is fatal. Each
//! parsed record carries its derived importance score (population) and
//! display size rank.

use csv::ReaderBuilder;
use std::path::Path;

use crate::error::Result;
use crate::qtree::QuadTree;
use crate::types::Place;

const ID_FLD: usize = 0;
const ASCII_NAME_FLD: usize = 2;
const LAT_FLD: usize = 4;
const LON_FLD: usize = 5;
const CLASS_FLD: usize = 6;
const CLASS_CODE_FLD: usize = 7;
const PPL_FLD: usize = 14;
const ELE_FLD: usize = 15;

/// Feature class of populated places; only these enter the index.
const POPULATED_PLACE_CLASS: &str = "P";

/// Display size rank (1–10) from feature class code and population.
///
/// Administrative classes pin the rank (capitals always largest);
/// everything else falls through to population thresholds.
pub fn size_rank(class_code: &str, population: u64) -> u8 {
    match class_code {
        "PPLC" => return 10,
        "PPLA" => return 9,
        "PPL2" => return 8,
        "PPL3" => return 7,
        "PPL4" => return 6,
        "PPL5" => return 5,
        _ => {}
    }

    match population {
        1_000_000.. => 9,
        500_000.. => 9,
        200_000.. => 8,
        100_000.. => 7,
        50_000.. => 6,
        20_000.. => 5,
        10_000.. => 4,
        5_000.. => 3,
        1_000.. => 2,
        _ => 1,
    }
}

/// Stream `(place, feature_class)` pairs from a tab-delimited file.
///
/// The sink sees every parseable row regardless of feature class, so
/// callers decide what to keep.
pub fn read_places<F>(path: &Path, mut sink: F) -> Result<()>
where
    F: FnMut(Place, &str),
{
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_path(path)?;

    for row in reader.records() {
        let record = match row {
            Ok(record) => record,
            Err(e) => {
                log::debug!("skipping malformed row: {e}");
                continue;
            }
        };
        match parse_record(&record) {
            Some((place, class)) => sink(place, &class),
            None => log::debug!("skipping row with unparseable fields"),
        }
    }

    Ok(())
}

fn parse_record(record: &csv::StringRecord) -> Option<(Place, String)> {
    let id = record.get(ID_FLD)?.parse().ok()?;
    let name = record.get(ASCII_NAME_FLD)?.to_string();
    let lat: f64 = record.get(LAT_FLD)?.parse().ok()?;
    let lon: f64 = record.get(LON_FLD)?.parse().ok()?;
    let class = record.get(CLASS_FLD)?.to_string();
    let class_code = record.get(CLASS_CODE_FLD).unwrap_or("").to_string();

    // Population and elevation columns are frequently empty.
    let population: u64 = record
        .get(PPL_FLD)
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let elevation: i32 = record
        .get(ELE_FLD)
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    let place = Place {
        id,
        name,
        position: geo::Point::new(lon, lat),
        elevation,
        population,
        score: population as f64,
        size_rank: size_rank(&class_code, population),
        class_code,
    };
    Some((place, class))
}

/// Load every populated place from `path` into the index. Returns the
/// number of points inserted; invalid coordinates are rejected and
/// counted out.
pub fn load_settlements(path: &Path, tree: &mut QuadTree) -> Result<usize> {
    let before = tree.len();
    read_places(path, |place, class| {
        if class != POPULATED_PLACE_CLASS {
            return;
        }
        let name = place.name.clone();
        if let Err(e) = tree.insert(place) {
            log::debug!("rejecting {name}: {e}");
        }
    })?;
    Ok(tree.len() - before)
}
