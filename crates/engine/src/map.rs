//! Whole-map edits. Each function takes the current `Map` and returns the
//! next one; persisting it is up to the caller.

use crate::error::ConfigurationError;
use crate::grid::{self, ResizeOutcome};
use crate::{paint, paths, tiles};
use hexatlas_protocol::{
    BrushState, Hex, Id, LinkKind, Map, NewMap, Path, Point, ShapeParams, TileData,
};

pub fn validate_name(name: &str) -> Result<String, ConfigurationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ConfigurationError::EmptyName);
    }
    Ok(name.to_string())
}

/// A freshly generated map, ready for the store to assign an id.
pub fn new_map(name: &str, shape: ShapeParams) -> Result<NewMap, ConfigurationError> {
    let name = validate_name(name)?;
    let tiles = grid::generate(&shape)?;
    Ok(NewMap {
        name,
        shape,
        tiles,
        paths: Vec::new(),
    })
}

/// Checks the name and that the tiles cover exactly the shape's grid.
pub fn validate(map: &Map) -> Result<(), ConfigurationError> {
    validate_name(&map.name)?;
    grid::validate(&map.shape)?;
    grid::check_tiles(&map.tiles, &map.shape)
}

pub fn renamed(map: &Map, name: &str) -> Result<Map, ConfigurationError> {
    Ok(Map {
        name: validate_name(name)?,
        ..map.clone()
    })
}

/// Resized copy plus drop counts. Paths are kept as they are.
pub fn resized(map: &Map, shape: ShapeParams) -> Result<(Map, ResizeOutcome), ConfigurationError> {
    let outcome = grid::resize_report(&map.tiles, &shape)?;
    let next = Map {
        id: map.id.clone(),
        name: map.name.clone(),
        shape,
        tiles: outcome.tiles.clone(),
        paths: map.paths.clone(),
    };
    Ok((next, outcome))
}

pub fn painted(map: &Map, target: Hex, brush: &BrushState) -> Map {
    Map {
        tiles: paint::apply(&map.tiles, target, brush),
        ..map.clone()
    }
}

pub fn with_tile_data(map: &Map, hex: Hex, data: TileData) -> Map {
    Map {
        tiles: tiles::set_tile_data(&map.tiles, hex, data),
        ..map.clone()
    }
}

pub fn with_links(map: &Map, hex: Hex, kind: LinkKind, ids: Vec<Id>) -> Map {
    Map {
        tiles: tiles::set_links(&map.tiles, hex, kind, ids),
        ..map.clone()
    }
}

pub fn with_paths(map: &Map, paths: Vec<Path>) -> Map {
    Map {
        paths,
        ..map.clone()
    }
}

/// Adds a new empty path at the front and returns its id.
pub fn with_new_path(map: &Map) -> (Map, Id) {
    let (paths, id) = paths::add_path(&map.paths);
    (with_paths(map, paths), id)
}

pub fn with_point(map: &Map, path_id: &str, point: Point) -> Map {
    with_paths(map, paths::append_point(&map.paths, path_id, point))
}

pub fn without_last_point(map: &Map, path_id: &str) -> Map {
    with_paths(map, paths::remove_last_point(&map.paths, path_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexatlas_protocol::BrushMode;

    fn sample() -> Map {
        new_map("  Westmarch ", ShapeParams::Radial { radius: 2 })
            .unwrap()
            .with_id("map-1")
    }

    #[test]
    fn new_map_trims_and_generates() {
        let m = sample();
        assert_eq!(m.name, "Westmarch");
        assert_eq!(m.tiles.len(), 19);
        assert!(m.paths.is_empty());
        validate(&m).unwrap();
    }

    #[test]
    fn new_map_rejects_bad_input() {
        assert_eq!(
            new_map("   ", ShapeParams::Radial { radius: 3 }),
            Err(ConfigurationError::EmptyName)
        );
        assert!(new_map(
            "x",
            ShapeParams::Rectangular {
                width: 0,
                height: 2
            }
        )
        .is_err());
    }

    #[test]
    fn resize_keeps_paths_and_paint() {
        let m = sample();
        let (m, path_id) = with_new_path(&m);
        let m = with_point(&m, &path_id, Point::new(500.0, 500.0));
        let red = BrushState {
            mode: BrushMode::Brush,
            color: Some("#ff0000".to_string()),
            icon: None,
            icon_color: None,
        };
        let m = painted(&m, Hex::new(1, 0), &red);

        let (small, outcome) = resized(&m, ShapeParams::Radial { radius: 1 }).unwrap();
        assert_eq!(outcome.dropped, 12);
        assert_eq!(small.paths, m.paths);
        let t = tiles::tile_at(&small.tiles, Hex::new(1, 0)).unwrap();
        assert_eq!(t.data.color.as_deref(), Some("#ff0000"));
        validate(&small).unwrap();
    }

    #[test]
    fn edits_do_not_touch_the_input() {
        let m = sample();
        let copy = m.clone();
        let _ = with_links(&m, Hex::ORIGIN, LinkKind::Dungeon, vec!["d1".to_string()]);
        let _ = renamed(&m, "Other").unwrap();
        let _ = without_last_point(&m, "none");
        assert_eq!(m, copy);
    }

    #[test]
    fn validate_catches_tampered_tiles() {
        let mut m = sample();
        m.tiles.truncate(5);
        assert!(matches!(
            validate(&m),
            Err(ConfigurationError::TileMismatch { .. })
        ));
    }
}
