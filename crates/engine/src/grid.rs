//! Grid generation and resizing.
//!
//! A grid is the set of coordinates its `ShapeParams` enumerates, one tile
//! per coordinate. Generation never reads prior state; resizing keeps the
//! data of every coordinate present in both the old and the new grid.

use crate::error::ConfigurationError;
use hexatlas_protocol::api::ShapeRequest;
use hexatlas_protocol::{Hex, HexTile, ShapeParams, TileData};
use std::collections::{HashMap, HashSet};

pub const MAX_RADIUS: u32 = 100;
pub const MAX_SIDE: u32 = 200;

/// Rejects sizes outside the documented bounds.
pub fn validate(params: &ShapeParams) -> Result<(), ConfigurationError> {
    match *params {
        ShapeParams::Radial { radius } => {
            check_radius(i64::from(radius))?;
        }
        ShapeParams::Rectangular { width, height } => {
            check_side("width", i64::from(width))?;
            check_side("height", i64::from(height))?;
        }
    }
    Ok(())
}

/// Validated shape from client input.
pub fn shape_from_request(req: ShapeRequest) -> Result<ShapeParams, ConfigurationError> {
    Ok(match req {
        ShapeRequest::Radial { radius } => ShapeParams::Radial {
            radius: check_radius(radius)?,
        },
        ShapeRequest::Rectangular { width, height } => ShapeParams::Rectangular {
            width: check_side("width", width)?,
            height: check_side("height", height)?,
        },
    })
}

fn check_radius(value: i64) -> Result<u32, ConfigurationError> {
    match u32::try_from(value) {
        Ok(v) if (1..=MAX_RADIUS).contains(&v) => Ok(v),
        _ => Err(ConfigurationError::Radius {
            value,
            max: MAX_RADIUS,
        }),
    }
}

fn check_side(name: &'static str, value: i64) -> Result<u32, ConfigurationError> {
    match u32::try_from(value) {
        Ok(v) if (1..=MAX_SIDE).contains(&v) => Ok(v),
        _ => Err(ConfigurationError::Side {
            name,
            value,
            max: MAX_SIDE,
        }),
    }
}

/// Coordinates of the grid described by `params`, in generation order.
pub fn coordinates(params: &ShapeParams) -> Vec<Hex> {
    match *params {
        ShapeParams::Radial { radius } => radial_coordinates(radius),
        ShapeParams::Rectangular { width, height } => rectangular_coordinates(width, height),
    }
}

fn radial_coordinates(radius: u32) -> Vec<Hex> {
    let n = radius as i32;
    let mut out = Vec::with_capacity(ShapeParams::Radial { radius }.tile_count());
    for q in -n..=n {
        for r in (-n).max(-q - n)..=n.min(-q + n) {
            out.push(Hex::new(q, r));
        }
    }
    out
}

// Odd rows shift half a hex right ("odd-r"), which keeps rows aligned as a
// brick block under the pointy-top layout.
fn rectangular_coordinates(width: u32, height: u32) -> Vec<Hex> {
    let mut out = Vec::with_capacity(width as usize * height as usize);
    for row in 0..height as i32 {
        let shift = row / 2;
        for col in 0..width as i32 {
            out.push(Hex::new(col - shift, row));
        }
    }
    out
}

/// Whether `hex` belongs to the grid described by `params`.
pub fn contains(params: &ShapeParams, hex: Hex) -> bool {
    match *params {
        ShapeParams::Radial { radius } => crate::hex::distance(Hex::ORIGIN, hex) <= radius,
        ShapeParams::Rectangular { width, height } => {
            let row = hex.r();
            let col = hex.q() + row / 2;
            row >= 0 && (row as u32) < height && col >= 0 && (col as u32) < width
        }
    }
}

pub fn generate_radial(radius: u32) -> Vec<HexTile> {
    radial_coordinates(radius)
        .into_iter()
        .map(HexTile::new)
        .collect()
}

pub fn generate_rectangular(width: u32, height: u32) -> Vec<HexTile> {
    rectangular_coordinates(width, height)
        .into_iter()
        .map(HexTile::new)
        .collect()
}

/// Fresh all-default tiles for `params`.
pub fn generate(params: &ShapeParams) -> Result<Vec<HexTile>, ConfigurationError> {
    validate(params)?;
    Ok(coordinates(params).into_iter().map(HexTile::new).collect())
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResizeOutcome {
    pub tiles: Vec<HexTile>,
    /// Old tiles outside the new bounds.
    pub dropped: usize,
    /// Dropped tiles that had paint or links.
    pub dropped_with_data: usize,
}

/// Resizes to `params`, keeping the data of surviving coordinates.
///
/// Lossy: tiles outside the new bounds are discarded with their links.
pub fn resize(tiles: &[HexTile], params: &ShapeParams) -> Result<Vec<HexTile>, ConfigurationError> {
    resize_report(tiles, params).map(|o| o.tiles)
}

/// Same as [`resize`], also counting what was dropped so callers can word
/// their confirmation.
pub fn resize_report(
    tiles: &[HexTile],
    params: &ShapeParams,
) -> Result<ResizeOutcome, ConfigurationError> {
    validate(params)?;

    let mut existing: HashMap<Hex, &TileData> = HashMap::with_capacity(tiles.len());
    for t in tiles {
        existing.entry(t.hex).or_insert(&t.data);
    }

    let coords = coordinates(params);
    let kept: HashSet<Hex> = coords.iter().copied().collect();
    let resized: Vec<HexTile> = coords
        .into_iter()
        .map(|hex| HexTile {
            hex,
            data: existing.get(&hex).map(|d| (*d).clone()).unwrap_or_default(),
        })
        .collect();

    let mut dropped = 0;
    let mut dropped_with_data = 0;
    for (hex, data) in &existing {
        if !kept.contains(hex) {
            dropped += 1;
            if !data.is_default() {
                dropped_with_data += 1;
            }
        }
    }

    tracing::debug!(
        shape = params.name(),
        tiles = resized.len(),
        dropped,
        dropped_with_data,
        "resized grid"
    );

    Ok(ResizeOutcome {
        tiles: resized,
        dropped,
        dropped_with_data,
    })
}

/// Checks that `tiles` holds exactly one tile per coordinate of `params`.
pub fn check_tiles(tiles: &[HexTile], params: &ShapeParams) -> Result<(), ConfigurationError> {
    let mismatch = |detail: String| ConfigurationError::TileMismatch {
        shape: params.name(),
        detail,
    };
    let mut seen = HashSet::with_capacity(tiles.len());
    for t in tiles {
        if !contains(params, t.hex) {
            return Err(mismatch(format!("{} is out of bounds", t.hex)));
        }
        if !seen.insert(t.hex) {
            return Err(mismatch(format!("{} appears twice", t.hex)));
        }
    }
    let expected = params.tile_count();
    if seen.len() != expected {
        return Err(mismatch(format!(
            "expected {expected} tiles, found {}",
            seen.len()
        )));
    }
    Ok(())
}
