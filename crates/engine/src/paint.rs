//! Brush, bucket, erase and eyedropper.
//!
//! Every operation takes the current tiles and returns the next tiles; the
//! input slice is never modified. Off-grid targets are no-ops, since pointer
//! positions routinely leave the grid mid-drag.

use crate::hex::neighbors;
use crate::tiles::update_tile;
use hexatlas_protocol::{BrushMode, BrushState, Hex, HexTile, TileData};
use std::collections::{HashMap, HashSet, VecDeque};

/// Fill the renderer uses for tiles with no color.
pub const NEUTRAL_FILL: &str = "#cccccc";

/// Applies the brush's current mode at `target`.
pub fn apply(tiles: &[HexTile], target: Hex, brush: &BrushState) -> Vec<HexTile> {
    match brush.mode {
        BrushMode::Brush => paint(tiles, target, brush),
        BrushMode::Bucket => bucket_fill(tiles, target, brush),
        BrushMode::Erase => erase(tiles, target),
    }
}

fn paint_data(data: &mut TileData, brush: &BrushState) {
    data.color = brush.color.clone();
    data.icon = brush.icon.clone();
    data.icon_color = brush.icon_color.clone();
}

/// Sets color, icon and icon color of one tile.
pub fn paint(tiles: &[HexTile], target: Hex, brush: &BrushState) -> Vec<HexTile> {
    update_tile(tiles, target, |d| paint_data(d, brush))
}

/// Clears the appearance of one tile. Links survive.
pub fn erase(tiles: &[HexTile], target: Hex) -> Vec<HexTile> {
    update_tile(tiles, target, TileData::clear_appearance)
}

/// Six-connected flood fill over tiles sharing the start tile's `(color, icon)`.
///
/// No-op when the start tile already shows the brush's pair.
pub fn bucket_fill(tiles: &[HexTile], target: Hex, brush: &BrushState) -> Vec<HexTile> {
    let index: HashMap<Hex, usize> = tiles.iter().enumerate().map(|(i, t)| (t.hex, i)).collect();
    let Some(&start) = index.get(&target) else {
        return tiles.to_vec();
    };
    let original = tiles[start].data.appearance();
    if original == brush.appearance() {
        return tiles.to_vec();
    }

    let mut out = tiles.to_vec();
    // A coordinate enters the queue at most once.
    let mut visited: HashSet<Hex> = HashSet::from([target]);
    let mut queue: VecDeque<Hex> = VecDeque::from([target]);
    while let Some(hex) = queue.pop_front() {
        paint_data(&mut out[index[&hex]].data, brush);
        for n in neighbors(hex) {
            let Some(&i) = index.get(&n) else {
                continue;
            };
            if tiles[i].data.appearance() == original && visited.insert(n) {
                queue.push_back(n);
            }
        }
    }

    tracing::trace!(start = %target, filled = visited.len(), "bucket fill");
    out
}

/// Copies the tile's appearance into a new brush, keeping the brush mode.
/// Off-grid targets return the brush unchanged.
pub fn eyedropper(tiles: &[HexTile], target: Hex, brush: &BrushState) -> BrushState {
    match tiles.iter().find(|t| t.hex == target) {
        Some(t) => BrushState {
            mode: brush.mode,
            color: t.data.color.clone(),
            icon: t.data.icon.clone(),
            icon_color: t.data.icon_color.clone(),
        },
        None => brush.clone(),
    }
}

/// Number of positions whose data differs. Both slices must be in the same order.
pub fn changed_count(before: &[HexTile], after: &[HexTile]) -> usize {
    before
        .iter()
        .zip(after)
        .filter(|(a, b)| a.data != b.data)
        .count()
}

fn parse_rgb(color: &str) -> Option<(u8, u8, u8)> {
    let hex = color.trim().strip_prefix('#')?;
    if !hex.is_ascii() {
        return None;
    }
    let channel = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        3 => {
            let mut it = hex.chars().map(|c| channel(&c.to_string()).map(|v| v * 17));
            Some((it.next()??, it.next()??, it.next()??))
        }
        6 => Some((channel(&hex[0..2])?, channel(&hex[2..4])?, channel(&hex[4..6])?)),
        _ => None,
    }
}

/// Relative luminance in `[0, 1]` of a `#rgb` or `#rrggbb` color.
pub fn luminance(color: &str) -> Option<f64> {
    let (r, g, b) = parse_rgb(color)?;
    Some((0.299 * f64::from(r) + 0.587 * f64::from(g) + 0.114 * f64::from(b)) / 255.0)
}

/// Black on light fills, white on dark ones. Unparseable fills get black.
pub fn contrast_color(fill: &str) -> &'static str {
    match luminance(fill) {
        Some(l) if l <= 0.5 => "#ffffff",
        _ => "#000000",
    }
}

/// Icon color a renderer should use: the manual one, else contrast with the fill.
pub fn effective_icon_color(data: &TileData) -> String {
    match &data.icon_color {
        Some(c) => c.clone(),
        None => contrast_color(data.color.as_deref().unwrap_or(NEUTRAL_FILL)).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{generate_radial, generate_rectangular};
    use crate::tiles::{set_links, tile_at};
    use hexatlas_protocol::LinkKind;

    fn brush(mode: BrushMode, color: &str, icon: Option<&str>) -> BrushState {
        BrushState {
            mode,
            color: Some(color.to_string()),
            icon: icon.map(str::to_string),
            icon_color: None,
        }
    }

    fn color_at(tiles: &[HexTile], hex: Hex) -> Option<&str> {
        tile_at(tiles, hex).unwrap().data.color.as_deref()
    }

    #[test]
    fn brush_paints_single_tile() {
        let tiles = generate_radial(2);
        let b = BrushState {
            icon_color: Some("#123456".to_string()),
            ..brush(BrushMode::Brush, "#ff0000", Some("Castle"))
        };
        let out = apply(&tiles, Hex::new(1, -1), &b);
        assert_eq!(changed_count(&tiles, &out), 1);
        let d = &tile_at(&out, Hex::new(1, -1)).unwrap().data;
        assert_eq!(d.color.as_deref(), Some("#ff0000"));
        assert_eq!(d.icon.as_deref(), Some("Castle"));
        assert_eq!(d.icon_color.as_deref(), Some("#123456"));
        assert!(tiles.iter().all(|t| t.data.is_default()));
    }

    #[test]
    fn off_grid_paint_is_noop() {
        let tiles = generate_radial(1);
        let b = brush(BrushMode::Brush, "#ff0000", None);
        assert_eq!(paint(&tiles, Hex::new(4, 0), &b), tiles);
        assert_eq!(bucket_fill(&tiles, Hex::new(4, 0), &b), tiles);
        assert_eq!(erase(&tiles, Hex::new(4, 0)), tiles);
    }

    #[test]
    fn erase_clears_appearance_but_keeps_links() {
        let tiles = generate_radial(1);
        let tiles = set_links(&tiles, Hex::ORIGIN, LinkKind::City, vec!["c1".to_string()]);
        let tiles = paint(&tiles, Hex::ORIGIN, &brush(BrushMode::Brush, "#00ff00", Some("Keep")));
        let out = apply(&tiles, Hex::ORIGIN, &BrushState {
            mode: BrushMode::Erase,
            ..BrushState::default()
        });
        let d = &tile_at(&out, Hex::ORIGIN).unwrap().data;
        assert!(d.color.is_none() && d.icon.is_none() && d.icon_color.is_none());
        assert!(d.city_ids.is_some());
    }

    #[test]
    fn bucket_on_uniform_grid_fills_everything() {
        for tiles in [generate_radial(5), generate_rectangular(9, 7)] {
            let start = tiles[tiles.len() / 3].hex;
            let out = bucket_fill(&tiles, start, &brush(BrushMode::Bucket, "#0000ff", None));
            assert!(out.iter().all(|t| t.data.color.as_deref() == Some("#0000ff")));
        }
    }

    #[test]
    fn bucket_stays_inside_its_region() {
        // A wall of red splits a 7x5 block into left and right halves.
        let mut tiles = generate_rectangular(7, 5);
        let wall = brush(BrushMode::Brush, "#ff0000", None);
        for row in 0..5 {
            let hex = Hex::new(3 - row / 2, row);
            tiles = paint(&tiles, hex, &wall);
        }
        let left = Hex::new(0, 0);
        let out = bucket_fill(&tiles, left, &brush(BrushMode::Bucket, "#00ff00", None));

        for (before, after) in tiles.iter().zip(&out) {
            let col = before.hex.q() + before.hex.r() / 2;
            let expected = if col < 3 {
                Some("#00ff00")
            } else {
                before.data.color.as_deref()
            };
            assert_eq!(after.data.color.as_deref(), expected, "at {}", before.hex);
        }
    }

    #[test]
    fn bucket_twice_is_noop_second_time() {
        let tiles = generate_radial(3);
        let tiles = paint(&tiles, Hex::ORIGIN, &brush(BrushMode::Brush, "#ff0000", None));
        let b = brush(BrushMode::Bucket, "#0000ff", None);
        let once = bucket_fill(&tiles, Hex::new(2, 0), &b);
        let twice = bucket_fill(&once, Hex::new(2, 0), &b);
        assert_eq!(once, twice);
    }

    #[test]
    fn bucket_matches_on_icon_too() {
        let tiles = generate_radial(1);
        let tiles = paint(&tiles, Hex::new(1, 0), &BrushState {
            color: None,
            ..brush(BrushMode::Brush, "", Some("Tree"))
        });
        let out = bucket_fill(&tiles, Hex::ORIGIN, &brush(BrushMode::Bucket, "#333333", None));
        assert_eq!(changed_count(&tiles, &out), 6);
        assert_eq!(color_at(&out, Hex::new(1, 0)), None);
    }

    #[test]
    fn eyedropper_samples_without_mutating() {
        let tiles = generate_radial(1);
        let src = BrushState {
            icon_color: Some("#abcdef".to_string()),
            ..brush(BrushMode::Brush, "#112233", Some("Skull"))
        };
        let tiles = paint(&tiles, Hex::new(0, -1), &src);
        let copy = tiles.clone();

        let current = brush(BrushMode::Bucket, "#ffffff", None);
        let sampled = eyedropper(&tiles, Hex::new(0, -1), &current);
        assert_eq!(tiles, copy);
        assert_eq!(sampled.mode, BrushMode::Bucket);
        assert_eq!(sampled.color.as_deref(), Some("#112233"));
        assert_eq!(sampled.icon.as_deref(), Some("Skull"));
        assert_eq!(sampled.icon_color.as_deref(), Some("#abcdef"));

        assert_eq!(eyedropper(&tiles, Hex::new(7, 7), &current), current);
    }

    #[test]
    fn contrast_follows_luminance() {
        assert_eq!(contrast_color("#ffffff"), "#000000");
        assert_eq!(contrast_color("#000"), "#ffffff");
        assert_eq!(contrast_color("#1e3a8a"), "#ffffff");
        assert_eq!(contrast_color("#ffeb3b"), "#000000");
        assert_eq!(contrast_color("not a color"), "#000000");

        let mut d = TileData {
            color: Some("#101010".to_string()),
            ..TileData::default()
        };
        assert_eq!(effective_icon_color(&d), "#ffffff");
        d.icon_color = Some("#ff00ff".to_string());
        assert_eq!(effective_icon_color(&d), "#ff00ff");
        assert_eq!(effective_icon_color(&TileData::default()), "#000000");
    }

    #[test]
    fn radius_two_scenario() {
        let tiles = generate_radial(2);
        assert_eq!(tiles.len(), 19);
        let tiles = apply(&tiles, Hex::ORIGIN, &brush(BrushMode::Brush, "#ff0000", Some("Home")));
        let out = apply(&tiles, Hex::new(1, 0), &brush(BrushMode::Bucket, "#0000ff", None));

        assert_eq!(changed_count(&tiles, &out), 18);
        let center = &tile_at(&out, Hex::ORIGIN).unwrap().data;
        assert_eq!(center.color.as_deref(), Some("#ff0000"));
        assert_eq!(center.icon.as_deref(), Some("Home"));
        assert_eq!(
            out.iter()
                .filter(|t| t.data.color.as_deref() == Some("#0000ff"))
                .count(),
            18
        );
    }
}
