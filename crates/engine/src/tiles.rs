//! Tile payload edits and the tile -> entity link policy.
//!
//! Links are stored one way, on the tile. Entity -> tiles lookups are built on
//! demand with [`LinkIndex`] instead of being maintained as back-references,
//! so deleting an entity or a map never leaves a dangling pointer behind.

use hexatlas_protocol::{Hex, HexTile, Id, LinkKind, TileData};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};

pub fn tile_at(tiles: &[HexTile], hex: Hex) -> Option<&HexTile> {
    tiles.iter().find(|t| t.hex == hex)
}

/// Returns a copy of `tiles` with `f` applied to the tile at `hex`.
/// Off-grid targets return an unchanged copy.
pub(crate) fn update_tile(
    tiles: &[HexTile],
    hex: Hex,
    f: impl FnOnce(&mut TileData),
) -> Vec<HexTile> {
    let mut out = tiles.to_vec();
    if let Some(t) = out.iter_mut().find(|t| t.hex == hex) {
        f(&mut t.data);
    }
    out
}

/// Replaces the whole payload of one tile.
pub fn set_tile_data(tiles: &[HexTile], hex: Hex, data: TileData) -> Vec<HexTile> {
    update_tile(tiles, hex, |d| *d = data)
}

/// Replaces the link set for `kind` on the tile at `hex`.
pub fn set_links(
    tiles: &[HexTile],
    hex: Hex,
    kind: LinkKind,
    ids: impl IntoIterator<Item = Id>,
) -> Vec<HexTile> {
    let ids: BTreeSet<Id> = ids.into_iter().filter(|id| !id.is_empty()).collect();
    update_tile(tiles, hex, |d| d.set_links(kind, ids))
}

/// Drops `kind` links whose ids are not in `live`. Callers run this after the
/// owning editor deletes entities; the engine never does it on its own.
pub fn prune_links(tiles: &[HexTile], kind: LinkKind, live: &HashSet<Id>) -> Vec<HexTile> {
    tiles
        .iter()
        .map(|t| {
            let mut t = t.clone();
            if let Some(ids) = t.data.links(kind) {
                let kept: BTreeSet<Id> = ids.iter().filter(|id| live.contains(*id)).cloned().collect();
                t.data.set_links(kind, kept);
            }
            t
        })
        .collect()
}

/// Reverse lookup from entity id to the tiles that link it, per link kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct LinkIndex {
    by_kind: BTreeMap<LinkKind, BTreeMap<Id, Vec<Hex>>>,
}

impl LinkIndex {
    pub fn build(tiles: &[HexTile]) -> Self {
        let mut by_kind: BTreeMap<LinkKind, BTreeMap<Id, Vec<Hex>>> = BTreeMap::new();
        for t in tiles {
            for kind in LinkKind::ALL {
                let Some(ids) = t.data.links(kind) else {
                    continue;
                };
                for id in ids {
                    by_kind
                        .entry(kind)
                        .or_default()
                        .entry(id.clone())
                        .or_default()
                        .push(t.hex);
                }
            }
        }
        Self { by_kind }
    }

    pub fn tiles_linked_to(&self, kind: LinkKind, id: &str) -> &[Hex] {
        self.by_kind
            .get(&kind)
            .and_then(|m| m.get(id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Entity ids of `kind` linked from at least one tile.
    pub fn entities(&self, kind: LinkKind) -> impl Iterator<Item = &str> {
        self.by_kind
            .get(&kind)
            .into_iter()
            .flat_map(|m| m.keys().map(String::as_str))
    }

    pub fn is_empty(&self) -> bool {
        self.by_kind.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::generate_radial;

    fn ids(v: &[&str]) -> Vec<Id> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn set_links_replaces_only_the_named_kind() {
        let tiles = generate_radial(1);
        let h = Hex::new(1, 0);
        let tiles = set_links(&tiles, h, LinkKind::Dungeon, ids(&["d1", "d2"]));
        let tiles = set_links(&tiles, h, LinkKind::City, ids(&["c1"]));
        let tiles = set_links(&tiles, h, LinkKind::Dungeon, ids(&["d3"]));

        let d = &tile_at(&tiles, h).unwrap().data;
        assert_eq!(d.dungeon_ids, Some(BTreeSet::from(["d3".to_string()])));
        assert_eq!(d.city_ids, Some(BTreeSet::from(["c1".to_string()])));
        assert!(d.faction_ids.is_none());
    }

    #[test]
    fn clearing_links_stores_absent() {
        let tiles = generate_radial(1);
        let tiles = set_links(&tiles, Hex::ORIGIN, LinkKind::Faction, ids(&["f1"]));
        let tiles = set_links(&tiles, Hex::ORIGIN, LinkKind::Faction, Vec::new());
        assert!(tile_at(&tiles, Hex::ORIGIN).unwrap().data.is_default());
    }

    #[test]
    fn off_grid_edits_are_noops() {
        let tiles = generate_radial(1);
        let out = set_links(&tiles, Hex::new(9, 9), LinkKind::City, ids(&["c1"]));
        assert_eq!(out, tiles);
        let data = TileData {
            color: Some("#fff".to_string()),
            ..TileData::default()
        };
        assert_eq!(set_tile_data(&tiles, Hex::new(-9, 0), data), tiles);
    }

    #[test]
    fn link_index_reverses_links() {
        let tiles = generate_radial(2);
        let tiles = set_links(&tiles, Hex::new(1, 0), LinkKind::Faction, ids(&["f1"]));
        let tiles = set_links(&tiles, Hex::new(-1, 1), LinkKind::Faction, ids(&["f1", "f2"]));
        let tiles = set_links(&tiles, Hex::new(0, 2), LinkKind::Event, ids(&["e1"]));

        let index = LinkIndex::build(&tiles);
        let mut f1 = index.tiles_linked_to(LinkKind::Faction, "f1").to_vec();
        f1.sort();
        assert_eq!(f1, vec![Hex::new(-1, 1), Hex::new(1, 0)]);
        assert_eq!(index.tiles_linked_to(LinkKind::Faction, "f2"), &[Hex::new(-1, 1)]);
        assert_eq!(index.tiles_linked_to(LinkKind::Event, "e1"), &[Hex::new(0, 2)]);
        assert!(index.tiles_linked_to(LinkKind::City, "f1").is_empty());
        assert_eq!(index.entities(LinkKind::Faction).count(), 2);

        let json = serde_json::to_value(&index).unwrap();
        assert_eq!(json["event"]["e1"][0]["q"], 0);
    }

    #[test]
    fn prune_drops_dead_ids_only() {
        let tiles = generate_radial(1);
        let tiles = set_links(&tiles, Hex::ORIGIN, LinkKind::Dungeon, ids(&["d1", "gone"]));
        let tiles = set_links(&tiles, Hex::new(0, 1), LinkKind::Dungeon, ids(&["gone"]));
        let tiles = set_links(&tiles, Hex::new(0, 1), LinkKind::City, ids(&["gone"]));

        let live = HashSet::from(["d1".to_string()]);
        let out = prune_links(&tiles, LinkKind::Dungeon, &live);
        assert_eq!(
            tile_at(&out, Hex::ORIGIN).unwrap().data.dungeon_ids,
            Some(BTreeSet::from(["d1".to_string()]))
        );
        let other = &tile_at(&out, Hex::new(0, 1)).unwrap().data;
        assert!(other.dungeon_ids.is_none());
        assert!(other.city_ids.is_some());
    }
}
