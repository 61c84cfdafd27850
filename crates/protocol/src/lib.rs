use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

pub mod api;

/// Fill used by the brush until the user picks something else.
pub const DEFAULT_BRUSH_COLOR: &str = "#4caf50";
pub const DEFAULT_PATH_COLOR: &str = "#ff0000";
pub const DEFAULT_PATH_STROKE_WIDTH: f64 = 3.0;

pub type Id = String;

/// Axial hex coordinate. `s` is stored alongside `q`/`r` and always equals `-q - r`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "HexRepr")]
pub struct Hex {
    q: i32,
    r: i32,
    s: i32,
}

#[derive(Deserialize)]
struct HexRepr {
    q: i32,
    r: i32,
    #[serde(default)]
    s: Option<i32>,
}

impl TryFrom<HexRepr> for Hex {
    type Error = HexParseError;

    fn try_from(v: HexRepr) -> Result<Self, Self::Error> {
        let hex = Hex::checked(v.q, v.r)?;
        match v.s {
            Some(s) if s != hex.s => Err(HexParseError::CubeConstraint {
                q: v.q,
                r: v.r,
                s,
            }),
            _ => Ok(hex),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HexParseError {
    #[error("hex key must look like \"q,r\", got {0:?}")]
    Malformed(String),
    #[error("q + r + s must be 0 (q={q}, r={r}, s={s})")]
    CubeConstraint { q: i32, r: i32, s: i32 },
    #[error("coordinate ({q}, {r}) is outside +/-{max}", max = Hex::MAX_COORD)]
    OutOfRange { q: i32, r: i32 },
}

impl Hex {
    pub const ORIGIN: Self = Self { q: 0, r: 0, s: 0 };

    /// Largest absolute `q`/`r` accepted from untrusted input.
    pub const MAX_COORD: i32 = 1_000_000;

    pub const fn new(q: i32, r: i32) -> Self {
        Self { q, r, s: -q - r }
    }

    /// Like [`Hex::new`], rejecting coordinates beyond [`Hex::MAX_COORD`].
    pub fn checked(q: i32, r: i32) -> Result<Self, HexParseError> {
        if q.unsigned_abs() > Self::MAX_COORD as u32 || r.unsigned_abs() > Self::MAX_COORD as u32 {
            return Err(HexParseError::OutOfRange { q, r });
        }
        Ok(Self::new(q, r))
    }

    pub const fn q(&self) -> i32 {
        self.q
    }

    pub const fn r(&self) -> i32 {
        self.r
    }

    pub const fn s(&self) -> i32 {
        self.s
    }

    /// Canonical map key, `"q,r"`.
    pub fn key(&self) -> String {
        format!("{},{}", self.q, self.r)
    }
}

impl fmt::Display for Hex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.q, self.r)
    }
}

impl FromStr for Hex {
    type Err = HexParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || HexParseError::Malformed(s.to_string());
        let (q, r) = s.split_once(',').ok_or_else(malformed)?;
        let q = q.trim().parse::<i32>().map_err(|_| malformed())?;
        let r = r.trim().parse::<i32>().map_err(|_| malformed())?;
        Hex::checked(q, r)
    }
}

impl std::ops::Add for Hex {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Hex::new(self.q + other.q, self.r + other.r)
    }
}

impl std::ops::Sub for Hex {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Hex::new(self.q - other.q, self.r - other.r)
    }
}

/// A position in the renderer's pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Kinds of external entity a tile can link to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    Dungeon,
    Faction,
    City,
    Event,
}

impl LinkKind {
    pub const ALL: [LinkKind; 4] = [
        LinkKind::Dungeon,
        LinkKind::Faction,
        LinkKind::City,
        LinkKind::Event,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LinkKind::Dungeon => "dungeon",
            LinkKind::Faction => "faction",
            LinkKind::City => "city",
            LinkKind::Event => "event",
        }
    }
}

/// Per-tile payload. Absent link sets mean "no links".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dungeon_ids: Option<BTreeSet<Id>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faction_ids: Option<BTreeSet<Id>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city_ids: Option<BTreeSet<Id>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_ids: Option<BTreeSet<Id>>,
}

impl TileData {
    pub fn links(&self, kind: LinkKind) -> Option<&BTreeSet<Id>> {
        match kind {
            LinkKind::Dungeon => self.dungeon_ids.as_ref(),
            LinkKind::Faction => self.faction_ids.as_ref(),
            LinkKind::City => self.city_ids.as_ref(),
            LinkKind::Event => self.event_ids.as_ref(),
        }
    }

    /// Replaces one link set. An empty set is stored as absent.
    pub fn set_links(&mut self, kind: LinkKind, ids: BTreeSet<Id>) {
        let slot = match kind {
            LinkKind::Dungeon => &mut self.dungeon_ids,
            LinkKind::Faction => &mut self.faction_ids,
            LinkKind::City => &mut self.city_ids,
            LinkKind::Event => &mut self.event_ids,
        };
        *slot = if ids.is_empty() { None } else { Some(ids) };
    }

    pub fn has_links(&self) -> bool {
        LinkKind::ALL
            .iter()
            .any(|k| self.links(*k).is_some_and(|ids| !ids.is_empty()))
    }

    /// `(color, icon)`: the pair flood fill compares.
    pub fn appearance(&self) -> (Option<&str>, Option<&str>) {
        (self.color.as_deref(), self.icon.as_deref())
    }

    pub fn clear_appearance(&mut self) {
        self.color = None;
        self.icon = None;
        self.icon_color = None;
    }

    pub fn is_default(&self) -> bool {
        self == &TileData::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HexTile {
    pub hex: Hex,
    #[serde(default)]
    pub data: TileData,
}

impl HexTile {
    pub fn new(hex: Hex) -> Self {
        Self {
            hex,
            data: TileData::default(),
        }
    }
}

/// Map shape and size. Flattened into the map document as `shape` plus
/// either `radius` or `width`/`height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "lowercase")]
pub enum ShapeParams {
    Radial { radius: u32 },
    Rectangular { width: u32, height: u32 },
}

impl ShapeParams {
    pub fn name(&self) -> &'static str {
        match self {
            ShapeParams::Radial { .. } => "radial",
            ShapeParams::Rectangular { .. } => "rectangular",
        }
    }

    /// Tile count the generator produces for these parameters.
    pub fn tile_count(&self) -> usize {
        match *self {
            ShapeParams::Radial { radius } => {
                let r = radius as usize;
                3 * r * (r + 1) + 1
            }
            ShapeParams::Rectangular { width, height } => width as usize * height as usize,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Path {
    pub id: Id,
    pub name: String,
    pub color: String,
    pub stroke_width: f64,
    #[serde(default)]
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Map {
    pub id: Id,
    pub name: String,
    #[serde(flatten)]
    pub shape: ShapeParams,
    pub tiles: Vec<HexTile>,
    #[serde(default)]
    pub paths: Vec<Path>,
}

/// A map that has not been assigned an id by the store yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMap {
    pub name: String,
    #[serde(flatten)]
    pub shape: ShapeParams,
    pub tiles: Vec<HexTile>,
    #[serde(default)]
    pub paths: Vec<Path>,
}

impl NewMap {
    pub fn with_id(self, id: impl Into<Id>) -> Map {
        Map {
            id: id.into(),
            name: self.name,
            shape: self.shape,
            tiles: self.tiles,
            paths: self.paths,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrushMode {
    Brush,
    Bucket,
    Erase,
}

impl Default for BrushMode {
    fn default() -> Self {
        Self::Brush
    }
}

/// Ephemeral paint-tool state held by the editing session.
///
/// `color: None` paints tiles back to the unset fill; `icon_color: None`
/// leaves icon color to the automatic contrast rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrushState {
    #[serde(default)]
    pub mode: BrushMode,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_color: Option<String>,
}

impl Default for BrushState {
    fn default() -> Self {
        Self {
            mode: BrushMode::Brush,
            color: Some(DEFAULT_BRUSH_COLOR.to_string()),
            icon: None,
            icon_color: None,
        }
    }
}

impl BrushState {
    pub fn appearance(&self) -> (Option<&str>, Option<&str>) {
        (self.color.as_deref(), self.icon.as_deref())
    }
}

/// `{id, name}` row supplied by the other compendium editors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: Id,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_key_round_trips_through_from_str() {
        let h = Hex::new(-3, 7);
        assert_eq!(h.key(), "-3,7");
        assert_eq!(h.s(), -4);
        assert_eq!(h.key().parse::<Hex>().unwrap(), h);
        assert!(" 2 , -1 ".parse::<Hex>().is_ok());
        assert!("2;1".parse::<Hex>().is_err());
        assert!("a,1".parse::<Hex>().is_err());
        assert!(matches!(
            "2147483647,1".parse::<Hex>(),
            Err(HexParseError::OutOfRange { .. })
        ));
    }

    #[test]
    fn hex_deserialize_rejects_broken_cube_constraint() {
        let ok: Hex = serde_json::from_str(r#"{"q":1,"r":2,"s":-3}"#).unwrap();
        assert_eq!(ok, Hex::new(1, 2));
        let no_s: Hex = serde_json::from_str(r#"{"q":1,"r":2}"#).unwrap();
        assert_eq!(no_s.s(), -3);
        assert!(serde_json::from_str::<Hex>(r#"{"q":1,"r":2,"s":0}"#).is_err());
    }

    #[test]
    fn map_shape_is_flattened() {
        let m = Map {
            id: "m1".to_string(),
            name: "World".to_string(),
            shape: ShapeParams::Rectangular {
                width: 3,
                height: 2,
            },
            tiles: vec![],
            paths: vec![],
        };
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v["shape"], "rectangular");
        assert_eq!(v["width"], 3);
        assert_eq!(v["height"], 2);
        assert!(v.get("radius").is_none());

        let back: Map = serde_json::from_value(serde_json::json!({
            "id": "m2", "name": "Disk", "shape": "radial", "radius": 4, "tiles": []
        }))
        .unwrap();
        assert_eq!(back.shape, ShapeParams::Radial { radius: 4 });
        assert!(back.paths.is_empty());
    }

    #[test]
    fn tile_data_uses_camel_case_and_drops_empty_links() {
        let mut d = TileData {
            icon_color: Some("#fff".to_string()),
            ..TileData::default()
        };
        d.set_links(LinkKind::City, BTreeSet::from(["c1".to_string()]));
        let v = serde_json::to_value(&d).unwrap();
        assert_eq!(v["iconColor"], "#fff");
        assert_eq!(v["cityIds"][0], "c1");
        assert!(d.has_links());

        d.set_links(LinkKind::City, BTreeSet::new());
        assert!(d.city_ids.is_none());
        assert!(!d.has_links());
    }

    #[test]
    fn shape_tile_counts() {
        assert_eq!(ShapeParams::Radial { radius: 2 }.tile_count(), 19);
        assert_eq!(
            ShapeParams::Rectangular {
                width: 4,
                height: 5
            }
            .tile_count(),
            20
        );
    }
}
