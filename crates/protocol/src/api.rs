//! Request and response bodies for the local HTTP API.

use crate::{BrushState, Hex, Id, Map, Point, ShapeParams};
use serde::{Deserialize, Serialize};

/// Shape as a client sends it. Sizes are signed so out-of-range values reach
/// validation instead of failing to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "lowercase")]
pub enum ShapeRequest {
    Radial { radius: i64 },
    Rectangular { width: i64, height: i64 },
}

impl From<ShapeParams> for ShapeRequest {
    fn from(shape: ShapeParams) -> Self {
        match shape {
            ShapeParams::Radial { radius } => Self::Radial {
                radius: i64::from(radius),
            },
            ShapeParams::Rectangular { width, height } => Self::Rectangular {
                width: i64::from(width),
                height: i64::from(height),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMapRequest {
    pub name: String,
    #[serde(flatten)]
    pub shape: ShapeRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameMapRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResizeRequest {
    #[serde(flatten)]
    pub shape: ShapeRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResizeResponse {
    pub map: Map,
    /// Tiles that fell outside the new bounds.
    pub dropped: usize,
    /// Dropped tiles that carried paint or links.
    pub dropped_with_data: usize,
}

/// Where a pointer interaction landed: either a hex directly, or a pixel
/// position plus hex size that the server resolves with `pixel_to_hex`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PaintTarget {
    Hex { hex: Hex },
    Pixel { point: Point, size: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaintRequest {
    #[serde(flatten)]
    pub target: PaintTarget,
    /// Replaces the session brush before painting when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brush: Option<BrushState>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaintResponse {
    pub map: Map,
    pub brush: BrushState,
    /// Number of tiles whose data changed.
    pub changed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EyedropperRequest {
    #[serde(flatten)]
    pub target: PaintTarget,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinksRequest {
    #[serde(default)]
    pub ids: Vec<Id>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapSummary {
    pub id: Id,
    pub name: String,
    #[serde(flatten)]
    pub shape: ShapeParams,
    pub tile_count: usize,
    pub path_count: usize,
    pub updated_at_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutosaveStatus {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// RFC 3339 timestamp of the attempt.
    pub at: String,
    pub generation: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub map_id: Id,
    pub generation: u64,
    pub persisted_generation: u64,
    pub dirty: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autosave: Option<AutosaveStatus>,
}
