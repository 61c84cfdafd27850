//! Axial hex math for a pointy-top layout.
//!
//! `axial_to_pixel` and `pixel_to_hex` are the only placement functions a
//! renderer needs; hit-testing and paint targeting both go through them.

use hexatlas_protocol::{Hex, Point};

const SQRT_3: f64 = 1.732_050_807_568_877_2;

/// Neighbor offsets in fixed order: E, NE, NW, W, SW, SE.
pub const DIRECTIONS: [Hex; 6] = [
    Hex::new(1, 0),
    Hex::new(1, -1),
    Hex::new(0, -1),
    Hex::new(-1, 0),
    Hex::new(-1, 1),
    Hex::new(0, 1),
];

pub fn neighbors(hex: Hex) -> [Hex; 6] {
    DIRECTIONS.map(|d| hex + d)
}

/// Cube distance: number of steps between two hexes.
pub fn distance(a: Hex, b: Hex) -> u32 {
    let d = a - b;
    d.q()
        .unsigned_abs()
        .max(d.r().unsigned_abs())
        .max(d.s().unsigned_abs())
}

/// Every hex within `n` steps of `center`, q-major order.
pub fn range(center: Hex, n: u32) -> Vec<Hex> {
    let n = n as i32;
    let mut out = Vec::new();
    for dq in -n..=n {
        for dr in (-n).max(-dq - n)..=n.min(-dq + n) {
            out.push(center + Hex::new(dq, dr));
        }
    }
    out
}

/// Hexes exactly `n` steps from `center`, starting from the SW corner.
pub fn ring(center: Hex, n: u32) -> Vec<Hex> {
    if n == 0 {
        return vec![center];
    }
    let mut out = Vec::with_capacity(6 * n as usize);
    let mut cur = center;
    let sw = DIRECTIONS[4];
    for _ in 0..n {
        cur = cur + sw;
    }
    for dir in DIRECTIONS {
        for _ in 0..n {
            out.push(cur);
            cur = cur + dir;
        }
    }
    out
}

/// Center of `hex` in pixel space, origin at hex (0,0).
pub fn axial_to_pixel(hex: Hex, size: f64) -> Point {
    let q = f64::from(hex.q());
    let r = f64::from(hex.r());
    Point {
        x: size * SQRT_3 * (q + r / 2.0),
        y: size * 1.5 * r,
    }
}

/// Hex containing `point`. Total: boundary points resolve deterministically,
/// a non-positive or non-finite `size` maps everything to the origin, and
/// coordinates are clamped to [`Hex::MAX_COORD`].
pub fn pixel_to_hex(point: Point, size: f64) -> Hex {
    if size <= 0.0 || !size.is_finite() || !point.x.is_finite() || !point.y.is_finite() {
        return Hex::ORIGIN;
    }
    let q = (SQRT_3 / 3.0 * point.x - point.y / 3.0) / size;
    let r = (2.0 / 3.0 * point.y) / size;
    cube_round(q, r)
}

/// Rounds fractional axial coordinates, repairing the component with the
/// largest rounding error so `q + r + s == 0` holds exactly.
pub fn cube_round(q: f64, r: f64) -> Hex {
    let s = -q - r;
    let mut rq = q.round();
    let mut rr = r.round();
    let rs = s.round();

    let dq = (rq - q).abs();
    let dr = (rr - r).abs();
    let ds = (rs - s).abs();

    if dq > dr && dq > ds {
        rq = -rr - rs;
    } else if dr > ds {
        rr = -rq - rs;
    }
    // Far-away points land on the bounding hex ring; no grid reaches it.
    let limit = f64::from(Hex::MAX_COORD);
    Hex::new(rq.clamp(-limit, limit) as i32, rr.clamp(-limit, limit) as i32)
}

/// Outline of `hex`, starting at the upper-right corner and going clockwise.
pub fn hex_corners(hex: Hex, size: f64) -> [Point; 6] {
    let c = axial_to_pixel(hex, size);
    std::array::from_fn(|i| {
        let angle = (60.0 * i as f64 - 30.0).to_radians();
        Point {
            x: c.x + size * angle.cos(),
            y: c.y + size * angle.sin(),
        }
    })
}

/// Hex size plus the pixel position of hex (0,0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Layout {
    pub size: f64,
    pub origin: Point,
}

impl Layout {
    pub fn new(size: f64, origin: Point) -> Self {
        Self { size, origin }
    }

    pub fn to_pixel(&self, hex: Hex) -> Point {
        let p = axial_to_pixel(hex, self.size);
        Point::new(p.x + self.origin.x, p.y + self.origin.y)
    }

    pub fn to_hex(&self, point: Point) -> Hex {
        pixel_to_hex(
            Point::new(point.x - self.origin.x, point.y - self.origin.y),
            self.size,
        )
    }
}
