use serde::{Deserialize, Serialize};

/// Regions wider than this get the loose containment tolerance.
pub const WIDE_REGION_PX: f32 = 300.0;
pub const WIDE_TOLERANCE_PX: f32 = 10.0;
pub const NARROW_TOLERANCE_PX: f32 = 3.0;

/// Axis-aligned box with a top-left origin, serialized as `[x1, y1, x2, y2]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl From<[f32; 4]> for BBox {
    fn from(value: [f32; 4]) -> Self {
        BBox::new(value[0], value[1], value[2], value[3])
    }
}

impl From<BBox> for [f32; 4] {
    fn from(value: BBox) -> Self {
        [value.x1, value.y1, value.x2, value.y2]
    }
}

impl BBox {
    pub const fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) * 0.5, (self.y1 + self.y2) * 0.5)
    }

    pub fn is_valid(&self) -> bool {
        [self.x1, self.y1, self.x2, self.y2]
            .iter()
            .all(|value| value.is_finite())
            && self.x2 >= self.x1
            && self.y2 >= self.y1
    }

    /// Grows the box by `dx` on the left and right and `dy` on top and bottom.
    pub fn pad(&self, dx: f32, dy: f32) -> BBox {
        BBox::new(self.x1 - dx, self.y1 - dy, self.x2 + dx, self.y2 + dy)
    }
}

/// Containment slack for a detected region; detector error grows with region size.
pub fn adaptive_tolerance(region: &BBox) -> f32 {
    if region.width() > WIDE_REGION_PX {
        WIDE_TOLERANCE_PX
    } else {
        NARROW_TOLERANCE_PX
    }
}

/// Whether `inner` lies within `outer` grown by `tolerance` on every side.
pub fn is_inside(outer: &BBox, inner: &BBox, tolerance: f32) -> bool {
    inner.x1 >= outer.x1 - tolerance
        && inner.y1 >= outer.y1 - tolerance
        && inner.x2 <= outer.x2 + tolerance
        && inner.y2 <= outer.y2 + tolerance
}

/// Whether the center point of `inner` falls inside `region` (adaptive tolerance).
pub fn center_inside(region: &BBox, inner: &BBox) -> bool {
    let (cx, cy) = inner.center();
    is_inside(region, &BBox::new(cx, cy, cx, cy), adaptive_tolerance(region))
}

/// Strict intersection test; shared edges are not an overlap.
pub fn overlaps(a: &BBox, b: &BBox) -> bool {
    if a.x2 <= b.x1 || a.x1 >= b.x2 {
        return false;
    }
    if a.y2 <= b.y1 || a.y1 >= b.y2 {
        return false;
    }
    true
}

/// Maps a box between raster and point space with per-axis factors.
pub fn scale(bbox: &BBox, sx: f32, sy: f32) -> BBox {
    BBox::new(bbox.x1 * sx, bbox.y1 * sy, bbox.x2 * sx, bbox.y2 * sy)
}

/// Whether two boxes share any vertical extent, i.e. sit on the same text line.
pub(crate) fn same_line(a: &BBox, b: &BBox) -> bool {
    a.y1.max(b.y1) < a.y2.min(b.y2)
}
