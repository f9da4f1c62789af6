//! Brush painting: disks stamped along interpolated pointer strokes.

use serde::{Deserialize, Serialize};

use crate::geometry::{clip_segment, line_points, Point};
use crate::mask::PixelMask;
use crate::params::EditorParams;
use crate::types::BoundingBox;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BrushMode {
    #[default]
    Paint,
    Erase,
}

impl BrushMode {
    fn value(self) -> bool {
        matches!(self, BrushMode::Paint)
    }
}

/// Pixel rectangle `[x0, x1] x [y0, y1]` covered by a disk, clipped to the mask.
fn disk_extent(mask: &PixelMask, center: Point, radius: f64) -> Option<(u32, u32, u32, u32)> {
    let w = mask.width() as i64;
    let h = mask.height() as i64;
    if w == 0 || h == 0 {
        return None;
    }
    let x0 = ((center.x - radius).floor() as i64).max(0);
    let y0 = ((center.y - radius).floor() as i64).max(0);
    let x1 = ((center.x + radius).ceil() as i64).min(w - 1);
    let y1 = ((center.y + radius).ceil() as i64).min(h - 1);
    if x0 > x1 || y0 > y1 {
        return None;
    }
    Some((x0 as u32, y0 as u32, x1 as u32, y1 as u32))
}

fn stamp(
    mask: &mut PixelMask,
    center: Point,
    radius: f64,
    mode: BrushMode,
) -> (usize, Option<BoundingBox>) {
    let on = mode.value();

    if radius.is_nan() || radius <= 0.0 || !center.x.is_finite() || !center.y.is_finite() {
        return (0, None);
    }
    if radius < 0.5 {
        let (x, y) = (center.x.round(), center.y.round());
        if x < 0.0 || y < 0.0 {
            return (0, None);
        }
        let (x, y) = (x as u32, y as u32);
        return if mask.set(x, y, on) {
            (1, Some(BoundingBox::new(x, y, 1, 1)))
        } else {
            (0, None)
        };
    }

    let Some((x0, y0, x1, y1)) = disk_extent(mask, center, radius) else {
        return (0, None);
    };

    let r2 = radius * radius;
    let mut changed = 0;
    for y in y0..=y1 {
        let dy = y as f64 - center.y;
        for x in x0..=x1 {
            let dx = x as f64 - center.x;
            if dx * dx + dy * dy <= r2 && mask.set(x, y, on) {
                changed += 1;
            }
        }
    }

    let dirty = (changed > 0).then(|| BoundingBox::new(x0, y0, x1 - x0 + 1, y1 - y0 + 1));
    (changed, dirty)
}

/// Paint or erase every pixel within `radius` of `center`, clipped to the
/// mask. Returns the number of pixels whose value changed.
///
/// Radii below half a pixel touch only the pixel nearest to `center`; a zero,
/// negative or NaN radius touches nothing.
pub fn stamp_disk(mask: &mut PixelMask, center: Point, radius: f64, mode: BrushMode) -> usize {
    stamp(mask, center, radius, mode).0
}

/// Finest stamp spacing a stroke will use.
const MIN_STROKE_SPACING: f64 = 0.01;

/// A single pointer-down .. pointer-up gesture.
///
/// Pointer samples arrive sparsely; each new sample is joined to the previous
/// one by interpolated stamps so fast movement leaves no gaps.
#[derive(Debug, Clone)]
pub struct BrushStroke {
    radius: f64,
    mode: BrushMode,
    spacing: f64,
    last: Option<Point>,
    changed: usize,
    dirty: Option<BoundingBox>,
}

impl BrushStroke {
    /// A positive `spacing` is floored at 0.01 px.
    pub fn new(radius: f64, mode: BrushMode, spacing: f64) -> Self {
        BrushStroke {
            radius,
            mode,
            spacing: if spacing > 0.0 {
                spacing.max(MIN_STROKE_SPACING)
            } else {
                spacing
            },
            last: None,
            changed: 0,
            dirty: None,
        }
    }

    pub fn from_params(params: &EditorParams, mode: BrushMode) -> Self {
        Self::new(params.brush_radius, mode, params.interpolation_spacing)
    }

    fn apply(&mut self, mask: &mut PixelMask, point: Point) -> usize {
        let (changed, dirty) = stamp(mask, point, self.radius, self.mode);
        self.changed += changed;
        if let Some(d) = dirty {
            self.dirty = Some(match self.dirty {
                Some(prev) => prev.union(&d),
                None => d,
            });
        }
        changed
    }

    /// Start the stroke with a stamp at `point`.
    pub fn begin(&mut self, mask: &mut PixelMask, point: Point) -> usize {
        self.last = Some(point);
        self.apply(mask, point)
    }

    /// Continue the stroke to `point`. Starts it if `begin` was never called.
    ///
    /// Only the part of the segment that can reach the mask is stamped, so
    /// samples far outside the image cost nothing. Non-finite samples are
    /// ignored.
    pub fn extend_to(&mut self, mask: &mut PixelMask, point: Point) -> usize {
        if !point.x.is_finite() || !point.y.is_finite() {
            return 0;
        }
        let Some(from) = self.last else {
            return self.begin(mask, point);
        };
        self.last = Some(point);

        let Some((start, end)) = clip_segment(from, point, self.reach_min(), self.reach_max(mask))
        else {
            return 0;
        };
        let mut changed = 0;
        for p in line_points(start, end, self.spacing) {
            changed += self.apply(mask, p);
        }
        changed
    }

    // Stamps centered outside [reach_min, reach_max] cannot touch the mask.
    fn reach_min(&self) -> Point {
        let margin = self.radius.max(0.0) + 1.0;
        Point::new(-margin, -margin)
    }

    fn reach_max(&self, mask: &PixelMask) -> Point {
        let margin = self.radius.max(0.0) + 1.0;
        Point::new(
            mask.width() as f64 + margin,
            mask.height() as f64 + margin,
        )
    }

    /// Total pixels changed so far by this stroke.
    pub fn changed_pixels(&self) -> usize {
        self.changed
    }

    /// Region touched by stamps that changed at least one pixel.
    pub fn dirty_region(&self) -> Option<BoundingBox> {
        self.dirty
    }
}

/// Stamp a whole polyline of pointer samples. Returns the number of pixels changed.
pub fn paint_stroke(
    mask: &mut PixelMask,
    points: &[Point],
    radius: f64,
    mode: BrushMode,
    spacing: f64,
) -> usize {
    let mut stroke = BrushStroke::new(radius, mode, spacing);
    for &p in points {
        stroke.extend_to(mask, p);
    }
    stroke.changed_pixels()
}
