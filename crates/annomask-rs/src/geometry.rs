//! Geometry helpers over row-major binary masks.

use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use image::{ImageFormat, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::error::{MaskError, Result};
use crate::types::BoundingBox;

/// Default distance in pixels between interpolated stroke points.
pub const DEFAULT_INTERPOLATION_SPACING: f64 = 0.5;

/// Pointer position in image pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

/// RGBA fill color for rendering a mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct MaskColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl MaskColor {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        MaskColor { r, g, b, a }
    }
}

impl Default for MaskColor {
    fn default() -> Self {
        MaskColor::new(255, 0, 0, 128)
    }
}

/// Tightest box covering every foreground pixel, or `None` for a blank mask.
///
/// Only the first `width * height` bytes of `mask` are scanned.
pub fn compute_bounding_box_from_mask(mask: &[u8], width: u32, height: u32) -> Option<BoundingBox> {
    let w = width as usize;
    let n = w * (height as usize);
    if w == 0 {
        return None;
    }

    let mut min_x = usize::MAX;
    let mut max_x = 0usize;
    let mut min_y = usize::MAX;
    let mut max_y = 0usize;
    let mut found = false;

    for (row, line) in mask[..n.min(mask.len())].chunks(w).enumerate() {
        let Some(first) = line.iter().position(|&v| v != 0) else {
            continue;
        };
        // position() found a hit, so rposition() will too
        let last = line.iter().rposition(|&v| v != 0).unwrap_or(first);
        found = true;
        min_x = min_x.min(first);
        max_x = max_x.max(last);
        min_y = min_y.min(row);
        max_y = max_y.max(row);
    }

    if !found {
        return None;
    }

    Some(BoundingBox::new(
        min_x as u32,
        min_y as u32,
        (max_x - min_x + 1) as u32,
        (max_y - min_y + 1) as u32,
    ))
}

/// Render a mask as a PNG data URL: foreground pixels get `color`,
/// background pixels are fully transparent.
pub fn mask_to_data_url(mask: &[u8], width: u32, height: u32, color: MaskColor) -> Result<String> {
    let expected = (width as usize) * (height as usize);
    if mask.len() != expected {
        return Err(MaskError::MaskSizeMismatch {
            expected,
            got: mask.len(),
        });
    }

    let fill = Rgba([color.r, color.g, color.b, color.a]);
    let mut img = RgbaImage::new(width, height);
    for (px, &v) in img.pixels_mut().zip(mask) {
        if v != 0 {
            *px = fill;
        }
    }

    let mut png = Cursor::new(Vec::new());
    img.write_to(&mut png, ImageFormat::Png)?;
    Ok(format!("data:image/png;base64,{}", B64.encode(png.into_inner())))
}

/// Evenly spaced points from `from` (exclusive) to `to` (inclusive), at most
/// `spacing` pixels apart.
///
/// The last point is always exactly `to`. A zero-length segment yields `[to]`.
/// A non-positive or non-finite `spacing` falls back to
/// [`DEFAULT_INTERPOLATION_SPACING`].
pub fn interpolate_line_between_points(from: Point, to: Point, spacing: f64) -> Vec<Point> {
    line_points(from, to, spacing).collect()
}

/// Lazy form of [`interpolate_line_between_points`].
pub fn line_points(from: Point, to: Point, spacing: f64) -> impl Iterator<Item = Point> {
    let spacing = if spacing.is_finite() && spacing > 0.0 {
        spacing
    } else {
        DEFAULT_INTERPOLATION_SPACING
    };

    let distance = from.distance_to(&to);
    let steps = ((distance / spacing).ceil() as usize).max(1);
    let dx = to.x - from.x;
    let dy = to.y - from.y;

    (1..=steps).map(move |i| {
        if i == steps {
            return to;
        }
        let t = i as f64;
        Point::new(
            from.x + dx * t / steps as f64,
            from.y + dy * t / steps as f64,
        )
    })
}

/// Part of the segment `from`..`to` inside the rectangle `[min, max]`, or
/// `None` when the segment misses it.
pub fn clip_segment(from: Point, to: Point, min: Point, max: Point) -> Option<(Point, Point)> {
    let dx = to.x - from.x;
    let dy = to.y - from.y;
    let mut t0 = 0.0_f64;
    let mut t1 = 1.0_f64;

    for (p, q) in [
        (-dx, from.x - min.x),
        (dx, max.x - from.x),
        (-dy, from.y - min.y),
        (dy, max.y - from.y),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }

    let at = |t: f64| Point::new(from.x + dx * t, from.y + dy * t);
    let start = if t0 > 0.0 { at(t0) } else { from };
    let end = if t1 < 1.0 { at(t1) } else { to };
    Some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_points_is_lazy() {
        let mut points = line_points(Point::new(0.0, 0.0), Point::new(1e15, 0.0), 0.5);
        assert_eq!(points.next(), Some(Point::new(0.5, 0.0)));
        assert_eq!(points.next(), Some(Point::new(1.0, 0.0)));
    }

    fn assert_close(a: Point, b: Point) {
        assert!(a.distance_to(&b) < 1e-9, "{a:?} != {b:?}");
    }

    #[test]
    fn test_clip_segment() {
        let min = Point::new(-1.0, -1.0);
        let max = Point::new(4.0, 4.0);
        // fully inside
        let (a, b) = (Point::new(0.0, 0.0), Point::new(3.0, 2.0));
        assert_eq!(clip_segment(a, b, min, max), Some((a, b)));

        // far endpoint cut at the right edge
        let (start, end) =
            clip_segment(Point::new(0.0, 1.0), Point::new(2e11, 1.0), min, max).unwrap();
        assert_eq!(start, Point::new(0.0, 1.0));
        assert_close(end, Point::new(4.0, 1.0));

        // entering from the left
        let (start, end) =
            clip_segment(Point::new(-9.0, 2.0), Point::new(1.0, 2.0), min, max).unwrap();
        assert_close(start, Point::new(-1.0, 2.0));
        assert_eq!(end, Point::new(1.0, 2.0));

        // passing beside the rectangle
        assert_eq!(
            clip_segment(Point::new(-5.0, 10.0), Point::new(10.0, 10.0), min, max),
            None
        );
        assert_eq!(
            clip_segment(Point::new(-5.0, 10.0), Point::new(10.0, 6.0), min, max),
            None
        );
    }

    #[test]
    fn test_bbox_single_pixel() {
        // 4 wide, 3 tall, foreground at row 1, col 2
        let mut mask = vec![0u8; 12];
        mask[4 + 2] = 1;
        assert_eq!(
            compute_bounding_box_from_mask(&mask, 4, 3),
            Some(BoundingBox::new(2, 1, 1, 1))
        );
    }

    #[test]
    fn test_bbox_spanning_rows() {
        let mask = [
            0, 0, 0, 0, //
            0, 1, 0, 0, //
            0, 0, 0, 1, //
        ];
        assert_eq!(
            compute_bounding_box_from_mask(&mask, 4, 3),
            Some(BoundingBox::new(1, 1, 3, 2))
        );
    }

    #[test]
    fn test_bbox_blank_is_none() {
        assert_eq!(compute_bounding_box_from_mask(&[0u8; 12], 4, 3), None);
        assert_eq!(compute_bounding_box_from_mask(&[], 0, 0), None);
    }

    #[test]
    fn test_data_url_prefix() {
        let url = mask_to_data_url(&[0, 1, 1, 0], 2, 2, MaskColor::default()).unwrap();
        assert!(url.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn test_data_url_pixels() {
        let color = MaskColor::new(10, 20, 30, 40);
        let mask = [1, 0, 0, 1];
        let url = mask_to_data_url(&mask, 2, 2, color).unwrap();
        let payload = url.trim_start_matches("data:image/png;base64,");
        let bytes = B64.decode(payload).unwrap();
        let img = image::load_from_memory_with_format(&bytes, ImageFormat::Png)
            .unwrap()
            .to_rgba8();
        assert_eq!(img.dimensions(), (2, 2));
        assert_eq!(img.get_pixel(0, 0), &Rgba([10, 20, 30, 40]));
        assert_eq!(img.get_pixel(1, 0), &Rgba([0, 0, 0, 0]));
        assert_eq!(img.get_pixel(0, 1), &Rgba([0, 0, 0, 0]));
        assert_eq!(img.get_pixel(1, 1), &Rgba([10, 20, 30, 40]));
    }

    #[test]
    fn test_data_url_size_mismatch() {
        let err = mask_to_data_url(&[0, 1, 1], 2, 2, MaskColor::default()).unwrap_err();
        assert!(matches!(err, MaskError::MaskSizeMismatch { expected: 4, got: 3 }));
    }

    #[test]
    fn test_interpolate_3_4_5() {
        let points = interpolate_line_between_points(
            Point::new(0.0, 0.0),
            Point::new(3.0, 4.0),
            DEFAULT_INTERPOLATION_SPACING,
        );
        assert_eq!(points.len(), 10);
        assert!((points[0].x - 0.3).abs() < 1e-12);
        assert!((points[0].y - 0.4).abs() < 1e-12);
        assert_eq!(points[9], Point::new(3.0, 4.0));
    }

    #[test]
    fn test_interpolate_points_are_evenly_spaced() {
        let from = Point::new(1.0, 1.0);
        let to = Point::new(8.0, 1.0);
        let points = interpolate_line_between_points(from, to, 1.0);
        assert_eq!(points.len(), 7);
        let mut prev = from;
        for p in &points {
            assert!((prev.distance_to(p) - 1.0).abs() < 1e-9);
            prev = *p;
        }
    }

    #[test]
    fn test_interpolate_last_point_exact_on_awkward_segment() {
        let from = Point::new(0.1, 0.7);
        let to = Point::new(13.37, -2.9);
        let points = interpolate_line_between_points(from, to, 0.3);
        assert_eq!(*points.last().unwrap(), to);
        for pair in points.windows(2) {
            assert!(pair[0].distance_to(&pair[1]) <= 0.3 + 1e-9);
        }
    }

    #[test]
    fn test_interpolate_zero_length() {
        let p = Point::new(2.0, 2.0);
        assert_eq!(interpolate_line_between_points(p, p, 0.5), vec![p]);
    }

    #[test]
    fn test_interpolate_bad_spacing_uses_default() {
        let points =
            interpolate_line_between_points(Point::new(0.0, 0.0), Point::new(3.0, 4.0), 0.0);
        assert_eq!(points.len(), 10);
    }
}
