//! Format-aware coordinate transforms.
//!
//! Elements are authored on the 9:16 canvas. When the same scene is
//! rendered at another aspect ratio the raw percentages would push text to
//! the edges, so each format applies a small fixed correction: vertical
//! positions are pulled towards the middle, wide canvases get narrower and
//! taller boxes. All values stay in percent until [`to_pixels`].

use adforge_scene_model::{AspectFormat, Geometry};
use serde::{Deserialize, Serialize};

/// Per-format correction. `y' = y_offset + y_scale * y`, width scaled
/// around the element centre, height scaled from the top edge.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Adjustment {
    y_offset: f64,
    y_scale: f64,
    width_scale: f64,
    height_scale: f64,
}

impl Adjustment {
    fn for_format(format: &AspectFormat) -> Option<Self> {
        match format {
            AspectFormat::Portrait => None,
            AspectFormat::Landscape => Some(Self {
                y_offset: 10.0,
                y_scale: 0.8,
                width_scale: 0.85,
                height_scale: 1.2,
            }),
            AspectFormat::Square => Some(Self {
                y_offset: 5.0,
                y_scale: 0.9,
                width_scale: 0.95,
                height_scale: 1.1,
            }),
            AspectFormat::Feed => Some(Self {
                y_offset: 2.5,
                y_scale: 0.95,
                width_scale: 1.0,
                height_scale: 1.05,
            }),
            AspectFormat::Unrecognized(_) => None,
        }
    }
}

/// Re-fit a 9:16-authored box to `format`.
///
/// The result depends only on the input box and the format, and always
/// satisfies `0 <= x`, `0 <= y`, `x + width <= 100`, `y + height <= 100`.
/// The 9:16 baseline is returned unchanged (clamping aside).
pub fn transform(geometry: Geometry, format: &AspectFormat) -> Geometry {
    if let AspectFormat::Unrecognized(raw) = format {
        tracing::warn!(format = %raw, "Unknown aspect format, keeping element coordinates");
        return clamp(geometry);
    }

    let Some(adj) = Adjustment::for_format(format) else {
        return clamp(geometry);
    };

    let width = geometry.width * adj.width_scale;
    let x = geometry.center_x() - width / 2.0;
    let y = adj.y_offset + adj.y_scale * geometry.y;
    let height = geometry.height * adj.height_scale;

    clamp(Geometry::new(x, y, width, height))
}

/// Force a box into the 0–100 square.
fn clamp(g: Geometry) -> Geometry {
    let sanitize = |v: f64| if v.is_finite() { v } else { 0.0 };
    let width = sanitize(g.width).clamp(0.0, 100.0);
    let height = sanitize(g.height).clamp(0.0, 100.0);
    let x = sanitize(g.x).clamp(0.0, 100.0 - width);
    let y = sanitize(g.y).clamp(0.0, 100.0 - height);
    Geometry::new(x, y, width, height)
}

/// A box in output pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn center_x(&self) -> u32 {
        self.x + self.width / 2
    }

    pub fn center_y(&self) -> u32 {
        self.y + self.height / 2
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Convert a percentage box to pixels on a `canvas_w` x `canvas_h` canvas.
/// Rounded, never negative, never past the canvas edge.
pub fn to_pixels(geometry: Geometry, canvas_w: u32, canvas_h: u32) -> PixelRect {
    let g = clamp(geometry);
    let px = |pct: f64, dim: u32| ((pct / 100.0) * dim as f64).round().max(0.0) as u32;

    let x = px(g.x, canvas_w).min(canvas_w);
    let y = px(g.y, canvas_h).min(canvas_h);
    let width = px(g.width, canvas_w).min(canvas_w - x);
    let height = px(g.height, canvas_h).min(canvas_h - y);
    PixelRect::new(x, y, width, height)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_portrait_is_identity() {
        let g = Geometry::new(12.5, 30.0, 40.0, 10.0);
        assert_eq!(transform(g, &AspectFormat::Portrait), g);
    }

    #[test]
    fn test_landscape_adjustment() {
        let g = Geometry::new(10.0, 50.0, 80.0, 10.0);
        let t = transform(g, &AspectFormat::Landscape);
        assert!(approx(t.y, 50.0));
        assert!(approx(t.width, 68.0));
        assert!(approx(t.center_x(), g.center_x()));
        assert!(approx(t.height, 12.0));
    }

    #[test]
    fn test_square_and_feed_adjustment() {
        let g = Geometry::new(0.0, 20.0, 100.0, 20.0);
        let sq = transform(g, &AspectFormat::Square);
        assert!(approx(sq.y, 23.0));
        assert!(approx(sq.width, 95.0));
        assert!(approx(sq.height, 22.0));

        let feed = transform(g, &AspectFormat::Feed);
        assert!(approx(feed.y, 21.5));
        assert!(approx(feed.width, 100.0));
        assert!(approx(feed.height, 21.0));
    }

    #[test]
    fn test_results_are_clamped() {
        let g = Geometry::new(-5.0, 95.0, 120.0, 30.0);
        for format in AspectFormat::ALL {
            let t = transform(g, &format);
            assert!(t.x >= 0.0 && t.y >= 0.0);
            assert!(t.x + t.width <= 100.0 + 1e-9);
            assert!(t.y + t.height <= 100.0 + 1e-9);
        }
    }

    #[test]
    fn test_unknown_format_passes_through() {
        let g = Geometry::new(10.0, 10.0, 20.0, 20.0);
        let t = transform(g, &AspectFormat::Unrecognized("3:2".into()));
        assert_eq!(t, g);
    }

    #[test]
    fn test_to_pixels_rounds_and_clamps() {
        let rect = to_pixels(Geometry::new(50.0, 25.0, 25.0, 10.0), 768, 1344);
        assert_eq!(rect, PixelRect::new(384, 336, 192, 134));

        let rect = to_pixels(Geometry::new(90.0, 99.9, 50.0, 50.0), 1024, 1024);
        assert!(rect.right() <= 1024);
        assert!(rect.bottom() <= 1024);
    }
}
