//! Text wrapping and line placement.
//!
//! There is no shaping engine here: line breaks come from an average glyph
//! advance per script, which is close enough for short ad copy.

use crate::coordinates::PixelRect;
use crate::script::Script;

/// Smallest font size the layout will produce, in pixels.
pub const MIN_FONT_SIZE: f64 = 12.0;

/// Size-dependent measurements for one text element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextMetrics {
    /// Font size in output pixels.
    pub font_size: f64,
    /// Line pitch as a multiple of `font_size`.
    pub line_height: f64,
    /// Average glyph advance as a multiple of `font_size`.
    pub advance: f64,
}

impl TextMetrics {
    pub fn new(font_size: f64, line_height: f64, script: Script, bold: bool) -> Self {
        let advance = script.average_advance() + if bold { 0.05 } else { 0.0 };
        Self {
            font_size: font_size.max(MIN_FONT_SIZE),
            line_height: if line_height.is_finite() && line_height > 0.0 {
                line_height
            } else {
                1.2
            },
            advance,
        }
    }

    pub fn line_pitch(&self) -> f64 {
        self.font_size * self.line_height
    }

    /// How many glyphs fit in `width_px`. Never zero.
    pub fn chars_per_line(&self, width_px: u32) -> usize {
        let glyph = (self.font_size * self.advance).max(1.0);
        ((width_px as f64 / glyph).floor() as usize).max(1)
    }

    /// Estimated rendered width of `line`.
    pub fn estimate_width(&self, line: &str) -> f64 {
        line.chars().count() as f64 * self.font_size * self.advance
    }
}

/// Font size that fills a box of `box_height` with one line, for elements
/// that carry no explicit size.
pub fn auto_font_size(box_height: u32, line_height: f64) -> f64 {
    let pitch = if line_height > 0.0 { line_height } else { 1.2 };
    (box_height as f64 * 0.8 / pitch).max(MIN_FONT_SIZE)
}

/// Break `text` into lines no wider than `width_px`. Explicit newlines
/// are kept. Blank text yields no lines.
pub fn wrap_text(text: &str, width_px: u32, metrics: &TextMetrics) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let width = metrics.chars_per_line(width_px);
    textwrap::wrap(text.trim(), width)
        .into_iter()
        .map(|line| line.trim_end().to_string())
        .collect()
}

/// A positioned line of text.
#[derive(Debug, Clone, PartialEq)]
pub struct LineBox {
    pub text: String,
    /// Top of the line in canvas pixels.
    pub y: f64,
    pub estimated_width: f64,
}

/// Stack `lines` inside `rect`, vertically centred as a block. A block
/// taller than the box overflows evenly but never above the canvas top.
pub fn layout_lines(lines: &[String], rect: PixelRect, metrics: &TextMetrics) -> Vec<LineBox> {
    let pitch = metrics.line_pitch();
    let block = pitch * lines.len() as f64;
    let top = (rect.y as f64 + (rect.height as f64 - block) / 2.0).max(0.0);

    // Glyphs sit inside the pitch; centre the font box within each line.
    let inset = (pitch - metrics.font_size) / 2.0;

    lines
        .iter()
        .enumerate()
        .map(|(i, line)| LineBox {
            text: line.clone(),
            y: top + i as f64 * pitch + inset,
            estimated_width: metrics.estimate_width(line),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_respects_width() {
        let m = TextMetrics::new(20.0, 1.2, Script::Latin, false);
        // 11 px per glyph: 110 px fits 10 glyphs.
        let lines = wrap_text("The quick brown fox jumps over", 110, &m);
        assert!(lines.len() > 1);
        assert!(lines.iter().all(|l| l.chars().count() <= 10));
    }

    #[test]
    fn test_blank_text_has_no_lines() {
        let m = TextMetrics::new(20.0, 1.2, Script::Latin, false);
        assert!(wrap_text("   ", 300, &m).is_empty());
    }

    #[test]
    fn test_explicit_newlines_kept() {
        let m = TextMetrics::new(20.0, 1.2, Script::Latin, false);
        let lines = wrap_text("One\nTwo", 1000, &m);
        assert_eq!(lines, vec!["One".to_string(), "Two".to_string()]);
    }

    #[test]
    fn test_lines_are_vertically_centred() {
        let m = TextMetrics::new(20.0, 1.0, Script::Latin, false);
        let rect = PixelRect::new(0, 100, 200, 100);
        let boxes = layout_lines(&["a".to_string(), "b".to_string()], rect, &m);
        assert_eq!(boxes.len(), 2);
        assert!((boxes[0].y - 130.0).abs() < 1e-9);
        assert!((boxes[1].y - 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_overflow_never_above_canvas() {
        let m = TextMetrics::new(40.0, 1.5, Script::Latin, false);
        let rect = PixelRect::new(0, 0, 100, 10);
        let lines: Vec<String> = (0..5).map(|i| i.to_string()).collect();
        let boxes = layout_lines(&lines, rect, &m);
        assert!(boxes[0].y >= 0.0);
    }

    #[test]
    fn test_auto_font_size_has_floor() {
        assert!((auto_font_size(100, 1.0) - 80.0).abs() < 1e-9);
        assert!((auto_font_size(2, 1.2) - MIN_FONT_SIZE).abs() < 1e-9);
    }
}
