//! Element rendering.
//!
//! Turns one typed [`Element`] into filter fragments: `drawbox`/`drawtext`
//! nodes painted straight onto the scene, or a [`PendingOverlay`] that the
//! renderer resolves into a real image input later.

use std::sync::Arc;

use adforge_layout::text::{auto_font_size, MIN_FONT_SIZE};
use adforge_layout::{
    detect_script, layout_lines, to_pixels, transform, wrap_text, Color, PixelRect, TextMetrics,
};
use adforge_scene_model::{
    AspectFormat, CtaStyle, CtaVariant, Element, ElementKind, LogoSource, Shadow, ShapeKind,
    ShapeStyle, TextAlign, TextStyle,
};

use crate::filter::{FilterNode, Thickness};
use crate::fonts::{FontRequest, FontResolver, FontSelection};

/// Canvas short edge the request's pixel sizes are authored against.
const BASELINE_SHORT_EDGE: f64 = 768.0;

/// Segments per triangle edge.
const MAX_EDGE_SEGMENTS: usize = 40;

const WAVEFORM: [f64; 9] = [0.3, 0.6, 0.9, 0.5, 1.0, 0.7, 0.4, 0.8, 0.35];

/// An image element waiting for its media to be downloaded.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingOverlay {
    pub element_id: String,
    pub rect: PixelRect,
    pub opacity: f64,
    /// URLs in lookup priority order.
    pub candidates: Vec<String>,
    pub label: Option<String>,
}

impl PendingOverlay {
    /// Drawn instead of the image when no candidate can be fetched.
    pub fn placeholder(&self) -> FilterNode {
        FilterNode::drawbox(
            self.rect.x as i64,
            self.rect.y as i64,
            self.rect.width,
            self.rect.height,
            &Color::GRAY.with_opacity(self.opacity).to_ffmpeg(),
            Thickness::Fill,
        )
    }
}

/// Output of rendering one element, in paint order.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterFragment {
    Draw(FilterNode),
    Overlay(PendingOverlay),
}

impl FilterFragment {
    pub fn as_draw(&self) -> Option<&FilterNode> {
        match self {
            FilterFragment::Draw(node) => Some(node),
            FilterFragment::Overlay(_) => None,
        }
    }
}

fn draws(nodes: Vec<FilterNode>) -> Vec<FilterFragment> {
    nodes.into_iter().map(FilterFragment::Draw).collect()
}

fn color_or(raw: &str, fallback: Color) -> Color {
    Color::parse(raw).unwrap_or_else(|| {
        tracing::warn!(color = raw, fallback = %fallback, "Unrecognized colour");
        fallback
    })
}

fn filled(x: i64, y: i64, w: u32, h: u32, color: Color) -> FilterNode {
    FilterNode::drawbox(x, y, w, h, &color.to_ffmpeg(), Thickness::Fill)
}

/// One block of text to lay out and draw.
struct TextRun<'a> {
    text: &'a str,
    family: &'a str,
    weight: u16,
    italic: bool,
    color: Color,
    align: TextAlign,
    underline: bool,
    strikethrough: bool,
    line_height: f64,
    shadow: Option<(&'a Shadow, f64)>,
    font_px: f64,
}

/// Renders elements for one canvas size.
pub struct ElementRenderer {
    fonts: Arc<FontResolver>,
}

impl ElementRenderer {
    pub fn new(fonts: Arc<FontResolver>) -> Self {
        Self { fonts }
    }

    pub fn fonts(&self) -> &Arc<FontResolver> {
        &self.fonts
    }

    /// Fragments for `element` on a `canvas_w` x `canvas_h` canvas. An
    /// element whose box collapses to nothing yields no fragments.
    pub async fn render(
        &self,
        element: &Element,
        canvas_w: u32,
        canvas_h: u32,
        format: &AspectFormat,
    ) -> Vec<FilterFragment> {
        let geometry = transform(element.geometry, format);
        let rect = to_pixels(geometry, canvas_w, canvas_h);
        if rect.is_empty() {
            tracing::debug!(element = %element.id, "Element has no visible area, skipping");
            return Vec::new();
        }
        if element.rotation != 0.0 {
            tracing::debug!(element = %element.id, rotation = element.rotation, "Rotation is not applied");
        }

        let canvas = Canvas {
            width: canvas_w,
            height: canvas_h,
        };
        let opacity = element.opacity;

        match &element.kind {
            ElementKind::Text(style) => draws(self.text(style, rect, opacity, canvas).await),
            ElementKind::Shape(style) => draws(shape(style, rect, opacity, canvas)),
            ElementKind::Cta(style) => draws(self.cta(style, rect, opacity, canvas).await),
            ElementKind::Logo(source) => self.logo(&element.id, source, rect, opacity, canvas).await,
            ElementKind::VideoPlaceholder => draws(video_placeholder(rect, opacity)),
            ElementKind::AudioPlaceholder => draws(audio_placeholder(rect, opacity)),
        }
    }

    async fn text(&self, style: &TextStyle, rect: PixelRect, opacity: f64, canvas: Canvas) -> Vec<FilterNode> {
        let font_px = style
            .font_size
            .map(|size| size * canvas.scale())
            .unwrap_or_else(|| auto_font_size(rect.height, style.line_height));

        let mut nodes = Vec::new();
        if let Some(background) = style.background.as_deref() {
            let color = color_or(background, Color::BLACK).with_opacity(opacity);
            nodes.push(filled(rect.x as i64, rect.y as i64, rect.width, rect.height, color));
        }

        let run = TextRun {
            text: &style.text,
            family: &style.font_family,
            weight: style.font_weight,
            italic: style.italic,
            color: color_or(&style.color, Color::WHITE).with_opacity(opacity),
            align: style.align,
            underline: style.underline,
            strikethrough: style.strikethrough,
            line_height: style.line_height,
            shadow: style.shadow.as_ref().map(|s| (s, opacity)),
            font_px,
        };
        nodes.extend(self.draw_text(&run, rect, canvas).await);
        nodes
    }

    async fn draw_text(&self, run: &TextRun<'_>, rect: PixelRect, canvas: Canvas) -> Vec<FilterNode> {
        let script = detect_script(run.text);
        let metrics = TextMetrics::new(canvas.font_px(run.font_px), run.line_height, script, run.weight >= 600);
        let lines = wrap_text(run.text, rect.width, &metrics);
        if lines.is_empty() {
            return Vec::new();
        }

        let request = FontRequest::new(run.family, run.weight)
            .italic(run.italic)
            .sample(run.text);
        let font = self.fonts.select(&request).await;
        if run.italic && !font.is_italic() {
            tracing::debug!(family = run.family, "Italic variant unavailable, drawing upright");
        }

        let font_size = metrics.font_size.round() as u32;
        let decoration = ((metrics.font_size / 15.0).round() as u32).max(1);
        let mut nodes = Vec::new();

        for line in layout_lines(&lines, rect, &metrics) {
            let y = line.y.round() as i64;
            let x_expr = match run.align {
                TextAlign::Left => rect.x.to_string(),
                TextAlign::Center => format!("{}+({}-text_w)/2", rect.x, rect.width),
                TextAlign::Right => format!("{}-text_w", rect.right()),
            };

            let mut node = FilterNode::new("drawtext");
            node = match &font {
                FontSelection::File(resolved) => node.arg("fontfile", resolved.font.path.display()),
                FontSelection::Family(family) => node.arg("font", family),
            };
            node = node
                .arg("text", &line.text)
                .arg("expansion", "none")
                .arg("fontsize", font_size)
                .arg("fontcolor", run.color.to_ffmpeg())
                .arg("x", x_expr)
                .arg("y", y);
            if let Some((shadow, opacity)) = run.shadow {
                let color = color_or(&shadow.color, Color::rgba(0, 0, 0, 0.5)).with_opacity(opacity);
                node = node
                    .arg("shadowx", canvas.offset(shadow.offset_x))
                    .arg("shadowy", canvas.offset(shadow.offset_y))
                    .arg("shadowcolor", color.to_ffmpeg());
            }
            nodes.push(node);

            // Decorations follow the estimated line extent.
            let width = (line.estimated_width.round() as u32).clamp(1, canvas.width);
            let left = match run.align {
                TextAlign::Left => rect.x as i64,
                TextAlign::Center => rect.x as i64 + (rect.width as i64 - width as i64) / 2,
                TextAlign::Right => rect.right() as i64 - width as i64,
            }
            .max(0);
            let color = run.color.to_ffmpeg();
            if run.underline {
                let uy = y.saturating_add((metrics.font_size * 0.95).round() as i64);
                nodes.push(FilterNode::drawbox(left, uy, width, decoration, &color, Thickness::Fill));
            }
            if run.strikethrough {
                let sy = y.saturating_add((metrics.font_size * 0.55).round() as i64);
                nodes.push(FilterNode::drawbox(left, sy, width, decoration, &color, Thickness::Fill));
            }
        }
        nodes
    }

    async fn cta(&self, style: &CtaStyle, rect: PixelRect, opacity: f64, canvas: Canvas) -> Vec<FilterNode> {
        let font_px = canvas.font_px(
            style
                .font_size
                .map(|size| size * canvas.scale())
                .unwrap_or(rect.height as f64 * 0.45),
        );

        let bg = match style.variant {
            CtaVariant::Button => rect,
            CtaVariant::Banner => PixelRect::new(0, rect.y, canvas.width, rect.height),
            CtaVariant::Tag => {
                let metrics = TextMetrics::new(font_px, 1.2, detect_script(&style.text), style.font_weight >= 600);
                let padding = font_px * 0.6;
                let w = (metrics.estimate_width(&style.text) + padding * 2.0).round() as u32;
                let h = (font_px * 1.6).round() as u32;
                let centred = centered_in(rect, w, h, canvas);
                PixelRect::new(
                    rect.x.min(canvas.width - centred.width),
                    centred.y,
                    centred.width,
                    centred.height,
                )
            }
        };

        let mut nodes = Vec::new();
        if let Some(shadow) = &style.shadow {
            let color = color_or(&shadow.color, Color::rgba(0, 0, 0, 0.4)).with_opacity(opacity);
            nodes.push(filled(
                bg.x as i64 + canvas.offset(shadow.offset_x),
                bg.y as i64 + canvas.offset(shadow.offset_y),
                bg.width,
                bg.height,
                color,
            ));
        }
        if let Some(border) = &style.border {
            let bw = canvas.stroke(border.width);
            let color = color_or(&border.color, Color::WHITE).with_opacity(opacity);
            nodes.push(filled(
                bg.x as i64 - bw as i64,
                bg.y as i64 - bw as i64,
                bg.width.saturating_add(bw.saturating_mul(2)),
                bg.height.saturating_add(bw.saturating_mul(2)),
                color,
            ));
        }
        let fill = color_or(&style.background, Color::BLACK).with_opacity(opacity);
        nodes.push(filled(bg.x as i64, bg.y as i64, bg.width, bg.height, fill));

        let run = TextRun {
            text: &style.text,
            family: &style.font_family,
            weight: style.font_weight,
            italic: false,
            color: color_or(&style.text_color, Color::WHITE).with_opacity(opacity),
            align: TextAlign::Center,
            underline: false,
            strikethrough: false,
            line_height: 1.2,
            shadow: None,
            font_px,
        };
        nodes.extend(self.draw_text(&run, bg, canvas).await);
        nodes
    }

    async fn logo(
        &self,
        id: &str,
        source: &LogoSource,
        rect: PixelRect,
        opacity: f64,
        canvas: Canvas,
    ) -> Vec<FilterFragment> {
        let candidates = source.candidates();
        if !candidates.is_empty() {
            return vec![FilterFragment::Overlay(PendingOverlay {
                element_id: id.to_string(),
                rect,
                opacity,
                candidates,
                label: source.label.clone(),
            })];
        }

        tracing::warn!(element = id, "Logo has no image URL, drawing placeholder");
        let bg = Color::GRAY.with_opacity(opacity);
        let mut nodes = vec![filled(rect.x as i64, rect.y as i64, rect.width, rect.height, bg)];
        let label = source.label.as_deref().unwrap_or("LOGO");
        let run = TextRun {
            text: label,
            family: self.fonts.default_family(),
            weight: 700,
            italic: false,
            color: Color::WHITE.with_opacity(opacity),
            align: TextAlign::Center,
            underline: false,
            strikethrough: false,
            line_height: 1.2,
            shadow: None,
            font_px: (rect.height as f64 * 0.3).max(MIN_FONT_SIZE),
        };
        nodes.extend(self.draw_text(&run, rect, canvas).await);
        draws(nodes)
    }
}

#[derive(Debug, Clone, Copy)]
struct Canvas {
    width: u32,
    height: u32,
}

impl Canvas {
    /// Multiplier from authored pixel sizes to this canvas.
    fn scale(&self) -> f64 {
        self.short_edge() as f64 / BASELINE_SHORT_EDGE
    }

    fn short_edge(&self) -> u32 {
        self.width.min(self.height)
    }

    /// Authored offset in canvas pixels, never further than the canvas is long.
    fn offset(&self, authored: f64) -> i64 {
        let limit = self.width.max(self.height) as f64;
        let px = authored * self.scale();
        if px.is_finite() {
            px.round().clamp(-limit, limit) as i64
        } else {
            0
        }
    }

    /// Authored stroke width in canvas pixels, between 1 and half the short edge.
    fn stroke(&self, authored: f64) -> u32 {
        let limit = (self.short_edge() / 2).max(1) as f64;
        let px = authored * self.scale();
        if px.is_finite() {
            px.round().clamp(1.0, limit) as u32
        } else {
            1
        }
    }

    /// Font size kept between the legible minimum and the short edge.
    fn font_px(&self, px: f64) -> f64 {
        let limit = (self.short_edge() as f64).max(MIN_FONT_SIZE);
        if px.is_finite() {
            px.clamp(MIN_FONT_SIZE, limit)
        } else {
            MIN_FONT_SIZE
        }
    }
}

/// A `w` x `h` box centred on `rect`, kept on the canvas.
fn centered_in(rect: PixelRect, w: u32, h: u32, canvas: Canvas) -> PixelRect {
    let w = w.clamp(1, canvas.width);
    let h = h.clamp(1, canvas.height);
    let x = (rect.center_x() as i64 - w as i64 / 2).clamp(0, (canvas.width - w) as i64) as u32;
    let y = (rect.center_y() as i64 - h as i64 / 2).clamp(0, (canvas.height - h) as i64) as u32;
    PixelRect::new(x, y, w, h)
}

fn shape(style: &ShapeStyle, rect: PixelRect, opacity: f64, canvas: Canvas) -> Vec<FilterNode> {
    let fill = color_or(&style.fill, Color::WHITE).with_opacity(opacity);
    let border = style.border.as_ref().map(|b| {
        let width = canvas.stroke(b.width);
        (width, color_or(&b.color, Color::BLACK).with_opacity(opacity))
    });

    match style.shape {
        ShapeKind::Rectangle | ShapeKind::Circle => {
            // Circles are drawn as their centred bounding square.
            let area = if style.shape == ShapeKind::Circle {
                let side = rect.width.min(rect.height);
                centered_in(rect, side, side, canvas)
            } else {
                rect
            };
            let mut nodes = vec![filled(area.x as i64, area.y as i64, area.width, area.height, fill)];
            if let Some((width, color)) = border {
                nodes.push(FilterNode::drawbox(
                    area.x as i64,
                    area.y as i64,
                    area.width,
                    area.height,
                    &color.to_ffmpeg(),
                    Thickness::Px(width),
                ));
            }
            nodes
        }
        ShapeKind::Triangle => {
            // Outline only.
            let (width, color) =
                border.unwrap_or((((rect.width.min(rect.height)) / 20).max(2), fill));
            let top = (rect.center_x() as f64, rect.y as f64);
            let left = (rect.x as f64, rect.bottom() as f64);
            let right = (rect.right() as f64, rect.bottom() as f64);
            [(top, left), (left, right), (right, top)]
                .into_iter()
                .flat_map(|(a, b)| stroke(a, b, width, color))
                .collect()
        }
    }
}

/// A thick line approximated by overlapping square boxes.
fn stroke(from: (f64, f64), to: (f64, f64), thickness: u32, color: Color) -> Vec<FilterNode> {
    let (dx, dy) = (to.0 - from.0, to.1 - from.1);
    let length = (dx * dx + dy * dy).sqrt();
    let step = (thickness as f64 / 2.0).max(1.0);
    let segments = ((length / step).ceil() as usize).clamp(1, MAX_EDGE_SEGMENTS);
    let half = thickness as f64 / 2.0;
    let color = color.to_ffmpeg();

    (0..=segments)
        .map(|i| {
            let t = i as f64 / segments as f64;
            let x = (from.0 + dx * t - half).round() as i64;
            let y = (from.1 + dy * t - half).round() as i64;
            FilterNode::drawbox(x.max(0), y.max(0), thickness, thickness, &color, Thickness::Fill)
        })
        .collect()
}

fn video_placeholder(rect: PixelRect, opacity: f64) -> Vec<FilterNode> {
    let mut nodes = vec![filled(
        rect.x as i64,
        rect.y as i64,
        rect.width,
        rect.height,
        Color::BLACK.with_opacity(opacity),
    )];

    // Right-pointing play triangle from vertical strips of shrinking height.
    let icon = (rect.width.min(rect.height) as f64 * 0.4).max(4.0);
    let strips = 12u32;
    let strip_w = ((icon / strips as f64).ceil() as u32).max(1);
    let x0 = rect.center_x() as f64 - icon / 3.0;
    let cy = rect.center_y() as f64;
    let color = Color::WHITE.with_alpha(0.85).with_opacity(opacity);
    for i in 0..strips {
        let h = icon * (1.0 - i as f64 / strips as f64);
        nodes.push(filled(
            (x0 + (i * strip_w) as f64).round() as i64,
            (cy - h / 2.0).round() as i64,
            strip_w,
            (h.round() as u32).max(1),
            color,
        ));
    }
    nodes
}

fn audio_placeholder(rect: PixelRect, opacity: f64) -> Vec<FilterNode> {
    let mut nodes = vec![filled(
        rect.x as i64,
        rect.y as i64,
        rect.width,
        rect.height,
        Color::GRAY.with_opacity(opacity),
    )];

    let slots = (WAVEFORM.len() * 2 + 1) as u32;
    let bar_w = (rect.width / slots).max(1);
    let max_h = rect.height as f64 * 0.6;
    let cy = rect.center_y() as f64;
    let left = rect.x + rect.width.saturating_sub(bar_w * slots) / 2;
    let color = Color::WHITE.with_opacity(opacity);
    for (i, level) in WAVEFORM.iter().enumerate() {
        let h = (max_h * level).max(1.0);
        nodes.push(filled(
            (left + bar_w * (2 * i as u32 + 1)) as i64,
            (cy - h / 2.0).round() as i64,
            bar_w,
            h.round() as u32,
            color,
        ));
    }
    nodes
}
