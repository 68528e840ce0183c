//! Overlay elements.
//!
//! Elements arrive in a loose wire shape (a `type` string plus a serialized
//! `content` payload) and are parsed once into [`Element`], a tagged union
//! that carries only the style fields relevant to each kind.
//!
//! `rotation` is accepted and preserved but never applied: rendered output
//! is always unrotated.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ModelError;

/// Element as it appears in a render request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireElement {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,

    #[serde(default)]
    pub rotation: f64,

    #[serde(default = "default_opacity")]
    pub opacity: f64,

    #[serde(default)]
    pub z_index: i32,

    /// Style and payload: a JSON string, a JSON object, or plain text.
    #[serde(default)]
    pub content: Option<Value>,

    /// Direct media URL (logo/image elements).
    #[serde(default)]
    pub url: Option<String>,

    /// URL of an associated uploaded asset.
    #[serde(default)]
    pub asset_url: Option<String>,
}

fn default_opacity() -> f64 {
    1.0
}

/// Element box in percent of the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Geometry {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center_x(&self) -> f64 {
        self.x + self.width / 2.0
    }

    pub fn center_y(&self) -> f64 {
        self.y + self.height / 2.0
    }
}

/// A parsed overlay element.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub id: String,
    pub geometry: Geometry,
    /// Preserved for round-tripping; the renderer ignores it.
    pub rotation: f64,
    pub opacity: f64,
    pub z_index: i32,
    pub kind: ElementKind,
}

/// Per-kind payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementKind {
    Text(TextStyle),
    Shape(ShapeStyle),
    Cta(CtaStyle),
    Logo(LogoSource),
    VideoPlaceholder,
    AudioPlaceholder,
}

impl ElementKind {
    pub fn name(&self) -> &'static str {
        match self {
            ElementKind::Text(_) => "text",
            ElementKind::Shape(_) => "shape",
            ElementKind::Cta(_) => "cta",
            ElementKind::Logo(_) => "logo",
            ElementKind::VideoPlaceholder => "video",
            ElementKind::AudioPlaceholder => "audio",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextAlign {
    Left,
    #[default]
    Center,
    Right,
}

impl TextAlign {
    fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("left") | Some("start") => Self::Left,
            Some("right") | Some("end") => Self::Right,
            _ => Self::Center,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Border {
    pub width: f64,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Shadow {
    pub offset_x: f64,
    pub offset_y: f64,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextStyle {
    pub text: String,
    /// Font size in baseline pixels; `None` means size to the box.
    pub font_size: Option<f64>,
    pub font_family: String,
    pub font_weight: u16,
    pub color: String,
    pub align: TextAlign,
    pub italic: bool,
    pub underline: bool,
    pub strikethrough: bool,
    pub background: Option<String>,
    /// Line height as a multiple of the font size.
    pub line_height: f64,
    pub shadow: Option<Shadow>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    Rectangle,
    Circle,
    Triangle,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShapeStyle {
    pub shape: ShapeKind,
    pub fill: String,
    pub border: Option<Border>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtaVariant {
    /// Fills the element box.
    Button,
    /// Spans the full canvas width at the element's vertical position.
    Banner,
    /// Hugs the text, anchored at the element's left edge.
    Tag,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CtaStyle {
    pub text: String,
    pub variant: CtaVariant,
    pub background: String,
    pub text_color: String,
    pub font_family: String,
    pub font_weight: u16,
    pub font_size: Option<f64>,
    pub border: Option<Border>,
    pub shadow: Option<Shadow>,
}

/// Where a logo/image element's media may come from.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LogoSource {
    pub url: Option<String>,
    pub asset_url: Option<String>,
    pub content_url: Option<String>,
    pub label: Option<String>,
}

impl LogoSource {
    /// Candidate URLs in lookup priority order: direct element URL, then
    /// associated asset URL, then the URL inside the content payload.
    pub fn candidates(&self) -> Vec<String> {
        [&self.url, &self.asset_url, &self.content_url]
            .into_iter()
            .flatten()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

pub const DEFAULT_FONT_FAMILY: &str = "Inter";
pub const DEFAULT_TEXT_COLOR: &str = "#FFFFFF";

/// Content payload, parsed leniently: every field is optional and numeric
/// fields accept numbers or strings such as `"24px"`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ContentPayload {
    text: Option<String>,
    font_size: Option<Value>,
    font_family: Option<String>,
    font_weight: Option<Value>,
    color: Option<String>,
    text_align: Option<String>,
    font_style: Option<String>,
    text_decoration: Option<String>,
    background_color: Option<String>,
    line_height: Option<Value>,
    text_shadow: Option<Value>,

    #[serde(alias = "shapeType")]
    shape: Option<String>,
    fill: Option<String>,
    fill_color: Option<String>,
    border_color: Option<String>,
    border_width: Option<Value>,

    #[serde(alias = "variant", alias = "style")]
    cta_type: Option<String>,
    text_color: Option<String>,
    border: Option<Value>,
    shadow: Option<Value>,

    url: Option<String>,
    src: Option<String>,
    image_url: Option<String>,
    #[serde(alias = "alt")]
    label: Option<String>,
}

impl WireElement {
    /// Parse into a typed element. `index` names elements without an id.
    pub fn to_element(&self, index: usize) -> Result<Element, ModelError> {
        let id = self
            .id
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| format!("element-{index}"));

        let (payload, raw_text) = parse_content(self.content.as_ref());

        let kind = match self.kind.trim().to_ascii_lowercase().as_str() {
            "text" => ElementKind::Text(text_style(&payload, raw_text)),
            "shape" => ElementKind::Shape(shape_style(&payload)),
            "cta" | "button" => ElementKind::Cta(cta_style(&payload, raw_text)),
            "logo" | "image" => ElementKind::Logo(LogoSource {
                url: self.url.clone(),
                asset_url: self.asset_url.clone(),
                content_url: payload
                    .url
                    .clone()
                    .or_else(|| payload.src.clone())
                    .or_else(|| payload.image_url.clone()),
                label: payload.label.clone().or(payload.text.clone()),
            }),
            "video" => ElementKind::VideoPlaceholder,
            "audio" => ElementKind::AudioPlaceholder,
            other => {
                return Err(ModelError::UnknownElementType {
                    id,
                    kind: other.to_string(),
                })
            }
        };

        Ok(Element {
            id,
            geometry: Geometry::new(
                finite_or(self.x, 0.0),
                finite_or(self.y, 0.0),
                finite_or(self.width, 0.0).max(0.0),
                finite_or(self.height, 0.0).max(0.0),
            ),
            rotation: finite_or(self.rotation, 0.0),
            opacity: finite_or(self.opacity, 1.0).clamp(0.0, 1.0),
            z_index: self.z_index,
            kind,
        })
    }
}

fn parse_content(content: Option<&Value>) -> (ContentPayload, Option<String>) {
    match content {
        Some(Value::Object(map)) => (payload_from_map(map), None),
        Some(Value::String(raw)) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => (payload_from_map(&map), None),
            Ok(Value::String(inner)) => (ContentPayload::default(), Some(inner)),
            _ => (ContentPayload::default(), Some(raw.clone())),
        },
        Some(Value::Number(n)) => (ContentPayload::default(), Some(n.to_string())),
        _ => (ContentPayload::default(), None),
    }
}

/// Keys whose values have the wrong type are dropped one by one; the rest
/// of the payload survives.
fn payload_from_map(map: &Map<String, Value>) -> ContentPayload {
    if let Ok(payload) = serde_json::from_value(Value::Object(map.clone())) {
        return payload;
    }
    let usable: Map<String, Value> = map
        .iter()
        .filter(|(key, value)| {
            let single = Map::from_iter([((*key).clone(), (*value).clone())]);
            serde_json::from_value::<ContentPayload>(Value::Object(single)).is_ok()
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    serde_json::from_value(Value::Object(usable)).unwrap_or_default()
}

fn text_style(p: &ContentPayload, raw_text: Option<String>) -> TextStyle {
    let decoration = p
        .text_decoration
        .as_deref()
        .unwrap_or_default()
        .to_ascii_lowercase();
    TextStyle {
        text: p.text.clone().or(raw_text).unwrap_or_default(),
        font_size: p.font_size.as_ref().and_then(value_as_f64).filter(|v| *v > 0.0),
        font_family: family_or_default(p.font_family.as_deref()),
        font_weight: parse_font_weight(p.font_weight.as_ref()),
        color: p.color.clone().unwrap_or_else(|| DEFAULT_TEXT_COLOR.to_string()),
        align: TextAlign::parse(p.text_align.as_deref()),
        italic: p
            .font_style
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("italic") || s.eq_ignore_ascii_case("oblique")),
        underline: decoration.contains("underline"),
        strikethrough: decoration.contains("line-through") || decoration.contains("strikethrough"),
        background: p.background_color.clone().filter(|s| !s.trim().is_empty()),
        line_height: p
            .line_height
            .as_ref()
            .and_then(value_as_f64)
            .filter(|v| *v > 0.0 && *v <= 5.0)
            .unwrap_or(1.2),
        shadow: p.text_shadow.as_ref().and_then(parse_shadow),
    }
}

fn shape_style(p: &ContentPayload) -> ShapeStyle {
    let shape = match p
        .shape
        .as_deref()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
        .as_str()
    {
        "circle" | "ellipse" | "oval" => ShapeKind::Circle,
        "triangle" => ShapeKind::Triangle,
        _ => ShapeKind::Rectangle,
    };
    let border_width = p.border_width.as_ref().and_then(value_as_f64).unwrap_or(0.0);
    let border = parse_border(p.border.as_ref()).or_else(|| {
        (border_width > 0.0).then(|| Border {
            width: border_width,
            color: p.border_color.clone().unwrap_or_else(|| "#000000".to_string()),
        })
    });
    ShapeStyle {
        shape,
        fill: p
            .fill
            .clone()
            .or_else(|| p.fill_color.clone())
            .or_else(|| p.background_color.clone())
            .or_else(|| p.color.clone())
            .unwrap_or_else(|| "#3B82F6".to_string()),
        border,
    }
}

fn cta_style(p: &ContentPayload, raw_text: Option<String>) -> CtaStyle {
    let variant = match p
        .cta_type
        .as_deref()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
        .as_str()
    {
        "banner" => CtaVariant::Banner,
        "tag" | "badge" | "label" => CtaVariant::Tag,
        _ => CtaVariant::Button,
    };
    CtaStyle {
        text: p.text.clone().or(raw_text).unwrap_or_else(|| "Shop Now".to_string()),
        variant,
        background: p
            .background_color
            .clone()
            .unwrap_or_else(|| "#2563EB".to_string()),
        text_color: p
            .text_color
            .clone()
            .or_else(|| p.color.clone())
            .unwrap_or_else(|| DEFAULT_TEXT_COLOR.to_string()),
        font_family: family_or_default(p.font_family.as_deref()),
        font_weight: p
            .font_weight
            .as_ref()
            .map_or(700, |w| parse_font_weight(Some(w))),
        font_size: p.font_size.as_ref().and_then(value_as_f64).filter(|v| *v > 0.0),
        border: parse_border(p.border.as_ref()).or_else(|| {
            let width = p.border_width.as_ref().and_then(value_as_f64)?;
            (width > 0.0).then(|| Border {
                width,
                color: p.border_color.clone().unwrap_or_else(|| "#FFFFFF".to_string()),
            })
        }),
        shadow: p.shadow.as_ref().and_then(parse_shadow),
    }
}

fn family_or_default(raw: Option<&str>) -> String {
    // CSS stacks like "Montserrat, sans-serif": the first family wins.
    raw.and_then(|s| s.split(',').next())
        .map(|s| s.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_FONT_FAMILY.to_string())
}

fn finite_or(v: f64, fallback: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        fallback
    }
}

/// Numbers, or strings like `"24"`, `"24px"`, `"1.5"`.
pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => s
            .trim()
            .trim_end_matches("px")
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite()),
        _ => None,
    }
}

/// CSS weight: numeric (snapped to the 100 grid, 100..=900) or keyword.
pub fn parse_font_weight(value: Option<&Value>) -> u16 {
    let Some(value) = value else {
        return 400;
    };
    if let Some(n) = value_as_f64(value) {
        let snapped = ((n / 100.0).round() * 100.0).clamp(100.0, 900.0);
        return snapped as u16;
    }
    match value
        .as_str()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
        .replace(['-', ' ', '_'], "")
        .as_str()
    {
        "thin" | "hairline" => 100,
        "extralight" | "ultralight" => 200,
        "light" => 300,
        "medium" => 500,
        "semibold" | "demibold" => 600,
        "bold" | "bolder" => 700,
        "extrabold" | "ultrabold" => 800,
        "black" | "heavy" => 900,
        _ => 400,
    }
}

fn parse_border(value: Option<&Value>) -> Option<Border> {
    match value? {
        Value::Object(map) => {
            let width = map.get("width").and_then(value_as_f64).unwrap_or(0.0);
            if width <= 0.0 {
                return None;
            }
            Some(Border {
                width,
                color: map
                    .get("color")
                    .and_then(Value::as_str)
                    .unwrap_or("#FFFFFF")
                    .to_string(),
            })
        }
        // CSS shorthand: "2px solid #fff"
        Value::String(s) => {
            let mut width = None;
            let mut color = None;
            for token in s.split_whitespace() {
                if width.is_none() {
                    if let Some(w) = value_as_f64(&Value::String(token.to_string())) {
                        width = Some(w);
                        continue;
                    }
                }
                if !matches!(token, "solid" | "dashed" | "dotted" | "none") {
                    color = Some(token.to_string());
                }
            }
            let width = width.filter(|w| *w > 0.0)?;
            Some(Border {
                width,
                color: color.unwrap_or_else(|| "#FFFFFF".to_string()),
            })
        }
        Value::Bool(true) => Some(Border {
            width: 2.0,
            color: "#FFFFFF".to_string(),
        }),
        _ => None,
    }
}

fn parse_shadow(value: &Value) -> Option<Shadow> {
    match value {
        Value::Object(map) => Some(Shadow {
            offset_x: map
                .get("offsetX")
                .or_else(|| map.get("x"))
                .and_then(value_as_f64)
                .unwrap_or(2.0),
            offset_y: map
                .get("offsetY")
                .or_else(|| map.get("y"))
                .and_then(value_as_f64)
                .unwrap_or(2.0),
            color: map
                .get("color")
                .and_then(Value::as_str)
                .unwrap_or("rgba(0,0,0,0.5)")
                .to_string(),
        }),
        // CSS shorthand: "2px 4px 6px rgba(0,0,0,0.4)"
        Value::String(s) => {
            if s.trim().eq_ignore_ascii_case("none") || s.trim().is_empty() {
                return None;
            }
            let lower = s.to_ascii_lowercase();
            let color_start = lower
                .find('#')
                .or_else(|| lower.find("rgb"))
                .or_else(|| lower.find("hsl"))
                .or_else(|| {
                    let last = lower.split_whitespace().last()?;
                    last.chars()
                        .all(|c| c.is_ascii_alphabetic())
                        .then(|| lower.rfind(last))
                        .flatten()
                });
            let (lengths, color) = match color_start {
                Some(i) => s.split_at(i),
                None => (s.as_str(), "rgba(0,0,0,0.5)"),
            };
            let mut nums = lengths
                .split_whitespace()
                .filter_map(|t| value_as_f64(&Value::String(t.to_string())));
            Some(Shadow {
                offset_x: nums.next().unwrap_or(2.0),
                offset_y: nums.next().unwrap_or(2.0),
                color: color.trim().to_string(),
            })
        }
        Value::Bool(true) => Some(Shadow {
            offset_x: 4.0,
            offset_y: 4.0,
            color: "rgba(0,0,0,0.5)".to_string(),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wire(value: Value) -> WireElement {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_text_from_json_string_content() {
        let el = wire(json!({
            "id": "t1", "type": "text", "x": 10, "y": 20, "width": 80, "height": 10,
            "zIndex": 3,
            "content": "{\"text\":\"Hello\",\"fontSize\":\"32px\",\"fontWeight\":\"bold\",\"textAlign\":\"left\",\"fontStyle\":\"italic\",\"textDecoration\":\"underline line-through\"}"
        }))
        .to_element(0)
        .unwrap();

        let ElementKind::Text(style) = el.kind else {
            panic!("expected text");
        };
        assert_eq!(style.text, "Hello");
        assert_eq!(style.font_size, Some(32.0));
        assert_eq!(style.font_weight, 700);
        assert_eq!(style.align, TextAlign::Left);
        assert!(style.italic && style.underline && style.strikethrough);
        assert_eq!(el.z_index, 3);
    }

    #[test]
    fn test_mistyped_field_keeps_the_rest_of_content() {
        let el = wire(json!({
            "type": "text",
            "content": {"text": "Flash deal", "fontFamily": 42, "color": "#ff0000", "fontStyle": ["italic"]}
        }))
        .to_element(0)
        .unwrap();

        let ElementKind::Text(style) = el.kind else {
            panic!("expected text");
        };
        assert_eq!(style.text, "Flash deal");
        assert_eq!(style.color, "#ff0000");
        assert_eq!(style.font_family, DEFAULT_FONT_FAMILY);
        assert!(!style.italic);
    }

    #[test]
    fn test_plain_text_content_becomes_text() {
        let el = wire(json!({"type": "text", "content": "Summer sale"}))
            .to_element(4)
            .unwrap();
        assert_eq!(el.id, "element-4");
        match el.kind {
            ElementKind::Text(style) => {
                assert_eq!(style.text, "Summer sale");
                assert_eq!(style.font_family, DEFAULT_FONT_FAMILY);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_rotation_is_preserved() {
        let el = wire(json!({"type": "shape", "rotation": 45, "content": {"shape": "triangle"}}))
            .to_element(0)
            .unwrap();
        assert!((el.rotation - 45.0).abs() < 1e-9);
        assert!(matches!(
            el.kind,
            ElementKind::Shape(ShapeStyle { shape: ShapeKind::Triangle, .. })
        ));
    }

    #[test]
    fn test_logo_candidates_follow_priority() {
        let el = wire(json!({
            "type": "logo",
            "url": "https://a/direct.png",
            "assetUrl": "https://a/asset.png",
            "content": {"src": "https://a/content.png"}
        }))
        .to_element(0)
        .unwrap();
        let ElementKind::Logo(source) = el.kind else {
            panic!("expected logo");
        };
        assert_eq!(
            source.candidates(),
            vec![
                "https://a/direct.png".to_string(),
                "https://a/asset.png".to_string(),
                "https://a/content.png".to_string()
            ]
        );
    }

    #[test]
    fn test_cta_border_and_shadow_shorthand() {
        let el = wire(json!({
            "type": "cta",
            "content": {"text": "Buy", "ctaType": "tag", "border": "3px solid #ff0000", "shadow": "2px 6px 4px rgba(0,0,0,0.4)"}
        }))
        .to_element(0)
        .unwrap();
        let ElementKind::Cta(style) = el.kind else {
            panic!("expected cta");
        };
        assert_eq!(style.variant, CtaVariant::Tag);
        assert_eq!(style.font_weight, 700);
        let border = style.border.unwrap();
        assert!((border.width - 3.0).abs() < 1e-9);
        assert_eq!(border.color, "#ff0000");
        let shadow = style.shadow.unwrap();
        assert!((shadow.offset_y - 6.0).abs() < 1e-9);
        assert_eq!(shadow.color, "rgba(0,0,0,0.4)");
    }

    #[test]
    fn test_unknown_type_is_an_error() {
        let err = wire(json!({"id": "w", "type": "sparkle"}))
            .to_element(0)
            .unwrap_err();
        assert!(matches!(err, ModelError::UnknownElementType { .. }));
    }

    #[test]
    fn test_opacity_is_clamped() {
        let el = wire(json!({"type": "video", "opacity": 3.0}))
            .to_element(0)
            .unwrap();
        assert!((el.opacity - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_font_weight_keywords_and_numbers() {
        assert_eq!(parse_font_weight(None), 400);
        assert_eq!(parse_font_weight(Some(&json!(650))), 700);
        assert_eq!(parse_font_weight(Some(&json!("semi-bold"))), 600);
        assert_eq!(parse_font_weight(Some(&json!("1200"))), 900);
    }

    #[test]
    fn test_css_font_stack_uses_first_family() {
        assert_eq!(family_or_default(Some("'Bebas Neue', sans-serif")), "Bebas Neue");
        assert_eq!(family_or_default(Some("  ")), DEFAULT_FONT_FAMILY);
    }
}
