//! Colour normalization.
//!
//! Element styles carry colours in whatever form the editor produced: hex
//! of various lengths, `rgb()`/`rgba()`, CSS names. The encoder wants
//! `#RRGGBB` with an optional `@alpha` suffix. [`normalize_color`] maps the
//! former to the latter and accepts its own output unchanged.

use std::fmt;

/// An sRGB colour with straight alpha in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f64,
}

impl Color {
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const GRAY: Color = Color::rgb(128, 128, 128);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub fn rgba(r: u8, g: u8, b: u8, a: f64) -> Self {
        Self {
            r,
            g,
            b,
            a: clamp_alpha(a),
        }
    }

    /// Parse any supported notation. `None` when unrecognized.
    pub fn parse(raw: &str) -> Option<Self> {
        let s = raw.trim();
        if s.is_empty() {
            return None;
        }
        let lower = s.to_ascii_lowercase();

        // Encoder syntax, including our own output: "#RRGGBB@0.5", "red@0.3".
        if let Some((base, alpha)) = lower.split_once('@') {
            let alpha: f64 = alpha.trim().parse().ok()?;
            let base = Self::parse(base)?;
            return Some(base.with_alpha(alpha));
        }

        if let Some(hex) = lower.strip_prefix('#').or_else(|| lower.strip_prefix("0x")) {
            return parse_hex(hex);
        }

        if lower.starts_with("rgb") {
            return parse_rgb_function(&lower);
        }

        if lower == "transparent" {
            return Some(Self::rgba(0, 0, 0, 0.0));
        }

        named(&lower)
    }

    pub fn with_alpha(self, a: f64) -> Self {
        Self {
            a: clamp_alpha(a),
            ..self
        }
    }

    /// Multiply alpha by an element opacity.
    pub fn with_opacity(self, opacity: f64) -> Self {
        self.with_alpha(self.a * clamp_alpha(opacity))
    }

    pub fn is_opaque(&self) -> bool {
        round_alpha(self.a) >= 1.0
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    /// `#RRGGBB` or `#RRGGBB@a` with alpha rounded to two decimals.
    pub fn to_ffmpeg(&self) -> String {
        if self.is_opaque() {
            return self.to_hex();
        }
        let alpha = format!("{:.2}", round_alpha(self.a));
        let alpha = alpha.trim_end_matches('0').trim_end_matches('.');
        let alpha = if alpha.is_empty() { "0" } else { alpha };
        format!("{}@{}", self.to_hex(), alpha)
    }

    /// Relative luminance in `0.0..=1.0`, for picking readable label colours.
    pub fn luminance(&self) -> f64 {
        (0.2126 * self.r as f64 + 0.7152 * self.g as f64 + 0.0722 * self.b as f64) / 255.0
    }

    /// Alpha as 0–255, for raster output.
    pub fn alpha_u8(&self) -> u8 {
        (self.a * 255.0).round().clamp(0.0, 255.0) as u8
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_ffmpeg())
    }
}

/// Normalize a colour string for the encoder. Unrecognized input becomes
/// white and logs a warning. Idempotent.
pub fn normalize_color(raw: &str) -> String {
    match Color::parse(raw) {
        Some(color) => color.to_ffmpeg(),
        None => {
            tracing::warn!(color = raw, "Unrecognized colour, using white");
            Color::WHITE.to_ffmpeg()
        }
    }
}

fn clamp_alpha(a: f64) -> f64 {
    if a.is_finite() {
        a.clamp(0.0, 1.0)
    } else {
        1.0
    }
}

fn round_alpha(a: f64) -> f64 {
    (a * 100.0).round() / 100.0
}

fn parse_hex(hex: &str) -> Option<Color> {
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let nibble = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok().map(|v| v * 17);
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    match hex.len() {
        3 => Some(Color::rgb(nibble(0)?, nibble(1)?, nibble(2)?)),
        4 => Some(Color::rgba(
            nibble(0)?,
            nibble(1)?,
            nibble(2)?,
            nibble(3)? as f64 / 255.0,
        )),
        6 => Some(Color::rgb(byte(0)?, byte(2)?, byte(4)?)),
        8 => Some(Color::rgba(
            byte(0)?,
            byte(2)?,
            byte(4)?,
            byte(6)? as f64 / 255.0,
        )),
        _ => None,
    }
}

/// `rgb(255, 0, 0)`, `rgba(0,0,0,0.5)`, `rgb(0 0 0 / 50%)`, `rgb(100%, 0%, 0%)`.
fn parse_rgb_function(s: &str) -> Option<Color> {
    let open = s.find('(')?;
    let close = s.rfind(')')?;
    if close <= open {
        return None;
    }
    let inner = &s[open + 1..close];
    let parts: Vec<&str> = inner
        .split(|c: char| c == ',' || c == '/' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .collect();
    if parts.len() != 3 && parts.len() != 4 {
        return None;
    }

    let channel = |p: &str| -> Option<u8> {
        let v = match p.strip_suffix('%') {
            Some(pct) => pct.parse::<f64>().ok()? * 2.55,
            None => p.parse::<f64>().ok()?,
        };
        v.is_finite().then(|| v.round().clamp(0.0, 255.0) as u8)
    };
    let alpha = |p: &str| -> Option<f64> {
        match p.strip_suffix('%') {
            Some(pct) => pct.parse::<f64>().ok().map(|v| v / 100.0),
            None => p.parse::<f64>().ok(),
        }
    };

    let r = channel(parts[0])?;
    let g = channel(parts[1])?;
    let b = channel(parts[2])?;
    let a = match parts.get(3) {
        Some(p) => alpha(p)?,
        None => 1.0,
    };
    Some(Color::rgba(r, g, b, a))
}

fn named(name: &str) -> Option<Color> {
    let (r, g, b) = match name {
        "white" => (255, 255, 255),
        "black" => (0, 0, 0),
        "red" => (255, 0, 0),
        "green" => (0, 128, 0),
        "lime" => (0, 255, 0),
        "blue" => (0, 0, 255),
        "yellow" => (255, 255, 0),
        "cyan" | "aqua" => (0, 255, 255),
        "magenta" | "fuchsia" => (255, 0, 255),
        "gray" | "grey" => (128, 128, 128),
        "silver" => (192, 192, 192),
        "darkgray" | "darkgrey" => (169, 169, 169),
        "lightgray" | "lightgrey" => (211, 211, 211),
        "maroon" => (128, 0, 0),
        "olive" => (128, 128, 0),
        "navy" => (0, 0, 128),
        "purple" => (128, 0, 128),
        "teal" => (0, 128, 128),
        "orange" => (255, 165, 0),
        "gold" => (255, 215, 0),
        "pink" => (255, 192, 203),
        "hotpink" => (255, 105, 180),
        "brown" => (165, 42, 42),
        "coral" => (255, 127, 80),
        "salmon" => (250, 128, 114),
        "tomato" => (255, 99, 71),
        "crimson" => (220, 20, 60),
        "indigo" => (75, 0, 130),
        "violet" => (238, 130, 238),
        "turquoise" => (64, 224, 208),
        "beige" => (245, 245, 220),
        "ivory" => (255, 255, 240),
        "khaki" => (240, 230, 140),
        "skyblue" => (135, 206, 235),
        "royalblue" => (65, 105, 225),
        "dodgerblue" => (30, 144, 255),
        "darkblue" => (0, 0, 139),
        "darkgreen" => (0, 100, 0),
        "darkred" => (139, 0, 0),
        "whitesmoke" => (245, 245, 245),
        _ => return None,
    };
    Some(Color::rgb(r, g, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_forms() {
        assert_eq!(normalize_color("#fff"), "#FFFFFF");
        assert_eq!(normalize_color("#1a2b3c"), "#1A2B3C");
        assert_eq!(normalize_color("#00000080"), "#000000@0.5");
        assert_eq!(normalize_color("#f008"), "#FF0000@0.53");
    }

    #[test]
    fn test_rgb_functions() {
        assert_eq!(normalize_color("rgb(255, 0, 0)"), "#FF0000");
        assert_eq!(normalize_color("rgba(0,0,0,0.5)"), "#000000@0.5");
        assert_eq!(normalize_color("rgb(0 128 255 / 25%)"), "#0080FF@0.25");
        assert_eq!(normalize_color("RGBA(10, 20, 30, 1)"), "#0A141E");
    }

    #[test]
    fn test_named_and_transparent() {
        assert_eq!(normalize_color("Orange"), "#FFA500");
        assert_eq!(normalize_color("transparent"), "#000000@0");
    }

    #[test]
    fn test_invalid_becomes_white() {
        assert_eq!(normalize_color("not-a-colour"), "#FFFFFF");
        assert_eq!(normalize_color(""), "#FFFFFF");
        assert_eq!(normalize_color("#12345"), "#FFFFFF");
    }

    #[test]
    fn test_own_output_is_accepted() {
        for raw in ["#000000@0.5", "#ABCDEF", "#000000@0", "#FF0000@0.53"] {
            assert_eq!(normalize_color(raw), raw);
        }
    }

    #[test]
    fn test_opacity_multiplies_alpha() {
        let c = Color::parse("rgba(0,0,0,0.5)").unwrap().with_opacity(0.5);
        assert_eq!(c.to_ffmpeg(), "#000000@0.25");
    }
}
