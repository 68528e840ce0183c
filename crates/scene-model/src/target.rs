//! Output targets: aspect formats, pixel sizes, and quality tiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Requested aspect ratio.
///
/// Serialized as the ratio string (`"9:16"`, `"16:9"`, `"1:1"`, `"4:5"`).
/// Any other string is kept in [`AspectFormat::Unrecognized`] so the
/// renderer can warn and fall back instead of rejecting the request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AspectFormat {
    /// 9:16 vertical. The authoring baseline.
    Portrait,
    /// 16:9 widescreen.
    Landscape,
    /// 1:1 square.
    Square,
    /// 4:5 vertical feed.
    Feed,
    /// Anything else, verbatim.
    Unrecognized(String),
}

impl AspectFormat {
    pub const ALL: [AspectFormat; 4] = [
        AspectFormat::Portrait,
        AspectFormat::Landscape,
        AspectFormat::Square,
        AspectFormat::Feed,
    ];

    /// Parse a ratio string. Never fails.
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "9:16" => Self::Portrait,
            "16:9" => Self::Landscape,
            "1:1" => Self::Square,
            "4:5" => Self::Feed,
            other => Self::Unrecognized(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Portrait => "9:16",
            Self::Landscape => "16:9",
            Self::Square => "1:1",
            Self::Feed => "4:5",
            Self::Unrecognized(raw) => raw,
        }
    }

    /// Whether this is the format elements are authored against.
    pub fn is_baseline(&self) -> bool {
        matches!(self, Self::Portrait)
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }

    /// Output size in pixels. Both sides are multiples of 64 so frames line
    /// up with the sizes the upstream generators produce. Unrecognized
    /// formats render at the baseline size.
    pub fn dimensions(&self) -> Dimensions {
        match self {
            Self::Portrait | Self::Unrecognized(_) => Dimensions::new(768, 1344),
            Self::Landscape => Dimensions::new(1344, 768),
            Self::Square => Dimensions::new(1024, 1024),
            Self::Feed => Dimensions::new(768, 960),
        }
    }
}

impl From<String> for AspectFormat {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<AspectFormat> for String {
    fn from(format: AspectFormat) -> Self {
        format.as_str().to_string()
    }
}

impl fmt::Display for AspectFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pixel size of the output canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn short_edge(&self) -> u32 {
        self.width.min(self.height)
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Output quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    High,
    #[default]
    Medium,
    Low,
}

impl Quality {
    pub fn profile(self) -> EncodingProfile {
        match self {
            Quality::High => EncodingProfile {
                video_bitrate_kbps: 8000,
                fps: 30,
            },
            Quality::Medium => EncodingProfile {
                video_bitrate_kbps: 5000,
                fps: 30,
            },
            Quality::Low => EncodingProfile {
                video_bitrate_kbps: 2500,
                fps: 24,
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Quality::High => "high",
            Quality::Medium => "medium",
            Quality::Low => "low",
        }
    }
}

/// Bitrate and frame rate for one quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodingProfile {
    pub video_bitrate_kbps: u32,
    pub fps: u32,
}

impl EncodingProfile {
    /// Peak bitrate allowed by the rate controller.
    pub fn max_bitrate_kbps(&self) -> u32 {
        self.video_bitrate_kbps + self.video_bitrate_kbps / 2
    }

    pub fn buffer_size_kbps(&self) -> u32 {
        self.video_bitrate_kbps * 2
    }
}

/// Everything the renderer needs to know about the requested output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderTarget {
    pub format: AspectFormat,
    pub quality: Quality,
}

impl RenderTarget {
    pub fn new(format: AspectFormat, quality: Quality) -> Self {
        Self { format, quality }
    }

    pub fn dimensions(&self) -> Dimensions {
        self.format.dimensions()
    }

    pub fn profile(&self) -> EncodingProfile {
        self.quality.profile()
    }
}
