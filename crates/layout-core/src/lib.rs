//! Adforge Layout
//!
//! Pure functions shared by the element renderer:
//! - **Coordinates:** Re-fit 9:16-authored percentages to other aspect formats
//! - **Color:** Normalize CSS-ish colour strings to encoder colour syntax
//! - **Script:** Detect the dominant writing system of a text sample
//! - **Text:** Wrap and vertically place text lines inside an element box
//!
//! Nothing here touches the filesystem or spawns processes.

pub mod color;
pub mod coordinates;
pub mod script;
pub mod text;

pub use color::{normalize_color, Color};
pub use coordinates::{to_pixels, transform, PixelRect};
pub use script::{detect_script, has_non_latin, Script};
pub use text::{layout_lines, wrap_text, LineBox, TextMetrics};
