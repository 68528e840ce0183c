pub mod check;
pub mod font;
pub mod formats;
pub mod render;
pub mod validate;

use std::path::Path;

use adforge_scene_model::{Quality, RenderRequest};

/// Read and parse a request file.
pub fn load_request(path: &Path) -> anyhow::Result<RenderRequest> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", path.display()))?;
    RenderRequest::from_json(&json)
        .map_err(|e| anyhow::anyhow!("Failed to parse {}: {e}", path.display()))
}

pub fn parse_quality(raw: &str) -> anyhow::Result<Quality> {
    serde_json::from_value(serde_json::Value::String(raw.to_ascii_lowercase()))
        .map_err(|_| anyhow::anyhow!("Unknown quality: {raw}. Use: high, medium, low"))
}
