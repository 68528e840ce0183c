//! Font resolution.
//!
//! Resolution walks a fixed sequence and stops at the first hit:
//!
//! ```text
//! script check ──► cache ──► local files ──► catalog download
//!      │                                            │
//!      └──────────── script fallback chain ◄────────┘
//!                    (local, then last-resort download)
//! ```
//!
//! Every miss is logged and absorbed; a text element never fails because of
//! a font. When nothing resolves, [`FontResolver::select`] hands the
//! encoder a family name and lets fontconfig choose.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, RwLock};

use adforge_common::config::FontSettings;
use adforge_common::error::{AdforgeError, AdforgeResult};
use adforge_common::sanitize_component;
use adforge_layout::{detect_script, has_non_latin, Script};
use async_trait::async_trait;
use regex::Regex;
use tokio::sync::OnceCell;
use url::Url;

use crate::fetch::{reference_digest, retry_operation, FetchError, HttpFetch, RetryPolicy};

/// Families that only cover Latin (or barely more). Non-Latin text never
/// renders in them.
const DISPLAY_FAMILIES: &[&str] = &[
    "abril fatface",
    "alfa slab one",
    "amatic sc",
    "bangers",
    "bebas neue",
    "dancing script",
    "fredoka one",
    "great vibes",
    "indie flower",
    "lobster",
    "pacifico",
    "permanent marker",
    "righteous",
    "satisfy",
    "shadows into light",
];

const MAX_SCAN_DEPTH: usize = 6;

/// A font file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontFile {
    pub path: PathBuf,
    pub family: String,
    pub weight: u16,
    pub italic: bool,
}

/// Which resolution step produced a font.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontSource {
    Cache,
    Local,
    Download,
    Fallback,
    LastResort,
}

impl FontSource {
    pub fn as_str(self) -> &'static str {
        match self {
            FontSource::Cache => "cache",
            FontSource::Local => "local",
            FontSource::Download => "download",
            FontSource::Fallback => "fallback",
            FontSource::LastResort => "last-resort",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFont {
    pub font: FontFile,
    pub source: FontSource,
}

/// What the text renderer should hand to `drawtext`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FontSelection {
    /// `fontfile=<path>`
    File(ResolvedFont),
    /// `font=<family>`, resolved by the encoder's fontconfig.
    Family(String),
}

impl FontSelection {
    pub fn path(&self) -> Option<&Path> {
        match self {
            FontSelection::File(resolved) => Some(&resolved.font.path),
            FontSelection::Family(_) => None,
        }
    }

    pub fn is_italic(&self) -> bool {
        matches!(self, FontSelection::File(r) if r.font.italic)
    }
}

/// A font lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontRequest {
    pub family: String,
    pub weight: u16,
    pub italic: bool,
    /// Text the font must be able to render.
    pub sample: Option<String>,
}

impl FontRequest {
    pub fn new(family: impl Into<String>, weight: u16) -> Self {
        Self {
            family: family.into(),
            weight,
            italic: false,
            sample: None,
        }
    }

    pub fn italic(mut self, italic: bool) -> Self {
        self.italic = italic;
        self
    }

    pub fn sample(mut self, text: impl Into<String>) -> Self {
        self.sample = Some(text.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FontKey {
    family: String,
    weight: u16,
    italic: bool,
}

impl FontKey {
    fn new(family: &str, weight: u16, italic: bool) -> Self {
        Self {
            family: family.trim().to_ascii_lowercase(),
            weight,
            italic,
        }
    }
}

/// Resolved fonts, shared by every job in the process.
#[derive(Debug, Default)]
pub struct FontCache {
    entries: RwLock<HashMap<FontKey, FontFile>>,
}

impl FontCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, family: &str, weight: u16, italic: bool) -> Option<FontFile> {
        let entries = self.entries.read().ok()?;
        entries.get(&FontKey::new(family, weight, italic)).cloned()
    }

    pub fn insert(&self, font: FontFile) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(FontKey::new(&font.family, font.weight, font.italic), font);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Font catalog collaborator: returns CSS whose `src` lists at least one
/// TTF/OTF/WOFF2 URL for the family at `weight`.
#[async_trait]
pub trait FontCatalog: Send + Sync {
    async fn stylesheet(
        &self,
        family: &str,
        weight: u16,
        charset: Option<&str>,
    ) -> Result<String, FetchError>;
}

/// Google Fonts CSS2 API.
pub struct GoogleFontsCatalog {
    http: Arc<dyn HttpFetch>,
    base_url: String,
}

impl GoogleFontsCatalog {
    pub fn new(http: Arc<dyn HttpFetch>, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    pub fn stylesheet_url(&self, family: &str, weight: u16, charset: Option<&str>) -> Result<String, FetchError> {
        let mut url = Url::parse(&self.base_url).map_err(|e| FetchError::InvalidSource {
            source_ref: self.base_url.clone(),
            message: e.to_string(),
        })?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("family", &format!("{family}:wght@{weight}"));
            if let Some(text) = charset.filter(|t| !t.is_empty()) {
                query.append_pair("text", text);
            }
        }
        Ok(url.to_string())
    }
}

#[async_trait]
impl FontCatalog for GoogleFontsCatalog {
    async fn stylesheet(
        &self,
        family: &str,
        weight: u16,
        charset: Option<&str>,
    ) -> Result<String, FetchError> {
        let url = self.stylesheet_url(family, weight, charset)?;
        self.http.get_text(&url).await
    }
}

/// First downloadable font URL in a stylesheet, with its file extension.
pub fn extract_font_url(css: &str) -> Option<(String, &'static str)> {
    static WITH_FORMAT: OnceLock<Option<Regex>> = OnceLock::new();
    static BY_EXTENSION: OnceLock<Option<Regex>> = OnceLock::new();

    let with_format = WITH_FORMAT.get_or_init(|| {
        Regex::new(
            r#"url\(\s*['"]?([^'")\s]+)['"]?\s*\)\s*format\(\s*['"]?(truetype|opentype|woff2)['"]?\s*\)"#,
        )
        .ok()
    });
    if let Some(caps) = with_format.as_ref().and_then(|re| re.captures(css)) {
        let ext = match &caps[2] {
            "truetype" => "ttf",
            "opentype" => "otf",
            _ => "woff2",
        };
        return Some((caps[1].to_string(), ext));
    }

    let by_extension = BY_EXTENSION.get_or_init(|| {
        Regex::new(r#"url\(\s*['"]?([^'")\s]+\.(ttf|otf|woff2))['"]?\s*\)"#).ok()
    });
    let caps = by_extension.as_ref()?.captures(css)?;
    let ext = match &caps[2] {
        "ttf" => "ttf",
        "otf" => "otf",
        _ => "woff2",
    };
    Some((caps[1].to_string(), ext))
}

/// Families tried, in order, when the requested one is unusable.
pub fn fallback_chain(script: Script) -> &'static [&'static str] {
    match script {
        Script::Latin | Script::Cyrillic => &["Noto Sans", "DejaVu Sans", "Liberation Sans"],
        Script::Arabic => &["Noto Sans Arabic", "Noto Naskh Arabic", "DejaVu Sans"],
        Script::Cjk => &["Noto Sans CJK SC", "Noto Sans SC", "WenQuanYi Zen Hei"],
        Script::Devanagari => &["Noto Sans Devanagari", "Lohit Devanagari"],
    }
}

/// Family fetched from the catalog when no fallback is installed.
pub fn last_resort_family(script: Script) -> &'static str {
    match script {
        Script::Latin | Script::Cyrillic => "Noto Sans",
        Script::Arabic => "Noto Sans Arabic",
        Script::Cjk => "Noto Sans SC",
        Script::Devanagari => "Noto Sans Devanagari",
    }
}

pub fn is_display_family(family: &str) -> bool {
    let lower = family.trim().to_ascii_lowercase();
    DISPLAY_FAMILIES.contains(&lower.as_str())
}

/// Characters requested from the catalog: the whole block for compact
/// scripts, so the file serves any later text; the sample itself for CJK.
/// The second value says whether the result covers the whole script.
fn charset_for(script: Script, sample: &str) -> (String, bool) {
    let mut chars: Vec<char> = (0x20u32..0x7F).filter_map(char::from_u32).collect();
    let block = match script {
        Script::Latin => Some(0x00A0u32..0x0180),
        Script::Cyrillic => Some(0x0400u32..0x0460),
        Script::Arabic => Some(0x0600u32..0x0700),
        Script::Devanagari => Some(0x0900u32..0x0980),
        Script::Cjk => None,
    };
    let complete = block.is_some();
    if let Some(block) = block {
        chars.extend(block.filter_map(char::from_u32));
    }
    chars.extend(sample.chars().filter(|c| !c.is_control()));
    chars.sort_unstable();
    chars.dedup();
    (chars.into_iter().collect(), complete)
}

fn weight_name(weight: u16) -> &'static str {
    match weight {
        0..=149 => "Thin",
        150..=249 => "ExtraLight",
        250..=349 => "Light",
        350..=449 => "Regular",
        450..=549 => "Medium",
        550..=649 => "SemiBold",
        650..=749 => "Bold",
        750..=849 => "ExtraBold",
        _ => "Black",
    }
}

/// File stems a family/weight is commonly installed under, most specific
/// first: `OpenSans-Bold`, `OpenSans-700`, `Open Sans Bold`,
/// `open-sans-bold`, `OpenSans[wght]`, ...
pub fn candidate_file_stems(family: &str, weight: u16, italic: bool) -> Vec<String> {
    let words: Vec<&str> = family.split_whitespace().collect();
    let compact = words.concat();
    let spaced = words.join(" ");
    let hyphen = words.join("-").to_ascii_lowercase();
    let underscore = words.join("_");
    let name = weight_name(weight);
    let lower_name = name.to_ascii_lowercase();

    let mut stems = Vec::new();
    if italic {
        let styled = if weight == 400 {
            "Italic".to_string()
        } else {
            format!("{name}Italic")
        };
        stems.push(format!("{compact}-{styled}"));
        stems.push(format!("{compact}-{weight}italic"));
        stems.push(format!("{compact}-{weight}Italic"));
        stems.push(format!("{spaced} {}", styled.replace("Italic", " Italic").trim()));
        stems.push(format!("{hyphen}-{}", styled.to_ascii_lowercase()));
        stems.push(format!("{underscore}-{styled}"));
        if weight == 400 {
            stems.push(format!("{compact}-Italic[wght]"));
            stems.push(format!("{compact}-Italic-VariableFont_wght"));
        }
    } else {
        stems.push(format!("{compact}-{name}"));
        stems.push(format!("{compact}-{weight}"));
        stems.push(format!("{spaced} {name}"));
        stems.push(format!("{hyphen}-{lower_name}"));
        stems.push(format!("{hyphen}-{weight}"));
        stems.push(format!("{underscore}-{name}"));
        if weight == 400 {
            stems.push(compact.clone());
            stems.push(spaced.clone());
            stems.push(hyphen.clone());
            stems.push(format!("{compact}[wght]"));
            stems.push(format!("{compact}-VariableFont_wght"));
        }
    }
    stems.dedup();
    stems
}

/// Font files under the configured directories plus the `fonts.json`
/// family index, built once per resolver.
#[derive(Debug, Default)]
struct LocalFontIndex {
    /// Lower-case file name -> first path seen.
    files: HashMap<String, PathBuf>,
    /// Lower-case family -> entries of (`"700"`, `"700italic"`, or `"*"`, path).
    families: HashMap<String, Vec<(String, PathBuf)>>,
}

impl LocalFontIndex {
    /// Scans on the blocking pool; directory walks can touch thousands of
    /// entries.
    async fn load(settings: FontSettings) -> Self {
        match tokio::task::spawn_blocking(move || Self::build(&settings)).await {
            Ok(index) => index,
            Err(err) => {
                tracing::warn!(error = %err, "Font index scan aborted, local fonts unavailable");
                Self::default()
            }
        }
    }

    fn build(settings: &FontSettings) -> Self {
        let mut index = LocalFontIndex::default();
        let mut dirs = vec![settings.fonts_dir.clone()];
        dirs.extend(settings.system_dirs.iter().cloned());
        for dir in &dirs {
            index.scan(dir, 0);
        }
        index.load_metadata(&settings.fonts_dir);
        tracing::debug!(
            files = index.files.len(),
            families = index.families.len(),
            "Indexed local fonts"
        );
        index
    }

    fn scan(&mut self, dir: &Path, depth: usize) {
        if depth > MAX_SCAN_DEPTH {
            return;
        }
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                self.scan(&path, depth + 1);
                continue;
            }
            let is_font = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| matches!(e.to_ascii_lowercase().as_str(), "ttf" | "otf"))
                .unwrap_or(false);
            if !is_font {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                self.files.entry(name.to_ascii_lowercase()).or_insert(path);
            }
        }
    }

    /// `fonts.json`: `{"Brand Sans": "brand.ttf", "Open Sans": {"400": "a.ttf", "700italic": "b.ttf"}}`.
    fn load_metadata(&mut self, fonts_dir: &Path) {
        let path = fonts_dir.join("fonts.json");
        let Ok(content) = std::fs::read_to_string(&path) else {
            return;
        };
        let parsed: serde_json::Value = match serde_json::from_str(&content) {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "Ignoring malformed font index");
                return;
            }
        };
        let Some(map) = parsed.as_object() else {
            return;
        };
        for (family, entry) in map {
            let family = family.trim().to_ascii_lowercase();
            let mut variants = Vec::new();
            match entry {
                serde_json::Value::String(file) => {
                    variants.push(("*".to_string(), fonts_dir.join(file)))
                }
                serde_json::Value::Object(by_weight) => {
                    for (variant, file) in by_weight {
                        if let Some(file) = file.as_str() {
                            variants.push((variant.to_ascii_lowercase(), fonts_dir.join(file)));
                        }
                    }
                }
                _ => {}
            }
            variants.retain(|(_, path)| path.is_file());
            self.families.entry(family).or_default().extend(variants);
        }
    }

    fn find(&self, family: &str, weight: u16, italic: bool) -> Option<PathBuf> {
        if let Some(variants) = self.families.get(&family.trim().to_ascii_lowercase()) {
            let wanted = if italic {
                format!("{weight}italic")
            } else {
                weight.to_string()
            };
            let hit = variants
                .iter()
                .find(|(v, _)| *v == wanted)
                .or_else(|| {
                    (!italic)
                        .then(|| variants.iter().find(|(v, _)| v == "*"))
                        .flatten()
                });
            if let Some((_, path)) = hit {
                return Some(path.clone());
            }
        }

        candidate_file_stems(family, weight, italic)
            .iter()
            .flat_map(|stem| ["ttf", "otf"].map(|ext| format!("{stem}.{ext}").to_ascii_lowercase()))
            .find_map(|name| self.files.get(&name).cloned())
    }
}

/// Resolves `(family, weight)` requests to font files.
pub struct FontResolver {
    cache: Arc<FontCache>,
    catalog: Option<Arc<dyn FontCatalog>>,
    http: Arc<dyn HttpFetch>,
    settings: FontSettings,
    policy: RetryPolicy,
    index: OnceCell<LocalFontIndex>,
}

impl FontResolver {
    pub fn new(
        cache: Arc<FontCache>,
        catalog: Option<Arc<dyn FontCatalog>>,
        http: Arc<dyn HttpFetch>,
        settings: FontSettings,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            cache,
            catalog,
            http,
            settings,
            policy,
            index: OnceCell::new(),
        }
    }

    pub fn cache(&self) -> &Arc<FontCache> {
        &self.cache
    }

    pub fn default_family(&self) -> &str {
        &self.settings.default_family
    }

    async fn index(&self) -> &LocalFontIndex {
        self.index
            .get_or_init(|| LocalFontIndex::load(self.settings.clone()))
            .await
    }

    /// Resolve a request to a font file. Fails only when every step,
    /// fallbacks included, came up empty.
    pub async fn resolve(&self, request: &FontRequest) -> AdforgeResult<ResolvedFont> {
        self.resolve_steps(request).await.ok_or_else(|| {
            AdforgeError::font_resolution(
                request.family.trim(),
                request.weight,
                "no cached, local, downloaded, or fallback font",
            )
        })
    }

    async fn resolve_steps(&self, request: &FontRequest) -> Option<ResolvedFont> {
        let family = request.family.trim();
        let sample = request.sample.as_deref().unwrap_or("");
        let script = detect_script(sample);

        if has_non_latin(sample) && is_display_family(family) {
            tracing::warn!(
                family,
                script = %script,
                "Display font cannot render this text, using script fallback"
            );
            return self.resolve_fallback(script, request.weight, sample).await;
        }

        if request.italic {
            if let Some(found) = self.lookup(family, request.weight, true).await {
                return Some(found);
            }
            tracing::debug!(family, weight = request.weight, "No italic variant, using upright");
        }

        if let Some(found) = self.lookup(family, request.weight, false).await {
            return Some(found);
        }

        if let Some(font) = self.download(family, request.weight, sample, script).await {
            return Some(ResolvedFont {
                font,
                source: FontSource::Download,
            });
        }

        tracing::warn!(family, weight = request.weight, script = %script, "Font unavailable, trying fallbacks");
        self.resolve_fallback(script, request.weight, sample).await
    }

    /// The configured default family, for text whose own font failed.
    pub async fn default_font(&self, sample: Option<&str>) -> AdforgeResult<ResolvedFont> {
        let mut request = FontRequest::new(self.settings.default_family.clone(), 400);
        request.sample = sample.map(str::to_string);
        self.resolve(&request).await
    }

    /// Never fails: a file when anything resolves, else the default family
    /// name for the encoder to look up itself.
    pub async fn select(&self, request: &FontRequest) -> FontSelection {
        let err = match self.resolve(request).await {
            Ok(resolved) => {
                tracing::debug!(
                    family = %request.family,
                    weight = request.weight,
                    source = resolved.source.as_str(),
                    path = %resolved.font.path.display(),
                    "Resolved font"
                );
                return FontSelection::File(resolved);
            }
            Err(err) => err,
        };
        tracing::warn!(error = %err, "Requested font unavailable, trying default family");
        match self.default_font(request.sample.as_deref()).await {
            Ok(resolved) => FontSelection::File(resolved),
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    fallback = %self.settings.default_family,
                    "No font file available, deferring to encoder font lookup"
                );
                FontSelection::Family(self.settings.default_family.clone())
            }
        }
    }

    /// Cache, then local files.
    async fn lookup(&self, family: &str, weight: u16, italic: bool) -> Option<ResolvedFont> {
        if let Some(font) = self.cache.get(family, weight, italic) {
            return Some(ResolvedFont {
                font,
                source: FontSource::Cache,
            });
        }
        let path = self.index().await.find(family, weight, italic)?;
        let font = self
            .sanitized(
                FontFile {
                    path,
                    family: family.to_string(),
                    weight,
                    italic,
                },
                None,
            )
            .await;
        self.cache.insert(font.clone());
        Some(ResolvedFont {
            font,
            source: FontSource::Local,
        })
    }

    async fn resolve_fallback(&self, script: Script, weight: u16, sample: &str) -> Option<ResolvedFont> {
        let mut weights = vec![weight, 400];
        weights.dedup();

        for family in fallback_chain(script) {
            for w in &weights {
                if let Some(found) = self.lookup(family, *w, false).await {
                    return Some(ResolvedFont {
                        font: found.font,
                        source: FontSource::Fallback,
                    });
                }
            }
        }

        let family = last_resort_family(script);
        let font = self.download(family, 400, sample, script).await?;
        tracing::info!(family, script = %script, "Downloaded last-resort font");
        Some(ResolvedFont {
            font,
            source: FontSource::LastResort,
        })
    }

    async fn download(&self, family: &str, weight: u16, sample: &str, script: Script) -> Option<FontFile> {
        let catalog = self.catalog.as_ref()?;
        let (charset, complete) = charset_for(script, sample);

        let css = retry_operation(self.policy, "font-stylesheet", || {
            catalog.stylesheet(family, weight, Some(&charset))
        })
        .await
        .map_err(|err| tracing::warn!(family, weight, error = %err, "Font catalog request failed"))
        .ok()?;

        let Some((url, ext)) = extract_font_url(&css) else {
            tracing::warn!(family, weight, "Font stylesheet has no usable source");
            return None;
        };

        let bytes = retry_operation(self.policy, "font-download", || self.http.get(&url))
            .await
            .map_err(|err| tracing::warn!(family, weight, error = %err, "Font download failed"))
            .ok()?;

        let dir = self.settings.fonts_dir.join("downloaded");
        let compact: String = family.split_whitespace().collect();
        // Partial character sets get a unique name so local search never
        // mistakes them for the full font.
        let subset = (!complete).then(|| reference_digest(&charset));
        let name = match &subset {
            None => format!("{compact}-{weight}.{ext}"),
            Some(digest) => format!("{compact}-{weight}-{digest}.{ext}"),
        };
        let path = dir.join(name);
        let written = async {
            tokio::fs::create_dir_all(&dir).await?;
            tokio::fs::write(&path, &bytes).await
        }
        .await;
        if let Err(err) = written {
            tracing::warn!(path = %path.display(), error = %err, "Cannot store downloaded font");
            return None;
        }

        let font = self
            .sanitized(
                FontFile {
                    path,
                    family: family.to_string(),
                    weight,
                    italic: false,
                },
                subset.as_deref(),
            )
            .await;
        if complete {
            self.cache.insert(font.clone());
        }
        Some(font)
    }

    /// Copy into the sanitized directory under a `[A-Za-z0-9_-]` name.
    /// Subset files keep their digest so each one gets its own copy.
    /// On failure the original path is kept.
    async fn sanitized(&self, font: FontFile, subset: Option<&str>) -> FontFile {
        let ext = font
            .path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("ttf")
            .to_ascii_lowercase();
        let mut stem = format!(
            "{}-{}{}",
            sanitize_component(&font.family),
            font.weight,
            if font.italic { "-italic" } else { "" }
        );
        if let Some(digest) = subset {
            stem.push('-');
            stem.push_str(&sanitize_component(digest));
        }
        let target = self.settings.sanitized_dir.join(format!("{stem}.{ext}"));
        if target == font.path {
            return font;
        }

        let copied = async {
            tokio::fs::create_dir_all(&self.settings.sanitized_dir).await?;
            tokio::fs::copy(&font.path, &target).await
        }
        .await;
        match copied {
            Ok(_) => FontFile {
                path: target,
                ..font
            },
            Err(err) => {
                tracing::warn!(
                    source = %font.path.display(),
                    error = %err,
                    "Cannot copy font to sanitized directory"
                );
                font
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Catalog that serves fixed CSS per family and records requests.
    #[derive(Default)]
    pub struct FakeCatalog {
        pub css: HashMap<String, String>,
        pub requests: Mutex<Vec<(String, u16)>>,
    }

    impl FakeCatalog {
        pub fn with(family: &str, css: &str) -> Self {
            let mut catalog = Self::default();
            catalog.css.insert(family.to_string(), css.to_string());
            catalog
        }

        pub fn requested(&self) -> Vec<String> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|(f, _)| f.clone())
                .collect()
        }
    }

    #[async_trait]
    impl FontCatalog for FakeCatalog {
        async fn stylesheet(
            &self,
            family: &str,
            weight: u16,
            _charset: Option<&str>,
        ) -> Result<String, FetchError> {
            self.requests
                .lock()
                .unwrap()
                .push((family.to_string(), weight));
            self.css.get(family).cloned().ok_or(FetchError::Status {
                url: format!("catalog:{family}"),
                status: 400,
            })
        }
    }

    pub fn settings(root: &Path) -> FontSettings {
        FontSettings {
            fonts_dir: root.join("fonts"),
            system_dirs: vec![root.join("system")],
            sanitized_dir: root.join("sanitized"),
            default_family: "Noto Sans".to_string(),
            catalog_url: "https://fonts.example/css2".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::testing::{settings, FakeCatalog};
    use super::*;
    use crate::fetch::testing::FakeHttp;

    fn resolver(root: &Path, catalog: Option<Arc<FakeCatalog>>, http: Arc<FakeHttp>) -> FontResolver {
        FontResolver::new(
            Arc::new(FontCache::new()),
            catalog.map(|c| c as Arc<dyn FontCatalog>),
            http,
            settings(root),
            RetryPolicy::new(1, Duration::ZERO),
        )
    }

    fn touch(path: PathBuf) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"font").unwrap();
    }

    #[tokio::test]
    async fn test_local_pattern_then_cache() {
        let root = tempfile::tempdir().unwrap();
        touch(root.path().join("system/truetype/open-sans/OpenSans-Bold.ttf"));
        let r = resolver(root.path(), None, Arc::new(FakeHttp::new()));

        let req = FontRequest::new("Open Sans", 700);
        let first = r.resolve(&req).await.unwrap();
        assert_eq!(first.source, FontSource::Local);
        assert_eq!(first.font.path, root.path().join("sanitized/Open_Sans-700.ttf"));
        assert!(first.font.path.is_file());

        let second = r.resolve(&req).await.unwrap();
        assert_eq!(second.source, FontSource::Cache);
        assert_eq!(second.font, first.font);
    }

    #[tokio::test]
    async fn test_metadata_index() {
        let root = tempfile::tempdir().unwrap();
        touch(root.path().join("fonts/brand/brand-heavy.otf"));
        std::fs::write(
            root.path().join("fonts/fonts.json"),
            r#"{"Brand Sans": {"900": "brand/brand-heavy.otf"}}"#,
        )
        .unwrap();
        let r = resolver(root.path(), None, Arc::new(FakeHttp::new()));

        let found = r.resolve(&FontRequest::new("Brand Sans", 900)).await.unwrap();
        assert_eq!(found.source, FontSource::Local);
        assert_eq!(found.font.path.extension().unwrap(), "otf");
    }

    #[tokio::test]
    async fn test_italic_variant_preferred_when_present() {
        let root = tempfile::tempdir().unwrap();
        touch(root.path().join("fonts/Inter-BoldItalic.ttf"));
        touch(root.path().join("fonts/Inter-Bold.ttf"));
        let r = resolver(root.path(), None, Arc::new(FakeHttp::new()));

        let italic = r.resolve(&FontRequest::new("Inter", 700).italic(true)).await.unwrap();
        assert!(italic.font.italic);
        let upright = r.resolve(&FontRequest::new("Inter", 400).italic(true)).await;
        assert!(upright.map(|f| !f.font.italic).unwrap_or(true));
    }

    #[tokio::test]
    async fn test_download_from_catalog() {
        let root = tempfile::tempdir().unwrap();
        let css = "@font-face { font-family: 'Montserrat'; src: url(https://fonts.example/m.ttf) format('truetype'); }";
        let catalog = Arc::new(FakeCatalog::with("Montserrat", css));
        let http = Arc::new(FakeHttp::new());
        http.respond("https://fonts.example/m.ttf", Ok(b"ttf-bytes".to_vec()));
        let r = resolver(root.path(), Some(catalog.clone()), http);

        let found = r
            .resolve(&FontRequest::new("Montserrat", 700).sample("Big sale"))
            .await
            .unwrap();
        assert_eq!(found.source, FontSource::Download);
        assert_eq!(std::fs::read(&found.font.path).unwrap(), b"ttf-bytes");
        assert!(root.path().join("fonts/downloaded/Montserrat-700.ttf").is_file());
        assert_eq!(catalog.requested(), vec!["Montserrat".to_string()]);
    }

    #[tokio::test]
    async fn test_absent_everywhere_yields_default_family() {
        let root = tempfile::tempdir().unwrap();
        let catalog = Arc::new(FakeCatalog::default());
        let r = resolver(root.path(), Some(catalog.clone()), Arc::new(FakeHttp::new()));

        let selection = r.select(&FontRequest::new("Imaginary Grotesk", 400).sample("Hello")).await;

        assert_eq!(selection, FontSelection::Family("Noto Sans".to_string()));
        let requested = catalog.requested();
        assert_eq!(requested.first().map(String::as_str), Some("Imaginary Grotesk"));
        assert!(requested.iter().any(|f| f == "Noto Sans"));
    }

    #[tokio::test]
    async fn test_resolve_reports_font_resolution_error() {
        let root = tempfile::tempdir().unwrap();
        let r = resolver(root.path(), None, Arc::new(FakeHttp::new()));

        let err = r.resolve(&FontRequest::new("Imaginary Grotesk", 700)).await.unwrap_err();

        match err {
            AdforgeError::FontResolution { family, weight, .. } => {
                assert_eq!(family, "Imaginary Grotesk");
                assert_eq!(weight, 700);
            }
            other => panic!("expected font resolution error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fallback_chain_uses_installed_font() {
        let root = tempfile::tempdir().unwrap();
        touch(root.path().join("system/DejaVuSans.ttf"));
        let r = resolver(root.path(), None, Arc::new(FakeHttp::new()));

        let found = r.resolve(&FontRequest::new("Nope", 400)).await.unwrap();
        assert_eq!(found.source, FontSource::Fallback);
        assert_eq!(found.font.family, "DejaVu Sans");
    }

    #[tokio::test]
    async fn test_display_family_rejected_for_arabic() {
        let root = tempfile::tempdir().unwrap();
        touch(root.path().join("fonts/Lobster-Regular.ttf"));
        touch(root.path().join("system/NotoSansArabic-Regular.ttf"));
        let r = resolver(root.path(), None, Arc::new(FakeHttp::new()));

        let found = r
            .resolve(&FontRequest::new("Lobster", 400).sample("تخفيضات الربيع"))
            .await
            .unwrap();
        assert_eq!(found.source, FontSource::Fallback);
        assert_eq!(found.font.family, "Noto Sans Arabic");

        let latin = r.resolve(&FontRequest::new("Lobster", 400).sample("Sale")).await.unwrap();
        assert_eq!(latin.font.family, "Lobster");
    }

    #[tokio::test]
    async fn test_last_resort_download_per_script() {
        let root = tempfile::tempdir().unwrap();
        let css = "src: url('https://fonts.example/arabic.woff2') format('woff2');";
        let catalog = Arc::new(FakeCatalog::with("Noto Sans Arabic", css));
        let http = Arc::new(FakeHttp::new());
        http.respond("https://fonts.example/arabic.woff2", Ok(b"woff".to_vec()));
        let r = resolver(root.path(), Some(catalog), http);

        let found = r
            .resolve(&FontRequest::new("Pacifico", 400).sample("مرحبا"))
            .await
            .unwrap();
        assert_eq!(found.source, FontSource::LastResort);
        assert_eq!(found.font.path.extension().unwrap(), "woff2");
    }

    #[tokio::test]
    async fn test_cjk_subsets_keep_separate_files() {
        let root = tempfile::tempdir().unwrap();
        let css = "src: url(https://fonts.example/sc.woff2) format('woff2');";
        let catalog = Arc::new(FakeCatalog::with("Noto Sans SC", css));
        let http = Arc::new(FakeHttp::new());
        http.respond("https://fonts.example/sc.woff2", Ok(b"SUBSET-A".to_vec()));
        http.respond("https://fonts.example/sc.woff2", Ok(b"SUBSET-B".to_vec()));
        let r = resolver(root.path(), Some(catalog), http);

        let spring = r
            .resolve(&FontRequest::new("Noto Sans SC", 400).sample("春"))
            .await
            .unwrap();
        let summer = r
            .resolve(&FontRequest::new("Noto Sans SC", 400).sample("夏"))
            .await
            .unwrap();

        assert_eq!(spring.source, FontSource::Download);
        assert_eq!(summer.source, FontSource::Download);
        assert_ne!(spring.font.path, summer.font.path);
        assert!(spring.font.path.starts_with(root.path().join("sanitized")));
        assert_eq!(std::fs::read(&spring.font.path).unwrap(), b"SUBSET-A");
        assert_eq!(std::fs::read(&summer.font.path).unwrap(), b"SUBSET-B");
        assert!(r.cache().is_empty());
    }

    #[test]
    fn test_extract_font_url() {
        let css = "src: url(https://a/x.woff2) format('woff2'), url(\"https://a/x.ttf\") format(\"truetype\");";
        assert_eq!(
            extract_font_url(css),
            Some(("https://a/x.woff2".to_string(), "woff2"))
        );
        assert_eq!(
            extract_font_url("src: url(https://a/y.otf);"),
            Some(("https://a/y.otf".to_string(), "otf"))
        );
        assert_eq!(extract_font_url("src: local('Arial');"), None);
    }

    #[test]
    fn test_candidate_stems() {
        let stems = candidate_file_stems("Open Sans", 700, false);
        assert_eq!(stems[0], "OpenSans-Bold");
        assert!(stems.contains(&"OpenSans-700".to_string()));
        assert!(stems.contains(&"Open Sans Bold".to_string()));
        assert!(stems.contains(&"open-sans-bold".to_string()));

        let regular = candidate_file_stems("Open Sans", 400, false);
        assert!(regular.contains(&"OpenSans[wght]".to_string()));
        assert!(candidate_file_stems("Inter", 400, true).contains(&"Inter-Italic".to_string()));
    }

    #[test]
    fn test_stylesheet_url() {
        let catalog = GoogleFontsCatalog::new(Arc::new(FakeHttp::new()), "https://fonts.googleapis.com/css2");
        let url = catalog.stylesheet_url("Open Sans", 700, Some("Hi!")).unwrap();
        assert_eq!(
            url,
            "https://fonts.googleapis.com/css2?family=Open+Sans%3Awght%40700&text=Hi%21"
        );
    }

    #[test]
    fn test_charset_covers_block_and_sample() {
        let (latin, complete) = charset_for(Script::Latin, "Ünïcode");
        assert!(complete);
        assert!(latin.contains('A') && latin.contains('é'));
        let (cjk, complete) = charset_for(Script::Cjk, "春季");
        assert!(!complete);
        assert!(cjk.contains('春'));
    }
}
