//! Writing-system detection for font selection.

use std::fmt;

/// Writing systems with their own font fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Script {
    Latin,
    Cyrillic,
    Arabic,
    Cjk,
    Devanagari,
}

impl Script {
    pub fn of_char(c: char) -> Option<Script> {
        let cp = c as u32;
        match cp {
            0x0041..=0x005A | 0x0061..=0x007A | 0x00C0..=0x024F | 0x1E00..=0x1EFF => {
                Some(Script::Latin)
            }
            0x0400..=0x052F | 0x2DE0..=0x2DFF | 0xA640..=0xA69F => Some(Script::Cyrillic),
            0x0600..=0x06FF
            | 0x0750..=0x077F
            | 0x08A0..=0x08FF
            | 0xFB50..=0xFDFF
            | 0xFE70..=0xFEFF => Some(Script::Arabic),
            0x0900..=0x097F | 0xA8E0..=0xA8FF => Some(Script::Devanagari),
            0x1100..=0x11FF
            | 0x3040..=0x30FF
            | 0x3130..=0x318F
            | 0x3400..=0x4DBF
            | 0x4E00..=0x9FFF
            | 0xAC00..=0xD7AF
            | 0xF900..=0xFAFF
            | 0xFF00..=0xFFEF
            | 0x20000..=0x2FA1F => Some(Script::Cjk),
            _ => None,
        }
    }

    pub fn is_latin(self) -> bool {
        self == Script::Latin
    }

    /// Average glyph advance as a fraction of the font size.
    pub fn average_advance(self) -> f64 {
        match self {
            Script::Latin => 0.55,
            Script::Cyrillic => 0.6,
            Script::Arabic => 0.5,
            Script::Devanagari => 0.65,
            Script::Cjk => 1.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Script::Latin => "latin",
            Script::Cyrillic => "cyrillic",
            Script::Arabic => "arabic",
            Script::Cjk => "cjk",
            Script::Devanagari => "devanagari",
        }
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The dominant script of `text`. Any non-Latin script outranks Latin, so
/// a brand name inside an Arabic sentence still selects Arabic fonts.
/// Text without letters counts as Latin.
pub fn detect_script(text: &str) -> Script {
    let mut counts = [0usize; 5];
    for c in text.chars() {
        if let Some(script) = Script::of_char(c) {
            counts[index(script)] += 1;
        }
    }

    [Script::Arabic, Script::Cjk, Script::Devanagari, Script::Cyrillic]
        .into_iter()
        .filter(|s| counts[index(*s)] > 0)
        .max_by_key(|s| counts[index(*s)])
        .unwrap_or(Script::Latin)
}

/// True when `text` has any letter outside basic and extended Latin.
/// Catches scripts without a dedicated chain too (Greek, Hebrew, Thai).
pub fn has_non_latin(text: &str) -> bool {
    text.chars().any(|c| {
        c.is_alphabetic() && !matches!(Script::of_char(c), Some(Script::Latin))
    })
}

fn index(script: Script) -> usize {
    match script {
        Script::Latin => 0,
        Script::Cyrillic => 1,
        Script::Arabic => 2,
        Script::Cjk => 3,
        Script::Devanagari => 4,
    }
}
