//! Supported assistant languages and the Indian state -> language table.

use serde::{Deserialize, Serialize};

/// Languages the assistant can listen and respond in.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageCode {
    En,
    #[default]
    Hi,
    Pa,
    Mr,
    Gu,
    Bn,
    Te,
    Ta,
}

impl LanguageCode {
    /// Every supported language, in display order.
    pub const ALL: [Self; 8] = [
        Self::En,
        Self::Hi,
        Self::Pa,
        Self::Mr,
        Self::Gu,
        Self::Bn,
        Self::Te,
        Self::Ta,
    ];

    /// Render to the two-letter wire code.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Hi => "hi",
            Self::Pa => "pa",
            Self::Mr => "mr",
            Self::Gu => "gu",
            Self::Bn => "bn",
            Self::Te => "te",
            Self::Ta => "ta",
        }
    }

    /// Parse a two-letter code, ignoring case and surrounding whitespace.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "en" => Some(Self::En),
            "hi" => Some(Self::Hi),
            "pa" => Some(Self::Pa),
            "mr" => Some(Self::Mr),
            "gu" => Some(Self::Gu),
            "bn" => Some(Self::Bn),
            "te" => Some(Self::Te),
            "ta" => Some(Self::Ta),
            _ => None,
        }
    }

    /// BCP-47 tag handed to the recognition and synthesis engines.
    #[must_use]
    pub fn speech_tag(self) -> &'static str {
        match self {
            Self::En => "en-US",
            Self::Hi => "hi-IN",
            Self::Pa => "pa-IN",
            Self::Mr => "mr-IN",
            Self::Gu => "gu-IN",
            Self::Bn => "bn-IN",
            Self::Te => "te-IN",
            Self::Ta => "ta-IN",
        }
    }

    /// Human-readable name, used in logs and host notices.
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::En => "English",
            Self::Hi => "Hindi",
            Self::Pa => "Punjabi",
            Self::Mr => "Marathi",
            Self::Gu => "Gujarati",
            Self::Bn => "Bengali",
            Self::Te => "Telugu",
            Self::Ta => "Tamil",
        }
    }
}

impl std::fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Language used when a region is unknown or no region could be detected.
pub const DEFAULT_LANGUAGE: LanguageCode = LanguageCode::Hi;

// ── State table ─────────────────────────────────────────────────────────

/// (lowercase state name, language). Odia, Kannada, Malayalam and Assamese
/// are not supported languages, so those states fall back to Hindi.
const STATE_LANGUAGE_TABLE: &[(&str, LanguageCode)] = &[
    ("punjab", LanguageCode::Pa),
    ("haryana", LanguageCode::Hi),
    ("uttar pradesh", LanguageCode::Hi),
    ("bihar", LanguageCode::Hi),
    ("west bengal", LanguageCode::Bn),
    ("odisha", LanguageCode::Hi),
    ("maharashtra", LanguageCode::Mr),
    ("gujarat", LanguageCode::Gu),
    ("rajasthan", LanguageCode::Hi),
    ("madhya pradesh", LanguageCode::Hi),
    ("karnataka", LanguageCode::Hi),
    ("andhra pradesh", LanguageCode::Te),
    ("telangana", LanguageCode::Te),
    ("tamil nadu", LanguageCode::Ta),
    ("kerala", LanguageCode::Hi),
    ("assam", LanguageCode::Hi),
    ("jharkhand", LanguageCode::Hi),
    ("chhattisgarh", LanguageCode::Hi),
    ("himachal pradesh", LanguageCode::Hi),
    ("uttarakhand", LanguageCode::Hi),
    ("goa", LanguageCode::Hi),
    ("manipur", LanguageCode::Hi),
    ("meghalaya", LanguageCode::En),
    ("mizoram", LanguageCode::En),
    ("nagaland", LanguageCode::En),
    ("sikkim", LanguageCode::Hi),
    ("tripura", LanguageCode::Hi),
    ("arunachal pradesh", LanguageCode::Hi),
    ("delhi", LanguageCode::Hi),
];

/// Look up a region in the state table without applying the default.
#[must_use]
pub fn lookup_region(region: &str) -> Option<LanguageCode> {
    let key = region.trim().to_lowercase();
    STATE_LANGUAGE_TABLE
        .iter()
        .find(|(state, _)| *state == key)
        .map(|(_, lang)| *lang)
}

/// Map a region name to its language, defaulting to Hindi when unmapped.
#[must_use]
pub fn language_for_region(region: &str) -> LanguageCode {
    lookup_region(region).unwrap_or(DEFAULT_LANGUAGE)
}

/// All regions the table knows about, for diagnostics and tests.
pub fn known_regions() -> impl Iterator<Item = (&'static str, LanguageCode)> {
    STATE_LANGUAGE_TABLE.iter().copied()
}
