//! Keyword classifier mapping an utterance to an advisory topic and reply.
//!
//! Matching is a case-insensitive substring scan over an ordered topic table;
//! the first topic with a matching keyword wins. Hindi has its own table and
//! replies. The other regional languages reuse the English replies but also
//! match the common native words for each topic.

use crate::language::LanguageCode;
use serde::{Deserialize, Serialize};

/// Advisory topics the assistant can answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Weather,
    Crop,
    Soil,
    Help,
    /// Nothing matched.
    General,
}

impl Topic {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Weather => "weather",
            Self::Crop => "crop",
            Self::Soil => "soil",
            Self::Help => "help",
            Self::General => "general",
        }
    }
}

/// Classification result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply {
    pub topic: Topic,
    pub text: &'static str,
}

struct TopicEntry {
    topic: Topic,
    keywords: &'static [&'static str],
    reply: &'static str,
}

struct LanguageTable {
    topics: &'static [TopicEntry],
    fallback: &'static str,
}

// ── Keyword tables ──────────────────────────────────────────────────────

static ENGLISH: LanguageTable = LanguageTable {
    topics: &[
        TopicEntry {
            topic: Topic::Weather,
            keywords: &["weather"],
            reply: "The weather today is pleasant with 25 degrees temperature and slight chance of rain.",
        },
        TopicEntry {
            topic: Topic::Crop,
            keywords: &["crop", "plant"],
            reply: "Your crops look healthy. Keep watering regularly and monitor for pests.",
        },
        TopicEntry {
            topic: Topic::Soil,
            keywords: &["soil"],
            reply: "For soil testing, first check the pH level. A pH between 6 to 7 is ideal for most crops.",
        },
        TopicEntry {
            topic: Topic::Help,
            keywords: &["help", "assistant"],
            reply: "I'm Krishi Mitra, your farming assistant. I can help you with weather, crops, soil information, and farming tips. What would you like to know?",
        },
    ],
    fallback: "I'm your farming assistant. I can help you with weather, crops, soil, and farming guidance. What would you like to know?",
};

static HINDI: LanguageTable = LanguageTable {
    topics: &[
        TopicEntry {
            topic: Topic::Weather,
            keywords: &["मौसम", "weather"],
            reply: "आज मौसम अच्छा है। तापमान 25 डिग्री है और हल्की बारिश की संभावना है।",
        },
        TopicEntry {
            topic: Topic::Crop,
            keywords: &["फसल", "crop"],
            reply: "आपकी फसल स्वस्थ दिख रही है। नियमित पानी देते रहें और कीट-पतंगों पर नजर रखें।",
        },
        TopicEntry {
            topic: Topic::Soil,
            keywords: &["मिट्टी", "soil"],
            reply: "मिट्टी की जांच के लिए, सबसे पहले मिट्टी का पीएच लेवल चेक करें। अच्छी फसल के लिए 6 से 7 पीएच बेहतर होता है।",
        },
    ],
    fallback: "मैं कृषि मित्र हूं। मैं आपको खेती-बाड़ी, मौसम, फसल और मिट्टी की जानकारी दे सकता हूं। आप क्या जानना चाहते हैं?",
};

/// Native words matched in addition to the English table.
/// (language, topic, keywords)
const NATIVE_KEYWORDS: &[(LanguageCode, Topic, &[&str])] = &[
    (LanguageCode::Pa, Topic::Weather, &["ਮੌਸਮ"]),
    (LanguageCode::Pa, Topic::Crop, &["ਫ਼ਸਲ", "ਫਸਲ"]),
    (LanguageCode::Pa, Topic::Soil, &["ਮਿੱਟੀ"]),
    (LanguageCode::Pa, Topic::Help, &["ਮਦਦ"]),
    (LanguageCode::Mr, Topic::Weather, &["हवामान"]),
    (LanguageCode::Mr, Topic::Crop, &["पीक"]),
    (LanguageCode::Mr, Topic::Soil, &["माती"]),
    (LanguageCode::Mr, Topic::Help, &["मदत"]),
    (LanguageCode::Gu, Topic::Weather, &["હવામાન"]),
    (LanguageCode::Gu, Topic::Crop, &["પાક"]),
    (LanguageCode::Gu, Topic::Soil, &["માટી"]),
    (LanguageCode::Gu, Topic::Help, &["મદદ"]),
    (LanguageCode::Bn, Topic::Weather, &["আবহাওয়া"]),
    (LanguageCode::Bn, Topic::Crop, &["ফসল"]),
    (LanguageCode::Bn, Topic::Soil, &["মাটি"]),
    (LanguageCode::Bn, Topic::Help, &["সাহায্য"]),
    (LanguageCode::Te, Topic::Weather, &["వాతావరణం"]),
    (LanguageCode::Te, Topic::Crop, &["పంట"]),
    (LanguageCode::Te, Topic::Soil, &["నేల", "మట్టి"]),
    (LanguageCode::Te, Topic::Help, &["సహాయం"]),
    (LanguageCode::Ta, Topic::Weather, &["வானிலை"]),
    (LanguageCode::Ta, Topic::Crop, &["பயிர்"]),
    (LanguageCode::Ta, Topic::Soil, &["மண்"]),
    (LanguageCode::Ta, Topic::Help, &["உதவி"]),
];

fn table_for(language: LanguageCode) -> &'static LanguageTable {
    match language {
        LanguageCode::Hi => &HINDI,
        _ => &ENGLISH,
    }
}

fn native_keywords(language: LanguageCode, topic: Topic) -> &'static [&'static str] {
    NATIVE_KEYWORDS
        .iter()
        .find(|(lang, t, _)| *lang == language && *t == topic)
        .map_or(&[], |(_, _, keywords)| *keywords)
}

/// Classify an utterance in `language`.
///
/// Pure and deterministic: never fails, and returns the language's general
/// reply when no keyword matches.
#[must_use]
pub fn classify(utterance: &str, language: LanguageCode) -> Reply {
    let text = utterance.to_lowercase();
    let table = table_for(language);

    for entry in table.topics {
        let native = native_keywords(language, entry.topic);
        if entry
            .keywords
            .iter()
            .chain(native.iter())
            .any(|keyword| text.contains(keyword))
        {
            return Reply {
                topic: entry.topic,
                text: entry.reply,
            };
        }
    }

    Reply {
        topic: Topic::General,
        text: table.fallback,
    }
}
