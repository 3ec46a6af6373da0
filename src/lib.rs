//! Krishi Mitra: locale detection and voice dialogue core for a farming
//! advisory assistant.
//!
//! The crate is built from independent parts connected by async channels:
//! - **Locale**: walks device position, reverse geocoding and IP
//!   geolocation to pick a region and its regional language
//! - **Speech**: a capability-gated transport for single-shot recognition
//!   and utterance playback
//! - **Dialogue**: the turn state machine (listen, process, speak) and
//!   keyword classification of farmer questions
//! - **Host**: a versioned newline-JSON command/event bridge

pub mod config;
pub mod dialogue;
pub mod error;
pub mod host;
pub mod language;
pub mod locale;
pub mod runtime;
pub mod speech;

pub use config::KrishiConfig;
pub use error::{KrishiError, Result};
pub use language::LanguageCode;
pub use runtime::{AdvisorRuntime, RuntimeEvent};
