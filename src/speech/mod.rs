//! Capability-gated speech transport.
//!
//! The dialogue controller never talks to a speech engine directly. It goes
//! through [`SpeechTransport`], which exposes single-shot recognition and
//! utterance playback as event streams:
//!
//! - recognition: zero or more [`RecognitionEvent::Partial`], then exactly
//!   one [`RecognitionEvent::Final`] or [`RecognitionEvent::Error`]
//! - synthesis: [`SpeakEvent::Started`], then exactly one of
//!   [`SpeakEvent::Ended`], [`SpeakEvent::Cancelled`] or [`SpeakEvent::Failed`]
//!
//! A stream that closes without its terminal event means the session was
//! superseded (a newer recognition started) or aborted.

mod text;

pub use text::{SpokenUtterance, TextTransport};

use crate::error::Result;
use crate::language::LanguageCode;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// What the host speech engine can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechCapabilities {
    /// Speech-to-text is available.
    pub recognition: bool,
    /// Text-to-speech is available.
    pub synthesis: bool,
}

impl SpeechCapabilities {
    /// Both directions available.
    pub const FULL: Self = Self {
        recognition: true,
        synthesis: true,
    };

    /// Nothing available.
    pub const NONE: Self = Self {
        recognition: false,
        synthesis: false,
    };
}

/// Event from an in-flight recognition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// Interim hypothesis; may be revised.
    Partial(String),
    /// Final transcript; ends the session.
    Final(String),
    /// Engine error; ends the session.
    Error(String),
}

impl RecognitionEvent {
    /// Whether this event ends the recognition session.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Partial(_))
    }
}

/// Event from an in-flight utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeakEvent {
    Started,
    Ended,
    Cancelled,
    Failed(String),
}

impl SpeakEvent {
    /// Whether this event ends the utterance.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Started)
    }
}

/// Receiving half of a recognition session.
pub type RecognitionStream = mpsc::UnboundedReceiver<RecognitionEvent>;

/// Receiving half of an utterance.
pub type SpeechStream = mpsc::UnboundedReceiver<SpeakEvent>;

/// Host speech engine seen through a uniform interface.
///
/// Implementations own the microphone and speaker: a new recognition
/// releases the previous one, and a new utterance cancels the previous one.
pub trait SpeechTransport: Send + Sync + 'static {
    /// Report which speech directions the host supports.
    fn capabilities(&self) -> SpeechCapabilities;

    /// Whether [`recognize_once`](Self::recognize_once) can succeed.
    fn is_recognition_supported(&self) -> bool {
        self.capabilities().recognition
    }

    /// Whether [`speak`](Self::speak) can succeed.
    fn is_synthesis_supported(&self) -> bool {
        self.capabilities().synthesis
    }

    /// Start a single-shot recognition in `language`.
    ///
    /// Any recognition already in flight is aborted and its stream ends
    /// without a final event.
    ///
    /// # Errors
    ///
    /// [`KrishiError::UnsupportedCapability`](crate::KrishiError::UnsupportedCapability)
    /// when the host cannot recognize speech; any other error is a transport fault.
    fn recognize_once(&self, language: LanguageCode) -> Result<RecognitionStream>;

    /// Abort the in-flight recognition, if any. Idempotent.
    fn abort_recognition(&self);

    /// Speak `text` in `language`, cancelling any utterance in flight.
    ///
    /// # Errors
    ///
    /// [`KrishiError::UnsupportedCapability`](crate::KrishiError::UnsupportedCapability)
    /// when the host cannot synthesize speech; any other error is a transport fault.
    fn speak(&self, text: &str, language: LanguageCode) -> Result<SpeechStream>;

    /// Cancel the in-flight utterance, if any. Idempotent.
    fn cancel_speech(&self);
}
