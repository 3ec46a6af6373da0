//! Text-driven speech transport for hosts that run capture and playback
//! outside this process.
//!
//! The host feeds recognized text back through [`TextTransport::inject_utterance`];
//! it arrives at the controller as growing partial transcripts followed by
//! a final transcript. Synthesis holds the output for as long as the text
//! would take to say at the configured speaking speed.

use super::{
    RecognitionEvent, RecognitionStream, SpeakEvent, SpeechCapabilities, SpeechStream,
    SpeechTransport,
};
use crate::config::{SPEECH_MULTIPLIER_RANGE, SpeechConfig};
use crate::error::{KrishiError, Result};
use crate::language::LanguageCode;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// An utterance handed to the output device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpokenUtterance {
    pub text: String,
    pub language: LanguageCode,
}

struct ActiveRecognition {
    language: LanguageCode,
    tx: mpsc::UnboundedSender<RecognitionEvent>,
}

struct ActiveSpeech {
    id: u64,
    cancel: CancellationToken,
}

#[derive(Default)]
struct TransportState {
    recognition: Option<ActiveRecognition>,
    speech: Option<ActiveSpeech>,
    next_speech_id: u64,
    recognitions_started: u64,
    spoken: Vec<SpokenUtterance>,
}

/// Speech transport driven by injected text. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct TextTransport {
    capabilities: SpeechCapabilities,
    words_per_minute: u32,
    rate: f32,
    pitch: f32,
    state: Arc<Mutex<TransportState>>,
}

impl TextTransport {
    /// Build a transport from the speech section of the config.
    #[must_use]
    pub fn new(config: &SpeechConfig) -> Self {
        Self {
            capabilities: SpeechCapabilities {
                recognition: config.recognition,
                synthesis: config.synthesis,
            },
            words_per_minute: config.words_per_minute.max(1),
            rate: clamp_multiplier(config.rate),
            pitch: clamp_multiplier(config.pitch),
            state: Arc::new(Mutex::new(TransportState::default())),
        }
    }

    /// Override the advertised capabilities.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: SpeechCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    fn lock(&self) -> MutexGuard<'_, TransportState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver recognized text to the in-flight recognition.
    ///
    /// Returns `false` when no recognition is listening.
    pub fn inject_utterance(&self, text: &str) -> bool {
        let Some(active) = self.lock().recognition.take() else {
            debug!("utterance injected with no recognition in flight; dropped");
            return false;
        };

        let words: Vec<&str> = text.split_whitespace().collect();
        for end in 1..words.len() {
            let _ = active
                .tx
                .send(RecognitionEvent::Partial(words[..end].join(" ")));
        }
        let _ = active.tx.send(RecognitionEvent::Final(words.join(" ")));
        debug!(
            language = %active.language,
            words = words.len(),
            "utterance delivered to recognition"
        );
        true
    }

    /// Fail the in-flight recognition with `message`.
    ///
    /// Returns `false` when no recognition is listening.
    pub fn inject_recognition_error(&self, message: &str) -> bool {
        let Some(active) = self.lock().recognition.take() else {
            return false;
        };
        let _ = active.tx.send(RecognitionEvent::Error(message.to_owned()));
        true
    }

    /// Whether a recognition is currently holding the microphone.
    #[must_use]
    pub fn is_recognizing(&self) -> bool {
        self.lock().recognition.is_some()
    }

    /// Whether an utterance is currently holding the speaker.
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.lock().speech.is_some()
    }

    /// Number of recognitions started over the transport's lifetime.
    #[must_use]
    pub fn recognitions_started(&self) -> u64 {
        self.lock().recognitions_started
    }

    /// Every utterance handed to [`speak`](SpeechTransport::speak), oldest first.
    #[must_use]
    pub fn spoken(&self) -> Vec<SpokenUtterance> {
        self.lock().spoken.clone()
    }

    fn speaking_time(&self, text: &str) -> Duration {
        let words = text.split_whitespace().count() as f64;
        let seconds = words * 60.0 / f64::from(self.words_per_minute) / f64::from(self.rate);
        Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
    }
}

/// Pull a rate or pitch into the supported range; NaN falls back to 1.0.
fn clamp_multiplier(value: f32) -> f32 {
    if value.is_nan() {
        1.0
    } else {
        value.clamp(*SPEECH_MULTIPLIER_RANGE.start(), *SPEECH_MULTIPLIER_RANGE.end())
    }
}

impl SpeechTransport for TextTransport {
    fn capabilities(&self) -> SpeechCapabilities {
        self.capabilities
    }

    fn recognize_once(&self, language: LanguageCode) -> Result<RecognitionStream> {
        if !self.capabilities.recognition {
            return Err(KrishiError::UnsupportedCapability(
                "speech recognition is not available on this host".to_owned(),
            ));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.lock();
        if state.recognition.take().is_some() {
            debug!("new recognition supersedes the one in flight");
        }
        state.recognition = Some(ActiveRecognition { language, tx });
        state.recognitions_started += 1;
        info!(lang = language.speech_tag(), "recognition started");
        Ok(rx)
    }

    fn abort_recognition(&self) {
        if self.lock().recognition.take().is_some() {
            info!("recognition aborted");
        }
    }

    fn speak(&self, text: &str, language: LanguageCode) -> Result<SpeechStream> {
        if !self.capabilities.synthesis {
            return Err(KrishiError::UnsupportedCapability(
                "speech synthesis is not available on this host".to_owned(),
            ));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let id = {
            let mut state = self.lock();
            if let Some(previous) = state.speech.take() {
                previous.cancel.cancel();
            }
            state.next_speech_id += 1;
            let id = state.next_speech_id;
            state.speech = Some(ActiveSpeech {
                id,
                cancel: cancel.clone(),
            });
            state.spoken.push(SpokenUtterance {
                text: text.to_owned(),
                language,
            });
            id
        };

        let duration = self.speaking_time(text);
        info!(
            lang = language.speech_tag(),
            rate = self.rate,
            pitch = self.pitch,
            duration_ms = duration.as_millis() as u64,
            "utterance started"
        );
        let _ = tx.send(SpeakEvent::Started);

        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let outcome = tokio::select! {
                () = cancel.cancelled() => SpeakEvent::Cancelled,
                () = tokio::time::sleep(duration) => SpeakEvent::Ended,
            };
            {
                let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                if state.speech.as_ref().is_some_and(|s| s.id == id) {
                    state.speech = None;
                }
            }
            let _ = tx.send(outcome);
        });

        Ok(rx)
    }

    fn cancel_speech(&self) {
        if let Some(active) = self.lock().speech.take() {
            active.cancel.cancel();
            info!("utterance cancelled");
        }
    }
}
