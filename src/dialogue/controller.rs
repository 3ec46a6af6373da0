//! Voice dialogue controller.
//!
//! One controller task owns the [`DialogueSnapshot`] and is the only place
//! that changes it. Commands arrive over an mpsc channel from any number of
//! [`DialogueHandle`] clones; recognition and synthesis events arrive over
//! the streams returned by the [`SpeechTransport`]. The task multiplexes the
//! three with `tokio::select!`, so every transition happens on a single
//! logical actor and no lock guards dialogue state.
//!
//! ```text
//! Idle ──start──▶ Listening ──final──▶ Processing ──▶ Speaking ──end──▶ Idle
//!   ▲               │ stop / error / no result             │ stop / fail
//!   └───────────────┴──────────────────────────────────────┘
//! any ──transport fault──▶ Error ──reset / start──▶ Idle / Listening
//! ```

use super::classify::{Topic, classify};
use crate::config::DialogueConfig;
use crate::error::{KrishiError, Result};
use crate::language::LanguageCode;
use crate::speech::{
    RecognitionEvent, RecognitionStream, SpeakEvent, SpeechStream, SpeechTransport,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Controller state.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogueState {
    #[default]
    Idle,
    Listening,
    Processing,
    Speaking,
    Error,
}

impl DialogueState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Processing => "processing",
            Self::Speaking => "speaking",
            Self::Error => "error",
        }
    }

    /// Whether a new turn may start from this state.
    #[must_use]
    pub fn accepts_new_turn(self) -> bool {
        matches!(self, Self::Idle | Self::Error)
    }
}

impl std::fmt::Display for DialogueState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of the dialogue session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueSnapshot {
    pub state: DialogueState,
    pub live_transcript: String,
    pub language: LanguageCode,
}

/// Category of a user-facing dialogue notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    UnsupportedCapability,
    RecognitionFault,
    SynthesisFault,
    TransportFault,
}

/// How prominently the host should show a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Transient; the user can simply retry.
    Warning,
    /// A control is disabled or the controller needs a reset.
    Error,
}

impl NoticeKind {
    #[must_use]
    pub fn severity(self) -> Severity {
        match self {
            Self::RecognitionFault | Self::SynthesisFault => Severity::Warning,
            Self::UnsupportedCapability | Self::TransportFault => Severity::Error,
        }
    }
}

/// A non-fatal problem surfaced to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueNotice {
    pub kind: NoticeKind,
    pub severity: Severity,
    pub message: String,
}

impl DialogueNotice {
    fn new(kind: NoticeKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.severity(),
            message: message.into(),
        }
    }
}

/// Events emitted by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogueEvent {
    StateChanged(DialogueState),
    TranscriptUpdated(String),
    ResponseReady { topic: Topic, text: String },
    Notice(DialogueNotice),
}

enum Command {
    StartListening(oneshot::Sender<Result<()>>),
    StopListening(oneshot::Sender<()>),
    StopSpeaking(oneshot::Sender<()>),
    Reset(oneshot::Sender<()>),
    SetLanguage(LanguageCode, oneshot::Sender<()>),
    Snapshot(oneshot::Sender<DialogueSnapshot>),
}

/// Cloneable handle for driving a running controller.
#[derive(Clone)]
pub struct DialogueHandle {
    command_tx: mpsc::Sender<Command>,
    event_tx: broadcast::Sender<DialogueEvent>,
}

impl DialogueHandle {
    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(build(tx))
            .await
            .map_err(|_| KrishiError::Channel("dialogue controller has stopped".to_owned()))?;
        rx.await
            .map_err(|_| KrishiError::Channel("dialogue controller dropped the reply".to_owned()))
    }

    /// Begin a turn.
    ///
    /// # Errors
    ///
    /// [`KrishiError::Busy`] outside `Idle`/`Error`,
    /// [`KrishiError::UnsupportedCapability`] when the host cannot recognize
    /// speech, [`KrishiError::TransportFault`] when the transport refused
    /// unexpectedly (the controller is then in `Error`).
    pub async fn start_listening(&self) -> Result<()> {
        self.request(Command::StartListening).await?
    }

    /// Abort the in-flight recognition. No-op unless listening.
    pub async fn stop_listening(&self) -> Result<()> {
        self.request(Command::StopListening).await
    }

    /// Cut the current reply short. No-op unless speaking.
    pub async fn stop_speaking(&self) -> Result<()> {
        self.request(Command::StopSpeaking).await
    }

    /// Drop whatever is in flight and return to `Idle`.
    pub async fn reset(&self) -> Result<()> {
        self.request(Command::Reset).await
    }

    /// Change the language used from the next turn on.
    pub async fn set_language(&self, language: LanguageCode) -> Result<()> {
        self.request(|tx| Command::SetLanguage(language, tx)).await
    }

    /// Current session state.
    pub async fn snapshot(&self) -> Result<DialogueSnapshot> {
        self.request(Command::Snapshot).await
    }

    /// Subscribe to controller events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DialogueEvent> {
        self.event_tx.subscribe()
    }
}

/// The controller task. Construct with [`DialogueController::spawn`].
pub struct DialogueController {
    transport: Arc<dyn SpeechTransport>,
    session: DialogueSnapshot,
    recognition: Option<RecognitionStream>,
    speech: Option<SpeechStream>,
    command_rx: mpsc::Receiver<Command>,
    event_tx: broadcast::Sender<DialogueEvent>,
}

impl DialogueController {
    /// Start a controller task on the current tokio runtime.
    ///
    /// The task ends, releasing the transport, once every handle is dropped.
    #[must_use]
    pub fn spawn(
        transport: Arc<dyn SpeechTransport>,
        language: LanguageCode,
        config: &DialogueConfig,
    ) -> DialogueHandle {
        let (command_tx, command_rx) = mpsc::channel(config.command_capacity.max(1));
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));

        let controller = Self {
            transport,
            session: DialogueSnapshot {
                state: DialogueState::Idle,
                live_transcript: String::new(),
                language,
            },
            recognition: None,
            speech: None,
            command_rx,
            event_tx: event_tx.clone(),
        };
        tokio::spawn(controller.run());

        DialogueHandle {
            command_tx,
            event_tx,
        }
    }

    async fn run(mut self) {
        info!(lang = %self.session.language, "dialogue controller started");
        loop {
            tokio::select! {
                command = self.command_rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                event = next_event(&mut self.recognition) => self.on_recognition(event),
                event = next_event(&mut self.speech) => self.on_speech(event),
            }
        }

        if self.recognition.take().is_some() {
            self.transport.abort_recognition();
        }
        if self.speech.take().is_some() {
            self.transport.cancel_speech();
        }
        info!("dialogue controller stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::StartListening(reply) => {
                let _ = reply.send(self.start_listening());
            }
            Command::StopListening(reply) => {
                self.stop_listening();
                let _ = reply.send(());
            }
            Command::StopSpeaking(reply) => {
                self.stop_speaking();
                let _ = reply.send(());
            }
            Command::Reset(reply) => {
                self.reset();
                let _ = reply.send(());
            }
            Command::SetLanguage(language, reply) => {
                if language != self.session.language {
                    info!(from = %self.session.language, to = %language, "dialogue language changed");
                    self.session.language = language;
                }
                let _ = reply.send(());
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.session.clone());
            }
        }
    }

    fn start_listening(&mut self) -> Result<()> {
        let state = self.session.state;
        if !state.accepts_new_turn() {
            debug!(%state, "start_listening rejected");
            return Err(KrishiError::Busy(format!(
                "cannot start listening while {state}"
            )));
        }
        if !self.transport.is_recognition_supported() {
            let message = "speech recognition is not supported on this host";
            self.notify(NoticeKind::UnsupportedCapability, message);
            return Err(KrishiError::UnsupportedCapability(message.to_owned()));
        }

        // Listening owns turn-taking: any leftover speech is cut off.
        if self.speech.take().is_some() {
            debug!("cancelling leftover speech before listening");
        }
        self.transport.cancel_speech();

        self.set_transcript(String::new());
        match self.transport.recognize_once(self.session.language) {
            Ok(stream) => {
                self.recognition = Some(stream);
                self.set_state(DialogueState::Listening);
                Ok(())
            }
            Err(KrishiError::UnsupportedCapability(message)) => {
                self.notify(NoticeKind::UnsupportedCapability, message.clone());
                Err(KrishiError::UnsupportedCapability(message))
            }
            Err(e) => {
                let message = format!("recognition could not start: {e}");
                self.fault(&message);
                Err(KrishiError::TransportFault(message))
            }
        }
    }

    fn stop_listening(&mut self) {
        if self.session.state != DialogueState::Listening {
            return;
        }
        self.recognition = None;
        self.transport.abort_recognition();
        self.set_state(DialogueState::Idle);
    }

    fn stop_speaking(&mut self) {
        if self.session.state != DialogueState::Speaking {
            return;
        }
        self.speech = None;
        self.transport.cancel_speech();
        self.set_state(DialogueState::Idle);
    }

    fn reset(&mut self) {
        if self.recognition.take().is_some() {
            self.transport.abort_recognition();
        }
        if self.speech.take().is_some() {
            self.transport.cancel_speech();
        }
        self.set_state(DialogueState::Idle);
    }

    fn on_recognition(&mut self, event: Option<RecognitionEvent>) {
        match event {
            Some(RecognitionEvent::Partial(text)) => {
                debug!(partial = %text, "interim transcript");
                self.set_transcript(text);
            }
            Some(RecognitionEvent::Final(text)) => {
                self.recognition = None;
                self.set_transcript(text.clone());
                if text.trim().is_empty() {
                    debug!("empty final transcript; nothing to answer");
                    self.set_state(DialogueState::Idle);
                } else {
                    self.respond(&text);
                }
            }
            Some(RecognitionEvent::Error(message)) => {
                self.recognition = None;
                warn!(error = %message, "speech recognition failed");
                self.notify(
                    NoticeKind::RecognitionFault,
                    format!("voice recognition error: {message}"),
                );
                self.set_state(DialogueState::Idle);
            }
            None => {
                self.recognition = None;
                if self.session.state == DialogueState::Listening {
                    debug!("recognition ended without a result");
                    self.set_state(DialogueState::Idle);
                }
            }
        }
    }

    fn respond(&mut self, utterance: &str) {
        self.set_state(DialogueState::Processing);
        let language = self.session.language;
        let reply = classify(utterance, language);
        info!(topic = reply.topic.as_str(), lang = %language, "utterance classified");
        self.emit(DialogueEvent::ResponseReady {
            topic: reply.topic,
            text: reply.text.to_owned(),
        });

        if !self.transport.is_synthesis_supported() {
            self.notify(
                NoticeKind::UnsupportedCapability,
                "speech synthesis is not supported on this host",
            );
            self.set_state(DialogueState::Idle);
            return;
        }

        self.set_state(DialogueState::Speaking);
        match self.transport.speak(reply.text, language) {
            Ok(stream) => self.speech = Some(stream),
            Err(KrishiError::UnsupportedCapability(message)) => {
                self.notify(NoticeKind::UnsupportedCapability, message);
                self.set_state(DialogueState::Idle);
            }
            Err(e) => self.fault(&format!("speech could not start: {e}")),
        }
    }

    fn on_speech(&mut self, event: Option<SpeakEvent>) {
        match event {
            Some(SpeakEvent::Started) => debug!("speech playing"),
            Some(SpeakEvent::Ended | SpeakEvent::Cancelled) => {
                self.speech = None;
                if self.session.state == DialogueState::Speaking {
                    self.set_state(DialogueState::Idle);
                }
            }
            Some(SpeakEvent::Failed(message)) => {
                self.speech = None;
                warn!(error = %message, "speech synthesis failed");
                self.notify(
                    NoticeKind::SynthesisFault,
                    format!("speech playback failed: {message}"),
                );
                if self.session.state == DialogueState::Speaking {
                    self.set_state(DialogueState::Idle);
                }
            }
            None => {
                self.speech = None;
                if self.session.state == DialogueState::Speaking {
                    self.fault("speech stream closed before the utterance finished");
                }
            }
        }
    }

    fn fault(&mut self, message: &str) {
        error!(error = %message, "speech transport fault");
        if self.recognition.take().is_some() {
            self.transport.abort_recognition();
        }
        if self.speech.take().is_some() {
            self.transport.cancel_speech();
        }
        self.notify(NoticeKind::TransportFault, message);
        self.set_state(DialogueState::Error);
    }

    fn set_state(&mut self, state: DialogueState) {
        if self.session.state == state {
            return;
        }
        info!(from = %self.session.state, to = %state, "dialogue state changed");
        self.session.state = state;
        self.emit(DialogueEvent::StateChanged(state));
    }

    fn set_transcript(&mut self, text: String) {
        self.session.live_transcript = text.clone();
        self.emit(DialogueEvent::TranscriptUpdated(text));
    }

    fn notify(&self, kind: NoticeKind, message: impl Into<String>) {
        self.emit(DialogueEvent::Notice(DialogueNotice::new(kind, message)));
    }

    fn emit(&self, event: DialogueEvent) {
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }
}

/// Next event from an optional stream; pending forever when there is none.
async fn next_event<T>(stream: &mut Option<mpsc::UnboundedReceiver<T>>) -> Option<T> {
    match stream {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
