//! Versioned host command/event envelopes.

use serde::{Deserialize, Serialize};

/// Contract version for host command/event envelopes.
pub const EVENT_VERSION: u32 = 1;

/// Command set accepted from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandName {
    #[serde(rename = "host.ping")]
    HostPing,
    #[serde(rename = "host.version")]
    HostVersion,
    #[serde(rename = "runtime.stop")]
    RuntimeStop,
    #[serde(rename = "dialogue.start_listening")]
    DialogueStartListening,
    #[serde(rename = "dialogue.stop_listening")]
    DialogueStopListening,
    #[serde(rename = "dialogue.stop_speaking")]
    DialogueStopSpeaking,
    #[serde(rename = "dialogue.reset")]
    DialogueReset,
    #[serde(rename = "dialogue.status")]
    DialogueStatus,
    #[serde(rename = "dialogue.set_language")]
    DialogueSetLanguage,
    #[serde(rename = "dialogue.classify")]
    DialogueClassify,
    #[serde(rename = "locale.resolve")]
    LocaleResolve,
    #[serde(rename = "locale.get")]
    LocaleGet,
    #[serde(rename = "speech.inject_utterance")]
    SpeechInjectUtterance,
    #[serde(rename = "speech.inject_error")]
    SpeechInjectError,
}

impl CommandName {
    /// Render command name to wire format.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HostPing => "host.ping",
            Self::HostVersion => "host.version",
            Self::RuntimeStop => "runtime.stop",
            Self::DialogueStartListening => "dialogue.start_listening",
            Self::DialogueStopListening => "dialogue.stop_listening",
            Self::DialogueStopSpeaking => "dialogue.stop_speaking",
            Self::DialogueReset => "dialogue.reset",
            Self::DialogueStatus => "dialogue.status",
            Self::DialogueSetLanguage => "dialogue.set_language",
            Self::DialogueClassify => "dialogue.classify",
            Self::LocaleResolve => "locale.resolve",
            Self::LocaleGet => "locale.get",
            Self::SpeechInjectUtterance => "speech.inject_utterance",
            Self::SpeechInjectError => "speech.inject_error",
        }
    }

    /// Parse a command name from wire format.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "host.ping" => Some(Self::HostPing),
            "host.version" => Some(Self::HostVersion),
            "runtime.stop" => Some(Self::RuntimeStop),
            "dialogue.start_listening" => Some(Self::DialogueStartListening),
            "dialogue.stop_listening" => Some(Self::DialogueStopListening),
            "dialogue.stop_speaking" => Some(Self::DialogueStopSpeaking),
            "dialogue.reset" => Some(Self::DialogueReset),
            "dialogue.status" => Some(Self::DialogueStatus),
            "dialogue.set_language" => Some(Self::DialogueSetLanguage),
            "dialogue.classify" => Some(Self::DialogueClassify),
            "locale.resolve" => Some(Self::LocaleResolve),
            "locale.get" => Some(Self::LocaleGet),
            "speech.inject_utterance" => Some(Self::SpeechInjectUtterance),
            "speech.inject_error" => Some(Self::SpeechInjectError),
            _ => None,
        }
    }
}

/// Event names emitted to the host.
pub mod events {
    pub const LOCALE_RESOLVED: &str = "locale.resolved";
    pub const DIALOGUE_STATE_CHANGED: &str = "dialogue.state_changed";
    pub const DIALOGUE_TRANSCRIPT_UPDATED: &str = "dialogue.transcript_updated";
    pub const DIALOGUE_RESPONSE_READY: &str = "dialogue.response_ready";
    pub const DIALOGUE_NOTICE: &str = "dialogue.notice";
}

/// A versioned response envelope from core -> host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub v: u32,
    pub request_id: String,
    pub ok: bool,
    pub payload: serde_json::Value,
    pub error: Option<String>,
}

impl ResponseEnvelope {
    /// Build a successful response envelope.
    #[must_use]
    pub fn ok(request_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            ok: true,
            payload,
            error: None,
        }
    }

    /// Build an error response envelope.
    #[must_use]
    pub fn error(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            ok: false,
            payload: serde_json::Value::Null,
            error: Some(message.into()),
        }
    }
}

/// A versioned command envelope from host -> core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub v: u32,
    pub request_id: String,
    pub command: CommandName,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl CommandEnvelope {
    /// Build a v1 command envelope.
    #[must_use]
    pub fn new(
        request_id: impl Into<String>,
        command: CommandName,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            command,
            payload,
        }
    }

    /// Validate envelope version and required identifiers.
    pub fn validate(&self) -> Result<(), ContractError> {
        if self.v != EVENT_VERSION {
            return Err(ContractError::new(
                ContractErrorKind::UnsupportedVersion,
                format!(
                    "unsupported contract version {}; expected {}",
                    self.v, EVENT_VERSION
                ),
            ));
        }
        if self.request_id.trim().is_empty() {
            return Err(ContractError::new(
                ContractErrorKind::InvalidEnvelope,
                "request_id cannot be empty".to_owned(),
            ));
        }
        Ok(())
    }
}

/// A versioned event envelope from core -> host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub v: u32,
    pub event_id: String,
    pub event: String,
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// Build a v1 event envelope.
    #[must_use]
    pub fn new(
        event_id: impl Into<String>,
        event: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            v: EVENT_VERSION,
            event_id: event_id.into(),
            event: event.into(),
            payload,
        }
    }
}

/// Contract validation error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractErrorKind {
    UnsupportedVersion,
    InvalidEnvelope,
}

/// Contract validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractError {
    pub kind: ContractErrorKind,
    pub message: String,
}

impl ContractError {
    #[must_use]
    pub fn new(kind: ContractErrorKind, message: String) -> Self {
        Self { kind, message }
    }
}

impl std::fmt::Display for ContractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ContractError {}
