//! Host command channel and router.
//!
//! [`HostCommandClient`] sends validated [`CommandEnvelope`]s to a
//! [`HostCommandServer`], which routes them onto the [`AdvisorRuntime`] and
//! answers each with one [`ResponseEnvelope`]. Runtime events are translated
//! into [`EventEnvelope`]s on a broadcast channel that every client can
//! subscribe to.

use crate::dialogue::{DialogueEvent, classify};
use crate::error::{KrishiError, Result};
use crate::host::contract::{
    CommandEnvelope, CommandName, EVENT_VERSION, EventEnvelope, ResponseEnvelope, events,
};
use crate::language::LanguageCode;
use crate::runtime::{AdvisorRuntime, RuntimeEvent};
use crate::speech::SpeechTransport as _;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::warn;

struct HostCommandRequest {
    envelope: CommandEnvelope,
    response_tx: oneshot::Sender<ResponseEnvelope>,
}

#[derive(Clone)]
pub struct HostCommandClient {
    request_tx: mpsc::Sender<HostCommandRequest>,
    event_tx: broadcast::Sender<EventEnvelope>,
}

impl HostCommandClient {
    pub async fn send(&self, envelope: CommandEnvelope) -> Result<ResponseEnvelope> {
        envelope.validate().map_err(|e| {
            KrishiError::Contract(format!(
                "invalid host command envelope {}: {}",
                envelope.request_id, e
            ))
        })?;

        let (response_tx, response_rx) = oneshot::channel();
        self.request_tx
            .send(HostCommandRequest {
                envelope,
                response_tx,
            })
            .await
            .map_err(|e| {
                KrishiError::Channel(format!("failed to send host command request: {e}"))
            })?;

        response_rx
            .await
            .map_err(|e| KrishiError::Channel(format!("host command response dropped: {e}")))
    }

    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<EventEnvelope> {
        self.event_tx.subscribe()
    }
}

pub struct HostCommandServer {
    request_rx: mpsc::Receiver<HostCommandRequest>,
    runtime: Arc<AdvisorRuntime>,
}

/// Create a connected client/server pair over `runtime`.
///
/// Must be called inside a tokio runtime: a background task starts
/// translating runtime events into event envelopes.
#[must_use]
pub fn command_channel(
    request_capacity: usize,
    event_capacity: usize,
    runtime: Arc<AdvisorRuntime>,
) -> (HostCommandClient, HostCommandServer) {
    let (request_tx, request_rx) = mpsc::channel(request_capacity.max(1));
    let (event_tx, _event_rx) = broadcast::channel(event_capacity.max(1));
    spawn_event_translator(runtime.subscribe(), event_tx.clone());

    (
        HostCommandClient {
            request_tx,
            event_tx,
        },
        HostCommandServer {
            request_rx,
            runtime,
        },
    )
}

impl HostCommandServer {
    pub async fn run(mut self) {
        while let Some(request) = self.request_rx.recv().await {
            let request_id = request.envelope.request_id.clone();
            let response = match self.route(&request.envelope).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(
                        request_id = %request_id,
                        command = request.envelope.command.as_str(),
                        error = %e,
                        "host command failed"
                    );
                    ResponseEnvelope::error(request_id, e.to_string())
                }
            };
            let _ = request.response_tx.send(response);
        }
    }

    /// Route a command envelope to the runtime.
    pub async fn route(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let payload = match envelope.command {
            CommandName::HostPing => json!({"pong": true}),
            CommandName::HostVersion => json!({
                "contract_version": EVENT_VERSION,
                "core_version": env!("CARGO_PKG_VERSION"),
            }),
            CommandName::RuntimeStop => json!({"stopping": true}),
            CommandName::DialogueStartListening => {
                self.runtime.dialogue().start_listening().await?;
                json!({"accepted": true})
            }
            CommandName::DialogueStopListening => {
                self.runtime.dialogue().stop_listening().await?;
                json!({"accepted": true})
            }
            CommandName::DialogueStopSpeaking => {
                self.runtime.dialogue().stop_speaking().await?;
                json!({"accepted": true})
            }
            CommandName::DialogueReset => {
                self.runtime.dialogue().reset().await?;
                json!({"accepted": true})
            }
            CommandName::DialogueStatus => self.handle_dialogue_status().await?,
            CommandName::DialogueSetLanguage => {
                let language = parse_language(&envelope.payload)?;
                self.runtime.dialogue().set_language(language).await?;
                json!({"accepted": true, "language": language})
            }
            CommandName::DialogueClassify => self.handle_dialogue_classify(envelope).await?,
            CommandName::LocaleResolve => {
                let runtime = Arc::clone(&self.runtime);
                tokio::spawn(async move {
                    runtime.resolve_locale().await;
                });
                json!({"accepted": true})
            }
            CommandName::LocaleGet => match self.runtime.locale() {
                Some(locale) => json!({"resolved": true, "locale": locale}),
                None => json!({"resolved": false, "locale": null}),
            },
            CommandName::SpeechInjectUtterance => {
                let text = parse_text(&envelope.payload, "text")?;
                let delivered = self.runtime.transport().inject_utterance(text);
                json!({"delivered": delivered})
            }
            CommandName::SpeechInjectError => {
                let message = parse_text(&envelope.payload, "message")?;
                let delivered = self.runtime.transport().inject_recognition_error(message);
                json!({"delivered": delivered})
            }
        };
        Ok(ResponseEnvelope::ok(envelope.request_id.clone(), payload))
    }

    async fn handle_dialogue_status(&self) -> Result<Value> {
        let snapshot = self.runtime.dialogue().snapshot().await?;
        let transport = self.runtime.transport();
        Ok(json!({
            "state": snapshot.state,
            "live_transcript": snapshot.live_transcript,
            "language": snapshot.language,
            "recognition_supported": transport.is_recognition_supported(),
            "synthesis_supported": transport.is_synthesis_supported(),
        }))
    }

    /// Classify text against the voice keyword tables without touching the
    /// dialogue session or the speaker.
    async fn handle_dialogue_classify(&self, envelope: &CommandEnvelope) -> Result<Value> {
        let text = parse_text(&envelope.payload, "text")?;
        let language = match envelope.payload.get("language") {
            Some(Value::Null) | None => self.runtime.dialogue().snapshot().await?.language,
            Some(_) => parse_language(&envelope.payload)?,
        };
        let reply = classify(text, language);
        Ok(json!({
            "topic": reply.topic,
            "text": reply.text,
            "language": language,
        }))
    }
}

fn parse_text<'a>(payload: &'a Value, field: &str) -> Result<&'a str> {
    let text = payload
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| KrishiError::Contract(format!("missing string field `{field}`")))?;
    if text.trim().is_empty() {
        return Err(KrishiError::Contract(format!("`{field}` cannot be empty")));
    }
    Ok(text)
}

fn parse_language(payload: &Value) -> Result<LanguageCode> {
    let raw = payload
        .get("language")
        .and_then(Value::as_str)
        .ok_or_else(|| KrishiError::Contract("missing string field `language`".to_owned()))?;
    LanguageCode::parse(raw)
        .ok_or_else(|| KrishiError::Contract(format!("unsupported language `{raw}`")))
}

/// Translate one runtime event into its host envelope.
#[must_use]
pub fn event_envelope(event: &RuntimeEvent) -> EventEnvelope {
    let (name, payload) = match event {
        RuntimeEvent::LocaleResolved(locale) => (
            events::LOCALE_RESOLVED,
            json!({
                "language": locale.language,
                "language_name": locale.language.display_name(),
                "display_location": locale.display_location,
            }),
        ),
        RuntimeEvent::Dialogue(DialogueEvent::StateChanged(state)) => {
            (events::DIALOGUE_STATE_CHANGED, json!({"state": state}))
        }
        RuntimeEvent::Dialogue(DialogueEvent::TranscriptUpdated(text)) => {
            (events::DIALOGUE_TRANSCRIPT_UPDATED, json!({"text": text}))
        }
        RuntimeEvent::Dialogue(DialogueEvent::ResponseReady { topic, text }) => (
            events::DIALOGUE_RESPONSE_READY,
            json!({"topic": topic, "text": text}),
        ),
        RuntimeEvent::Dialogue(DialogueEvent::Notice(notice)) => (
            events::DIALOGUE_NOTICE,
            json!({
                "kind": notice.kind,
                "severity": notice.severity,
                "message": notice.message,
            }),
        ),
    };
    EventEnvelope::new(uuid::Uuid::new_v4().to_string(), name, payload)
}

fn spawn_event_translator(
    mut runtime_rx: broadcast::Receiver<RuntimeEvent>,
    event_tx: broadcast::Sender<EventEnvelope>,
) {
    tokio::spawn(async move {
        loop {
            match runtime_rx.recv().await {
                Ok(event) => {
                    let _ = event_tx.send(event_envelope(&event));
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(lagged = n, "host event translator lagged; events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::dialogue::{DialogueNotice, DialogueState, NoticeKind, Severity, Topic};
    use crate::locale::ResolvedLocale;

    #[test]
    fn parse_text_rejects_missing_and_blank() {
        assert!(parse_text(&json!({}), "text").is_err());
        assert!(parse_text(&json!({"text": "  "}), "text").is_err());
        assert!(parse_text(&json!({"text": 5}), "text").is_err());
        assert_eq!(parse_text(&json!({"text": "soil"}), "text").unwrap(), "soil");
    }

    #[test]
    fn parse_language_accepts_known_codes_only() {
        assert_eq!(
            parse_language(&json!({"language": "bn"})).unwrap(),
            LanguageCode::Bn
        );
        assert!(parse_language(&json!({"language": "fr"})).is_err());
        assert!(parse_language(&json!({})).is_err());
    }

    #[test]
    fn locale_event_payload() {
        let envelope = event_envelope(&RuntimeEvent::LocaleResolved(ResolvedLocale {
            language: LanguageCode::Pa,
            display_location: "Punjab, India".into(),
        }));
        assert_eq!(envelope.v, EVENT_VERSION);
        assert_eq!(envelope.event, events::LOCALE_RESOLVED);
        assert_eq!(envelope.payload["language"], "pa");
        assert_eq!(envelope.payload["language_name"], "Punjabi");
        assert_eq!(envelope.payload["display_location"], "Punjab, India");
        assert!(!envelope.event_id.is_empty());
    }

    #[test]
    fn dialogue_event_payloads() {
        let state = event_envelope(&RuntimeEvent::Dialogue(DialogueEvent::StateChanged(
            DialogueState::Speaking,
        )));
        assert_eq!(state.event, events::DIALOGUE_STATE_CHANGED);
        assert_eq!(state.payload["state"], "speaking");

        let response = event_envelope(&RuntimeEvent::Dialogue(DialogueEvent::ResponseReady {
            topic: Topic::Soil,
            text: "check the pH".into(),
        }));
        assert_eq!(response.payload["topic"], "soil");
        assert_eq!(response.payload["text"], "check the pH");

        let notice = event_envelope(&RuntimeEvent::Dialogue(DialogueEvent::Notice(
            DialogueNotice {
                kind: NoticeKind::RecognitionFault,
                severity: Severity::Warning,
                message: "no-speech".into(),
            },
        )));
        assert_eq!(notice.event, events::DIALOGUE_NOTICE);
        assert_eq!(notice.payload["kind"], "recognition_fault");
        assert_eq!(notice.payload["severity"], "warning");
    }
}
