//! End-to-end voice turns through the dialogue controller.

use krishi::config::{DialogueConfig, SpeechConfig};
use krishi::dialogue::{
    DialogueController, DialogueEvent, DialogueHandle, DialogueNotice, DialogueState, NoticeKind,
    Severity, Topic,
};
use krishi::speech::{
    RecognitionEvent, RecognitionStream, SpeakEvent, SpeechCapabilities, SpeechStream,
    SpeechTransport, TextTransport,
};
use krishi::{KrishiError, LanguageCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

fn transport(words_per_minute: u32) -> TextTransport {
    TextTransport::new(&SpeechConfig {
        words_per_minute,
        ..SpeechConfig::default()
    })
}

fn spawn(transport: Arc<dyn SpeechTransport>, language: LanguageCode) -> DialogueHandle {
    DialogueController::spawn(transport, language, &DialogueConfig::default())
}

async fn next_event(rx: &mut broadcast::Receiver<DialogueEvent>) -> DialogueEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("event within timeout")
        .expect("event channel open")
}

/// Collect state changes until `last` is reached.
async fn states_until(
    rx: &mut broadcast::Receiver<DialogueEvent>,
    last: DialogueState,
) -> Vec<DialogueState> {
    let mut states = Vec::new();
    loop {
        if let DialogueEvent::StateChanged(state) = next_event(rx).await {
            states.push(state);
            if state == last {
                return states;
            }
        }
    }
}

async fn wait_for_state(handle: &DialogueHandle, state: DialogueState) {
    for _ in 0..200 {
        if handle.snapshot().await.expect("controller alive").state == state {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("controller never reached {state}");
}

#[tokio::test]
async fn english_crop_question_runs_a_full_turn() {
    let speech = transport(60_000);
    let handle = spawn(Arc::new(speech.clone()), LanguageCode::En);
    let mut events = handle.subscribe();

    handle.start_listening().await.expect("turn starts");
    assert!(speech.inject_utterance("how is my crop doing"));

    let states = states_until(&mut events, DialogueState::Idle).await;
    assert_eq!(
        states,
        vec![
            DialogueState::Listening,
            DialogueState::Processing,
            DialogueState::Speaking,
            DialogueState::Idle,
        ]
    );

    let spoken = speech.spoken();
    assert_eq!(spoken.len(), 1);
    assert_eq!(spoken[0].language, LanguageCode::En);
    assert!(spoken[0].text.starts_with("Your crops look healthy"));

    let snapshot = handle.snapshot().await.expect("controller alive");
    assert_eq!(snapshot.live_transcript, "how is my crop doing");
}

#[tokio::test]
async fn partial_transcripts_grow_before_the_response() {
    let speech = transport(60_000);
    let handle = spawn(Arc::new(speech.clone()), LanguageCode::Hi);
    let mut events = handle.subscribe();

    handle.start_listening().await.expect("turn starts");
    speech.inject_utterance("आज का मौसम");

    let mut transcripts = Vec::new();
    let reply = loop {
        match next_event(&mut events).await {
            DialogueEvent::TranscriptUpdated(text) => transcripts.push(text),
            DialogueEvent::ResponseReady { topic, text } => break (topic, text),
            _ => {}
        }
    };

    // Starting a turn clears the transcript first.
    assert_eq!(transcripts, vec!["", "आज", "आज का", "आज का मौसम"]);
    assert_eq!(reply.0, Topic::Weather);
    assert!(reply.1.starts_with("आज मौसम अच्छा है"));
}

#[tokio::test]
async fn recognition_error_surfaces_a_warning_and_returns_to_idle() {
    let speech = transport(60_000);
    let handle = spawn(Arc::new(speech.clone()), LanguageCode::En);
    let mut events = handle.subscribe();

    handle.start_listening().await.expect("turn starts");
    assert!(speech.inject_recognition_error("no-speech"));

    let notice = loop {
        if let DialogueEvent::Notice(notice) = next_event(&mut events).await {
            break notice;
        }
    };
    assert_eq!(notice.kind, NoticeKind::RecognitionFault);
    assert_eq!(notice.severity, Severity::Warning);
    assert!(notice.message.contains("no-speech"));

    wait_for_state(&handle, DialogueState::Idle).await;
    assert!(speech.spoken().is_empty());

    // The user can retry right away.
    handle.start_listening().await.expect("retry accepted");
    assert_eq!(speech.recognitions_started(), 2);
}

#[tokio::test]
async fn blank_final_transcript_returns_to_idle_without_reply() {
    let speech = transport(60_000);
    let handle = spawn(Arc::new(speech.clone()), LanguageCode::En);

    handle.start_listening().await.expect("turn starts");
    assert!(speech.inject_utterance("   "));

    wait_for_state(&handle, DialogueState::Idle).await;
    assert!(speech.spoken().is_empty());
}

#[tokio::test]
async fn stop_speaking_cuts_the_reply_short() {
    let speech = transport(1);
    let handle = spawn(Arc::new(speech.clone()), LanguageCode::En);

    handle.start_listening().await.expect("turn starts");
    speech.inject_utterance("tell me about soil");
    wait_for_state(&handle, DialogueState::Speaking).await;
    assert!(speech.is_speaking());

    handle.stop_speaking().await.expect("controller alive");
    let snapshot = handle.snapshot().await.expect("controller alive");
    assert_eq!(snapshot.state, DialogueState::Idle);
    assert!(!speech.is_speaking());
}

#[tokio::test]
async fn second_start_while_listening_is_busy() {
    let speech = transport(60_000);
    let handle = spawn(Arc::new(speech.clone()), LanguageCode::En);

    handle.start_listening().await.expect("turn starts");
    let err = handle.start_listening().await.expect_err("busy");
    assert!(matches!(err, KrishiError::Busy(_)));
    assert_eq!(speech.recognitions_started(), 1);

    handle.stop_listening().await.expect("controller alive");
    assert_eq!(
        handle.snapshot().await.expect("controller alive").state,
        DialogueState::Idle
    );
    assert!(!speech.is_recognizing());
}

#[tokio::test]
async fn host_without_recognition_gets_a_notice() {
    let speech = transport(60_000).with_capabilities(SpeechCapabilities::NONE);
    let handle = spawn(Arc::new(speech.clone()), LanguageCode::En);
    let mut events = handle.subscribe();

    let err = handle.start_listening().await.expect_err("unsupported");
    assert!(matches!(err, KrishiError::UnsupportedCapability(_)));

    match next_event(&mut events).await {
        DialogueEvent::Notice(notice) => {
            assert_eq!(notice.kind, NoticeKind::UnsupportedCapability);
            assert_eq!(notice.severity, Severity::Error);
        }
        other => panic!("expected notice, got {other:?}"),
    }
    assert_eq!(
        handle.snapshot().await.expect("controller alive").state,
        DialogueState::Idle
    );
}

#[tokio::test]
async fn host_without_synthesis_still_answers_in_text() {
    let speech = transport(60_000).with_capabilities(SpeechCapabilities {
        recognition: true,
        synthesis: false,
    });
    let handle = spawn(Arc::new(speech.clone()), LanguageCode::En);
    let mut events = handle.subscribe();

    handle.start_listening().await.expect("turn starts");
    speech.inject_utterance("I need help");

    let mut saw_reply = false;
    let mut saw_notice = false;
    loop {
        match next_event(&mut events).await {
            DialogueEvent::ResponseReady { topic, .. } => {
                assert_eq!(topic, Topic::Help);
                saw_reply = true;
            }
            DialogueEvent::Notice(notice) => {
                assert_eq!(notice.kind, NoticeKind::UnsupportedCapability);
                saw_notice = true;
            }
            DialogueEvent::StateChanged(DialogueState::Idle) => break,
            DialogueEvent::StateChanged(DialogueState::Speaking) => {
                panic!("must not speak without synthesis")
            }
            _ => {}
        }
    }
    assert!(saw_reply);
    assert!(saw_notice);
    assert!(speech.spoken().is_empty());
}

#[tokio::test]
async fn language_change_applies_to_the_next_turn() {
    let speech = transport(60_000);
    let handle = spawn(Arc::new(speech.clone()), LanguageCode::En);
    let mut events = handle.subscribe();

    handle
        .set_language(LanguageCode::Hi)
        .await
        .expect("controller alive");
    handle.start_listening().await.expect("turn starts");
    speech.inject_utterance("मिट्टी की जांच");
    states_until(&mut events, DialogueState::Idle).await;

    let spoken = speech.spoken();
    assert_eq!(spoken.len(), 1);
    assert_eq!(spoken[0].language, LanguageCode::Hi);
    assert!(spoken[0].text.starts_with("मिट्टी की जांच के लिए"));
}

/// Transport whose recognizer refuses to start for reasons other than
/// missing support.
struct BrokenRecognizer;

impl SpeechTransport for BrokenRecognizer {
    fn capabilities(&self) -> SpeechCapabilities {
        SpeechCapabilities::FULL
    }

    fn recognize_once(&self, _language: LanguageCode) -> krishi::Result<RecognitionStream> {
        Err(KrishiError::TransportFault("microphone busy".to_owned()))
    }

    fn abort_recognition(&self) {}

    fn speak(&self, _text: &str, _language: LanguageCode) -> krishi::Result<SpeechStream> {
        Err(KrishiError::TransportFault("speaker busy".to_owned()))
    }

    fn cancel_speech(&self) {}
}

#[tokio::test]
async fn transport_fault_parks_the_controller_in_error_until_reset() {
    let handle = spawn(Arc::new(BrokenRecognizer), LanguageCode::En);
    let mut events = handle.subscribe();

    let err = handle.start_listening().await.expect_err("fault");
    assert!(matches!(err, KrishiError::TransportFault(_)));

    let notice = loop {
        if let DialogueEvent::Notice(notice) = next_event(&mut events).await {
            break notice;
        }
    };
    assert_eq!(notice.kind, NoticeKind::TransportFault);
    assert_eq!(notice.severity, Severity::Error);
    assert_eq!(
        handle.snapshot().await.expect("controller alive").state,
        DialogueState::Error
    );

    handle.reset().await.expect("controller alive");
    assert_eq!(
        handle.snapshot().await.expect("controller alive").state,
        DialogueState::Idle
    );
}

/// How [`ScriptedSpeaker`] plays an utterance.
#[derive(Clone, Copy)]
enum Playback {
    /// Starts, then reports a synthesis failure.
    Fails,
    /// Starts, then drops the stream without a terminal event.
    ClosesEarly,
    /// Refuses to start with a non-capability error.
    Refuses,
}

/// Transport with working recognition and scripted playback.
struct ScriptedSpeaker {
    playback: Playback,
    recognition: std::sync::Mutex<Option<tokio::sync::mpsc::UnboundedSender<RecognitionEvent>>>,
}

impl ScriptedSpeaker {
    fn new(playback: Playback) -> Arc<Self> {
        Arc::new(Self {
            playback,
            recognition: std::sync::Mutex::new(None),
        })
    }

    fn say(&self, text: &str) {
        let tx = self
            .recognition
            .lock()
            .expect("recognition lock")
            .take()
            .expect("recognition in flight");
        tx.send(RecognitionEvent::Final(text.to_owned()))
            .expect("controller listening");
    }
}

impl SpeechTransport for ScriptedSpeaker {
    fn capabilities(&self) -> SpeechCapabilities {
        SpeechCapabilities::FULL
    }

    fn recognize_once(&self, _language: LanguageCode) -> krishi::Result<RecognitionStream> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        *self.recognition.lock().expect("recognition lock") = Some(tx);
        Ok(rx)
    }

    fn abort_recognition(&self) {
        self.recognition.lock().expect("recognition lock").take();
    }

    fn speak(&self, _text: &str, _language: LanguageCode) -> krishi::Result<SpeechStream> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        match self.playback {
            Playback::Fails => {
                let _ = tx.send(SpeakEvent::Started);
                let _ = tx.send(SpeakEvent::Failed("audio device lost".to_owned()));
            }
            Playback::ClosesEarly => {
                let _ = tx.send(SpeakEvent::Started);
            }
            Playback::Refuses => {
                return Err(KrishiError::TransportFault("speaker busy".to_owned()));
            }
        }
        Ok(rx)
    }

    fn cancel_speech(&self) {}
}

async fn notice_after_utterance(
    speaker: &Arc<ScriptedSpeaker>,
    handle: &DialogueHandle,
) -> DialogueNotice {
    let mut events = handle.subscribe();
    handle.start_listening().await.expect("turn starts");
    speaker.say("how is the weather");
    loop {
        if let DialogueEvent::Notice(notice) = next_event(&mut events).await {
            return notice;
        }
    }
}

#[tokio::test]
async fn synthesis_failure_is_a_warning_and_returns_to_idle() {
    let speaker = ScriptedSpeaker::new(Playback::Fails);
    let handle = spawn(speaker.clone(), LanguageCode::En);

    let notice = notice_after_utterance(&speaker, &handle).await;
    assert_eq!(notice.kind, NoticeKind::SynthesisFault);
    assert_eq!(notice.severity, Severity::Warning);
    assert!(notice.message.contains("audio device lost"));

    wait_for_state(&handle, DialogueState::Idle).await;
    handle.start_listening().await.expect("next turn accepted");
}

#[tokio::test]
async fn speech_stream_closing_mid_utterance_is_a_transport_fault() {
    let speaker = ScriptedSpeaker::new(Playback::ClosesEarly);
    let handle = spawn(speaker.clone(), LanguageCode::En);

    let notice = notice_after_utterance(&speaker, &handle).await;
    assert_eq!(notice.kind, NoticeKind::TransportFault);
    assert_eq!(notice.severity, Severity::Error);

    wait_for_state(&handle, DialogueState::Error).await;
    handle.reset().await.expect("controller alive");
    assert_eq!(
        handle.snapshot().await.expect("controller alive").state,
        DialogueState::Idle
    );
}

#[tokio::test]
async fn refused_playback_is_a_transport_fault() {
    let speaker = ScriptedSpeaker::new(Playback::Refuses);
    let handle = spawn(speaker.clone(), LanguageCode::En);

    let notice = notice_after_utterance(&speaker, &handle).await;
    assert_eq!(notice.kind, NoticeKind::TransportFault);
    assert_eq!(notice.severity, Severity::Error);
    assert!(notice.message.contains("speaker busy"));

    wait_for_state(&handle, DialogueState::Error).await;
    // Error accepts a fresh turn without an explicit reset.
    handle.start_listening().await.expect("turn starts from error");
    assert_eq!(
        handle.snapshot().await.expect("controller alive").state,
        DialogueState::Listening
    );
}
