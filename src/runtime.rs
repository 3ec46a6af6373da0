//! Runtime wiring: locale resolver, speech transport and dialogue controller.
//!
//! The runtime owns one of each and republishes their output as a single
//! [`RuntimeEvent`] stream for the host.

use crate::config::KrishiConfig;
use crate::dialogue::{DialogueController, DialogueEvent, DialogueHandle};
use crate::error::Result;
use crate::language::DEFAULT_LANGUAGE;
use crate::locale::{LocaleResolver, ResolvedLocale};
use crate::speech::TextTransport;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tracing::{info, warn};

/// Events that describe what the core is doing "right now".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEvent {
    /// A locale resolution pass completed.
    LocaleResolved(ResolvedLocale),
    /// Dialogue controller output.
    Dialogue(DialogueEvent),
}

/// The assembled voice core.
pub struct AdvisorRuntime {
    config: KrishiConfig,
    resolver: LocaleResolver,
    transport: TextTransport,
    dialogue: DialogueHandle,
    event_tx: broadcast::Sender<RuntimeEvent>,
    /// Held across resolve, language hand-off and publish.
    resolving: Mutex<()>,
}

impl AdvisorRuntime {
    /// Build the runtime from configuration, using the HTTP locale sources and
    /// a [`TextTransport`].
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn start(config: KrishiConfig) -> Result<Arc<Self>> {
        config.validate()?;
        let resolver = LocaleResolver::from_config(&config.locale)?;
        let transport = TextTransport::new(&config.speech);
        Ok(Self::with_parts(config, resolver, transport))
    }

    /// Build the runtime from pre-built parts.
    #[must_use]
    pub fn with_parts(
        config: KrishiConfig,
        resolver: LocaleResolver,
        transport: TextTransport,
    ) -> Arc<Self> {
        let dialogue = DialogueController::spawn(
            Arc::new(transport.clone()),
            DEFAULT_LANGUAGE,
            &config.dialogue,
        );
        let (event_tx, _) = broadcast::channel(config.dialogue.event_capacity.max(1));
        spawn_dialogue_forwarder(dialogue.subscribe(), event_tx.clone());

        info!(
            recognition = config.speech.recognition,
            synthesis = config.speech.synthesis,
            "advisor runtime started"
        );
        Arc::new(Self {
            config,
            resolver,
            transport,
            dialogue,
            event_tx,
            resolving: Mutex::new(()),
        })
    }

    /// Run a locale resolution pass and publish the result.
    ///
    /// When `dialogue.follow_locale` is set, the resolved language becomes
    /// the dialogue language for the next turn. Concurrent calls run one
    /// after another, so the dialogue language and the published event
    /// always match the latest stored locale.
    pub async fn resolve_locale(&self) -> ResolvedLocale {
        let _resolving = self.resolving.lock().await;
        let resolved = self.resolver.resolve().await;
        if self.config.dialogue.follow_locale
            && let Err(e) = self.dialogue.set_language(resolved.language).await
        {
            warn!(error = %e, "could not hand resolved language to dialogue");
        }
        let _ = self
            .event_tx
            .send(RuntimeEvent::LocaleResolved(resolved.clone()));
        resolved
    }

    /// Result of the latest completed resolution, if any.
    #[must_use]
    pub fn locale(&self) -> Option<ResolvedLocale> {
        self.resolver.current()
    }

    #[must_use]
    pub fn resolver(&self) -> &LocaleResolver {
        &self.resolver
    }

    #[must_use]
    pub fn dialogue(&self) -> &DialogueHandle {
        &self.dialogue
    }

    #[must_use]
    pub fn transport(&self) -> &TextTransport {
        &self.transport
    }

    #[must_use]
    pub fn config(&self) -> &KrishiConfig {
        &self.config
    }

    /// Subscribe to runtime events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.event_tx.subscribe()
    }
}

fn spawn_dialogue_forwarder(
    mut dialogue_rx: broadcast::Receiver<DialogueEvent>,
    event_tx: broadcast::Sender<RuntimeEvent>,
) {
    tokio::spawn(async move {
        loop {
            match dialogue_rx.recv().await {
                Ok(event) => {
                    let _ = event_tx.send(RuntimeEvent::Dialogue(event));
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(lagged = n, "dialogue event forwarder lagged; events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
