//! Best-effort locale detection.
//!
//! A resolution pass walks a fixed chain of signal sources, strictly one
//! after another:
//!
//! 1. device position, then reverse geocoding of that position
//! 2. IP geolocation
//! 3. the default (`hi`, "India")
//!
//! Every stage is bounded by its own timeout and any failure simply advances
//! to the next stage, so a pass always ends in exactly one
//! [`ResolverState::Resolved`] and never surfaces an error.

mod sources;

pub use sources::{
    ConfiguredPosition, HttpIpLocator, HttpReverseGeocoder, IpLocator, PositionSource,
    ReverseGeocoder,
};

use crate::config::LocaleConfig;
use crate::error::Result;
use crate::language::{DEFAULT_LANGUAGE, LanguageCode, language_for_region};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

/// Location label used when no source produced a region.
pub const DEFAULT_LOCATION: &str = "India";

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Options passed to the device position source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionOptions {
    pub timeout: Duration,
    pub high_accuracy: bool,
}

/// One candidate answer from a signal source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocaleSignal {
    pub region: String,
    pub country: String,
    /// 0 for the reverse-geocoded device position, 1 for IP geolocation.
    pub source_rank: u8,
}

/// Rank of signals derived from the device position.
pub const RANK_DEVICE: u8 = 0;
/// Rank of signals derived from the caller's IP address.
pub const RANK_IP: u8 = 1;

/// Outcome of a resolution pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedLocale {
    pub language: LanguageCode,
    pub display_location: String,
}

impl ResolvedLocale {
    /// Map a signal's region through the state table.
    #[must_use]
    pub fn from_signal(signal: &LocaleSignal) -> Self {
        let region = signal.region.trim();
        Self {
            language: language_for_region(region),
            display_location: format!("{region}, {}", signal.country.trim()),
        }
    }

    /// What a pass settles on when every source failed.
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            language: DEFAULT_LANGUAGE,
            display_location: DEFAULT_LOCATION.to_owned(),
        }
    }
}

/// Observable resolver progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolverState {
    NotStarted,
    Resolving,
    Resolved(ResolvedLocale),
}

/// Per-stage time limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTimeouts {
    pub geolocation: Duration,
    pub reverse_geocode: Duration,
    pub ip_lookup: Duration,
}

impl From<&LocaleConfig> for StageTimeouts {
    fn from(config: &LocaleConfig) -> Self {
        Self {
            geolocation: config.geolocation_timeout(),
            reverse_geocode: config.reverse_geocode_timeout(),
            ip_lookup: config.ip_lookup_timeout(),
        }
    }
}

/// Runs resolution passes over a prioritized chain of sources.
pub struct LocaleResolver {
    position: Arc<dyn PositionSource>,
    geocoder: Arc<dyn ReverseGeocoder>,
    ip_locator: Arc<dyn IpLocator>,
    timeouts: StageTimeouts,
    high_accuracy: bool,
    state_tx: watch::Sender<ResolverState>,
    pass: Mutex<()>,
}

impl LocaleResolver {
    /// Build a resolver from explicit sources.
    #[must_use]
    pub fn new(
        position: Arc<dyn PositionSource>,
        geocoder: Arc<dyn ReverseGeocoder>,
        ip_locator: Arc<dyn IpLocator>,
        config: &LocaleConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(ResolverState::NotStarted);
        Self {
            position,
            geocoder,
            ip_locator,
            timeouts: StageTimeouts::from(config),
            high_accuracy: config.high_accuracy,
            state_tx,
            pass: Mutex::new(()),
        }
    }

    /// Build a resolver with the configured position and the HTTP lookups.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn from_config(config: &LocaleConfig) -> Result<Self> {
        let position = ConfiguredPosition::from_config(config)?;
        let geocoder = HttpReverseGeocoder::new(
            config.reverse_geocode_url.clone(),
            config.reverse_geocode_timeout(),
        );
        let ip_locator = HttpIpLocator::new(config.ip_lookup_url.clone(), config.ip_lookup_timeout());
        Ok(Self::new(
            Arc::new(position),
            Arc::new(geocoder),
            Arc::new(ip_locator),
            config,
        ))
    }

    /// Watch resolver progress.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ResolverState> {
        self.state_tx.subscribe()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ResolverState {
        self.state_tx.borrow().clone()
    }

    /// Result of the most recent completed pass.
    #[must_use]
    pub fn current(&self) -> Option<ResolvedLocale> {
        match &*self.state_tx.borrow() {
            ResolverState::Resolved(locale) => Some(locale.clone()),
            _ => None,
        }
    }

    /// Run one full pass. Concurrent callers queue behind the pass in flight.
    ///
    /// Never fails: exhausting every source yields [`ResolvedLocale::fallback`].
    pub async fn resolve(&self) -> ResolvedLocale {
        let _pass = self.pass.lock().await;
        self.state_tx.send_replace(ResolverState::Resolving);
        info!("locale resolution started");

        let signal = match self.device_signal().await {
            Some(signal) => Some(signal),
            None => self.ip_signal().await,
        };

        let resolved = match signal {
            Some(signal) => {
                let resolved = ResolvedLocale::from_signal(&signal);
                info!(
                    region = %signal.region,
                    rank = signal.source_rank,
                    lang = %resolved.language,
                    location = %resolved.display_location,
                    "locale resolved"
                );
                resolved
            }
            None => {
                info!("no locale source answered; using defaults");
                ResolvedLocale::fallback()
            }
        };

        self.state_tx
            .send_replace(ResolverState::Resolved(resolved.clone()));
        resolved
    }

    async fn device_signal(&self) -> Option<LocaleSignal> {
        let options = PositionOptions {
            timeout: self.timeouts.geolocation,
            high_accuracy: self.high_accuracy,
        };
        let coordinates = run_stage(
            "device geolocation",
            self.timeouts.geolocation,
            self.position.current_position(&options),
        )
        .await?;

        run_stage(
            "reverse geocoding",
            self.timeouts.reverse_geocode,
            self.geocoder.reverse_geocode(coordinates),
        )
        .await
        .filter(has_region)
    }

    async fn ip_signal(&self) -> Option<LocaleSignal> {
        run_stage(
            "ip geolocation",
            self.timeouts.ip_lookup,
            self.ip_locator.locate(),
        )
        .await
        .filter(has_region)
    }
}

fn has_region(signal: &LocaleSignal) -> bool {
    let usable = !signal.region.trim().is_empty();
    if !usable {
        debug!(rank = signal.source_rank, "signal carried no region; advancing");
    }
    usable
}

/// Await one stage under `limit`. Failures and timeouts become `None`.
async fn run_stage<T>(
    stage: &'static str,
    limit: Duration,
    source: impl Future<Output = Result<T>>,
) -> Option<T> {
    match tokio::time::timeout(limit, source).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            debug!(stage, error = %e, "locale source unavailable; advancing");
            None
        }
        Err(_) => {
            warn!(
                stage,
                timeout_ms = limit.as_millis() as u64,
                "locale source timed out; advancing"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(region: &str, country: &str) -> LocaleSignal {
        LocaleSignal {
            region: region.to_owned(),
            country: country.to_owned(),
            source_rank: RANK_DEVICE,
        }
    }

    #[test]
    fn signal_maps_through_state_table() {
        let resolved = ResolvedLocale::from_signal(&signal("Punjab", "India"));
        assert_eq!(resolved.language, LanguageCode::Pa);
        assert_eq!(resolved.display_location, "Punjab, India");
    }

    #[test]
    fn unknown_region_keeps_label_but_defaults_language() {
        let resolved = ResolvedLocale::from_signal(&signal("Ontario", "Canada"));
        assert_eq!(resolved.language, LanguageCode::Hi);
        assert_eq!(resolved.display_location, "Ontario, Canada");
    }

    #[test]
    fn fallback_is_hindi_india() {
        let fallback = ResolvedLocale::fallback();
        assert_eq!(fallback.language, LanguageCode::Hi);
        assert_eq!(fallback.display_location, "India");
    }

    #[test]
    fn blank_regions_are_not_usable() {
        assert!(!has_region(&signal("  ", "India")));
        assert!(has_region(&signal("Goa", "India")));
    }

    #[tokio::test]
    async fn run_stage_turns_timeout_into_none() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, crate::KrishiError>(1)
        };
        assert_eq!(run_stage("slow", Duration::from_millis(10), slow).await, None);
        let fast = async { Ok::<_, crate::KrishiError>(2) };
        assert_eq!(run_stage("fast", Duration::from_secs(1), fast).await, Some(2));
    }
}
