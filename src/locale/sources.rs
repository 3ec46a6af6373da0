//! Locale signal sources: device position, reverse geocoding, IP geolocation.

use super::{Coordinates, DEFAULT_LOCATION, LocaleSignal, PositionOptions, RANK_DEVICE, RANK_IP};
use crate::config::LocaleConfig;
use crate::error::{KrishiError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Supplies the device's current position.
#[async_trait]
pub trait PositionSource: Send + Sync {
    /// # Errors
    ///
    /// Fails when positioning is unsupported, denied, or unavailable.
    async fn current_position(&self, options: &PositionOptions) -> Result<Coordinates>;
}

/// Maps coordinates to a region and country.
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    /// # Errors
    ///
    /// Fails on transport errors or when the answer carries no region.
    async fn reverse_geocode(&self, at: Coordinates) -> Result<LocaleSignal>;
}

/// Locates the caller by IP address.
#[async_trait]
pub trait IpLocator: Send + Sync {
    /// # Errors
    ///
    /// Fails on transport errors or when the answer lacks region or country.
    async fn locate(&self) -> Result<LocaleSignal>;
}

// ── Device position ─────────────────────────────────────────────────────

/// Position handed over by the host through configuration.
///
/// Hosts without positioning leave the coordinates unset, which makes the
/// source report the capability as unsupported.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfiguredPosition {
    coordinates: Option<Coordinates>,
}

impl ConfiguredPosition {
    #[must_use]
    pub fn new(coordinates: Option<Coordinates>) -> Self {
        Self { coordinates }
    }

    /// # Errors
    ///
    /// Returns a config error when only one of latitude/longitude is set.
    pub fn from_config(config: &LocaleConfig) -> Result<Self> {
        match (config.latitude, config.longitude) {
            (Some(latitude), Some(longitude)) => Ok(Self::new(Some(Coordinates {
                latitude,
                longitude,
            }))),
            (None, None) => Ok(Self::new(None)),
            _ => Err(KrishiError::Config(
                "locale.latitude and locale.longitude must be set together".to_owned(),
            )),
        }
    }
}

#[async_trait]
impl PositionSource for ConfiguredPosition {
    async fn current_position(&self, options: &PositionOptions) -> Result<Coordinates> {
        debug!(high_accuracy = options.high_accuracy, "device position requested");
        self.coordinates.ok_or_else(|| {
            KrishiError::UnsupportedCapability("no device position available".to_owned())
        })
    }
}

// ── HTTP lookups ────────────────────────────────────────────────────────

fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

fn unavailable(source: &str, e: impl std::fmt::Display) -> KrishiError {
    KrishiError::SourceUnavailable(format!("{source}: {e}"))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReverseGeocodeReply {
    principal_subdivision: Option<String>,
    country_name: Option<String>,
}

/// Reverse geocoding over HTTP (`latitude`, `longitude`, `localityLanguage=en`).
pub struct HttpReverseGeocoder {
    client: reqwest::Client,
    url: String,
}

impl HttpReverseGeocoder {
    #[must_use]
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            url: url.into(),
        }
    }
}

#[async_trait]
impl ReverseGeocoder for HttpReverseGeocoder {
    async fn reverse_geocode(&self, at: Coordinates) -> Result<LocaleSignal> {
        let reply: ReverseGeocodeReply = self
            .client
            .get(&self.url)
            .query(&[
                ("latitude", at.latitude.to_string()),
                ("longitude", at.longitude.to_string()),
                ("localityLanguage", "en".to_owned()),
            ])
            .send()
            .await
            .map_err(|e| unavailable("reverse geocode", e))?
            .error_for_status()
            .map_err(|e| unavailable("reverse geocode", e))?
            .json()
            .await
            .map_err(|e| unavailable("reverse geocode", e))?;

        let region = non_blank(reply.principal_subdivision)
            .ok_or_else(|| unavailable("reverse geocode", "reply carried no region"))?;
        let country =
            non_blank(reply.country_name).unwrap_or_else(|| DEFAULT_LOCATION.to_owned());

        Ok(LocaleSignal {
            region,
            country,
            source_rank: RANK_DEVICE,
        })
    }
}

#[derive(Debug, Deserialize)]
struct IpLookupReply {
    region: Option<String>,
    country_name: Option<String>,
}

/// IP geolocation over HTTP (plain GET, no parameters).
pub struct HttpIpLocator {
    client: reqwest::Client,
    url: String,
}

impl HttpIpLocator {
    #[must_use]
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            url: url.into(),
        }
    }
}

#[async_trait]
impl IpLocator for HttpIpLocator {
    async fn locate(&self) -> Result<LocaleSignal> {
        let reply: IpLookupReply = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| unavailable("ip lookup", e))?
            .error_for_status()
            .map_err(|e| unavailable("ip lookup", e))?
            .json()
            .await
            .map_err(|e| unavailable("ip lookup", e))?;

        match (non_blank(reply.region), non_blank(reply.country_name)) {
            (Some(region), Some(country)) => Ok(LocaleSignal {
                region,
                country,
                source_rank: RANK_IP,
            }),
            _ => Err(unavailable("ip lookup", "reply lacked region or country")),
        }
    }
}
