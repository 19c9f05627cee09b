use crate::error::GeoError;
use log::{debug, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

pub const DEFAULT_GEOIP_URL: &str = "https://freegeoip.app/json/";
const GEOIP_TIMEOUT_SECS: u64 = 10;

/// Coarse location of the machine running the agent.
///
/// Field names follow the freegeoip JSON layout; ipapi-style spellings are
/// accepted on input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Location {
    pub ip: String,
    pub country_code: String,
    pub country_name: String,
    pub region_code: String,
    #[serde(alias = "region")]
    pub region_name: String,
    pub city: String,
    #[serde(alias = "postal")]
    pub zip_code: String,
    #[serde(alias = "timezone")]
    pub time_zone: String,
    pub latitude: f64,
    pub longitude: f64,
    pub metro_code: u32,
}

pub trait Geolocator {
    fn locate(&self) -> impl Future<Output = Result<Location, GeoError>> + Send;
}

/// Looks up the origin location through a freegeoip-compatible HTTP endpoint.
pub struct HttpGeolocator {
    client: Client,
    url: String,
}

impl HttpGeolocator {
    pub fn new(url: impl Into<String>) -> Result<Self, GeoError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(GEOIP_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl Geolocator for HttpGeolocator {
    async fn locate(&self) -> Result<Location, GeoError> {
        debug!("Looking up origin location via {}", self.url);
        let location = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json::<Location>()
            .await?;
        Ok(location)
    }
}

/// Used when lookups are turned off; every report carries the empty location.
pub struct NoGeolocation;

impl Geolocator for NoGeolocation {
    async fn locate(&self) -> Result<Location, GeoError> {
        Err(GeoError::Disabled)
    }
}

/// Geolocation never fails a report: errors degrade to `Location::default()`.
pub async fn locate_or_default<G: Geolocator>(geo: &G) -> Location {
    match geo.locate().await {
        Ok(location) => location,
        Err(GeoError::Disabled) => Location::default(),
        Err(e) => {
            warn!("Geolocation unavailable, using empty location: {}", e);
            Location::default()
        }
    }
}
