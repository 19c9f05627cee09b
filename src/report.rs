use crate::error::ReportError;
use crate::geo::{Geolocator, Location, locate_or_default};
use crate::parser::parse_report;
use crate::probe::{Probe, ProbeRequest};
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize, Serializer};
use std::net::IpAddr;
use std::time::{Duration, Instant};

/// Statistics for one hop of the path, as reported by the probe.
#[derive(Debug, Clone, PartialEq)]
pub struct Hop {
    pub address: String,
    pub sent: u32,
    pub loss_percent: f64,
    pub last_ms: f64,
    pub avg_ms: f64,
    pub best_ms: f64,
    pub worst_ms: f64,
    pub stddev_ms: f64,
}

/// One completed probe run. Immutable once built.
#[derive(Debug, Clone)]
pub struct Report {
    timestamp: DateTime<Utc>,
    hops: Vec<Hop>,
    elapsed: Duration,
    location: Location,
}

impl Report {
    pub(crate) fn new(
        timestamp: DateTime<Utc>,
        hops: Vec<Hop>,
        elapsed: Duration,
        location: Location,
    ) -> Self {
        Self {
            timestamp,
            hops,
            elapsed,
            location,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn hops(&self) -> &[Hop] {
        &self.hops
    }

    pub fn hop_count(&self) -> usize {
        self.hops.len()
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn to_record(&self) -> ReportRecord {
        ReportRecord {
            time: self.timestamp,
            hosts: self
                .hops
                .iter()
                .enumerate()
                .map(|(i, hop)| HostRecord::from_hop(i + 1, hop))
                .collect(),
            hops: self.hop_count(),
            elapsed_time: u64::try_from(self.elapsed.as_nanos()).unwrap_or(u64::MAX),
            location: self.location.clone(),
        }
    }
}

impl Serialize for Report {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_record().serialize(serializer)
    }
}

/// Wire form of a report. `elapsed_time` is in nanoseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub time: DateTime<Utc>,
    pub hosts: Vec<HostRecord>,
    pub hops: usize,
    pub elapsed_time: u64,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostRecord {
    pub ip: String,
    pub hostname: String,
    #[serde(rename = "hop-number")]
    pub hop_number: usize,
    pub sent: u32,
    #[serde(rename = "lost-percent")]
    pub lost_percent: f64,
    pub last: f64,
    pub mean: f64,
    pub best: f64,
    pub worst: f64,
    #[serde(rename = "standard-dev")]
    pub standard_dev: f64,
}

impl HostRecord {
    fn from_hop(hop_number: usize, hop: &Hop) -> Self {
        // mtr prints either an address or a resolved name in the same column
        let hostname = match hop.address.parse::<IpAddr>() {
            Ok(_) => String::new(),
            Err(_) => hop.address.clone(),
        };
        Self {
            ip: hop.address.clone(),
            hostname,
            hop_number,
            sent: hop.sent,
            lost_percent: hop.loss_percent,
            last: hop.last_ms,
            mean: hop.avg_ms,
            best: hop.best_ms,
            worst: hop.worst_ms,
            standard_dev: hop.stddev_ms,
        }
    }
}

/// Runs the probe, parses its output and attaches timing and location.
pub struct ReportBuilder<P, G> {
    probe: P,
    geo: G,
    extra_flags: Vec<String>,
}

impl<P: Probe, G: Geolocator> ReportBuilder<P, G> {
    pub fn new(probe: P, geo: G) -> Self {
        Self {
            probe,
            geo,
            extra_flags: Vec::new(),
        }
    }

    /// Flags appended after the target on every probe invocation.
    pub fn with_extra_flags(mut self, flags: Vec<String>) -> Self {
        self.extra_flags = flags;
        self
    }

    pub async fn build(&self, cycles: u32, target: &str) -> Result<Report, ReportError> {
        let timestamp = Utc::now();
        let start = Instant::now();

        let request = ProbeRequest {
            target: target.to_string(),
            cycles,
            extra_flags: self.extra_flags.clone(),
        };
        let output = self.probe.run(&request).await?;
        let hops = parse_report(&output)?;
        let elapsed = start.elapsed();
        debug!("Parsed {} hops toward {} in {:?}", hops.len(), target, elapsed);

        let location = locate_or_default(&self.geo).await;

        Ok(Report::new(timestamp, hops, elapsed, location))
    }
}
