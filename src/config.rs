use crate::error::PublishError;
use crate::geo::DEFAULT_GEOIP_URL;
use crate::scheduler::Schedule;
use anyhow::{Result, bail};
use clap::Parser;
use log::warn;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_TOPIC: &str = "/metrics/mtr";
const DEFAULT_CLIENT_ID: &str = "push-mtr";
const MQTT_PORT: u16 = 1883;
const MQTTS_PORT: u16 = 8883;
/// Longest accepted `--repeat` period, one year.
pub const MAX_REPEAT_SECS: u64 = 365 * 24 * 3600;

#[derive(Parser, Debug)]
#[command(name = "push-mtr", version, about = "Push mtr reports to the console or an MQTT broker")]
pub struct Cli {
    /// Target host
    pub host: String,

    /// Report cycles (mtr -c)
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..))]
    pub count: u32,

    /// Send the report every X seconds (0 runs once)
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u64).range(0..=MAX_REPEAT_SECS))]
    pub repeat: u64,

    /// MQTT topic
    #[arg(long, default_value = DEFAULT_TOPIC)]
    pub topic: String,

    /// MQTT broker URL, may be given several times
    #[arg(long = "broker-url", env = "MQTT_URL", value_delimiter = ',')]
    pub broker_urls: Vec<String>,

    /// Print the report to stdout instead of publishing it
    #[arg(long)]
    pub stdout: bool,

    /// CA certificate used to verify the broker
    #[arg(long)]
    pub tls_ca_file: Option<PathBuf>,

    /// Do not verify the broker certificate
    #[arg(long)]
    pub tls_insecure: bool,

    /// MQTT client identifier prefix
    #[arg(long, default_value = DEFAULT_CLIENT_ID)]
    pub client_id: String,

    /// Seconds to wait for the broker to acknowledge a report
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    pub publish_timeout: u64,

    /// Geolocation endpoint (freegeoip-compatible JSON)
    #[arg(long, default_value = DEFAULT_GEOIP_URL)]
    pub geoip_url: String,

    /// Skip the geolocation lookup
    #[arg(long)]
    pub no_geoip: bool,

    /// Directories searched for the mtr binary instead of PATH
    #[arg(long = "mtr-search-path")]
    pub mtr_search_path: Vec<PathBuf>,
}

/// A broker endpoint parsed from `scheme://host[:port]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl BrokerAddress {
    pub fn parse(url: &str) -> Result<Self, PublishError> {
        let invalid = || PublishError::InvalidBrokerUrl(url.to_string());

        let (scheme, rest) = url.split_once("://").unwrap_or(("tcp", url));
        let tls = match scheme.to_ascii_lowercase().as_str() {
            "tcp" | "mqtt" => false,
            "ssl" | "tls" | "mqtts" => true,
            _ => return Err(invalid()),
        };

        let authority = rest.split('/').next().unwrap_or_default();
        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) if !authority.ends_with(']') => {
                (host, port.parse::<u16>().map_err(|_| invalid())?)
            }
            _ => (authority, if tls { MQTTS_PORT } else { MQTT_PORT }),
        };
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            host: host.to_string(),
            port,
            tls,
        })
    }
}

/// Everything the MQTT publisher needs. Built once at startup.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub brokers: Vec<BrokerAddress>,
    pub client_id: String,
    pub topic: String,
    pub tls_ca_file: Option<PathBuf>,
    pub tls_verify: bool,
    pub publish_timeout: Duration,
}

impl TransportConfig {
    /// CA file or insecure mode was requested but every broker is plain TCP.
    pub fn tls_options_unused(&self) -> bool {
        (self.tls_ca_file.is_some() || !self.tls_verify) && !self.brokers.iter().any(|b| b.tls)
    }
}

#[derive(Debug, Clone)]
pub enum DispatchMode {
    Console,
    Transport(TransportConfig),
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub target: String,
    pub cycles: u32,
    pub schedule: Schedule,
    pub mode: DispatchMode,
    pub geoip_url: Option<String>,
    pub mtr_search_path: Option<Vec<PathBuf>>,
}

impl AgentConfig {
    pub fn from_cli(cli: Cli) -> Result<Self> {
        let mode = if cli.stdout {
            DispatchMode::Console
        } else {
            let urls: Vec<&str> = cli
                .broker_urls
                .iter()
                .map(|u| u.trim())
                .filter(|u| !u.is_empty())
                .collect();
            if urls.is_empty() {
                bail!("no MQTT broker URL given, use --broker-url, MQTT_URL or --stdout");
            }
            let brokers = urls
                .into_iter()
                .map(BrokerAddress::parse)
                .collect::<Result<Vec<_>, _>>()?;

            let transport = TransportConfig {
                brokers,
                client_id: format!("{}-{}", cli.client_id, uuid::Uuid::new_v4().simple()),
                topic: cli.topic,
                tls_ca_file: cli.tls_ca_file,
                tls_verify: !cli.tls_insecure,
                publish_timeout: Duration::from_secs(cli.publish_timeout),
            };
            if transport.tls_options_unused() {
                warn!("--tls-ca-file/--tls-insecure ignored: no broker URL uses ssl://, tls:// or mqtts://");
            }
            DispatchMode::Transport(transport)
        };

        Ok(Self {
            target: cli.host,
            cycles: cli.count,
            schedule: Schedule::from_secs(cli.repeat),
            mode,
            geoip_url: (!cli.no_geoip).then_some(cli.geoip_url),
            mtr_search_path: (!cli.mtr_search_path.is_empty()).then_some(cli.mtr_search_path),
        })
    }
}
