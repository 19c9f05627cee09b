use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

/// Failure to obtain raw output from the probe binary.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe executable `{name}` not found in {searched:?}")]
    NotFound { name: String, searched: Vec<PathBuf> },
    #[error("failed to spawn probe `{}`: {source}", .path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("probe `{}` exited with {status}: {stderr}", .path.display())]
    ExecutionFailed {
        path: PathBuf,
        status: ExitStatus,
        stderr: String,
    },
}

/// A data row of the probe report that could not be interpreted.
#[derive(Debug, Error, PartialEq)]
#[error("line {line}: invalid {column} value `{token}`")]
pub struct ParseError {
    pub line: usize,
    pub column: &'static str,
    pub token: String,
}

#[derive(Debug, Error)]
pub enum GeoError {
    #[error("geolocation request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("geolocation disabled")]
    Disabled,
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("probe unavailable: {0}")]
    ProbeUnavailable(#[from] ProbeError),
    #[error("malformed probe output: {0}")]
    MalformedProbeOutput(#[from] ParseError),
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("invalid broker url `{0}`")]
    InvalidBrokerUrl(String),
    #[error("failed to read CA file {}: {source}", .path.display())]
    CaFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("mqtt client error: {0}")]
    Client(#[from] rumqttc::ClientError),
    #[error("mqtt connection error: {0}")]
    Connection(#[from] rumqttc::ConnectionError),
    #[error("timed out after {0:?} waiting for broker acknowledgement")]
    Timeout(std::time::Duration),
    #[error("no broker configured")]
    NoBroker,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write report: {0}")]
    Io(#[from] std::io::Error),
    #[error("delivery failed: {0}")]
    DeliveryFailed(#[from] PublishError),
}

/// Failure of one build-and-dispatch cycle.
#[derive(Debug, Error)]
pub enum TickError {
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}
