pub mod config;
pub mod dispatch;
pub mod error;
pub mod geo;
pub mod parser;
pub mod probe;
pub mod report;
pub mod scheduler;
pub mod transport;

pub use config::{AgentConfig, DispatchMode, TransportConfig};
pub use dispatch::Dispatcher;
pub use error::{DispatchError, ParseError, ProbeError, ReportError, TickError};
pub use report::{Hop, Report, ReportBuilder};
pub use scheduler::{Schedule, Scheduler};
