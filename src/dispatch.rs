use crate::error::DispatchError;
use crate::report::Report;
use crate::transport::Publisher;
use log::info;
use std::io::Write;

/// Sends finished reports to exactly one destination, chosen at startup.
pub enum Dispatcher<W, P> {
    /// Pretty JSON on a local writer (stdout in the agent).
    Console(W),
    /// Compact JSON handed to a publisher.
    Transport(P),
}

impl<W: Write + Send, P: Publisher + Sync> Dispatcher<W, P> {
    pub async fn dispatch(&mut self, report: &Report) -> Result<(), DispatchError> {
        match self {
            Dispatcher::Console(out) => {
                let mut body = serde_json::to_vec_pretty(report)?;
                body.push(b'\n');
                out.write_all(&body)?;
                out.flush()?;
            }
            Dispatcher::Transport(publisher) => {
                let body = serde_json::to_vec(report)?;
                let size = body.len();
                publisher.publish(body).await?;
                info!("Published report with {} hops ({} bytes)", report.hop_count(), size);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PublishError;
    use crate::geo::Location;
    use crate::report::{Hop, ReportRecord};
    use chrono::Utc;
    use std::io;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingPublisher {
        bodies: Mutex<Vec<Vec<u8>>>,
        fail: bool,
    }

    impl Publisher for RecordingPublisher {
        async fn publish(&self, body: Vec<u8>) -> Result<(), PublishError> {
            if self.fail {
                return Err(PublishError::NoBroker);
            }
            self.bodies.lock().unwrap().push(body);
            Ok(())
        }
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn sample_report() -> Report {
        let hop = |address: &str, avg_ms: f64| Hop {
            address: address.to_string(),
            sent: 5,
            loss_percent: 20.0,
            last_ms: 1.0,
            avg_ms,
            best_ms: 0.5,
            worst_ms: 3.0,
            stddev_ms: 0.4,
        };
        Report::new(
            Utc::now(),
            vec![hop("10.0.0.1", 1.5), hop("8.8.8.8", 11.0), hop("dns.google", 12.0)],
            Duration::from_micros(2_345_678),
            Location {
                country_code: "ES".to_string(),
                ..Location::default()
            },
        )
    }

    #[tokio::test]
    async fn test_console_output_round_trips() {
        let report = sample_report();
        let mut dispatcher: Dispatcher<Vec<u8>, RecordingPublisher> = Dispatcher::Console(Vec::new());
        dispatcher.dispatch(&report).await.unwrap();

        let Dispatcher::Console(out) = dispatcher else { unreachable!() };
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("\n  \"hosts\""), "expected indented output: {text}");
        assert!(text.ends_with('\n'));

        let record: ReportRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(record, report.to_record());
        assert_eq!(record.hops, 3);
        assert_eq!(record.time, report.timestamp());
        assert_eq!(record.elapsed_time, 2_345_678_000);
    }

    #[tokio::test]
    async fn test_console_field_order_is_stable() {
        let mut dispatcher: Dispatcher<Vec<u8>, RecordingPublisher> = Dispatcher::Console(Vec::new());
        dispatcher.dispatch(&sample_report()).await.unwrap();
        let Dispatcher::Console(out) = dispatcher else { unreachable!() };
        let text = String::from_utf8(out).unwrap();

        let positions: Vec<usize> = ["\"time\"", "\"hosts\"", "\"hops\"", "\"elapsed_time\"", "\"location\""]
            .iter()
            .map(|key| text.find(key).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{positions:?}");
    }

    #[tokio::test]
    async fn test_console_write_error() {
        let mut dispatcher: Dispatcher<BrokenPipe, RecordingPublisher> = Dispatcher::Console(BrokenPipe);
        let err = dispatcher.dispatch(&sample_report()).await.unwrap_err();
        assert!(matches!(err, DispatchError::Io(_)));
    }

    #[tokio::test]
    async fn test_transport_sends_compact_json() {
        let report = sample_report();
        let mut dispatcher: Dispatcher<Vec<u8>, _> = Dispatcher::Transport(RecordingPublisher::default());
        dispatcher.dispatch(&report).await.unwrap();

        let Dispatcher::Transport(publisher) = dispatcher else { unreachable!() };
        let bodies = publisher.bodies.into_inner().unwrap();
        assert_eq!(bodies.len(), 1);
        assert!(!bodies[0].contains(&b'\n'));
        let record: ReportRecord = serde_json::from_slice(&bodies[0]).unwrap();
        assert_eq!(record.hosts[2].hostname, "dns.google");
    }

    #[tokio::test]
    async fn test_transport_failure_is_delivery_failed() {
        let publisher = RecordingPublisher {
            fail: true,
            ..RecordingPublisher::default()
        };
        let mut dispatcher: Dispatcher<Vec<u8>, _> = Dispatcher::Transport(publisher);
        let err = dispatcher.dispatch(&sample_report()).await.unwrap_err();
        assert!(matches!(err, DispatchError::DeliveryFailed(PublishError::NoBroker)));
    }
}
