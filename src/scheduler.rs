use crate::dispatch::Dispatcher;
use crate::error::TickError;
use crate::geo::Geolocator;
use crate::probe::Probe;
use crate::report::ReportBuilder;
use crate::transport::Publisher;
use log::{error, info, warn};
use std::io::Write;
use std::time::Duration;
use tokio::time::{Instant, sleep_until};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Build and dispatch a single report.
    OneShot,
    /// Build and dispatch on every period boundary until the process is killed.
    Repeating(Duration),
}

impl Schedule {
    pub fn from_secs(secs: u64) -> Self {
        match secs {
            0 => Schedule::OneShot,
            secs => Schedule::Repeating(Duration::from_secs(secs)),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TickStats {
    pub succeeded: u64,
    pub failed: u64,
}

/// Drives build-and-dispatch cycles. Only one cycle is ever in flight.
pub struct Scheduler<P, G, W, Pb> {
    builder: ReportBuilder<P, G>,
    dispatcher: Dispatcher<W, Pb>,
    target: String,
    cycles: u32,
}

impl<P, G, W, Pb> Scheduler<P, G, W, Pb>
where
    P: Probe,
    G: Geolocator,
    W: Write + Send,
    Pb: Publisher + Sync,
{
    pub fn new(
        builder: ReportBuilder<P, G>,
        dispatcher: Dispatcher<W, Pb>,
        target: impl Into<String>,
        cycles: u32,
    ) -> Self {
        Self {
            builder,
            dispatcher,
            target: target.into(),
            cycles,
        }
    }

    #[cfg(test)]
    pub(crate) fn dispatcher(&self) -> &Dispatcher<W, Pb> {
        &self.dispatcher
    }

    /// One build-and-dispatch cycle. The report is dropped afterwards.
    pub async fn tick(&mut self) -> Result<(), TickError> {
        let report = self.builder.build(self.cycles, &self.target).await?;
        info!(
            "Built report for {}: {} hops in {:?}",
            self.target,
            report.hop_count(),
            report.elapsed()
        );
        self.dispatcher.dispatch(&report).await?;
        Ok(())
    }

    /// One-shot failures are returned to the caller; repeating mode never returns.
    pub async fn run(&mut self, schedule: Schedule) -> Result<(), TickError> {
        match schedule {
            Schedule::OneShot => self.tick().await,
            Schedule::Repeating(period) => {
                self.repeat_n(period, None).await;
                Ok(())
            }
        }
    }

    /// Tick every `period`, stopping after `limit` ticks when given.
    ///
    /// Ticks sit on a fixed grid anchored at the first tick. A cycle that
    /// overruns the period makes the ticks it covered be skipped; the next
    /// cycle starts on the first grid point at or after its completion.
    pub(crate) async fn repeat_n(&mut self, period: Duration, limit: Option<u64>) -> TickStats {
        let mut grid = TickGrid::new(Instant::now(), period);
        let mut stats = TickStats::default();

        while limit.is_none_or(|limit| stats.succeeded + stats.failed < limit) {
            sleep_until(grid.current()).await;
            match self.tick().await {
                Ok(()) => stats.succeeded += 1,
                Err(e) => {
                    error!("Report cycle for {} failed: {}", self.target, e);
                    stats.failed += 1;
                }
            }

            let skipped = grid.advance(Instant::now());
            if skipped > 0 {
                warn!("Report cycle overran the {:?} interval, skipped {} tick(s)", period, skipped);
            }
        }

        stats
    }
}

/// Far enough ahead to mean "never" without overflowing `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Tick deadlines at `origin + k * period`.
#[derive(Debug)]
struct TickGrid {
    origin: Instant,
    period: Duration,
    index: u32,
}

impl TickGrid {
    fn new(origin: Instant, period: Duration) -> Self {
        Self {
            origin,
            period,
            index: 0,
        }
    }

    fn current(&self) -> Instant {
        self.period
            .checked_mul(self.index)
            .and_then(|offset| self.origin.checked_add(offset))
            .unwrap_or_else(|| self.origin + FAR_FUTURE)
    }

    /// Move to the first grid point at or after `now` (and after the current
    /// one), returning how many points were skipped on the way.
    fn advance(&mut self, now: Instant) -> u32 {
        let elapsed = now.saturating_duration_since(self.origin).as_nanos();
        let period = self.period.as_nanos().max(1);
        let due = u32::try_from(elapsed.div_ceil(period)).unwrap_or(u32::MAX);
        let next = due.max(self.index.saturating_add(1));
        let skipped = next - self.index - 1;
        self.index = next;
        skipped
    }
}
