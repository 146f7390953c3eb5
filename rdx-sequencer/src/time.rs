//! The time sources that drive the sequencer.
//!
//! The core never reads a wall clock itself: every runner and subsystem sees
//! time only through the `TickEvent` it is handed. `SystemClock` produces
//! real ticks for the engine, `ManualClock` produces deterministic ticks for
//! tests and offline simulation.

use crate::config::ClockResolution;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// A single beat of the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickEvent {
    /// Number of ticks produced before this one.
    pub tick_count: u64,
    /// Monotonic time since the clock started.
    pub elapsed: Duration,
}

impl TickEvent {
    pub fn new(tick_count: u64, elapsed: Duration) -> Self {
        Self {
            tick_count,
            elapsed,
        }
    }

    /// Elapsed time in fractional seconds.
    pub fn seconds(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }
}

impl ClockResolution {
    /// The period between two ticks at this resolution.
    pub fn period(&self) -> Duration {
        let ticks_per_second = match self {
            ClockResolution::High => 60,
            ClockResolution::Medium => 30,
            ClockResolution::Low => 1,
            ClockResolution::Control => 100,
            ClockResolution::Custom { ticks_per_second } => (*ticks_per_second).max(1),
        };
        Duration::from_nanos(1_000_000_000 / ticks_per_second)
    }
}

/// The high-frequency ticker that acts as the engine's single source of time.
pub struct SystemClock {
    resolution: ClockResolution,
    tick_sender: broadcast::Sender<Arc<TickEvent>>,
}

impl SystemClock {
    pub fn new(resolution: ClockResolution, tick_sender: broadcast::Sender<Arc<TickEvent>>) -> Self {
        Self {
            resolution,
            tick_sender,
        }
    }

    /// Emits ticks until a shutdown signal is received.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let period = self.resolution.period();
        let mut ticker = interval(period);
        // A slow tick must not be followed by a burst of catch-up ticks.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let start = Instant::now();
        let mut tick_count: u64 = 0;
        info!("SystemClock running with a period of {:?}", period);
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                _ = ticker.tick() => {
                    let tick = TickEvent::new(tick_count, start.elapsed());
                    self.tick_sender.send(Arc::new(tick)).ok();
                    tick_count += 1;
                }
            }
        }
        debug!("SystemClock stopped after {} ticks.", tick_count);
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    step: Duration,
    tick_count: u64,
    elapsed: Duration,
}

impl ManualClock {
    /// Creates a clock at time zero that advances by `step` on every `tick()`.
    pub fn new(step: Duration) -> Self {
        Self {
            step,
            tick_count: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// The tick describing the current time, without advancing.
    pub fn now(&self) -> TickEvent {
        TickEvent::new(self.tick_count, self.elapsed)
    }

    /// Advances by one step and returns the new tick.
    pub fn tick(&mut self) -> TickEvent {
        self.advance(self.step)
    }

    /// Jumps forward by an arbitrary amount, counting it as a single tick.
    pub fn advance(&mut self, by: Duration) -> TickEvent {
        self.tick_count += 1;
        self.elapsed += by;
        self.now()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Duration::from_millis(10))
    }
}
