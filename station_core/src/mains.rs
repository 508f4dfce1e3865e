//! Mains zero-crossing edge source.
//!
//! The acquisition cycle is phase-locked to the mains: one cycle per
//! half-wave, so sampling always happens at the same point of the
//! waveform and heater switching noise stays out of the measurements.
//! On a host build the edges come from a paced thread; the runner only
//! sees a channel of edge indices, so a hardware zero-crossing input
//! can feed the same channel.
//!
//! Each paced pump owns exactly one thread that is shut down when the
//! `MainsSync` is dropped.

use crossbeam_channel as xch;
use station_traits::clock::Clock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Microseconds between zero crossings at the given mains frequency.
#[inline]
pub fn half_cycle_us(mains_hz: u32) -> u64 {
    1_000_000 / (2 * u64::from(mains_hz.max(1)))
}

/// Milliseconds between zero crossings, at least 1.
#[inline]
pub fn half_cycle_ms(mains_hz: u32) -> u64 {
    (half_cycle_us(mains_hz) / 1_000).max(1)
}

pub struct MainsSync {
    rx: xch::Receiver<u64>,
    last_edge: Arc<AtomicU64>,
    epoch: Instant,
    clock: Box<dyn Clock + Send + Sync>,
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl MainsSync {
    /// Spawn a paced edge pump emitting one edge per mains half-cycle.
    pub fn paced<C: Clock + Clone + Send + Sync + 'static>(mains_hz: u32, clock: C) -> Self {
        let (tx, rx) = xch::bounded(1);
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let last_edge = Arc::new(AtomicU64::new(0));
        let last_edge_clone = last_edge.clone();
        let period = Duration::from_micros(half_cycle_us(mains_hz));
        let epoch = clock.now();
        let pump_clock = clock.clone();

        let join_handle = std::thread::spawn(move || {
            let mut edge: u64 = 0;
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    tracing::debug!("edge pump received shutdown signal");
                    break;
                }
                pump_clock.sleep(period);
                if shutdown_clone.load(Ordering::Relaxed) {
                    break;
                }
                // Consumer gone means the station is shutting down.
                if tx.send(edge).is_err() {
                    tracing::debug!("edge consumer disconnected, exiting pump");
                    break;
                }
                last_edge_clone.store(pump_clock.ms_since(epoch), Ordering::Relaxed);
                edge = edge.wrapping_add(1);
            }
            tracing::trace!("edge pump exiting cleanly");
        });

        Self {
            rx,
            last_edge,
            epoch,
            clock: Box::new(clock),
            shutdown,
            join_handle: Some(join_handle),
        }
    }

    /// Wrap an externally fed edge channel, e.g. a hardware
    /// zero-crossing interrupt or a test harness.
    pub fn external(rx: xch::Receiver<u64>) -> Self {
        Self::external_with_clock(rx, station_traits::clock::MonotonicClock::new())
    }

    /// `external`, but with the clock that stall durations are
    /// measured against.
    pub fn external_with_clock<C: Clock + Send + Sync + 'static>(
        rx: xch::Receiver<u64>,
        clock: C,
    ) -> Self {
        Self {
            rx,
            last_edge: Arc::new(AtomicU64::new(0)),
            epoch: clock.now(),
            clock: Box::new(clock),
            shutdown: Arc::new(AtomicBool::new(false)),
            join_handle: None,
        }
    }

    /// Block for the next zero crossing or time out.
    pub fn recv_edge(&self, timeout: Duration) -> Result<u64, xch::RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    /// Milliseconds since the pump last delivered an edge, measured on
    /// the same clock the pump records edges with.
    pub fn stalled_for_now(&self) -> u64 {
        self.clock
            .ms_since(self.epoch)
            .saturating_sub(self.last_edge.load(Ordering::Relaxed))
    }
}

impl Drop for MainsSync {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("edge pump joined successfully"),
                Err(e) => tracing::warn!(?e, "edge pump panicked during shutdown"),
            }
        }
    }
}
