//! Safety supervisor pieces: the overcurrent latch and the watchdog
//! budget derivation.

use tracing::warn;

/// Compute the watchdog feed budget in milliseconds.
///
/// Parameters:
/// - `half_cycle_ms`: one control cycle, i.e. one mains half-cycle
///   (10 ms at 50 Hz). The budget is slightly larger than one cycle so
///   a single late edge does not reset the station.
/// - `conversion_timeout_ms`: the per-conversion front-end timeout.
///   The budget never undercuts it, otherwise a legal slow conversion
///   would trip the watchdog before the read itself times out.
#[inline]
pub fn watchdog_budget_ms(half_cycle_ms: u64, conversion_timeout_ms: u64) -> u64 {
    let padded = padded_cycle_ms(half_cycle_ms);
    let floor = conversion_floor_ms(conversion_timeout_ms);
    padded.max(floor).max(1)
}

/// One and a half control cycles, rounded up.
#[inline]
fn padded_cycle_ms(half_cycle_ms: u64) -> u64 {
    half_cycle_ms.saturating_mul(3) / 2 + 1
}

/// Twice the conversion timeout, so one timed-out read plus its retry
/// fits inside the budget.
#[inline]
fn conversion_floor_ms(conversion_timeout_ms: u64) -> u64 {
    conversion_timeout_ms.saturating_mul(2)
}

/// Debounced, latching overcurrent comparator input.
///
/// The comparator line is sampled through a caller-supplied closure so
/// the supervisor stays hardware-agnostic. `debounce_n` consecutive
/// asserted reads latch the guard; once latched it reports tripped
/// until `reset`, matching the requirement that an overload is cleared
/// only by explicit re-enable.
pub struct OvercurrentGuard {
    check: Option<Box<dyn Fn() -> bool + Send>>,
    latched: bool,
    debounce_n: u8,
    count: u8,
}

impl std::fmt::Debug for OvercurrentGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OvercurrentGuard")
            .field("check", &self.check.as_ref().map(|_| "<closure>"))
            .field("latched", &self.latched)
            .field("debounce_n", &self.debounce_n)
            .field("count", &self.count)
            .finish()
    }
}

impl OvercurrentGuard {
    pub fn new<F>(check: F, debounce_n: u8) -> Self
    where
        F: Fn() -> bool + Send + 'static,
    {
        Self {
            check: Some(Box::new(check)),
            latched: false,
            debounce_n: debounce_n.max(1),
            count: 0,
        }
    }

    /// A guard with no comparator wired up; never trips.
    pub fn disabled() -> Self {
        Self {
            check: None,
            latched: false,
            debounce_n: 1,
            count: 0,
        }
    }

    /// Sample the comparator once; returns true while latched.
    pub fn poll(&mut self) -> bool {
        if self.latched {
            return true;
        }
        if let Some(check) = &self.check {
            if check() {
                self.count = self.count.saturating_add(1);
                if self.count >= self.debounce_n {
                    warn!(debounce_n = self.debounce_n, "overcurrent latched");
                    self.latched = true;
                }
            } else {
                self.count = 0;
            }
        }
        self.latched
    }

    pub fn is_latched(&self) -> bool {
        self.latched
    }

    /// Clear the latch, typically on user re-enable.
    pub fn reset(&mut self) {
        self.latched = false;
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn padded_cycle_covers_one_cycle_plus_margin() {
        assert_eq!(padded_cycle_ms(10), 16);
        assert_eq!(padded_cycle_ms(8), 13);
        assert_eq!(padded_cycle_ms(0), 1);
    }

    #[test]
    fn budget_never_undercuts_conversion_timeout() {
        // padded cycle 16, conversion floor 40
        assert_eq!(watchdog_budget_ms(10, 20), 40);
        // padded cycle dominates a fast converter
        assert_eq!(watchdog_budget_ms(10, 2), 16);
        assert_eq!(watchdog_budget_ms(0, 0), 1);
    }

    #[test]
    fn guard_latches_after_debounce_and_holds() {
        let line = Arc::new(AtomicBool::new(false));
        let sense = Arc::clone(&line);
        let mut guard = OvercurrentGuard::new(move || sense.load(Ordering::Relaxed), 2);

        assert!(!guard.poll());
        line.store(true, Ordering::Relaxed);
        assert!(!guard.poll()); // first asserted read only counts
        assert!(guard.poll()); // second read latches
        line.store(false, Ordering::Relaxed);
        assert!(guard.poll()); // latched despite line release
        guard.reset();
        assert!(!guard.poll());
    }

    #[test]
    fn glitch_shorter_than_debounce_does_not_latch() {
        let line = Arc::new(AtomicBool::new(true));
        let sense = Arc::clone(&line);
        let mut guard = OvercurrentGuard::new(move || sense.load(Ordering::Relaxed), 3);

        guard.poll();
        guard.poll();
        line.store(false, Ordering::Relaxed);
        assert!(!guard.poll()); // counter resets
        line.store(true, Ordering::Relaxed);
        guard.poll();
        guard.poll();
        assert!(guard.poll());
    }

    #[test]
    fn disabled_guard_never_trips() {
        let mut guard = OvercurrentGuard::disabled();
        for _ in 0..10 {
            assert!(!guard.poll());
        }
    }
}
