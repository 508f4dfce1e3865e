//! Raw-sample filtering ahead of the sensor transforms.

use std::collections::VecDeque;

/// Sliding-window or exponentially-weighted filter over raw ADC counts.
///
/// The average defaults to 0 until at least one sample has been pushed;
/// callers can check `is_primed` before trusting the value. The most
/// recent raw sample is kept for instant (unfiltered) readings.
#[derive(Debug, Clone)]
pub struct Averager {
    window: VecDeque<i32>,
    capacity: usize,
    sum: i64,
    // EMA state; None until the first sample to avoid startup bias.
    ema: Option<f32>,
    ema_alpha: f32,
    last_raw: i32,
    count: u64,
}

impl Averager {
    /// Sliding-window mean over the last `capacity` samples.
    pub fn window(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            sum: 0,
            ema: None,
            ema_alpha: 0.0,
            last_raw: 0,
            count: 0,
        }
    }

    /// Recursive exponentially-weighted average with weight `alpha` in
    /// (0.0, 1.0].
    pub fn ema(alpha: f32) -> Self {
        let alpha = if alpha.is_finite() {
            alpha.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            window: VecDeque::new(),
            capacity: 1,
            sum: 0,
            ema: None,
            ema_alpha: alpha,
            last_raw: 0,
            count: 0,
        }
    }

    pub fn push(&mut self, raw: i32) {
        self.last_raw = raw;
        self.count = self.count.saturating_add(1);
        if self.ema_alpha > 0.0 {
            self.ema = Some(match self.ema {
                None => raw as f32,
                Some(prev) => self.ema_alpha * raw as f32 + (1.0 - self.ema_alpha) * prev,
            });
            return;
        }
        self.window.push_back(raw);
        self.sum += raw as i64;
        if self.window.len() > self.capacity
            && let Some(evicted) = self.window.pop_front()
        {
            self.sum -= evicted as i64;
        }
    }

    /// Filtered value; 0 until the first sample has been accumulated.
    pub fn average(&self) -> i32 {
        if self.ema_alpha > 0.0 {
            return self.ema.map(|v| v.round() as i32).unwrap_or(0);
        }
        let n = self.window.len() as i64;
        if n == 0 {
            return 0;
        }
        let half = n / 2;
        let q = if self.sum >= 0 {
            (self.sum + half) / n
        } else {
            (self.sum - half) / n
        };
        q as i32
    }

    /// Most recent raw sample, unfiltered.
    pub fn last_raw(&self) -> i32 {
        self.last_raw
    }

    pub fn is_primed(&self) -> bool {
        self.count > 0
    }

    /// Drop all accumulated state, e.g. on tip change.
    pub fn reset(&mut self) {
        self.window.clear();
        self.sum = 0;
        self.ema = None;
        self.last_raw = 0;
        self.count = 0;
    }
}
