use std::{
    sync::{
        atomic::{
            AtomicI64,
            AtomicU64,
            Ordering,
        },
        Mutex,
        PoisonError,
    },
    time::Duration,
};

/// Gauge that goes up and down, e.g. currently open connections.
#[derive(Debug, Default)]
pub struct BidirectionalCounter {
    value: AtomicI64,
}

impl BidirectionalCounter {
    pub fn add(&self, delta: i64) {
        self.value.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// What a [`CumulativeCounter`] reports for one interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CounterDelta {
    /// Absolute counter value at the time of the read.
    pub total: u64,
    /// Sum of all adds since the previous read.
    pub delta: u64,
    /// `delta` per second of the elapsed interval, `NaN` for an empty interval.
    pub rate: f64,
}

/// Monotonic counter from which per-interval deltas and rates are derived.
///
/// The underlying value wraps at `u64::MAX`; [`CumulativeCounter::compute_delta`] accounts for a
/// single wrap between two reads. Exactly one task is expected to call `compute_delta`.
#[derive(Debug, Default)]
pub struct CumulativeCounter {
    current: AtomicU64,
    previous: AtomicU64,
}

impl CumulativeCounter {
    /// Counter whose current and previous value are both `value`.
    pub fn starting_at(value: u64) -> Self {
        Self {
            current: AtomicU64::new(value),
            previous: AtomicU64::new(value),
        }
    }

    pub fn add(&self, delta: u64) {
        // fetch_add wraps around on overflow
        self.current.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.current.load(Ordering::Relaxed)
    }

    pub fn compute_delta(&self, elapsed: Duration) -> CounterDelta {
        let current = self.current.load(Ordering::Relaxed);
        let previous = self.previous.swap(current, Ordering::Relaxed);

        let delta = if current >= previous {
            current - previous
        } else {
            (u64::MAX - previous) + current + 1
        };

        let seconds = elapsed.as_secs_f64();
        let rate = if seconds > 0.0 {
            delta as f64 / seconds
        } else {
            f64::NAN
        };

        CounterDelta {
            total: current,
            delta,
            rate,
        }
    }
}

#[derive(Debug, Default)]
struct Accumulator {
    count: u64,
    sum: f64,
}

/// Running mean that resets every time it is read.
#[derive(Debug, Default)]
pub struct AveragingCounter {
    inner: Mutex<Accumulator>,
}

impl AveragingCounter {
    pub fn add(&self, value: f64) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.count += 1;
        inner.sum += value;
    }

    /// Mean of the values added since the last call, `0` if there were none.
    pub fn compute_average(&self) -> f64 {
        let Accumulator { count, sum } =
            std::mem::take(&mut *self.inner.lock().unwrap_or_else(PoisonError::into_inner));
        if count == 0 {
            return 0.0;
        }
        sum / count as f64
    }
}
