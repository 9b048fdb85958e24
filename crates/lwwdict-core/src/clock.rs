//! Time sources for default timestamps
//!
//! A dictionary never reads the system time directly. It asks its [`Clock`],
//! so production code wires in [`SystemClock`] while tests and simulations
//! drive a [`ManualClock`] by hand.
//!
//! ```
//! use lwwdict_core::{Clock, ManualClock};
//!
//! let clock = ManualClock::new(100.0);
//! assert_eq!(clock.now(), 100.0);
//! clock.advance(0.5);
//! assert_eq!(clock.now(), 100.5);
//! ```

use parking_lot::Mutex;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// A source of timestamps, in seconds since the Unix epoch.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> f64;
}

/// Real wall-clock time (UTC).
///
/// No timezone offset is applied: every replica stamping with a
/// `SystemClock` shares the same epoch-based scale.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

/// Hand-driven clock. Time only moves through [`set`](Self::set) and
/// [`advance`](Self::advance).
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<f64>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, timestamp: f64) {
        *self.now.lock() = timestamp;
    }

    pub fn advance(&self, seconds: f64) {
        *self.now.lock() += seconds;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        *self.now.lock()
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> f64 {
        (**self).now()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> f64 {
        (**self).now()
    }
}
