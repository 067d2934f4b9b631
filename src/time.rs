//! Time abstraction for deterministic testing.

use chrono::{DateTime, Utc};

/// Source of the current wall-clock time.
///
/// Production code uses [`SystemClock`]; tests substitute a fixed or manually
/// advanced implementation so that stability windows can be validated without
/// sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The default [`Clock`] backed by the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
