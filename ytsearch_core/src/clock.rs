//! Injectable clock, so refresh/debounce/eviction policies are deterministically testable.

use chrono::{DateTime, Utc};
use std::sync::Arc;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub type SharedClock = Arc<dyn Clock>;

pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::sync::Mutex;

    /// A clock whose value is advanced manually, for deterministic refresh/debounce tests.
    pub struct FixedClock(Mutex<DateTime<Utc>>);

    impl FixedClock {
        pub fn new(at: DateTime<Utc>) -> Arc<Self> {
            Arc::new(Self(Mutex::new(at)))
        }

        pub fn advance(&self, delta: chrono::Duration) {
            let mut guard = self.0.lock().unwrap();
            *guard += delta;
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }
}
