use chrono::{Local, NaiveDateTime};

/// A source of process-local wall-clock time.
///
/// Deadlines are compared as local wall time, so the clock yields naive (zone-less) values.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> NaiveDateTime;
}

/// Reads the system clock in the process' local time zone.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalClock;

impl Clock for LocalClock {
    #[inline]
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}
