use crate::clock::{AdvanceableAlarmClock, AlarmClock};
use crate::utils::{millis_to_naive, naive_to_millis};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::Notify;

#[allow(unused_imports)]
use crate::clock::SystemClock;

/// [`VirtualClock`] is an implementation of the [`AlarmClock`] trait, it acts as a mock object,
/// allowing to simulate wall-clock time without the waiting around. This is what the alarm
/// tests run on.
///
/// Unlike [`SystemClock`], this clock doesn't move forward, rather it needs explicit
/// calls to the [`AdvanceableAlarmClock`] methods, which makes it predictable at any point
/// throughout the program
///
/// # Constructor(s)
/// - [`VirtualClock::new`] for creating one at an initial wall-clock time
/// - [`VirtualClock::from_value`] for creating one from milliseconds since the UNIX Epoch
/// - [`VirtualClock::from_epoch`] for creating one at the UNIX Epoch
///
/// # Example
/// ```ignore
/// use chrono::NaiveDate;
/// use daytime_alarm::clock::{AdvanceableAlarmClock, AlarmClock, VirtualClock};
///
/// let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(8, 0, 0).unwrap();
/// let clock = VirtualClock::new(start);
/// clock.advance(Duration::from_secs(60)).await;
/// assert_eq!(clock.now(), start + chrono::Duration::minutes(1));
/// ```
///
/// # See Also
/// - [`SystemClock`]
/// - [`AdvanceableAlarmClock`]
/// - [`AlarmClock`]
pub struct VirtualClock {
    current_time: AtomicI64,
    notify: Notify,
}

impl Debug for VirtualClock {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualClock")
            .field("current_time", &self.now())
            .finish()
    }
}

impl VirtualClock {
    /// Creates / Constructs a new [`VirtualClock`] instance set to ``initial_time``
    pub fn new(initial_time: NaiveDateTime) -> Self {
        VirtualClock::from_value(naive_to_millis(initial_time))
    }

    /// Creates / Constructs a new [`VirtualClock`] instance from a value represented in
    /// **total milliseconds** since the UNIX Epoch
    pub fn from_value(initial_value: i64) -> Self {
        VirtualClock {
            current_time: AtomicI64::new(initial_value),
            notify: Notify::new(),
        }
    }

    /// Creates / Constructs a new [`VirtualClock`] instance at the UNIX Epoch
    pub fn from_epoch() -> Self {
        Self::from_value(0)
    }
}

#[async_trait]
impl AdvanceableAlarmClock for VirtualClock {
    async fn advance_to(&self, to: NaiveDateTime) {
        self.current_time
            .store(naive_to_millis(to), Ordering::SeqCst);
        self.notify.notify_waiters();
    }
}

#[async_trait]
impl AlarmClock for VirtualClock {
    fn now(&self) -> NaiveDateTime {
        // Only values produced by `naive_to_millis` are ever stored
        millis_to_naive(self.current_time.load(Ordering::SeqCst)).unwrap_or_default()
    }

    async fn idle_to(&self, to: NaiveDateTime) {
        loop {
            // Registered before the check, so an advance in between is never missed
            let notified = self.notify.notified();
            if self.now() >= to {
                return;
            }
            notified.await;
        }
    }
}
