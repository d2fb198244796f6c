pub mod system_clock; // skipcq: RS-D1001
pub mod virtual_clock; // skipcq: RS-D1001

use std::fmt::Debug;
use std::ops::Deref;
pub use system_clock::SystemClock;
pub use virtual_clock::VirtualClock;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::time::Duration;

#[allow(unused_imports)]
use crate::alarm::DaytimeAlarm;

/// [`AlarmClock`] is the source of "now" for a [`DaytimeAlarm`] as well as the primitive it
/// suspends on while waiting for the next fire instant.
///
/// # Required Methods
/// When implementing the [`AlarmClock`], one must provide implementations for
/// [`AlarmClock::now`] and [`AlarmClock::idle_to`]. The former is synchronous, because an alarm
/// recomputes its fire instant synchronously whenever one of its inputs changes, while the
/// latter is only ever awaited from the alarm's timer task
///
/// # Trait Implementation(s)
/// - [`SystemClock`] reads the local wall-clock and sleeps with Tokio's timer
/// - [`VirtualClock`] simulates time, it never moves without explicit advancing and
///   implements the [`AdvanceableAlarmClock`] extension trait
///
/// # IMPORTANT Note(s)
/// All instants are local wall-clock values ([`NaiveDateTime`]), no time-zone conversion
/// happens anywhere in the alarm
///
/// # See Also
/// - [`VirtualClock`]
/// - [`SystemClock`]
/// - [`AdvanceableAlarmClock`]
#[async_trait]
pub trait AlarmClock: Debug + Send + Sync + 'static {
    /// Gets the current local wall-clock time
    fn now(&self) -> NaiveDateTime;

    /// Idle until this specified time is reached (if it is in the past or present, it
    /// doesn't idle)
    async fn idle_to(&self, to: NaiveDateTime);
}

#[async_trait]
impl<T> AlarmClock for T
where
    T: Deref + Send + Sync + Debug + 'static,
    T::Target: AlarmClock,
{
    fn now(&self) -> NaiveDateTime {
        self.deref().now()
    }

    async fn idle_to(&self, to: NaiveDateTime) {
        self.deref().idle_to(to).await
    }
}

/// [`AdvanceableAlarmClock`] is an optional extension to [`AlarmClock`] which allows for
/// arbitrary advancement of time. Only [`VirtualClock`] implements it, the wall-clock cannot
/// be advanced
///
/// # See Also
/// - [`AlarmClock`]
/// - [`VirtualClock`]
#[async_trait]
pub trait AdvanceableAlarmClock: AlarmClock {
    /// Advance the time by a specified duration forward, it uses
    /// [`AdvanceableAlarmClock::advance_to`] under the hood
    async fn advance(&self, duration: Duration) {
        let step = chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX);
        let now = self.now();
        self.advance_to(now.checked_add_signed(step).unwrap_or(NaiveDateTime::MAX))
            .await
    }

    /// Advance the time to a specified point of time, waking up every idling party whose
    /// target has been reached
    async fn advance_to(&self, to: NaiveDateTime);
}

#[async_trait]
impl<T> AdvanceableAlarmClock for T
where
    T: Deref + Send + Sync + Debug + 'static,
    T::Target: AdvanceableAlarmClock,
{
    async fn advance(&self, duration: Duration) {
        self.deref().advance(duration).await
    }

    async fn advance_to(&self, to: NaiveDateTime) {
        self.deref().advance_to(to).await
    }
}
