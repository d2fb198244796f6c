use crate::clock::AlarmClock;
use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use std::fmt::Debug;

#[allow(unused_imports)]
use crate::clock::VirtualClock;

/// [`SystemClock`] is an implementation of [`AlarmClock`] trait, it is the default option
/// for alarms. Unlike [`VirtualClock`], it moves forward no matter what and cannot be advanced
/// at any arbitrary point
///
/// # Constructor(s)
/// One can simply use the default rust's struct initialization or via [`SystemClock::default`]
///
/// # See Also
/// - [`VirtualClock`]
/// - [`AlarmClock`]
#[derive(Default, Clone, Copy)]
pub struct SystemClock;

impl Debug for SystemClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SystemClock").field(&self.now()).finish()
    }
}

#[async_trait]
impl AlarmClock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    async fn idle_to(&self, to: NaiveDateTime) {
        let duration = match (to - self.now()).to_std() {
            Ok(duration) => duration,
            Err(_) => {
                return;
            }
        };

        tokio::time::sleep(duration).await;
    }
}
