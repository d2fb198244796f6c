use crate::errors::AlarmError;
use chrono::{DateTime, NaiveDateTime};
use std::sync::{Mutex, MutexGuard, PoisonError};

pub const MILLIS_PER_SECOND: u32 = 1_000;
pub const MILLIS_PER_MINUTE: u32 = 60 * MILLIS_PER_SECOND;
pub const MILLIS_PER_HOUR: u32 = 60 * MILLIS_PER_MINUTE;
pub const MILLIS_PER_DAY: u32 = 24 * MILLIS_PER_HOUR;

/// Upper bound on the number of candidate dates (and nth-filtered steps) tried while
/// resolving the next repeat anchor
pub const DEFAULT_MAX_RETRY_COUNT: u32 = 10_000;

/// Locks the mutex, recovering the guard if a previous holder panicked. Every piece of
/// state guarded in this crate stays consistent between statements, so a poisoned lock
/// carries no half-written data
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Converts a wall-clock ``NaiveDateTime`` to milliseconds since the UNIX Epoch, treating
/// the wall-clock as if it were UTC. Used by the virtual clock to store time atomically
pub(crate) fn naive_to_millis(time: NaiveDateTime) -> i64 {
    time.and_utc().timestamp_millis()
}

/// Inverse of [`naive_to_millis`]
pub(crate) fn millis_to_naive(millis: i64) -> Result<NaiveDateTime, AlarmError> {
    DateTime::from_timestamp_millis(millis)
        .map(|time| time.naive_utc())
        .ok_or(AlarmError::CalendarOutOfRange)
}
