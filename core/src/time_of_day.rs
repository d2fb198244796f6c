use crate::errors::AlarmError;
use crate::utils::{MILLIS_PER_HOUR, MILLIS_PER_MINUTE, MILLIS_PER_SECOND};
use chrono::Timelike;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// [`TimeOfDay`] is an ``(hour, minute, second)`` tuple independent of any calendar date, it is
/// what a [`DaytimeAlarm`](crate::alarm::DaytimeAlarm) fires at every day.
///
/// The invariant ``0 <= millis() < 86_400_000`` always holds, the constructors reject
/// components outside ``23:59:59``
///
/// # Constructor(s)
/// - [`TimeOfDay::new`] from the individual components
/// - [`TimeOfDay::from_str`] from ``"HH"``, ``"HH:MM"`` or ``"HH:MM:SS"``, missing components
///   default to zero and non-numeric segments parse as zero
/// - [`TimeOfDay::of`] from anything exposing a wall-clock time ([`chrono::NaiveTime`],
///   [`chrono::NaiveDateTime`], [`chrono::DateTime`]...)
///
/// # Ordering
/// Ordering is lexicographic over ``(hour, minute, second)``
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay {
    hour: u32,
    minute: u32,
    second: u32,
}

impl TimeOfDay {
    pub fn new(hour: u32, minute: u32, second: u32) -> Result<Self, AlarmError> {
        if hour >= 24 || minute >= 60 || second >= 60 {
            return Err(AlarmError::InvalidTimeOfDay(format!(
                "{hour}:{minute}:{second}"
            )));
        }
        Ok(Self {
            hour,
            minute,
            second,
        })
    }

    /// Extracts hour, minute and second from a wall-clock value, sub-second precision
    /// is dropped
    pub fn of(time: &impl Timelike) -> Self {
        Self {
            hour: time.hour(),
            minute: time.minute(),
            second: time.second() % 60,
        }
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn minute(&self) -> u32 {
        self.minute
    }

    pub fn second(&self) -> u32 {
        self.second
    }

    /// Milliseconds elapsed since midnight
    pub fn millis(&self) -> u32 {
        self.hour * MILLIS_PER_HOUR + self.minute * MILLIS_PER_MINUTE + self.second * MILLIS_PER_SECOND
    }

    /// Whether an alarm at this time of day has already fired at ``now`` on the same day.
    ///
    /// Hours and minutes compare strictly while seconds compare with ``<=``, so an alarm
    /// whose second is the current second counts as fired and is never fired twice
    pub fn has_passed(&self, now: &TimeOfDay) -> bool {
        if self.hour != now.hour {
            return self.hour < now.hour;
        }
        if self.minute != now.minute {
            return self.minute < now.minute;
        }
        self.second <= now.second
    }
}

fn parse_segment(segment: &str) -> u32 {
    segment.trim().parse().unwrap_or(0)
}

impl FromStr for TimeOfDay {
    type Err = AlarmError;

    fn from_str(day_time: &str) -> Result<Self, Self::Err> {
        let segments: Vec<&str> = day_time.split(':').collect();
        if segments.len() > 3 {
            return Err(AlarmError::InvalidTimeOfDay(day_time.to_string()));
        }

        let mut components = [0u32; 3];
        for (component, segment) in components.iter_mut().zip(&segments) {
            *component = parse_segment(segment);
        }

        let [hour, minute, second] = components;
        TimeOfDay::new(hour, minute, second)
            .map_err(|_| AlarmError::InvalidTimeOfDay(day_time.to_string()))
    }
}

/// Zero-padded ``HH:MM:SS``
impl Display for TimeOfDay {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }
}
