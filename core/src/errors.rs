use chrono::NaiveDateTime;
use std::fmt::Debug;
use thiserror::Error;

#[allow(unused_imports)]
use crate::alarm::DaytimeAlarm;

#[allow(unused_imports)]
use crate::repeat::NthFilter;

/// [`AlarmError`] is the main enum that contains all the errors which can be produced while
/// configuring or running a [`DaytimeAlarm`], it uses under the hood [`thiserror`].
///
/// Errors fall into two groups. Configuration errors ([`AlarmError::InvalidExpression`],
/// [`AlarmError::UnknownRepeatPreset`] and [`AlarmError::InvalidTimeOfDay`]) are returned
/// synchronously to the caller. Runtime errors never reach the caller, they are surfaced as
/// diagnostics through [`DaytimeAlarm::on_diagnostic`] and the alarm falls back to a
/// degraded but functional state
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AlarmError {
    /// The nth-occurrence expression handed to a [`NthFilter`] is not an arithmetic
    /// progression of the form `an+b`
    #[error("Nth-occurrence expression `{0}` is not of the form `an+b`")]
    InvalidExpression(String),

    #[error("Repeat preset `{0}` does not exist")]
    UnknownRepeatPreset(String),

    /// The supplied time of day is outside `00:00:00..=23:59:59`
    #[error("Time of day `{0}` is out of range")]
    InvalidTimeOfDay(String),

    /// A repeat rule (preset or custom) returned an error or panicked while stepping,
    /// the repeat is cancelled and the alarm fires once
    #[error("Repeat rule failed while stepping: {0}")]
    RepeatStepFailure(String),

    /// No candidate date was accepted within the retry bound, the repeat is cancelled
    /// and the alarm fires once
    #[error("Repeat rule found no future date within `{0}` attempts")]
    RepeatResolutionExhausted(u32),

    /// The resolved repeat anchor together with the time of day lies in the past, arming
    /// is skipped until the next input change
    #[error("Resolved fire instant `{fire_at}` is before the current time `{now}`")]
    UnschedulableDelay {
        fire_at: NaiveDateTime,
        now: NaiveDateTime,
    },

    #[error("Calendar arithmetic went out of the supported date range")]
    CalendarOutOfRange,

    /// The alarm tried to arm its timer outside a Tokio runtime
    #[error("No Tokio runtime is available to arm the alarm timer")]
    MissingRuntime,
}
