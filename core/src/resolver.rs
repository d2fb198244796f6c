use crate::errors::AlarmError;
use crate::repeat::RepeatRule;
use crate::time_of_day::TimeOfDay;
use crate::utils::{DEFAULT_MAX_RETRY_COUNT, MILLIS_PER_DAY};
use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use tracing::debug;

/// Milliseconds since midnight of a wall-clock instant, sub-second precision included
pub fn millis_of_day(time: &NaiveDateTime) -> u32 {
    time.num_seconds_from_midnight() * 1_000 + time.nanosecond().min(999_999_999) / 1_000_000
}

/// [`OccurrenceResolver`] computes when an alarm fires next, both for one-shot alarms (the
/// next occurrence of the time of day) and for repeating alarms (the next repeat anchor chosen
/// by a [`RepeatRule`]).
///
/// # Resolution Algorithm
/// For a repeating alarm, the alarm counts as fired today when its time of day is at or before
/// the current second (see [`TimeOfDay::has_passed`]). The search starts from today when the
/// alarm has not fired yet, or from yesterday when it has, unless the caller resolves right
/// after a fire (``surely_passed``), which always starts from today. Then, for ``i`` in
/// ``0..max_retry_count``, the start date advanced by ``i`` days is stepped once by the rule and
/// the first result later than today (or equal to today while the alarm has not fired yet)
/// becomes the anchor
///
/// # Constructor(s)
/// [`OccurrenceResolver::new`] with a custom bound or [`OccurrenceResolver::default`] with
/// ``10_000`` attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OccurrenceResolver {
    max_retry_count: u32,
}

impl Default for OccurrenceResolver {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRY_COUNT)
    }
}

impl OccurrenceResolver {
    pub fn new(max_retry_count: u32) -> Self {
        Self { max_retry_count }
    }

    pub fn max_retry_count(&self) -> u32 {
        self.max_retry_count
    }

    /// Milliseconds from ``now`` until the next occurrence of ``time_of_day``, wrapping to
    /// tomorrow when it already passed today. An alarm for the current millisecond yields zero
    pub fn delay_once(&self, now: &NaiveDateTime, time_of_day: &TimeOfDay) -> u32 {
        let delay = i64::from(time_of_day.millis()) - i64::from(millis_of_day(now));
        if delay < 0 {
            (delay + i64::from(MILLIS_PER_DAY)) as u32
        } else {
            delay as u32
        }
    }

    /// The wall-clock instant the alarm should fire at next. Without an anchor this is the
    /// next occurrence of ``time_of_day``, with one it is the anchor's midnight plus
    /// ``time_of_day``, which fails with [`AlarmError::UnschedulableDelay`] when already past
    pub fn fire_at(
        &self,
        now: &NaiveDateTime,
        time_of_day: &TimeOfDay,
        anchor: Option<NaiveDate>,
    ) -> Result<NaiveDateTime, AlarmError> {
        let Some(anchor) = anchor else {
            let delay = TimeDelta::milliseconds(i64::from(self.delay_once(now, time_of_day)));
            return now
                .checked_add_signed(delay)
                .ok_or(AlarmError::CalendarOutOfRange);
        };

        let fire_at = anchor
            .and_time(NaiveTime::MIN)
            .checked_add_signed(TimeDelta::milliseconds(i64::from(time_of_day.millis())))
            .ok_or(AlarmError::CalendarOutOfRange)?;
        if fire_at < *now {
            return Err(AlarmError::UnschedulableDelay {
                fire_at,
                now: *now,
            });
        }
        Ok(fire_at)
    }

    /// Resolves the next repeat anchor, see the type-level documentation for the algorithm.
    ///
    /// # Errors
    /// Any error of the rule is propagated, [`AlarmError::RepeatResolutionExhausted`] is
    /// returned when no candidate is accepted within the bound
    pub fn next_anchor(
        &self,
        now: &NaiveDateTime,
        time_of_day: &TimeOfDay,
        rule: &dyn RepeatRule,
        initial: NaiveDate,
        surely_passed: bool,
    ) -> Result<NaiveDate, AlarmError> {
        let today = now.date();
        let fired_today = time_of_day.has_passed(&TimeOfDay::of(now));

        let base = if surely_passed || !fired_today {
            today
        } else {
            today.pred_opt().ok_or(AlarmError::CalendarOutOfRange)?
        };
        let fired_today = fired_today || surely_passed;

        for offset in 0..self.max_retry_count {
            let mut candidate = base
                .checked_add_days(Days::new(u64::from(offset)))
                .ok_or(AlarmError::CalendarOutOfRange)?;
            rule.step(&mut candidate, initial)?;

            if candidate > today || (candidate == today && !fired_today) {
                debug!(%candidate, offset, "resolved repeat anchor");
                return Ok(candidate);
            }
        }

        Err(AlarmError::RepeatResolutionExhausted(self.max_retry_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repeat::{Daily, Monthly, Repeat, Weekly, Yearly};

    fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(year, month, day)
            .unwrap()
            .and_hms_opt(hour, minute, second)
            .unwrap()
    }

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn tod(text: &str) -> TimeOfDay {
        text.parse().unwrap()
    }

    #[test]
    fn once_later_today() {
        let resolver = OccurrenceResolver::default();
        let now = at(2024, 5, 1, 8, 0, 0);
        assert_eq!(resolver.delay_once(&now, &tod("09:30:00")), 5_400_000);
        assert_eq!(
            resolver.fire_at(&now, &tod("09:30:00"), None).unwrap(),
            at(2024, 5, 1, 9, 30, 0)
        );
    }

    #[test]
    fn once_wraps_to_tomorrow() {
        let resolver = OccurrenceResolver::default();
        let now = at(2024, 5, 1, 8, 0, 0);
        assert_eq!(
            resolver.delay_once(&now, &tod("07:00:00")),
            MILLIS_PER_DAY - 3_600_000
        );
        assert_eq!(
            resolver.fire_at(&now, &tod("07:00:00"), None).unwrap(),
            at(2024, 5, 2, 7, 0, 0)
        );
    }

    #[test]
    fn once_counts_milliseconds_of_now() {
        let resolver = OccurrenceResolver::default();
        let now = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_milli_opt(8, 0, 0, 250)
            .unwrap();
        assert_eq!(resolver.delay_once(&now, &tod("08:00:01")), 750);
    }

    #[test]
    fn daily_after_passing_anchors_tomorrow() {
        let resolver = OccurrenceResolver::default();
        let now = at(2024, 5, 1, 0, 0, 2);
        let anchor = resolver
            .next_anchor(&now, &tod("00:00:01"), &Daily, now.date(), false)
            .unwrap();
        assert_eq!(anchor, date(2024, 5, 2));

        let fire_at = resolver
            .fire_at(&now, &tod("00:00:01"), Some(anchor))
            .unwrap();
        assert_eq!((fire_at - now).num_milliseconds(), 86_399_000);
    }

    #[test]
    fn daily_before_passing_steps_from_today() {
        let resolver = OccurrenceResolver::default();
        let now = at(2024, 5, 1, 6, 0, 0);
        let anchor = resolver
            .next_anchor(&now, &tod("07:00:00"), &Daily, now.date(), false)
            .unwrap();
        assert_eq!(anchor, date(2024, 5, 2));
    }

    #[test]
    fn surely_passed_never_returns_today() {
        let resolver = OccurrenceResolver::default();
        // The timer may wake a hair early, before the clock reads the alarm's second
        let now = at(2024, 5, 1, 6, 59, 59);
        let anchor = resolver
            .next_anchor(&now, &tod("07:00:00"), &Daily, now.date(), true)
            .unwrap();
        assert_eq!(anchor, date(2024, 5, 2));
    }

    #[test]
    fn weekly_after_fire_is_seven_days_out() {
        let resolver = OccurrenceResolver::default();
        let now = at(2024, 5, 1, 7, 0, 0);
        let anchor = resolver
            .next_anchor(&now, &tod("07:00:00"), &Weekly, now.date(), true)
            .unwrap();
        assert_eq!(anchor, date(2024, 5, 8));
    }

    #[test]
    fn monthly_from_the_31st() {
        let resolver = OccurrenceResolver::default();
        let initial = date(2024, 3, 31);
        let now = at(2024, 3, 31, 12, 0, 0);
        let anchor = resolver
            .next_anchor(&now, &tod("09:00:00"), &Monthly, initial, true)
            .unwrap();
        assert_eq!(anchor, date(2024, 4, 30));
    }

    #[test]
    fn yearly_from_leap_day() {
        let resolver = OccurrenceResolver::default();
        let initial = date(2024, 2, 29);
        let now = at(2024, 2, 29, 12, 0, 0);
        let anchor = resolver
            .next_anchor(&now, &tod("09:00:00"), &Yearly, initial, true)
            .unwrap();
        assert_eq!(anchor, date(2025, 2, 28));
    }

    #[test]
    fn rule_stuck_in_the_past_exhausts() {
        let resolver = OccurrenceResolver::new(100);
        let now = at(2024, 5, 1, 12, 0, 0);
        let stuck = Repeat::custom(|candidate: &mut NaiveDate, _| {
            *candidate = NaiveDate::MIN;
            Ok::<(), String>(())
        });
        assert_eq!(
            resolver.next_anchor(&now, &tod("09:00:00"), &*stuck.instantiate(), now.date(), false),
            Err(AlarmError::RepeatResolutionExhausted(100))
        );
    }

    #[test]
    fn rule_errors_propagate() {
        let resolver = OccurrenceResolver::default();
        let now = at(2024, 5, 1, 12, 0, 0);
        let failing = Repeat::custom(|_: &mut NaiveDate, _| Err::<(), _>("broken"));
        assert_eq!(
            resolver.next_anchor(&now, &tod("09:00:00"), &*failing.instantiate(), now.date(), false),
            Err(AlarmError::RepeatStepFailure("broken".to_string()))
        );
    }

    #[test]
    fn stale_anchor_is_unschedulable() {
        let resolver = OccurrenceResolver::default();
        let now = at(2024, 5, 1, 12, 0, 0);
        let result = resolver.fire_at(&now, &tod("09:00:00"), Some(date(2024, 5, 1)));
        assert_eq!(
            result,
            Err(AlarmError::UnschedulableDelay {
                fire_at: at(2024, 5, 1, 9, 0, 0),
                now,
            })
        );
    }
}
