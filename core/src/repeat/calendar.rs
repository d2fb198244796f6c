use crate::errors::AlarmError;
use crate::repeat::RepeatRule;
use chrono::{Datelike, Days, NaiveDate, Weekday};

fn add_days(date: NaiveDate, days: u64) -> Result<NaiveDate, AlarmError> {
    date.checked_add_days(Days::new(days))
        .ok_or(AlarmError::CalendarOutOfRange)
}

/// Places ``day`` (1-based) into the period starting at ``period_start``, letting it overflow
/// past the period's end, then walks backwards until ``in_period`` holds again. A day that does
/// not exist in the period therefore clamps to the period's last day
fn land_on_day(
    period_start: NaiveDate,
    day: u32,
    in_period: impl Fn(&NaiveDate) -> bool,
) -> Result<NaiveDate, AlarmError> {
    let mut landed = add_days(period_start, u64::from(day.saturating_sub(1)))?;
    while !in_period(&landed) {
        landed = landed.pred_opt().ok_or(AlarmError::CalendarOutOfRange)?;
    }
    Ok(landed)
}

/// [`Daily`] advances the candidate by one day
#[derive(Debug, Default, Clone, Copy)]
pub struct Daily;

impl RepeatRule for Daily {
    fn step(&self, candidate: &mut NaiveDate, _initial: NaiveDate) -> Result<(), AlarmError> {
        *candidate = add_days(*candidate, 1)?;
        Ok(())
    }
}

/// [`Weekly`] advances the candidate by seven days
#[derive(Debug, Default, Clone, Copy)]
pub struct Weekly;

impl RepeatRule for Weekly {
    fn step(&self, candidate: &mut NaiveDate, _initial: NaiveDate) -> Result<(), AlarmError> {
        *candidate = add_days(*candidate, 7)?;
        Ok(())
    }
}

/// [`WeekDays`] advances the candidate by one day, skipping Saturday and Sunday
#[derive(Debug, Default, Clone, Copy)]
pub struct WeekDays;

impl RepeatRule for WeekDays {
    fn step(&self, candidate: &mut NaiveDate, _initial: NaiveDate) -> Result<(), AlarmError> {
        let next = add_days(*candidate, 1)?;
        *candidate = match next.weekday() {
            Weekday::Sat => add_days(next, 2)?,
            Weekday::Sun => add_days(next, 1)?,
            _ => next,
        };
        Ok(())
    }
}

/// [`WeekEnds`] advances the candidate by one day, jumping from any weekday to the next
/// Saturday
#[derive(Debug, Default, Clone, Copy)]
pub struct WeekEnds;

impl RepeatRule for WeekEnds {
    fn step(&self, candidate: &mut NaiveDate, _initial: NaiveDate) -> Result<(), AlarmError> {
        let next = add_days(*candidate, 1)?;
        *candidate = match next.weekday() {
            Weekday::Sat | Weekday::Sun => next,
            weekday => add_days(next, u64::from(5 - weekday.num_days_from_monday()))?,
        };
        Ok(())
    }
}

/// [`Monthly`] moves the candidate to the next month, on the day of month of the date the
/// repeat was configured at. Months shorter than that day clamp to their last day, so a repeat
/// configured on the 31st fires on the 30th of April and on the 28th (or 29th) of February
#[derive(Debug, Default, Clone, Copy)]
pub struct Monthly;

impl RepeatRule for Monthly {
    fn step(&self, candidate: &mut NaiveDate, initial: NaiveDate) -> Result<(), AlarmError> {
        // Day 56 of any month always lands inside the following one
        let month_start = candidate.with_day(1).ok_or(AlarmError::CalendarOutOfRange)?;
        let overshoot = add_days(month_start, 55)?;
        let (year, month) = (overshoot.year(), overshoot.month());

        let target_start = overshoot.with_day(1).ok_or(AlarmError::CalendarOutOfRange)?;
        *candidate = land_on_day(target_start, initial.day(), |date| {
            date.year() == year && date.month() == month
        })?;
        Ok(())
    }
}

/// [`Yearly`] moves the candidate to the next year, on the month and day the repeat was
/// configured at. A repeat configured on February 29 fires on February 28 in non-leap years
#[derive(Debug, Default, Clone, Copy)]
pub struct Yearly;

impl RepeatRule for Yearly {
    fn step(&self, candidate: &mut NaiveDate, initial: NaiveDate) -> Result<(), AlarmError> {
        // 400 days past the start of the year always lands inside the following one
        let year_start = candidate.with_ordinal(1).ok_or(AlarmError::CalendarOutOfRange)?;
        let year = add_days(year_start, 400)?.year();

        let target_start = NaiveDate::from_ymd_opt(year, initial.month(), 1)
            .ok_or(AlarmError::CalendarOutOfRange)?;
        let month = initial.month();
        *candidate = land_on_day(target_start, initial.day(), |date| {
            date.year() == year && date.month() == month
        })?;
        Ok(())
    }
}
