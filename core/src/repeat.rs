pub mod calendar; // skipcq: RS-D1001

pub mod nth; // skipcq: RS-D1001

pub use calendar::{Daily, Monthly, WeekDays, WeekEnds, Weekly, Yearly};
pub use nth::{NthExpr, NthFilter};

use crate::errors::AlarmError;
use crate::utils::DEFAULT_MAX_RETRY_COUNT;
use chrono::NaiveDate;
use std::fmt::{Debug, Display, Formatter};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::str::FromStr;
use std::sync::Arc;

#[allow(unused_imports)]
use crate::alarm::DaytimeAlarm;

/// The [`RepeatRule`] trait is a calendar-step function, it advances a candidate date to the
/// next date the recurrence permits. It is what a [`DaytimeAlarm`] consults, through the
/// [`OccurrenceResolver`](crate::resolver::OccurrenceResolver), to find the day of its next
/// fire.
///
/// # Required Method(s)
/// [`RepeatRule::step`] receives the ``candidate`` to advance in place and the ``initial`` date
/// the repeat was configured at, rules anchored on a day of month or year ([`Monthly`],
/// [`Yearly`]) read it to keep that anchor across short months
///
/// # Trait Implementation(s)
/// - [`Daily`], [`Weekly`], [`WeekDays`], [`WeekEnds`], [`Monthly`], [`Yearly`]
/// - [`NthStep`] wraps a rule with an [`NthFilter`]
/// - any ``Fn(&mut NaiveDate, NaiveDate) -> Result<(), E>`` closure via [`Repeat::custom`]
///
/// # Object Safety
/// This trait is object safe, alarms store their rule as ``Arc<dyn RepeatRule>``
pub trait RepeatRule: Send + Sync {
    fn step(&self, candidate: &mut NaiveDate, initial: NaiveDate) -> Result<(), AlarmError>;
}

/// [`NthStep`] repeats the wrapped rule's step until its [`NthFilter`] accepts the
/// occurrence, so ``weekly`` with ``2n+1`` advances one week, then two weeks at a time.
/// The number of steps per call is bounded by ``max_retry_count``. Cloning yields a step whose
/// filter counts from one again
pub struct NthStep<R: RepeatRule> {
    rule: R,
    filter: NthFilter,
    max_retry_count: u32,
}

impl<R: RepeatRule> NthStep<R> {
    pub fn new(rule: R, filter: NthFilter) -> Self {
        Self::bounded(rule, filter, DEFAULT_MAX_RETRY_COUNT)
    }

    pub fn bounded(rule: R, filter: NthFilter, max_retry_count: u32) -> Self {
        Self {
            rule,
            filter,
            max_retry_count,
        }
    }
}

impl<R: RepeatRule + Clone> Clone for NthStep<R> {
    fn clone(&self) -> Self {
        Self::bounded(self.rule.clone(), self.filter.fresh(), self.max_retry_count)
    }
}

impl<R: RepeatRule> RepeatRule for NthStep<R> {
    fn step(&self, candidate: &mut NaiveDate, initial: NaiveDate) -> Result<(), AlarmError> {
        for _ in 0..self.max_retry_count {
            self.rule.step(candidate, initial)?;
            if self.filter.accepts() {
                return Ok(());
            }
        }
        Err(AlarmError::RepeatResolutionExhausted(self.max_retry_count))
    }
}

struct CustomRule<F>(Arc<F>);

impl<F> Clone for CustomRule<F> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<F, E> RepeatRule for CustomRule<F>
where
    F: Fn(&mut NaiveDate, NaiveDate) -> Result<(), E> + Send + Sync,
    E: Display,
{
    fn step(&self, candidate: &mut NaiveDate, initial: NaiveDate) -> Result<(), AlarmError> {
        let mut working = *candidate;
        match catch_unwind(AssertUnwindSafe(|| (*self.0)(&mut working, initial))) {
            Ok(Ok(())) => {
                *candidate = working;
                Ok(())
            }
            Ok(Err(error)) => Err(AlarmError::RepeatStepFailure(error.to_string())),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|message| message.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "custom repeat rule panicked".to_string());
                Err(AlarmError::RepeatStepFailure(message))
            }
        }
    }
}

/// [`RepeatPreset`] names the built-in recurrences, it parses from ``daily``, ``weekly``,
/// ``weekDays``, ``weekEnds``, ``monthly`` and ``yearly`` (case-insensitive)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepeatPreset {
    Daily,
    Weekly,
    WeekDays,
    WeekEnds,
    Monthly,
    Yearly,
}

impl RepeatPreset {
    pub const ALL: [RepeatPreset; 6] = [
        RepeatPreset::Daily,
        RepeatPreset::Weekly,
        RepeatPreset::WeekDays,
        RepeatPreset::WeekEnds,
        RepeatPreset::Monthly,
        RepeatPreset::Yearly,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            RepeatPreset::Daily => "daily",
            RepeatPreset::Weekly => "weekly",
            RepeatPreset::WeekDays => "weekDays",
            RepeatPreset::WeekEnds => "weekEnds",
            RepeatPreset::Monthly => "monthly",
            RepeatPreset::Yearly => "yearly",
        }
    }

    /// Whether the preset counts its occurrences with an [`NthFilter`]
    pub fn supports_nth(&self) -> bool {
        matches!(
            self,
            RepeatPreset::Weekly | RepeatPreset::Monthly | RepeatPreset::Yearly
        )
    }
}

impl Display for RepeatPreset {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RepeatPreset {
    type Err = AlarmError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        RepeatPreset::ALL
            .into_iter()
            .find(|preset| preset.name().eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| AlarmError::UnknownRepeatPreset(name.to_string()))
    }
}

/// [`Repeat`] is a configured repeat rule, ready to be handed to [`DaytimeAlarm::repeat`].
/// It is a recipe rather than a live rule: every alarm configured with it (or with a clone of
/// it) instantiates its own rule, so [`NthFilter`] counters are never shared between alarms
///
/// # Constructor(s)
/// - [`Repeat::daily`], [`Repeat::week_days`], [`Repeat::week_ends`]
/// - [`Repeat::weekly`], [`Repeat::monthly`], [`Repeat::yearly`], optionally filtered with an
///   nth-occurrence expression (``None::<NthExpr>`` accepts every occurrence)
/// - [`Repeat::preset`] by [`RepeatPreset`] (or its name via [`Repeat::named`])
/// - [`Repeat::custom`] from a closure
/// - [`Repeat::rule`] from any [`RepeatRule`]
///
/// # Example
/// ```ignore
/// alarm.repeat(Repeat::weekly(Some("2n+1"))?); // every other week
/// alarm.repeat(Repeat::named("weekDays", None::<NthExpr>)?);
/// alarm.repeat(Repeat::custom(|date: &mut NaiveDate, _initial| {
///     *date = date.checked_add_days(Days::new(3)).ok_or("out of range")?;
///     Ok::<(), &str>(())
/// }));
/// ```
type RuleFactory = Arc<dyn Fn() -> Arc<dyn RepeatRule> + Send + Sync>;

#[derive(Clone)]
pub struct Repeat {
    factory: RuleFactory,
    label: String,
}

impl Debug for Repeat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Repeat").field(&self.label).finish()
    }
}

impl Repeat {
    /// Wraps ``rule``, each alarm receives its own clone of it
    pub fn rule<R>(rule: R, label: impl Into<String>) -> Self
    where
        R: RepeatRule + Clone + 'static,
    {
        Self {
            factory: Arc::new(move || Arc::new(rule.clone()) as Arc<dyn RepeatRule>),
            label: label.into(),
        }
    }

    pub fn custom<F, E>(step: F) -> Self
    where
        F: Fn(&mut NaiveDate, NaiveDate) -> Result<(), E> + Send + Sync + 'static,
        E: Display + 'static,
    {
        Self::rule(CustomRule(Arc::new(step)), "custom")
    }

    pub fn daily() -> Self {
        Self::rule(Daily, RepeatPreset::Daily.name())
    }

    pub fn week_days() -> Self {
        Self::rule(WeekDays, RepeatPreset::WeekDays.name())
    }

    pub fn week_ends() -> Self {
        Self::rule(WeekEnds, RepeatPreset::WeekEnds.name())
    }

    pub fn weekly(nth: Option<impl Into<NthExpr>>) -> Result<Self, AlarmError> {
        Self::preset(RepeatPreset::Weekly, nth.map(Into::into))
    }

    pub fn monthly(nth: Option<impl Into<NthExpr>>) -> Result<Self, AlarmError> {
        Self::preset(RepeatPreset::Monthly, nth.map(Into::into))
    }

    pub fn yearly(nth: Option<impl Into<NthExpr>>) -> Result<Self, AlarmError> {
        Self::preset(RepeatPreset::Yearly, nth.map(Into::into))
    }

    /// Builds a preset by name, see [`RepeatPreset`] for the accepted names
    pub fn named(name: &str, nth: Option<impl Into<NthExpr>>) -> Result<Self, AlarmError> {
        Self::preset(name.parse()?, nth.map(Into::into))
    }

    /// Builds a preset. The nth expression is parsed eagerly, an invalid one fails with
    /// [`AlarmError::InvalidExpression`]. Presets without nth support ignore it
    pub fn preset(preset: RepeatPreset, nth: Option<NthExpr>) -> Result<Self, AlarmError> {
        let filter = NthFilter::parse(nth)?;
        let label = preset.name();
        if !preset.supports_nth() || filter.is_every() {
            return Ok(match preset {
                RepeatPreset::Daily => Self::rule(Daily, label),
                RepeatPreset::Weekly => Self::rule(Weekly, label),
                RepeatPreset::WeekDays => Self::rule(WeekDays, label),
                RepeatPreset::WeekEnds => Self::rule(WeekEnds, label),
                RepeatPreset::Monthly => Self::rule(Monthly, label),
                RepeatPreset::Yearly => Self::rule(Yearly, label),
            });
        }

        Ok(match preset {
            RepeatPreset::Monthly => Self::rule(NthStep::new(Monthly, filter), label),
            RepeatPreset::Yearly => Self::rule(NthStep::new(Yearly, filter), label),
            _ => Self::rule(NthStep::new(Weekly, filter), label),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Builds a rule instance with its own state
    pub(crate) fn instantiate(&self) -> Arc<dyn RepeatRule> {
        (self.factory)()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Days;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn presets_parse_by_name() {
        assert_eq!("daily".parse::<RepeatPreset>().unwrap(), RepeatPreset::Daily);
        assert_eq!("weekDays".parse::<RepeatPreset>().unwrap(), RepeatPreset::WeekDays);
        assert_eq!("weekends".parse::<RepeatPreset>().unwrap(), RepeatPreset::WeekEnds);
        assert_eq!(
            "fortnightly".parse::<RepeatPreset>().unwrap_err(),
            AlarmError::UnknownRepeatPreset("fortnightly".to_string())
        );
    }

    #[test]
    fn weekly_every_other_week() {
        let repeat = Repeat::weekly(Some("2n+1")).unwrap().instantiate();
        let start = date(2024, 1, 1);
        let mut candidate = start;

        repeat.step(&mut candidate, start).unwrap();
        assert_eq!(candidate, date(2024, 1, 8));
        repeat.step(&mut candidate, start).unwrap();
        assert_eq!(candidate, date(2024, 1, 22));
        repeat.step(&mut candidate, start).unwrap();
        assert_eq!(candidate, date(2024, 2, 5));
    }

    #[test]
    fn clones_count_independently() {
        let repeat = Repeat::weekly(Some("2n+1")).unwrap();
        let copy = repeat.clone();
        let start = date(2024, 1, 1);

        let first = repeat.instantiate();
        let mut candidate = start;
        first.step(&mut candidate, start).unwrap();
        assert_eq!(candidate, date(2024, 1, 8));

        for second in [copy.instantiate(), repeat.instantiate()] {
            let mut candidate = start;
            second.step(&mut candidate, start).unwrap();
            assert_eq!(candidate, date(2024, 1, 8));
        }
    }

    #[test]
    fn invalid_nth_fails_eagerly() {
        assert_eq!(
            Repeat::monthly(Some("every other")).unwrap_err(),
            AlarmError::InvalidExpression("every other".to_string())
        );
    }

    #[test]
    fn nth_exhaustion_is_bounded() {
        let repeat = Repeat::rule(
            NthStep::bounded(Daily, NthFilter::parse(Some(0u64.into())).unwrap(), 50),
            "never",
        )
        .instantiate();
        let start = date(2024, 1, 1);
        let mut candidate = start;
        assert_eq!(
            repeat.step(&mut candidate, start),
            Err(AlarmError::RepeatResolutionExhausted(50))
        );
    }

    #[test]
    fn custom_errors_and_panics_become_step_failures() {
        let start = date(2024, 1, 1);

        let failing = Repeat::custom(|_: &mut NaiveDate, _| Err::<(), _>("no luck"));
        let mut candidate = start;
        assert_eq!(
            failing.instantiate().step(&mut candidate, start),
            Err(AlarmError::RepeatStepFailure("no luck".to_string()))
        );
        assert_eq!(candidate, start);

        let panicking = Repeat::custom(|_: &mut NaiveDate, _| -> Result<(), String> {
            panic!("boom")
        });
        assert_eq!(
            panicking.instantiate().step(&mut candidate, start),
            Err(AlarmError::RepeatStepFailure("boom".to_string()))
        );
    }

    #[test]
    fn custom_steps_mutate_the_candidate() {
        let every_third = Repeat::custom(|date: &mut NaiveDate, _| {
            *date = date.checked_add_days(Days::new(3)).ok_or("out of range")?;
            Ok::<(), &str>(())
        });
        let start = date(2024, 1, 1);
        let mut candidate = start;
        every_third.instantiate().step(&mut candidate, start).unwrap();
        assert_eq!(candidate, date(2024, 1, 4));
    }
}
