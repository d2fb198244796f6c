use crate::clock::{AlarmClock, SystemClock};
use crate::errors::AlarmError;
use crate::events::{AlarmCallback, AlarmEvent, DiagnosticListener};
use crate::reactive::Observable;
use crate::repeat::{NthExpr, Repeat, RepeatRule};
use crate::resolver::OccurrenceResolver;
use crate::time_of_day::TimeOfDay;
use crate::utils::{DEFAULT_MAX_RETRY_COUNT, lock};
use chrono::{Days, NaiveDate, NaiveDateTime, Timelike};
use std::fmt::{Debug, Display, Formatter};
use std::sync::{Arc, Mutex, Weak};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use typed_builder::TypedBuilder;
use uuid::Uuid;

/// Where a [`DaytimeAlarm`] currently is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmStatus {
    /// Not running, no timer armed
    Idle,
    /// Running with a timer scheduled for a future instant
    Armed,
    /// The timer elapsed and the callbacks are being dispatched
    Fired,
    /// Running, but the last recomputation could not arm a timer (see
    /// [`AlarmError::UnschedulableDelay`]), the next input change retries
    Unscheduled,
}

/// This is the builder configs to use for building a [`DaytimeAlarm`] instance.
/// By itself it should not be used, and it resides in [`DaytimeAlarm::builder`]
#[derive(TypedBuilder)]
#[builder(build_method(into = DaytimeAlarm))]
pub struct AlarmConfig {
    /// The time of day the alarm fires at
    time_of_day: TimeOfDay,

    /// The [`AlarmClock`] used to read the current time and to idle until the fire instant
    ///
    /// # Default Value
    /// [`SystemClock`], tests should prefer a [`VirtualClock`](crate::clock::VirtualClock)
    #[builder(default = Arc::new(SystemClock) as Arc<dyn AlarmClock>)]
    clock: Arc<dyn AlarmClock>,

    /// Upper bound of candidate dates tried while resolving the next repeat anchor
    ///
    /// # Default Value
    /// ``10_000``
    #[builder(default = DEFAULT_MAX_RETRY_COUNT)]
    max_retry_count: u32,
}

#[derive(Clone)]
struct RepeatSetup {
    label: String,
    rule: Arc<dyn RepeatRule>,
    initial: NaiveDate,
}

#[derive(Default)]
struct TimerSlot {
    handle: Option<JoinHandle<()>>,
    generation: u64,
    fire_at: Option<NaiveDateTime>,
    last_fired_at: Option<NaiveDateTime>,
    dispatching: bool,
    cancellations: u64,
}

impl TimerSlot {
    fn disarm(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!(fire_at = ?self.fire_at, "disarmed alarm timer");
        }
        self.generation = self.generation.wrapping_add(1);
        self.fire_at = None;
    }
}

type Inputs = ((bool, u32), Option<NaiveDate>);

struct AlarmShared {
    clock: Arc<dyn AlarmClock>,
    resolver: OccurrenceResolver,
    time_of_day: Observable<TimeOfDay>,
    humanized: Observable<String>,
    running: Observable<bool>,
    anchor: Observable<Option<NaiveDate>>,
    inputs: Observable<Inputs>,
    repeat: Mutex<Option<RepeatSetup>>,
    timer: Mutex<TimerSlot>,
    callbacks: AlarmEvent<dyn AlarmCallback>,
    diagnostics: AlarmEvent<dyn DiagnosticListener>,
}

impl AlarmShared {
    fn time_of_day(&self) -> TimeOfDay {
        self.time_of_day.get().unwrap_or_default()
    }

    fn diagnose(&self, error: AlarmError) {
        warn!(alarm = %self.time_of_day(), %error, "alarm diagnostic");
        self.diagnostics.emit(&error);
    }

    /// Disarms the pending timer and, when running, arms a fresh one for the instant derived
    /// from the current inputs. The inputs are read under the timer lock, so whichever
    /// recomputation runs last sees the latest values regardless of notification order
    fn recompute(self: &Arc<Self>) {
        let mut timer = lock(&self.timer);
        timer.disarm();
        let running = self.running.get().unwrap_or(false);
        let anchor = self.anchor.get().flatten();
        if !running {
            return;
        }

        let now = self.clock.now();
        let time_of_day = self.time_of_day();
        let mut fire_at = match self.resolver.fire_at(&now, &time_of_day, anchor) {
            Ok(fire_at) => fire_at,
            Err(error) => {
                drop(timer);
                self.diagnose(error);
                return;
            }
        };

        // A one-shot resolved at the very instant it just fired means tomorrow
        if anchor.is_none() && timer.last_fired_at.is_some_and(|last| fire_at <= last) {
            match fire_at.checked_add_days(Days::new(1)) {
                Some(tomorrow) => fire_at = tomorrow,
                None => {
                    drop(timer);
                    self.diagnose(AlarmError::CalendarOutOfRange);
                    return;
                }
            }
        }

        let Ok(runtime) = Handle::try_current() else {
            drop(timer);
            self.diagnose(AlarmError::MissingRuntime);
            return;
        };

        let generation = timer.generation;
        let clock = self.clock.clone();
        let shared = Arc::downgrade(self);
        timer.handle = Some(runtime.spawn(async move {
            clock.idle_to(fire_at).await;
            if let Some(shared) = shared.upgrade() {
                shared.fire(generation);
            }
        }));
        timer.fire_at = Some(fire_at);
        debug!(%fire_at, ?anchor, generation, "armed alarm timer");
    }

    fn fire(self: &Arc<Self>, generation: u64) {
        let cancellations = {
            let mut timer = lock(&self.timer);
            if timer.generation != generation {
                return;
            }
            timer.handle = None;
            timer.last_fired_at = timer.fire_at.take();
            timer.dispatching = true;
            timer.cancellations
        };

        let humanized = self.time_of_day().to_string();
        debug!(alarm = %humanized, "alarm fired");
        // Once cancel() returns no further callback of this cycle starts
        let completed = self.callbacks.emit_unless(&humanized, || {
            lock(&self.timer).cancellations != cancellations
        });
        if !completed {
            debug!(alarm = %humanized, "dispatch cut short by cancellation");
        }

        {
            let mut timer = lock(&self.timer);
            timer.dispatching = false;
            // A callback changed an input, that recomputation already took over
            if timer.generation != generation {
                return;
            }
        }

        if lock(&self.repeat).is_some() {
            self.resolve_anchor(true);
        } else {
            self.running.set(false);
        }
    }

    /// Resolves the anchor of the configured repeat rule, degrading to a one-shot alarm when
    /// the rule fails
    fn resolve_anchor(self: &Arc<Self>, surely_passed: bool) {
        let setup = lock(&self.repeat).clone();
        let Some(setup) = setup else {
            self.set_anchor(None);
            return;
        };

        let now = self.clock.now();
        let resolved = self.resolver.next_anchor(
            &now,
            &self.time_of_day(),
            setup.rule.as_ref(),
            setup.initial,
            surely_passed,
        );

        match resolved {
            Ok(anchor) => self.set_anchor(Some(anchor)),
            Err(error) => {
                *lock(&self.repeat) = None;
                warn!(repeat = %setup.label, "repeat cancelled, alarm fires once");
                self.diagnose(error);
                self.set_anchor(None);
            }
        }
    }

    fn set_anchor(self: &Arc<Self>, anchor: Option<NaiveDate>) {
        if !self.anchor.set(anchor) {
            self.recompute();
        }
    }
}

/// [`DaytimeAlarm`] fires every registered callback when the wall-clock reaches its time of
/// day, once or repeatedly according to a [`Repeat`] rule.
///
/// The alarm is reactive: its time of day, its running flag and its resolved repeat anchor are
/// [`Observable`] inputs, and every distinct change to any of them disarms the pending timer and
/// arms a new one for the freshly computed instant. After a fire the callbacks run in
/// registration order, then a repeating alarm resolves its following occurrence while a
/// one-shot alarm goes back to [`AlarmStatus::Idle`].
///
/// Failures after configuration never reach the caller. A repeat rule that errors or finds no
/// future date is dropped (the alarm still fires once), an anchor that lies in the past leaves
/// the alarm running but unarmed. Both are reported through [`DaytimeAlarm::on_diagnostic`]
///
/// # Constructor(s)
/// - [`DaytimeAlarm::new`] from a ``"HH:MM:SS"`` string on the system clock
/// - [`DaytimeAlarm::at`] from any wall-clock value
/// - [`DaytimeAlarm::builder`] for a custom clock or retry bound
///
/// # IMPORTANT Note(s)
/// Arming spawns the timer on the ambient Tokio runtime, an alarm started outside a runtime
/// stays unarmed and reports [`AlarmError::MissingRuntime`]. Dropping the alarm disarms it.
///
/// The alarm may be driven from several threads. Every recomputation reads the current
/// inputs under one lock, so concurrent setters always settle on the latest values, though a
/// ``start()`` racing the end of a one-shot fire may be absorbed by it
///
/// # Example
/// ```ignore
/// use daytime_alarm::prelude::*;
///
/// let alarm = DaytimeAlarm::new("07:30")?;
/// alarm
///     .repeat(Repeat::week_days())
///     .start_with(|time: &str| println!("Wake up, it is {time}"));
/// ```
pub struct DaytimeAlarm {
    shared: Arc<AlarmShared>,
}

impl From<AlarmConfig> for DaytimeAlarm {
    fn from(config: AlarmConfig) -> Self {
        let time_of_day = Observable::new(config.time_of_day);
        let millis = time_of_day.map(TimeOfDay::millis);
        let humanized = time_of_day.map(TimeOfDay::to_string);

        let running = Observable::new(false);
        let anchor: Observable<Option<NaiveDate>> = Observable::new(None);
        let inputs = running.zip(&millis).zip(&anchor);

        let shared = Arc::new(AlarmShared {
            clock: config.clock,
            resolver: OccurrenceResolver::new(config.max_retry_count),
            time_of_day,
            humanized,
            running,
            anchor,
            inputs,
            repeat: Mutex::new(None),
            timer: Mutex::new(TimerSlot::default()),
            callbacks: AlarmEvent::default(),
            diagnostics: AlarmEvent::default(),
        });

        let weak: Weak<AlarmShared> = Arc::downgrade(&shared);
        shared
            .inputs
            .subscribe(move |_: &Inputs| {
                if let Some(shared) = weak.upgrade() {
                    shared.recompute();
                }
            });

        DaytimeAlarm { shared }
    }
}

impl DaytimeAlarm {
    /// Creates an alarm on the system clock from ``"HH"``, ``"HH:MM"`` or ``"HH:MM:SS"``
    pub fn new(day_time: &str) -> Result<Self, AlarmError> {
        Ok(Self::builder().time_of_day(day_time.parse()?).build())
    }

    /// Creates an alarm on the system clock firing at the wall-clock time of ``time``
    pub fn at(time: &impl Timelike) -> Self {
        Self::builder().time_of_day(TimeOfDay::of(time)).build()
    }

    pub fn builder() -> AlarmConfigBuilder {
        AlarmConfig::builder()
    }

    /// Starts the alarm, arming its timer
    pub fn start(&self) -> &Self {
        self.shared.running.set(true);
        self
    }

    /// Registers ``callback`` and starts the alarm
    pub fn start_with(&self, callback: impl AlarmCallback + 'static) -> &Self {
        self.on_alarm(callback);
        self.start()
    }

    /// Stops the alarm. The pending timer is disarmed before this returns and no callback of the
    /// cancelled cycle starts afterwards, a callback already running on another thread is left
    /// to finish
    pub fn cancel(&self) -> &Self {
        {
            let mut timer = lock(&self.shared.timer);
            timer.cancellations = timer.cancellations.wrapping_add(1);
        }
        if !self.shared.running.set(false) {
            lock(&self.shared.timer).disarm();
        }
        self
    }

    /// Repeats the alarm according to ``repeat``. The current date becomes the anchor for
    /// monthly and yearly rules
    pub fn repeat(&self, repeat: Repeat) -> &Self {
        let initial = self.shared.clock.now().date();
        debug!(repeat = repeat.label(), %initial, "configured repeat");
        *lock(&self.shared.repeat) = Some(RepeatSetup {
            label: repeat.label().to_string(),
            rule: repeat.instantiate(),
            initial,
        });
        self.shared.resolve_anchor(false);
        self
    }

    /// Repeats the alarm with a preset looked up by name
    ///
    /// # Errors
    /// [`AlarmError::UnknownRepeatPreset`] or [`AlarmError::InvalidExpression`], the current
    /// configuration is left untouched
    pub fn repeat_preset(
        &self,
        name: &str,
        nth: Option<NthExpr>,
    ) -> Result<&Self, AlarmError> {
        Ok(self.repeat(Repeat::named(name, nth)?))
    }

    /// Stops repeating, the alarm fires at its next occurrence only
    pub fn once(&self) -> &Self {
        *lock(&self.shared.repeat) = None;
        self.shared.set_anchor(None);
        self
    }

    /// Registers a callback, returning the identifier to remove it with
    /// [`DaytimeAlarm::off_alarm`]
    pub fn on_alarm(&self, callback: impl AlarmCallback + 'static) -> Uuid {
        self.shared.callbacks.subscribe(Arc::new(callback))
    }

    /// Removes a callback, returns whether it was registered
    pub fn off_alarm(&self, id: &Uuid) -> bool {
        self.shared.callbacks.unsubscribe(id)
    }

    pub fn on_diagnostic(&self, listener: impl DiagnosticListener + 'static) -> Uuid {
        self.shared.diagnostics.subscribe(Arc::new(listener))
    }

    pub fn off_diagnostic(&self, id: &Uuid) -> bool {
        self.shared.diagnostics.unsubscribe(id)
    }

    /// Whether the alarm's time of day is at or before ``reference`` (the clock's current time
    /// when omitted). See [`TimeOfDay::has_passed`] for the comparison
    pub fn has_alarm_passed_today(&self, reference: Option<TimeOfDay>) -> bool {
        let reference = reference.unwrap_or_else(|| TimeOfDay::of(&self.shared.clock.now()));
        self.time_of_day().has_passed(&reference)
    }

    pub fn time_of_day(&self) -> TimeOfDay {
        self.shared.time_of_day()
    }

    /// Moves the alarm to another time of day, re-arming it when running
    pub fn set_time_of_day(&self, time_of_day: TimeOfDay) -> &Self {
        self.shared.time_of_day.set(time_of_day);
        self
    }

    pub fn set_day_time(&self, day_time: &str) -> Result<&Self, AlarmError> {
        Ok(self.set_time_of_day(day_time.parse()?))
    }

    /// Subscribes to the humanized ``HH:MM:SS`` string, called on every change of the time of day
    pub fn subscribe_humanized(&self, listener: impl Fn(&String) + Send + Sync + 'static) -> Uuid {
        self.shared.humanized.subscribe(listener)
    }

    pub fn unsubscribe_humanized(&self, id: &Uuid) {
        self.shared.humanized.unsubscribe(id)
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.get().unwrap_or(false)
    }

    /// The date the next repeating fire falls on, ``None`` for one-shot alarms
    pub fn repeat_anchor(&self) -> Option<NaiveDate> {
        self.shared.anchor.get().flatten()
    }

    /// Label of the configured repeat rule, ``None`` for one-shot alarms
    pub fn repeat_label(&self) -> Option<String> {
        lock(&self.shared.repeat)
            .as_ref()
            .map(|setup| setup.label.clone())
    }

    /// The instant the armed timer fires at, ``None`` while not armed
    pub fn next_fire_at(&self) -> Option<NaiveDateTime> {
        lock(&self.shared.timer).fire_at
    }

    pub fn status(&self) -> AlarmStatus {
        let running = self.is_running();
        let timer = lock(&self.shared.timer);
        if timer.dispatching {
            AlarmStatus::Fired
        } else if !running {
            AlarmStatus::Idle
        } else if timer.handle.is_some() {
            AlarmStatus::Armed
        } else {
            AlarmStatus::Unscheduled
        }
    }
}

impl Display for DaytimeAlarm {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.shared.humanized.get().unwrap_or_default())
    }
}

impl Debug for DaytimeAlarm {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaytimeAlarm")
            .field("time_of_day", &self.time_of_day())
            .field("running", &self.is_running())
            .field("repeat", &self.repeat_label())
            .field("repeat_anchor", &self.repeat_anchor())
            .field("next_fire_at", &self.next_fire_at())
            .field("clock", &self.shared.clock)
            .finish()
    }
}

impl Drop for DaytimeAlarm {
    fn drop(&mut self) {
        let mut timer = lock(&self.shared.timer);
        timer.cancellations = timer.cancellations.wrapping_add(1);
        timer.disarm();
    }
}

/// Creates an alarm on the system clock from ``"HH:MM:SS"`` and starts it right away
pub fn alarm(day_time: &str) -> Result<DaytimeAlarm, AlarmError> {
    let alarm = DaytimeAlarm::new(day_time)?;
    alarm.start();
    Ok(alarm)
}
