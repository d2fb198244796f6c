use crate::errors::AlarmError;
use crate::utils::lock;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[allow(unused_imports)]
use crate::alarm::DaytimeAlarm;

/// [`AlarmCallback`] is invoked every time a [`DaytimeAlarm`] fires, it receives the humanized
/// ``HH:MM:SS`` time of day the alarm is configured for. Functions and closures implement this
/// trait automatically
pub trait AlarmCallback: Send + Sync {
    fn on_alarm(&self, humanized: &str);
}

impl<F> AlarmCallback for F
where
    F: Fn(&str) + Send + Sync,
{
    fn on_alarm(&self, humanized: &str) {
        self(humanized)
    }
}

/// [`DiagnosticListener`] observes the recoverable failures of a [`DaytimeAlarm`] (a repeat
/// rule degrading to a one-shot alarm, a fire instant that lies in the past... etc.). Functions
/// and closures implement this trait automatically
pub trait DiagnosticListener: Send + Sync {
    fn on_diagnostic(&self, error: &AlarmError);
}

impl<F> DiagnosticListener for F
where
    F: Fn(&AlarmError) + Send + Sync,
{
    fn on_diagnostic(&self, error: &AlarmError) {
        self(error)
    }
}

/// [`AlarmEvent`] is an ordered registry of listeners. Emitting runs every listener
/// synchronously in registration order, listeners are identified by the ``Uuid`` handed out on
/// subscription, which is also the only way to remove them
///
/// # See Also
/// - [`AlarmCallback`]
/// - [`DiagnosticListener`]
pub struct AlarmEvent<L: ?Sized> {
    listeners: Mutex<Vec<(Uuid, Arc<L>)>>,
}

impl<L: ?Sized> Default for AlarmEvent<L> {
    fn default() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
        }
    }
}

impl<L: ?Sized> AlarmEvent<L> {
    /// Subscribes a listener, returning an identifier to later [`AlarmEvent::unsubscribe`] it
    pub fn subscribe(&self, listener: Arc<L>) -> Uuid {
        let id = Uuid::new_v4();
        lock(&self.listeners).push((id, listener));
        id
    }

    /// Unsubscribes the listener with the given identifier, returns whether it existed
    pub fn unsubscribe(&self, id: &Uuid) -> bool {
        let mut listeners = lock(&self.listeners);
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| listener_id != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        lock(&self.listeners).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the listeners in registration order, taken so emission happens outside
    /// the lock and listeners may (un)subscribe while being notified
    pub(crate) fn snapshot(&self) -> Vec<Arc<L>> {
        lock(&self.listeners)
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect()
    }
}

impl AlarmEvent<dyn AlarmCallback> {
    /// Runs the callbacks in registration order, checking ``halted`` before each one. Returns
    /// whether every callback ran
    pub(crate) fn emit_unless(&self, humanized: &str, halted: impl Fn() -> bool) -> bool {
        for callback in self.snapshot() {
            if halted() {
                return false;
            }
            callback.on_alarm(humanized);
        }
        true
    }
}

impl AlarmEvent<dyn DiagnosticListener> {
    pub(crate) fn emit(&self, error: &AlarmError) {
        for listener in self.snapshot() {
            listener.on_diagnostic(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_in_registration_order() {
        let event = AlarmEvent::<dyn AlarmCallback>::default();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let sink = seen.clone();
            event.subscribe(Arc::new(move |time: &str| {
                lock(&sink).push(format!("{tag}@{time}"));
            }));
        }

        assert!(event.emit_unless("07:30:00", || false));
        assert_eq!(
            *lock(&seen),
            vec!["first@07:30:00", "second@07:30:00", "third@07:30:00"]
        );
    }

    #[test]
    fn unsubscribe_removes_by_identity() {
        let event = AlarmEvent::<dyn AlarmCallback>::default();
        let kept = event.subscribe(Arc::new(|_: &str| {}));
        let removed = event.subscribe(Arc::new(|_: &str| {}));

        assert!(event.unsubscribe(&removed));
        assert!(!event.unsubscribe(&removed));
        assert_eq!(event.len(), 1);
        assert!(event.unsubscribe(&kept));
        assert!(event.is_empty());
    }

    #[test]
    fn halted_emission_skips_the_rest() {
        let event = AlarmEvent::<dyn AlarmCallback>::default();
        let halted = Arc::new(Mutex::new(false));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let (flag, sink) = (halted.clone(), seen.clone());
        event.subscribe(Arc::new(move |_: &str| {
            lock(&sink).push("first");
            *lock(&flag) = true;
        }));
        let sink = seen.clone();
        event.subscribe(Arc::new(move |_: &str| lock(&sink).push("second")));

        assert!(!event.emit_unless("07:30:00", || *lock(&halted)));
        assert_eq!(*lock(&seen), vec!["first"]);
    }
}
