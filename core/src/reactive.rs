use crate::utils::lock;
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Mutex, Weak};
use uuid::Uuid;

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct ObservableInner<T> {
    value: Mutex<Option<T>>,
    listeners: Mutex<Vec<(Uuid, Listener<T>)>>,
}

/// [`Observable`] is a value holder which synchronously notifies its subscribers every time
/// its value changes to a *distinct* value. It is the reactive primitive the alarm is wired
/// with: the time-of-day fields, the running flag and the repeat anchor are all observables,
/// and the fire instant is recomputed from a combination of them.
///
/// An observable may start out empty (see [`Observable::empty`]), derived observables
/// produced by [`Observable::zip`] stay empty until every input has a value.
///
/// # Subscription Semantics
/// Subscribing never replays the current value, the listener only sees later changes.
/// Listeners run in subscription order, outside the internal locks, so a listener may read
/// or even set observables (including the one that notified it)
///
/// # Cloning Semantics
/// Cloning is shallow, both clones share the same value and subscribers
///
/// # See Also
/// - [`Observable::map`]
/// - [`Observable::zip`]
pub struct Observable<T> {
    inner: Arc<ObservableInner<T>>,
}

struct WeakObservable<T> {
    inner: Weak<ObservableInner<T>>,
}

impl<T> WeakObservable<T> {
    fn upgrade(&self) -> Option<Observable<T>> {
        self.inner.upgrade().map(|inner| Observable { inner })
    }
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Debug> Debug for Observable<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Observable")
            .field(&*lock(&self.inner.value))
            .finish()
    }
}

impl<T> Observable<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new(value: T) -> Self {
        Self::from_option(Some(value))
    }

    pub fn empty() -> Self {
        Self::from_option(None)
    }

    fn from_option(value: Option<T>) -> Self {
        Self {
            inner: Arc::new(ObservableInner {
                value: Mutex::new(value),
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Gets a clone of the current value, ``None`` while the observable is still empty
    pub fn get(&self) -> Option<T> {
        lock(&self.inner.value).clone()
    }

    /// Sets the value, notifying every subscriber when it differs from the previous one
    ///
    /// # Returns
    /// Whether the value actually changed (and thus whether subscribers were notified)
    pub fn set(&self, value: T) -> bool {
        {
            let mut current = lock(&self.inner.value);
            if current.as_ref() == Some(&value) {
                return false;
            }
            *current = Some(value.clone());
        }

        let listeners: Vec<Listener<T>> = lock(&self.inner.listeners)
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(&value);
        }
        true
    }

    /// Subscribes a listener for future changes, returning an identifier to later
    /// [`Observable::unsubscribe`] it
    pub fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> Uuid {
        let id = Uuid::new_v4();
        lock(&self.inner.listeners).push((id, Arc::new(listener)));
        id
    }

    /// Unsubscribes the listener with the given identifier, unknown identifiers are ignored
    pub fn unsubscribe(&self, id: &Uuid) {
        lock(&self.inner.listeners).retain(|(listener_id, _)| listener_id != id);
    }

    fn downgrade(&self) -> WeakObservable<T> {
        WeakObservable {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Derives a new observable whose value is always ``f`` applied to this one's value
    pub fn map<U>(&self, f: impl Fn(&T) -> U + Send + Sync + 'static) -> Observable<U>
    where
        U: Clone + PartialEq + Send + Sync + 'static,
    {
        let derived = Observable::from_option(self.get().as_ref().map(&f));
        let target = derived.clone();
        self.subscribe(move |value| {
            target.set(f(value));
        });
        derived
    }

    /// Combines this observable with ``other`` into an observable of pairs. The pair gets a
    /// value once both sides have one and is updated on every change of either side, nest
    /// calls to group more than two inputs
    pub fn zip<U>(&self, other: &Observable<U>) -> Observable<(T, U)>
    where
        U: Clone + PartialEq + Send + Sync + 'static,
    {
        let combined = Observable::from_option(self.get().zip(other.get()));

        // Each side only holds the other weakly, sources own their derivations and never
        // the reverse
        let (target, right) = (combined.clone(), other.downgrade());
        self.subscribe(move |left| {
            if let Some(right) = right.upgrade().and_then(|right| right.get()) {
                target.set((left.clone(), right));
            }
        });

        let (target, left) = (combined.clone(), self.downgrade());
        other.subscribe(move |right| {
            if let Some(left) = left.upgrade().and_then(|left| left.get()) {
                target.set((left, right.clone()));
            }
        });

        combined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn set_notifies_only_on_distinct_values() {
        let observable = Observable::new(1);
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        observable.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!observable.set(1));
        assert!(observable.set(2));
        assert!(!observable.set(2));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(observable.get(), Some(2));
    }

    #[test]
    fn unsubscribed_listeners_are_silent() {
        let observable = Observable::new("a".to_string());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let id = observable.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        observable.unsubscribe(&id);
        observable.set("b".to_string());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn map_follows_source() {
        let hours = Observable::new(2u32);
        let millis = hours.map(|hour| hour * 3_600_000);
        assert_eq!(millis.get(), Some(7_200_000));
        hours.set(3);
        assert_eq!(millis.get(), Some(10_800_000));
    }

    #[test]
    fn zip_waits_for_both_sides() {
        let left = Observable::new(true);
        let right = Observable::<u32>::empty();
        let pair = left.zip(&right);
        assert_eq!(pair.get(), None);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        pair.subscribe(move |value| lock(&sink).push(*value));

        left.set(false);
        assert!(lock(&seen).is_empty());

        right.set(5);
        left.set(true);
        assert_eq!(*lock(&seen), vec![(false, 5), (true, 5)]);
    }

    #[test]
    fn nested_zip_fires_once_per_change() {
        let a = Observable::new(1);
        let b = Observable::new(2);
        let c = Observable::new(3);
        let grouped = a.zip(&b).zip(&c);

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        grouped.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        b.set(20);
        c.set(30);
        c.set(30);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(grouped.get(), Some(((1, 20), 30)));
    }

    #[test]
    fn listeners_may_reenter() {
        let observable = Observable::new(0);
        let handle = observable.clone();
        observable.subscribe(move |value| {
            if *value < 3 {
                handle.set(value + 1);
            }
        });
        observable.set(1);
        assert_eq!(observable.get(), Some(3));
    }

    #[test]
    fn zipped_sources_are_freed() {
        let a = Observable::new(1);
        let b = Observable::new(2);
        let pair = a.zip(&b);
        let (weak_a, weak_b) = (Arc::downgrade(&a.inner), Arc::downgrade(&b.inner));
        let weak_pair = Arc::downgrade(&pair.inner);

        drop(pair);
        drop(a);
        drop(b);
        assert!(weak_a.upgrade().is_none());
        assert!(weak_b.upgrade().is_none());
        assert!(weak_pair.upgrade().is_none());
    }

    #[test]
    fn zip_outlives_neither_side() {
        let a = Observable::new(1);
        let pair = {
            let b = Observable::new(2);
            a.zip(&b)
        };
        a.set(3);
        assert_eq!(pair.get(), Some((1, 2)));
    }
}
