//! Observable values with read tracking.
//!
//! Everything here is single-threaded: writes happen inside one cooperative
//! turn and readers run in a later turn, so plain `Rc`/`RefCell` is enough.
//! A reader opens a [`TrackingScope`], reads through [`Observable::track`],
//! and later asks the scope whether any value it actually read has changed.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

/// Dirty flag shared by a tracking scope and every observable it read.
#[derive(Debug, Default)]
pub struct Invalidation {
    dirty: Cell<bool>,
}

impl Invalidation {
    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    pub fn mark_dirty(&self) {
        self.dirty.set(true);
    }

    fn clear(&self) {
        self.dirty.set(false);
    }
}

struct ObservableInner<T> {
    value: RefCell<T>,
    subscribers: RefCell<Vec<Weak<Invalidation>>>,
}

/// Shared handle to one observable field. Clones point at the same value.
pub struct Observable<T> {
    inner: Rc<ObservableInner<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Observable")
            .field(&*self.inner.value.borrow())
            .finish()
    }
}

impl<T: Default + Clone + PartialEq + 'static> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Clone + PartialEq + 'static> Observable<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(ObservableInner {
                value: RefCell::new(value),
                subscribers: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Untracked read.
    pub fn get(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Untracked borrow, for values that are expensive to clone.
    pub fn with<R>(&self, read: impl FnOnce(&T) -> R) -> R {
        read(&self.inner.value.borrow())
    }

    /// Tracked read: the scope is invalidated when this value changes.
    pub fn track(&self, scope: &mut TrackingScope) -> T {
        let value = self.get();
        scope.record(self, value.clone());
        value
    }

    /// Writes `value`. Equal writes are dropped without notifying anyone.
    pub fn set(&self, value: T) -> bool {
        {
            let mut current = self.inner.value.borrow_mut();
            if *current == value {
                return false;
            }
            *current = value;
        }
        self.notify();
        true
    }

    pub fn update(&self, edit: impl FnOnce(&mut T)) -> bool {
        let mut next = self.get();
        edit(&mut next);
        self.set(next)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .borrow()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    fn subscribe(&self, invalidation: &Rc<Invalidation>) {
        let mut subscribers = self.inner.subscribers.borrow_mut();
        subscribers.retain(|weak| weak.strong_count() > 0);
        let target = Rc::downgrade(invalidation);
        if !subscribers.iter().any(|weak| Weak::ptr_eq(weak, &target)) {
            subscribers.push(target);
        }
    }

    fn notify(&self) {
        let mut subscribers = self.inner.subscribers.borrow_mut();
        subscribers.retain(|weak| match weak.upgrade() {
            Some(invalidation) => {
                invalidation.mark_dirty();
                true
            }
            None => false,
        });
    }
}

type StillCurrent = Box<dyn Fn() -> bool>;

/// Records which observables a reader touched and the values it saw.
pub struct TrackingScope {
    invalidation: Rc<Invalidation>,
    reads: Vec<StillCurrent>,
}

impl Default for TrackingScope {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TrackingScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackingScope")
            .field("dirty", &self.invalidation.is_dirty())
            .field("reads", &self.reads.len())
            .finish()
    }
}

impl TrackingScope {
    pub fn new() -> Self {
        Self {
            invalidation: Rc::new(Invalidation::default()),
            reads: Vec::new(),
        }
    }

    /// Drops the previous read set before a fresh render.
    pub fn begin(&mut self) {
        self.reads.clear();
        self.invalidation.clear();
    }

    pub fn read_count(&self) -> usize {
        self.reads.len()
    }

    /// True iff some value read since the last `begin` now differs from what
    /// was read. A write that was later reverted does not count.
    pub fn needs_render(&self) -> bool {
        if !self.invalidation.is_dirty() {
            return false;
        }
        if self.reads.iter().any(|still_current| !still_current()) {
            return true;
        }
        self.invalidation.clear();
        false
    }

    fn record<T: Clone + PartialEq + 'static>(&mut self, observable: &Observable<T>, seen: T) {
        observable.subscribe(&self.invalidation);
        let source = Rc::downgrade(&observable.inner);
        self.reads.push(Box::new(move || match source.upgrade() {
            Some(inner) => *inner.value.borrow() == seen,
            None => true,
        }));
    }
}

type Listener<E> = Rc<dyn Fn(&E)>;

struct HubInner<E> {
    next_id: Cell<u64>,
    listeners: RefCell<Vec<(u64, Listener<E>)>>,
}

/// Push-style event fan-out for things that must react in the same turn,
/// such as a forced scene change on disconnect.
pub struct EventHub<E> {
    inner: Rc<HubInner<E>>,
}

impl<E> Clone for EventHub<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<E> fmt::Debug for EventHub<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHub")
            .field("listeners", &self.inner.listeners.borrow().len())
            .finish()
    }
}

impl<E> Default for EventHub<E> {
    fn default() -> Self {
        Self {
            inner: Rc::new(HubInner {
                next_id: Cell::new(0),
                listeners: RefCell::new(Vec::new()),
            }),
        }
    }
}

impl<E: 'static> EventHub<E> {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe(&self, listener: impl Fn(&E) + 'static) -> Subscription {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        self.inner
            .listeners
            .borrow_mut()
            .push((id, Rc::new(listener)));

        let hub = Rc::downgrade(&self.inner);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(hub) = hub.upgrade() {
                    hub.listeners
                        .borrow_mut()
                        .retain(|(listener_id, _)| *listener_id != id);
                }
            })),
        }
    }

    /// Listeners may subscribe or unsubscribe while being called.
    pub fn emit(&self, event: &E) {
        let listeners = self
            .inner
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect::<Vec<_>>();
        for listener in listeners {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }
}

/// Keeps an [`EventHub`] listener registered until dropped.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_write_does_not_invalidate() {
        let score = Observable::new(10u32);
        let mut scope = TrackingScope::new();
        assert_eq!(score.track(&mut scope), 10);

        assert!(!score.set(10));
        assert!(!scope.needs_render());
    }

    #[test]
    fn changed_read_invalidates_scope() {
        let score = Observable::new(10u32);
        let mut scope = TrackingScope::new();
        score.track(&mut scope);

        assert!(score.set(11));
        assert!(scope.needs_render());
    }

    #[test]
    fn unread_observable_never_invalidates() {
        let score = Observable::new(0u32);
        let level = Observable::new(1u32);
        let mut scope = TrackingScope::new();
        level.track(&mut scope);

        score.set(500);
        assert!(!scope.needs_render());
        assert_eq!(score.subscriber_count(), 0);
    }

    #[test]
    fn reverted_write_is_not_a_change() {
        let health = Observable::new(100u32);
        let mut scope = TrackingScope::new();
        health.track(&mut scope);

        health.set(40);
        health.set(100);
        assert!(!scope.needs_render());
    }

    #[test]
    fn begin_forgets_previous_reads() {
        let score = Observable::new(0u32);
        let level = Observable::new(1u32);
        let mut scope = TrackingScope::new();
        score.track(&mut scope);

        scope.begin();
        level.track(&mut scope);
        score.set(99);

        assert!(!scope.needs_render());
        assert_eq!(scope.read_count(), 1);
    }

    #[test]
    fn dropped_scope_is_pruned_on_next_write() {
        let score = Observable::new(0u32);
        {
            let mut scope = TrackingScope::new();
            score.track(&mut scope);
            assert_eq!(score.subscriber_count(), 1);
        }
        score.set(1);
        assert_eq!(score.subscriber_count(), 0);
    }

    #[test]
    fn repeated_reads_register_one_subscriber() {
        let score = Observable::new(0u32);
        let mut scope = TrackingScope::new();
        for _ in 0..5 {
            score.track(&mut scope);
        }
        assert_eq!(score.subscriber_count(), 1);
    }

    #[test]
    fn update_applies_edit_and_reports_change() {
        let times = Observable::new(Vec::<u32>::new());
        assert!(times.update(|list| list.push(1)));
        assert!(!times.update(|_| {}));
        assert_eq!(times.get(), vec![1]);
    }

    #[test]
    fn event_hub_stops_delivering_after_subscription_drop() {
        let hub = EventHub::<u32>::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let subscription = hub.subscribe(move |value| sink.borrow_mut().push(*value));

        hub.emit(&1);
        drop(subscription);
        hub.emit(&2);

        assert_eq!(*seen.borrow(), vec![1]);
        assert_eq!(hub.listener_count(), 0);
    }

    #[test]
    fn event_hub_tolerates_unsubscribe_during_emit() {
        let hub = EventHub::<()>::new();
        let held: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&held);
        let subscription = hub.subscribe(move |_| {
            slot.borrow_mut().take();
        });
        *held.borrow_mut() = Some(subscription);

        hub.emit(&());
        assert_eq!(hub.listener_count(), 0);
    }
}
