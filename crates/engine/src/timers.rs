use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

type TimerCallback = Rc<RefCell<dyn FnMut(Instant)>>;

struct TimerEntry {
    id: u64,
    period: Duration,
    next_due: Instant,
    callback: TimerCallback,
}

#[derive(Default)]
struct TimerQueueInner {
    next_id: u64,
    timers: Vec<TimerEntry>,
}

impl TimerQueueInner {
    fn contains(&self, id: u64) -> bool {
        self.timers.iter().any(|entry| entry.id == id)
    }
}

/// Cooperative interval timers, fired from the main loop between frames.
#[derive(Clone, Default)]
pub struct TimerQueue {
    inner: Rc<RefCell<TimerQueueInner>>,
}

impl fmt::Debug for TimerQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerQueue")
            .field("active", &self.active_count())
            .finish()
    }
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` to fire every `period`, first at `now + period`.
    /// The timer lives exactly as long as the returned handle.
    #[must_use = "dropping the handle cancels the timer"]
    pub fn set_interval(
        &self,
        now: Instant,
        period: Duration,
        callback: impl FnMut(Instant) + 'static,
    ) -> TimerHandle {
        let period = period.max(Duration::from_millis(1));
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.timers.push(TimerEntry {
            id,
            period,
            next_due: now + period,
            callback: Rc::new(RefCell::new(callback)),
        });
        TimerHandle {
            id,
            queue: Rc::downgrade(&self.inner),
        }
    }

    /// Fires every timer that is due at `now`, at most once each. A timer
    /// that fell far behind is rescheduled from `now` instead of bursting.
    pub fn run_due(&self, now: Instant) -> usize {
        let due = {
            let mut inner = self.inner.borrow_mut();
            let mut due = Vec::new();
            for entry in inner.timers.iter_mut().filter(|entry| entry.next_due <= now) {
                entry.next_due += entry.period;
                if entry.next_due <= now {
                    entry.next_due = now + entry.period;
                }
                due.push((entry.id, Rc::clone(&entry.callback)));
            }
            due
        };

        let mut fired = 0;
        for (id, callback) in due {
            // An earlier callback in this pass may have cancelled this one.
            if !self.inner.borrow().contains(id) {
                continue;
            }
            (callback.borrow_mut())(now);
            fired += 1;
        }
        fired
    }

    pub fn active_count(&self) -> usize {
        self.inner.borrow().timers.len()
    }
}

/// Cancels its timer when dropped.
pub struct TimerHandle {
    id: u64,
    queue: Weak<RefCell<TimerQueueInner>>,
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle").field("id", &self.id).finish()
    }
}

impl TimerHandle {
    pub fn cancel(self) {}
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        if let Some(queue) = self.queue.upgrade() {
            queue.borrow_mut().timers.retain(|entry| entry.id != self.id);
        }
    }
}
