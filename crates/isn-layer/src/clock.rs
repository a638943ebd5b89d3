//! Externally driven tick clock.
//!
//! Timeouts in the stack are expressed in ticks of a shared [`Clock`]. The
//! application advances it (manual clock) or refreshes it from a monotonic
//! source; layers with timers register themselves and are evaluated on every
//! change. Tick arithmetic wraps, so durations are always computed with
//! [`Clock::elapsed`].

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

use tracing::trace;

/// Clock tick.
pub type Tick = u32;

/// A layer with timeout state evaluated on clock changes.
pub trait Timer {
    fn on_tick(&self, now: Tick);
}

struct Monotonic {
    origin: Instant,
    resolution: Duration,
}

struct Inner {
    now: Cell<Tick>,
    source: Option<Monotonic>,
    timers: RefCell<Vec<Weak<dyn Timer>>>,
}

/// Shared tick counter. Clones refer to the same clock.
#[derive(Clone)]
pub struct Clock {
    inner: Rc<Inner>,
}

impl Default for Clock {
    fn default() -> Self {
        Self::manual()
    }
}

impl std::fmt::Debug for Clock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clock")
            .field("now", &self.inner.now.get())
            .field("monotonic", &self.inner.source.is_some())
            .finish()
    }
}

impl Clock {
    /// A clock that only moves through [`advance`](Self::advance).
    pub fn manual() -> Self {
        Self::with_source(None)
    }

    /// A clock that follows [`Instant`] at the given tick resolution when
    /// [`refresh`](Self::refresh) is called.
    pub fn monotonic(resolution: Duration) -> Self {
        let resolution = if resolution.is_zero() {
            Duration::from_millis(1)
        } else {
            resolution
        };
        Self::with_source(Some(Monotonic {
            origin: Instant::now(),
            resolution,
        }))
    }

    fn with_source(source: Option<Monotonic>) -> Self {
        Self {
            inner: Rc::new(Inner {
                now: Cell::new(0),
                source,
                timers: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn now(&self) -> Tick {
        self.inner.now.get()
    }

    /// Ticks since `since`, modulo wrap-around.
    pub fn elapsed(&self, since: Tick) -> Tick {
        self.now().wrapping_sub(since)
    }

    /// Move the clock forward and evaluate registered timers.
    pub fn advance(&self, ticks: Tick) -> Tick {
        let now = self.now().wrapping_add(ticks);
        self.inner.now.set(now);
        self.notify(now);
        now
    }

    /// Re-read the monotonic source. On a manual clock this only
    /// re-evaluates timers.
    pub fn refresh(&self) -> Tick {
        if let Some(source) = &self.inner.source {
            let elapsed = source.origin.elapsed().as_nanos() / source.resolution.as_nanos();
            // Truncation is the wrap-around of the tick counter.
            self.inner.now.set(elapsed as Tick);
        }
        let now = self.now();
        self.notify(now);
        now
    }

    /// Register a timer. Dropped timers are pruned on the next change.
    pub fn register(&self, timer: Weak<dyn Timer>) {
        self.inner.timers.borrow_mut().push(timer);
    }

    fn notify(&self, now: Tick) {
        let live: Vec<Rc<dyn Timer>> = {
            let mut timers = self.inner.timers.borrow_mut();
            let before = timers.len();
            timers.retain(|t| t.strong_count() > 0);
            if timers.len() < before {
                trace!(
                    pruned = before - timers.len(),
                    live = timers.len(),
                    "dropped timers pruned"
                );
            }
            timers.iter().filter_map(Weak::upgrade).collect()
        };
        // Timers may register further timers or read the clock.
        for timer in live {
            timer.on_tick(now);
        }
    }
}
