//! Event publication for viewer state
//!
//! [`Emitter`] is a single-threaded observer list that remembers the last
//! published value and replays it to new listeners, so every subscriber sees
//! the latest snapshot (last value wins). A subscription may be wrapped in an
//! [`EventControl`] that throttles or debounces delivery.
//!
//! Time is passed in explicitly. Trailing deliveries that come due between
//! events are flushed by calling [`Emitter::poll`] from the host's event
//! loop.

use std::time::{Duration, Instant};

/// How a throttled subscription treats the first event of a burst
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleMode {
    /// Deliver immediately, then deliver the latest value once the window closes
    LeadingTrailing,
    /// Only deliver the latest value once the window closes
    Trailing,
}

/// Rate limiting applied to a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventControlOptions {
    /// Deliver once no event has arrived for `wait`
    Debounce { wait: Duration },
    /// Deliver at most once per `wait`
    Throttle { wait: Duration, mode: ThrottleMode },
}

impl EventControlOptions {
    /// Leading-trailing throttle with the given window
    pub fn throttle(wait: Duration) -> Self {
        Self::Throttle { wait, mode: ThrottleMode::LeadingTrailing }
    }

    /// Trailing-only throttle with the given window
    pub fn trailing(wait: Duration) -> Self {
        Self::Throttle { wait, mode: ThrottleMode::Trailing }
    }

    /// Debounce with the given quiet period
    pub fn debounce(wait: Duration) -> Self {
        Self::Debounce { wait }
    }

    fn wait(&self) -> Duration {
        match self {
            Self::Debounce { wait } | Self::Throttle { wait, .. } => *wait,
        }
    }
}

/// Throttle/debounce state for one subscription
#[derive(Debug, Clone)]
pub struct EventControl<T> {
    options: EventControlOptions,
    last_run: Option<Instant>,
    pending: Option<(T, Instant)>,
}

impl<T> EventControl<T> {
    /// Creates a control with nothing held
    pub fn new(options: EventControlOptions) -> Self {
        Self { options, last_run: None, pending: None }
    }

    /// Offer a value at `now`
    ///
    /// Returns the value if it should be delivered immediately. Otherwise it
    /// is held (replacing any older held value) until [`poll`](Self::poll)
    /// finds it due. A zero wait delivers every value immediately, whatever
    /// the mode.
    pub fn handle(&mut self, value: T, now: Instant) -> Option<T> {
        let wait = self.options.wait();
        if wait.is_zero() {
            self.last_run = Some(now);
            self.pending = None;
            return Some(value);
        }
        match self.options {
            EventControlOptions::Debounce { .. } => {
                self.pending = Some((value, now + wait));
                None
            }
            EventControlOptions::Throttle { mode, .. } => {
                let window_open = self.last_run.map_or(true, |last| now.duration_since(last) >= wait);

                if window_open {
                    self.last_run = Some(now);
                    if mode == ThrottleMode::LeadingTrailing {
                        self.pending = None;
                        return Some(value);
                    }
                }

                // window_open implies last_run was just set
                let due = self.last_run.map_or(now, |last| last + wait);
                self.pending = Some((value, due));
                None
            }
        }
    }

    /// Release the held value if its delivery time has come
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some((_, due)) if now >= *due => {
                self.last_run = Some(now);
                self.pending.take().map(|(value, _)| value)
            }
            _ => None,
        }
    }

    /// When the held value becomes due, if any
    pub fn next_due(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, due)| *due)
    }

    /// Drop any held value
    pub fn cancel(&mut self) {
        self.pending = None;
    }
}

/// Handle returned by [`Emitter::on`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Handler<T> = Box<dyn FnMut(&T)>;

struct Listener<T> {
    id: ListenerId,
    handler: Handler<T>,
    control: Option<EventControl<T>>,
}

/// Observer list that replays its last value to new listeners
pub struct Emitter<T> {
    listeners: Vec<Listener<T>>,
    next_id: u64,
    last: Option<T>,
}

impl<T: Clone> Emitter<T> {
    /// Creates an emitter with no listeners and no value
    pub fn new() -> Self {
        Self { listeners: Vec::new(), next_id: 0, last: None }
    }

    /// Subscribe with immediate delivery
    ///
    /// If a value has already been published, the handler receives it right
    /// away.
    pub fn on(&mut self, handler: impl FnMut(&T) + 'static) -> ListenerId {
        self.subscribe(Box::new(handler), None)
    }

    /// Subscribe through a throttle or debounce control
    pub fn on_controlled(
        &mut self,
        handler: impl FnMut(&T) + 'static,
        options: EventControlOptions,
    ) -> ListenerId {
        self.subscribe(Box::new(handler), Some(EventControl::new(options)))
    }

    fn subscribe(&mut self, mut handler: Handler<T>, control: Option<EventControl<T>>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;

        if let Some(value) = &self.last {
            handler(value);
        }

        self.listeners.push(Listener { id, handler, control });
        id
    }

    /// Remove a listener. Returns `true` if it was subscribed.
    pub fn off(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|listener| listener.id != id);
        self.listeners.len() != before
    }

    /// Remove every listener
    pub fn clear(&mut self) {
        self.listeners.clear();
    }

    /// Publish a value now
    pub fn emit(&mut self, value: T) {
        self.emit_at(value, Instant::now());
    }

    /// Publish a value observed at `now`
    pub fn emit_at(&mut self, value: T, now: Instant) {
        for listener in &mut self.listeners {
            match &mut listener.control {
                None => (listener.handler)(&value),
                Some(control) => {
                    if let Some(ready) = control.handle(value.clone(), now) {
                        (listener.handler)(&ready);
                    }
                }
            }
        }
        self.last = Some(value);
    }

    /// Deliver throttled or debounced values that have come due
    pub fn poll(&mut self, now: Instant) {
        for listener in &mut self.listeners {
            if let Some(control) = &mut listener.control {
                if let Some(value) = control.poll(now) {
                    (listener.handler)(&value);
                }
            }
        }
    }

    /// Earliest time at which [`poll`](Self::poll) has something to deliver
    pub fn next_due(&self) -> Option<Instant> {
        self.listeners.iter().filter_map(|listener| listener.control.as_ref()?.next_due()).min()
    }

    /// Last published value
    pub fn value(&self) -> Option<&T> {
        self.last.as_ref()
    }

    /// Number of subscribed listeners
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// True when nobody is listening
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl<T: Clone> Default for Emitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Emitter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter").field("listeners", &self.listeners.len()).finish()
    }
}
