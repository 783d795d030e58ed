//! Blocking cache with single-flight loads and epoch-guarded invalidation.
//!
//! Membership closures and security policies are read on every request and
//! loaded from the backing store on miss. Concurrent misses for the same key
//! must collapse into exactly one underlying fetch, with every waiter
//! observing the same result. Invalidation must win races against in-flight
//! loads: a load that started before an invalidation never installs its
//! (possibly stale) value.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use tracing::debug;

/// Result of a load as observed by waiters parked on the same key.
enum FlightState<V> {
    Pending,
    Done(Arc<V>),
    Failed,
}

/// One in-flight load; waiters block on the condvar until it resolves.
struct Flight<V> {
    state: Mutex<FlightState<V>>,
    cv: Condvar,
}

impl<V> Flight<V> {
    fn new() -> Self {
        Self {
            state: Mutex::new(FlightState::Pending),
            cv: Condvar::new(),
        }
    }

    fn resolve(&self, outcome: FlightState<V>) {
        let mut state = lock(&self.state);
        *state = outcome;
        self.cv.notify_all();
    }

    /// Block until the flight resolves; `None` means the load failed and the
    /// waiter should retry as a loader itself.
    fn wait(&self) -> Option<Arc<V>> {
        let mut state = lock(&self.state);
        loop {
            match &*state {
                FlightState::Pending => {
                    state = self
                        .cv
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                FlightState::Done(v) => return Some(v.clone()),
                FlightState::Failed => return None,
            }
        }
    }
}

enum Slot<V> {
    Ready(Arc<V>),
    InFlight(Arc<Flight<V>>),
}

struct State<K, V> {
    entries: HashMap<K, Slot<V>>,
    /// Bumped on every invalidation. A loader records the epoch when it
    /// starts and only installs its value if no invalidation happened
    /// in between.
    epoch: u64,
}

/// Thread-safe cache with de-duplicated ("single-flight") loads.
///
/// All operations are safe under concurrent invocation from independent
/// threads with no caller-side locking. Load failures are not cached;
/// waiters parked on a failed load retry with their own loader.
pub struct LoadingCache<K, V> {
    inner: Mutex<State<K, V>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<K, V> LoadingCache<K, V>
where
    K: Clone + Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(State {
                entries: HashMap::new(),
                epoch: 0,
            }),
        }
    }

    /// Fetch the cached value for `key`, loading it with `load` on miss.
    ///
    /// If another thread is already loading the same key, this call blocks
    /// until that load resolves and returns its result instead of fetching
    /// again.
    pub fn get_or_load<E>(
        &self,
        key: K,
        load: impl FnOnce() -> Result<V, E>,
    ) -> Result<Arc<V>, E> {
        let mut load = Some(load);

        loop {
            let flight;
            let started_epoch;
            {
                let mut state = lock(&self.inner);
                match state.entries.get(&key) {
                    Some(Slot::Ready(v)) => return Ok(v.clone()),
                    Some(Slot::InFlight(f)) => {
                        let f = f.clone();
                        drop(state);
                        if let Some(v) = f.wait() {
                            return Ok(v);
                        }
                        // The loader failed; loop around and try loading
                        // ourselves (unless a later reader already did).
                        continue;
                    }
                    None => {
                        flight = Arc::new(Flight::new());
                        started_epoch = state.epoch;
                        state
                            .entries
                            .insert(key.clone(), Slot::InFlight(flight.clone()));
                    }
                }
            }

            // We are the loader for this key. The map lock is released while
            // the (possibly blocking) fetch runs.
            let loader = load.take().expect("loader consumed twice");
            match loader() {
                Ok(value) => {
                    let value = Arc::new(value);
                    let mut state = lock(&self.inner);
                    if state.epoch == started_epoch {
                        state.entries.insert(key.clone(), Slot::Ready(value.clone()));
                    } else {
                        // Invalidated while loading; drop the stale value so
                        // the next reader fetches fresh.
                        debug!("discarding cache load that raced an invalidation");
                        if let Some(Slot::InFlight(f)) = state.entries.get(&key) {
                            if Arc::ptr_eq(f, &flight) {
                                state.entries.remove(&key);
                            }
                        }
                    }
                    drop(state);
                    flight.resolve(FlightState::Done(value.clone()));
                    return Ok(value);
                }
                Err(e) => {
                    let mut state = lock(&self.inner);
                    if let Some(Slot::InFlight(f)) = state.entries.get(&key) {
                        if Arc::ptr_eq(f, &flight) {
                            state.entries.remove(&key);
                        }
                    }
                    drop(state);
                    flight.resolve(FlightState::Failed);
                    return Err(e);
                }
            }
        }
    }

    /// Peek without loading.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let state = lock(&self.inner);
        match state.entries.get(key) {
            Some(Slot::Ready(v)) => Some(v.clone()),
            _ => None,
        }
    }

    /// Drop the entry for `key` and fence off any load currently in flight.
    pub fn invalidate(&self, key: &K) {
        let mut state = lock(&self.inner);
        state.epoch += 1;
        state.entries.remove(key);
    }

    /// Drop every entry and fence off all in-flight loads.
    pub fn clear(&self) {
        let mut state = lock(&self.inner);
        state.epoch += 1;
        state.entries.clear();
    }

    /// Number of resident (fully loaded) entries.
    pub fn len(&self) -> usize {
        let state = lock(&self.inner);
        state
            .entries
            .values()
            .filter(|s| matches!(s, Slot::Ready(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> Default for LoadingCache<K, V>
where
    K: Clone + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}
