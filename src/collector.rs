//! Deduplicating collector for results arriving from concurrent sub-requests
//!
//! Producers `add` from any thread until the orchestrator calls `complete`.
//! Items sharing an identity hash fold into the first one received: later
//! duplicates are kept on that entry's `additional` list and never touch
//! its fields. After completion the entries can be drained exactly once,
//! in first-arrival order.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::stream::{self, Stream};
use tokio::sync::watch;

use crate::error::{Result, RetrieveError};
use crate::models::{natural_hash, Record};

/// A canonical item plus the duplicates merged into it
#[derive(Debug, Clone, PartialEq)]
pub struct Entry<T> {
    pub record: T,
    pub identity: u64,
    pub additional: Vec<T>,
}

impl<T> Entry<T> {
    /// Number of times this identity was received
    pub fn occurrences(&self) -> usize {
        self.additional.len() + 1
    }
}

type IdentityFn<T> = Arc<dyn Fn(&T) -> u64 + Send + Sync>;

struct State<T> {
    entries: Vec<Entry<T>>,
    positions: HashMap<u64, usize>,
    completed: bool,
    drained: bool,
}

pub struct Collector<T> {
    identity: IdentityFn<T>,
    state: Mutex<State<T>>,
    done: watch::Sender<bool>,
}

impl<T: Hash + 'static> Collector<T> {
    /// Deduplicate on the item's natural hash
    pub fn new() -> Self {
        Self::with_identity(natural_hash::<T>)
    }
}

impl<T: Hash + 'static> Default for Collector<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Record> Collector<T> {
    /// Deduplicate on the record's identity field, falling back to its natural hash
    pub fn for_records() -> Self {
        Self::with_identity(|record: &T| {
            record
                .identity_hash()
                .unwrap_or_else(|| natural_hash(record))
        })
    }
}

impl<T> Collector<T> {
    pub fn with_identity<F>(identity: F) -> Self
    where
        F: Fn(&T) -> u64 + Send + Sync + 'static,
    {
        let (done, _) = watch::channel(false);
        Self {
            identity: Arc::new(identity),
            state: Mutex::new(State {
                entries: Vec::new(),
                positions: HashMap::new(),
                completed: false,
                drained: false,
            }),
            done,
        }
    }

    /// Add an item; fails with `InvalidState` once the collector is complete
    pub fn add(&self, item: T) -> Result<()> {
        let identity = (self.identity)(&item);
        let mut state = self.lock()?;
        if state.completed {
            return Err(RetrieveError::invalid_state("collector already completed"));
        }

        match state.positions.get(&identity) {
            Some(&index) => state.entries[index].additional.push(item),
            None => {
                let index = state.entries.len();
                state.positions.insert(identity, index);
                state.entries.push(Entry {
                    record: item,
                    identity,
                    additional: Vec::new(),
                });
            }
        }
        Ok(())
    }

    /// Signal that every producer finished; may only be called once
    pub fn complete(&self) -> Result<()> {
        let mut state = self.lock()?;
        if state.completed {
            return Err(RetrieveError::invalid_state("collector completed twice"));
        }
        state.completed = true;
        drop(state);
        self.done.send_replace(true);
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        *self.done.borrow()
    }

    /// Number of distinct identities collected so far
    pub fn len(&self) -> usize {
        self.lock().map(|s| s.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take every entry; only valid once, after `complete`
    pub fn drain(&self) -> Result<Vec<Entry<T>>> {
        let mut state = self.lock()?;
        if !state.completed {
            return Err(RetrieveError::invalid_state("collector drained before completion"));
        }
        if state.drained {
            return Err(RetrieveError::invalid_state("collector already drained"));
        }
        state.drained = true;
        state.positions.clear();
        Ok(std::mem::take(&mut state.entries))
    }

    /// Wait for `complete`, then drain
    pub async fn drain_when_complete(&self) -> Result<Vec<Entry<T>>> {
        let mut done = self.done.subscribe();
        done.wait_for(|complete| *complete)
            .await
            .map_err(|_| RetrieveError::invalid_state("collector dropped before completion"))?;
        self.drain()
    }

    /// Drain as a stream of entries
    pub fn into_stream(self) -> Result<impl Stream<Item = Entry<T>>> {
        let entries = self.drain()?;
        Ok(stream::iter(entries))
    }

    fn lock(&self) -> Result<MutexGuard<'_, State<T>>> {
        self.state
            .lock()
            .map_err(|e| RetrieveError::invalid_state(format!("collector lock poisoned: {}", e)))
    }
}
