//! Retrieval orchestrator
//!
//! Resolves a [`ConstraintSet`] into a deduplicated list of records, either
//! from the local cache or live from the archive. A live load expands the
//! constraints into clause sets, queues one C-FIND per clause on a single
//! association and feeds every match into a [`Collector`], persisting it to
//! the cache on the way. The call succeeds only when every clause succeeded.
//!
//! Identical live calls that overlap on the same [`Retriever`] share one
//! load. Separate retrievers never share, even when they point at the same
//! archive. No timeout is applied here: a hung sub-request stalls the whole
//! call. A live load runs on its own task, so dropping every caller does not
//! abandon it; it still finishes, caches its matches and settles the state.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, info, warn};

use dimse::{Association, DimseError, DimseRequest, DimseScu};

use crate::collector::{Collector, Entry};
use crate::config::Config;
use crate::error::{Result, RetrieveError};
use crate::models::Record;
use crate::query::{compile, expand, ClauseSet, ConstraintSet};
use crate::storage::{IndexRegistry, RecordCache, RedbCache};

pub mod connector;
pub mod download;

pub use connector::{Connector, ScuConnector};
pub use download::{
    DownloadEndpoint, Downloader, EndpointFactory, EndpointLease, SharedEndpoint, StoreScpFactory,
};

/// Where a retrieval is satisfied from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Cache,
    Live,
}

/// Observable load state of a retriever
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// Nothing has been loaded yet
    Idle,
    Loading,
    /// The last load finished, successfully or not
    Complete,
}

type LoadResult<R> = std::result::Result<Vec<Entry<R>>, Arc<RetrieveError>>;
type SharedLoad<R> = Shared<BoxFuture<'static, LoadResult<R>>>;

struct Inner<C> {
    connector: C,
    cache: RecordCache,
    max_results: u32,
    in_flight: Mutex<HashMap<String, Box<dyn Any + Send + Sync>>>,
    active: AtomicUsize,
    loaded: AtomicBool,
}

pub struct Retriever<C: Connector> {
    inner: Arc<Inner<C>>,
}

impl<C: Connector> Clone for Retriever<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Retriever<ScuConnector> {
    /// Build a retriever talking to the configured remote node
    pub fn from_config(config: &Config) -> Result<Self> {
        let dimse_config = config.dimse_config();
        dimse_config.validate()?;
        let connector = ScuConnector::new(DimseScu::new(dimse_config), config.remote_node());

        let store = RedbCache::open(&config.cache.path)?;
        let cache = RecordCache::new(Arc::new(store), Arc::new(IndexRegistry::new()?));

        Ok(Self::new(connector, cache, config.retrieve.max_results))
    }
}

impl<C: Connector> Retriever<C> {
    /// `max_results` caps the matches kept per clause; zero means unlimited
    pub fn new(connector: C, cache: RecordCache, max_results: u32) -> Self {
        Self {
            inner: Arc::new(Inner {
                connector,
                cache,
                max_results,
                in_flight: Mutex::new(HashMap::new()),
                active: AtomicUsize::new(0),
                loaded: AtomicBool::new(false),
            }),
        }
    }

    pub fn cache(&self) -> &RecordCache {
        &self.inner.cache
    }

    pub fn connector(&self) -> &C {
        &self.inner.connector
    }

    pub fn state(&self) -> LoadState {
        if self.inner.active.load(Ordering::SeqCst) > 0 {
            LoadState::Loading
        } else if self.inner.loaded.load(Ordering::SeqCst) {
            LoadState::Complete
        } else {
            LoadState::Idle
        }
    }

    /// Resolve `constraints` into deduplicated records
    pub async fn find<R: Record>(
        &self,
        constraints: &ConstraintSet<R>,
        source: Source,
    ) -> Result<Vec<Entry<R>>> {
        match source {
            Source::Cache => self.find_cached(constraints),
            Source::Live => self.find_live(constraints).await,
        }
    }

    /// Blocking form of [`find`](Self::find)
    ///
    /// Runs on a private current-thread runtime, so it must not be called
    /// from inside an async context.
    pub fn find_blocking<R: Record>(
        &self,
        constraints: &ConstraintSet<R>,
        source: Source,
    ) -> Result<Vec<Entry<R>>> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(RetrieveError::invalid_state(
                "find_blocking called from inside an async runtime",
            ));
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(runtime_unavailable)?;
        runtime.block_on(self.find(constraints, source))
    }

    /// Verify the remote node answers
    pub async fn echo(&self) -> Result<()> {
        let mut association = self.inner.connector.connect();
        association.add_request(DimseRequest::Echo);
        association.send().await?;
        Ok(())
    }

    fn find_cached<R: Record>(&self, constraints: &ConstraintSet<R>) -> Result<Vec<Entry<R>>> {
        let predicate = compile(constraints)?;
        let _guard = LoadGuard::start(&self.inner);

        let collector = Collector::for_records();
        let mut matched = 0usize;
        for record in self.inner.cache.load_all::<R>()? {
            if predicate(&record) {
                collector.add(record)?;
                matched += 1;
            }
        }
        collector.complete()?;

        debug!("Cache lookup for {} matched {} record(s)", R::KIND, matched);
        collector.drain()
    }

    async fn find_live<R: Record>(&self, constraints: &ConstraintSet<R>) -> Result<Vec<Entry<R>>> {
        // validation errors surface here, before any association is opened
        let clauses = expand(constraints)?;
        let key = format!("{}/{}", R::KIND, constraints.fingerprint());

        let load = {
            let mut in_flight = self.lock_in_flight()?;
            match in_flight
                .get(&key)
                .and_then(|load| load.downcast_ref::<SharedLoad<R>>())
            {
                Some(load) => {
                    info!("Joining in-flight {} load", R::KIND);
                    load.clone()
                }
                None => {
                    let load = self.start_load::<R>(key.clone(), clauses);
                    in_flight.insert(key, Box::new(load.clone()));
                    load
                }
            }
        };

        load.await.map_err(RetrieveError::from_shared)
    }

    /// Spawn the load so it runs to completion even if every caller goes away
    fn start_load<R: Record>(&self, key: String, clauses: Vec<ClauseSet>) -> SharedLoad<R> {
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let result = {
                let _guard = LoadGuard::start(&inner);
                load_live::<R, C>(&inner, clauses).await
            };
            if let Ok(mut in_flight) = inner.in_flight.lock() {
                in_flight.remove(&key);
            }
            result.map_err(Arc::new)
        });

        async move {
            task.await.unwrap_or_else(|e| {
                Err(Arc::new(RetrieveError::invalid_state(format!(
                    "live load task failed: {}",
                    e
                ))))
            })
        }
        .boxed()
        .shared()
    }

    fn lock_in_flight(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, Box<dyn Any + Send + Sync>>>> {
        self.inner
            .in_flight
            .lock()
            .map_err(|e| RetrieveError::invalid_state(format!("in-flight map poisoned: {}", e)))
    }
}

fn runtime_unavailable(e: std::io::Error) -> RetrieveError {
    RetrieveError::invalid_state(format!("failed to build blocking runtime: {}", e))
}

async fn load_live<R: Record, C: Connector>(
    inner: &Inner<C>,
    clauses: Vec<ClauseSet>,
) -> Result<Vec<Entry<R>>> {
    let total = clauses.len();
    info!("Loading {} records live ({} clause set(s))", R::KIND, total);

    let collector = Arc::new(Collector::<R>::for_records());
    let failures = Arc::new(Mutex::new(Vec::<RetrieveError>::new()));

    let mut association = inner.connector.connect();
    for clause in &clauses {
        let query = clause
            .to_find_query::<R>()
            .with_max_results(inner.max_results);
        let collector = Arc::clone(&collector);
        let failures = Arc::clone(&failures);
        let cache = inner.cache.clone();

        association.add_request(DimseRequest::find(query, move |object| {
            let record = R::from_dataset(&object);
            let mut outcome = Ok(());
            if record.identity_hash().is_some() {
                outcome = cache.put(&record, true).map(|_| ());
            } else {
                warn!("{} match has no identity, not caching it", R::KIND);
            }
            let outcome = outcome.and(collector.add(record));
            if let Err(e) = outcome {
                if let Ok(mut failures) = failures.lock() {
                    failures.push(e);
                }
            }
        }));
    }

    let sent = association.send().await;
    // releases the callbacks and their collector handles
    drop(association);
    collector.complete()?;

    let mut failures = match failures.lock() {
        Ok(mut failures) => std::mem::take(&mut *failures),
        Err(e) => vec![RetrieveError::invalid_state(format!(
            "failure list poisoned: {}",
            e
        ))],
    };
    match sent {
        Ok(()) => {}
        Err(DimseError::Partial {
            failures: network, ..
        }) => failures.extend(network.into_iter().map(RetrieveError::Network)),
        Err(e) => failures.push(e.into()),
    }

    if !failures.is_empty() {
        warn!(
            "{} load failed: {} error(s) across {} sub-request(s)",
            R::KIND,
            failures.len(),
            total
        );
        return Err(RetrieveError::SubRequests {
            kind: R::KIND,
            total,
            failures,
        });
    }

    let entries = collector.drain()?;
    info!("Loaded {} distinct {} record(s)", entries.len(), R::KIND);
    Ok(entries)
}

/// Marks a load as running for as long as it lives
struct LoadGuard<'a, C> {
    inner: &'a Inner<C>,
}

impl<'a, C> LoadGuard<'a, C> {
    fn start(inner: &'a Inner<C>) -> Self {
        inner.active.fetch_add(1, Ordering::SeqCst);
        Self { inner }
    }
}

impl<C> Drop for LoadGuard<'_, C> {
    fn drop(&mut self) {
        self.inner.loaded.store(true, Ordering::SeqCst);
        self.inner.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_build_failure_is_not_a_network_error() {
        let err = runtime_unavailable(std::io::Error::new(
            std::io::ErrorKind::Other,
            "too many open files",
        ));
        assert!(matches!(err, RetrieveError::InvalidState(msg) if msg.contains("too many open files")));
    }
}
