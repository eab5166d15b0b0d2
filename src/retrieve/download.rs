//! Image downloads through a shared inbound store listener
//!
//! A C-MOVE makes the archive push files to a listener we run locally.
//! Starting that listener is expensive, so concurrent download sessions
//! share one through [`SharedEndpoint`]: the first lease starts it, the
//! last release stops it. Each lease forwards received files to its own
//! callback.

use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use dicom_dictionary_std::tags;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use dimse::{Association, DimseConfig, DimseRequest, MoveQuery, QueryLevel, ReceivedFile, StoreScp};

use super::Connector;
use crate::error::{Result, RetrieveError};
use crate::models::{Series, Study};

const FILE_CHANNEL_CAPACITY: usize = 1024;

/// A running inbound listener
#[async_trait]
pub trait DownloadEndpoint: Send + Sync + 'static {
    /// Announce files received since the last poll; returns how many
    async fn scan(&self) -> Result<usize>;

    async fn shutdown(&self) -> Result<()>;
}

/// Starts listeners announcing their files on the given channel
#[async_trait]
pub trait EndpointFactory: Send + Sync + 'static {
    type Endpoint: DownloadEndpoint;

    async fn create(&self, files: broadcast::Sender<ReceivedFile>) -> Result<Self::Endpoint>;
}

#[async_trait]
impl DownloadEndpoint for StoreScp {
    async fn scan(&self) -> Result<usize> {
        Ok(StoreScp::scan(self).await?)
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(StoreScp::shutdown(self).await?)
    }
}

/// Starts a DCMTK `storescp` listener per endpoint
#[derive(Debug, Clone)]
pub struct StoreScpFactory {
    config: DimseConfig,
}

impl StoreScpFactory {
    pub fn new(config: DimseConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl EndpointFactory for StoreScpFactory {
    type Endpoint = StoreScp;

    async fn create(&self, files: broadcast::Sender<ReceivedFile>) -> Result<StoreScp> {
        Ok(StoreScp::start(self.config.clone(), files).await?)
    }
}

struct Slot<E> {
    users: usize,
    endpoint: Option<Arc<E>>,
}

/// Reference-counted listener shared by concurrent download sessions
pub struct SharedEndpoint<F: EndpointFactory> {
    factory: F,
    slot: Mutex<Slot<F::Endpoint>>,
    files: broadcast::Sender<ReceivedFile>,
}

impl<F: EndpointFactory> SharedEndpoint<F> {
    pub fn new(factory: F) -> Arc<Self> {
        let (files, _) = broadcast::channel(FILE_CHANNEL_CAPACITY);
        Arc::new(Self {
            factory,
            slot: Mutex::new(Slot {
                users: 0,
                endpoint: None,
            }),
            files,
        })
    }

    /// Take a lease, starting the listener if nobody holds one
    ///
    /// Files received while the lease is held are passed to
    /// `on_file_received` on a background task.
    pub async fn acquire<Cb>(self: &Arc<Self>, on_file_received: Cb) -> Result<EndpointLease<F>>
    where
        Cb: FnMut(ReceivedFile) + Send + 'static,
    {
        let mut slot = self.slot.lock().await;
        if slot.users == 0 {
            info!("Starting shared download endpoint");
            let endpoint = self.factory.create(self.files.clone()).await?;
            slot.endpoint = Some(Arc::new(endpoint));
        }
        let endpoint = slot
            .endpoint
            .clone()
            .ok_or_else(|| RetrieveError::invalid_state("shared endpoint missing while leased"))?;
        slot.users += 1;
        debug!("Download endpoint leased ({} user(s))", slot.users);

        let files = self.files.subscribe();
        drop(slot);

        let (stop, stopped) = oneshot::channel();
        let forwarder = tokio::spawn(forward(files, stopped, on_file_received));

        Ok(EndpointLease {
            shared: Arc::clone(self),
            endpoint,
            stop: Some(stop),
            forwarder: Some(forwarder),
            released: false,
        })
    }

    /// Number of leases currently held
    pub async fn users(&self) -> usize {
        self.slot.lock().await.users
    }

    pub async fn is_running(&self) -> bool {
        self.slot.lock().await.endpoint.is_some()
    }

    async fn release(&self) -> Result<()> {
        let mut slot = self.slot.lock().await;
        if slot.users == 0 {
            return Err(RetrieveError::invalid_state(
                "download endpoint released more often than acquired",
            ));
        }
        slot.users -= 1;
        debug!("Download endpoint released ({} user(s) left)", slot.users);

        if slot.users == 0 {
            if let Some(endpoint) = slot.endpoint.take() {
                info!("Stopping shared download endpoint");
                endpoint.shutdown().await?;
            }
        }
        Ok(())
    }
}

async fn forward<Cb>(
    mut files: broadcast::Receiver<ReceivedFile>,
    mut stopped: oneshot::Receiver<()>,
    mut on_file_received: Cb,
) where
    Cb: FnMut(ReceivedFile) + Send + 'static,
{
    loop {
        tokio::select! {
            received = files.recv() => match received {
                Ok(file) => on_file_received(file),
                Err(RecvError::Lagged(missed)) => {
                    warn!("Download session missed {} file notification(s)", missed)
                }
                Err(RecvError::Closed) => return,
            },
            _ = &mut stopped => {
                // deliver what was announced before the stop
                loop {
                    match files.try_recv() {
                        Ok(file) => on_file_received(file),
                        Err(TryRecvError::Lagged(missed)) => {
                            warn!("Download session missed {} file notification(s)", missed)
                        }
                        Err(_) => return,
                    }
                }
            }
        }
    }
}

/// One session's hold on the shared listener
///
/// Release it explicitly with [`release`](Self::release). A lease dropped
/// without release is returned on a background task.
pub struct EndpointLease<F: EndpointFactory> {
    shared: Arc<SharedEndpoint<F>>,
    endpoint: Arc<F::Endpoint>,
    stop: Option<oneshot::Sender<()>>,
    forwarder: Option<JoinHandle<()>>,
    released: bool,
}

impl<F: EndpointFactory> EndpointLease<F> {
    /// Announce files that reached the listener but were not polled yet
    pub async fn flush(&self) -> Result<usize> {
        self.endpoint.scan().await
    }

    /// Stop forwarding and give the lease back
    ///
    /// Every file announced before this call has reached the callback when
    /// it returns.
    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(forwarder) = self.forwarder.take() {
            if let Err(e) = forwarder.await {
                warn!("Download forwarder ended abnormally: {}", e);
            }
        }
        self.shared.release().await
    }
}

impl<F: EndpointFactory> Drop for EndpointLease<F> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        warn!("Download endpoint lease dropped without release");
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let shared = Arc::clone(&self.shared);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = shared.release().await {
                        warn!("Deferred endpoint release failed: {}", e);
                    }
                });
            }
            Err(_) => warn!("No runtime to release the download endpoint on"),
        }
    }
}

/// Downloads studies and series into the shared listener's storage directory
pub struct Downloader<C: Connector, F: EndpointFactory> {
    connector: Arc<C>,
    endpoint: Arc<SharedEndpoint<F>>,
    destination_aet: String,
}

impl<C: Connector, F: EndpointFactory> Downloader<C, F> {
    /// `destination_aet` must name the listener behind `endpoint`
    pub fn new(
        connector: Arc<C>,
        endpoint: Arc<SharedEndpoint<F>>,
        destination_aet: impl Into<String>,
    ) -> Self {
        Self {
            connector,
            endpoint,
            destination_aet: destination_aet.into(),
        }
    }

    pub fn endpoint(&self) -> &Arc<SharedEndpoint<F>> {
        &self.endpoint
    }

    /// Move every instance of a study here
    pub async fn download_study(&self, study: &Study) -> Result<Vec<ReceivedFile>> {
        let uid = required_uid(&study.study_instance_uid, "StudyInstanceUID")?;
        let query = MoveQuery::new(QueryLevel::Study, &self.destination_aet)
            .with_key(tags::STUDY_INSTANCE_UID, uid.as_str());

        let wanted = uid.clone();
        self.download(query, &uid, move |file| {
            file.study_instance_uid.as_deref() == Some(wanted.as_str())
        })
        .await
    }

    /// Move every instance of a series here
    pub async fn download_series(&self, series: &Series) -> Result<Vec<ReceivedFile>> {
        let uid = required_uid(&series.series_instance_uid, "SeriesInstanceUID")?;
        let mut query = MoveQuery::new(QueryLevel::Series, &self.destination_aet)
            .with_key(tags::SERIES_INSTANCE_UID, uid.as_str());
        if let Some(study_uid) = series.study_instance_uid.as_deref().filter(|s| !s.is_empty()) {
            query = query.with_key(tags::STUDY_INSTANCE_UID, study_uid);
        }

        let wanted = uid.clone();
        self.download(query, &uid, move |file| {
            file.series_instance_uid.as_deref() == Some(wanted.as_str())
        })
        .await
    }

    async fn download<P>(&self, query: MoveQuery, uid: &str, keep: P) -> Result<Vec<ReceivedFile>>
    where
        P: Fn(&ReceivedFile) -> bool + Send + 'static,
    {
        info!("Downloading {} {}", query.query_level, uid);

        let received = Arc::new(StdMutex::new(Vec::new()));
        let lease = {
            let received = Arc::clone(&received);
            self.endpoint
                .acquire(move |file| {
                    if keep(&file) {
                        if let Ok(mut received) = received.lock() {
                            received.push(file);
                        }
                    }
                })
                .await?
        };

        let mut association = self.connector.connect();
        association.add_request(DimseRequest::Move(query));
        let sent = association.send().await;
        drop(association);

        let flushed = match sent {
            Ok(()) => lease.flush().await.map(|_| ()),
            Err(_) => Ok(()),
        };
        lease.release().await?;
        sent?;
        flushed?;

        let files = received
            .lock()
            .map(|mut files| std::mem::take(&mut *files))
            .map_err(|e| RetrieveError::invalid_state(format!("received files poisoned: {}", e)))?;
        info!("Downloaded {} file(s) for {}", files.len(), uid);
        Ok(files)
    }
}

fn required_uid(uid: &Option<String>, name: &str) -> Result<String> {
    uid.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| RetrieveError::invalid_argument(format!("{} is required", name)))
}
