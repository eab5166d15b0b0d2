#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dicom_core::{DataElement, PrimitiveValue, Tag, VR};
use dicom_dictionary_std::tags;
use dicom_object::InMemDicomObject;
use tokio::sync::broadcast;

use dicom_retriever::error::Result as RetrieveResult;
use dicom_retriever::models::RecordKind;
use dicom_retriever::{
    CacheStore, Connector, DownloadEndpoint, EndpointFactory, IndexRegistry, RecordCache,
};
use dimse::{Association, DimseError, DimseRequest, FindQuery, MoveQuery, ReceivedFile};

pub type FindResponder =
    Arc<dyn Fn(&FindQuery) -> Result<Vec<InMemDicomObject>, DimseError> + Send + Sync>;
pub type MoveResponder = Arc<dyn Fn(&MoveQuery) -> Result<(), DimseError> + Send + Sync>;

/// In-process stand-in for the archive
#[derive(Clone)]
pub struct MockConnector {
    find: FindResponder,
    on_move: MoveResponder,
    delay: Duration,
    pub connects: Arc<AtomicUsize>,
    pub sends: Arc<AtomicUsize>,
    pub queries: Arc<Mutex<Vec<FindQuery>>>,
    pub moves: Arc<Mutex<Vec<MoveQuery>>>,
}

impl MockConnector {
    pub fn new<F>(find: F) -> Self
    where
        F: Fn(&FindQuery) -> Result<Vec<InMemDicomObject>, DimseError> + Send + Sync + 'static,
    {
        Self {
            find: Arc::new(find),
            on_move: Arc::new(|_| Ok(())),
            delay: Duration::ZERO,
            connects: Arc::new(AtomicUsize::new(0)),
            sends: Arc::new(AtomicUsize::new(0)),
            queries: Arc::new(Mutex::new(Vec::new())),
            moves: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Hold every send for `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_move<F>(mut self, on_move: F) -> Self
    where
        F: Fn(&MoveQuery) -> Result<(), DimseError> + Send + Sync + 'static,
    {
        self.on_move = Arc::new(on_move);
        self
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn send_count(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    pub fn recorded_queries(&self) -> Vec<FindQuery> {
        self.queries.lock().unwrap().clone()
    }
}

impl Connector for MockConnector {
    type Association = MockAssociation;

    fn connect(&self) -> MockAssociation {
        self.connects.fetch_add(1, Ordering::SeqCst);
        MockAssociation {
            connector: self.clone(),
            pending: Vec::new(),
        }
    }
}

pub struct MockAssociation {
    connector: MockConnector,
    pending: Vec<DimseRequest>,
}

#[async_trait]
impl Association for MockAssociation {
    fn add_request(&mut self, request: DimseRequest) {
        self.pending.push(request);
    }

    fn pending(&self) -> usize {
        self.pending.len()
    }

    async fn send(&mut self) -> dimse::Result<()> {
        self.connector.sends.fetch_add(1, Ordering::SeqCst);
        if !self.connector.delay.is_zero() {
            tokio::time::sleep(self.connector.delay).await;
        }

        let requests = std::mem::take(&mut self.pending);
        let total = requests.len();
        let mut failures = Vec::new();
        for request in requests {
            let outcome = match request {
                DimseRequest::Echo => Ok(()),
                DimseRequest::Find {
                    query,
                    mut on_match,
                } => {
                    self.connector.queries.lock().unwrap().push(query.clone());
                    (self.connector.find)(&query).map(|matches| {
                        for object in matches {
                            on_match(object);
                        }
                    })
                }
                DimseRequest::Move(query) => {
                    self.connector.moves.lock().unwrap().push(query.clone());
                    (self.connector.on_move)(&query)
                }
            };
            if let Err(e) = outcome {
                failures.push(e);
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DimseError::Partial { total, failures })
        }
    }
}

/// Cache store kept in memory
#[derive(Default)]
pub struct MemoryCache {
    tables: Mutex<HashMap<RecordKind, Vec<(String, Vec<u8>)>>>,
}

impl CacheStore for MemoryCache {
    fn store(&self, kind: RecordKind, key: &str, blob: &[u8], overwrite: bool) -> RetrieveResult<bool> {
        let mut tables = self.tables.lock().unwrap();
        let table = tables.entry(kind).or_default();
        match table.iter_mut().find(|(k, _)| k == key) {
            Some(_) if !overwrite => Ok(false),
            Some((_, existing)) => {
                *existing = blob.to_vec();
                Ok(true)
            }
            None => {
                table.push((key.to_string(), blob.to_vec()));
                Ok(true)
            }
        }
    }

    fn retrieve_all(&self, kind: RecordKind) -> RetrieveResult<Vec<Vec<u8>>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .get(&kind)
            .map(|t| t.iter().map(|(_, blob)| blob.clone()).collect())
            .unwrap_or_default())
    }

    fn clear(&self, kind: RecordKind) -> RetrieveResult<()> {
        self.tables.lock().unwrap().remove(&kind);
        Ok(())
    }
}

pub fn memory_cache() -> RecordCache {
    RecordCache::new(
        Arc::new(MemoryCache::default()),
        Arc::new(IndexRegistry::new().unwrap()),
    )
}

/// Files the mock listener will announce on its next scan
pub type Inbox = Arc<Mutex<Vec<ReceivedFile>>>;

/// Listener factory counting how often it starts and stops endpoints
#[derive(Clone, Default)]
pub struct MockEndpointFactory {
    pub created: Arc<AtomicUsize>,
    pub shutdowns: Arc<AtomicUsize>,
    pub inbox: Inbox,
}

impl MockEndpointFactory {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

pub struct MockEndpoint {
    files: broadcast::Sender<ReceivedFile>,
    inbox: Inbox,
    shutdowns: Arc<AtomicUsize>,
}

#[async_trait]
impl DownloadEndpoint for MockEndpoint {
    async fn scan(&self) -> RetrieveResult<usize> {
        let received: Vec<ReceivedFile> = self.inbox.lock().unwrap().drain(..).collect();
        let count = received.len();
        for file in received {
            let _ = self.files.send(file);
        }
        Ok(count)
    }

    async fn shutdown(&self) -> RetrieveResult<()> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl EndpointFactory for MockEndpointFactory {
    type Endpoint = MockEndpoint;

    async fn create(&self, files: broadcast::Sender<ReceivedFile>) -> RetrieveResult<MockEndpoint> {
        self.created.fetch_add(1, Ordering::SeqCst);
        // widen the window in which a second creation could sneak in
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(MockEndpoint {
            files,
            inbox: Arc::clone(&self.inbox),
            shutdowns: Arc::clone(&self.shutdowns),
        })
    }
}

pub fn dataset(values: &[(Tag, &str)]) -> InMemDicomObject {
    let mut object = InMemDicomObject::new_empty();
    for (tag, value) in values {
        object.put(DataElement::new(*tag, vr_of(*tag), PrimitiveValue::from(*value)));
    }
    object
}

fn vr_of(tag: Tag) -> VR {
    match tag {
        t if t == tags::PATIENT_NAME => VR::PN,
        t if t == tags::PATIENT_BIRTH_DATE || t == tags::STUDY_DATE => VR::DA,
        t if t == tags::STUDY_INSTANCE_UID
            || t == tags::SERIES_INSTANCE_UID
            || t == tags::SOP_INSTANCE_UID =>
        {
            VR::UI
        }
        _ => VR::LO,
    }
}

pub fn patient_dataset(id: &str, name: &str) -> InMemDicomObject {
    dataset(&[(tags::PATIENT_ID, id), (tags::PATIENT_NAME, name)])
}

pub fn received_file(sop: &str, series: &str, study: &str) -> ReceivedFile {
    ReceivedFile {
        path: PathBuf::from(format!("/tmp/incoming/{}.dcm", sop)),
        sop_instance_uid: Some(sop.to_string()),
        series_instance_uid: Some(series.to_string()),
        study_instance_uid: Some(study.to_string()),
    }
}
