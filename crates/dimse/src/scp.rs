//! Service Class Provider (SCP) for inbound C-STORE traffic
//!
//! A C-MOVE makes the remote node open its own association back to us and
//! push the matching instances. [`StoreScp`] is the listener on the
//! receiving end: it keeps a DCMTK `storescp` process bound to the local
//! port and announces every file that lands in the storage directory.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::process::Child;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::DimseConfig;
use crate::types::ReceivedFile;
use crate::{DimseError, Result};

/// Inbound storage listener
pub struct StoreScp {
    config: DimseConfig,
    process: Mutex<Option<Child>>,
    scanner: Arc<DirectoryScanner>,
    poller: JoinHandle<()>,
}

impl StoreScp {
    /// Start listening on `config.port`, announcing received files on `files`
    pub async fn start(config: DimseConfig, files: broadcast::Sender<ReceivedFile>) -> Result<Self> {
        config.validate()?;

        info!(
            "Starting store SCP on port {} (AET: {}, dir: {})",
            config.port,
            config.local_aet,
            config.storage_dir.display()
        );

        let process = spawn_listener(&config)?;
        let scanner = Arc::new(DirectoryScanner::new(config.storage_dir.clone(), files));
        // files already present belong to earlier sessions
        scanner.mark_existing().await?;

        let poller = {
            let scanner = Arc::clone(&scanner);
            let interval = config.scan_interval();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    ticker.tick().await;
                    if let Err(e) = scanner.scan().await {
                        warn!("Store SCP scan failed: {}", e);
                    }
                }
            })
        };

        Ok(Self {
            config,
            process: Mutex::new(process),
            scanner,
            poller,
        })
    }

    /// Listener configuration
    pub fn config(&self) -> &DimseConfig {
        &self.config
    }

    /// Announce any file received since the last poll
    pub async fn scan(&self) -> Result<usize> {
        self.scanner.scan().await
    }

    /// Stop the listener; a final scan runs first so nothing is lost
    pub async fn shutdown(&self) -> Result<()> {
        self.poller.abort();
        let announced = self.scanner.scan().await?;
        debug!("Final scan announced {} files", announced);

        if let Some(mut child) = self.process.lock().await.take() {
            if let Err(e) = child.kill().await {
                warn!("Failed to stop storescp: {}", e);
            }
        }

        info!("Store SCP on port {} stopped", self.config.port);
        Ok(())
    }
}

impl Drop for StoreScp {
    fn drop(&mut self) {
        self.poller.abort();
    }
}

/// Tracks which files in the storage directory were already announced
struct DirectoryScanner {
    dir: PathBuf,
    seen: Mutex<HashSet<PathBuf>>,
    files: broadcast::Sender<ReceivedFile>,
}

impl DirectoryScanner {
    fn new(dir: PathBuf, files: broadcast::Sender<ReceivedFile>) -> Self {
        Self {
            dir,
            seen: Mutex::new(HashSet::new()),
            files,
        }
    }

    async fn mark_existing(&self) -> Result<()> {
        let existing = list_files(&self.dir).await?;
        self.seen.lock().await.extend(existing);
        Ok(())
    }

    async fn scan(&self) -> Result<usize> {
        // the lock serialises polls so a file is never announced twice
        let mut seen = self.seen.lock().await;
        let mut announced = 0;

        for path in list_files(&self.dir).await? {
            if seen.contains(&path) {
                continue;
            }
            match ReceivedFile::from_path(&path) {
                Ok(file) => {
                    seen.insert(path);
                    debug!("Received {}", file.path.display());
                    // no subscribers is not an error
                    let _ = self.files.send(file);
                    announced += 1;
                }
                Err(e) => {
                    // storescp may still be writing it; retry on the next poll
                    debug!("Skipping unreadable file {}: {}", path.display(), e);
                }
            }
        }

        Ok(announced)
    }
}

async fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut rd = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = rd.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(feature = "dcmtk_cli")]
fn spawn_listener(config: &DimseConfig) -> Result<Option<Child>> {
    use tokio::process::Command;

    let child = Command::new("storescp")
        .arg("-aet")
        .arg(&config.local_aet)
        .arg("-pdu")
        .arg(config.max_pdu.to_string())
        .arg("-od")
        .arg(&config.storage_dir)
        .arg(config.port.to_string())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| DimseError::operation_failed(format!("Failed to spawn storescp: {}", e)))?;

    Ok(Some(child))
}

#[cfg(not(feature = "dcmtk_cli"))]
fn spawn_listener(_config: &DimseConfig) -> Result<Option<Child>> {
    Err(DimseError::NotSupported(
        "Store SCP requires feature 'dcmtk_cli'".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom_core::{DataElement, PrimitiveValue, VR};
    use dicom_dictionary_std::{tags, uids};
    use dicom_object::meta::FileMetaTableBuilder;
    use dicom_object::InMemDicomObject;

    fn write_instance(path: &Path, sop_uid: &str, series_uid: &str) {
        let object = InMemDicomObject::from_element_iter([
            DataElement::new(
                tags::SOP_CLASS_UID,
                VR::UI,
                PrimitiveValue::from(uids::SECONDARY_CAPTURE_IMAGE_STORAGE),
            ),
            DataElement::new(tags::SOP_INSTANCE_UID, VR::UI, PrimitiveValue::from(sop_uid)),
            DataElement::new(tags::SERIES_INSTANCE_UID, VR::UI, PrimitiveValue::from(series_uid)),
        ]);
        let file = object
            .with_meta(
                FileMetaTableBuilder::new()
                    .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
                    .media_storage_sop_class_uid(uids::SECONDARY_CAPTURE_IMAGE_STORAGE),
            )
            .unwrap();
        file.write_to_file(path).unwrap();
    }

    #[tokio::test]
    async fn test_scanner_announces_each_file_once() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = broadcast::channel(16);
        let scanner = DirectoryScanner::new(temp_dir.path().to_path_buf(), tx);

        write_instance(&temp_dir.path().join("old.dcm"), "1.1", "9.9");
        scanner.mark_existing().await.unwrap();

        write_instance(&temp_dir.path().join("new.dcm"), "1.2", "9.9");
        assert_eq!(scanner.scan().await.unwrap(), 1);
        assert_eq!(scanner.scan().await.unwrap(), 0);

        let file = rx.try_recv().unwrap();
        assert_eq!(file.sop_instance_uid.as_deref(), Some("1.2"));
        assert_eq!(file.series_instance_uid.as_deref(), Some("9.9"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_scanner_retries_unreadable_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = broadcast::channel(16);
        let scanner = DirectoryScanner::new(temp_dir.path().to_path_buf(), tx);

        let partial = temp_dir.path().join("partial.dcm");
        std::fs::write(&partial, b"not yet").unwrap();
        assert_eq!(scanner.scan().await.unwrap(), 0);

        write_instance(&partial, "2.1", "9.9");
        assert_eq!(scanner.scan().await.unwrap(), 1);
    }
}
