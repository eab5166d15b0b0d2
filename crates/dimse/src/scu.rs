//! Service Class User (SCU) implementation for outbound DIMSE operations
//!
//! Requests are queued on an [`Association`] and run together by
//! [`Association::send`]. Find matches are handed to a per-request callback
//! as they are read back, so callers never see a buffered result set.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use dicom_object::InMemDicomObject;
use futures::future::join_all;
use tracing::{debug, error, info, warn};

use crate::config::{DimseConfig, RemoteNode};
use crate::types::{format_key, FindQuery, MoveQuery, QueryLevel};
use crate::{DimseError, Result};

/// Callback invoked once per matching identifier of a C-FIND
pub type MatchCallback = Box<dyn FnMut(InMemDicomObject) + Send>;

/// A request waiting on an association
pub enum DimseRequest {
    /// C-ECHO verification
    Echo,
    /// C-FIND with a per-match callback
    Find {
        query: FindQuery,
        on_match: MatchCallback,
    },
    /// C-MOVE to the destination named in the query
    Move(MoveQuery),
}

impl DimseRequest {
    /// Build a C-FIND request
    pub fn find<F>(query: FindQuery, on_match: F) -> Self
    where
        F: FnMut(InMemDicomObject) + Send + 'static,
    {
        Self::Find {
            query,
            on_match: Box::new(on_match),
        }
    }

    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            DimseRequest::Echo => "C-ECHO",
            DimseRequest::Find { .. } => "C-FIND",
            DimseRequest::Move(_) => "C-MOVE",
        }
    }
}

impl std::fmt::Debug for DimseRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DimseRequest::Echo => f.write_str("Echo"),
            DimseRequest::Find { query, .. } => f.debug_struct("Find").field("query", query).finish(),
            DimseRequest::Move(query) => f.debug_tuple("Move").field(query).finish(),
        }
    }
}

/// A queue of requests sent to one remote node
///
/// Dropping an association releases whatever it still holds, including
/// callbacks of requests that were never sent.
#[async_trait]
pub trait Association: Send {
    /// Queue a request for the next `send`
    fn add_request(&mut self, request: DimseRequest);

    /// Number of requests waiting to be sent
    fn pending(&self) -> usize;

    /// Send every queued request and wait until all of them round-tripped
    ///
    /// Fails with [`DimseError::Partial`] when any request failed; the
    /// others still ran to completion.
    async fn send(&mut self) -> Result<()>;
}

/// DIMSE Service Class User
#[derive(Debug, Clone)]
pub struct DimseScu {
    config: DimseConfig,
}

impl DimseScu {
    /// Create a new SCU with the given configuration
    pub fn new(config: DimseConfig) -> Self {
        Self { config }
    }

    /// Local configuration
    pub fn config(&self) -> &DimseConfig {
        &self.config
    }

    /// Open a request queue against a remote node
    pub fn associate(&self, node: RemoteNode) -> ScuAssociation {
        ScuAssociation {
            scu: self.clone(),
            node,
            pending: Vec::new(),
        }
    }

    async fn execute(&self, node: &RemoteNode, request: DimseRequest) -> Result<()> {
        match request {
            DimseRequest::Echo => self.echo(node).await,
            DimseRequest::Find { query, on_match } => self.find(node, query, on_match).await,
            DimseRequest::Move(query) => self.move_request(node, query).await,
        }
    }

    /// Send a C-ECHO request to a remote node
    async fn echo(&self, node: &RemoteNode) -> Result<()> {
        info!("Sending C-ECHO to {}@{}:{}", node.ae_title, node.host, node.port);

        let mut args = self.association_args(node);
        args.push(node.host.clone());
        args.push(node.port.to_string());

        run_tool("echoscu", &args).await?;
        info!("C-ECHO completed successfully");
        Ok(())
    }

    /// Send a C-FIND request and feed every extracted match to `on_match`
    async fn find(&self, node: &RemoteNode, query: FindQuery, mut on_match: MatchCallback) -> Result<()> {
        info!(
            "Sending C-FIND to {}@{}:{} (level: {}, max_results: {})",
            node.ae_title, node.host, node.port, query.query_level, query.max_results
        );
        debug!("C-FIND keys: {:?}", query.keys);

        std::fs::create_dir_all(&self.config.storage_dir)?;
        let out_dir = tempfile::Builder::new()
            .prefix("dcmtk_find_")
            .tempdir_in(&self.config.storage_dir)?;

        let mut args = self.association_args(node);
        args.push(information_model(query.query_level).into());
        args.extend(query_key_args(query.query_level, &query.keys));
        // extract responses to DICOM files
        args.push("-X".into());
        args.push("-od".into());
        args.push(out_dir.path().to_string_lossy().to_string());
        args.push(node.host.clone());
        args.push(node.port.to_string());

        run_tool("findscu", &args).await?;

        let matches = read_responses(out_dir.path()).await?;
        let limit = match query.max_results {
            0 => usize::MAX,
            n => n as usize,
        };
        if matches.len() > limit {
            warn!("C-FIND returned {} matches, keeping the first {}", matches.len(), limit);
        }

        let mut delivered = 0usize;
        for path in matches.into_iter().take(limit) {
            match dicom_object::open_file(&path) {
                Ok(file) => {
                    on_match(file.into_inner());
                    delivered += 1;
                }
                Err(e) => {
                    return Err(DimseError::DicomObject(format!(
                        "Failed to read C-FIND response {}: {}",
                        path.display(),
                        e
                    )));
                }
            }
        }

        info!("C-FIND completed with {} matches", delivered);
        Ok(())
    }

    /// Send a C-MOVE request to a remote node
    async fn move_request(&self, node: &RemoteNode, query: MoveQuery) -> Result<()> {
        info!(
            "Sending C-MOVE to {}@{}:{} (level: {}, dest: {})",
            node.ae_title, node.host, node.port, query.query_level, query.destination_aet
        );
        debug!("C-MOVE keys: {:?}", query.keys);

        let mut args = self.association_args(node);
        args.push("-aem".into());
        args.push(query.destination_aet.clone());
        args.push(information_model(query.query_level).into());
        args.extend(query_key_args(query.query_level, &query.keys));
        args.push(node.host.clone());
        args.push(node.port.to_string());

        run_tool("movescu", &args).await?;
        info!("C-MOVE completed");
        Ok(())
    }

    fn association_args(&self, node: &RemoteNode) -> Vec<String> {
        vec![
            "-aet".into(),
            self.config.local_aet.clone(),
            "-aec".into(),
            node.ae_title.clone(),
            "-to".into(),
            self.get_connection_timeout(node).as_secs().max(1).to_string(),
            "-pdu".into(),
            self.get_max_pdu(node).to_string(),
        ]
    }

    /// Get connection timeout for a node (uses node-specific or global setting)
    fn get_connection_timeout(&self, node: &RemoteNode) -> Duration {
        node.connect_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.config.connect_timeout())
    }

    /// Get maximum PDU size for a node (uses node-specific or global setting)
    fn get_max_pdu(&self, node: &RemoteNode) -> u32 {
        node.max_pdu.unwrap_or(self.config.max_pdu)
    }
}

/// Request queue bound to one remote node
pub struct ScuAssociation {
    scu: DimseScu,
    node: RemoteNode,
    pending: Vec<DimseRequest>,
}

impl ScuAssociation {
    /// The node requests are sent to
    pub fn node(&self) -> &RemoteNode {
        &self.node
    }
}

#[async_trait]
impl Association for ScuAssociation {
    fn add_request(&mut self, request: DimseRequest) {
        debug!("Queued {} for {}", request.name(), self.node.ae_title);
        self.pending.push(request);
    }

    fn pending(&self) -> usize {
        self.pending.len()
    }

    async fn send(&mut self) -> Result<()> {
        self.node.validate()?;

        let requests = std::mem::take(&mut self.pending);
        let total = requests.len();
        if total == 0 {
            return Ok(());
        }

        let scu = &self.scu;
        let node = &self.node;
        let outcomes = join_all(requests.into_iter().map(|request| scu.execute(node, request))).await;

        let failures: Vec<DimseError> = outcomes.into_iter().filter_map(|r| r.err()).collect();
        if failures.is_empty() {
            Ok(())
        } else {
            error!("{} of {} requests to {} failed", failures.len(), total, node.ae_title);
            Err(DimseError::Partial { total, failures })
        }
    }
}

fn information_model(level: QueryLevel) -> &'static str {
    match level {
        QueryLevel::Patient => "-P", // Patient Root
        _ => "-S",                   // Study Root
    }
}

fn query_key_args(level: QueryLevel, keys: &[(dicom_core::Tag, String)]) -> Vec<String> {
    let mut args = vec!["-k".to_string(), format!("QueryRetrieveLevel={}", level)];
    for (tag, value) in keys {
        args.push("-k".into());
        args.push(format_key(*tag, value));
    }
    args
}

async fn read_responses(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut rd = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = rd.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()).unwrap_or("") == "dcm" {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(feature = "dcmtk_cli")]
async fn run_tool(program: &str, args: &[String]) -> Result<()> {
    use tokio::process::Command;

    debug!("Running {} {:?}", program, args);
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| DimseError::operation_failed(format!("Failed to spawn {}: {}", program, e)))?;

    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        error!(
            "{} failed: status={:?}, stdout={}, stderr={}",
            program,
            output.status.code(),
            stdout,
            stderr
        );
        Err(DimseError::operation_failed(format!(
            "{} failed: {:?} {}",
            program,
            output.status.code(),
            stderr
        )))
    }
}

#[cfg(not(feature = "dcmtk_cli"))]
async fn run_tool(program: &str, _args: &[String]) -> Result<()> {
    Err(DimseError::NotSupported(format!(
        "{} requires feature 'dcmtk_cli'",
        program
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom_dictionary_std::tags;

    #[test]
    fn test_association_args_use_node_overrides() {
        let scu = DimseScu::new(DimseConfig {
            local_aet: "TEST_SCU".into(),
            max_pdu: 32768,
            ..Default::default()
        });
        let mut node = RemoteNode::new("PACS", "localhost", 11112).with_timeout(10_000);
        node.max_pdu = Some(65536);

        let args = scu.association_args(&node);
        assert_eq!(
            args,
            vec!["-aet", "TEST_SCU", "-aec", "PACS", "-to", "10", "-pdu", "65536"]
        );
    }

    #[test]
    fn test_connection_timeout_selection() {
        let scu = DimseScu::new(DimseConfig {
            connect_timeout_ms: 5000,
            ..Default::default()
        });

        // Node without specific timeout should use global
        let node1 = RemoteNode::new("TEST1", "localhost", 11112);
        assert_eq!(scu.get_connection_timeout(&node1), Duration::from_millis(5000));

        // Node with specific timeout should use its own
        let node2 = RemoteNode::new("TEST2", "localhost", 11113).with_timeout(2000);
        assert_eq!(scu.get_connection_timeout(&node2), Duration::from_millis(2000));
    }

    #[test]
    fn test_query_key_args() {
        let args = query_key_args(
            QueryLevel::Series,
            &[(tags::SERIES_INSTANCE_UID, "1.2.3".to_string())],
        );
        assert_eq!(
            args,
            vec!["-k", "QueryRetrieveLevel=SERIES", "-k", "0020,000E=1.2.3"]
        );
        assert_eq!(information_model(QueryLevel::Patient), "-P");
        assert_eq!(information_model(QueryLevel::Image), "-S");
    }

    #[tokio::test]
    async fn test_association_queue_and_empty_send() {
        let scu = DimseScu::new(DimseConfig::default());
        let mut association = scu.associate(RemoteNode::new("PACS", "localhost", 11112));
        assert_eq!(association.pending(), 0);
        assert!(association.send().await.is_ok());

        association.add_request(DimseRequest::find(
            FindQuery::new(QueryLevel::Patient),
            |_| {},
        ));
        association.add_request(DimseRequest::Echo);
        assert_eq!(association.pending(), 2);
    }

    #[tokio::test]
    async fn test_send_rejects_invalid_node() {
        let scu = DimseScu::new(DimseConfig::default());
        let mut association = scu.associate(RemoteNode::new("", "localhost", 11112));
        association.add_request(DimseRequest::Echo);
        assert!(matches!(association.send().await, Err(DimseError::Config(_))));
    }

    #[tokio::test]
    #[ignore]
    async fn test_echo_against_local_node() {
        let scu = DimseScu::new(DimseConfig::default());
        let mut association = scu.associate(RemoteNode::new("TEST_AET", "localhost", 11112));
        association.add_request(DimseRequest::Echo);
        assert!(association.send().await.is_ok());
    }
}
