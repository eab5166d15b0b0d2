use dimse::{Association, DimseScu, RemoteNode, ScuAssociation};

/// Opens request queues against the archive
///
/// One association is opened per retrieval or download session and never
/// shared across sessions.
pub trait Connector: Send + Sync + 'static {
    type Association: Association + 'static;

    fn connect(&self) -> Self::Association;
}

/// Connector driving the DCMTK-backed SCU against one remote node
#[derive(Debug, Clone)]
pub struct ScuConnector {
    scu: DimseScu,
    node: RemoteNode,
}

impl ScuConnector {
    pub fn new(scu: DimseScu, node: RemoteNode) -> Self {
        Self { scu, node }
    }

    pub fn node(&self) -> &RemoteNode {
        &self.node
    }

    /// AE title remote nodes push C-MOVE results to
    pub fn local_aet(&self) -> &str {
        &self.scu.config().local_aet
    }
}

impl Connector for ScuConnector {
    type Association = ScuAssociation;

    fn connect(&self) -> ScuAssociation {
        self.scu.associate(self.node.clone())
    }
}
