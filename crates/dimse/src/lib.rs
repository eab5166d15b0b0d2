//! DIMSE (DICOM Message Service Element) collaborator
//!
//! This crate is the narrow network surface the retrieval engine talks to.
//! The wire protocol is delegated to DCMTK tools; this crate only queues
//! requests, runs them and hands matches back through callbacks.
//!
//! # Features
//! - Outbound request queue (SCU): C-ECHO, C-FIND, C-MOVE
//! - Inbound storage listener (SCP) used as a C-MOVE destination
//! - `dcmtk_cli` (default): drive `echoscu`/`findscu`/`movescu`/`storescp`

pub mod config;
pub mod error;
pub mod scp;
pub mod scu;
pub mod types;

// Re-export commonly used types
pub use config::{DimseConfig, RemoteNode};
pub use error::{DimseError, Result};
pub use scp::StoreScp;
pub use scu::{Association, DimseRequest, DimseScu, ScuAssociation};
pub use types::{FindQuery, MoveQuery, QueryLevel, ReceivedFile};

/// Default DICOM port (non-TLS)
pub const DEFAULT_DIMSE_PORT: u16 = 11112;

/// Default port for the inbound store listener
pub const DEFAULT_STORE_PORT: u16 = 11113;
