//! DICOM retrieval engine
//!
//! Queries a remote archive (or the local cache of earlier answers) for
//! patients, studies, series and images, deduplicates what comes back and
//! downloads image data through a shared inbound listener.
//!
//! ```no_run
//! use dicom_dictionary_std::tags;
//! use dicom_retriever::{Config, ConstraintSet, Retriever, Source, Study};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_file("retriever.toml")?;
//! let retriever = Retriever::from_config(&config)?;
//!
//! let constraints = ConstraintSet::<Study>::new().like(tags::PATIENT_NAME, "Doe")?;
//! for entry in retriever.find(&constraints, Source::Live).await? {
//!     println!("{:?} ({} hit(s))", entry.record.study_instance_uid, entry.occurrences());
//! }
//! # Ok(())
//! # }
//! ```

pub mod collector;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod query;
pub mod retrieve;
pub mod storage;

pub use collector::{Collector, Entry};
pub use config::{Config, ConfigError};
pub use error::{Result, RetrieveError};
pub use models::{FieldValue, Image, Patient, Record, RecordKind, Series, Study, UNDEFINED_TAG};
pub use query::{compile, expand, ClauseSet, Constraint, ConstraintSet, Operator};
pub use retrieve::{
    Connector, DownloadEndpoint, Downloader, EndpointFactory, EndpointLease, LoadState, Retriever,
    ScuConnector, SharedEndpoint, Source, StoreScpFactory,
};
pub use storage::{CacheStore, IndexRegistry, RecordCache, RedbCache};
