//! Model Bridge
//!
//! Moves structured models between their object form and the flat keyed
//! records a record store persists, and converts models of one type into
//! another through declarative transformation descriptions.
//!
//! ## Features
//!
//! - **Record Conversion**: Nested models flatten into one record per object,
//!   linked by OIDs; lists, maps, binary files and enumerations have fixed encodings
//! - **Transformations**: Ordered steps (forward, concat, split, pad, ...) map
//!   source fields onto target fields; a failing step never aborts the rest
//! - **Transformation Graph**: Types as nodes, descriptions as edges, with
//!   per-file bookkeeping for definition reloads
//! - **Definition Files**: XML definitions loaded from files or whole
//!   directories, with a SHA-256 hash per bundle
//!
//! ## Record Layout
//!
//! ```text
//! domain/connector/issue-1
//! ├── title          = "Crash on start"
//! ├── assignee       = "domain/connector/user-7"    (child OID)
//! ├── labels0        = "bug"
//! ├── labels1        = "ui"
//! ├── estimates0.key   = "design"
//! ├── estimates0.value = 3
//! ├── log            = "aGVsbG8="                    (base64)
//! ├── log.filename   = "log.txt"
//! ├── domainId / connectorId / instanceId
//! └── modelType      = "Issue"
//! ```

pub mod config;
pub mod converter;
pub mod engine;
pub mod error;
pub mod graph;
pub mod loader;
pub mod model;
pub mod record;
pub mod registry;
pub mod store;
pub mod transformation;
pub mod types;
pub mod value;

pub use config::BridgeConfig;
pub use converter::{Flattened, RecordConverter};
pub use engine::TransformationEngine;
pub use error::{BridgeError, CoercionError, FieldError, Result, StepError};
pub use graph::TransformationGraph;
pub use model::{DynamicModel, FieldDescriptor, FieldKind, Model, TypeDescriptor};
pub use record::{ConnectorIdentity, Record};
pub use registry::TransformationRegistry;
pub use store::{Commit, InMemoryRecordStore, RecordFetch, RecordStore, StoreError};
pub use transformation::performer::TransformationPerformer;
pub use transformation::{TransformationDescription, TransformationOperation, TransformationStep};
pub use types::{TypeRegistry, TypeResolver};
pub use value::{FileWrapper, RecordValue, Value};
