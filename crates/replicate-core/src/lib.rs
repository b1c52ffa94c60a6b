//! Replicate Core - record stream replication between object stores
//!
//! A [`Dumper`] walks application objects and emits self-describing
//! records; a [`Loader`] reads them back into a different store, where
//! every object receives a new identifier. Attributes that point at other
//! records are carried as [`Reference`] markers and rewritten on the way
//! in, so the object graph stays connected after the ids change.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌─────────────┐   ┌────────┐   ┌──────────────┐
//! │ objects  │──►│    Dumper    │──►│   frames    │──►│ Loader │──►│ new objects  │
//! │          │   │ FilterChain  │   │ (protocol)  │   │  ids   │   │ FilterChain  │
//! └──────────┘   └──────────────┘   └─────────────┘   └────────┘   └──────────────┘
//! ```
//!
//! Records must appear after every record they reference. Nothing is
//! reordered or deferred: a reference to a record that has not been loaded
//! yet fails with [`Error::MissingReference`].
//!
//! # Example
//!
//! ```rust
//! use replicate_core::object::{ObjectType, ReplicantObject};
//! use replicate_core::{Attributes, Dumper, Id, Loader, Reference, TypeRegistry, Value};
//!
//! let first = ReplicantObject::new("Thing", 1, Attributes::new());
//! let mut attrs = Attributes::new();
//! attrs.insert("related".into(), Reference::one("Thing", 1).into());
//! let second = ReplicantObject::new("Thing", 2, attrs);
//!
//! let mut stream = Vec::new();
//! Dumper::session(&mut stream, |dumper| dumper.dump_all([&first, &second])).unwrap();
//!
//! let things = ObjectType::starting_at("Thing", 100);
//! let store = things.store();
//! let registry = TypeRegistry::new().with("Thing", things);
//! Loader::session(registry, |loader| loader.read(stream.as_slice())).unwrap();
//!
//! let loaded = store.borrow();
//! assert_eq!(loaded[1].get("related"), Some(&Value::Id(Id::Int(100))));
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod dumper;
pub mod error;
pub mod filter;
pub mod loader;
pub mod object;
pub mod protocol;
pub mod record;
pub mod registry;
pub mod stats;
pub mod translation;

pub use config::ReplicateConfig;
pub use dumper::{Dumper, Replicant};
pub use error::{Error, Result};
pub use filter::{Entry, Filter, FilterChain, Finish, Stage, Verdict};
pub use loader::Loader;
pub use record::{Attributes, Id, Record, Reference, Target, Value};
pub use registry::{Reconstruct, Reconstructed, TypeRegistry};
pub use stats::Stats;
pub use translation::TranslationTable;
