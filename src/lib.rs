//! YAM marketplace indexer library
//!
//! Continuously ingests RealToken YAM marketplace events on Gnosis
//! Chain into a local SQLite store and answers historical trading
//! queries over it.

pub mod catalog;
pub mod cli;
pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod indexer;
pub mod rpc;
pub mod store;
pub mod subgraph;
pub mod tokens;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{Result, YamError};
pub use events::{EventKind, EventPayload, YamEvent};
pub use store::queries::Role;
pub use store::status::OfferStatus;
pub use store::EventStore;
