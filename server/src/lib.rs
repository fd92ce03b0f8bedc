pub mod actions;
pub mod auth;
pub mod clients;
pub mod db;
pub mod error;
pub mod handlers;
pub mod health;
pub mod jobs;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod realtime;
pub mod store;
pub mod unwind;

use std::sync::Arc;

/// Shared handles to the injected collaborators; each is a trait object so
/// tests can substitute doubles per component.
pub type SharedStore = Arc<dyn store::MessageStore>;
pub type SharedBlobStore = Arc<dyn clients::BlobStore>;
pub type SharedLedger = Arc<dyn clients::Ledger>;
pub type SharedIndex = Arc<dyn clients::MetadataIndex>;
