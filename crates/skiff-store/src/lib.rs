//! # SKIFF Store
//!
//! Object metadata documents and the document-store adapter.
//!
//! The store itself is a collaborator: any backend exposing
//! [`DocumentStore`] works (the production deployment uses a MongoDB
//! collection). This crate defines the record schema, the adapter trait, and
//! an in-process [`MemoryStore`] reference implementation used by tests and
//! single-node deployments.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod document;
pub mod error;
pub mod store;

pub use document::{AuditEvent, AuditKind, ObjectDocument};
pub use error::StoreError;
pub use store::{DocumentStore, MemoryStore};
