//! Core data types for the shoal storage-fixture harness.
//!
//! This crate provides:
//! - Connection descriptors ("storage URIs") identifying an endpoint, bucket
//!   and credentials, with a round-trippable string encoding
//! - Credential records issued by the mock identity backend
//! - Access-policy documents shared between the harness and the mock server
//! - The client-environment configuration handed to the storage client under
//!   test

pub mod config;
pub mod credential;
pub mod descriptor;
pub mod error;
pub mod policy;

pub use config::ClientEnvironment;
pub use credential::Credential;
pub use descriptor::ConnectionDescriptor;
pub use error::{Error, Result};
pub use policy::{Effect, PolicyDocument, Statement};
