//! Ephemeral, isolated object-storage fixtures for integration testing.
//!
//! This crate provides:
//! - Supervision of the mock storage server as a subprocess, with
//!   health-waited startup, bounded retries and graceful teardown
//! - A registry of live logical buckets sharing one backing server, with
//!   reference-counted cleanup
//! - A permission controller that escalates a permissive mock backend into
//!   access-controlled mode without disturbing already-issued credentials
//! - Fixture factories selecting between the mock backend, a pre-existing
//!   real cloud bucket, and a fault-simulating configuration
//!
//! Orchestration is deliberately single-threaded: callers issue one awaited
//! operation at a time, and cross-process isolation comes from per-factory
//! ephemeral ports and working directories rather than locking.

pub mod client;
pub mod error;
pub mod factory;
pub mod logging;
pub mod permissions;
pub mod process;
pub mod registry;
pub mod tls;
pub mod util;

pub use client::{AdminClient, ObjectAccess};
pub use error::{HarnessError, HarnessResult};
pub use factory::{
    ErrorSimulationFactory, FixtureFactory, MockFactoryConfig, MockFixtureFactory,
    PermissionCapable, RealCloudConfig, RealCloudFactory,
};
pub use permissions::PermissionController;
pub use process::{HealthProbe, HttpProbe, MockServerConfig, MockServerProcess};
pub use registry::{BucketEntry, BucketRegistry, EndpointInfo};
pub use tls::{TlsMaterial, TlsProvisioner};
