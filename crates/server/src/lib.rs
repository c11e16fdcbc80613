//! Mock object-storage and identity server for shoal fixtures.
//!
//! One process serves two colocated backends on a single port, selected by
//! the request's `Host` header: an object-storage API and an IAM-like
//! identity API. On top of those it exposes the control endpoints test
//! harnesses drive: a health probe, full and auth-only resets, and an
//! injectable request throttle for exercising client retry logic.
//!
//! Nothing here is durable; the whole backend lives in memory and exists to
//! make storage-dependent tests hermetic.

pub mod control;
pub mod dispatch;
pub mod error;
pub mod iam;
pub mod routes;
pub mod state;
pub mod store;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
