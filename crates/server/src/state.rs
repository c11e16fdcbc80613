//! Shared mock-backend state.

use crate::iam::IamState;
use crate::store::StoreState;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Auth-enforcement grace counter.
///
/// Set through the `/reset-auth` control endpoint: the value is the number of
/// requests remaining before the server starts checking credentials. `"inf"`
/// means never, `"0"` means enforce immediately.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthGrace {
    /// Credentials are never checked.
    Unlimited,
    /// Credentials are checked once this reaches zero.
    Remaining(u64),
}

impl AuthGrace {
    /// Parse the plain-text body of a `/reset-auth` request.
    pub fn parse(body: &str) -> Option<Self> {
        let body = body.trim();
        if body.eq_ignore_ascii_case("inf") {
            return Some(Self::Unlimited);
        }
        body.parse::<u64>().ok().map(Self::Remaining)
    }

    /// Whether enforcement is currently active.
    pub fn enforcing(&self) -> bool {
        matches!(self, Self::Remaining(0))
    }
}

/// Everything the mock server knows, behind one lock.
#[derive(Debug)]
pub struct Backend {
    pub store: StoreState,
    pub iam: IamState,
    pub auth_grace: AuthGrace,
    /// Requests remaining before every counted request is throttled.
    /// `None` disables throttling.
    pub requests_until_throttle: Option<u64>,
}

impl Default for Backend {
    fn default() -> Self {
        Self {
            store: StoreState::default(),
            iam: IamState::default(),
            auth_grace: AuthGrace::Unlimited,
            requests_until_throttle: None,
        }
    }
}

/// Shared application state.
#[derive(Clone, Default)]
pub struct AppState {
    backend: Arc<Mutex<Backend>>,
}

impl AppState {
    /// Create a fresh, permissive backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the backend for the duration of one operation.
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, Backend> {
        self.backend.lock().await
    }
}
