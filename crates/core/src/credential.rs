//! Credential records issued by the identity backend.

use serde::{Deserialize, Serialize};

/// An access credential: key id, secret, and the name of the user it was
/// issued to.
///
/// Immutable once issued. A credential stops working when the issuing user is
/// deleted or the owning server process terminates; nothing revokes it
/// explicitly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Access key id presented by clients.
    pub id: String,
    /// Secret paired with the key id.
    pub secret: String,
    /// Display name of the owning user.
    pub display_name: String,
}

impl Credential {
    /// Create a credential record.
    pub fn new(
        id: impl Into<String>,
        secret: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            secret: secret.into(),
            display_name: display_name.into(),
        }
    }

    /// The permissive default identity every mock server accepts until
    /// permission enforcement is switched on.
    pub fn fixture_default() -> Self {
        Self::new("awd", "awd", "dummy")
    }

    /// Whether this is the fixed default identity.
    pub fn is_fixture_default(&self) -> bool {
        *self == Self::fixture_default()
    }
}
