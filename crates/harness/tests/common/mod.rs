//! Harness test utilities: an in-process mock server.
//!
//! Registry and permission logic only care about the HTTP surface, so most
//! tests run the server inside the test process on an ephemeral port. The
//! subprocess path is covered separately by the end-to-end tests.

use shoal_core::Credential;
use shoal_harness::{AdminClient, BucketRegistry, EndpointInfo, PermissionController};
use shoal_server::{create_router, AppState};

/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct InProcessServer {
    pub port: u16,
    handle: tokio::task::JoinHandle<()>,
}

#[allow(dead_code)]
impl InProcessServer {
    pub async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0))
            .await
            .expect("failed to bind test listener");
        let port = listener.local_addr().expect("no local addr").port();
        let app = create_router(AppState::new());
        let handle = tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .await
                .expect("in-process server failed");
        });
        Self { port, handle }
    }

    pub fn endpoint(&self) -> String {
        format!("http://localhost:{}", self.port)
    }

    pub fn iam_endpoint(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// A client bound to the permissive default credential.
    pub fn admin_client(&self) -> AdminClient {
        AdminClient::new(
            self.endpoint(),
            self.iam_endpoint(),
            Credential::fixture_default(),
            None,
        )
        .expect("failed to build admin client")
    }

    /// A client bound to an arbitrary credential.
    pub fn client_for(&self, credential: Credential) -> AdminClient {
        AdminClient::new(self.endpoint(), self.iam_endpoint(), credential, None)
            .expect("failed to build client")
    }

    /// A fresh registry over this server.
    pub fn registry(&self) -> BucketRegistry {
        BucketRegistry::new(
            PermissionController::new(self.admin_client()),
            EndpointInfo {
                host: "localhost".to_string(),
                port: self.port,
                use_tls: false,
                ca_cert_path: None,
                region: "us-east-1".to_string(),
            },
            None,
            false,
        )
    }
}

impl Drop for InProcessServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
