//! HTTP surface for the gateway.
//!
//! JSON endpoints mapping one-to-one onto the gateway operations:
//!
//! | Method | Path | Operation |
//! |---|---|---|
//! | GET | `/` | health |
//! | POST | `/convert/path` | convert a server-resident file |
//! | POST | `/convert/content` | convert an inline payload |
//! | GET | `/formats` | list supported formats |
//! | GET | `/info` | service information |
//! | POST | `/admin/sweep` | remove old output artifacts |
//!
//! Conversion endpoints always answer with a [`crate::ToolResponse`] body; the
//! HTTP status mirrors the error category.

mod handlers;
mod routes;

pub use handlers::status_for;
pub use routes::create_router;

use crate::gateway::Gateway;
use std::future::Future;
use std::net::SocketAddr;

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Gateway,
}

impl AppState {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }
}

/// Serve until `shutdown` resolves, then finish in-flight requests.
pub async fn serve<F>(gateway: Gateway, addr: SocketAddr, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(AppState::new(gateway));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Starting server at http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
