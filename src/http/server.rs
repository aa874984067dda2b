//! HTTP listener.

use async_trait::async_trait;
use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::timeout::{RequestBodyTimeoutLayer, TimeoutLayer};
use tower_http::trace::TraceLayer;

use super::listener::IdleTimeoutListener;
use super::{create_router, ApiError};
use crate::lifecycle::ProtocolServer;
use crate::service::ConvertService;
use crate::types::{Error, HttpConfig, Result};

/// REST front end for the conversion service.
#[derive(Debug)]
pub struct HttpServer {
    service: ConvertService,
    config: HttpConfig,
}

impl HttpServer {
    pub fn new(service: ConvertService, config: HttpConfig) -> Self {
        Self { service, config }
    }

    /// Router with request logging, permissive CORS, the body read and
    /// response timeouts, and early termination of every open request once
    /// `abandon` is cancelled.
    pub fn build_router(&self, abandon: CancellationToken) -> Router {
        create_router(self.service.clone())
            .layer(middleware::from_fn_with_state(abandon, abandon_on_stop))
            .layer(RequestBodyTimeoutLayer::new(self.config.read_timeout))
            .layer(TimeoutLayer::new(self.config.write_timeout))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
    }
}

/// Race the handler against `abandon`.
async fn abandon_on_stop(
    State(abandon): State<CancellationToken>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    tokio::select! {
        response = next.run(request) => response,
        _ = abandon.cancelled() => {
            tracing::warn!(path = %path, "http_request_abandoned");
            ApiError(Error::internal("request abandoned: server stopped")).into_response()
        }
    }
}

#[async_trait]
impl ProtocolServer for HttpServer {
    fn protocol(&self) -> &'static str {
        "http"
    }

    fn address(&self) -> String {
        self.config.address()
    }

    /// Serve until `shutdown`; axum then stops accepting and waits for open
    /// requests to complete. Dropping this future (a forced stop) cancels
    /// `abandon`, which ends every request still running.
    async fn serve(&self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        let abandon = CancellationToken::new();
        let _abandon_on_drop = abandon.clone().drop_guard();

        let listener = IdleTimeoutListener::new(listener, self.config.idle_timeout);
        axum::serve(listener, self.build_router(abandon))
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await?;
        tracing::info!("http_drained");
        Ok(())
    }
}
