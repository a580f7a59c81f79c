//! HTTP server integration.
//!
//! An app tree becomes an [`axum::Router`] with [`App::into_router`]; every
//! request, whatever its path, is forwarded to [`App::dispatch_with`].
//! [`App::serve`] binds the configured address and runs the router until
//! Ctrl-C.
//!
//! # Examples
//!
//! ```no_run
//! use grove_app::{App, Options};
//! use grove_http::HttpResponse;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let app = App::new(Options::new().with_addr("127.0.0.1:8000"));
//! app.get("/", |_ctx| async { Ok(HttpResponse::ok("Hello!")) })?;
//!
//! app.serve().await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;

use axum::body::Body;
use axum::extract::Request;
use axum::response::IntoResponse;
use axum::routing::any;
use http::StatusCode;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use grove_core::{GroveError, GroveResult};
use grove_http::{HttpRequest, HttpResponse};

use crate::app::App;

impl App {
    /// Converts the tree into an Axum router and freezes it.
    pub fn into_router(&self) -> axum::Router {
        self.mark_serving();
        let app = self.root();

        let handler = move |req: Request<Body>| {
            let app = app.clone();
            async move {
                let (parts, body) = req.into_parts();
                let body = match axum::body::to_bytes(body, usize::MAX).await {
                    Ok(bytes) => bytes.to_vec(),
                    Err(e) => {
                        tracing::debug!(error = %e, "failed to read request body");
                        return HttpResponse::plain(StatusCode::BAD_REQUEST, "invalid request body")
                            .into_response();
                    }
                };
                let request = HttpRequest::from_axum(parts, body);

                // Dropping this future before it completes cancels the token.
                let cancel = CancellationToken::new();
                let guard = cancel.clone().drop_guard();
                let response = app.dispatch_with(request, cancel).await;
                guard.disarm();
                response.into_response()
            }
        };

        axum::Router::new()
            .route("/{*path}", any(handler.clone()))
            .route("/", any(handler))
    }

    /// Sets up logging, binds the configured address and serves until Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns [`GroveError::ImproperlyConfigured`] if the address cannot be
    /// bound, or [`GroveError::Internal`] if the server fails.
    pub async fn serve(&self) -> GroveResult<()> {
        let options = self.root().options();
        grove_core::logging::setup_logging(options.log_level(), options.env());

        let addr = options.addr();
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            GroveError::ImproperlyConfigured(format!("failed to bind to {addr}: {e}"))
        })?;
        tracing::info!(name = %options.name(), env = %options.env(), "starting server at {}", options.host());

        self.serve_with_shutdown(listener, shutdown_signal()).await
    }

    /// Serves on an already bound listener until `signal` resolves.
    ///
    /// In-flight requests are allowed to finish after the signal.
    ///
    /// # Errors
    ///
    /// Returns [`GroveError::Internal`] if the server fails.
    pub async fn serve_with_shutdown<S>(&self, listener: TcpListener, signal: S) -> GroveResult<()>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let router = self.into_router();
        axum::serve(listener, router)
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| GroveError::Internal(format!("server error: {e}")))?;
        tracing::info!("server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl-C; serving until killed");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tower::ServiceExt;

    use super::*;
    use crate::options::Options;

    fn app() -> App {
        let app = App::new(Options::new().with_env("test"));
        app.get("/ping", |_ctx| async { Ok(HttpResponse::ok("pong")) })
            .unwrap();
        app.post("/echo", |ctx| async move {
            let body = String::from_utf8_lossy(ctx.request().body()).into_owned();
            Ok(HttpResponse::ok(body))
        })
        .unwrap();
        app
    }

    async fn call(router: axum::Router, request: Request<Body>) -> (StatusCode, String) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    #[tokio::test]
    async fn test_router_forwards_to_dispatch() {
        let app = app();
        let router = app.into_router();
        assert!(app.is_serving());

        let request = Request::builder().uri("/ping").body(Body::empty()).unwrap();
        let (status, body) = call(router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "pong");
    }

    #[tokio::test]
    async fn test_router_passes_body() {
        let router = app().into_router();
        let request = Request::builder()
            .method("POST")
            .uri("/echo")
            .body(Body::from("hello body"))
            .unwrap();
        let (status, body) = call(router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "hello body");
    }

    #[tokio::test]
    async fn test_router_renders_not_found() {
        let router = app().into_router();
        let request = Request::builder()
            .uri("/missing")
            .header("accept", "application/json")
            .body(Body::empty())
            .unwrap();
        let (status, body) = call(router, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["code"], 404);
    }

    #[tokio::test]
    async fn test_serve_invalid_address() {
        let app = App::new(Options::new().with_env("test").with_addr("invalid-address"));
        let result = app.serve().await;
        assert!(matches!(result, Err(GroveError::ImproperlyConfigured(_))));
    }

    #[tokio::test]
    async fn test_serve_with_shutdown_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = tokio::sync::oneshot::channel::<()>();

        let app = app();
        let server = tokio::spawn(async move {
            app.serve_with_shutdown(listener, async {
                let _ = stopped.await;
            })
            .await
        });

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /ping HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.unwrap();
        let raw = String::from_utf8_lossy(&raw);
        assert!(raw.starts_with("HTTP/1.1 200 OK"));
        assert!(raw.ends_with("pong"));

        stop.send(()).unwrap();
        server.await.unwrap().unwrap();
    }
}
