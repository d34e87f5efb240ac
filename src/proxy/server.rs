//! Reload proxy server.
//!
//! # Responsibilities
//! - Create Axum Router with the reload client, control channel and proxy
//! - Wire up middleware (tracing, request timeout)
//! - Bind the local listener and serve in the background
//! - Forward requests to the upstream backend
//! - Inject the reload client into HTML responses

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, HeaderValue, Method, Request, StatusCode, Version},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use futures_util::{stream, StreamExt};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::ProxyConfig;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::proxy::inject::{self, CLIENT_PATH, CLIENT_SCRIPT, WS_PATH};
use crate::proxy::reload::ReloadHub;
use crate::proxy::upstream::{Upstream, UpstreamError};
use crate::proxy::websocket::ws_handler;

/// How long `stop` waits for in-flight requests before aborting the server.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Connection-level headers that must not be forwarded in either direction.
const HOP_BY_HOP: [header::HeaderName; 6] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
];

/// Error type for proxy setup.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("'{0}' is not a valid bind address")]
    BindAddress(String),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub upstream: Arc<Upstream>,
    pub client: Client<HttpConnector, Body>,
    pub hub: ReloadHub,
    pub inject_client: bool,
    pub max_html_bytes: usize,
}

/// Local HTTP listener that forwards to the upstream and drives browser reloads.
pub struct ReloadProxy {
    router: Router,
    bind_address: SocketAddr,
    upstream: Arc<Upstream>,
}

impl ReloadProxy {
    /// Create a proxy for the given configuration. Nothing is bound yet.
    pub fn new(config: ProxyConfig, hub: ReloadHub) -> Result<Self, ProxyError> {
        let bind_address: SocketAddr = config
            .bind_address
            .parse()
            .map_err(|_| ProxyError::BindAddress(config.bind_address.clone()))?;
        let upstream = Arc::new(Upstream::parse(&config.upstream)?);

        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        let state = AppState {
            upstream: upstream.clone(),
            client,
            hub,
            inject_client: config.inject_client,
            max_html_bytes: config.max_html_bytes,
        };

        let router = Self::build_router(&config, state);
        Ok(Self {
            router,
            bind_address,
            upstream,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .route(CLIENT_PATH, get(client_script))
            .route(WS_PATH, get(ws_handler))
            .fallback(proxy_handler)
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the configured address and start serving.
    ///
    /// Returns once the listener is bound, which is the proxy task's
    /// completion signal. The upstream may or may not be up yet.
    pub async fn start(self) -> Result<ProxyHandle, ProxyError> {
        let addr = self.bind_address;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ProxyError::Bind { addr, source })?;
        self.serve(listener)
    }

    /// Start serving on an already bound listener.
    pub fn serve(self, listener: TcpListener) -> Result<ProxyHandle, ProxyError> {
        let local_addr = listener.local_addr().map_err(|source| ProxyError::Bind {
            addr: self.bind_address,
            source,
        })?;

        tracing::info!(
            address = %local_addr,
            upstream = %self.upstream,
            "Reload proxy listening"
        );

        let shutdown = Shutdown::new();
        let mut stop_rx = shutdown.subscribe();
        let router = self.router;

        let task = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = stop_rx.recv().await;
                })
                .await
        });

        Ok(ProxyHandle {
            local_addr,
            upstream: self.upstream,
            shutdown,
            task,
        })
    }

    pub fn upstream(&self) -> &Upstream {
        &self.upstream
    }
}

/// A running proxy listener.
pub struct ProxyHandle {
    local_addr: SocketAddr,
    upstream: Arc<Upstream>,
    shutdown: Shutdown,
    task: JoinHandle<Result<(), std::io::Error>>,
}

impl ProxyHandle {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn upstream(&self) -> &Upstream {
        &self.upstream
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop accepting connections and wait briefly for in-flight requests.
    pub async fn stop(self) {
        self.shutdown.trigger();

        let abort = self.task.abort_handle();
        match tokio::time::timeout(STOP_GRACE, self.task).await {
            Ok(Ok(Ok(()))) => tracing::info!(address = %self.local_addr, "Reload proxy stopped"),
            Ok(Ok(Err(e))) => tracing::error!(error = %e, "Reload proxy exited with error"),
            Ok(Err(e)) => tracing::error!(error = %e, "Reload proxy task failed"),
            Err(_) => {
                tracing::warn!("Reload proxy did not drain in time, aborting");
                abort.abort();
            }
        }
    }
}

async fn client_script() -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "application/javascript; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        CLIENT_SCRIPT,
    )
}

/// Forward any other request to the upstream.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    tracing::debug!(method = %method, path = %path, "Proxying request");

    let (mut parts, body) = request.into_parts();
    parts.uri = state.upstream.rewrite(&parts.uri);
    parts.version = Version::HTTP_11;
    strip_hop_by_hop(&mut parts.headers);
    if let Ok(host) = HeaderValue::from_str(state.upstream.authority().as_str()) {
        parts.headers.insert(header::HOST, host);
    }
    if state.inject_client {
        // HTML must come back uncompressed to be rewritten.
        parts.headers.remove(header::ACCEPT_ENCODING);
    }

    let response = match state.client.request(Request::from_parts(parts, body)).await {
        Ok(response) => finish_response(&state, &method, response).await,
        Err(e) => {
            tracing::warn!(
                method = %method,
                path = %path,
                upstream = %state.upstream,
                error = %e,
                "Upstream request failed"
            );
            upstream_unavailable(&state.upstream)
        }
    };

    metrics::record_proxy_request(method.as_str(), response.status().as_u16(), start_time);
    response
}

/// Pass the upstream response through, injecting the client into HTML.
async fn finish_response(state: &AppState, method: &Method, response: Response<Incoming>) -> Response {
    let (mut parts, body) = response.into_parts();
    strip_hop_by_hop(&mut parts.headers);

    // Error pages are HTML too and need the client most.
    let has_body = *method != Method::HEAD
        && parts.status != StatusCode::NO_CONTENT
        && parts.status != StatusCode::NOT_MODIFIED;
    let declared_len = parts
        .headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    let fits = declared_len.map_or(true, |len| len <= state.max_html_bytes);

    if !(state.inject_client && has_body && fits && inject::is_injectable(&parts.headers)) {
        return Response::from_parts(parts, Body::new(body));
    }

    let mut chunks = Body::new(body).into_data_stream();
    let mut buffered = Vec::new();
    while let Some(chunk) = chunks.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to buffer HTML response for injection");
                return upstream_unavailable(&state.upstream);
            }
        };

        if buffered.len() + chunk.len() > state.max_html_bytes {
            tracing::debug!(
                limit = state.max_html_bytes,
                "HTML response too large for injection, streaming unmodified"
            );
            let head = stream::iter([Ok::<_, axum::Error>(Bytes::from(buffered)), Ok(chunk)]);
            return Response::from_parts(parts, Body::from_stream(head.chain(chunks)));
        }
        buffered.extend_from_slice(&chunk);
    }

    let injected = inject::inject_script(&buffered);
    parts
        .headers
        .insert(header::CONTENT_LENGTH, HeaderValue::from(injected.len()));
    Response::from_parts(parts, Body::from(injected))
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }
    headers.remove("keep-alive");
    headers.remove("proxy-connection");
}

fn upstream_unavailable(upstream: &Upstream) -> Response {
    (
        StatusCode::BAD_GATEWAY,
        Html(format!(
            "<!doctype html><title>devsync</title><h1>502 Bad Gateway</h1>\
             <p>Could not reach {upstream}. Is the development server still starting? \
             This page reloads once files change; reload it by hand otherwise.</p>{}",
            inject::script_tag()
        )),
    )
        .into_response()
}
