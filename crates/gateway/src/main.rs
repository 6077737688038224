//! Sahay API Gateway
//!
//! The main entry point for all external API requests.
//! Handles:
//! - Session lifecycle (create, inspect, expire)
//! - Document upload and session actions
//! - Rate limiting
//! - Observability (logging, metrics)

mod handlers;
mod middleware;
mod registry;

use axum::{
    extract::DefaultBodyLimit,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use registry::SessionRegistry;
use sahay_common::{
    config::{AppConfig, ObservabilityConfig},
    llm, metrics,
    session::{NegotiationSettings, SessionController},
};
use sahay_ingestion::PdfTextExtractor;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub controller: Arc<SessionController>,
    pub sessions: Arc<SessionRegistry>,
    pub metrics: Option<PrometheusHandle>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load()?;

    // Initialize tracing
    init_tracing(&config.observability);

    info!(
        service = %config.observability.service_name,
        "Starting Sahay API Gateway v{}",
        sahay_common::VERSION
    );

    config.validate().map_err(|e| {
        error!(error = %e, "Invalid configuration");
        e
    })?;

    let config = Arc::new(config);

    // Initialize metrics
    let metrics_handle = if config.observability.metrics_enabled {
        let handle = install_metrics_recorder()?;
        metrics::register_metrics();
        Some(handle)
    } else {
        None
    };

    // Initialize the session engine
    let backend = llm::create_backend(&config.llm)?;
    info!(
        provider = %config.llm.provider,
        model = backend.model_name(),
        "Generative backend ready"
    );

    let controller = SessionController::new(backend, Arc::new(PdfTextExtractor))
        .with_negotiation(NegotiationSettings {
            counterparty: config.negotiation.counterparty.clone(),
            ..NegotiationSettings::default()
        });

    let sessions = Arc::new(SessionRegistry::new(
        config.session_idle_timeout(),
        config.session.max_sessions,
    ));
    sessions.spawn_sweeper(Duration::from_secs(config.session.sweep_interval_secs.max(1)));

    // Create app state
    let state = AppState {
        config: config.clone(),
        controller: Arc::new(controller),
        sessions,
        metrics: metrics_handle,
    };

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let (stopping_tx, mut stopping_rx) = tokio::sync::watch::channel(false);
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        let _ = stopping_tx.send(true);
    });
    let mut server = tokio::spawn(server.into_future());

    let grace = config.shutdown_timeout();
    tokio::select! {
        result = &mut server => result??,
        _ = async {
            let _ = stopping_rx.wait_for(|stopping| *stopping).await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(timeout_secs = grace.as_secs(), "Shutdown timeout elapsed, dropping open connections");
            server.abort();
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logging {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn install_metrics_recorder() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("request_duration_seconds".to_string()),
            metrics::LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Suffix("backend_duration_seconds".to_string()),
            metrics::BACKEND_BUCKETS,
        )?
        .install_recorder()?;

    let upkeep = handle.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(5));
        loop {
            ticker.tick().await;
            upkeep.run_upkeep();
        }
    });

    Ok(handle)
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // Session endpoints
    let mut session_routes = Router::new()
        .route("/sessions", post(handlers::sessions::create_session))
        .route(
            "/sessions/{id}",
            get(handlers::sessions::get_session).delete(handlers::sessions::delete_session),
        )
        .route(
            "/sessions/{id}/document",
            post(handlers::documents::upload_document).get(handlers::documents::get_document),
        )
        .route("/sessions/{id}/explanation", post(handlers::artifacts::explain))
        .route("/sessions/{id}/summary", post(handlers::artifacts::summarize))
        .route("/sessions/{id}/assistant/messages", post(handlers::chat::ask_assistant))
        .route("/sessions/{id}/assistant/retry", post(handlers::chat::retry_assistant))
        .route("/sessions/{id}/negotiation/clause", post(handlers::chat::find_clause))
        .route("/sessions/{id}/negotiation/messages", post(handlers::chat::negotiate))
        .route("/sessions/{id}/negotiation/retry", post(handlers::chat::retry_negotiation))
        .layer(DefaultBodyLimit::max(state.config.server.max_upload_bytes));

    let limits = &state.config.rate_limit;
    if limits.enabled {
        let limiter =
            middleware::rate_limit::create_rate_limiter(limits.requests_per_second, limits.burst);
        session_routes = session_routes.route_layer(from_fn_with_state(
            limiter,
            middleware::rate_limit::rate_limit_middleware,
        ));
    }

    // API routes
    let api_routes = Router::new()
        // Health endpoints (no rate limit)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .route("/metrics", get(handlers::health::metrics))
        .merge(session_routes)
        .route_layer(from_fn(middleware::metrics::track_metrics));

    // Compose the app
    Router::new()
        .nest("/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use sahay_common::{
        document::{ExtractedText, TextExtractor},
        errors::AppError,
        llm::MockBackend,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    /// Treats anything after the `%PDF-` marker as the document text
    struct StubExtractor;

    impl TextExtractor for StubExtractor {
        fn extract(&self, bytes: &[u8]) -> sahay_common::Result<ExtractedText> {
            let body = bytes.strip_prefix(b"%PDF-").ok_or_else(|| AppError::Extraction {
                message: "not a PDF".to_string(),
            })?;
            Ok(ExtractedText {
                text: String::from_utf8_lossy(body).trim().to_string(),
                page_count: 1,
                skipped_pages: Vec::new(),
            })
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    struct TestApp {
        router: Router,
        backend: Arc<MockBackend>,
        sessions: Arc<SessionRegistry>,
    }

    fn test_app() -> TestApp {
        let mut config = AppConfig::default();
        config.llm.provider = "mock".to_string();
        config.server.max_upload_bytes = 1024;

        let backend = Arc::new(MockBackend::new());
        let controller = SessionController::new(backend.clone(), Arc::new(StubExtractor));
        let sessions = Arc::new(SessionRegistry::new(Duration::from_secs(60), 8));

        let state = AppState {
            config: Arc::new(config),
            controller: Arc::new(controller),
            sessions: sessions.clone(),
            metrics: None,
        };

        TestApp {
            router: create_router(state),
            backend,
            sessions,
        }
    }

    impl TestApp {
        async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let body = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap_or(Value::Null)
            };
            (status, body)
        }

        async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
            let request = Request::post(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap();
            self.send(request).await
        }

        async fn post_empty(&self, uri: &str) -> (StatusCode, Value) {
            self.send(Request::post(uri).body(Body::empty()).unwrap()).await
        }

        async fn get(&self, uri: &str) -> (StatusCode, Value) {
            self.send(Request::get(uri).body(Body::empty()).unwrap()).await
        }

        async fn create_session(&self) -> String {
            let (status, body) = self.post_empty("/v1/sessions").await;
            assert_eq!(status, StatusCode::CREATED);
            body["session_id"].as_str().unwrap().to_string()
        }

        async fn upload(&self, id: &str, text: &str) -> (StatusCode, Value) {
            let request = Request::post(format!("/v1/sessions/{}/document", id))
                .header(header::CONTENT_TYPE, "application/pdf")
                .header("x-file-name", "lease.pdf")
                .body(Body::from(format!("%PDF-{}", text)))
                .unwrap();
            self.send(request).await
        }
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app();
        let (status, body) = app.get("/v1/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_ready_reports_capacity() {
        let app = test_app();
        let (status, body) = app.get("/v1/ready").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["checks"]["backend"]["detail"], "mock-generative");
        assert_eq!(body["checks"]["sessions"]["detail"], "0/8");
    }

    #[tokio::test]
    async fn test_metrics_disabled() {
        let app = test_app();
        let (status, _) = app.get("/v1/metrics").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_full_session_flow() {
        let app = test_app();
        let id = app.create_session().await;

        let (status, body) = app.upload(&id, "Tenant pays rent on the 1st.").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["document"]["file_name"], "lease.pdf");

        app.backend.push_reply("A one-year lease.");
        let (status, body) = app
            .post_empty(&format!("/v1/sessions/{}/summary", id))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["artifact"]["text"], "A one-year lease.");

        app.backend.push_reply("On the 1st.");
        let (status, body) = app
            .post_json(
                &format!("/v1/sessions/{}/assistant/messages", id),
                json!({"text": "When is rent due?"}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reply"], "On the 1st.");
        assert_eq!(body["conversation"]["turns"].as_array().unwrap().len(), 2);

        app.backend.push_reply("\"Deposit is non-refundable.\"");
        let (status, body) = app
            .post_empty(&format!("/v1/sessions/{}/negotiation/clause", id))
            .await;
        assert_eq!(status, StatusCode::OK);
        // Persona turn stays hidden; only the greeting is visible
        assert_eq!(body["conversation"]["turns"].as_array().unwrap().len(), 1);

        app.backend.push_reply("I can return half.");
        let (status, body) = app
            .post_json(
                &format!("/v1/sessions/{}/negotiation/messages", id),
                json!({"text": "I want the deposit back."}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reply"], "I can return half.");

        let (status, body) = app.get(&format!("/v1/sessions/{}", id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"]["summary"]["text"], "A one-year lease.");
        assert_eq!(
            body["state"]["negotiation_chat"]["turns"].as_array().unwrap().len(),
            3
        );

        let (status, body) = app.get(&format!("/v1/sessions/{}/document", id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["text"], "Tenant pays rent on the 1st.");
    }

    #[tokio::test]
    async fn test_new_document_resets_session() {
        let app = test_app();
        let id = app.create_session().await;
        app.upload(&id, "First lease.").await;

        app.post_empty(&format!("/v1/sessions/{}/summary", id)).await;
        app.post_json(
            &format!("/v1/sessions/{}/assistant/messages", id),
            json!({"text": "Who is the tenant?"}),
        )
        .await;

        let (status, _) = app.upload(&id, "Second lease.").await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = app.get(&format!("/v1/sessions/{}", id)).await;
        assert!(body["state"]["summary"].is_null());
        assert!(body["state"]["assistant_chat"]["turns"]
            .as_array()
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_blank_question_is_silent() {
        let app = test_app();
        let id = app.create_session().await;
        app.upload(&id, "Lease.").await;

        let (status, body) = app
            .post_json(
                &format!("/v1/sessions/{}/assistant/messages", id),
                json!({"text": "   "}),
            )
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(body.is_null());
        assert_eq!(app.backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_action_without_document() {
        let app = test_app();
        let id = app.create_session().await;

        let (status, body) = app
            .post_empty(&format!("/v1/sessions/{}/summary", id))
            .await;
        assert_eq!(status, StatusCode::PRECONDITION_FAILED);
        assert_eq!(body["error"]["retriable"], false);
    }

    #[tokio::test]
    async fn test_negotiate_before_clause() {
        let app = test_app();
        let id = app.create_session().await;
        app.upload(&id, "Lease.").await;

        let (status, _) = app
            .post_json(
                &format!("/v1/sessions/{}/negotiation/messages", id),
                json!({"text": "Hello"}),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_backend_failure_then_retry() {
        let app = test_app();
        let id = app.create_session().await;
        app.upload(&id, "Lease.").await;

        app.backend.push_failure("upstream unavailable");
        let (status, body) = app
            .post_json(
                &format!("/v1/sessions/{}/assistant/messages", id),
                json!({"text": "Is there a pet clause?"}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["retriable"], true);

        let (_, body) = app.get(&format!("/v1/sessions/{}", id)).await;
        assert_eq!(body["state"]["assistant_chat"]["awaiting_reply"], true);

        app.backend.push_reply("No pets allowed.");
        let (status, body) = app
            .post_empty(&format!("/v1/sessions/{}/assistant/retry", id))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reply"], "No pets allowed.");
        assert_eq!(body["conversation"]["turns"].as_array().unwrap().len(), 2);
        assert_eq!(body["conversation"]["awaiting_reply"], false);
    }

    #[tokio::test]
    async fn test_concurrent_action_conflicts() {
        let app = test_app();
        let id = app.create_session().await;
        app.upload(&id, "Lease.").await;

        let session_id = id.parse().unwrap();
        let _pending = app.sessions.begin_action(session_id, "summary").await.unwrap();

        let (status, body) = app
            .post_empty(&format!("/v1/sessions/{}/summary", id))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["retriable"], true);
    }

    #[tokio::test]
    async fn test_upload_rejections() {
        let app = test_app();
        let id = app.create_session().await;

        let request = Request::post(format!("/v1/sessions/{}/document", id))
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from("%PDF-text"))
            .unwrap();
        let (status, _) = app.send(request).await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let request = Request::post(format!("/v1/sessions/{}/document", id))
            .header(header::CONTENT_TYPE, "application/pdf")
            .body(Body::from("plain words"))
            .unwrap();
        let (status, _) = app.send(request).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let request = Request::post(format!("/v1/sessions/{}/document", id))
            .header(header::CONTENT_TYPE, "application/pdf")
            .body(Body::from(vec![b'%'; 4096]))
            .unwrap();
        let (status, _) = app.send(request).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_unknown_and_deleted_sessions() {
        let app = test_app();
        let (status, _) = app
            .get(&format!("/v1/sessions/{}", uuid::Uuid::new_v4()))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let id = app.create_session().await;
        let request = Request::delete(format!("/v1/sessions/{}", id))
            .body(Body::empty())
            .unwrap();
        let (status, _) = app.send(request).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = app.get(&format!("/v1/sessions/{}", id)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
