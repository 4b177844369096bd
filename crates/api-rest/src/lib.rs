//! # API REST
//!
//! REST API implementation for the consultation service.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - Streaming `text/event-stream` responses
//! - OpenAPI documentation
//! - REST-specific concerns (JSON rejections, CORS)
//!
//! Collaborators (credential verifier, completion source) are injected through [`AppState`] and
//! built once at startup by the binary.

#![warn(rust_2018_idioms)]

pub mod error;
pub mod handlers;

use std::sync::Arc;

use api_shared::{HealthRes, TokenVerifier};
use axum::{
    routing::{get, post},
    Json, Router,
};
use consult_core::{CompletionSource, VisitRequest};
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;

pub use error::{ApiError, ErrorBody};

/// Application state shared across request handlers
///
/// Both collaborators are read-only after startup and safe to share between concurrent
/// requests.
#[derive(Clone)]
pub struct AppState {
    pub(crate) verifier: Arc<dyn TokenVerifier>,
    pub(crate) completions: Arc<dyn CompletionSource>,
}

impl AppState {
    pub fn new(verifier: Arc<dyn TokenVerifier>, completions: Arc<dyn CompletionSource>) -> Self {
        Self {
            verifier,
            completions,
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(handlers::health, handlers::consultation),
    components(schemas(VisitRequest, HealthRes, ErrorBody))
)]
pub struct ApiDoc;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/consultation", post(handlers::consultation))
        .route(
            "/api-docs/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_shared::{AuthError, Claims};
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        response::Response,
    };
    use consult_core::{ConsultError, ConsultResult, DeltaChunk, DeltaStream, PromptPair};
    use http_body_util::BodyExt;
    use futures::channel::mpsc;
    use std::fmt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tower::ServiceExt;
    use tracing::field::{Field, Visit};
    use tracing::span::{Attributes, Id, Record};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
    use tracing_subscriber::registry::LookupSpan;

    const VALID_TOKEN: &str = "valid-token";

    #[derive(Default)]
    struct StubVerifier {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TokenVerifier for StubVerifier {
        async fn verify(&self, token: &str) -> Result<Claims, AuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if token == VALID_TOKEN {
                Ok(Claims {
                    sub: "user_test".into(),
                    exp: u64::MAX,
                    azp: None,
                })
            } else {
                Err(AuthError::InvalidToken("signature mismatch".into()))
            }
        }
    }

    /// Replays scripted deltas and records every call.
    enum Script {
        Chunks(Vec<Result<&'static str, &'static str>>),
        FailToOpen,
    }

    struct StubSource {
        script: Script,
        calls: AtomicUsize,
        last_prompt: Mutex<Option<PromptPair>>,
    }

    impl StubSource {
        fn new(script: Script) -> Self {
            Self {
                script,
                calls: AtomicUsize::new(0),
                last_prompt: Mutex::new(None),
            }
        }

        fn chunks(chunks: &[&'static str]) -> Self {
            Self::new(Script::Chunks(chunks.iter().copied().map(Ok).collect()))
        }
    }

    #[async_trait]
    impl CompletionSource for StubSource {
        async fn open(&self, prompt: &PromptPair) -> ConsultResult<DeltaStream> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_prompt.lock().unwrap() = Some(prompt.clone());

            match &self.script {
                Script::FailToOpen => Err(ConsultError::Upstream("502 Bad Gateway".into())),
                Script::Chunks(chunks) => {
                    let items: Vec<ConsultResult<DeltaChunk>> = chunks
                        .iter()
                        .map(|c| match c {
                            Ok(text) => Ok(DeltaChunk::text(*text)),
                            Err(msg) => Err(ConsultError::UpstreamStream(msg.to_string())),
                        })
                        .collect();
                    Ok(Box::pin(futures::stream::iter(items)))
                }
            }
        }
    }

    /// Hands out deltas as the test sends them.
    struct ChannelSource {
        deltas: Mutex<Option<mpsc::UnboundedReceiver<ConsultResult<DeltaChunk>>>>,
    }

    #[async_trait]
    impl CompletionSource for ChannelSource {
        async fn open(&self, _prompt: &PromptPair) -> ConsultResult<DeltaStream> {
            let deltas = self.deltas.lock().unwrap().take().expect("opened once");
            Ok(Box::pin(deltas))
        }
    }

    /// Fields recorded on `consultation` spans and the levels of events logged inside them.
    #[derive(Clone, Default)]
    struct ConsultationSpans {
        fields: Arc<Mutex<Vec<(String, String)>>>,
        event_levels: Arc<Mutex<Vec<tracing::Level>>>,
    }

    struct FieldSink<'a>(&'a mut Vec<(String, String)>);

    impl Visit for FieldSink<'_> {
        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            self.0.push((field.name().to_string(), format!("{value:?}")));
        }
    }

    impl<S> Layer<S> for ConsultationSpans
    where
        S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    {
        fn on_new_span(&self, attrs: &Attributes<'_>, _id: &Id, _ctx: Context<'_, S>) {
            if attrs.metadata().name() == "consultation" {
                attrs.record(&mut FieldSink(&mut self.fields.lock().unwrap()));
            }
        }

        fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
            if ctx.span(id).is_some_and(|span| span.name() == "consultation") {
                values.record(&mut FieldSink(&mut self.fields.lock().unwrap()));
            }
        }

        fn on_event(&self, event: &tracing::Event<'_>, ctx: Context<'_, S>) {
            let in_consultation = ctx
                .event_scope(event)
                .is_some_and(|mut scope| scope.any(|span| span.name() == "consultation"));
            if in_consultation {
                self.event_levels.lock().unwrap().push(*event.metadata().level());
            }
        }
    }

    impl ConsultationSpans {
        fn field(&self, name: &str) -> Option<String> {
            let fields = self.fields.lock().unwrap();
            fields.iter().find(|(n, _)| n == name).map(|(_, v)| v.clone())
        }
    }

    fn app(source: &Arc<StubSource>, verifier: &Arc<StubVerifier>) -> Router {
        router(AppState::new(verifier.clone(), source.clone()))
    }

    fn consultation_request(auth: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/consultation")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    const JANE: &str = r#"{"patient_name":"Jane Doe","date_of_visit":"2025-01-01","notes":"BP 120/80"}"#;

    async fn body_string(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn detail(response: Response) -> String {
        let body: ErrorBody = serde_json::from_str(&body_string(response).await).unwrap();
        body.detail
    }

    #[tokio::test]
    async fn health_needs_no_credentials() {
        let source = Arc::new(StubSource::chunks(&[]));
        let verifier = Arc::new(StubVerifier::default());

        let response = app(&source, &verifier)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, r#"{"status":"healthy"}"#);
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 0);
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_credential_never_reaches_upstream() {
        let source = Arc::new(StubSource::chunks(&["should not stream"]));
        let verifier = Arc::new(StubVerifier::default());

        let response = app(&source, &verifier)
            .oneshot(consultation_request(None, JANE))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(detail(response).await.contains("not authenticated"));
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 0);
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalid_credential_never_reaches_upstream() {
        let source = Arc::new(StubSource::chunks(&["should not stream"]));
        let verifier = Arc::new(StubVerifier::default());

        for auth in ["Bearer forged-token", "Basic dXNlcjpwYXNz"] {
            let response = app(&source, &verifier)
                .oneshot(consultation_request(Some(auth), JANE))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::FORBIDDEN, "{auth}");
        }
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn auth_is_checked_before_body() {
        let source = Arc::new(StubSource::chunks(&[]));
        let verifier = Arc::new(StubVerifier::default());

        let response = app(&source, &verifier)
            .oneshot(consultation_request(None, "{not json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn missing_field_is_rejected_before_upstream() {
        let source = Arc::new(StubSource::chunks(&["should not stream"]));
        let verifier = Arc::new(StubVerifier::default());

        let response = app(&source, &verifier)
            .oneshot(consultation_request(
                Some("Bearer valid-token"),
                r#"{"patient_name":"Jane Doe","date_of_visit":"2025-01-01"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(detail(response).await.contains("notes"));
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn malformed_json_is_rejected_before_upstream() {
        let source = Arc::new(StubSource::chunks(&[]));
        let verifier = Arc::new(StubVerifier::default());

        let response = app(&source, &verifier)
            .oneshot(consultation_request(Some("Bearer valid-token"), "{not json"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn streams_reframed_output() {
        let source = Arc::new(StubSource::chunks(&[
            "Hello",
            " world\nSecond",
            "",
            "Line1\n",
            "Line2",
        ]));
        let verifier = Arc::new(StubVerifier::default());

        let response = app(&source, &verifier)
            .oneshot(consultation_request(Some("Bearer valid-token"), JANE))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");
        assert_eq!(
            body_string(response).await,
            "data: Hello\n\n\
             data:  world\n\n\
             data:  \n\
             data: Second\n\n\
             data: Line1\n\n\
             data:  \n\
             data: \n\n\
             data: Line2\n\n"
        );
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn prompt_is_built_from_visit() {
        let source = Arc::new(StubSource::chunks(&["ok"]));
        let verifier = Arc::new(StubVerifier::default());

        let response = app(&source, &verifier)
            .oneshot(consultation_request(Some("Bearer valid-token"), JANE))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let prompt = source.last_prompt.lock().unwrap().clone().expect("prompt recorded");
        assert!(prompt.user.contains("Patient Name: Jane Doe"));
        assert!(prompt.user.contains("Date of Visit: 2025-01-01"));
        assert!(prompt.user.contains("BP 120/80"));
        assert_eq!(prompt.system, consult_core::SYSTEM_PROMPT);
    }

    #[tokio::test]
    async fn upstream_open_failure_is_bad_gateway() {
        let source = Arc::new(StubSource::new(Script::FailToOpen));
        let verifier = Arc::new(StubVerifier::default());

        let response = app(&source, &verifier)
            .oneshot(consultation_request(Some("Bearer valid-token"), JANE))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(detail(response).await.contains("502 Bad Gateway"));
    }

    #[tokio::test]
    async fn mid_stream_failure_aborts_body_after_sent_frames() {
        let source = Arc::new(StubSource::new(Script::Chunks(vec![
            Ok("partial\nline"),
            Err("connection reset"),
            Ok("never sent"),
        ])));
        let verifier = Arc::new(StubVerifier::default());

        let response = app(&source, &verifier)
            .oneshot(consultation_request(Some("Bearer valid-token"), JANE))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let mut body = response.into_body();
        let mut received = String::new();
        let mut failed = false;
        while let Some(frame) = body.frame().await {
            match frame {
                Ok(frame) => {
                    if let Ok(data) = frame.into_data() {
                        received.push_str(std::str::from_utf8(&data).unwrap());
                    }
                }
                Err(_) => {
                    failed = true;
                    break;
                }
            }
        }

        assert!(failed, "body must end with an error");
        assert_eq!(received, "data: partial\n\ndata:  \ndata: line\n\n");
    }

    #[tokio::test]
    async fn cors_allows_any_origin() {
        let source = Arc::new(StubSource::chunks(&[]));
        let verifier = Arc::new(StubVerifier::default());

        let response = app(&source, &verifier)
            .oneshot(
                Request::get("/health")
                    .header(header::ORIGIN, "http://localhost:3000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn openapi_document_lists_endpoints() {
        let source = Arc::new(StubSource::chunks(&[]));
        let verifier = Arc::new(StubVerifier::default());

        let response = app(&source, &verifier)
            .oneshot(
                Request::get("/api-docs/openapi.json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let doc: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert!(doc["paths"]["/health"].is_object());
        assert!(doc["paths"]["/api/consultation"]["post"].is_object());
        assert!(doc["components"]["schemas"]["VisitRequest"].is_object());
    }

    #[tokio::test]
    async fn frames_reach_client_while_upstream_is_open_and_disconnect_drops_it() {
        let (tx, rx) = mpsc::unbounded();
        let source = Arc::new(ChannelSource {
            deltas: Mutex::new(Some(rx)),
        });
        let verifier = Arc::new(StubVerifier::default());

        let response = router(AppState::new(verifier, source))
            .oneshot(consultation_request(Some("Bearer valid-token"), JANE))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        tx.unbounded_send(Ok(DeltaChunk::text("first"))).unwrap();
        let mut body = response.into_body();
        let frame = tokio::time::timeout(Duration::from_secs(2), body.frame())
            .await
            .expect("first frame arrives before upstream finishes")
            .expect("body still open")
            .unwrap();
        assert_eq!(frame.into_data().unwrap(), "data: first\n\n");
        assert!(!tx.is_closed());

        drop(body);
        assert!(tx.is_closed(), "upstream must be dropped with the response body");
    }

    #[tokio::test]
    async fn consultation_span_carries_request_and_user_ids() {
        let spans = ConsultationSpans::default();
        let _guard =
            tracing::subscriber::set_default(tracing_subscriber::registry().with(spans.clone()));

        let source = Arc::new(StubSource::new(Script::Chunks(vec![
            Ok("partial"),
            Err("connection reset"),
        ])));
        let verifier = Arc::new(StubVerifier::default());

        let response = app(&source, &verifier)
            .oneshot(consultation_request(Some("Bearer valid-token"), JANE))
            .await
            .unwrap();
        let _ = response.into_body().collect().await;

        let request_id = spans.field("request_id").expect("request_id recorded");
        assert!(uuid::Uuid::parse_str(&request_id).is_ok(), "{request_id}");
        assert_eq!(spans.field("user_id").as_deref(), Some("user_test"));

        let levels = spans.event_levels.lock().unwrap();
        assert!(levels.contains(&tracing::Level::INFO));
        assert!(
            levels.contains(&tracing::Level::ERROR),
            "mid-stream failure is logged inside the consultation span"
        );
    }
}
