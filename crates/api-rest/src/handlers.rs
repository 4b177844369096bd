use api_shared::{bearer_token, HealthRes, HealthService};
use axum::{
    body::{Body, Bytes},
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use consult_core::{
    constants::EVENT_STREAM_CONTENT_TYPE, reframe, DeltaStream, PromptPair, VisitRequest,
};
use futures::StreamExt;
use tracing::{Instrument, Span};
use uuid::Uuid;

use crate::error::{ApiError, ErrorBody};
use crate::AppState;

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint
///
/// Always succeeds. Requires no credentials and never touches the identity provider or the
/// model provider.
#[axum::debug_handler]
pub async fn health() -> Json<HealthRes> {
    Json(HealthService::check_health())
}

#[utoipa::path(
    post,
    path = "/api/consultation",
    request_body = VisitRequest,
    responses(
        (status = 200, description = "Streamed consultation summary", body = String, content_type = "text/event-stream"),
        (status = 400, description = "Malformed JSON body", body = ErrorBody),
        (status = 403, description = "Missing or invalid bearer credential", body = ErrorBody),
        (status = 422, description = "Missing required field", body = ErrorBody),
        (status = 502, description = "Model provider call could not be opened", body = ErrorBody)
    )
)]
/// Stream a consultation summary for one visit
///
/// The caller is authenticated before the body is looked at, and the body is validated before
/// the model provider is called. Either failure is reported as a JSON rejection and nothing
/// is sent upstream.
///
/// On success the response is a `text/event-stream` whose frames are written as the model
/// produces them. If the model provider fails part-way through, the connection is closed
/// without a terminating frame.
///
/// # Errors
/// Returns:
/// - `403 Forbidden` if the bearer credential is missing or fails verification,
/// - the JSON rejection status (`400`/`415`/`422`) if the body is not a valid visit, or
/// - `502 Bad Gateway` if the upstream stream cannot be opened.
#[axum::debug_handler]
pub async fn consultation(
    State(state): State<AppState>,
    headers: HeaderMap,
    visit: Result<Json<VisitRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let span = tracing::info_span!(
        "consultation",
        request_id = %Uuid::new_v4(),
        user_id = tracing::field::Empty,
    );
    open_consultation(state, headers, visit, span.clone())
        .instrument(span)
        .await
}

async fn open_consultation(
    state: AppState,
    headers: HeaderMap,
    visit: Result<Json<VisitRequest>, JsonRejection>,
    span: Span,
) -> Result<Response, ApiError> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let claims = match bearer_token(authorization) {
        Ok(token) => state.verifier.verify(token).await,
        Err(e) => Err(e),
    }
    .map_err(|e| {
        tracing::warn!(error = %e, "consultation request rejected");
        ApiError::from(e)
    })?;
    span.record("user_id", tracing::field::display(&claims.sub));

    let Json(visit) = visit.map_err(|rejection| {
        tracing::warn!(error = %rejection, "invalid visit payload");
        ApiError::from(rejection)
    })?;

    tracing::info!("consultation requested");

    let prompt = PromptPair::for_visit(&visit);
    let deltas = state.completions.open(&prompt).await.map_err(|e| {
        tracing::error!(error = %e, "failed to open completion stream");
        ApiError::from(e)
    })?;

    let response_headers = [
        (header::CONTENT_TYPE, EVENT_STREAM_CONTENT_TYPE),
        (header::CACHE_CONTROL, "no-cache"),
    ];
    Ok((response_headers, Body::from_stream(event_stream(deltas, span))).into_response())
}

/// Encoded frames for the response body, ending at the first upstream error.
///
/// The body is polled by the server after the handler returns, so its events name the
/// consultation span as their parent explicitly.
fn event_stream(
    deltas: DeltaStream,
    span: Span,
) -> impl futures::Stream<Item = Result<Bytes, consult_core::ConsultError>> + Send + 'static {
    async_stream::stream! {
        let mut frames = std::pin::pin!(reframe(deltas));
        let mut sent = 0usize;
        while let Some(item) = frames.next().await {
            match item {
                Ok(frame) => {
                    sent += 1;
                    yield Ok(Bytes::from(frame.encode()));
                }
                Err(e) => {
                    tracing::error!(
                        parent: &span,
                        frames = sent,
                        error = %e,
                        "completion stream failed, closing connection"
                    );
                    yield Err(e);
                    return;
                }
            }
        }
        tracing::debug!(parent: &span, frames = sent, "consultation stream complete");
    }
}
