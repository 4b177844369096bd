use std::sync::Arc;

use api_rest::{AppState, router};
use api_shared::JwksVerifier;
use consult_core::{EnvValues, ServiceConfig};
use consult_openai::OpenAiCompletionSource;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the consultation service
///
/// Resolves configuration once, builds the credential verifier and the completion source, and
/// serves the REST API. Missing required configuration stops the process before the port is
/// bound.
///
/// # Environment Variables
/// - `CLERK_JWKS_URL`: JWK set used to verify bearer tokens (required)
/// - `OPENAI_API_KEY`: model provider credential (required)
/// - `OPENAI_MODEL`: model identifier (default: "gpt-5-nano")
/// - `OPENAI_BASE_URL`: model provider base URL (default: "https://api.openai.com/v1")
/// - `OPENAI_TIMEOUT_SECS`: upstream call timeout in seconds (default: none)
/// - `CONSULT_REST_ADDR`: REST server address (default: "0.0.0.0:8000")
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - required configuration is missing or invalid,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("consult=info".parse()?)
                .add_directive("api_rest=info".parse()?)
                .add_directive("api_shared=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = ServiceConfig::from_env_values(EnvValues::from_process_env())?;

    let verifier = JwksVerifier::new(reqwest::Client::new(), cfg.jwks_url());
    let completions = OpenAiCompletionSource::from_config(&cfg)?;

    tracing::info!("++ Starting consultation REST API on {}", cfg.rest_addr());
    tracing::info!("++ Using model {}", completions.model());

    let app = router(AppState::new(Arc::new(verifier), Arc::new(completions)));

    let listener = tokio::net::TcpListener::bind(cfg.rest_addr()).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
