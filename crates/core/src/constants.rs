//! Defaults and environment variable names shared by the service binaries.

pub const DEFAULT_REST_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-5-nano";

pub const ENV_JWKS_URL: &str = "CLERK_JWKS_URL";
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_OPENAI_MODEL: &str = "OPENAI_MODEL";
pub const ENV_OPENAI_BASE_URL: &str = "OPENAI_BASE_URL";
pub const ENV_OPENAI_TIMEOUT_SECS: &str = "OPENAI_TIMEOUT_SECS";
pub const ENV_REST_ADDR: &str = "CONSULT_REST_ADDR";

/// Media type of the consultation response body.
pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";
