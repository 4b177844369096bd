//! Service runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into the services that need
//! it. Request handlers never read environment variables, which keeps behaviour consistent across
//! threads and test harnesses.

use std::time::Duration;

use secrecy::SecretString;

use crate::constants::{
    DEFAULT_MODEL, DEFAULT_OPENAI_BASE_URL, DEFAULT_REST_ADDR, ENV_JWKS_URL, ENV_OPENAI_API_KEY,
    ENV_OPENAI_BASE_URL, ENV_OPENAI_MODEL, ENV_OPENAI_TIMEOUT_SECS, ENV_REST_ADDR,
};
use crate::{ConsultError, ConsultResult};

/// Configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    rest_addr: String,
    jwks_url: String,
    openai_api_key: SecretString,
    openai_base_url: String,
    model: String,
    upstream_timeout: Option<Duration>,
}

/// Raw, possibly-missing values as read from the environment.
#[derive(Clone, Debug, Default)]
pub struct EnvValues {
    pub rest_addr: Option<String>,
    pub jwks_url: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub model: Option<String>,
    pub upstream_timeout_secs: Option<String>,
}

impl EnvValues {
    /// Snapshot the relevant process environment variables.
    pub fn from_process_env() -> Self {
        let var = |name: &str| std::env::var(name).ok();
        Self {
            rest_addr: var(ENV_REST_ADDR),
            jwks_url: var(ENV_JWKS_URL),
            openai_api_key: var(ENV_OPENAI_API_KEY),
            openai_base_url: var(ENV_OPENAI_BASE_URL),
            model: var(ENV_OPENAI_MODEL),
            upstream_timeout_secs: var(ENV_OPENAI_TIMEOUT_SECS),
        }
    }
}

impl ServiceConfig {
    /// Resolve configuration from raw values.
    ///
    /// # Errors
    /// Returns `ConsultError::Configuration` if:
    /// - the JWKS URL or the upstream API key is missing or blank, or
    /// - the upstream timeout is not a positive whole number of seconds.
    pub fn from_env_values(values: EnvValues) -> ConsultResult<Self> {
        let jwks_url = required(values.jwks_url, ENV_JWKS_URL)?;
        let openai_api_key = required(values.openai_api_key, ENV_OPENAI_API_KEY)?;

        let upstream_timeout = non_blank(values.upstream_timeout_secs)
            .map(|raw| match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
                _ => Err(ConsultError::Configuration(format!(
                    "{ENV_OPENAI_TIMEOUT_SECS} must be a positive number of seconds, got {raw:?}"
                ))),
            })
            .transpose()?;

        Ok(Self {
            rest_addr: non_blank(values.rest_addr).unwrap_or_else(|| DEFAULT_REST_ADDR.into()),
            jwks_url,
            openai_api_key: SecretString::from(openai_api_key),
            openai_base_url: non_blank(values.openai_base_url)
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.into()),
            model: non_blank(values.model).unwrap_or_else(|| DEFAULT_MODEL.into()),
            upstream_timeout,
        })
    }

    pub fn rest_addr(&self) -> &str {
        &self.rest_addr
    }

    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    pub fn openai_api_key(&self) -> &SecretString {
        &self.openai_api_key
    }

    pub fn openai_base_url(&self) -> &str {
        &self.openai_base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn upstream_timeout(&self) -> Option<Duration> {
        self.upstream_timeout
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(value: Option<String>, name: &str) -> ConsultResult<String> {
    non_blank(value).ok_or_else(|| ConsultError::Configuration(format!("{name} is not set")))
}
