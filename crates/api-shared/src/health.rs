use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Body returned by the health endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub status: String,
}

/// Fixed-response health check
///
/// Used by load balancers and container platforms to confirm the process is serving HTTP. It
/// never consults the identity provider or the model provider.
#[derive(Clone, Default)]
pub struct HealthService;

impl HealthService {
    /// Check health without creating an instance.
    ///
    /// # Returns
    /// A `HealthRes` with status `healthy`.
    pub fn check_health() -> HealthRes {
        HealthRes {
            status: "healthy".into(),
        }
    }
}
