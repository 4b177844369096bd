//! Inbound visit payload.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A single patient visit submitted for summarisation.
///
/// The service is a pass-through, not a clinical validator: every field is required, but none of
/// them is parsed or checked beyond being a string. `date_of_visit` in particular is echoed
/// verbatim into the prompt in whatever format the clinician typed it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct VisitRequest {
    /// Name of the patient whose consultation is being summarised.
    pub patient_name: String,
    /// Date of the visit as free text (for example `2025-11-22` or `22 November 2025`).
    pub date_of_visit: String,
    /// Free-text clinical notes. May span multiple lines.
    pub notes: String,
}
