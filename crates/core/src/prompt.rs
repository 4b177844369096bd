//! Prompt construction for the consultation summary.

use crate::completion::{ChatMessage, Role};
use crate::visit::VisitRequest;

/// Section headings the model is asked to produce, in order.
pub const SECTION_HEADINGS: [&str; 3] = [
    "### Summary of visit for the doctor's records",
    "### Next steps for the doctor",
    "### Draft of email to patient in patient-friendly language",
];

/// Fixed system instruction shared by every request.
pub const SYSTEM_PROMPT: &str = "
You are provided with notes written by a doctor from a patient's visit.
Your job is to summarize the visit for the doctor and provide an email.
Reply with exactly three sections with the headings:
### Summary of visit for the doctor's records
### Next steps for the doctor
### Draft of email to patient in patient-friendly language
";

/// System and user instructions for one consultation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptPair {
    pub system: &'static str,
    pub user: String,
}

impl PromptPair {
    /// Build the prompt pair for a visit.
    ///
    /// Fields are interpolated verbatim. Notes keep their embedded newlines and nothing is
    /// escaped or truncated.
    pub fn for_visit(visit: &VisitRequest) -> Self {
        Self {
            system: SYSTEM_PROMPT,
            user: user_prompt_for(visit),
        }
    }

    /// Role-tagged message list in the order the provider expects.
    pub fn messages(&self) -> Vec<ChatMessage> {
        vec![
            ChatMessage::new(Role::System, self.system),
            ChatMessage::new(Role::User, self.user.clone()),
        ]
    }
}

fn user_prompt_for(visit: &VisitRequest) -> String {
    format!(
        "Create the summary, next steps and draft email for:\n\
         Patient Name: {}\n\
         Date of Visit: {}\n\
         Notes:\n\
         {}",
        visit.patient_name, visit.date_of_visit, visit.notes
    )
}
