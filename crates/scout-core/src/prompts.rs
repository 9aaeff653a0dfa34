//! Role and instruction text handed to the language backend.
//!
//! This is declarative data: it shapes what the backend is asked, never how
//! the pipeline proceeds.

use serde::{Deserialize, Serialize};

/// Placeholder substituted with the user's requirement text.
pub const REQUIREMENT_PLACEHOLDER: &str = "{requirement}";

/// Fixed formatting instruction appended to every analyst prompt. The
/// analyzer's parser is written against these keys.
const FORMAT_INSTRUCTION: &str = "Respond with a single JSON object and nothing else, using exactly these keys:\n\
  \"keywords\": array of short search keywords, most relevant first (at least one),\n\
  \"language_constraints\": array of required programming languages or frameworks (empty if none),\n\
  \"license_constraints\": array of acceptable licenses as SPDX identifiers (empty if none),\n\
  \"must_have_features\": array of short feature phrases the project must offer,\n\
  \"notes\": string with anything else worth knowing.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    #[serde(default = "default_analyst_role")]
    pub analyst_role: String,

    #[serde(default = "default_analyst_goal")]
    pub analyst_goal: String,

    #[serde(default = "default_analyst_template")]
    pub analyst_template: String,
}

fn default_analyst_role() -> String {
    "Senior Requirements Analyst".to_string()
}

fn default_analyst_goal() -> String {
    "Turn a business requirement into precise technical search criteria for finding open-source projects"
        .to_string()
}

fn default_analyst_template() -> String {
    "Analyze the following business requirement and extract the technical criteria \
     an open-source project must meet: core functionality, programming languages or \
     frameworks, licensing constraints, and must-have features.\n\n\
     Requirement: {requirement}"
        .to_string()
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            analyst_role: default_analyst_role(),
            analyst_goal: default_analyst_goal(),
            analyst_template: default_analyst_template(),
        }
    }
}

impl PromptConfig {
    /// Build the full analyst prompt for one requirement.
    pub fn render_analyst(&self, requirement: &str) -> String {
        let task = if self.analyst_template.contains(REQUIREMENT_PLACEHOLDER) {
            self.analyst_template
                .replace(REQUIREMENT_PLACEHOLDER, requirement)
        } else {
            format!("{}\n\nRequirement: {}", self.analyst_template, requirement)
        };

        format!(
            "You are a {}. Your goal: {}.\n\n{}\n\n{}",
            self.analyst_role, self.analyst_goal, task, FORMAT_INSTRUCTION
        )
    }
}
