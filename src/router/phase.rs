//! Workflow phases and review-phase classification.

use serde::{Deserialize, Serialize};

use crate::config::Profile;

/// Substrings marking a phase as a review phase.
const REVIEW_KEYWORDS: [&str; 5] = ["review", "validate", "check", "verify", "audit"];

/// A step of a workflow that needs a model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Requested routing profile. Unknown or empty means `balanced`.
    #[serde(default)]
    pub profile: String,
}

impl Phase {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = profile.into();
        self
    }

    /// Whether the id or name mentions a review keyword (case-insensitive).
    pub fn is_review(&self) -> bool {
        let id = self.id.to_lowercase();
        let name = self.name.to_lowercase();
        REVIEW_KEYWORDS
            .iter()
            .any(|kw| id.contains(kw) || name.contains(kw))
    }

    /// The routing profile, with invalid values normalized to `balanced`.
    pub fn routing_profile(&self) -> Profile {
        Profile::parse_lenient(&self.profile)
    }
}
