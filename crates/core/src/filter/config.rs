use serde::{Deserialize, Serialize};

use super::Resolution;

/// Settings of the keyword filter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FilterConfig {
    /// Require every title word to appear in the result name.
    #[serde(default = "default_verify_title")]
    pub verify_title: bool,
    /// Minimum size in MB (0 = no lower bound).
    #[serde(default)]
    pub min_size_mb: u64,
    /// Maximum size in MB (0 = no upper bound).
    #[serde(default)]
    pub max_size_mb: u64,
    /// Names containing any of these (case-insensitive) are rejected.
    #[serde(default)]
    pub exclude_keywords: Vec<String>,
    /// Empty allows every resolution.
    #[serde(default)]
    pub allowed_resolutions: Vec<Resolution>,
}

fn default_verify_title() -> bool {
    true
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            verify_title: default_verify_title(),
            min_size_mb: 0,
            max_size_mb: 0,
            exclude_keywords: Vec::new(),
            allowed_resolutions: Vec::new(),
        }
    }
}
