//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML.

use serde::{Deserialize, Serialize};

/// Root configuration for a plugin router.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RouterConfig {
    /// `scheme://host` prefix of every built URL.
    pub base_url: String,

    /// Refuse to build URLs for endpoints without a declared pattern.
    pub safe_mode: bool,

    /// Reserved query key carrying the opaque argument bundle.
    pub opaque_key: String,

    /// Name of the global function used for `/`.
    pub root_endpoint: Option<String>,

    /// Name of the global function used when nothing resolves.
    pub missing_endpoint: Option<String>,

    pub observability: ObservabilityConfig,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            base_url: "plugin://plugin.video.example".to_string(),
            safe_mode: false,
            opaque_key: "_".to_string(),
            root_endpoint: None,
            missing_endpoint: None,
            observability: ObservabilityConfig::default(),
        }
    }
}

impl RouterConfig {
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    pub fn safe(mut self) -> Self {
        self.safe_mode = true;
        self
    }
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: RouterConfig = toml::from_str(
            r#"
            safe_mode = true

            [observability]
            json = true
            "#,
        )
        .unwrap();
        assert!(config.safe_mode);
        assert_eq!(config.opaque_key, "_");
        assert_eq!(config.base_url, "plugin://plugin.video.example");
        assert_eq!(config.observability.log_level, "info");
        assert!(config.observability.json);
    }
}
