use crate::transforms::GuardOptions;
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Session settings for a [`LiveSketch`](crate::LiveSketch).
///
/// Every field has a default, so a config file only needs the keys it
/// changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SketchConfig {
    /// Inject loop checkpoints into fresh code
    pub enable_loop_guard: bool,

    /// Budget for the top-level run of a script, in milliseconds
    pub startup_budget_ms: u64,

    /// Budget for each later synchronous branch (a frame, an event handler)
    pub steady_budget_ms: u64,

    /// Iterations between two checkpoint calls
    pub loop_check_interval: u32,

    /// Report the hottest guarded site instead of a bare signal
    pub location_reporting: bool,

    pub width: u32,
    pub height: u32,
}

impl Default for SketchConfig {
    fn default() -> Self {
        Self {
            enable_loop_guard: true,
            startup_budget_ms: 2000,
            steady_budget_ms: 500,
            loop_check_interval: 1000,
            location_reporting: true,
            width: 400,
            height: 400,
        }
    }
}

impl SketchConfig {
    pub fn guard_options(&self) -> GuardOptions {
        GuardOptions {
            check_interval: self.loop_check_interval,
            location_reporting: self.location_reporting,
            startup_budget_ms: self.startup_budget_ms,
            steady_budget_ms: self.steady_budget_ms,
        }
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Loads a `.yaml`/`.yml` or `.json` file.
    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or_default();
        match extension {
            "yaml" | "yml" => Self::from_yaml_str(&text)
                .with_context(|| format!("invalid YAML in {}", path.display())),
            "json" => Self::from_json_str(&text)
                .with_context(|| format!("invalid JSON in {}", path.display())),
            other => bail!("unsupported config format `{other}` for {}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = SketchConfig::from_yaml_str("width: 200\nenable_loop_guard: false\n").unwrap();
        assert_eq!(config.width, 200);
        assert_eq!(config.height, 400);
        assert!(!config.enable_loop_guard);
        assert_eq!(config.steady_budget_ms, 500);
    }

    #[test]
    fn test_json_and_guard_options() {
        let config = SketchConfig::from_json_str(r#"{"loop_check_interval": 10, "location_reporting": false}"#).unwrap();
        let guard = config.guard_options();
        assert_eq!(guard.check_interval, 10);
        assert!(!guard.location_reporting);
        assert_eq!(guard.startup_budget_ms, 2000);
    }

    #[test]
    fn test_unknown_extension_is_rejected() {
        let err = SketchConfig::from_path("sketch.toml").unwrap_err();
        assert!(err.to_string().contains("sketch.toml"));
    }
}
