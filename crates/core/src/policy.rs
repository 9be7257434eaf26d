//! Per-command timeout policy

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

/// Global default applied to commands without an override
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Commands that walk large parts of the document tree or generate many
/// nodes at once. They spuriously time out under the global default.
const BUILTIN_OVERRIDES: &[(&str, u64)] = &[
    ("get_node_tree", 60_000),
    ("scan_text_nodes", 60_000),
    ("scan_nodes_by_types", 60_000),
    ("set_multiple_text_contents", 60_000),
    ("set_multiple_annotations", 60_000),
    ("generate_design_variants", 60_000),
    ("export_node_as_image", 60_000),
    ("read_my_design", 45_000),
    ("get_nodes_info", 45_000),
    ("delete_multiple_nodes", 45_000),
];

/// Mapping from command name to timeout, with a global default.
///
/// Consulted once per task creation; never mutated while the bridge runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutPolicy {
    pub default_ms: u64,
    #[serde(default)]
    pub overrides: HashMap<String, u64>,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            default_ms: DEFAULT_TIMEOUT_MS,
            overrides: BUILTIN_OVERRIDES
                .iter()
                .map(|(command, ms)| (command.to_string(), *ms))
                .collect(),
        }
    }
}

impl TimeoutPolicy {
    /// Policy with no per-command overrides
    pub fn uniform(default_ms: u64) -> Self {
        Self {
            default_ms,
            overrides: HashMap::new(),
        }
    }

    /// Set the global default
    pub fn with_default_ms(mut self, default_ms: u64) -> Self {
        self.default_ms = default_ms;
        self
    }

    /// Add or replace a per-command override
    pub fn with_override(mut self, command: impl Into<String>, ms: u64) -> Self {
        self.overrides.insert(command.into(), ms);
        self
    }

    /// Merge a JSON object of `{ "command": millis }` over the current table
    pub fn merge_json(mut self, raw: &str) -> crate::Result<Self> {
        let extra: HashMap<String, u64> = serde_json::from_str(raw)?;
        if let Some((command, _)) = extra.iter().find(|(_, ms)| **ms == 0) {
            return Err(BridgeError::invalid_config(format!(
                "timeout for '{}' must be greater than zero",
                command
            )));
        }
        self.overrides.extend(extra);
        Ok(self)
    }

    /// Effective timeout: explicit override, then command entry, then default
    pub fn resolve(&self, command: &str, explicit: Option<Duration>) -> Duration {
        explicit.unwrap_or_else(|| {
            let ms = self
                .overrides
                .get(command)
                .copied()
                .unwrap_or(self.default_ms);
            Duration::from_millis(ms)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_uses_global_default() {
        let policy = TimeoutPolicy::default();
        assert_eq!(
            policy.resolve("create_rectangle", None),
            Duration::from_millis(30_000)
        );
    }

    #[test]
    fn test_builtin_overrides_for_long_commands() {
        let policy = TimeoutPolicy::default();
        assert_eq!(
            policy.resolve("scan_text_nodes", None),
            Duration::from_millis(60_000)
        );
        assert_eq!(
            policy.resolve("read_my_design", None),
            Duration::from_millis(45_000)
        );
    }

    #[test]
    fn test_explicit_override_wins() {
        let policy = TimeoutPolicy::default();
        assert_eq!(
            policy.resolve("scan_text_nodes", Some(Duration::from_millis(5))),
            Duration::from_millis(5)
        );
    }

    #[test]
    fn test_merge_json() {
        let policy = TimeoutPolicy::uniform(1_000)
            .merge_json(r#"{"slow_export": 90000}"#)
            .unwrap();
        assert_eq!(
            policy.resolve("slow_export", None),
            Duration::from_millis(90_000)
        );
        assert_eq!(policy.resolve("other", None), Duration::from_millis(1_000));
    }

    #[test]
    fn test_merge_json_rejects_zero() {
        let result = TimeoutPolicy::default().merge_json(r#"{"broken": 0}"#);
        assert!(matches!(result, Err(BridgeError::InvalidConfig(_))));
    }

    #[test]
    fn test_deserialize_policy() {
        let json = r#"{"defaultMs": 10000, "overrides": {"get_node_tree": 20000}}"#;
        let policy: TimeoutPolicy = serde_json::from_str(json).unwrap();
        assert_eq!(policy.default_ms, 10_000);
        assert_eq!(
            policy.resolve("get_node_tree", None),
            Duration::from_millis(20_000)
        );
    }
}
