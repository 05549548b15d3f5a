use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const ENV_MAX_JUMP_DEPTH: &str = "DIALOG_MAX_JUMP_DEPTH";
pub const ENV_MAX_DIGRESSION_DEPTH: &str = "DIALOG_MAX_DIGRESSION_DEPTH";

fn default_max_jump_depth() -> usize {
    32
}

fn default_max_digression_depth() -> usize {
    16
}

/// Turn engine limits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// `jump_to` resolutions allowed in a single turn before the chain is
    /// treated as a cycle.
    #[serde(default = "default_max_jump_depth")]
    pub max_jump_depth: usize,
    /// A digression is refused once this many frames are on the stack;
    /// the paused frame keeps waiting instead.
    #[serde(default = "default_max_digression_depth")]
    pub max_digression_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_jump_depth: default_max_jump_depth(),
            max_digression_depth: default_max_digression_depth(),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `DIALOG_MAX_JUMP_DEPTH` / `DIALOG_MAX_DIGRESSION_DEPTH`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(raw) = lookup(ENV_MAX_JUMP_DEPTH) {
            config.max_jump_depth = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_MAX_JUMP_DEPTH}={raw} is not a number"))?;
        }
        if let Some(raw) = lookup(ENV_MAX_DIGRESSION_DEPTH) {
            config.max_digression_depth = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_MAX_DIGRESSION_DEPTH}={raw} is not a number"))?;
        }
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("invalid engine config YAML")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_env_overrides() {
        let env = HashMap::from([(ENV_MAX_JUMP_DEPTH, "5")]);
        let config = EngineConfig::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.max_jump_depth, 5);
        assert_eq!(config.max_digression_depth, 16);
    }

    #[test]
    fn test_env_rejects_garbage() {
        let env = HashMap::from([(ENV_MAX_DIGRESSION_DEPTH, "lots")]);
        let err = EngineConfig::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap_err();
        assert!(err.to_string().contains(ENV_MAX_DIGRESSION_DEPTH));
    }

    #[test]
    fn test_yaml_partial() {
        let config = EngineConfig::from_yaml("max_jump_depth: 3").unwrap();
        assert_eq!(config.max_jump_depth, 3);
        assert_eq!(config.max_digression_depth, 16);
    }
}
