use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::archive::{AssembleOptions, CompressionStrategy, DEFAULT_DEFLATE_LEVEL};

/// What to do when two builds that must be byte-identical are not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DivergencePolicy {
    /// Abort verification with `BuildError::Divergence`.
    #[default]
    Fail,
    /// Record the divergence in the report, log it, keep going.
    Report,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse verify config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid verify config: {0}")]
    Invalid(String),
}

/// Equivalence verification settings.
///
/// Loaded from YAML (all keys optional, unknown keys rejected):
///
/// ```yaml
/// strategies: [store, deflate]
/// runs: 3
/// deflate_level: 9
/// divergence: report
/// expected:
///   store: "sha256:9f86d08..."
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VerifyConfig {
    /// Strategies to build, in report order.
    pub strategies: Vec<CompressionStrategy>,
    /// Builds per strategy. 1 disables the repeat check.
    pub runs: usize,
    pub deflate_level: u32,
    /// Alternate sequential and parallel encoding across runs.
    pub parallel: bool,
    /// Treat an empty input set as an error.
    pub require_entries: bool,
    pub divergence: DivergencePolicy,
    /// Pinned fingerprints keyed by strategy name (`store`, `deflate`).
    pub expected: BTreeMap<String, String>,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            strategies: CompressionStrategy::ALL.to_vec(),
            runs: 2,
            deflate_level: DEFAULT_DEFLATE_LEVEL,
            parallel: true,
            require_entries: false,
            divergence: DivergencePolicy::Fail,
            expected: BTreeMap::new(),
        }
    }
}

/// Partial overrides for `VerifyConfig`, e.g. from CLI flags.
/// Merge with `VerifyConfig::default().apply(overrides)`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifyConfigOverrides {
    pub strategies: Option<Vec<CompressionStrategy>>,
    pub runs: Option<usize>,
    pub deflate_level: Option<u32>,
    pub parallel: Option<bool>,
    pub require_entries: Option<bool>,
    pub divergence: Option<DivergencePolicy>,
}

impl VerifyConfig {
    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        // An empty document means "all defaults".
        if s.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: Self = serde_yaml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply overrides onto this config. Only `Some` values override.
    pub fn apply(self, overrides: VerifyConfigOverrides) -> Self {
        Self {
            strategies: overrides.strategies.unwrap_or(self.strategies),
            runs: overrides.runs.unwrap_or(self.runs),
            deflate_level: overrides.deflate_level.unwrap_or(self.deflate_level),
            parallel: overrides.parallel.unwrap_or(self.parallel),
            require_entries: overrides.require_entries.unwrap_or(self.require_entries),
            divergence: overrides.divergence.unwrap_or(self.divergence),
            expected: self.expected,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.runs == 0 {
            return Err(ConfigError::Invalid("runs must be at least 1".into()));
        }
        if self.strategies.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one strategy is required".into(),
            ));
        }
        if self.deflate_level > 9 {
            return Err(ConfigError::Invalid(format!(
                "deflate_level {} outside 0..=9",
                self.deflate_level
            )));
        }
        for key in self.expected.keys() {
            key.parse::<CompressionStrategy>()
                .map_err(|e| ConfigError::Invalid(format!("expected: {}", e)))?;
        }
        Ok(())
    }

    /// Pinned fingerprint for `strategy`, if any.
    pub fn expected_for(&self, strategy: CompressionStrategy) -> Option<&str> {
        self.expected
            .iter()
            .find(|(k, _)| k.parse::<CompressionStrategy>().ok() == Some(strategy))
            .map(|(_, v)| v.as_str())
    }

    /// Assembler options for run number `run` (0-based).
    pub fn assemble_options(&self, run: usize) -> AssembleOptions {
        AssembleOptions {
            deflate_level: self.deflate_level,
            parallel: self.parallel && run % 2 == 1,
            require_entries: self.require_entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_is_default() {
        assert_eq!(VerifyConfig::from_yaml_str("").unwrap(), VerifyConfig::default());
        assert_eq!(
            VerifyConfig::from_yaml_str("{}").unwrap(),
            VerifyConfig::default()
        );
    }

    #[test]
    fn parses_full_config() {
        let yaml = r#"
strategies: [deflate]
runs: 3
deflate_level: 9
parallel: false
require_entries: true
divergence: report
expected:
  deflate: "sha256:abcd"
"#;
        let cfg = VerifyConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(cfg.strategies, vec![CompressionStrategy::Deflate]);
        assert_eq!(cfg.runs, 3);
        assert_eq!(cfg.deflate_level, 9);
        assert!(!cfg.parallel);
        assert!(cfg.require_entries);
        assert_eq!(cfg.divergence, DivergencePolicy::Report);
        assert_eq!(
            cfg.expected_for(CompressionStrategy::Deflate),
            Some("sha256:abcd")
        );
        assert_eq!(cfg.expected_for(CompressionStrategy::Store), None);
    }

    #[test]
    fn rejects_unknown_keys_and_bad_values() {
        assert!(matches!(
            VerifyConfig::from_yaml_str("runz: 2"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            VerifyConfig::from_yaml_str("runs: 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            VerifyConfig::from_yaml_str("strategies: []"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            VerifyConfig::from_yaml_str("deflate_level: 12"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            VerifyConfig::from_yaml_str("expected: { zstd: abc }"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(VerifyConfig::from_yaml_str("strategies: [bzip2]").is_err());
    }

    #[test]
    fn overrides_only_touch_some_fields() {
        let base = VerifyConfig {
            runs: 5,
            ..VerifyConfig::default()
        };
        let merged = base.apply(VerifyConfigOverrides {
            divergence: Some(DivergencePolicy::Report),
            ..VerifyConfigOverrides::default()
        });
        assert_eq!(merged.runs, 5);
        assert_eq!(merged.divergence, DivergencePolicy::Report);
        assert_eq!(merged.strategies, CompressionStrategy::ALL.to_vec());
    }

    #[test]
    fn runs_alternate_parallelism() {
        let cfg = VerifyConfig::default();
        assert!(!cfg.assemble_options(0).parallel);
        assert!(cfg.assemble_options(1).parallel);
        assert!(!cfg.assemble_options(2).parallel);

        let sequential = VerifyConfig {
            parallel: false,
            ..VerifyConfig::default()
        };
        assert!(!sequential.assemble_options(1).parallel);
    }
}
