//! Runtime configuration for pipelines and unions.
//!
//! Both types deserialize from any serde format, with missing fields
//! falling back to their defaults:
//!
//! ```ignore
//! let config: PipelineConfig = serde_json::from_str(r#"{"update_unsupervised_on_learn": false}"#)?;
//! let pipeline = pipeline.with_config(config);
//! ```

use serde::{Deserialize, Serialize};

/// Configuration for a [`Pipeline`](crate::compose::Pipeline).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Whether transformers absorb the observation again on the learn path.
    ///
    /// `predict`, `transform` and `debug` always update transformers. With
    /// this set to `false`, `learn` only runs the transformers' transform and
    /// leaves their state as the preceding `predict` left it.
    pub update_unsupervised_on_learn: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            update_unsupervised_on_learn: true,
        }
    }
}

impl PipelineConfig {
    pub fn with_update_unsupervised_on_learn(mut self, update: bool) -> Self {
        self.update_unsupervised_on_learn = update;
        self
    }
}

/// What a union does when two branches emit the same key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// Keep the later branch's value and report the collision as a diagnostic.
    #[default]
    LastWriterWins,
    /// Fail the pass with [`PipelineError::MergeCollision`](crate::PipelineError::MergeCollision).
    Reject,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_config_default() {
        assert!(PipelineConfig::default().update_unsupervised_on_learn);
    }

    #[test]
    fn test_pipeline_config_missing_fields_use_defaults() {
        let config: PipelineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, PipelineConfig::default());

        let config: PipelineConfig =
            serde_json::from_str(r#"{"update_unsupervised_on_learn": false}"#).unwrap();
        assert!(!config.update_unsupervised_on_learn);
    }

    #[test]
    fn test_collision_policy_snake_case() {
        let policy: CollisionPolicy = serde_json::from_str(r#""reject""#).unwrap();
        assert_eq!(policy, CollisionPolicy::Reject);
        assert_eq!(
            serde_json::to_string(&CollisionPolicy::LastWriterWins).unwrap(),
            r#""last_writer_wins""#
        );
    }
}
