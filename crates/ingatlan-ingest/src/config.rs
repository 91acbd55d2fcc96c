//! Pipeline configuration

use serde::{Deserialize, Serialize};

/// Per-worker peak memory is dominated by in-flight decomposed tables,
/// not compute, so the pool is sized from memory rather than CPU count.
/// 2.5 GB per worker is the empirical budget.
pub const DEFAULT_WORKER_MEMORY_BYTES: u64 = 2_500_000_000;

const DEFAULT_AVAILABLE_MEMORY_BYTES: u64 = 8 * 1024 * 1024 * 1024;
const DEFAULT_BATCH_SIZE: usize = 50;

/// What a worker error does to the rest of the run.
///
/// Schema drift ignores this setting: it aborts the run under either
/// policy and is never swallowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Any worker error aborts the whole run and propagates
    #[default]
    FailFast,
    /// Errors are logged per batch and the run proceeds
    CollectAndContinue,
}

/// Worker pool sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Memory the embedding runner grants this pipeline
    pub available_memory_bytes: u64,
    /// Peak memory budget of one in-flight batch
    pub worker_memory_bytes: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            available_memory_bytes: DEFAULT_AVAILABLE_MEMORY_BYTES,
            worker_memory_bytes: DEFAULT_WORKER_MEMORY_BYTES,
        }
    }
}

impl PoolConfig {
    /// Number of parallel workers, floor one.
    pub fn worker_count(&self) -> usize {
        let budget = self.worker_memory_bytes.max(1);
        ((self.available_memory_bytes / budget) as usize).max(1)
    }
}

/// Configuration for one orchestrator run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub batch_size: usize,
    pub failure_policy: FailurePolicy,
    pub pool: PoolConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            failure_policy: FailurePolicy::default(),
            pool: PoolConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Batch size with a floor of one; zero would spin forever.
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.max(1)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_count_from_memory() {
        let pool = PoolConfig {
            available_memory_bytes: 10_000_000_000,
            worker_memory_bytes: 2_500_000_000,
        };
        assert_eq!(pool.worker_count(), 4);
    }

    #[test]
    fn test_worker_count_floor_is_one() {
        let pool = PoolConfig {
            available_memory_bytes: 1_000_000,
            worker_memory_bytes: 2_500_000_000,
        };
        assert_eq!(pool.worker_count(), 1);
    }

    #[test]
    fn test_default_policy_is_fail_fast() {
        let config = PipelineConfig::new();
        assert_eq!(config.failure_policy, FailurePolicy::FailFast);
        assert_eq!(config.effective_batch_size(), 50);
    }

    #[test]
    fn test_batch_size_floor() {
        let config = PipelineConfig {
            batch_size: 0,
            ..PipelineConfig::new()
        };
        assert_eq!(config.effective_batch_size(), 1);
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"failure_policy": "collect_and_continue"}"#).unwrap();
        assert_eq!(config.failure_policy, FailurePolicy::CollectAndContinue);
        assert_eq!(config.batch_size, 50);
    }
}
