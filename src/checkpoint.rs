//! Checkpoint management for partitioned consumption.
//!
//! A checkpoint manager decides, per partition, *when* the source's durable
//! read position is advanced. Five strategies cover the spectrum from
//! checkpoint-per-message to fully application-driven:
//!
//! - [`RecordCheckpointer`]: after every message
//! - [`BatchCheckpointer`]: at each batch boundary
//! - [`CountCheckpointer`]: after every Nth message per partition
//! - [`TimeCheckpointer`]: on the first message after a configured interval
//! - [`ManualCheckpointer`]: never autonomously; it only tracks the current
//!   message so application code can checkpoint explicitly
//!
//! All strategies share the same per-partition state arena and the same
//! commit/logging behavior; they differ only in the trigger predicate.
//! Commits are issued asynchronously and their outcome is logged, never
//! retried and never surfaced into the delivery path: a failed checkpoint
//! costs redelivery on restart, not a stopped pipeline.

mod batch;
mod count;
mod ledger;
mod manual;
mod record;
mod time;

pub use batch::BatchCheckpointer;
pub use count::CountCheckpointer;
pub use manual::ManualCheckpointer;
pub use record::RecordCheckpointer;
pub use time::TimeCheckpointer;

use std::time::Duration;

use crate::source::{PartitionContext, SourceMessage};

/// Policy governing when a checkpoint commit is triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointMode {
    /// Checkpoint after each processed message.
    Record,
    /// Checkpoint at each batch boundary.
    Batch,
    /// Checkpoint after a configured number of messages per partition.
    PartitionCount,
    /// Checkpoint on the first message after a configured interval.
    Time,
    /// Checkpoint only when the application asks for it.
    Manual,
}

/// Immutable checkpoint configuration.
///
/// Exactly one mode is active. Parameters irrelevant to the active mode are
/// carried but ignored, not validated away. One config is shared across all
/// partitions of a consumer.
#[derive(Debug, Clone)]
pub struct CheckpointConfig {
    mode: CheckpointMode,
    count: u32,
    interval: Duration,
}

impl CheckpointConfig {
    /// Create a configuration for the given mode with default parameters
    /// (count 10, interval 5 seconds).
    pub fn new(mode: CheckpointMode) -> Self {
        Self {
            mode,
            count: 10,
            interval: Duration::from_secs(5),
        }
    }

    /// Set the per-partition message count for [`CheckpointMode::PartitionCount`].
    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    /// Set the commit interval for [`CheckpointMode::Time`].
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// The active checkpoint mode.
    pub fn mode(&self) -> CheckpointMode {
        self.mode
    }

    /// The configured per-partition message count.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// The configured commit interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// Common surface of every checkpoint strategy.
///
/// `on_message` is called once per delivered message, after conversion. It
/// must be safe to call concurrently for *different* partitions; for a single
/// partition, calls arrive in delivery order and are never reentrant. Both
/// methods are non-blocking: any commit they trigger is issued asynchronously
/// and only its logging depends on the outcome.
pub trait CheckpointManager<C, M> {
    /// Record a delivered message and trigger a commit if the strategy's
    /// predicate is met.
    fn on_message(&self, context: &C, message: M);

    /// Signal the end of a delivery batch for the context's partition.
    ///
    /// Only batch-oriented strategies react; the default is a no-op.
    fn complete_batch(&self, context: &C) {
        let _ = context;
    }
}

/// A checkpoint strategy selected from a [`CheckpointConfig`].
///
/// Thin enum over the five strategy types for callers that pick the mode at
/// runtime; each variant can also be constructed directly.
pub enum CheckpointStrategy<M> {
    /// See [`RecordCheckpointer`].
    Record(RecordCheckpointer),
    /// See [`BatchCheckpointer`].
    Batch(BatchCheckpointer<M>),
    /// See [`CountCheckpointer`].
    PartitionCount(CountCheckpointer<M>),
    /// See [`TimeCheckpointer`].
    Time(TimeCheckpointer<M>),
    /// See [`ManualCheckpointer`].
    Manual(ManualCheckpointer<M>),
}

impl<M> CheckpointStrategy<M> {
    /// Build the strategy matching the config's mode.
    pub fn new(config: CheckpointConfig) -> Self {
        match config.mode() {
            CheckpointMode::Record => Self::Record(RecordCheckpointer::new(config)),
            CheckpointMode::Batch => Self::Batch(BatchCheckpointer::new(config)),
            CheckpointMode::PartitionCount => {
                Self::PartitionCount(CountCheckpointer::new(config))
            }
            CheckpointMode::Time => Self::Time(TimeCheckpointer::new(config)),
            CheckpointMode::Manual => Self::Manual(ManualCheckpointer::new(config)),
        }
    }
}

impl<C, M> CheckpointManager<C, M> for CheckpointStrategy<M>
where
    C: PartitionContext<M> + Clone + Send + Sync + 'static,
    M: SourceMessage + Clone + Send + Sync + 'static,
{
    fn on_message(&self, context: &C, message: M) {
        match self {
            Self::Record(strategy) => strategy.on_message(context, message),
            Self::Batch(strategy) => strategy.on_message(context, message),
            Self::PartitionCount(strategy) => strategy.on_message(context, message),
            Self::Time(strategy) => strategy.on_message(context, message),
            Self::Manual(strategy) => strategy.on_message(context, message),
        }
    }

    fn complete_batch(&self, context: &C) {
        match self {
            Self::Record(strategy) => {
                CheckpointManager::<C, M>::complete_batch(strategy, context)
            }
            Self::Batch(strategy) => strategy.complete_batch(context),
            Self::PartitionCount(strategy) => strategy.complete_batch(context),
            Self::Time(strategy) => strategy.complete_batch(context),
            Self::Manual(strategy) => strategy.complete_batch(context),
        }
    }
}

#[cfg(test)]
pub(crate) mod testsupport {
    use std::time::Duration;

    use crate::source::inmemory::{CommitRecord, InMemoryPartition};

    /// Give spawned commit tasks a chance to run to completion.
    pub(crate) async fn settle() {
        for _ in 0..32 {
            tokio::task::yield_now().await;
        }
    }

    /// Wait until the partition has recorded at least `n` commits.
    pub(crate) async fn wait_for_commits(
        partition: &InMemoryPartition,
        n: usize,
    ) -> Vec<CommitRecord> {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let commits = partition.commits().await;
                if commits.len() >= n {
                    return commits;
                }
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("checkpoint commits did not settle in time")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_are_permissive() {
        let config = CheckpointConfig::new(CheckpointMode::Record)
            .with_count(3)
            .with_interval(Duration::from_secs(30));

        // Parameters irrelevant to the active mode are carried, not rejected.
        assert_eq!(config.mode(), CheckpointMode::Record);
        assert_eq!(config.count(), 3);
        assert_eq!(config.interval(), Duration::from_secs(30));
    }

    #[test]
    fn strategy_factory_selects_the_configured_mode() {
        use crate::source::inmemory::InMemoryMessage;

        let strategy: CheckpointStrategy<InMemoryMessage> =
            CheckpointStrategy::new(CheckpointConfig::new(CheckpointMode::Batch));
        assert!(matches!(strategy, CheckpointStrategy::Batch(_)));

        let strategy: CheckpointStrategy<InMemoryMessage> =
            CheckpointStrategy::new(CheckpointConfig::new(CheckpointMode::Manual));
        assert!(matches!(strategy, CheckpointStrategy::Manual(_)));
    }
}
