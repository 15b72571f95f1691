use std::time::Duration;

use crate::checkpoint::ledger::PartitionLedger;
use crate::checkpoint::{ledger, CheckpointConfig, CheckpointManager, CheckpointMode};
use crate::source::{PartitionContext, SourceMessage};

/// Checkpoints on the first message after a configured interval.
///
/// Effective under [`CheckpointMode::Time`]. Each partition keeps the instant
/// of its last commit (or of its first observed message); a delivery at or
/// past the interval commits the triggering message and reopens the window.
/// A quiet partition commits nothing; the window is only inspected when a
/// message arrives.
pub struct TimeCheckpointer<M> {
    interval: Duration,
    partitions: PartitionLedger<M>,
}

impl<M> TimeCheckpointer<M> {
    /// Create the strategy, failing fast on a config for a different mode.
    pub fn new(config: CheckpointConfig) -> Self {
        assert_eq!(
            config.mode(),
            CheckpointMode::Time,
            "time checkpointer requires a time-mode config",
        );
        Self {
            interval: config.interval(),
            partitions: PartitionLedger::default(),
        }
    }
}

impl<C, M> CheckpointManager<C, M> for TimeCheckpointer<M>
where
    C: PartitionContext<M> + Clone + Send + Sync + 'static,
    M: SourceMessage + Clone + Send + Sync + 'static,
{
    fn on_message(&self, context: &C, message: M) {
        let observation = self
            .partitions
            .record(context.partition_id(), message.clone());

        if observation.window_elapsed >= self.interval {
            self.partitions.reset_window(context.partition_id());
            ledger::commit(context, message);
        }
    }
}
