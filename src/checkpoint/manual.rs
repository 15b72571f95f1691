use crate::checkpoint::ledger::PartitionLedger;
use crate::checkpoint::{CheckpointConfig, CheckpointManager, CheckpointMode};
use crate::source::{PartitionContext, SourceMessage};

/// Never checkpoints autonomously.
///
/// Effective under [`CheckpointMode::Manual`]. `on_message` only records the
/// delivered message so that application code holding the partition's
/// [`PartitionContext`] can locate the current message via
/// [`current`](ManualCheckpointer::current) and checkpoint it explicitly
/// (`checkpoint_message`), or commit the read position directly
/// (`checkpoint`).
pub struct ManualCheckpointer<M> {
    partitions: PartitionLedger<M>,
}

impl<M> ManualCheckpointer<M> {
    /// Create the strategy, failing fast on a config for a different mode.
    pub fn new(config: CheckpointConfig) -> Self {
        assert_eq!(
            config.mode(),
            CheckpointMode::Manual,
            "manual checkpointer requires a manual-mode config",
        );
        Self {
            partitions: PartitionLedger::default(),
        }
    }
}

impl<M: Clone> ManualCheckpointer<M> {
    /// The most recently delivered message for the partition, if any.
    pub fn current(&self, partition_id: &str) -> Option<M> {
        self.partitions.last(partition_id)
    }
}

impl<C, M> CheckpointManager<C, M> for ManualCheckpointer<M>
where
    C: PartitionContext<M> + Clone + Send + Sync + 'static,
    M: SourceMessage + Clone + Send + Sync + 'static,
{
    fn on_message(&self, context: &C, message: M) {
        self.partitions.record(context.partition_id(), message);
    }
}
