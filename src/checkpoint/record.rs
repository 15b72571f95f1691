use crate::checkpoint::{ledger, CheckpointConfig, CheckpointManager, CheckpointMode};
use crate::source::{PartitionContext, SourceMessage};

/// Checkpoints after every processed message.
///
/// Effective under [`CheckpointMode::Record`]. Keeps no state beyond the
/// message currently being committed: each delivery immediately issues a
/// commit for that message, in delivery order.
pub struct RecordCheckpointer {
    _config: CheckpointConfig,
}

impl RecordCheckpointer {
    /// Create the strategy, failing fast on a config for a different mode.
    pub fn new(config: CheckpointConfig) -> Self {
        assert_eq!(
            config.mode(),
            CheckpointMode::Record,
            "record checkpointer requires a record-mode config",
        );
        Self { _config: config }
    }
}

impl<C, M> CheckpointManager<C, M> for RecordCheckpointer
where
    C: PartitionContext<M> + Clone + Send + Sync + 'static,
    M: SourceMessage + Send + Sync + 'static,
{
    fn on_message(&self, context: &C, message: M) {
        ledger::commit(context, message);
    }
}
