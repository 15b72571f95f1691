use crate::checkpoint::ledger::PartitionLedger;
use crate::checkpoint::{ledger, CheckpointConfig, CheckpointManager, CheckpointMode};
use crate::source::{PartitionContext, SourceMessage};

/// Checkpoints after every Nth message observed for a partition.
///
/// Effective under [`CheckpointMode::PartitionCount`]. Each partition counts
/// its own deliveries; when the count reaches the configured threshold the
/// triggering message is committed and the counter resets.
pub struct CountCheckpointer<M> {
    threshold: u64,
    partitions: PartitionLedger<M>,
}

impl<M> CountCheckpointer<M> {
    /// Create the strategy, failing fast on a config for a different mode.
    pub fn new(config: CheckpointConfig) -> Self {
        assert_eq!(
            config.mode(),
            CheckpointMode::PartitionCount,
            "count checkpointer requires a partition-count-mode config",
        );
        assert!(
            config.count() > 0,
            "count checkpointer requires a positive message count",
        );
        Self {
            threshold: u64::from(config.count()),
            partitions: PartitionLedger::default(),
        }
    }
}

impl<C, M> CheckpointManager<C, M> for CountCheckpointer<M>
where
    C: PartitionContext<M> + Clone + Send + Sync + 'static,
    M: SourceMessage + Clone + Send + Sync + 'static,
{
    fn on_message(&self, context: &C, message: M) {
        let observation = self
            .partitions
            .record(context.partition_id(), message.clone());

        if observation.seen >= self.threshold {
            self.partitions.reset_count(context.partition_id());
            ledger::commit(context, message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::testsupport::{settle, wait_for_commits};
    use crate::source::inmemory::{CommitRecord, InMemoryMessage, InMemoryPartition};

    #[tokio::test]
    async fn seven_messages_with_count_three_commit_twice() {
        let config = CheckpointConfig::new(CheckpointMode::PartitionCount).with_count(3);
        let strategy = CountCheckpointer::new(config);
        let partition = InMemoryPartition::new("0");

        for offset in 0..7 {
            let message = InMemoryMessage::new(b"payload".to_vec()).with_offset(offset);
            strategy.on_message(&partition, message);
        }

        let commits = wait_for_commits(&partition, 2).await;
        settle().await;

        let commits_after = partition.commits().await;
        assert_eq!(commits_after.len(), 2, "only the 3rd and 6th message commit");
        assert_eq!(
            commits,
            vec![
                CommitRecord::Message {
                    message_id: None,
                    offset: Some("2".to_owned()),
                },
                CommitRecord::Message {
                    message_id: None,
                    offset: Some("5".to_owned()),
                },
            ],
        );
    }

    #[tokio::test]
    async fn counters_are_tracked_per_partition() {
        let config = CheckpointConfig::new(CheckpointMode::PartitionCount).with_count(2);
        let strategy = CountCheckpointer::new(config);
        let left = InMemoryPartition::new("0");
        let right = InMemoryPartition::new("1");

        strategy.on_message(&left, InMemoryMessage::new(b"a".to_vec()).with_offset(0));
        strategy.on_message(&right, InMemoryMessage::new(b"b".to_vec()).with_offset(0));

        settle().await;
        assert!(left.commits().await.is_empty());
        assert!(right.commits().await.is_empty());

        strategy.on_message(&left, InMemoryMessage::new(b"c".to_vec()).with_offset(1));

        let commits = wait_for_commits(&left, 1).await;
        assert_eq!(commits.len(), 1);
        settle().await;
        assert!(right.commits().await.is_empty());
    }

    #[test]
    #[should_panic(expected = "count checkpointer requires a partition-count-mode config")]
    fn rejects_a_config_for_another_mode() {
        CountCheckpointer::<InMemoryMessage>::new(CheckpointConfig::new(CheckpointMode::Batch));
    }

    #[test]
    #[should_panic(expected = "positive message count")]
    fn rejects_a_zero_count() {
        let config = CheckpointConfig::new(CheckpointMode::PartitionCount).with_count(0);
        CountCheckpointer::<InMemoryMessage>::new(config);
    }
}
