use crate::checkpoint::ledger::PartitionLedger;
use crate::checkpoint::{ledger, CheckpointConfig, CheckpointManager, CheckpointMode};
use crate::source::{PartitionContext, SourceMessage};

/// Checkpoints at each batch boundary.
///
/// Effective under [`CheckpointMode::Batch`]. `on_message` only records the
/// message; the commit fires at [`complete_batch`](CheckpointManager::complete_batch)
/// and references the last message recorded for that partition since the
/// previous boundary. A boundary with no recorded message commits nothing.
pub struct BatchCheckpointer<M> {
    partitions: PartitionLedger<M>,
}

impl<M> BatchCheckpointer<M> {
    /// Create the strategy, failing fast on a config for a different mode.
    pub fn new(config: CheckpointConfig) -> Self {
        assert_eq!(
            config.mode(),
            CheckpointMode::Batch,
            "batch checkpointer requires a batch-mode config",
        );
        Self {
            partitions: PartitionLedger::default(),
        }
    }
}

impl<C, M> CheckpointManager<C, M> for BatchCheckpointer<M>
where
    C: PartitionContext<M> + Clone + Send + Sync + 'static,
    M: SourceMessage + Clone + Send + Sync + 'static,
{
    fn on_message(&self, context: &C, message: M) {
        self.partitions.record(context.partition_id(), message);
    }

    fn complete_batch(&self, context: &C) {
        // A boundary with nothing recorded since the previous one is a no-op.
        if let Some(last) = self.partitions.take_last(context.partition_id()) {
            ledger::commit(context, last);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::testsupport::{settle, wait_for_commits};
    use crate::source::inmemory::{CommitRecord, InMemoryMessage, InMemoryPartition};

    fn strategy() -> BatchCheckpointer<InMemoryMessage> {
        BatchCheckpointer::new(CheckpointConfig::new(CheckpointMode::Batch))
    }

    #[tokio::test]
    async fn commits_only_at_the_batch_boundary() {
        let strategy = strategy();
        let partition = InMemoryPartition::new("0");

        for offset in 0..4 {
            let message = InMemoryMessage::new(b"payload".to_vec()).with_offset(offset);
            strategy.on_message(&partition, message);
        }
        settle().await;
        assert!(partition.commits().await.is_empty());

        strategy.complete_batch(&partition);

        let commits = wait_for_commits(&partition, 1).await;
        assert_eq!(commits.len(), 1);
        assert_eq!(
            commits[0],
            CommitRecord::Message {
                message_id: None,
                offset: Some("3".to_owned()),
            },
        );
    }

    #[tokio::test]
    async fn each_boundary_references_its_own_last_message() {
        let strategy = strategy();
        let partition = InMemoryPartition::new("0");

        strategy.on_message(&partition, InMemoryMessage::new(b"a".to_vec()).with_offset(0));
        strategy.complete_batch(&partition);

        strategy.on_message(&partition, InMemoryMessage::new(b"b".to_vec()).with_offset(1));
        strategy.on_message(&partition, InMemoryMessage::new(b"c".to_vec()).with_offset(2));
        strategy.complete_batch(&partition);

        let commits = wait_for_commits(&partition, 2).await;
        let offsets: Vec<_> = commits
            .iter()
            .map(|commit| match commit {
                CommitRecord::Message { offset, .. } => offset.clone(),
                CommitRecord::Position => panic!("batch mode commits explicit messages"),
            })
            .collect();

        assert_eq!(offsets, vec![Some("0".to_owned()), Some("2".to_owned())]);
    }

    #[tokio::test]
    async fn empty_boundary_commits_nothing() {
        let strategy = strategy();
        let partition = InMemoryPartition::new("0");

        strategy.on_message(&partition, InMemoryMessage::new(b"a".to_vec()).with_offset(0));
        strategy.complete_batch(&partition);
        wait_for_commits(&partition, 1).await;

        // No messages since the last boundary; the next one is a no-op.
        strategy.complete_batch(&partition);

        settle().await;
        assert_eq!(partition.commits().await.len(), 1);
    }

    #[tokio::test]
    async fn partitions_do_not_share_batch_state() {
        let strategy = strategy();
        let left = InMemoryPartition::new("0");
        let right = InMemoryPartition::new("1");

        strategy.on_message(&left, InMemoryMessage::new(b"a".to_vec()).with_offset(7));
        strategy.on_message(&right, InMemoryMessage::new(b"b".to_vec()).with_offset(8));

        strategy.complete_batch(&left);

        let commits = wait_for_commits(&left, 1).await;
        assert_eq!(
            commits[0],
            CommitRecord::Message {
                message_id: None,
                offset: Some("7".to_owned()),
            },
        );

        settle().await;
        assert!(right.commits().await.is_empty());
    }

    #[test]
    #[should_panic(expected = "batch checkpointer requires a batch-mode config")]
    fn rejects_a_config_for_another_mode() {
        BatchCheckpointer::<InMemoryMessage>::new(CheckpointConfig::new(CheckpointMode::Record));
    }
}
