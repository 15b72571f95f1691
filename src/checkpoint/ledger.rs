use dashmap::DashMap;
use tokio::time::Instant;

use crate::source::{PartitionContext, SourceMessage};

/// Per-partition bookkeeping shared by the checkpoint strategies.
///
/// Records are created lazily on the first message for a partition and are
/// keyed by partition id so that partitions never contend on a single lock.
/// Fields of one record are updated without further synchronization: calls
/// for a single partition are sequential by contract.
pub(crate) struct PartitionLedger<M> {
    partitions: DashMap<String, PartitionRecord<M>>,
}

struct PartitionRecord<M> {
    last: Option<M>,
    since_commit: u64,
    window_opened: Instant,
}

/// Snapshot of a partition's state right after recording a message.
pub(crate) struct Observation {
    /// Messages recorded since the last commit (including this one).
    pub(crate) seen: u64,
    /// Time elapsed since the partition's last commit, or since it was first
    /// observed if it has never committed.
    pub(crate) window_elapsed: std::time::Duration,
}

impl<M> Default for PartitionLedger<M> {
    fn default() -> Self {
        Self {
            partitions: DashMap::new(),
        }
    }
}

impl<M> PartitionLedger<M> {
    /// Record a delivered message for the partition.
    pub(crate) fn record(&self, partition_id: &str, message: M) -> Observation {
        let mut record = self
            .partitions
            .entry(partition_id.to_owned())
            .or_insert_with(|| PartitionRecord {
                last: None,
                since_commit: 0,
                window_opened: Instant::now(),
            });

        record.last = Some(message);
        record.since_commit += 1;

        Observation {
            seen: record.since_commit,
            window_elapsed: record.window_opened.elapsed(),
        }
    }

    /// Reset the partition's message counter after a count-triggered commit.
    pub(crate) fn reset_count(&self, partition_id: &str) {
        if let Some(mut record) = self.partitions.get_mut(partition_id) {
            record.since_commit = 0;
        }
    }

    /// Reopen the partition's commit window after a time-triggered commit.
    pub(crate) fn reset_window(&self, partition_id: &str) {
        if let Some(mut record) = self.partitions.get_mut(partition_id) {
            record.window_opened = Instant::now();
        }
    }

    /// Remove and return the most recently recorded message for the
    /// partition. The record itself stays; only the message slot is cleared.
    pub(crate) fn take_last(&self, partition_id: &str) -> Option<M> {
        self.partitions
            .get_mut(partition_id)
            .and_then(|mut record| record.last.take())
    }
}

impl<M: Clone> PartitionLedger<M> {
    /// The most recently recorded message for the partition, if any.
    pub(crate) fn last(&self, partition_id: &str) -> Option<M> {
        self.partitions
            .get(partition_id)
            .and_then(|record| record.last.clone())
    }
}

/// Issue an asynchronous commit for a specific message.
///
/// The commit request is spawned onto the runtime and the caller returns
/// immediately; the completion continuation only logs. A failure is not
/// retried and never reaches the delivery path: it costs redelivery on
/// restart, nothing more. The continuation may run after the partition's
/// state has advanced past this message; that is benign, since only the log
/// line depends on it.
pub(crate) fn commit<C, M>(context: &C, message: M)
where
    C: PartitionContext<M> + Clone + Send + Sync + 'static,
    M: SourceMessage + Send + Sync + 'static,
{
    let context = context.clone();
    let partition = context.partition_id().to_owned();
    let message_id = message.message_id().map(ToOwned::to_owned);
    let offset = message.offset();

    tokio::spawn(async move {
        match context.checkpoint_message(message).await {
            Ok(()) => tracing::info!(
                partition = %partition,
                message_id = ?message_id,
                offset = ?offset,
                "Checkpoint committed",
            ),
            Err(error) => {
                let error = error.into();
                tracing::error!(
                    partition = %partition,
                    message_id = ?message_id,
                    offset = ?offset,
                    error = %error,
                    "Failed to commit checkpoint",
                );
            }
        }
    });
}
